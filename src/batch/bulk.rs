use crate::domain::Message;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An ordered group of messages dispatched in a single transport call.
#[derive(Debug, Clone)]
pub struct Bulk<M> {
    id: String,
    messages: Vec<M>,
    weight: u64,
    created_at: DateTime<Utc>,
}

impl<M: Message> Bulk<M> {
    pub fn new(messages: Vec<M>) -> Self {
        let weight = messages
            .iter()
            .map(Message::weight)
            .fold(0, u64::saturating_add);
        Self {
            id: Uuid::new_v4().to_string(),
            messages,
            weight,
            created_at: Utc::now(),
        }
    }
}

impl<M> Bulk<M> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[M] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<M> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SimpleMessage;

    #[test]
    fn test_bulk_weight_and_identity() {
        let first = Bulk::new(vec![SimpleMessage::new(3), SimpleMessage::new(4)]);
        let second = Bulk::new(vec![SimpleMessage::new(1)]);

        assert_eq!(first.weight(), 7);
        assert_eq!(first.len(), 2);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_bulk_weight_saturates() {
        let bulk = Bulk::new(vec![SimpleMessage::new(u64::MAX), SimpleMessage::new(5)]);
        assert_eq!(bulk.weight(), u64::MAX);
    }
}
