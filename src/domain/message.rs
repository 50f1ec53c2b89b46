use serde::{Deserialize, Serialize};

/// A unit of outbound work.
///
/// `weight` is the cost used for both buffer admission and bulk sizing and must
/// not change once the value has been handed to the buffer. `id` is the
/// compaction key: messages sharing a non-empty id inside one bulk are handed to
/// [`Message::shrink`] together.
pub trait Message: Send + Sync + Sized + 'static {
    fn weight(&self) -> u64;

    fn id(&self) -> Option<&str>;

    /// Replace a group of same-id messages with a compacted sequence.
    ///
    /// `group` is in bulk order and its first element is the group's
    /// representative. The default keeps the group as is.
    fn shrink(group: Vec<Self>) -> Vec<Self> {
        group
    }

    /// The id as used for grouping; empty ids never group.
    fn grouping_key(&self) -> Option<&str> {
        self.id().filter(|id| !id.is_empty())
    }
}

/// Payload carrier for kinds that need no compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub weight: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SimpleMessage {
    pub fn new(weight: u64) -> Self {
        Self {
            id: None,
            weight,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_id(id: impl Into<String>, weight: u64) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(weight)
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

impl Message for SimpleMessage {
    fn weight(&self) -> u64 {
        self.weight
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_id_is_not_a_grouping_key() {
        let anonymous = SimpleMessage::new(1);
        let empty = SimpleMessage::with_id("", 1);
        let keyed = SimpleMessage::with_id("exec-1", 1);

        assert_eq!(anonymous.grouping_key(), None);
        assert_eq!(empty.grouping_key(), None);
        assert_eq!(keyed.grouping_key(), Some("exec-1"));
    }

    #[test]
    fn test_default_shrink_is_identity() {
        let group = vec![SimpleMessage::with_id("a", 1), SimpleMessage::with_id("a", 2)];
        let shrunk = SimpleMessage::shrink(group.clone());
        assert_eq!(shrunk, group);
    }
}
