use crate::domain::Message;
use std::collections::HashMap;

/// Collapse same-id messages of one bulk through [`Message::shrink`].
///
/// Groups are emitted in the order their first member appears. Messages
/// without an id (or with an empty one) pass through as singleton groups.
pub fn compact<M: Message>(messages: Vec<M>) -> Vec<M> {
    let mut groups: Vec<Vec<M>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for message in messages {
        let slot = match message.grouping_key() {
            Some(key) => match index.get(key) {
                Some(&slot) => Some(slot),
                None => {
                    index.insert(key.to_owned(), groups.len());
                    None
                }
            },
            None => None,
        };

        match slot {
            Some(slot) => groups[slot].push(message),
            None => groups.push(vec![message]),
        }
    }

    groups.into_iter().flat_map(M::shrink).collect()
}
