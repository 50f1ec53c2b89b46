use crate::domain::Message;
use std::collections::VecDeque;

/// Messages submitted together in one `put` call.
///
/// Lives only inside the buffer queue and drained snapshots; the assembler
/// expands it back into its constituents before compaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMessage<M> {
    messages: Vec<M>,
    weight: u64,
}

impl<M: Message> CompoundMessage<M> {
    pub fn new(messages: Vec<M>) -> Self {
        let weight = messages
            .iter()
            .map(Message::weight)
            .fold(0, u64::saturating_add);
        Self { messages, weight }
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[M] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<M> {
        self.messages
    }
}

/// One element of the buffer queue.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEntry<M> {
    Single(M),
    Compound(CompoundMessage<M>),
}

impl<M: Message> BufferEntry<M> {
    /// Wrap the messages of one `put` call. Callers guarantee `messages` is non-empty.
    pub(crate) fn from_messages(mut messages: Vec<M>) -> Self {
        if messages.len() == 1
            && let Some(message) = messages.pop()
        {
            return BufferEntry::Single(message);
        }
        BufferEntry::Compound(CompoundMessage::new(messages))
    }

    pub fn weight(&self) -> u64 {
        match self {
            BufferEntry::Single(message) => message.weight(),
            BufferEntry::Compound(compound) => compound.weight(),
        }
    }

    /// Number of messages this entry expands to.
    pub fn message_count(&self) -> usize {
        match self {
            BufferEntry::Single(_) => 1,
            BufferEntry::Compound(compound) => compound.len(),
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, BufferEntry::Compound(_))
    }

    pub fn into_messages(self) -> Vec<M> {
        match self {
            BufferEntry::Single(message) => vec![message],
            BufferEntry::Compound(compound) => compound.into_messages(),
        }
    }
}

/// Queue contents detached by one drain call. Owned exclusively by the caller.
#[derive(Debug)]
pub struct Snapshot<M> {
    entries: VecDeque<BufferEntry<M>>,
    weight: u64,
}

impl<M: Message> Snapshot<M> {
    pub(crate) fn new(entries: VecDeque<BufferEntry<M>>, weight: u64) -> Self {
        Self { entries, weight }
    }

    /// Number of top-level entries (a compound counts once).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn message_count(&self) -> usize {
        self.entries.iter().map(BufferEntry::message_count).sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = &BufferEntry<M>> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> VecDeque<BufferEntry<M>> {
        self.entries
    }

    /// Expand compounds in place, keeping admission order and keeping each
    /// compound's constituents adjacent.
    pub fn flatten(self) -> Vec<M> {
        let mut flat = Vec::with_capacity(self.message_count());
        for entry in self.entries {
            match entry {
                BufferEntry::Single(message) => flat.push(message),
                BufferEntry::Compound(compound) => flat.extend(compound.into_messages()),
            }
        }
        flat
    }
}

impl<M> IntoIterator for Snapshot<M> {
    type Item = BufferEntry<M>;
    type IntoIter = std::collections::vec_deque::IntoIter<BufferEntry<M>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
