use uuid::Uuid;

use crate::message::MessageId;

/// Source of message identifiers, owned by a single session
pub trait IdGenerator: Send + Sync {
    fn next_id(&mut self) -> MessageId;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self) -> MessageId {
        MessageId::new(Uuid::new_v4().to_string())
    }
}

/// Monotonic counter, `msg-1`, `msg-2`, ...
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> MessageId {
        self.next += 1;
        MessageId::new(format!("msg-{}", self.next))
    }
}
