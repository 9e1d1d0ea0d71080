use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub struct UserStats {
    pub queued_count: u16,
    pub dequeued_count: u16,
    pub deleted_count: u16,
}
