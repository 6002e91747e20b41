mod conversation;
mod file;
mod memory;

pub(crate) use conversation::belongs_to_lesson;
pub use conversation::ConversationStore;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// String key-value persistence the chat state is written through.
///
/// Implementations are synchronous: writes are issued right after each
/// in-memory mutation and are treated as best-effort by callers.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}
