use std::sync::Arc;

use super::KeyValueStore;
use crate::chat::Message;
use crate::constants::storage;
use crate::lesson::LessonContext;

/// Persists the ordered message list of each session.
///
/// Every operation is best-effort: read problems yield an empty
/// conversation and write problems are logged, so the in-memory
/// conversation stays authoritative for the lifetime of the controller.
#[derive(Clone)]
pub struct ConversationStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn storage_key(session_key: &str) -> String {
        format!("{}{}", storage::CONVERSATION_KEY_PREFIX, session_key)
    }

    pub fn load(&self, session_key: &str) -> Vec<Message> {
        let raw = match self.kv.get(&Self::storage_key(session_key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(session_key, "Failed to read conversation: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(session_key, "Ignoring malformed stored conversation: {}", e);
                Vec::new()
            }
        }
    }

    /// Load, dropping the stored conversation if it belongs to another lesson.
    ///
    /// A lesson-bound conversation always opens with a message naming the
    /// lesson title; when the first stored message does not, the entry is
    /// stale and is treated as absent.
    pub fn load_for_lesson(
        &self,
        session_key: &str,
        lesson: Option<&LessonContext>,
    ) -> Vec<Message> {
        let messages = self.load(session_key);
        match lesson {
            Some(lesson) if !belongs_to_lesson(&messages, lesson) => {
                tracing::info!(
                    session_key,
                    lesson = %lesson.title,
                    "Discarding stored conversation from a different lesson"
                );
                Vec::new()
            }
            _ => messages,
        }
    }

    pub fn save(&self, session_key: &str, messages: &[Message]) {
        let raw = match serde_json::to_string(messages) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(session_key, "Failed to serialize conversation: {}", e);
                return;
            }
        };

        if let Err(e) = self.kv.set(&Self::storage_key(session_key), &raw) {
            tracing::warn!(session_key, "Failed to save conversation: {}", e);
        }
    }

    pub fn clear(&self, session_key: &str) {
        if let Err(e) = self.kv.remove(&Self::storage_key(session_key)) {
            tracing::warn!(session_key, "Failed to clear conversation: {}", e);
        }
    }
}

/// Empty conversations trivially belong to any lesson.
pub(crate) fn belongs_to_lesson(messages: &[Message], lesson: &LessonContext) -> bool {
    match messages.first() {
        Some(first) => first.text.contains(&lesson.title),
        None => true,
    }
}
