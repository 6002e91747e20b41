use std::sync::Arc;

use crate::constants::storage;
use crate::store::KeyValueStore;

/// Derives the key a conversation is stored under.
pub struct SessionKeyResolver {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionKeyResolver {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Lesson-bound chats key on the lesson id alone so every visit to the
    /// same lesson shares one conversation. Anonymous chats reuse a key
    /// generated once and remembered in the store.
    pub fn resolve(&self, lesson_id: Option<&str>) -> String {
        if let Some(id) = lesson_id {
            return lesson_key(id);
        }

        match self.kv.get(storage::ANONYMOUS_SESSION_KEY) {
            Ok(Some(existing)) if !existing.is_empty() => return existing,
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to read anonymous session key: {}", e),
        }

        let key = generate_anonymous_key();
        if let Err(e) = self.kv.set(storage::ANONYMOUS_SESSION_KEY, &key) {
            tracing::warn!("Failed to persist anonymous session key: {}", e);
        }
        tracing::debug!(session_key = %key, "Generated anonymous session key");
        key
    }
}

pub fn lesson_key(lesson_id: &str) -> String {
    format!("{}{}", storage::LESSON_SESSION_PREFIX, lesson_id)
}

/// `session_<unix millis>_<9 random chars>`
fn generate_anonymous_key() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", millis, &random[..9])
}
