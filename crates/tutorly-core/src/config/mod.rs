use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::constants::{endpoints, limits, models, storage};
use crate::error::TutorError;
use crate::lesson::HttpLessonProvider;
use crate::llm::OpenAiGateway;
use crate::store::{FileStore, KeyValueStore};
use crate::vision::HttpVisionClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// The platform backend: lesson lookups and image analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Overrides `<base_url>/chat/analyze-image` when set.
    pub vision_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatSettings {
    pub greeting_delay_ms: u64,
    pub welcome_timeout_ms: u64,
    pub history_window: usize,
    pub max_content_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// Defaults to the platform data directory.
    pub dir: Option<PathBuf>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: endpoints::CHAT_BASE_URL.to_string(),
            model: models::DEFAULT_CHAT_MODEL.to_string(),
            api_key_env: endpoints::API_KEY_ENV.to_string(),
            temperature: models::TEMPERATURE,
            max_tokens: models::MAX_TOKENS,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: endpoints::API_BASE_URL.to_string(),
            vision_endpoint: None,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            greeting_delay_ms: limits::GREETING_DELAY_MS,
            welcome_timeout_ms: limits::WELCOME_TIMEOUT_MS,
            history_window: limits::HISTORY_WINDOW,
            max_content_chars: limits::MAX_LESSON_CONTENT_CHARS,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            api: ApiSettings::default(),
            chat: ChatSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(storage::CONFIG_DIR)
            .join(storage::CONFIG_FILE)
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load_from(path: &std::path::Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Invalid config at {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("Failed to read {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<(), TutorError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), TutorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TutorError::Configuration(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the API key from the environment variable specified in settings.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env).ok()
    }

    /// The credential is read now; a missing key surfaces on the first send.
    pub fn build_gateway(&self) -> OpenAiGateway {
        OpenAiGateway::new(self.api_key())
            .with_base_url(&self.llm.base_url)
            .with_model(&self.llm.model)
            .with_sampling(self.llm.temperature, self.llm.max_tokens)
    }

    pub fn build_lesson_provider(&self) -> HttpLessonProvider {
        HttpLessonProvider::new(&self.api.base_url)
    }

    pub fn build_vision_client(&self) -> HttpVisionClient {
        match self.api.vision_endpoint {
            Some(ref endpoint) => HttpVisionClient::new(endpoint),
            None => HttpVisionClient::from_api_base(&self.api.base_url),
        }
    }

    pub fn build_store(&self) -> Result<Arc<dyn KeyValueStore>, TutorError> {
        let store = match self.storage.dir {
            Some(ref dir) => FileStore::with_dir(dir)?,
            None => FileStore::new()?,
        };
        Ok(Arc::new(store))
    }
}
