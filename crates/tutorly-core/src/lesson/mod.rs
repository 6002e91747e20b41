use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// Snapshot of the lesson the chat is bound to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LessonContext {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default, rename = "class")]
    pub class_name: String,
}

impl LessonContext {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

/// Source of lesson metadata, consumed once per lesson id.
#[async_trait::async_trait]
pub trait LessonProvider: Send + Sync {
    async fn fetch(&self, lesson_id: &str) -> Result<LessonContext>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LessonPayload {
    Wrapped { data: LessonContext },
    Bare(LessonContext),
}

/// Reads lessons from the platform's REST API (`GET {base}/lessons/{id}`).
pub struct HttpLessonProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLessonProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl LessonProvider for HttpLessonProvider {
    async fn fetch(&self, lesson_id: &str) -> Result<LessonContext> {
        let url = format!("{}/lessons/{}", self.base_url.trim_end_matches('/'), lesson_id);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TutorError::upstream(format!(
                "Lesson API error ({}): {}",
                status, body
            )));
        }

        let lesson = match serde_json::from_str::<LessonPayload>(&body)? {
            LessonPayload::Wrapped { data } => data,
            LessonPayload::Bare(lesson) => lesson,
        };
        tracing::debug!(lesson_id, title = %lesson.title, "Lesson context fetched");
        Ok(lesson)
    }
}
