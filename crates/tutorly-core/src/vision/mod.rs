//! Homework-photo analysis: local validation and preview, then a multipart
//! upload to the platform's vision endpoint.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::constants::{endpoints, limits};
use crate::error::{Result, TutorError};

/// An image picked by the student, held in memory until submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the mime type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self::new(file_name, mime_type, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Result of a successful vision analysis.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub ai_response: String,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Reject unsupported types and oversized files before any upload.
pub fn validate(file: &ImageFile) -> Result<()> {
    let mime = file.mime_type.to_ascii_lowercase();
    if !limits::ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(TutorError::validation(
            "Please upload a valid image file (JPEG, PNG, GIF, or WebP).",
        ));
    }
    if file.size() > limits::MAX_IMAGE_BYTES {
        return Err(TutorError::validation(format!(
            "Image size must be less than {} MB.",
            limits::MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Render a `data:` URI for immediate display, off the async executor.
pub async fn preview(file: &ImageFile) -> Result<String> {
    let mime = file.mime_type.clone();
    let bytes = file.bytes.clone();
    tokio::task::spawn_blocking(move || {
        format!("data:{};base64,{}", mime, BASE64_STANDARD.encode(bytes))
    })
    .await
    .map_err(|e| TutorError::Io(std::io::Error::other(e)))
}

#[async_trait::async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze(&self, file: &ImageFile, message: &str) -> Result<ImageAnalysis>;
}

#[derive(Deserialize)]
struct VisionResponse {
    data: ImageAnalysis,
}

#[derive(Deserialize)]
struct VisionErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts `image` + `message` as multipart to the vision endpoint.
pub struct HttpVisionClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVisionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn from_api_base(base_url: &str) -> Self {
        Self::new(format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            endpoints::VISION_ANALYZE_PATH
        ))
    }
}

#[async_trait::async_trait]
impl VisionClient for HttpVisionClient {
    async fn analyze(&self, file: &ImageFile, message: &str) -> Result<ImageAnalysis> {
        let image_part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| TutorError::validation(format!("Invalid image type: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("image", image_part)
            .text("message", message.to_string());

        tracing::debug!(
            file = %file.file_name,
            bytes = file.size(),
            "Submitting image for analysis"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<VisionErrorBody>(&body)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_else(|| format!("Vision endpoint returned {}", status));
            tracing::warn!(%status, "Vision analysis failed");
            return Err(TutorError::Upstream(detail));
        }

        let parsed: VisionResponse = serde_json::from_str(&body)?;
        Ok(parsed.data)
    }
}
