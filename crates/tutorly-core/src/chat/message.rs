use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One entry of a lesson conversation, in the shape the widget stores it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    /// Local data-URI preview of an uploaded image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    /// Canonical URL of an analysed image, as returned by the vision endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            image: None,
            image_file_name: None,
            confidence: None,
            image_url: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            image: None,
            image_file_name: None,
            confidence: None,
            image_url: None,
        }
    }

    pub fn user_with_image(
        text: impl Into<String>,
        preview: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            image: Some(preview.into()),
            image_file_name: Some(file_name.into()),
            ..Self::user(text)
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}
