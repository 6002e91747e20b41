use serde::{Deserialize, Serialize};

use crate::context::{HistoryTurn, TurnRole};
use crate::error::TutorError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        }
    }
}

/// One entry of a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

impl From<&HistoryTurn> for ChatMessage {
    fn from(turn: &HistoryTurn) -> Self {
        Self {
            role: turn.role.into(),
            content: turn.content.clone(),
        }
    }
}

/// Everything needed for one tutoring completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub history: Vec<HistoryTurn>,
    pub user_message: String,
}

impl CompletionRequest {
    /// `[system, ...history, user]`
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(&self.system));
        messages.extend(self.history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(&self.user_message));
        messages
    }
}

/// The single outbound call of the text conversation path.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// Returns the completion text, `Configuration` when no credential is
    /// set, or `Upstream` carrying the provider's error message.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TutorError>;
}
