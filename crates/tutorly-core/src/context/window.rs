use serde::{Deserialize, Serialize};

use crate::chat::{Message, Sender};
use crate::constants::limits;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A prior turn in the shape chat-completion APIs expect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub content: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        let role = match message.sender {
            Sender::User => TurnRole::User,
            Sender::Assistant => TurnRole::Assistant,
        };
        Self {
            role,
            content: message.text.clone(),
        }
    }
}

/// Keeps only the most recent turns so old exchanges (and their language)
/// do not leak into the next completion.
pub struct HistoryWindower {
    max_turns: usize,
}

impl HistoryWindower {
    pub fn new() -> Self {
        Self {
            max_turns: limits::HISTORY_WINDOW,
        }
    }

    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    /// `messages` must already exclude the seeded welcome message.
    /// Image-only messages carry no text and are skipped.
    pub fn window(&self, messages: &[Message]) -> Vec<HistoryTurn> {
        let texts: Vec<&Message> = messages.iter().filter(|m| !m.text.is_empty()).collect();
        let start = texts.len().saturating_sub(self.max_turns);
        texts[start..].iter().map(|m| HistoryTurn::from(*m)).collect()
    }
}

impl Default for HistoryWindower {
    fn default() -> Self {
        Self::new()
    }
}
