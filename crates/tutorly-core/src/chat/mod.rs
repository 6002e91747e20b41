mod controller;
mod handle;
mod message;

pub use controller::{ChatOptions, ChatServices, ConversationController};
pub use handle::ChatHandle;
pub use message::{Message, Sender};

use crate::lesson::LessonContext;

/// Observable controller state. `Idle` and `Loading` are both "open".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Closed,
    Idle,
    Loading,
}

impl ChatState {
    pub fn is_open(&self) -> bool {
        !matches!(self, ChatState::Closed)
    }
}

/// Events emitted by the controller - the host's view of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StateChanged(ChatState),
    MessageAdded { index: usize, message: Message },
    /// A message was rewritten in place.
    MessageUpdated { index: usize, message: Message },
    MessageRemoved { index: usize },
    HistoryCleared,
    LessonResolved { title: Option<String> },
    /// A user-facing notice that is not part of the conversation.
    Alert(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    pub state: ChatState,
    pub session_key: String,
    pub lesson: Option<LessonContext>,
    pub messages: Vec<Message>,
}
