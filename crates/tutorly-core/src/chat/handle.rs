use tokio::sync::{mpsc, oneshot};

use super::controller::ChatCommand;
use super::{ChatSnapshot, Message};
use crate::error::{Result, TutorError};
use crate::vision::ImageFile;

/// Cloneable front door to a running [`ConversationController`].
///
/// Every call is queued behind earlier ones; `send` and `upload_image`
/// resolve once the assistant's reply has been appended.
///
/// [`ConversationController`]: super::ConversationController
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<ChatCommand>,
}

impl ChatHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<ChatCommand>) -> Self {
        Self { commands }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ChatCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| TutorError::ChannelClosed)?;
        rx.await.map_err(|_| TutorError::ChannelClosed)
    }

    /// Returns the conversation as it stands after opening.
    pub async fn open(&self) -> Result<Vec<Message>> {
        self.request(|reply| ChatCommand::Open { reply }).await
    }

    pub async fn close(&self) -> Result<()> {
        self.request(|reply| ChatCommand::Close { reply }).await
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<Message> {
        let text = text.into();
        self.request(|reply| ChatCommand::Send { text, reply })
            .await?
    }

    pub async fn upload_image(&self, file: ImageFile, text: impl Into<String>) -> Result<Message> {
        let text = text.into();
        self.request(|reply| ChatCommand::UploadImage { file, text, reply })
            .await?
    }

    /// Returns the removed message.
    pub async fn delete_message(&self, index: usize) -> Result<Message> {
        self.request(|reply| ChatCommand::DeleteMessage { index, reply })
            .await?
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.request(|reply| ChatCommand::ClearAll { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<ChatSnapshot> {
        self.request(|reply| ChatCommand::Snapshot { reply }).await
    }
}
