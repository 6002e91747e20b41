use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::handle::ChatHandle;
use super::{ChatEvent, ChatSnapshot, ChatState, Message, Sender};
use crate::classifier;
use crate::config::{ChatSettings, Settings};
use crate::constants::replies;
use crate::context::{ContextAssembler, HistoryWindower};
use crate::error::{Result, TutorError};
use crate::lesson::{LessonContext, LessonProvider};
use crate::llm::{ChatGateway, CompletionRequest};
use crate::session::SessionKeyResolver;
use crate::store::{belongs_to_lesson, ConversationStore, KeyValueStore};
use crate::vision::{self, ImageAnalysis, ImageFile, VisionClient};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Everything the controller's queue carries: user operations from
/// [`ChatHandle`] and completions posted back by spawned network tasks.
pub(crate) enum ChatCommand {
    Open { reply: oneshot::Sender<Vec<Message>> },
    Close { reply: oneshot::Sender<()> },
    Send { text: String, reply: Reply<Message> },
    UploadImage { file: ImageFile, text: String, reply: Reply<Message> },
    DeleteMessage { index: usize, reply: Reply<Message> },
    ClearAll { reply: Reply<()> },
    Snapshot { reply: oneshot::Sender<ChatSnapshot> },
    LessonFetched(Option<LessonContext>),
    WelcomeTimeout,
    PreviewReady { file: ImageFile, text: String, preview: Option<String> },
    ReplyReady(Message),
}

/// External collaborators, injected so any backend can be swapped in.
#[derive(Clone)]
pub struct ChatServices {
    pub gateway: Arc<dyn ChatGateway>,
    pub vision: Arc<dyn VisionClient>,
    pub lessons: Arc<dyn LessonProvider>,
    pub store: Arc<dyn KeyValueStore>,
}

impl ChatServices {
    /// HTTP clients and a file store, all configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            gateway: Arc::new(settings.build_gateway()),
            vision: Arc::new(settings.build_vision_client()),
            lessons: Arc::new(settings.build_lesson_provider()),
            store: settings.build_store()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub lesson_id: Option<String>,
    pub greeting_delay: Duration,
    pub welcome_timeout: Duration,
    pub history_window: usize,
    pub max_content_chars: usize,
}

impl ChatOptions {
    pub fn for_lesson(lesson_id: impl Into<String>) -> Self {
        Self {
            lesson_id: Some(lesson_id.into()),
            ..Self::default()
        }
    }

    pub fn with_settings(mut self, settings: &ChatSettings) -> Self {
        self.greeting_delay = Duration::from_millis(settings.greeting_delay_ms);
        self.welcome_timeout = Duration::from_millis(settings.welcome_timeout_ms);
        self.history_window = settings.history_window;
        self.max_content_chars = settings.max_content_chars;
        self
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            lesson_id: None,
            greeting_delay: Duration::ZERO,
            welcome_timeout: Duration::ZERO,
            history_window: 0,
            max_content_chars: 0,
        }
        .with_settings(&ChatSettings::default())
    }
}

enum LessonState {
    Pending,
    Resolved(Option<LessonContext>),
}

/// The chat state machine.
///
/// Runs as a single task that owns the conversation. Commands are handled
/// one at a time; network calls are spawned and report back through the
/// same queue, so close/clear stay responsive while a reply is in flight
/// and that reply is still applied when it lands.
pub struct ConversationController {
    session_key: String,
    lesson: LessonState,
    messages: Vec<Message>,
    open: bool,
    loading: bool,
    loaded: bool,
    welcome_pending: bool,
    /// Index 0 holds a generic welcome seeded before the lesson arrived.
    provisional_welcome: bool,
    /// Restored before the lesson resolved; checked once it does.
    unvalidated: bool,
    pending_reply: Option<Reply<Message>>,
    services: ChatServices,
    conversations: ConversationStore,
    options: ChatOptions,
    commands: mpsc::WeakUnboundedSender<ChatCommand>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ConversationController {
    /// Start a controller task for one chat widget. Must be called from
    /// within a tokio runtime. The lesson context fetch starts immediately.
    pub fn spawn(
        services: ChatServices,
        options: ChatOptions,
    ) -> (ChatHandle, mpsc::UnboundedReceiver<ChatEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let session_key =
            SessionKeyResolver::new(services.store.clone()).resolve(options.lesson_id.as_deref());
        let lesson = match options.lesson_id {
            Some(_) => LessonState::Pending,
            None => LessonState::Resolved(None),
        };

        let controller = Self {
            session_key,
            lesson,
            messages: Vec::new(),
            open: false,
            loading: false,
            loaded: false,
            welcome_pending: false,
            provisional_welcome: false,
            unvalidated: false,
            pending_reply: None,
            conversations: ConversationStore::new(services.store.clone()),
            services,
            options,
            commands: cmd_tx.downgrade(),
            events: event_tx,
        };

        controller.fetch_lesson();
        tokio::spawn(controller.run(cmd_rx));

        (ChatHandle::new(cmd_tx), event_rx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChatCommand>) {
        tracing::debug!(session_key = %self.session_key, "Chat controller started");
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        tracing::debug!(session_key = %self.session_key, "Chat controller stopped");
    }

    fn handle(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Open { reply } => {
                self.open();
                let _ = reply.send(self.messages.clone());
            }
            ChatCommand::Close { reply } => {
                let before = self.state();
                self.open = false;
                self.emit_state(before);
                let _ = reply.send(());
            }
            ChatCommand::Send { text, reply } => {
                let text = text.trim().to_string();
                if let Err(e) = self.check_ready() {
                    let _ = reply.send(Err(e));
                } else if text.is_empty() {
                    let _ = reply.send(Err(TutorError::validation("Message cannot be empty")));
                } else {
                    self.pending_reply = Some(reply);
                    self.send_message(text);
                }
            }
            ChatCommand::UploadImage { file, text, reply } => {
                if let Err(e) = self.check_ready() {
                    let _ = reply.send(Err(e));
                } else if let Err(e) = vision::validate(&file) {
                    let _ = self.events.send(ChatEvent::Alert(e.to_string()));
                    let _ = reply.send(Err(e));
                } else {
                    self.pending_reply = Some(reply);
                    self.begin_upload(file, text);
                }
            }
            ChatCommand::DeleteMessage { index, reply } => {
                let _ = reply.send(self.delete_message(index));
            }
            ChatCommand::ClearAll { reply } => {
                let _ = reply.send(self.clear_all());
            }
            ChatCommand::Snapshot { reply } => {
                let _ = reply.send(ChatSnapshot {
                    state: self.state(),
                    session_key: self.session_key.clone(),
                    lesson: self.lesson().cloned(),
                    messages: self.messages.clone(),
                });
            }
            ChatCommand::LessonFetched(lesson) => self.lesson_resolved(lesson),
            ChatCommand::WelcomeTimeout => {
                if self.welcome_pending {
                    tracing::debug!(session_key = %self.session_key, "Lesson not ready, seeding welcome");
                    self.seed_welcome();
                }
            }
            ChatCommand::PreviewReady { file, text, preview } => {
                self.submit_upload(file, text, preview)
            }
            ChatCommand::ReplyReady(message) => self.finish(message),
        }
    }

    fn state(&self) -> ChatState {
        match (self.open, self.loading) {
            (false, _) => ChatState::Closed,
            (true, true) => ChatState::Loading,
            (true, false) => ChatState::Idle,
        }
    }

    fn emit_state(&self, before: ChatState) {
        let now = self.state();
        if now != before {
            let _ = self.events.send(ChatEvent::StateChanged(now));
        }
    }

    fn lesson(&self) -> Option<&LessonContext> {
        match self.lesson {
            LessonState::Resolved(Some(ref lesson)) => Some(lesson),
            _ => None,
        }
    }

    /// Single-slot guard: one send/upload in flight at a time.
    fn check_ready(&self) -> Result<()> {
        if !self.open {
            return Err(TutorError::NotOpen);
        }
        if self.loading {
            return Err(TutorError::Busy);
        }
        Ok(())
    }

    /// Run `work` on its own task and feed its result back into the queue.
    fn post_when<F>(&self, work: F)
    where
        F: Future<Output = ChatCommand> + Send + 'static,
    {
        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let _ = tx.send(work.await);
        });
    }

    fn persist(&self) {
        self.conversations.save(&self.session_key, &self.messages);
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.unvalidated = false;
        self.persist();
        let _ = self.events.send(ChatEvent::MessageAdded {
            index: self.messages.len() - 1,
            message,
        });
    }

    fn set_loading(&mut self, loading: bool) {
        let before = self.state();
        self.loading = loading;
        self.emit_state(before);
    }

    fn fetch_lesson(&self) {
        let Some(lesson_id) = self.options.lesson_id.clone() else {
            return;
        };
        let lessons = self.services.lessons.clone();
        self.post_when(async move {
            match lessons.fetch(&lesson_id).await {
                Ok(lesson) => ChatCommand::LessonFetched(Some(lesson)),
                Err(e) => {
                    tracing::warn!(lesson_id = %lesson_id, "Failed to fetch lesson context: {}", e);
                    ChatCommand::LessonFetched(None)
                }
            }
        });
    }

    fn lesson_resolved(&mut self, lesson: Option<LessonContext>) {
        let title = lesson.as_ref().map(|l| l.title.clone());
        self.lesson = LessonState::Resolved(lesson);
        let _ = self.events.send(ChatEvent::LessonResolved { title });

        if self.unvalidated {
            self.unvalidated = false;
            let stale = self
                .lesson()
                .map(|lesson| !belongs_to_lesson(&self.messages, lesson))
                .unwrap_or(false);
            if stale {
                tracing::info!(
                    session_key = %self.session_key,
                    "Discarding restored conversation from a different lesson"
                );
                self.messages.clear();
                self.conversations.clear(&self.session_key);
                let _ = self.events.send(ChatEvent::HistoryCleared);
                self.seed_welcome();
                return;
            }
        }

        if self.welcome_pending {
            self.seed_welcome();
        } else if self.provisional_welcome {
            self.upgrade_welcome();
        }
    }

    /// Swap a generic welcome seeded on timeout for the lesson one, so the
    /// stored conversation keeps naming its lesson.
    fn upgrade_welcome(&mut self) {
        self.provisional_welcome = false;
        if self.lesson().is_none() {
            return;
        }
        let generic = welcome_message(None);
        if self.messages.first() != Some(&generic) {
            return;
        }

        let message = welcome_message(self.lesson());
        self.messages[0] = message.clone();
        self.persist();
        tracing::debug!(session_key = %self.session_key, "Replaced generic welcome with lesson welcome");
        let _ = self.events.send(ChatEvent::MessageUpdated { index: 0, message });
    }

    fn open(&mut self) {
        let before = self.state();
        self.open = true;
        self.emit_state(before);

        if self.loaded {
            return;
        }
        self.loaded = true;

        self.messages = match self.lesson {
            LessonState::Resolved(ref lesson) => self
                .conversations
                .load_for_lesson(&self.session_key, lesson.as_ref()),
            LessonState::Pending => {
                let stored = self.conversations.load(&self.session_key);
                self.unvalidated = !stored.is_empty();
                stored
            }
        };
        tracing::info!(
            session_key = %self.session_key,
            restored = self.messages.len(),
            "Chat opened"
        );

        if self.messages.is_empty() {
            self.ensure_welcome();
        }
    }

    /// Seed now if the lesson is known, otherwise wait for it (bounded by
    /// the welcome timeout).
    fn ensure_welcome(&mut self) {
        match self.lesson {
            LessonState::Resolved(_) => self.seed_welcome(),
            LessonState::Pending if !self.welcome_pending => {
                self.welcome_pending = true;
                let timeout = self.options.welcome_timeout;
                self.post_when(async move {
                    tokio::time::sleep(timeout).await;
                    ChatCommand::WelcomeTimeout
                });
            }
            LessonState::Pending => {}
        }
    }

    /// The welcome always goes first so a lesson-bound conversation opens
    /// with the lesson title.
    fn seed_welcome(&mut self) {
        self.welcome_pending = false;
        self.provisional_welcome = matches!(self.lesson, LessonState::Pending);
        let message = welcome_message(self.lesson());
        self.messages.insert(0, message.clone());
        self.persist();
        let _ = self.events.send(ChatEvent::MessageAdded { index: 0, message });
    }

    fn send_message(&mut self, text: String) {
        self.set_loading(true);
        self.push(Message::user(&text));

        if classifier::is_greeting(&text) {
            tracing::debug!(session_key = %self.session_key, "Greeting, answering locally");
            let reply = greeting_reply(self.lesson());
            let delay = self.options.greeting_delay;
            self.post_when(async move {
                tokio::time::sleep(delay).await;
                ChatCommand::ReplyReady(reply)
            });
            return;
        }

        if !classifier::is_lesson_related(&text, self.lesson()) {
            tracing::debug!(session_key = %self.session_key, "Off-topic message rejected");
            self.finish(Message::assistant(replies::REJECTION));
            return;
        }

        let request = self.completion_request(text);
        let gateway = self.services.gateway.clone();
        self.post_when(async move {
            let reply = match gateway.complete(&request).await {
                Ok(content) => Message::assistant(content),
                Err(e) => {
                    tracing::warn!("Chat completion failed: {}", e);
                    Message::assistant(format!("{}{}", replies::SEND_FAILURE_PREFIX, e))
                }
            };
            ChatCommand::ReplyReady(reply)
        });
    }

    /// Prior turns exclude the just-appended user message and the welcome.
    fn completion_request(&self, user_message: String) -> CompletionRequest {
        let prior = self
            .messages
            .split_last()
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        let prior = match prior.first() {
            Some(first) if first.sender == Sender::Assistant => &prior[1..],
            _ => prior,
        };

        let history = HistoryWindower::new()
            .with_max_turns(self.options.history_window)
            .window(prior);
        let system = ContextAssembler::new()
            .with_lesson(self.lesson())
            .with_max_content_chars(self.options.max_content_chars)
            .build();

        CompletionRequest {
            system,
            history,
            user_message,
        }
    }

    fn begin_upload(&mut self, file: ImageFile, text: String) {
        self.set_loading(true);
        self.post_when(async move {
            let preview = match vision::preview(&file).await {
                Ok(uri) => Some(uri),
                Err(e) => {
                    tracing::warn!(file = %file.file_name, "Failed to render preview: {}", e);
                    None
                }
            };
            ChatCommand::PreviewReady {
                file,
                text,
                preview,
            }
        });
    }

    fn submit_upload(&mut self, file: ImageFile, text: String, preview: Option<String>) {
        let text = text.trim().to_string();
        self.push(Message {
            image: preview,
            image_file_name: Some(file.file_name.clone()),
            ..Message::user(&text)
        });

        let vision = self.services.vision.clone();
        self.post_when(async move {
            let reply = match vision.analyze(&file, &text).await {
                Ok(analysis) => analysis_message(analysis),
                Err(e) => {
                    tracing::warn!(file = %file.file_name, "Image analysis failed: {}", e);
                    Message::assistant(format!("{}{}", replies::IMAGE_FAILURE_PREFIX, e))
                }
            };
            ChatCommand::ReplyReady(reply)
        });
    }

    /// Applied whenever a reply lands, even if the chat was closed or
    /// cleared in the meantime.
    fn finish(&mut self, message: Message) {
        self.push(message.clone());
        self.set_loading(false);
        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(Ok(message));
        }
    }

    fn delete_message(&mut self, index: usize) -> Result<Message> {
        self.check_ready()?;
        if index >= self.messages.len() {
            return Err(TutorError::validation(format!(
                "No message at position {}",
                index
            )));
        }

        let removed = self.messages.remove(index);
        self.unvalidated = false;
        if index == 0 {
            self.provisional_welcome = false;
        }
        self.persist();
        let _ = self.events.send(ChatEvent::MessageRemoved { index });
        Ok(removed)
    }

    fn clear_all(&mut self) -> Result<()> {
        if !self.open {
            return Err(TutorError::NotOpen);
        }

        self.conversations.clear(&self.session_key);
        self.messages.clear();
        self.unvalidated = false;
        self.provisional_welcome = false;
        let _ = self.events.send(ChatEvent::HistoryCleared);
        tracing::info!(session_key = %self.session_key, "Chat history cleared");

        self.ensure_welcome();
        Ok(())
    }
}

fn welcome_message(lesson: Option<&LessonContext>) -> Message {
    match lesson {
        Some(lesson) => Message::assistant(format!(
            "Hello! 👋 Welcome to **{}**. I'm your AI tutor for this lesson.\n\n\
             Ask me to explain a concept, walk through an example, or upload a photo of your homework.",
            lesson.title
        )),
        None => Message::assistant(replies::GENERIC_WELCOME),
    }
}

fn greeting_reply(lesson: Option<&LessonContext>) -> Message {
    match lesson {
        Some(lesson) => Message::assistant(format!(
            "Hello! 👋 I'm here to help you with **{}**. What would you like to learn?",
            lesson.title
        )),
        None => Message::assistant(replies::GENERIC_GREETING),
    }
}

fn analysis_message(analysis: ImageAnalysis) -> Message {
    Message {
        confidence: analysis.confidence,
        image_url: analysis.image_url,
        ..Message::assistant(analysis.ai_response)
    }
}
