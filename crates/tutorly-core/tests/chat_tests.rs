use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc::UnboundedReceiver, Notify};
use tutorly_core::constants::{replies, storage};
use tutorly_core::context::TurnRole;
use tutorly_core::*;

// ========================================================================
// Mocks
// ========================================================================

/// Gateway that records requests and replays scripted answers.
/// When gated, every completion waits for one `notify_one()`.
#[derive(Default)]
struct MockGateway {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Option<Arc<Notify>>,
}

impl MockGateway {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn push_reply(&self, reply: Result<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatGateway for MockGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("Here is an explanation.".to_string()))
    }
}

#[derive(Default)]
struct MockVision {
    result: Mutex<Option<Result<ImageAnalysis>>>,
    messages: Mutex<Vec<String>>,
}

impl MockVision {
    fn failing(message: &str) -> Self {
        Self {
            result: Mutex::new(Some(Err(TutorError::Upstream(message.to_string())))),
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl VisionClient for MockVision {
    async fn analyze(&self, _file: &ImageFile, message: &str) -> Result<ImageAnalysis> {
        self.messages.lock().unwrap().push(message.to_string());
        self.result.lock().unwrap().take().unwrap_or_else(|| {
            Ok(ImageAnalysis {
                ai_response: "The first step is to isolate x.".into(),
                confidence: Some("high".into()),
                image_url: Some("/uploads/homework.png".into()),
            })
        })
    }
}

/// Resolves to the configured lesson, or fails when there is none.
struct MockLessons {
    lesson: Option<LessonContext>,
    gate: Option<Arc<Notify>>,
}

impl MockLessons {
    fn ready(lesson: LessonContext) -> Self {
        Self {
            lesson: Some(lesson),
            gate: None,
        }
    }

    fn failing() -> Self {
        Self {
            lesson: None,
            gate: None,
        }
    }
}

#[async_trait::async_trait]
impl LessonProvider for MockLessons {
    async fn fetch(&self, lesson_id: &str) -> Result<LessonContext> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.lesson
            .clone()
            .ok_or_else(|| TutorError::Upstream(format!("lesson {} not found", lesson_id)))
    }
}

struct NeverLessons;

#[async_trait::async_trait]
impl LessonProvider for NeverLessons {
    async fn fetch(&self, _lesson_id: &str) -> Result<LessonContext> {
        std::future::pending().await
    }
}

// ========================================================================
// Harness
// ========================================================================

fn derivatives() -> LessonContext {
    LessonContext {
        title: "Derivatives".into(),
        description: "Rates of change".into(),
        content: "The derivative measures how a function changes.".into(),
        subject: "Mathematics".into(),
        chapter: "Calculus".into(),
        class_name: "12".into(),
    }
}

fn fast_options(lesson_id: Option<&str>) -> ChatOptions {
    ChatOptions {
        lesson_id: lesson_id.map(str::to_string),
        greeting_delay: Duration::ZERO,
        ..ChatOptions::default()
    }
}

struct Harness {
    handle: ChatHandle,
    events: UnboundedReceiver<ChatEvent>,
    gateway: Arc<MockGateway>,
    vision: Arc<MockVision>,
    store: Arc<MemoryStore>,
}

fn start_with(
    options: ChatOptions,
    lessons: Arc<dyn LessonProvider>,
    gateway: Arc<MockGateway>,
    vision: Arc<MockVision>,
    store: Arc<MemoryStore>,
) -> Harness {
    let services = ChatServices {
        gateway: gateway.clone(),
        vision: vision.clone(),
        lessons,
        store: store.clone(),
    };
    let (handle, events) = ConversationController::spawn(services, options);
    Harness {
        handle,
        events,
        gateway,
        vision,
        store,
    }
}

fn start_lesson() -> Harness {
    start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    )
}

/// Open after the lesson has resolved so the welcome names it.
async fn open_resolved(h: &mut Harness) -> Vec<Message> {
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::LessonResolved { .. })).await;
    h.handle.open().await.unwrap()
}

async fn wait_for(
    events: &mut UnboundedReceiver<ChatEvent>,
    pred: impl Fn(&ChatEvent) -> bool,
) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn stored(store: &MemoryStore, session_key: &str) -> Option<Vec<Message>> {
    store
        .get(&format!("{}{}", storage::CONVERSATION_KEY_PREFIX, session_key))
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

fn png(bytes: usize) -> ImageFile {
    ImageFile::new("homework.png", "image/png", vec![7; bytes])
}

// ========================================================================
// Opening and welcome
// ========================================================================

#[tokio::test]
async fn test_open_seeds_lesson_welcome() {
    let mut h = start_lesson();
    let messages = open_resolved(&mut h).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, Sender::Assistant);
    assert!(messages[0].text.contains("Derivatives"));

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ChatState::Idle);
    assert!(snapshot.state.is_open());
    assert_eq!(snapshot.session_key, "lesson:42");
    assert_eq!(snapshot.lesson.unwrap().title, "Derivatives");
    assert_eq!(stored(&h.store, "lesson:42").unwrap(), messages);
}

#[tokio::test]
async fn test_open_without_lesson_uses_anonymous_key() {
    let h = start_with(
        fast_options(None),
        Arc::new(MockLessons::failing()),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );
    let messages = h.handle.open().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, replies::GENERIC_WELCOME);

    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(snapshot.session_key.starts_with("session_"));
    assert_eq!(
        h.store.get(storage::ANONYMOUS_SESSION_KEY).unwrap(),
        Some(snapshot.session_key.clone())
    );
}

#[tokio::test]
async fn test_anonymous_key_reused_across_controllers() {
    let store = Arc::new(MemoryStore::new());
    let first = start_with(
        fast_options(None),
        Arc::new(MockLessons::failing()),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        store.clone(),
    );
    let second = start_with(
        fast_options(None),
        Arc::new(MockLessons::failing()),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        store,
    );
    assert_eq!(
        first.handle.snapshot().await.unwrap().session_key,
        second.handle.snapshot().await.unwrap().session_key
    );
}

#[tokio::test]
async fn test_lesson_fetch_failure_falls_back_to_generic() {
    let mut h = start_with(
        fast_options(Some("404")),
        Arc::new(MockLessons::failing()),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );
    let event = wait_for(&mut h.events, |e| matches!(e, ChatEvent::LessonResolved { .. })).await;
    assert_eq!(event, ChatEvent::LessonResolved { title: None });

    let messages = h.handle.open().await.unwrap();
    assert_eq!(messages[0].text, replies::GENERIC_WELCOME);
}

#[tokio::test]
async fn test_welcome_waits_for_late_lesson() {
    let gate = Arc::new(Notify::new());
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons {
            lesson: Some(derivatives()),
            gate: Some(gate.clone()),
        }),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );

    assert!(h.handle.open().await.unwrap().is_empty());
    gate.notify_one();

    let event = wait_for(&mut h.events, |e| matches!(e, ChatEvent::MessageAdded { .. })).await;
    let ChatEvent::MessageAdded { index, message } = event else {
        unreachable!()
    };
    assert_eq!(index, 0);
    assert!(message.text.contains("Derivatives"));
}

#[tokio::test(start_paused = true)]
async fn test_welcome_timeout_seeds_generic() {
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(NeverLessons),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );

    let started = tokio::time::Instant::now();
    assert!(h.handle.open().await.unwrap().is_empty());

    let event = wait_for(&mut h.events, |e| matches!(e, ChatEvent::MessageAdded { .. })).await;
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(
        event,
        ChatEvent::MessageAdded {
            index: 0,
            message: Message::assistant(replies::GENERIC_WELCOME),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_late_lesson_replaces_generic_welcome() {
    let store = Arc::new(MemoryStore::new());
    let gate = Arc::new(Notify::new());
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons {
            lesson: Some(derivatives()),
            gate: Some(gate.clone()),
        }),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        store.clone(),
    );

    assert!(h.handle.open().await.unwrap().is_empty());
    let seeded = wait_for(&mut h.events, |e| matches!(e, ChatEvent::MessageAdded { .. })).await;
    assert_eq!(
        seeded,
        ChatEvent::MessageAdded {
            index: 0,
            message: Message::assistant(replies::GENERIC_WELCOME),
        }
    );

    gate.notify_one();
    let updated = wait_for(&mut h.events, |e| matches!(e, ChatEvent::MessageUpdated { .. })).await;
    let ChatEvent::MessageUpdated { index, message } = updated else {
        unreachable!()
    };
    assert_eq!(index, 0);
    assert!(message.text.contains("Derivatives"));

    h.handle
        .send("explain the quadratic formula please")
        .await
        .unwrap();
    let before = h.handle.snapshot().await.unwrap().messages;
    assert_eq!(before.len(), 3);
    assert_eq!(stored(&store, "lesson:42").unwrap(), before);

    let mut reloaded = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        store,
    );
    assert_eq!(open_resolved(&mut reloaded).await, before);
}

#[tokio::test(start_paused = true)]
async fn test_failed_lesson_keeps_generic_welcome() {
    let gate = Arc::new(Notify::new());
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons {
            lesson: None,
            gate: Some(gate.clone()),
        }),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );

    h.handle.open().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::MessageAdded { .. })).await;
    gate.notify_one();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::LessonResolved { .. })).await;

    let messages = h.handle.snapshot().await.unwrap().messages;
    assert_eq!(messages, vec![Message::assistant(replies::GENERIC_WELCOME)]);
}

// ========================================================================
// Sending
// ========================================================================

#[tokio::test]
async fn test_greeting_answered_locally() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;

    let reply = h.handle.send("hello").await.unwrap();
    assert_eq!(reply.sender, Sender::Assistant);
    assert!(reply.text.contains("**Derivatives**"));
    assert!(h.gateway.requests().is_empty());

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.messages.len(), 3);
    assert_eq!(snapshot.messages[1], Message::user("hello"));
    assert_eq!(snapshot.state, ChatState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_greeting_reply_is_delayed() {
    let mut h = start_with(
        ChatOptions::for_lesson("42"),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );
    open_resolved(&mut h).await;

    let started = tokio::time::Instant::now();
    h.handle.send("Good morning!").await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_off_topic_rejected_without_gateway() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;

    let reply = h.handle.send("tell me a joke").await.unwrap();
    assert_eq!(reply.text, replies::REJECTION);
    assert!(h.gateway.requests().is_empty());
    assert_eq!(h.handle.snapshot().await.unwrap().messages.len(), 3);
}

#[tokio::test]
async fn test_related_question_reaches_gateway() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;
    h.gateway.push_reply(Ok("A derivative is a rate of change.".into()));

    let reply = h.handle.send("explain the chain rule").await.unwrap();
    assert_eq!(reply, Message::assistant("A derivative is a rate of change."));

    let requests = h.gateway.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.user_message, "explain the chain rule");
    assert!(request.history.is_empty());
    assert!(request.system.contains("Derivatives"));
    assert!(request.system.contains("The derivative measures how a function changes."));
}

#[tokio::test]
async fn test_history_window_excludes_welcome_and_current() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;

    for n in 1..=4 {
        h.gateway.push_reply(Ok(format!("answer {}", n)));
        h.handle.send(format!("explain topic {}", n)).await.unwrap();
    }
    h.handle.send("explain topic 5").await.unwrap();

    let requests = h.gateway.requests();
    let last = requests.last().unwrap();
    assert_eq!(last.user_message, "explain topic 5");
    assert_eq!(last.history.len(), 6);
    assert_eq!(last.history[0].role, TurnRole::User);
    assert_eq!(last.history[0].content, "explain topic 2");
    assert_eq!(last.history[5].role, TurnRole::Assistant);
    assert_eq!(last.history[5].content, "answer 4");
}

#[tokio::test]
async fn test_gateway_error_becomes_assistant_message() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;
    h.gateway
        .push_reply(Err(TutorError::Upstream("rate limited".into())));

    let reply = h.handle.send("explain limits").await.unwrap();
    assert_eq!(reply.text, "Sorry, I encountered an error: rate limited");
    assert_eq!(h.handle.snapshot().await.unwrap().state, ChatState::Idle);
}

#[tokio::test]
async fn test_missing_api_key_reported_in_chat() {
    let store = Arc::new(MemoryStore::new());
    let services = ChatServices {
        gateway: Arc::new(OpenAiGateway::new(None)),
        vision: Arc::new(MockVision::default()),
        lessons: Arc::new(MockLessons::failing()),
        store,
    };
    let (handle, _events) = ConversationController::spawn(services, fast_options(None));
    handle.open().await.unwrap();

    let reply = handle.send("explain photosynthesis").await.unwrap();
    assert!(reply.text.starts_with(replies::SEND_FAILURE_PREFIX));
    assert!(reply.text.contains("API key is not configured"));
}

#[tokio::test]
async fn test_send_guards() {
    let mut h = start_lesson();

    assert!(matches!(
        h.handle.send("explain limits").await,
        Err(TutorError::NotOpen)
    ));

    open_resolved(&mut h).await;
    assert!(matches!(
        h.handle.send("   ").await,
        Err(TutorError::Validation(_))
    ));
    assert_eq!(h.handle.snapshot().await.unwrap().messages.len(), 1);
}

#[tokio::test]
async fn test_busy_while_reply_pending() {
    let gate = Arc::new(Notify::new());
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::gated(gate.clone())),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );
    open_resolved(&mut h).await;

    let pending = {
        let handle = h.handle.clone();
        tokio::spawn(async move { handle.send("explain derivatives").await })
    };
    wait_for(&mut h.events, |e| {
        matches!(e, ChatEvent::StateChanged(ChatState::Loading))
    })
    .await;

    assert!(matches!(
        h.handle.send("explain limits").await,
        Err(TutorError::Busy)
    ));
    assert!(matches!(
        h.handle.upload_image(png(10), "").await,
        Err(TutorError::Busy)
    ));
    assert!(matches!(
        h.handle.delete_message(0).await,
        Err(TutorError::Busy)
    ));

    gate.notify_one();
    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply.sender, Sender::Assistant);
    assert_eq!(h.gateway.requests().len(), 1);
    assert_eq!(h.handle.snapshot().await.unwrap().state, ChatState::Idle);
}

#[tokio::test]
async fn test_reply_applied_after_close() {
    let gate = Arc::new(Notify::new());
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::gated(gate.clone())),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );
    open_resolved(&mut h).await;

    let pending = {
        let handle = h.handle.clone();
        tokio::spawn(async move { handle.send("explain derivatives").await })
    };
    wait_for(&mut h.events, |e| {
        matches!(e, ChatEvent::StateChanged(ChatState::Loading))
    })
    .await;

    h.handle.close().await.unwrap();
    gate.notify_one();
    pending.await.unwrap().unwrap();

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ChatState::Closed);
    assert_eq!(snapshot.messages.len(), 3);
    assert_eq!(stored(&h.store, "lesson:42").unwrap().len(), 3);
}

#[tokio::test]
async fn test_reply_applied_after_clear() {
    let gate = Arc::new(Notify::new());
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::gated(gate.clone())),
        Arc::new(MockVision::default()),
        Arc::new(MemoryStore::new()),
    );
    open_resolved(&mut h).await;
    h.gateway.push_reply(Ok("Late answer.".into()));

    let pending = {
        let handle = h.handle.clone();
        tokio::spawn(async move { handle.send("explain derivatives").await })
    };
    wait_for(&mut h.events, |e| {
        matches!(e, ChatEvent::StateChanged(ChatState::Loading))
    })
    .await;

    h.handle.clear_all().await.unwrap();
    gate.notify_one();
    pending.await.unwrap().unwrap();

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ChatState::Idle);
    assert_eq!(snapshot.messages.len(), 2);
    assert!(snapshot.messages[0].text.contains("Derivatives"));
    assert_eq!(snapshot.messages[1], Message::assistant("Late answer."));
    assert_eq!(stored(&h.store, "lesson:42").unwrap(), snapshot.messages);
}

// ========================================================================
// Delete, clear, close
// ========================================================================

#[tokio::test]
async fn test_delete_message() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;
    h.handle.send("hello").await.unwrap();

    assert!(matches!(
        h.handle.delete_message(9).await,
        Err(TutorError::Validation(_))
    ));

    let removed = h.handle.delete_message(1).await.unwrap();
    assert_eq!(removed, Message::user("hello"));
    wait_for(&mut h.events, |e| *e == ChatEvent::MessageRemoved { index: 1 }).await;

    let messages = h.handle.snapshot().await.unwrap().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(stored(&h.store, "lesson:42").unwrap(), messages);
}

#[tokio::test]
async fn test_clear_all_reseeds_welcome() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;
    h.handle.send("explain limits").await.unwrap();

    h.handle.clear_all().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::HistoryCleared).await;

    let messages = h.handle.snapshot().await.unwrap().messages;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].text.contains("Derivatives"));
    assert_eq!(stored(&h.store, "lesson:42").unwrap(), messages);
}

#[tokio::test]
async fn test_clear_requires_open() {
    let h = start_lesson();
    assert!(matches!(h.handle.clear_all().await, Err(TutorError::NotOpen)));
}

#[tokio::test]
async fn test_close_and_reopen_keeps_conversation() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;
    h.handle.send("hello").await.unwrap();

    h.handle.close().await.unwrap();
    let closed = h.handle.snapshot().await.unwrap().state;
    assert_eq!(closed, ChatState::Closed);
    assert!(!closed.is_open());

    let reopened = h.handle.open().await.unwrap();
    assert_eq!(reopened.len(), 3);
    assert_eq!(h.handle.snapshot().await.unwrap().state, ChatState::Idle);
}

// ========================================================================
// Persistence
// ========================================================================

#[tokio::test]
async fn test_conversation_restored_by_new_controller() {
    let store = Arc::new(MemoryStore::new());
    let mut first = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        store.clone(),
    );
    open_resolved(&mut first).await;
    first.handle.send("explain limits").await.unwrap();
    let before = first.handle.snapshot().await.unwrap().messages;

    let mut second = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        store,
    );
    let restored = open_resolved(&mut second).await;
    assert_eq!(restored, before);
}

#[tokio::test]
async fn test_stale_conversation_discarded() {
    let store = Arc::new(MemoryStore::new());
    let stale = vec![
        Message::assistant("Welcome to **Photosynthesis**."),
        Message::user("what is chlorophyll"),
    ];
    store
        .set(
            "tutor_chat:lesson:42",
            &serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::default()),
        store,
    );

    // Whether the lesson lands before or after opening, the stale entry goes.
    h.handle.open().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::LessonResolved { .. })).await;

    let messages = h.handle.snapshot().await.unwrap().messages;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].text.contains("Derivatives"));
    assert_eq!(stored(&h.store, "lesson:42").unwrap(), messages);
}

// ========================================================================
// Image upload
// ========================================================================

#[tokio::test]
async fn test_upload_image_success() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;

    let reply = h
        .handle
        .upload_image(png(16), "  how do I solve this?  ")
        .await
        .unwrap();
    assert_eq!(reply.text, "The first step is to isolate x.");
    assert_eq!(reply.confidence.as_deref(), Some("high"));
    assert_eq!(reply.image_url.as_deref(), Some("/uploads/homework.png"));
    assert_eq!(
        h.vision.messages.lock().unwrap().clone(),
        vec!["how do I solve this?".to_string()]
    );

    let messages = h.handle.snapshot().await.unwrap().messages;
    assert_eq!(messages.len(), 3);
    let upload = &messages[1];
    assert!(upload.is_user());
    assert_eq!(upload.text, "how do I solve this?");
    assert_eq!(upload.image_file_name.as_deref(), Some("homework.png"));
    assert!(upload
        .image
        .as_deref()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_upload_rejects_invalid_file() {
    let mut h = start_lesson();
    open_resolved(&mut h).await;

    let pdf = ImageFile::new("notes.pdf", "application/pdf", vec![0; 10]);
    let err = h.handle.upload_image(pdf, "").await.unwrap_err();
    assert!(matches!(err, TutorError::Validation(_)));

    let alert = wait_for(&mut h.events, |e| matches!(e, ChatEvent::Alert(_))).await;
    assert_eq!(alert, ChatEvent::Alert(err.to_string()));
    assert!(h.vision.messages.lock().unwrap().is_empty());

    let oversized = png(6 * 1024 * 1024);
    assert!(h.handle.upload_image(oversized, "").await.is_err());
    assert_eq!(h.handle.snapshot().await.unwrap().messages.len(), 1);
}

#[tokio::test]
async fn test_upload_failure_becomes_assistant_message() {
    let mut h = start_with(
        fast_options(Some("42")),
        Arc::new(MockLessons::ready(derivatives())),
        Arc::new(MockGateway::default()),
        Arc::new(MockVision::failing("Invalid image")),
        Arc::new(MemoryStore::new()),
    );
    open_resolved(&mut h).await;

    let reply = h.handle.upload_image(png(16), "").await.unwrap();
    assert_eq!(reply.text, "Sorry, I couldn't analyze the image: Invalid image");

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ChatState::Idle);
    assert_eq!(snapshot.messages.len(), 3);
}

#[tokio::test]
async fn test_controller_ignores_dropped_event_stream() {
    let h = start_lesson();
    let Harness { handle, events, .. } = h;
    drop(events);

    handle.open().await.unwrap();
    assert_eq!(handle.send("hello").await.unwrap().sender, Sender::Assistant);
}
