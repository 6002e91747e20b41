pub mod chat;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod lesson;
pub mod llm;
pub mod session;
pub mod store;
pub mod vision;

// Re-export key types
pub use chat::{
    ChatEvent, ChatHandle, ChatOptions, ChatServices, ChatSnapshot, ChatState,
    ConversationController, Message, Sender,
};
pub use classifier::MessageClassifier;
pub use config::Settings;
pub use context::{ContextAssembler, HistoryWindower};
pub use error::{Result, TutorError};
pub use lesson::{HttpLessonProvider, LessonContext, LessonProvider};
pub use llm::{ChatGateway, CompletionRequest, OpenAiGateway};
pub use session::SessionKeyResolver;
pub use store::{ConversationStore, FileStore, KeyValueStore, MemoryStore};
pub use vision::{HttpVisionClient, ImageAnalysis, ImageFile, VisionClient};
