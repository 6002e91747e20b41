/// Centralized constants for the tutoring engine.
/// Limits, storage keys and canned replies live here.
/// Never hardcode these values elsewhere.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    /// Default chat model on the OpenAI-compatible endpoint.
    pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

    /// Sampling parameters for every tutoring completion.
    pub const TEMPERATURE: f32 = 0.7;
    pub const MAX_TOKENS: u32 = 1000;
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const CHAT_BASE_URL: &str = "https://api.groq.com/openai";
    pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
    pub const API_BASE_URL: &str = "http://localhost:5000/api";
    pub const VISION_ANALYZE_PATH: &str = "/chat/analyze-image";
    pub const API_KEY_ENV: &str = "TUTOR_LLM_API_KEY";
}

// ─── Resource Limits ──────────────────────────────────────────────────────────

pub mod limits {
    /// Lesson content budget (characters) inside the system prompt.
    pub const MAX_LESSON_CONTENT_CHARS: usize = 8000;
    /// Prior turns forwarded to the model.
    pub const HISTORY_WINDOW: usize = 6;
    /// Uploads above this size are rejected before any network call.
    pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
    pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
        "image/jpeg",
        "image/jpg",
        "image/png",
        "image/gif",
        "image/webp",
    ];
    /// Messages longer than this count as substantive for relevance checks.
    pub const SUBSTANTIVE_MESSAGE_CHARS: usize = 20;
    /// Title words must be longer than this to count as a topical match.
    pub const MIN_TITLE_WORD_CHARS: usize = 3;
    pub const GREETING_DELAY_MS: u64 = 500;
    pub const WELCOME_TIMEOUT_MS: u64 = 3000;
}

// ─── Storage ──────────────────────────────────────────────────────────────────

pub mod storage {
    pub const CONFIG_DIR: &str = "tutorly";
    pub const CONFIG_FILE: &str = "config.toml";
    pub const STORE_DIR: &str = "chat_store";
    pub const CONVERSATION_KEY_PREFIX: &str = "tutor_chat:";
    pub const ANONYMOUS_SESSION_KEY: &str = "tutor_chat_session_id";
    pub const LESSON_SESSION_PREFIX: &str = "lesson:";
}

// ─── Canned replies ───────────────────────────────────────────────────────────

pub mod replies {
    pub const REJECTION: &str = "I'm here to help only with questions about this lesson. \
Please ask me something related to the topic you're studying!";

    pub const GENERIC_WELCOME: &str = "Hello! I'm your AI tutor. \
Ask me anything about your lesson and I'll help you understand it step by step.";

    pub const GENERIC_GREETING: &str = "Hello! 👋 How can I help you with your studies today?";

    pub const SEND_FAILURE_PREFIX: &str = "Sorry, I encountered an error: ";
    pub const IMAGE_FAILURE_PREFIX: &str = "Sorry, I couldn't analyze the image: ";
    pub const TRUNCATION_MARKER: &str = "\n\n... [content truncated]";
}
