//! Cheap local gates run before any model call.
//!
//! Both checks are table-driven: the greeting list and the relevance rules
//! are plain data evaluated top-down, so each entry can be tested on its own.

use regex::Regex;
use std::sync::LazyLock;

use crate::constants::limits;
use crate::lesson::LessonContext;

/// Outcome of a relevance rule that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Related,
    NotRelated,
}

pub struct Rule {
    pub name: &'static str,
    pub pattern: Regex,
    pub verdict: Verdict,
}

const GREETINGS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "hii",
    "hiya",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
    "good day",
    "salam",
    "salaam",
    "assalamualaikum",
    "assalamu alaikum",
    "as-salamu alaykum",
    "namaste",
    "namaskar",
    "hola",
    "bonjour",
];

/// Checked in order; the first match decides.
const IRRELEVANT_RULES: &[(&str, &str)] = &[
    (
        "identity",
        r"\b(who are you|what are you|what is your name|what's your name|who (made|created|built) you)\b",
    ),
    ("joke", r"\b(tell me a joke|jokes?|make me laugh|something funny)\b"),
    ("weather", r"\b(weather|forecast|is it raining|temperature outside)\b"),
    (
        "entertainment",
        r"\b(movies?|films?|songs?|music|netflix|celebrit(y|ies)|tv shows?|video games?|cricket match|football match)\b",
    ),
    ("news", r"\b(news|headlines|current events)\b"),
    (
        "politics",
        r"\b(politics|political|elections?|president|prime minister|government|political party)\b",
    ),
    ("age", r"\b(how old are you|your age)\b"),
    ("location", r"\b(where are you|where do you live|where are you from)\b"),
    (
        "relationship",
        r"\b(girlfriend|boyfriend|are you married|do you love me|i love you|date me|crush)\b",
    ),
];

const EDUCATIONAL_KEYWORDS: &[&str] = &[
    "explain",
    "what is",
    "what are",
    "how does",
    "how do",
    "why",
    "formula",
    "example",
    "solve",
    "calculate",
    "definition",
    "define",
    "meaning",
    "difference",
    "compare",
    "topic",
    "concept",
    "theory",
    "equation",
    "prove",
    "derive",
    "summary",
    "summarize",
    "question",
    "answer",
    "exercise",
    "problem",
    "lesson",
    "chapter",
];

pub struct MessageClassifier {
    greetings: Vec<Regex>,
    rules: Vec<Rule>,
}

static DEFAULT: LazyLock<MessageClassifier> = LazyLock::new(MessageClassifier::new);

impl MessageClassifier {
    pub fn new() -> Self {
        let greetings = GREETINGS
            .iter()
            .map(|g| word_pattern(&regex::escape(g)))
            .collect();

        let mut rules: Vec<Rule> = IRRELEVANT_RULES
            .iter()
            .map(|&(name, pattern)| Rule {
                name,
                pattern: case_insensitive(pattern),
                verdict: Verdict::NotRelated,
            })
            .collect();

        let keywords = EDUCATIONAL_KEYWORDS
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        rules.push(Rule {
            name: "educational-keyword",
            pattern: case_insensitive(&format!("({})", keywords)),
            verdict: Verdict::Related,
        });

        Self { greetings, rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Any message containing a greeting word or phrase, case-insensitively.
    ///
    /// Greetings match as whole words so "this" or "which" never count as "hi".
    pub fn is_greeting(&self, text: &str) -> bool {
        let trimmed = text.trim();
        !trimmed.is_empty() && self.greetings.iter().any(|g| g.is_match(trimmed))
    }

    pub fn is_lesson_related(&self, text: &str, lesson: Option<&LessonContext>) -> bool {
        let message = text.trim().to_lowercase();

        let irrelevant = self
            .rules
            .iter()
            .filter(|r| r.verdict == Verdict::NotRelated)
            .find(|r| r.pattern.is_match(&message));
        if let Some(rule) = irrelevant {
            tracing::debug!(rule = rule.name, "Message matched off-topic rule");
            return false;
        }

        let Some(lesson) = lesson else {
            return true;
        };

        let title_match = lesson
            .title
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > limits::MIN_TITLE_WORD_CHARS)
            .any(|w| message.contains(w));
        if title_match {
            return true;
        }

        let keyword_match = self
            .rules
            .iter()
            .any(|r| r.verdict == Verdict::Related && r.pattern.is_match(&message));
        if keyword_match {
            return true;
        }

        // Long messages are assumed substantive.
        message.chars().count() > limits::SUBSTANTIVE_MESSAGE_CHARS
    }
}

impl Default for MessageClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn case_insensitive(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).expect("classifier pattern must compile")
}

fn word_pattern(escaped: &str) -> Regex {
    case_insensitive(&format!(r"(^|[^\p{{L}}\p{{N}}]){}($|[^\p{{L}}\p{{N}}])", escaped))
}

pub fn is_greeting(text: &str) -> bool {
    DEFAULT.is_greeting(text)
}

pub fn is_lesson_related(text: &str, lesson: Option<&LessonContext>) -> bool {
    DEFAULT.is_lesson_related(text, lesson)
}
