//! Dialogue context: the last topic, response and command of a session.
//! Single writer (the orchestrator); overwritten after every completed exchange
//! and persisted per user through an injected `ContextStore`.

pub mod store;

use serde::{Deserialize, Serialize};

pub use store::{ContextStore, InMemoryContextStore};

/// Longest response excerpt kept as the anti-repeat anchor.
const EXCERPT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Quote,
    Joke,
    #[default]
    General,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Quote => "quote",
            Topic::Joke => "joke",
            Topic::General => "general",
        }
    }
}

/// Keyword heuristic over the response text. Quote keywords win over joke keywords.
pub fn classify_topic(response: &str) -> Topic {
    let lower = response.to_lowercase();
    if ["quote", "motiv", "inspire"].iter().any(|k| lower.contains(k)) {
        Topic::Quote
    } else if ["joke", "funny", "laugh"].iter().any(|k| lower.contains(k)) {
        Topic::Joke
    } else {
        Topic::General
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextSnapshot {
    pub last_topic: Topic,
    pub last_response_excerpt: String,
    pub last_command_text: String,
    /// Unix seconds; 0 when nothing has been recorded yet.
    pub updated_at: i64,
}

impl ContextSnapshot {
    /// Snapshot for one completed exchange. The topic is always recomputed
    /// from the newest response.
    pub fn from_exchange(command: &str, response: &str) -> Self {
        Self {
            last_topic: classify_topic(response),
            last_response_excerpt: response.chars().take(EXCERPT_MAX_CHARS).collect(),
            last_command_text: command.to_string(),
            updated_at: crate::now_unix(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.updated_at == 0 && self.last_response_excerpt.is_empty()
    }
}
