//! Error types for the dialogue orchestrator.
//! Collaborator failures have their own enums so the orchestrator can map each
//! class to its degrade path (text-only mode, fallback sentence, no-op).

use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Responder(#[from] ResponderError),

    #[error(transparent)]
    TaskStore(#[from] TaskStoreError),

    /// The orchestrator event loop has exited.
    #[error("orchestrator is not running")]
    Closed,
}

/// Speech capture failures (engine missing, permission denied).
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("speech capture unavailable: {0}")]
    Unavailable(String),

    #[error("microphone permission denied")]
    PermissionDenied,
}

/// Speech synthesis failures. Treated like successful completion for control flow.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    #[error("speech synthesis failed: {0}")]
    Failed(String),

    #[error("speech synthesis interrupted")]
    Interrupted,
}

/// Remote response generator failures. All of them surface as the fallback sentence.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("responder http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("responder returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed responder reply: {0}")]
    Malformed(String),

    #[error("responder request timed out")]
    Timeout,

    #[error("responder request cancelled")]
    Cancelled,

    #[error("responder not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("task store rejected request: {0}")]
    Rejected(String),
}
