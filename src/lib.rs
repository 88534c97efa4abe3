//! Chatpane - terminal chat client
//!
//! A streaming chat client built around a single session controller:
//! - Keeps the conversation transcript and the in-flight loading indicator
//! - Ingests response streams fragment by fragment, dropping stale ones
//! - Lets the user pin assistant answers into a saved-messages panel
//! - Ships a small HTTP endpoint for multipart file uploads

pub mod backend;
pub mod config;
pub mod session;
pub mod tui;
pub mod upload;

pub use backend::{HttpBackend, ResponseBackend, StreamEvent};
pub use config::ChatConfig;
pub use session::{
    Applied, Citation, Generation, IndicatorPhase, IndicatorSequencer, InputRejected, PhaseIcon,
    Role, SavedMessages, SessionController, SessionState, Submission, Transcript, Turn,
    TurnStatus,
};

/// Result type for Chatpane operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur in Chatpane
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Input rejected: {0}")]
    InputRejected(#[from] InputRejected),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Stream failed: {0}")]
    StreamFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
