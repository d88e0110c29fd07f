/// error.rs — Error taxonomy shared by the credential cache, uploader and dispatcher.
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse request: {0}")]
    Parse(String),

    #[error("Invalid webhook signature: {0}")]
    Signature(String),

    #[error("Token refresh failed: status={status} body={body}")]
    Auth { status: u16, body: String },

    #[error("Failed to get message content: {0}")]
    ContentFetch(String),

    #[error("Failed to upload image: detail={detail}")]
    Upload { detail: String },

    #[error("Failed to add image to the album: detail={detail}")]
    MediaItem { detail: String },

    #[error("Deadline exceeded while {phase}")]
    DeadlineExceeded { phase: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn upload(detail: impl Into<String>) -> Self {
        Self::Upload { detail: detail.into() }
    }

    pub fn media_item(detail: impl Into<String>) -> Self {
        Self::MediaItem { detail: detail.into() }
    }

    pub fn deadline(phase: &str) -> Self {
        Self::DeadlineExceeded { phase: phase.to_string() }
    }

    /// HTTP status reported to the webhook caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Parse(_) | BridgeError::Signature(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A failed credential refresh makes every later upload in the batch fail
    /// the same way, so the dispatcher stops at the first one.
    pub fn aborts_batch(&self) -> bool {
        matches!(self, BridgeError::Auth { .. })
    }
}
