use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    /// The push service no longer knows this endpoint (404 / 410).
    #[error("subscription is gone (HTTP {status})")]
    Gone { status: u16 },

    #[error("push service rejected delivery (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("payload encryption failed: {0}")]
    Encryption(String),

    #[error("VAPID signing failed: {0}")]
    Vapid(#[from] jsonwebtoken::errors::Error),

    #[error("invalid VAPID key: {0}")]
    VapidKey(String),
}

impl PushError {
    /// Classify an HTTP status returned by the push service.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 | 410 => PushError::Gone { status },
            _ => PushError::Rejected { status, body },
        }
    }

    /// Whether the subscription should be removed from the registry.
    pub fn is_gone(&self) -> bool {
        matches!(self, PushError::Gone { .. })
    }
}
