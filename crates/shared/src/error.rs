use thiserror::Error;

/// Terminal outcome of a failed tag operation, as delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("NFC reader not available")]
    Unavailable,
    #[error("another tag operation is already in progress")]
    InProgress,
    #[error("{message}")]
    Invalidated { message: String },
    #[error("NDEF payload size exceeds the tag limit")]
    InvalidPayloadSize,
    #[error("could not decode tag data")]
    DecodeFailed,
}

impl TagError {
    pub fn invalidated(message: impl Into<String>) -> Self {
        Self::Invalidated {
            message: message.into(),
        }
    }
}
