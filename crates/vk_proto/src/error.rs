use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Not a recognized fallback message")]
    NotFallback,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
