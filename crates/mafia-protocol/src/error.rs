//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed. Common causes: malformed JSON, missing
    /// required fields, or an unknown message tag.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded fine but violates protocol rules — e.g. a
    /// game message sent before `Connect`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
