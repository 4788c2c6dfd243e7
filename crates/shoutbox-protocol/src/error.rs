//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating protocol
/// values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown event name, or a
    /// payload of the wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value parsed but breaks a protocol rule (for example a room
    /// code that is not six alphanumeric characters).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
