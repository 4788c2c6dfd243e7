//! Codec trait and implementations for serializing/deserializing frames.
//!
//! The handler never calls `serde_json` directly; it goes through a
//! [`Codec`] so that the frame format can change without touching the
//! room or session layers. [`JsonCodec`] is the only format browsers speak
//! today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec value is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use shoutbox_protocol::{ClientEvent, Codec, JsonCodec, SendMessage};
///
/// let codec = JsonCodec;
/// let event = ClientEvent::SendMessage(SendMessage { text: "hi".into() });
///
/// let bytes = codec.encode(&event).unwrap();
/// assert_eq!(bytes, br#"{"event":"send_message","data":{"text":"hi"}}"#);
///
/// let decoded: ClientEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::ClientEvent;

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<ClientEvent, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_produces_compact_json() {
        let bytes = JsonCodec.encode(&ClientEvent::LeaveRoom).unwrap();
        assert_eq!(bytes, br#"{"event":"leave_room"}"#);
    }
}
