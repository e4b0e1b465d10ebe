//! Transport channel boundary.
//!
//! The transport moves opaque request bytes to the command server and hands
//! back the matching response bytes. How the bytes travel (IPC, socket,
//! in-process channel) is up to the host; this crate only consumes the
//! [`Transport`] trait, and ships [`crate::rpc::EnvelopeMux`] as one
//! implementation over a pair of envelope channels.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::CodecError;

/// Channel name used for every RPC request.
pub const RPC_REQUEST_CHANNEL: &str = "rpc_request";

/// Transport-level failures.
///
/// Surfaced unchanged through the dispatcher and the jobs API.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection to the server is gone.
    #[error("Transport disconnected")]
    Disconnected,

    /// No response arrived in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error instead of a payload.
    #[error("Server error: {0}")]
    Remote(String),

    /// Envelope bytes could not be decoded.
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] CodecError),

    /// The transport does not serve this channel.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// I/O error in the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof => TransportError::Disconnected,
            _ => TransportError::Io(err),
        }
    }
}

/// Single-channel asynchronous request/response primitive.
///
/// Implementations correlate each request with exactly one response. Retry,
/// timeout and ordering policy belong to the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload` on `channel` and wait for the response bytes.
    async fn request(&self, channel: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn request(&self, channel: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        (**self).request(channel, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let timeout_err = TransportError::Timeout(Duration::from_secs(31));
        assert_eq!(timeout_err.to_string(), "Request timed out after 31s");

        let remote_err = TransportError::Remote("port already in use".to_string());
        assert_eq!(remote_err.to_string(), "Server error: port already in use");

        let channel_err = TransportError::UnknownChannel("events".to_string());
        assert_eq!(channel_err.to_string(), "Unknown channel: events");
    }

    #[test]
    fn test_transport_error_from_io() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: TransportError = reset.into();
        assert!(matches!(err, TransportError::Disconnected));

        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: TransportError = eof.into();
        assert!(matches!(err, TransportError::Disconnected));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "other");
        let err: TransportError = other.into();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn test_malformed_wraps_codec_error() {
        let codec_err = crate::envelope::decode(&[0x0f]).unwrap_err();
        let err: TransportError = codec_err.into();
        assert!(err.to_string().starts_with("Malformed envelope: Invalid envelope"));
    }
}
