//! Envelope codec.
//!
//! Every message on the RPC channel travels inside an [`Envelope`]: a
//! message-type discriminator plus an opaque payload. The codec only knows
//! the envelope wrapper; inner messages are encoded and decoded by their own
//! protobuf schema, selected by the caller from the discriminator.
//!
//! # Wire Format
//!
//! ```text
//! Envelope {
//!     id:      uint64  = 1   // correlation id, stamped by the transport
//!     type:    uint32  = 2   // MsgType discriminator
//!     data:    bytes   = 3   // inner message
//!     timeout: int64   = 4   // nanoseconds, stamped by the transport
//!     err:     string  = 5   // set by the server on remote failure
//! }
//! ```

use prost::Message;
use thiserror::Error;

/// Offset of client-facing message types on the server.
const CLIENT_OFFSET: u32 = 10000;

/// Message-type discriminator.
///
/// Values must match the server exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MsgType {
    Jobs = CLIENT_OFFSET + 3,
    Mtls = CLIENT_OFFSET + 6,
    Dns = CLIENT_OFFSET + 7,
    Http = CLIENT_OFFSET + 8,
}

impl MsgType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            v if v == MsgType::Jobs as u32 => Some(MsgType::Jobs),
            v if v == MsgType::Mtls as u32 => Some(MsgType::Mtls),
            v if v == MsgType::Dns as u32 => Some(MsgType::Dns),
            v if v == MsgType::Http as u32 => Some(MsgType::Http),
            _ => None,
        }
    }
}

/// Codec failure while decoding bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a valid envelope.
    #[error("Invalid envelope: {0}")]
    Envelope(#[source] prost::DecodeError),

    /// The envelope payload does not match the expected message schema.
    #[error("Invalid {message} payload: {source}")]
    Payload {
        message: &'static str,
        #[source]
        source: prost::DecodeError,
    },
}

/// Outer wire wrapper for every RPC message.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct Envelope {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint32, tag = "2")]
    pub msg_type: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
    #[prost(int64, tag = "4")]
    pub timeout: i64,
    #[prost(string, tag = "5")]
    pub err: String,
}

impl Envelope {
    /// Wrap an already-encoded payload.
    pub fn new(msg_type: MsgType, data: Vec<u8>) -> Self {
        Self {
            msg_type: msg_type.as_u32(),
            data,
            ..Default::default()
        }
    }

    /// Wrap a typed message, encoding it with its own schema.
    pub fn wrap<M: Message>(msg_type: MsgType, message: &M) -> Self {
        Self::new(msg_type, encode_message(message))
    }

    /// Discriminator as a known message type, if it is one.
    pub fn kind(&self) -> Option<MsgType> {
        MsgType::from_u32(self.msg_type)
    }
}

/// Encode an envelope to bytes.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    envelope.encode_to_vec()
}

/// Decode an envelope from bytes.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    Envelope::decode(bytes).map_err(CodecError::Envelope)
}

/// Encode an inner message.
pub fn encode_message<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

/// Decode an inner message of type `M`.
pub fn decode_message<M: Message + Default>(bytes: &[u8]) -> Result<M, CodecError> {
    M::decode(bytes).map_err(|source| CodecError::Payload {
        message: short_type_name::<M>(),
        source,
    })
}

fn short_type_name<M>() -> &'static str {
    let full = std::any::type_name::<M>();
    full.rsplit("::").next().unwrap_or(full)
}
