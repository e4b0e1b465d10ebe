//! Envelope RPC dispatcher.
//!
//! `RpcDispatcher` turns one typed request into one envelope round-trip over
//! a [`Transport`]. It does not retry, time out or reorder; transport failures
//! come back to the caller untouched.

use prost::Message;
use tracing::debug;

use crate::config::ClientConfig;
use crate::envelope::{self, Envelope, MsgType};
use crate::transport::{Transport, TransportError};

/// Sends envelopes over a transport and unwraps the replies.
pub struct RpcDispatcher<T> {
    transport: T,
    channel: String,
}

impl<T: Transport> RpcDispatcher<T> {
    /// Create a dispatcher on the default RPC channel.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, &ClientConfig::default())
    }

    pub fn with_config(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            channel: config.channel.clone(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send an already-encoded payload and return the raw response payload.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged, or
    /// `TransportError::Malformed` if the response is not an envelope.
    pub async fn call(
        &self,
        msg_type: MsgType,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let request = Envelope::new(msg_type, payload);
        debug!(
            msg_type = msg_type.as_u32(),
            bytes = request.data.len(),
            "Dispatching envelope"
        );

        let response_bytes = self
            .transport
            .request(&self.channel, envelope::encode(&request))
            .await?;
        let response = envelope::decode(&response_bytes)?;

        if response.msg_type != request.msg_type {
            debug!(
                sent = request.msg_type,
                received = response.msg_type,
                "Response envelope type differs from request"
            );
        }

        Ok(response.data)
    }

    /// Encode `request`, dispatch it, and decode the reply as `Resp`.
    pub async fn call_message<Req, Resp>(
        &self,
        msg_type: MsgType,
        request: &Req,
    ) -> Result<Resp, TransportError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let data = self.call(msg_type, envelope::encode_message(request)).await?;
        Ok(envelope::decode_message(&data)?)
    }
}
