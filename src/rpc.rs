//! Envelope RPC layer.
//!
//! Requests to the command server travel as protobuf envelopes over a single
//! transport channel:
//!
//! ```text
//! ┌─────────────────┐     rpc_request channel      ┌─────────────────────┐
//! │   JobsService   │  ◄─────────────────────────► │   command server    │
//! │ (RpcDispatcher) │    Envelope{type, data}      │                     │
//! └─────────────────┘                              └─────────────────────┘
//! ```
//!
//! `RpcDispatcher` builds and unwraps envelopes; the transport underneath
//! correlates each request with its response. `EnvelopeMux` is a transport
//! that does this correlation over a pair of in-process envelope channels.
//!
//! # Usage
//!
//! ```ignore
//! use listener_rpc::rpc::{EnvelopeMux, RpcDispatcher};
//! use listener_rpc::{ClientConfig, MsgType};
//!
//! let mux = EnvelopeMux::bind(to_server, from_server, &ClientConfig::default());
//! let rpc = RpcDispatcher::new(mux);
//! let data = rpc.call(MsgType::Jobs, Vec::new()).await?;
//! ```

mod dispatcher;
mod mux;

pub use dispatcher::RpcDispatcher;
pub use mux::EnvelopeMux;
