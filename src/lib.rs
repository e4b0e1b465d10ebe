//! Listener RPC Library
//!
//! Typed client for managing listener jobs on a remote command server:
//!
//! - `envelope` - Envelope codec and message-type discriminators
//! - `transport` - Transport channel boundary and its error type
//! - `rpc` - Envelope dispatcher and request/response multiplexer
//! - `jobs` - Listener management API (list jobs, start listeners)
//! - `models` - Protobuf job and listener messages
//! - `config` - Client settings
//!
//! # Usage
//!
//! ```ignore
//! use listener_rpc::{ClientConfig, EnvelopeMux, JobsService};
//!
//! let config = ClientConfig::default();
//! let mux = EnvelopeMux::bind(to_server, from_server, &config);
//! let service = JobsService::with_config(mux, &config);
//!
//! let job = service.start_https_listener("example.com", "", 443, true).await?;
//! let jobs = service.jobs().await?;
//! ```

pub mod config;
pub mod envelope;
pub mod jobs;
pub mod models;
pub mod rpc;
pub mod transport;

pub use config::ClientConfig;
pub use envelope::{CodecError, Envelope, MsgType};
pub use jobs::{JobsError, JobsService};
pub use models::{Job, Jobs, ListenerKind};
pub use rpc::{EnvelopeMux, RpcDispatcher};
pub use transport::{Transport, TransportError, RPC_REQUEST_CHANNEL};
