//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::RPC_REQUEST_CHANNEL;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings shared by the dispatcher and the envelope multiplexer.
///
/// Hosts typically deserialize this from their own settings file; missing
/// fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport channel carrying RPC envelopes.
    pub channel: String,
    /// Per-request timeout stamped on outgoing envelopes.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel: RPC_REQUEST_CHANNEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Set the request timeout, rounding sub-second parts up to a whole
    /// second so a non-zero timeout never becomes zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let round_up = u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = timeout.as_secs().saturating_add(round_up);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
