//! Envelope multiplexer.
//!
//! `EnvelopeMux` implements [`Transport`] on top of one outbound and one
//! inbound envelope channel. Each request gets a fresh correlation id and a
//! oneshot listener; a background task routes inbound envelopes back to the
//! listener with the matching id.
//!
//! ```text
//! request() ──stamp id──► outbound ──────────► server
//!     ▲                                          │
//!     └── oneshot ◄── route_responses ◄─ inbound ┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::envelope::{self, Envelope};
use crate::transport::{Transport, TransportError};

/// Grace period on top of the envelope timeout, so the server's own
/// timeout fires first.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Pending {
    listeners: HashMap<u64, oneshot::Sender<Envelope>>,
    closed: bool,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Correlating transport over a pair of envelope channels.
///
/// Dropping the mux stops its routing task.
pub struct EnvelopeMux {
    outbound: mpsc::Sender<Envelope>,
    pending: SharedPending,
    next_id: AtomicU64,
    channel: String,
    timeout: Duration,
    router: JoinHandle<()>,
}

impl EnvelopeMux {
    /// Bind the mux to its channels and start routing responses.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        outbound: mpsc::Sender<Envelope>,
        inbound: mpsc::Receiver<Envelope>,
        config: &ClientConfig,
    ) -> Self {
        let pending = SharedPending::default();
        let router = tokio::spawn(route_responses(inbound, Arc::clone(&pending)));

        Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            channel: config.channel.clone(),
            timeout: config.timeout(),
            router,
        }
    }

    /// Number of requests waiting for a response.
    pub fn pending(&self) -> usize {
        lock(&self.pending).listeners.len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, id: u64) -> Result<oneshot::Receiver<Envelope>, TransportError> {
        let mut pending = lock(&self.pending);
        if pending.closed {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        pending.listeners.insert(id, tx);
        Ok(rx)
    }
}

impl Drop for EnvelopeMux {
    fn drop(&mut self) {
        self.router.abort();
    }
}

/// Removes a listener on every exit path of a request.
struct ListenerGuard<'a> {
    pending: &'a Mutex<Pending>,
    id: u64,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).listeners.remove(&self.id);
    }
}

#[async_trait]
impl Transport for EnvelopeMux {
    async fn request(&self, channel: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if channel != self.channel {
            return Err(TransportError::UnknownChannel(channel.to_string()));
        }

        let mut request = envelope::decode(&payload)?;
        let id = self.next_id();
        request.id = id;
        request.timeout = i64::try_from(self.timeout.as_nanos()).unwrap_or(i64::MAX);

        let rx = self.register(id)?;
        let _guard = ListenerGuard {
            pending: &self.pending,
            id,
        };

        debug!(id, msg_type = request.msg_type, "Sending envelope");
        self.outbound
            .send(request)
            .await
            .map_err(|_| TransportError::Disconnected)?;

        let wait = self.timeout.saturating_add(TIMEOUT_GRACE);
        let response = match tokio::time::timeout(wait, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(TransportError::Disconnected),
            Err(_) => return Err(TransportError::Timeout(self.timeout)),
        };

        if !response.err.is_empty() {
            return Err(TransportError::Remote(response.err));
        }

        Ok(envelope::encode(&response))
    }
}

/// Route inbound envelopes to their pending listeners until the channel
/// closes, then fail everything still waiting.
async fn route_responses(mut inbound: mpsc::Receiver<Envelope>, pending: SharedPending) {
    while let Some(envelope) = inbound.recv().await {
        if envelope.id == 0 {
            warn!(msg_type = envelope.msg_type, "Dropping envelope without request id");
            continue;
        }

        let listener = lock(&pending).listeners.remove(&envelope.id);
        match listener {
            Some(tx) => {
                // The requester may have given up already.
                let _ = tx.send(envelope);
            }
            None => warn!(id = envelope.id, "No pending request for envelope"),
        }
    }

    debug!("Inbound envelope channel closed");
    let mut pending = lock(&pending);
    pending.closed = true;
    pending.listeners.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MsgType;
    use crate::models::{Dns, DnsReq};
    use pretty_assertions::assert_eq;

    struct Harness {
        mux: Arc<EnvelopeMux>,
        server_rx: mpsc::Receiver<Envelope>,
        server_tx: mpsc::Sender<Envelope>,
    }

    fn harness(config: &ClientConfig) -> Harness {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (in_tx, in_rx) = mpsc::channel(8);
        Harness {
            mux: Arc::new(EnvelopeMux::bind(out_tx, in_rx, config)),
            server_rx: out_rx,
            server_tx: in_tx,
        }
    }

    fn dns_request() -> Vec<u8> {
        envelope::encode(&Envelope::wrap(
            MsgType::Dns,
            &DnsReq {
                domains: vec!["c2.example".to_string()],
                canaries: false,
            },
        ))
    }

    #[tokio::test]
    async fn test_request_is_stamped_and_correlated() {
        let mut h = harness(&ClientConfig::default());

        let mux = Arc::clone(&h.mux);
        let call = tokio::spawn(async move { mux.request("rpc_request", dns_request()).await });

        let sent = h.server_rx.recv().await.unwrap();
        assert_ne!(sent.id, 0);
        assert_eq!(sent.timeout, 30_000_000_000);
        assert_eq!(sent.kind(), Some(MsgType::Dns));

        let mut reply = Envelope::wrap(MsgType::Dns, &Dns { job_id: 5 });
        reply.id = sent.id;
        h.server_tx.send(reply).await.unwrap();

        let bytes = call.await.unwrap().unwrap();
        let response = envelope::decode(&bytes).unwrap();
        let dns: Dns = envelope::decode_message(&response.data).unwrap();
        assert_eq!(dns.job_id, 5);
        assert_eq!(h.mux.pending(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_requests() {
        let mut h = harness(&ClientConfig::default());

        let first = {
            let mux = Arc::clone(&h.mux);
            tokio::spawn(async move { mux.request("rpc_request", dns_request()).await })
        };
        let first_sent = h.server_rx.recv().await.unwrap();

        let second = {
            let mux = Arc::clone(&h.mux);
            tokio::spawn(async move { mux.request("rpc_request", dns_request()).await })
        };
        let second_sent = h.server_rx.recv().await.unwrap();
        assert_ne!(first_sent.id, second_sent.id);

        for (sent, job_id) in [(&second_sent, 2), (&first_sent, 1)] {
            let mut reply = Envelope::wrap(MsgType::Dns, &Dns { job_id });
            reply.id = sent.id;
            h.server_tx.send(reply).await.unwrap();
        }

        let decode_job = |bytes: Vec<u8>| {
            let response = envelope::decode(&bytes).unwrap();
            envelope::decode_message::<Dns>(&response.data).unwrap().job_id
        };
        assert_eq!(decode_job(first.await.unwrap().unwrap()), 1);
        assert_eq!(decode_job(second.await.unwrap().unwrap()), 2);
    }

    #[tokio::test]
    async fn test_remote_error_field() {
        let mut h = harness(&ClientConfig::default());

        let mux = Arc::clone(&h.mux);
        let call = tokio::spawn(async move { mux.request("rpc_request", dns_request()).await });

        let sent = h.server_rx.recv().await.unwrap();
        h.server_tx
            .send(Envelope {
                id: sent.id,
                err: "bind: address already in use".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        match call.await.unwrap() {
            Err(TransportError::Remote(message)) => {
                assert_eq!(message, "bind: address already in use")
            }
            other => panic!("Expected Remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_channel_rejected() {
        let h = harness(&ClientConfig::default());
        let result = h.mux.request("events", dns_request()).await;
        assert!(matches!(result, Err(TransportError::UnknownChannel(name)) if name == "events"));
    }

    #[tokio::test]
    async fn test_malformed_request_rejected() {
        let h = harness(&ClientConfig::default());
        let result = h.mux.request("rpc_request", vec![0x0f]).await;
        assert!(matches!(result, Err(TransportError::Malformed(_))));
        assert_eq!(h.mux.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_listener() {
        let config = ClientConfig::default().with_timeout(Duration::from_secs(2));
        let mut h = harness(&config);

        let mux = Arc::clone(&h.mux);
        let call = tokio::spawn(async move { mux.request("rpc_request", dns_request()).await });

        let sent = h.server_rx.recv().await.unwrap();
        assert_eq!(sent.timeout, 2_000_000_000);

        match call.await.unwrap() {
            Err(TransportError::Timeout(after)) => assert_eq!(after, Duration::from_secs(2)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
        assert_eq!(h.mux.pending(), 0);
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        let config = ClientConfig {
            timeout_secs: u64::MAX,
            ..Default::default()
        };
        let mut h = harness(&config);

        let mux = Arc::clone(&h.mux);
        let call = tokio::spawn(async move { mux.request("rpc_request", dns_request()).await });

        let sent = h.server_rx.recv().await.unwrap();
        assert_eq!(sent.timeout, i64::MAX);

        let mut reply = Envelope::wrap(MsgType::Dns, &Dns { job_id: 4 });
        reply.id = sent.id;
        h.server_tx.send(reply).await.unwrap();

        assert!(call.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_inbound_close_fails_pending_and_later_requests() {
        let Harness {
            mux,
            mut server_rx,
            server_tx,
        } = harness(&ClientConfig::default());

        let call = {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move { mux.request("rpc_request", dns_request()).await })
        };
        server_rx.recv().await.unwrap();
        drop(server_tx);

        assert!(matches!(call.await.unwrap(), Err(TransportError::Disconnected)));

        let later = mux.request("rpc_request", dns_request()).await;
        assert!(matches!(later, Err(TransportError::Disconnected)));
    }

    #[tokio::test]
    async fn test_outbound_closed_is_disconnected() {
        let (out_tx, out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        let mux = EnvelopeMux::bind(out_tx, in_rx, &ClientConfig::default());
        drop(out_rx);

        let result = mux.request("rpc_request", dns_request()).await;
        assert!(matches!(result, Err(TransportError::Disconnected)));
        assert_eq!(mux.pending(), 0);
    }

    #[tokio::test]
    async fn test_unsolicited_envelopes_are_dropped() {
        let mut h = harness(&ClientConfig::default());

        // Neither of these matches a pending request.
        h.server_tx.send(Envelope::default()).await.unwrap();
        h.server_tx
            .send(Envelope {
                id: 999,
                ..Default::default()
            })
            .await
            .unwrap();

        let mux = Arc::clone(&h.mux);
        let call = tokio::spawn(async move { mux.request("rpc_request", dns_request()).await });
        let sent = h.server_rx.recv().await.unwrap();

        let mut reply = Envelope::wrap(MsgType::Dns, &Dns { job_id: 3 });
        reply.id = sent.id;
        h.server_tx.send(reply).await.unwrap();

        assert!(call.await.unwrap().is_ok());
    }
}
