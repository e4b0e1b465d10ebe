//! Listener management API.
//!
//! `JobsService` lists the jobs running on the command server and starts new
//! listeners. Starting a listener is two sequential round-trips: the create
//! request returns only a job id, and the full [`Job`] is then resolved from
//! a fresh job listing.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::envelope::{self, MsgType};
use crate::models::{Dns, DnsReq, Http, HttpReq, Job, Jobs, Mtls, MtlsReq};
use crate::rpc::RpcDispatcher;
use crate::transport::{Transport, TransportError};

/// Highest valid listener port.
const MAX_PORT: u32 = 65535;

/// Listener management failures.
#[derive(Debug, Error)]
pub enum JobsError {
    /// Port outside 1-65535; nothing was sent to the server.
    #[error("Invalid port number: {0}")]
    InvalidPort(u32),

    /// The transport failed; carried unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The listing succeeded but holds no job with this id.
    #[error("Job {0} not found")]
    JobNotFound(u32),
}

fn validate_port(lport: u32) -> Result<(), JobsError> {
    if (1..=MAX_PORT).contains(&lport) {
        Ok(())
    } else {
        Err(JobsError::InvalidPort(lport))
    }
}

/// Typed job and listener operations on top of an RPC dispatcher.
///
/// Holds no state between calls: every operation asks the server afresh.
///
/// # Example
///
/// ```ignore
/// let service = JobsService::new(transport);
/// let job = service.start_mtls_listener(8888).await?;
/// println!("{} listening on {}", job.kind().as_str(), job.endpoint_display());
/// ```
pub struct JobsService<T> {
    rpc: RpcDispatcher<T>,
}

impl<T: Transport> JobsService<T> {
    pub fn new(transport: T) -> Self {
        Self {
            rpc: RpcDispatcher::new(transport),
        }
    }

    pub fn with_config(transport: T, config: &ClientConfig) -> Self {
        Self {
            rpc: RpcDispatcher::with_config(transport, config),
        }
    }

    pub fn dispatcher(&self) -> &RpcDispatcher<T> {
        &self.rpc
    }

    /// Fetch every active job.
    pub async fn jobs(&self) -> Result<Jobs, JobsError> {
        let data = self.rpc.call(MsgType::Jobs, Vec::new()).await?;
        let jobs: Jobs = envelope::decode_message(&data).map_err(TransportError::from)?;
        debug!(count = jobs.active.len(), "Fetched jobs");
        Ok(jobs)
    }

    /// Find a job by id in a fresh listing.
    ///
    /// If several jobs share the id, the first one listed wins.
    ///
    /// # Errors
    ///
    /// Returns `JobsError::JobNotFound` if the listing has no such job. The
    /// job may not exist, or may not have appeared yet.
    pub async fn job_by_id(&self, job_id: u32) -> Result<Job, JobsError> {
        let jobs = self.jobs().await?;
        jobs.find(job_id)
            .cloned()
            .ok_or(JobsError::JobNotFound(job_id))
    }

    /// Start an mTLS listener on `lport`.
    pub async fn start_mtls_listener(&self, lport: u32) -> Result<Job, JobsError> {
        info!("Starting mTLS listener on port {}", lport);
        validate_port(lport)?;

        let request = MtlsReq {
            lport,
            ..Default::default()
        };
        let mtls: Mtls = self.rpc.call_message(MsgType::Mtls, &request).await?;
        self.resolve_started(mtls.job_id).await
    }

    /// Start a plain HTTP listener.
    pub async fn start_http_listener(
        &self,
        domain: &str,
        website: &str,
        lport: u32,
    ) -> Result<Job, JobsError> {
        info!("Starting HTTP listener for {} on port {}", domain, lport);
        validate_port(lport)?;

        let request = HttpReq {
            domain: domain.to_string(),
            website: website.to_string(),
            lport,
            secure: false,
            ..Default::default()
        };
        let http: Http = self.rpc.call_message(MsgType::Http, &request).await?;
        self.resolve_started(http.job_id).await
    }

    /// Start an HTTPS listener, optionally with an ACME certificate.
    ///
    /// Shares the HTTP message type; `secure` is always set.
    pub async fn start_https_listener(
        &self,
        domain: &str,
        website: &str,
        lport: u32,
        acme: bool,
    ) -> Result<Job, JobsError> {
        info!(
            "Starting HTTPS listener for {} on port {} (acme: {})",
            domain, lport, acme
        );
        validate_port(lport)?;

        let request = HttpReq {
            domain: domain.to_string(),
            website: website.to_string(),
            lport,
            secure: true,
            acme,
            ..Default::default()
        };
        let https: Http = self.rpc.call_message(MsgType::Http, &request).await?;
        self.resolve_started(https.job_id).await
    }

    /// Start a DNS listener for the given parent domains.
    pub async fn start_dns_listener(
        &self,
        domains: &[String],
        canaries: bool,
    ) -> Result<Job, JobsError> {
        info!(
            "Starting DNS listener for {} domain(s) (canaries: {})",
            domains.len(),
            canaries
        );

        let request = DnsReq {
            domains: domains.to_vec(),
            canaries,
        };
        let dns: Dns = self.rpc.call_message(MsgType::Dns, &request).await?;
        self.resolve_started(dns.job_id).await
    }

    async fn resolve_started(&self, job_id: u32) -> Result<Job, JobsError> {
        let job = self.job_by_id(job_id).await?;
        info!(
            job_id = job.id,
            "{} listener running on {}",
            job.kind().as_str(),
            job.endpoint_display()
        );
        Ok(job)
    }
}
