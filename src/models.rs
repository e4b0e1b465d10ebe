//! Data models for listener jobs.
//!
//! These structs are the protobuf messages exchanged with the command server.
//! Field tags are part of the wire contract and must not be renumbered.
//! They also derive serde so a console can receive them as JSON.

use serde::{Deserialize, Serialize};

/// Kind of network listener a job runs.
///
/// Includes `Unknown` variant for forward-compatibility with new listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    Mtls,
    Http,
    Https,
    Dns,
    /// Forward-compatible fallback for unknown listeners
    #[serde(other)]
    Unknown,
}

impl ListenerKind {
    /// Get a short display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Mtls => "mTLS",
            ListenerKind::Http => "HTTP",
            ListenerKind::Https => "HTTPS",
            ListenerKind::Dns => "DNS",
            ListenerKind::Unknown => "Unknown",
        }
    }

    /// Parse the job name the server assigns to a listener.
    pub fn from_job_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "mtls" => ListenerKind::Mtls,
            "http" => ListenerKind::Http,
            "https" => ListenerKind::Https,
            "dns" => ListenerKind::Dns,
            _ => ListenerKind::Unknown,
        }
    }
}

/// A listener running on the server.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct Job {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    #[serde(default)]
    pub description: String,
    /// Transport protocol, e.g. `tcp` or `udp`.
    #[prost(string, tag = "4")]
    #[serde(default)]
    pub protocol: String,
    #[prost(uint32, tag = "5")]
    #[serde(default)]
    pub port: u32,
    #[prost(string, repeated, tag = "6")]
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Job {
    pub fn kind(&self) -> ListenerKind {
        ListenerKind::from_job_name(&self.name)
    }

    /// Format the bind target for display (`:8443` or the domain list).
    pub fn endpoint_display(&self) -> String {
        if self.port != 0 {
            format!(":{}", self.port)
        } else if !self.domains.is_empty() {
            self.domains.join(", ")
        } else {
            "-".to_string()
        }
    }
}

/// Snapshot of every active job, in server order.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct Jobs {
    #[prost(message, repeated, tag = "1")]
    #[serde(default)]
    pub active: Vec<Job>,
}

impl Jobs {
    /// First job with the given id, in listing order.
    pub fn find(&self, job_id: u32) -> Option<&Job> {
        self.active.iter().find(|job| job.id == job_id)
    }
}

/// Start an mTLS listener.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct MtlsReq {
    /// Bind address; empty binds every interface.
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub server: String,
    #[prost(uint32, tag = "2")]
    pub lport: u32,
}

#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct Mtls {
    #[prost(uint32, tag = "1")]
    pub job_id: u32,
}

/// Start an HTTP or HTTPS listener.
///
/// Both kinds share this message; `secure` tells them apart.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct HttpReq {
    #[prost(string, tag = "1")]
    pub domain: String,
    #[prost(string, tag = "2")]
    #[serde(default)]
    pub iface: String,
    #[prost(uint32, tag = "3")]
    pub lport: u32,
    #[prost(bool, tag = "4")]
    #[serde(default)]
    pub secure: bool,
    #[prost(string, tag = "5")]
    #[serde(default)]
    pub website: String,
    #[prost(bytes = "vec", tag = "6")]
    #[serde(default)]
    pub cert: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    #[serde(default)]
    pub key: Vec<u8>,
    #[prost(bool, tag = "8")]
    #[serde(default)]
    pub acme: bool,
}

#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct Http {
    #[prost(uint32, tag = "1")]
    pub job_id: u32,
}

/// Start a DNS listener for one or more parent domains.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct DnsReq {
    #[prost(string, repeated, tag = "1")]
    pub domains: Vec<String>,
    #[prost(bool, tag = "2")]
    #[serde(default)]
    pub canaries: bool,
}

#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
pub struct Dns {
    #[prost(uint32, tag = "1")]
    pub job_id: u32,
}
