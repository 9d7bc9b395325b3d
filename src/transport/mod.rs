//! Request issuance abstraction.
//!
//! The sampler only needs to know how long a call took and whether it
//! succeeded. Everything about connections, TLS, pooling and timeouts is the
//! transport's business.

use crate::cancel::CancelToken;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod http;

pub use http::{HttpTransport, HttpTransportConfig};

/// What the sampler keeps from a successful call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseInfo {
    pub status: u16,
    pub body_bytes: usize,
}

/// Stable classification of request failures.
///
/// Used as the deduplication key for failure notices, so two failures with
/// the same kind are considered "the same problem" for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    Status,
    Body,
    InvalidRequest,
    Cancelled,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connect => "connect",
            ErrorKind::Dns => "dns",
            ErrorKind::Tls => "tls",
            ErrorKind::Status => "status",
            ErrorKind::Body => "body",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors returned by a [`Transport`]
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("server answered with HTTP status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Connect(_) => ErrorKind::Connect,
            TransportError::Dns(_) => ErrorKind::Dns,
            TransportError::Tls(_) => ErrorKind::Tls,
            TransportError::Status(_) => ErrorKind::Status,
            TransportError::Body(_) => ErrorKind::Body,
            TransportError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            TransportError::Cancelled => ErrorKind::Cancelled,
            TransportError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Capability to issue one request against an endpoint
///
/// Implementations must honour `cancel`: once it fires, an in-flight call
/// should return [`TransportError::Cancelled`] promptly.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn issue(&self, uri: &Url, cancel: &CancelToken) -> Result<ResponseInfo, TransportError>;

    /// Get transport name for identification
    fn name(&self) -> &'static str;
}
