//! HTTP transport backed by `reqwest`.
//!
//! Each call is a plain GET whose body is read to the end, so the measured
//! duration covers the full response and not just the headers.

use super::{ResponseInfo, Transport, TransportError};
use crate::cancel::CancelToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::error::Error as StdError;
use std::time::Duration;
use tracing::debug;

/// Settings for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Whole-request timeout, body included
    pub timeout: Duration,
    /// Treat 4xx and 5xx responses as failures instead of successes
    pub fail_on_error_status: bool,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: crate::defaults::REQUEST_TIMEOUT,
            fail_on_error_status: false,
            user_agent: format!("http-latency-bench/{}", crate::VERSION),
        }
    }
}

pub struct HttpTransport {
    client: Client,
    fail_on_error_status: bool,
}

impl HttpTransport {
    pub fn new(config: &HttpTransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to build HTTP client")?;

        debug!(
            "HTTP transport ready (timeout {:?}, fail on error status: {})",
            config.timeout, config.fail_on_error_status
        );

        Ok(Self {
            client,
            fail_on_error_status: config.fail_on_error_status,
        })
    }

    async fn get(&self, uri: &Url) -> Result<ResponseInfo, TransportError> {
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout(error_chain(&err))
            } else {
                TransportError::Body(error_chain(&err))
            }
        })?;

        if self.fail_on_error_status && (status.is_client_error() || status.is_server_error()) {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(ResponseInfo {
            status: status.as_u16(),
            body_bytes: body.len(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn issue(&self, uri: &Url, cancel: &CancelToken) -> Result<ResponseInfo, TransportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.get(uri) => result,
        }
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}

/// Map a reqwest error to a transport error kind.
///
/// reqwest only exposes a few predicates, so DNS and TLS problems are
/// recognised from the error chain text.
fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    let message = error_chain(&err);
    if err.is_timeout() {
        return TransportError::Timeout(message);
    }
    if err.is_builder() {
        return TransportError::InvalidRequest(message);
    }

    let lowered = message.to_ascii_lowercase();
    if lowered.contains("dns") || lowered.contains("failed to lookup address") {
        return TransportError::Dns(message);
    }
    if lowered.contains("tls") || lowered.contains("ssl") || lowered.contains("certificate") {
        return TransportError::Tls(message);
    }
    if err.is_connect() {
        return TransportError::Connect(message);
    }
    if err.is_body() || err.is_decode() {
        return TransportError::Body(message);
    }

    TransportError::Other(message)
}

/// Render an error together with all of its sources.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Layer(&'static str, Option<Box<Layer>>);

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.1.as_deref().map(|l| l as &(dyn StdError + 'static))
        }
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let err = Layer(
            "error sending request",
            Some(Box::new(Layer("dns error", Some(Box::new(Layer("no such host", None)))))),
        );
        assert_eq!(error_chain(&err), "error sending request: dns error: no such host");
    }

    #[test]
    fn test_default_config() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, crate::defaults::REQUEST_TIMEOUT);
        assert!(!config.fail_on_error_status);
        assert!(config.user_agent.starts_with("http-latency-bench/"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(&HttpTransportConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap();
        let uri = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let err = transport.issue(&uri, &CancelToken::new()).await.unwrap_err();
        assert_ne!(err.kind(), super::super::ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let transport = HttpTransport::new(&HttpTransportConfig::default()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let uri = Url::parse("http://192.0.2.1/").unwrap();
        let err = transport.issue(&uri, &cancel).await.unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }
}
