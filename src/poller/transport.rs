//! HTTP transport for reads and writes against the telemetry server.
//!
//! The poller and writer only see the [`Transport`] trait, so tests can
//! drive a page session without a server. [`HttpTransport`] is the real
//! implementation on top of a shared `ureq` agent.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Why a read fetch failed. Every variant counts as one failed fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed JSON: {0}")]
    Malformed(String),
}

/// A write that never reached the server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("network error: {0}")]
pub struct PostError(pub String);

/// Read/write access to the telemetry server.
///
/// Implementations must be `Sync`: a poll cycle fetches all sources
/// concurrently from scoped threads sharing one transport.
pub trait Transport: Sync {
    /// `GET` a JSON document, bounded by `timeout`.
    fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError>;

    /// `POST` a form-encoded body and return the HTTP status, whatever it
    /// is. Only failures to reach the server are errors.
    fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16, PostError>;
}

/// [`Transport`] backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// On Windows `localhost` may try IPv6 first and stall the cycle.
fn loopback(url: &str) -> String {
    url.replace("://localhost", "://127.0.0.1")
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let resp = self
            .agent
            .get(&loopback(url))
            .timeout(timeout)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => FetchError::Status(code),
                ureq::Error::Transport(t) => FetchError::Network(t.to_string()),
            })?;

        resp.into_json::<Value>()
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16, PostError> {
        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        match self
            .agent
            .post(&loopback(url))
            .timeout(timeout)
            .send_form(&pairs)
        {
            Ok(resp) => Ok(resp.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(ureq::Error::Transport(t)) => Err(PostError(t.to_string())),
        }
    }
}
