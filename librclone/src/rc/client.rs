//! HTTP client for the daemon's remote-control API.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::RcloneError;
use crate::rc::message::ServerErrorResponse;

/// Sends JSON requests to `http://localhost:<port>` and classifies the
/// answers. Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct RcClient {
    http: reqwest::Client,
    base_url: String,
}

impl RcClient {
    /// Client for a daemon listening on `port`. `timeout` bounds each
    /// round-trip.
    pub fn new(port: u16, timeout: Option<Duration>) -> Result<Self, RcloneError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|source| RcloneError::Transport {
            endpoint: String::new(),
            source,
        })?;
        Ok(Self {
            http,
            base_url: format!("http://localhost:{port}"),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` as JSON to `endpoint` (e.g. `/mount/mount`).
    ///
    /// 2xx is success and the body is ignored; anything else is turned into
    /// an error by [`check_response`].
    #[instrument(skip(self, body))]
    pub async fn post<T>(&self, endpoint: &str, body: &T) -> Result<(), RcloneError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(body).map_err(RcloneError::Encode)?;
        let url = format!("{}{endpoint}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|source| RcloneError::Transport {
                endpoint: endpoint.to_owned(),
                source,
            })?;
        debug!(status = %resp.status(), "rc response received");
        check_response(resp).await
    }
}

/// Classify a daemon response.
pub async fn check_response(resp: reqwest::Response) -> Result<(), RcloneError> {
    let status = resp.status().as_u16();
    if resp.status().is_success() {
        return Ok(());
    }
    // The read error is dropped on purpose: it may quote the body.
    let body = resp
        .bytes()
        .await
        .map_err(|_| RcloneError::UnreadableErrorBody)?;
    Err(parse_error_body(status, &body))
}

/// Turn a non-2xx body into the matching error. The raw body never ends up
/// in the returned error.
pub fn parse_error_body(status: u16, body: &[u8]) -> RcloneError {
    let envelope: ServerErrorResponse = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) => return RcloneError::MalformedErrorBody,
    };
    if envelope.error.is_empty() {
        return RcloneError::EmptyErrorField;
    }
    RcloneError::Server(envelope.with_status(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_is_redacted() {
        let body = br#"{"error":"bad token","path":"config/create","input":{"token":"s3cr3t"},"status":500}"#;
        let err = parse_error_body(500, body);
        let msg = err.to_string();
        assert!(matches!(err, RcloneError::Server(_)));
        assert!(msg.contains("bad token"));
        assert!(msg.contains("config/create"));
        assert!(msg.contains("<redacted>"));
        assert!(msg.contains("500"));
        assert!(!msg.contains("s3cr3t"));
    }

    #[test]
    fn unparsable_body_is_generic() {
        let err = parse_error_body(502, b"upstream said: password=s3cr3t");
        assert!(matches!(err, RcloneError::MalformedErrorBody));
        assert!(!err.to_string().contains("s3cr3t"));
    }

    #[test]
    fn empty_error_field_is_malformed() {
        let err = parse_error_body(500, br#"{"error":"","path":"/x"}"#);
        assert!(matches!(err, RcloneError::EmptyErrorField));

        let err = parse_error_body(500, br#"{"path":"/x"}"#);
        assert!(matches!(err, RcloneError::EmptyErrorField));
    }

    #[test]
    fn base_url_targets_localhost() {
        let client = RcClient::new(5572, None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5572");
    }
}
