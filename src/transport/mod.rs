//! HTTP client for the remote execution service.
//!
//! Every call carries an explicit deadline. Network failures, expired
//! deadlines and non-2xx answers come back as [`CallError`] values; this layer
//! never retries.

pub mod wire;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{BridgeError, CallError};
use crate::models::ExecutionResult;
use crate::utils::{ceil_secs, truncate};
use wire::{ExecuteRequest, ExecuteResponse};

/// Longest slice of an error body kept in a [`CallError::Remote`].
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Anything that can run a code string against the remote runtime.
///
/// The batch runner and dispatcher only need this seam, so tests can swap in
/// a scripted runtime.
pub trait RemoteExecutor {
    /// Run `code` with the given execution budget. Failures are reported in
    /// the returned result, never raised.
    fn execute(&self, code: &str, timeout: Duration) -> ExecutionResult;
}

pub struct HttpTransport {
    client: Client,
    base_url: Url,
    /// Added to the remote's execution budget to form the HTTP deadline
    grace: Duration,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        grace: Duration,
    ) -> Result<Self, BridgeError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(BridgeError::Config(
                "no remote URL configured (set TUNNELRUN_URL or base_url in config.toml)"
                    .to_string(),
            ));
        }
        let base_url = Url::parse(&format!("{trimmed}/"))
            .map_err(|e| BridgeError::Config(format!("invalid remote URL '{trimmed}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BridgeError::Config(format!(
                "remote URL must use http or https, got '{}'",
                base_url.scheme()
            )));
        }

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("tunnelrun/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            grace,
        })
    }

    /// Base URL without the trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    fn url(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Url, CallError> {
        let mut url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| CallError::invalid(format!("bad endpoint '{endpoint}': {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    fn send(&self, request: RequestBuilder, deadline: Duration) -> Result<Response, CallError> {
        let response = request
            .timeout(deadline)
            .send()
            .map_err(|e| map_reqwest_error(e, deadline))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        let body = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("Unknown error").to_string()
        } else {
            truncate(&body, MAX_ERROR_BODY_CHARS)
        };
        Err(CallError::remote(status.as_u16(), body))
    }

    fn decode<T: DeserializeOwned>(response: Response, deadline: Duration) -> Result<T, CallError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| map_reqwest_error(e, deadline))?;
        serde_json::from_str(&body).map_err(|e| {
            CallError::remote(
                status,
                format!(
                    "unreadable response ({e}): {}",
                    truncate(&body, MAX_ERROR_BODY_CHARS)
                ),
            )
        })
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        deadline: Duration,
    ) -> Result<T, CallError> {
        let url = self.url(endpoint, query)?;
        debug!(%url, deadline_ms = deadline.as_millis() as u64, "GET");
        let response = self.send(self.client.get(url), deadline)?;
        Self::decode(response, deadline)
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        deadline: Duration,
    ) -> Result<T, CallError> {
        let url = self.url(endpoint, &[])?;
        debug!(%url, deadline_ms = deadline.as_millis() as u64, "POST");
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.send(request, deadline)?;
        Self::decode(response, deadline)
    }

    /// Start a GET whose body the caller streams.
    pub fn get_stream(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        deadline: Duration,
    ) -> Result<Response, CallError> {
        let url = self.url(endpoint, query)?;
        debug!(%url, deadline_ms = deadline.as_millis() as u64, "GET (stream)");
        self.send(self.client.get(url), deadline)
    }
}

impl RemoteExecutor for HttpTransport {
    fn execute(&self, code: &str, timeout: Duration) -> ExecutionResult {
        let started = Instant::now();
        if code.trim().is_empty() {
            return ExecutionResult::failure(
                CallError::invalid("code must not be empty"),
                started.elapsed(),
            );
        }
        if timeout.is_zero() {
            return ExecutionResult::failure(
                CallError::invalid("timeout must be greater than zero"),
                started.elapsed(),
            );
        }

        let request = ExecuteRequest {
            code,
            timeout: ceil_secs(timeout),
        };
        let deadline = timeout + self.grace;

        match self.post_json::<_, ExecuteResponse>("/execute", Some(&request), deadline) {
            Ok(response) => {
                let result = response.into_result(started.elapsed(), timeout);
                debug!(
                    success = result.success,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "execute finished"
                );
                result
            }
            Err(err) => {
                warn!(error = %err, "execute call failed");
                ExecutionResult::failure(err, started.elapsed())
            }
        }
    }
}

fn map_reqwest_error(err: reqwest::Error, deadline: Duration) -> CallError {
    if err.is_timeout() {
        CallError::timed_out(format!(
            "no response within {:.1}s",
            deadline.as_secs_f64()
        ))
    } else if err.is_connect() {
        CallError::transport(format!("connection failed: {err}"))
    } else {
        CallError::transport(err.to_string())
    }
}
