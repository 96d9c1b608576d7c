//! HTTP client for the streaming debate endpoint.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use tracing::warn;

use crate::error::Error;
use crate::voice::VoiceId;

/// Position an agent takes on the debate topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    For,
    Against,
    Undecided,
}

/// One debate participant as sent to the backend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub name: String,
    pub personality: String,
    pub stance: Stance,
    pub voice: VoiceId,
}

/// Request body for the debate endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateRequest {
    pub position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub num_agents: usize,
    pub num_debate_rounds: usize,
    pub agent_details: Vec<AgentDescriptor>,
    pub enable_moderator: bool,
}

/// Raw byte stream of a debate response body.
pub type DebateStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Retry schedule for opening the debate stream.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.saturating_sub(1))
    }
}

struct OpenFailure {
    error: Error,
    transient: bool,
}

/// Statuses worth retrying: rate limiting and server-side failures.
fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Opens the debate stream, retrying transient failures with exponential
/// backoff.
pub struct DebateStreamClient {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl DebateStreamClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// POST the request and hand back the raw response body stream.
    pub async fn open(&self, request: &DebateRequest) -> Result<DebateStream, Error> {
        let mut attempt = 0u32;
        loop {
            match self.try_open(request).await {
                Ok(stream) => return Ok(stream),
                Err(failure) => {
                    attempt += 1;
                    if !failure.transient || attempt > self.retry.max_retries {
                        return Err(failure.error);
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "debate stream open failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn try_open(&self, request: &DebateRequest) -> Result<DebateStream, OpenFailure> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| OpenFailure {
                // Only connection-level failures are worth another try.
                transient: e.is_connect() || e.is_timeout(),
                error: Error::StreamTransport(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenFailure {
                transient: is_transient_status(status),
                error: Error::StreamTransport(format!(
                    "debate endpoint returned status {status}"
                )),
            });
        }

        Ok(Box::pin(response.bytes_stream()))
    }
}
