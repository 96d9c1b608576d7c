//! Speech synthesis client and the audio seams it produces.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;
use crate::voice::VoiceId;

/// An exclusively owned playable audio resource.
///
/// Produced by an [`AudioDecoder`], consumed by the playback scheduler.
/// `play_from` returns a receiver that resolves when playback reaches the
/// end of the audio; pausing simply leaves the receiver pending.
pub trait AudioHandle: Send {
    fn duration_secs(&self) -> f64;
    fn position_secs(&self) -> f64;
    /// Start (or restart) playback from the given position.
    fn play_from(&mut self, position_secs: f64) -> oneshot::Receiver<()>;
    fn pause(&mut self);
    fn stop(&mut self);
    /// Release the underlying resource. The handle must not be played again.
    fn release(&mut self);
}

/// Turns a raw synthesis payload into a playable handle.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, payload: Bytes) -> Result<Box<dyn AudioHandle>, Error>;
}

/// A speech synthesis backend.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Synthesize `text` with the given voice.
    ///
    /// Makes exactly one network call per invocation. Honors `cancel` by
    /// aborting the in-flight call and returning [`Error::Cancelled`]
    /// without producing a handle.
    async fn synthesize(
        &self,
        text: &str,
        voice: VoiceId,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioHandle>, Error>;
}

/// Request body for the voice synthesis endpoint.
#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    message: &'a str,
    voice: VoiceId,
}

/// HTTP client for the voice synthesis endpoint.
///
/// POSTs `{"message", "voice"}` and decodes the binary audio response
/// through the configured decoder.
pub struct SynthesisClient {
    http: reqwest::Client,
    endpoint: String,
    decoder: Arc<dyn AudioDecoder>,
}

impl SynthesisClient {
    pub fn new(endpoint: impl Into<String>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            decoder,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl SpeechService for SynthesisClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: VoiceId,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioHandle>, Error> {
        let request = self
            .http
            .post(&self.endpoint)
            .json(&SynthesisRequest { message: text, voice })
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = request => result.map_err(|e| Error::SynthesisTransport(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SynthesisService {
                status: status.as_u16(),
            });
        }

        // The body download races the token too; a cancelled session must
        // not keep pulling audio bytes.
        let payload = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            bytes = response.bytes() => {
                bytes.map_err(|e| Error::SynthesisTransport(e.to_string()))?
            }
        };
        debug!(voice = %voice, bytes = payload.len(), "synthesis payload received");

        self.decoder.decode(payload)
    }
}
