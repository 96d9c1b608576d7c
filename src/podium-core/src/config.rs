//! TOML configuration for endpoints, voices, and retry behavior.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::stream::RetryPolicy;
use crate::voice::{SpeakerVoices, VoiceId};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_debate_url")]
    pub debate_url: String,
    #[serde(default = "default_synthesis_url")]
    pub synthesis_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Voice for speakers with no explicit assignment.
    #[serde(default = "default_fallback_voice")]
    pub fallback_voice: VoiceId,
    /// How many jobs past the cursor to synthesize ahead of playback.
    #[serde(default = "default_look_ahead")]
    pub look_ahead: usize,
    /// Per-speaker voice assignments, keyed by speaker id.
    #[serde(default)]
    pub speakers: HashMap<String, VoiceId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_debate_url() -> String {
    "http://localhost:8000/api/debate".to_string()
}

fn default_synthesis_url() -> String {
    "http://localhost:8000/api/voicesynth".to_string()
}

fn default_fallback_voice() -> VoiceId {
    VoiceId::Nova
}

fn default_look_ahead() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            debate_url: default_debate_url(),
            synthesis_url: default_synthesis_url(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fallback_voice: default_fallback_voice(),
            look_ahead: default_look_ahead(),
            speakers: HashMap::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: EndpointsConfig::default(),
            audio: AudioConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        debug!(path = %path.display(), "loading config");
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Speaker voice table from the audio section.
    pub fn speaker_voices(&self) -> SpeakerVoices {
        let mut voices = SpeakerVoices::new(self.audio.fallback_voice);
        for (speaker, voice) in &self.audio.speakers {
            voices.assign(speaker, *voice);
        }
        voices
    }

    /// Retry schedule from the retry section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
        }
    }
}

/// Default configuration file contents, written on first run.
pub fn default_config() -> String {
    r#"[endpoints]
debate_url = "http://localhost:8000/api/debate"
synthesis_url = "http://localhost:8000/api/voicesynth"

[audio]
fallback_voice = "nova"
look_ahead = 2

[audio.speakers]
# "Agent 1" = "alloy"
# "Moderator" = "onyx"

[retry]
max_retries = 3
base_delay_ms = 1000
"#
    .to_string()
}
