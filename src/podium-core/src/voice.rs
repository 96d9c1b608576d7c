//! Voice identifiers and per-speaker voice assignment.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// The closed set of voices offered by the speech synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceId {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl VoiceId {
    pub const ALL: [VoiceId; 6] = [
        VoiceId::Alloy,
        VoiceId::Echo,
        VoiceId::Fable,
        VoiceId::Onyx,
        VoiceId::Nova,
        VoiceId::Shimmer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceId::Alloy => "alloy",
            VoiceId::Echo => "echo",
            VoiceId::Fable => "fable",
            VoiceId::Onyx => "onyx",
            VoiceId::Nova => "nova",
            VoiceId::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        VoiceId::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| {
                let available = VoiceId::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                Error::Config(format!("Unknown voice '{s}'. Available voices: {available}"))
            })
    }
}

/// Maps debate speakers to synthesis voices.
///
/// Unknown speakers (typically the moderator, which has no agent entry) get
/// the fallback voice. The substitution is logged, never silent.
#[derive(Debug, Clone)]
pub struct SpeakerVoices {
    assignments: HashMap<String, VoiceId>,
    fallback: VoiceId,
}

impl SpeakerVoices {
    pub fn new(fallback: VoiceId) -> Self {
        Self {
            assignments: HashMap::new(),
            fallback,
        }
    }

    pub fn assign(&mut self, speaker: impl Into<String>, voice: VoiceId) {
        self.assignments.insert(speaker.into(), voice);
    }

    pub fn with_assignment(mut self, speaker: impl Into<String>, voice: VoiceId) -> Self {
        self.assign(speaker, voice);
        self
    }

    pub fn voice_for(&self, speaker: &str) -> VoiceId {
        match self.assignments.get(speaker) {
            Some(voice) => *voice,
            None => {
                warn!(
                    speaker,
                    fallback = %self.fallback,
                    "no voice assigned to speaker, using fallback"
                );
                self.fallback
            }
        }
    }

    pub fn fallback(&self) -> VoiceId {
        self.fallback
    }
}

impl Default for SpeakerVoices {
    fn default() -> Self {
        Self::new(VoiceId::Nova)
    }
}
