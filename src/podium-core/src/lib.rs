//! Podium Core Library
//!
//! Assembles streamed debate transcripts into turns and schedules their
//! speech synthesis and playback.

pub mod config;
pub mod error;
pub mod normalize;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod stream;
pub mod synth;
pub mod turn;
pub mod voice;

#[cfg(test)]
mod test_support;

pub use config::{default_config, Config};
pub use error::Error;
pub use normalize::{normalize_for_synthesis, strip_speaker_prefix};
pub use queue::{JobState, PlaybackQueue, QueueCursor, SynthesisJob};
pub use scheduler::{Phase, PlaybackScheduler, SchedulerHandle, SchedulerState, DEFAULT_LOOK_AHEAD};
pub use session::{build_jobs, is_speaking_role, SessionController, TurnCallback};
pub use stream::{AgentDescriptor, DebateRequest, DebateStream, DebateStreamClient, RetryPolicy, Stance};
pub use synth::{AudioDecoder, AudioHandle, SpeechService, SynthesisClient};
pub use turn::{Turn, TurnAssembler, TurnEvent};
pub use voice::{SpeakerVoices, VoiceId};
