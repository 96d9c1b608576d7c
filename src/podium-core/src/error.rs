//! Error types for the debate playback system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed stream payload. Recovered locally: the offending line is
    /// dropped and the stream continues.
    #[error("Malformed stream payload: {0}")]
    StreamParse(String),

    /// The debate stream connection failed. Turns already closed before the
    /// failure remain valid.
    #[error("Debate stream transport failure: {0}")]
    StreamTransport(String),

    /// The speech service answered with a non-success status.
    #[error("Speech service returned status {status}")]
    SynthesisService { status: u16 },

    /// The speech service request itself could not be completed.
    #[error("Speech service request failed: {0}")]
    SynthesisTransport(String),

    /// The synthesized payload could not be decoded into playable audio.
    #[error("Could not decode synthesized audio: {0}")]
    SynthesisDecode(String),

    /// The operation was cancelled. Expected outcome of a user action, not
    /// reported as a failure.
    #[error("Operation cancelled")]
    Cancelled,

    /// An index beyond the current job list. Treated as an invariant
    /// violation: logged, and the operation becomes a no-op.
    #[error("Index {index} is out of range")]
    OutOfRange { index: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}
