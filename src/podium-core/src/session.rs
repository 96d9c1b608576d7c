//! Session façade tying the turn assembler to the playback scheduler.
//!
//! One controller owns one assembler and one scheduler per debate session.
//! When the debate stream finishes, the controller primes the playback job
//! list; playback itself only ever starts on an explicit user command.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::debug;

use crate::error::Error;
use crate::normalize::normalize_for_synthesis;
use crate::queue::SynthesisJob;
use crate::scheduler::{Phase, PlaybackScheduler, SchedulerHandle, SchedulerState};
use crate::synth::SpeechService;
use crate::turn::{Turn, TurnAssembler, TurnEvent};
use crate::voice::SpeakerVoices;

/// Speaker id carried by raw diagnostic messages in the stream.
pub const SYSTEM_SPEAKER: &str = "system";
/// Speaker id of the human who requested the debate.
pub const USER_SPEAKER: &str = "user";

/// Callback invoked for every assembler event.
pub type TurnCallback = Box<dyn Fn(&TurnEvent) + Send + Sync>;

/// True when a speaker's turns are synthesized and played aloud.
///
/// Debate participants and the moderator speak; the human and raw system
/// diagnostics do not.
pub fn is_speaking_role(speaker_id: &str) -> bool {
    speaker_id != USER_SPEAKER && speaker_id != SYSTEM_SPEAKER
}

/// Build jobs for every speaking turn, in turn order, with normalized text.
pub fn build_jobs(turns: &[Turn], voices: &SpeakerVoices) -> Vec<SynthesisJob> {
    turns
        .iter()
        .enumerate()
        .filter(|(_, turn)| is_speaking_role(&turn.speaker_id))
        .map(|(index, turn)| {
            let text = normalize_for_synthesis(&turn.text, &turn.speaker_id);
            // A turn that was nothing but a prefix still gets spoken as-is.
            let text = if text.is_empty() { turn.text.clone() } else { text };
            SynthesisJob::new(index, text, voices.voice_for(&turn.speaker_id))
        })
        .collect()
}

pub struct SessionController {
    assembler: TurnAssembler,
    scheduler: SchedulerHandle,
    voices: SpeakerVoices,
    /// Turns captured at stream end; playback jobs are rebuilt from these
    /// on every start so a cancelled session can be replayed.
    primed: Vec<Turn>,
    callback: Option<TurnCallback>,
}

impl SessionController {
    pub fn new(service: Arc<dyn SpeechService>, voices: SpeakerVoices, look_ahead: usize) -> Self {
        Self {
            assembler: TurnAssembler::new(),
            scheduler: PlaybackScheduler::spawn(service, look_ahead),
            voices,
            primed: Vec::new(),
            callback: None,
        }
    }

    /// Register a callback for assembler events.
    pub fn with_callback(mut self, callback: TurnCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Feed one raw fragment of the debate stream body.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TurnEvent> {
        let events = self.assembler.feed(chunk);
        for event in &events {
            if let Some(callback) = &self.callback {
                callback(event);
            }
            if matches!(event, TurnEvent::StreamFinished) {
                self.prime();
            }
        }
        events
    }

    fn prime(&mut self) {
        self.primed = self.assembler.turns().to_vec();
        debug!(turns = self.primed.len(), "debate stream finished, playback primed");
    }

    /// Drain the debate response body into the assembler.
    ///
    /// A transport failure surfaces as [`Error::StreamTransport`]; turns
    /// closed before the failure stay available for playback.
    pub async fn consume<S, E>(&mut self, mut stream: S) -> Result<(), Error>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    self.feed(&bytes);
                }
                Err(err) => {
                    self.assembler.abort();
                    self.prime();
                    return Err(Error::StreamTransport(err.to_string()));
                }
            }
        }
        if !self.assembler.is_finished() {
            self.assembler.abort();
            self.prime();
            return Err(Error::StreamTransport(
                "stream ended without completion sentinel".to_string(),
            ));
        }
        Ok(())
    }

    /// Start a fresh playback run over the primed turns.
    pub fn start(&self) {
        self.scheduler.start(build_jobs(&self.primed, &self.voices));
    }

    /// Start playback, or resume it when paused.
    pub fn play(&self) {
        match self.current_state().phase {
            Phase::Paused => self.resume(),
            Phase::Idle | Phase::Cancelled | Phase::Finished => self.start(),
            Phase::Loading | Phase::Playing => {}
        }
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    pub fn cancel(&self) {
        self.scheduler.cancel();
    }

    /// Subscribe to playback state transitions.
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.scheduler.state()
    }

    pub fn current_state(&self) -> SchedulerState {
        self.scheduler.current_state()
    }

    /// Closed turns assembled so far.
    pub fn turns(&self) -> &[Turn] {
        self.assembler.turns()
    }

    pub fn parse_errors(&self) -> usize {
        self.assembler.parse_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSpeech;
    use crate::voice::VoiceId;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn turn(speaker: &str, text: &str) -> Turn {
        Turn {
            speaker_id: speaker.to_string(),
            text: text.to_string(),
            is_final: true,
        }
    }

    #[test]
    fn test_jobs_are_exactly_the_speaking_turns_in_order() {
        let turns = vec![
            turn("Moderator", "Welcome."),
            turn("user", "please debate"),
            turn("Alice", "Opening."),
            turn("system", "[Warning: length]"),
            turn("Bob", "Rebuttal."),
        ];
        let voices = SpeakerVoices::new(VoiceId::Nova)
            .with_assignment("Alice", VoiceId::Fable)
            .with_assignment("Bob", VoiceId::Onyx);
        let jobs = build_jobs(&turns, &voices);
        let indices: Vec<usize> = jobs.iter().map(|j| j.turn_index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert_eq!(jobs[0].voice, VoiceId::Nova); // moderator fallback
        assert_eq!(jobs[1].voice, VoiceId::Fable);
        assert_eq!(jobs[2].voice, VoiceId::Onyx);
    }

    #[test]
    fn test_job_text_is_normalized() {
        let turns = vec![turn("Alice", "As Alice, I  agree.")];
        let jobs = build_jobs(&turns, &SpeakerVoices::default());
        assert_eq!(jobs[0].text, "I agree.");
    }

    fn stream_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"data: {\"speakerId\":\"Alice\",\"text\":\"Hi\"}\n\n");
        bytes.extend_from_slice(b"data: {\"speakerId\":\"Bob\",\"text\":\"Hello\"}\n\n");
        bytes.extend_from_slice(b"data: [DONE]\n\n");
        bytes
    }

    #[tokio::test]
    async fn test_stream_finish_primes_but_does_not_autostart() {
        let fake = FakeSpeech::new();
        let mut controller =
            SessionController::new(fake.clone(), SpeakerVoices::default(), 2);
        controller.feed(&stream_bytes());
        assert_eq!(controller.turns().len(), 2);

        // Nothing may start playing without an explicit command.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(controller.current_state().phase, Phase::Idle);
        assert!(fake.play_log.lock().unwrap().is_empty());

        controller.play();
        let mut state = controller.state();
        timeout(
            Duration::from_secs(5),
            state.wait_for(|s| s.phase == Phase::Finished),
        )
        .await
        .expect("playback never finished")
        .expect("scheduler gone");
        assert_eq!(*fake.play_log.lock().unwrap(), vec!["Hi", "Hello"]);
    }

    #[tokio::test]
    async fn test_consume_surfaces_transport_error_and_keeps_turns() {
        let fake = FakeSpeech::new();
        let mut controller =
            SessionController::new(fake.clone(), SpeakerVoices::default(), 2);
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"speakerId\":\"Alice\",\"text\":\"Hi\"}\n\n",
            )),
            Ok(Bytes::from_static(
                b"data: {\"speakerId\":\"Bob\",\"text\":\"Hel\"}\n\n",
            )),
            Err("connection reset".to_string()),
        ];
        let result = controller.consume(futures_util::stream::iter(chunks)).await;
        assert!(matches!(result, Err(Error::StreamTransport(_))));
        // Both turns survive; the open one was closed with its partial text.
        assert_eq!(controller.turns().len(), 2);
        assert_eq!(controller.turns()[1].text, "Hel");
    }

    #[tokio::test]
    async fn test_consume_without_sentinel_is_transport_error() {
        let fake = FakeSpeech::new();
        let mut controller =
            SessionController::new(fake.clone(), SpeakerVoices::default(), 2);
        let chunks: Vec<Result<Bytes, String>> = vec![Ok(Bytes::from_static(
            b"data: {\"speakerId\":\"Alice\",\"text\":\"Hi\"}\n\n",
        ))];
        let result = controller.consume(futures_util::stream::iter(chunks)).await;
        assert!(matches!(result, Err(Error::StreamTransport(_))));
        assert_eq!(controller.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_callback_sees_stream_events() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc as StdArc;

        let fake = FakeSpeech::new();
        let closed = StdArc::new(AtomicUsize::new(0));
        let seen = StdArc::clone(&closed);
        let mut controller = SessionController::new(fake, SpeakerVoices::default(), 2)
            .with_callback(Box::new(move |event| {
                if matches!(event, TurnEvent::TurnClosed { .. }) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }));
        controller.feed(&stream_bytes());
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}
