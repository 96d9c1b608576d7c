//! Hand-rolled fakes shared by the queue, scheduler, and session tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::synth::{AudioHandle, SpeechService};
use crate::voice::VoiceId;

/// Observable innards of a [`FakeHandle`], shared with the test body.
#[derive(Default)]
pub(crate) struct HandleProbe {
    pub played_from: Vec<f64>,
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
    pub released: bool,
    /// Present while "playing" without auto-end; the test fires it to end
    /// playback.
    pub ended_tx: Option<oneshot::Sender<()>>,
}

pub(crate) type SharedProbe = Arc<Mutex<HandleProbe>>;

pub(crate) struct FakeHandle {
    label: String,
    probe: SharedProbe,
    /// Complete playback immediately on `play_from`.
    auto_end: bool,
    play_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl FakeHandle {
    pub fn new(label: &str, duration: f64, auto_end: bool) -> (Self, SharedProbe) {
        let probe = Arc::new(Mutex::new(HandleProbe {
            duration,
            ..Default::default()
        }));
        (
            Self {
                label: label.to_string(),
                probe: Arc::clone(&probe),
                auto_end,
                play_log: None,
            },
            probe,
        )
    }

    fn with_log(
        label: &str,
        duration: f64,
        auto_end: bool,
        play_log: Arc<Mutex<Vec<String>>>,
    ) -> (Self, SharedProbe) {
        let (mut handle, probe) = Self::new(label, duration, auto_end);
        handle.play_log = Some(play_log);
        (handle, probe)
    }
}

impl AudioHandle for FakeHandle {
    fn duration_secs(&self) -> f64 {
        self.probe.lock().unwrap().duration
    }

    fn position_secs(&self) -> f64 {
        self.probe.lock().unwrap().position
    }

    fn play_from(&mut self, position_secs: f64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if let Some(log) = &self.play_log {
            log.lock().unwrap().push(self.label.clone());
        }
        let mut probe = self.probe.lock().unwrap();
        probe.played_from.push(position_secs);
        probe.paused = false;
        if self.auto_end {
            let _ = tx.send(());
        } else {
            probe.ended_tx = Some(tx);
        }
        rx
    }

    fn pause(&mut self) {
        self.probe.lock().unwrap().paused = true;
    }

    fn stop(&mut self) {
        let mut probe = self.probe.lock().unwrap();
        probe.paused = true;
        probe.ended_tx = None;
    }

    fn release(&mut self) {
        self.probe.lock().unwrap().released = true;
    }
}

/// Scripted behavior of one `synthesize` call, keyed by job text.
pub(crate) enum Script {
    /// Succeed with a handle of the given duration.
    Ready { duration: f64, auto_end: bool },
    /// Succeed once the gate fires, or bail out when the token cancels.
    Gated {
        duration: f64,
        auto_end: bool,
        gate: oneshot::Receiver<()>,
    },
    /// Succeed once the gate fires, never observing the token. Models a
    /// call that completes before it sees the cancellation.
    GatedIgnoringCancel {
        duration: f64,
        auto_end: bool,
        gate: oneshot::Receiver<()>,
    },
    /// Fail with a service error.
    Fail { status: u16 },
}

/// In-memory [`SpeechService`] with scripted per-text behavior.
///
/// Unscripted texts succeed with a one-second auto-ending handle.
pub(crate) struct FakeSpeech {
    scripts: Mutex<HashMap<String, Script>>,
    /// Probes for handles produced so far, keyed by job text.
    pub probes: Mutex<HashMap<String, SharedProbe>>,
    /// Global order in which handles started playing.
    pub play_log: Arc<Mutex<Vec<String>>>,
    /// Texts whose synthesize call observed cancellation.
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            probes: Mutex::new(HashMap::new()),
            play_log: Arc::new(Mutex::new(Vec::new())),
            cancelled: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, text: &str, script: Script) {
        self.scripts.lock().unwrap().insert(text.to_string(), script);
    }

    /// Script a gated success and hand the gate's trigger to the test.
    pub fn script_gated(&self, text: &str, duration: f64, auto_end: bool) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script(
            text,
            Script::Gated {
                duration,
                auto_end,
                gate: rx,
            },
        );
        tx
    }

    /// Script a gated success that ignores cancellation.
    pub fn script_gated_ignoring_cancel(
        &self,
        text: &str,
        duration: f64,
        auto_end: bool,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script(
            text,
            Script::GatedIgnoringCancel {
                duration,
                auto_end,
                gate: rx,
            },
        );
        tx
    }

    pub fn probe(&self, text: &str) -> SharedProbe {
        Arc::clone(
            self.probes
                .lock()
                .unwrap()
                .get(text)
                .unwrap_or_else(|| panic!("no handle synthesized for {text}")),
        )
    }
}

#[async_trait]
impl SpeechService for FakeSpeech {
    async fn synthesize(
        &self,
        text: &str,
        _voice: VoiceId,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioHandle>, Error> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(text)
            .unwrap_or(Script::Ready {
                duration: 1.0,
                auto_end: true,
            });
        let (duration, auto_end) = match script {
            Script::Fail { status } => return Err(Error::SynthesisService { status }),
            Script::Ready { duration, auto_end } => (duration, auto_end),
            Script::Gated {
                duration,
                auto_end,
                gate,
            } => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.cancelled.lock().unwrap().push(text.to_string());
                        return Err(Error::Cancelled);
                    }
                    _ = gate => (duration, auto_end),
                }
            }
            Script::GatedIgnoringCancel {
                duration,
                auto_end,
                gate,
            } => {
                let _ = gate.await;
                (duration, auto_end)
            }
        };
        let (handle, probe) =
            FakeHandle::with_log(text, duration, auto_end, Arc::clone(&self.play_log));
        self.probes.lock().unwrap().insert(text.to_string(), probe);
        Ok(Box::new(handle))
    }
}
