//! Playback scheduling for synthesized debate turns.
//!
//! A single task owns the queue, the cursor, and the active audio handle.
//! Commands arrive over an mpsc channel, look-ahead synthesis tasks report
//! back over an event channel, and observable state is published through a
//! watch channel on every transition. Synthesis calls may complete out of
//! order; playback starts strictly in queue order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::queue::{JobState, PlaybackQueue, SynthesisJob};
use crate::synth::{AudioHandle, SpeechService};

/// How many not-yet-ready jobs are synthesized ahead of the one playing.
pub const DEFAULT_LOOK_AHEAD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    /// Terminal for the session; a new `start` begins a fresh queue.
    Cancelled,
    Finished,
}

/// Snapshot published on every state transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchedulerState {
    pub phase: Phase,
    /// Turn index of the job under the cursor, if any.
    pub current_turn_index: Option<usize>,
    pub is_loading: bool,
    pub is_synthesizing: bool,
}

enum Command {
    Start(Vec<SynthesisJob>),
    Pause,
    Resume,
    Cancel,
}

/// Completion report from a spawned synthesis task.
struct SynthDone {
    generation: u64,
    position: usize,
    result: Result<Box<dyn AudioHandle>, Error>,
}

/// Drives the scheduler task. Cheap to clone; dropping the last handle
/// stops the task and releases everything it owns.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SchedulerState>,
}

impl SchedulerHandle {
    pub fn start(&self, jobs: Vec<SynthesisJob>) {
        let _ = self.commands.send(Command::Start(jobs));
    }

    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause);
    }

    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> SchedulerState {
        self.state.borrow().clone()
    }
}

pub struct PlaybackScheduler;

impl PlaybackScheduler {
    /// Spawn the scheduler task and return a handle to it.
    pub fn spawn(service: Arc<dyn SpeechService>, look_ahead: usize) -> SchedulerHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SchedulerState::default());
        let inner = Inner {
            service,
            look_ahead: look_ahead.max(1),
            queue: PlaybackQueue::new(),
            phase: Phase::Idle,
            generation: 0,
            session: CancellationToken::new(),
            event_tx,
            state_tx,
            active: None,
        };
        tokio::spawn(inner.run(cmd_rx, event_rx));
        SchedulerHandle {
            commands: cmd_tx,
            state: state_rx,
        }
    }
}

struct Inner {
    service: Arc<dyn SpeechService>,
    look_ahead: usize,
    queue: PlaybackQueue,
    phase: Phase,
    /// Session generation tag. Synthesis completions carrying a stale
    /// generation are discarded on arrival.
    generation: u64,
    session: CancellationToken,
    event_tx: mpsc::UnboundedSender<SynthDone>,
    state_tx: watch::Sender<SchedulerState>,
    /// The exclusively owned handle currently playing or paused.
    active: Option<Box<dyn AudioHandle>>,
}

/// Await the pending end-of-playback notification.
///
/// Only polled when the option is populated (guarded in the select). A
/// dropped sender counts as ended: the handle is gone either way.
async fn wait_ended(ended: &mut Option<oneshot::Receiver<()>>) {
    if let Some(rx) = ended.as_mut() {
        let _ = rx.await;
    }
}

impl Inner {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<SynthDone>,
    ) {
        let mut ended: Option<oneshot::Receiver<()>> = None;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command, &mut ended),
                    None => break,
                },
                Some(done) = events.recv() => self.on_synthesis_done(done, &mut ended),
                _ = wait_ended(&mut ended), if ended.is_some() => {
                    ended = None;
                    self.on_playback_ended(&mut ended);
                }
            }
            self.publish();
        }
        // All handles to this scheduler are gone; tear the session down.
        self.session.cancel();
        self.release_active();
        self.queue.reset();
    }

    fn on_command(&mut self, command: Command, ended: &mut Option<oneshot::Receiver<()>>) {
        match command {
            Command::Start(jobs) => self.on_start(jobs, ended),
            Command::Pause => self.on_pause(ended),
            Command::Resume => self.on_resume(ended),
            Command::Cancel => self.on_cancel(ended),
        }
    }

    fn on_start(&mut self, jobs: Vec<SynthesisJob>, ended: &mut Option<oneshot::Receiver<()>>) {
        if !matches!(self.phase, Phase::Idle | Phase::Cancelled | Phase::Finished) {
            warn!(phase = ?self.phase, "start ignored while a session is active");
            return;
        }
        // Fresh generation: anything still in flight from the previous
        // session is invalidated and discarded on arrival.
        self.generation += 1;
        self.session = CancellationToken::new();
        self.queue.reset();
        self.release_active();
        *ended = None;

        if jobs.is_empty() {
            self.phase = Phase::Finished;
            return;
        }
        self.queue.enqueue(jobs);
        self.phase = Phase::Loading;
        debug!(generation = self.generation, jobs = self.queue.len(), "playback session started");
        self.ensure_look_ahead();
    }

    fn on_pause(&mut self, ended: &mut Option<oneshot::Receiver<()>>) {
        match self.phase {
            Phase::Playing => {
                if let Some(handle) = self.active.as_mut() {
                    self.queue.cursor_mut().playback_position_secs = handle.position_secs();
                    handle.pause();
                }
                // Drop the receiver so a racing end notification can't fire
                // while paused. Look-ahead synthesis keeps running.
                *ended = None;
                self.queue.cursor_mut().is_paused = true;
                self.phase = Phase::Paused;
            }
            Phase::Loading => {
                // Nothing audible yet; remember the pause so promotion waits.
                self.queue.cursor_mut().is_paused = true;
                self.phase = Phase::Paused;
            }
            // Pausing twice, or while idle/cancelled/finished, is a no-op.
            _ => {}
        }
    }

    fn on_resume(&mut self, ended: &mut Option<oneshot::Receiver<()>>) {
        if self.phase != Phase::Paused {
            return;
        }
        self.queue.cursor_mut().is_paused = false;
        if let Some(handle) = self.active.as_mut() {
            let from = self.queue.cursor().playback_position_secs;
            *ended = Some(handle.play_from(from));
            self.phase = Phase::Playing;
            debug!(from, "playback resumed");
        } else {
            // The handle never materialized (paused during Loading).
            self.phase = Phase::Loading;
            self.try_promote(ended);
        }
    }

    fn on_cancel(&mut self, ended: &mut Option<oneshot::Receiver<()>>) {
        if self.phase == Phase::Cancelled {
            return;
        }
        self.session.cancel();
        *ended = None;
        self.release_active();
        self.queue.reset();
        self.queue.cursor_mut().is_cancelled = true;
        self.phase = Phase::Cancelled;
        debug!(generation = self.generation, "playback session cancelled");
    }

    fn on_synthesis_done(&mut self, done: SynthDone, ended: &mut Option<oneshot::Receiver<()>>) {
        let stale = done.generation != self.generation
            || matches!(self.phase, Phase::Idle | Phase::Cancelled | Phase::Finished);
        if stale {
            // Late arrival from an invalidated session: release and drop.
            if let Ok(mut handle) = done.result {
                handle.release();
            }
            return;
        }
        let Some(job) = self.queue.job_at_mut(done.position) else {
            error!(position = done.position, "synthesis completion for unknown job");
            return;
        };
        match done.result {
            Ok(handle) => {
                debug!(turn = job.turn_index, "synthesis ready");
                job.state = JobState::Ready(handle);
            }
            Err(err) => {
                warn!(turn = job.turn_index, error = %err, "synthesis failed; job will be skipped");
                job.state = JobState::Failed;
            }
        }
        // Only the job under the cursor can affect playback right now;
        // look-ahead completions just park their result.
        if self.phase == Phase::Loading && done.position == self.queue.cursor().current {
            self.try_promote(ended);
        }
    }

    fn on_playback_ended(&mut self, ended: &mut Option<oneshot::Receiver<()>>) {
        if self.phase != Phase::Playing {
            return;
        }
        self.release_active();
        if let Err(err) = self.queue.advance() {
            error!(error = %err, "playback ended with the cursor past the queue");
            self.phase = Phase::Finished;
            return;
        }
        self.try_promote(ended);
    }

    /// Drive the job under the cursor towards playback, skipping failed
    /// jobs, until something plays, something is still synthesizing, or
    /// the queue runs out.
    fn try_promote(&mut self, ended: &mut Option<oneshot::Receiver<()>>) {
        loop {
            if self.queue.is_exhausted() {
                self.phase = Phase::Finished;
                return;
            }
            let position = self.queue.cursor().current;
            let state = match self.queue.job_at_mut(position) {
                Some(job) => std::mem::replace(&mut job.state, JobState::Done),
                None => {
                    error!(position, "cursor points past the job list");
                    return;
                }
            };
            match state {
                JobState::Ready(mut handle) => {
                    let from = self.queue.cursor().playback_position_secs;
                    *ended = Some(handle.play_from(from));
                    self.active = Some(handle);
                    self.phase = Phase::Playing;
                    debug!(position, from, "playback started");
                    self.ensure_look_ahead();
                    return;
                }
                JobState::Failed => {
                    // Already marked Done: skipped, but attempted.
                    warn!(position, "skipping failed job");
                    if let Err(err) = self.queue.advance() {
                        error!(error = %err, "skip past queue end");
                        self.phase = Phase::Finished;
                        return;
                    }
                    self.ensure_look_ahead();
                }
                waiting @ (JobState::Pending | JobState::Synthesizing) => {
                    if let Some(job) = self.queue.job_at_mut(position) {
                        job.state = waiting;
                    }
                    self.phase = Phase::Loading;
                    self.ensure_look_ahead();
                    return;
                }
                JobState::Done => {
                    error!(position, "cursor on an already-consumed job");
                    if self.queue.advance().is_err() {
                        self.phase = Phase::Finished;
                        return;
                    }
                }
            }
        }
    }

    /// Schedule synthesis for the current job and the next `look_ahead`
    /// pending ones. Each task carries a session-scoped child token and
    /// reports back tagged with the current generation.
    fn ensure_look_ahead(&mut self) {
        let from = self.queue.cursor().current;
        let to = (from + self.look_ahead + 1).min(self.queue.len());
        for position in from..to {
            let Some(job) = self.queue.job_at_mut(position) else {
                continue;
            };
            if !matches!(job.state, JobState::Pending) {
                continue;
            }
            job.state = JobState::Synthesizing;
            let text = job.text.clone();
            let voice = job.voice;
            let token = self.session.child_token();
            let generation = self.generation;
            let service = Arc::clone(&self.service);
            let events = self.event_tx.clone();
            tokio::spawn(async move {
                let result = service.synthesize(&text, voice, &token).await;
                let _ = events.send(SynthDone {
                    generation,
                    position,
                    result,
                });
            });
        }
    }

    fn release_active(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.stop();
            handle.release();
        }
    }

    fn publish(&self) {
        let state = SchedulerState {
            phase: self.phase,
            current_turn_index: self.queue.current().map(|job| job.turn_index),
            is_loading: self.phase == Phase::Loading,
            is_synthesizing: self.queue.is_synthesizing(),
        };
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}
