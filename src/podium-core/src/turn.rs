//! Incremental turn assembly from a streamed debate response.
//!
//! The debate endpoint answers with a server-sent event stream whose payload
//! lines carry `{"speakerId", "text"}` deltas, terminated by a `[DONE]`
//! sentinel. Network fragments arrive with arbitrary boundaries, possibly
//! splitting multi-byte characters or event lines, so undecoded remainders
//! are buffered across calls.

use bytes::BytesMut;
use serde::Deserialize;
use tracing::warn;

/// Marker prefix of SSE payload lines.
const DATA_PREFIX: &str = "data: ";
/// Completion sentinel sent after the last delta.
const DONE_SENTINEL: &str = "[DONE]";

/// One contiguous utterance by a single speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker_id: String,
    pub text: String,
    /// True once the turn is closed. Closed turns never change again.
    pub is_final: bool,
}

/// Events produced while feeding stream fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A new speaker began; `index` is the turn's position in the final list.
    TurnOpened { index: usize, speaker_id: String },
    /// Text was appended to the open turn.
    TurnAppended { index: usize, delta: String },
    /// The turn at `index` closed and will never change again.
    TurnClosed { index: usize },
    /// The completion sentinel arrived; no further deltas will be accepted.
    StreamFinished,
}

/// A single streamed delta as sent on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnDelta {
    speaker_id: String,
    text: String,
}

/// Reconstructs discrete turns from a fragmented event-stream body.
///
/// Invariants: at most one turn is open at a time, closing is irreversible,
/// and the closed-turn order is stable. The final turn list is identical for
/// any fragmentation of the same byte stream.
#[derive(Debug, Default)]
pub struct TurnAssembler {
    buf: BytesMut,
    closed: Vec<Turn>,
    open: Option<Turn>,
    finished: bool,
    parse_errors: usize,
}

impl TurnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw fragment of the response body.
    ///
    /// Complete lines are consumed; the trailing incomplete line (which may
    /// end mid-character) stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        if self.finished {
            if !chunk.is_empty() {
                warn!(bytes = chunk.len(), "ignoring input after stream end");
            }
            return events;
        }
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            match std::str::from_utf8(&line) {
                Ok(text) => self.handle_line(text.trim(), &mut events),
                Err(err) => {
                    self.parse_errors += 1;
                    warn!(error = %err, "dropping non-UTF-8 stream line");
                }
            }
            if self.finished {
                break;
            }
        }
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<TurnEvent>) {
        // Blank separator lines and SSE comments carry nothing.
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            self.close_open(events);
            self.finished = true;
            events.push(TurnEvent::StreamFinished);
            return;
        }
        match serde_json::from_str::<TurnDelta>(payload) {
            Ok(delta) => self.apply_delta(delta, events),
            Err(err) => {
                self.parse_errors += 1;
                warn!(error = %err, "dropping malformed stream payload");
            }
        }
    }

    fn apply_delta(&mut self, delta: TurnDelta, events: &mut Vec<TurnEvent>) {
        // An empty delta never opens, closes, or appends anything.
        if delta.text.is_empty() {
            return;
        }
        let same_speaker = self
            .open
            .as_ref()
            .is_some_and(|turn| turn.speaker_id == delta.speaker_id);
        if same_speaker {
            let index = self.closed.len();
            if let Some(turn) = self.open.as_mut() {
                turn.text.push_str(&delta.text);
            }
            events.push(TurnEvent::TurnAppended { index, delta: delta.text });
        } else {
            self.close_open(events);
            let index = self.closed.len();
            self.open = Some(Turn {
                speaker_id: delta.speaker_id.clone(),
                text: delta.text.clone(),
                is_final: false,
            });
            events.push(TurnEvent::TurnOpened {
                index,
                speaker_id: delta.speaker_id,
            });
            events.push(TurnEvent::TurnAppended { index, delta: delta.text });
        }
    }

    fn close_open(&mut self, events: &mut Vec<TurnEvent>) {
        if let Some(mut turn) = self.open.take() {
            turn.is_final = true;
            let index = self.closed.len();
            self.closed.push(turn);
            events.push(TurnEvent::TurnClosed { index });
        }
    }

    /// Terminate assembly after a transport failure.
    ///
    /// The open turn (if any) is closed with the text received so far;
    /// already-closed turns are retained untouched.
    pub fn abort(&mut self) {
        let mut events = Vec::new();
        self.close_open(&mut events);
        self.finished = true;
    }

    /// Close any open turn and return the full ordered turn list.
    pub fn finalize(&mut self) -> Vec<Turn> {
        let mut events = Vec::new();
        self.close_open(&mut events);
        self.finished = true;
        self.closed.clone()
    }

    /// Closed turns assembled so far, in arrival order.
    pub fn turns(&self) -> &[Turn] {
        &self.closed
    }

    /// The turn still receiving text, if any.
    pub fn open_turn(&self) -> Option<&Turn> {
        self.open.as_ref()
    }

    /// True once the sentinel arrived or the stream was aborted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of lines dropped as malformed.
    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }
}
