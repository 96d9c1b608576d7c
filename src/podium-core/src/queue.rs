//! Ordered synthesis-then-playback job queue.

use std::fmt;

use crate::error::Error;
use crate::synth::AudioHandle;
use crate::voice::VoiceId;

/// Lifecycle of a single synthesis job.
pub enum JobState {
    Pending,
    Synthesizing,
    /// Synthesis succeeded; the job owns its handle until promoted or reset.
    Ready(Box<dyn AudioHandle>),
    Failed,
    /// Played to completion, or skipped after a failure. Attempted either
    /// way, which is what keeps playback ordering total.
    Done,
}

impl fmt::Debug for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "Pending"),
            JobState::Synthesizing => write!(f, "Synthesizing"),
            JobState::Ready(_) => write!(f, "Ready(..)"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Done => write!(f, "Done"),
        }
    }
}

/// One queued unit of synthesis-then-playback work.
pub struct SynthesisJob {
    /// Position of the source turn in the assembled turn list. Immutable.
    pub turn_index: usize,
    pub text: String,
    pub voice: VoiceId,
    pub state: JobState,
}

impl SynthesisJob {
    pub fn new(turn_index: usize, text: impl Into<String>, voice: VoiceId) -> Self {
        Self {
            turn_index,
            text: text.into(),
            voice,
            state: JobState::Pending,
        }
    }
}

/// Cursor over the queue. Mutated only by the scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueCursor {
    /// Queue position of the job being played or loaded next.
    pub current: usize,
    pub is_paused: bool,
    pub is_cancelled: bool,
    /// Meaningful only while the job at `current` owns the active handle.
    pub playback_position_secs: f64,
}

/// Ordered list of pending synthesis jobs plus the playback cursor.
#[derive(Default)]
pub struct PlaybackQueue {
    jobs: Vec<SynthesisJob>,
    cursor: QueueCursor,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append jobs. Existing entries are never reordered.
    pub fn enqueue(&mut self, jobs: Vec<SynthesisJob>) {
        self.jobs.extend(jobs);
    }

    /// Release every Ready handle, clear the queue, and zero the cursor.
    pub fn reset(&mut self) {
        for job in &mut self.jobs {
            if let JobState::Ready(handle) = &mut job.state {
                handle.release();
            }
        }
        self.jobs.clear();
        self.cursor = QueueCursor::default();
    }

    /// Move the cursor to the next job.
    ///
    /// Only legal after the current job was played or explicitly skipped;
    /// advancing past the end is an invariant violation.
    pub fn advance(&mut self) -> Result<(), Error> {
        if self.cursor.current >= self.jobs.len() {
            return Err(Error::OutOfRange {
                index: self.cursor.current,
            });
        }
        self.cursor.current += 1;
        self.cursor.playback_position_secs = 0.0;
        Ok(())
    }

    pub fn job_at(&self, position: usize) -> Option<&SynthesisJob> {
        self.jobs.get(position)
    }

    pub fn job_at_mut(&mut self, position: usize) -> Option<&mut SynthesisJob> {
        self.jobs.get_mut(position)
    }

    /// The job under the cursor, if the queue isn't exhausted.
    pub fn current(&self) -> Option<&SynthesisJob> {
        self.jobs.get(self.cursor.current)
    }

    pub fn cursor(&self) -> &QueueCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut QueueCursor {
        &mut self.cursor
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// True once every job has been attempted.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.current >= self.jobs.len()
    }

    pub fn is_synthesizing(&self) -> bool {
        self.jobs
            .iter()
            .any(|job| matches!(job.state, JobState::Synthesizing))
    }

    pub fn jobs(&self) -> &[SynthesisJob] {
        &self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHandle;

    fn job(turn_index: usize) -> SynthesisJob {
        SynthesisJob::new(turn_index, format!("t{turn_index}"), VoiceId::Alloy)
    }

    #[test]
    fn test_enqueue_appends_in_order() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(vec![job(0), job(2)]);
        queue.enqueue(vec![job(5)]);
        let indices: Vec<usize> = queue.jobs().iter().map(|j| j.turn_index).collect();
        assert_eq!(indices, vec![0, 2, 5]);
    }

    #[test]
    fn test_reset_releases_ready_handles() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(vec![job(0), job(1)]);
        let (handle, probe) = FakeHandle::new("t1", 1.0, true);
        queue.job_at_mut(1).unwrap().state = JobState::Ready(Box::new(handle));
        queue.cursor_mut().current = 1;

        queue.reset();
        assert!(probe.lock().unwrap().released);
        assert!(queue.is_empty());
        assert_eq!(*queue.cursor(), QueueCursor::default());
    }

    #[test]
    fn test_advance_past_end_is_out_of_range() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(vec![job(0)]);
        assert!(queue.advance().is_ok());
        assert!(queue.is_exhausted());
        assert!(matches!(queue.advance(), Err(Error::OutOfRange { index: 1 })));
    }

    #[test]
    fn test_advance_zeroes_playback_position() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(vec![job(0), job(1)]);
        queue.cursor_mut().playback_position_secs = 2.5;
        queue.advance().unwrap();
        assert_eq!(queue.cursor().playback_position_secs, 0.0);
        assert_eq!(queue.cursor().current, 1);
    }
}
