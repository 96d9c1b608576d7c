//! Audio output backends for synthesized speech.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use podium_core::{AudioDecoder, AudioHandle, Error};
use rodio::{Decoder, OutputStreamHandle, Sink, Source};
use tokio::sync::oneshot;
use tracing::debug;

/// Decodes synthesis payloads into rodio sinks on the default output device.
///
/// Holds only the stream handle; the `OutputStream` itself is not `Send` and
/// stays alive on the main thread.
pub struct RodioDecoder {
    output: OutputStreamHandle,
}

impl RodioDecoder {
    pub fn new(output: OutputStreamHandle) -> Self {
        Self { output }
    }
}

impl AudioDecoder for RodioDecoder {
    fn decode(&self, payload: Bytes) -> Result<Box<dyn AudioHandle>, Error> {
        let source = Decoder::new(Cursor::new(payload))
            .map_err(|e| Error::SynthesisDecode(e.to_string()))?;
        let duration = source
            .total_duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let sink = Sink::try_new(&self.output)
            .map_err(|e| Error::SynthesisDecode(e.to_string()))?;
        sink.pause();
        sink.append(source);
        debug!(duration, "decoded synthesis payload");
        Ok(Box::new(RodioHandle {
            sink: Some(Arc::new(sink)),
            duration,
        }))
    }
}

struct RodioHandle {
    sink: Option<Arc<Sink>>,
    duration: f64,
}

impl AudioHandle for RodioHandle {
    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn position_secs(&self) -> f64 {
        self.sink
            .as_ref()
            .map(|sink| sink.get_pos().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn play_from(&mut self, position_secs: f64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let Some(sink) = &self.sink else {
            return rx;
        };
        if position_secs > 0.0 {
            if let Err(e) = sink.try_seek(Duration::from_secs_f64(position_secs)) {
                debug!(position_secs, error = %e, "seek unsupported, playing from start");
            }
        }
        sink.play();
        let sink = Arc::clone(sink);
        tokio::task::spawn_blocking(move || {
            sink.sleep_until_end();
            let _ = tx.send(());
        });
        rx
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
    }

    fn release(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

/// Silent backend for `--mute`: every payload plays instantly to completion.
pub struct NullDecoder;

impl AudioDecoder for NullDecoder {
    fn decode(&self, _payload: Bytes) -> Result<Box<dyn AudioHandle>, Error> {
        Ok(Box::new(NullHandle))
    }
}

struct NullHandle;

impl AudioHandle for NullHandle {
    fn duration_secs(&self) -> f64 {
        0.0
    }

    fn position_secs(&self) -> f64 {
        0.0
    }

    fn play_from(&mut self, _position_secs: f64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        rx
    }

    fn pause(&mut self) {}

    fn stop(&mut self) {}

    fn release(&mut self) {}
}
