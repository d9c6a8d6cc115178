//! Audio output for narration clips, backed by `rodio`.

use std::io::Cursor;
use std::sync::Arc;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::oneshot;

use crate::error::DebateError;
use crate::tts::{AudioClip, AudioFormat};

/// Controls one clip that is currently audible.
pub trait PlaybackControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
}

/// A started clip: its controls plus a signal that fires when it ends.
///
/// The signal carries `Ok(())` on natural completion and an error if the
/// clip failed mid-playback. A dropped sender also counts as a failure.
pub struct Playback {
    pub control: Arc<dyn PlaybackControl>,
    pub finished: oneshot::Receiver<Result<(), DebateError>>,
}

/// Something that can make a clip audible.
pub trait AudioOutput: Send + Sync {
    /// Decode `clip` and start playing it. Returns once sound is starting.
    fn play(&self, clip: AudioClip) -> Result<Playback, DebateError>;
}

/// Plays clips on an output device through `rodio`.
///
/// Holds only the `Send + Sync` stream handle; the [`OutputStream`] itself
/// must stay alive on the thread that opened it.
pub struct RodioOutput {
    handle: OutputStreamHandle,
}

impl RodioOutput {
    pub fn new(handle: OutputStreamHandle) -> Self {
        Self { handle }
    }

    /// Open the default output device.
    pub fn open_default() -> Result<(OutputStream, Self), DebateError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| DebateError::PlaybackFailed(format!("No audio output device: {}", e)))?;

        tracing::info!("Audio playback initialized on default output device");
        Ok((stream, Self::new(handle)))
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, clip: AudioClip) -> Result<Playback, DebateError> {
        let cursor = Cursor::new(clip.bytes);
        let source = match clip.format {
            AudioFormat::Mp3 => Decoder::new_mp3(cursor),
            AudioFormat::Wav => Decoder::new_wav(cursor),
        }
        .map_err(|e| DebateError::PlaybackFailed(format!("Failed to decode clip: {}", e)))?;

        let sink = Sink::try_new(&self.handle)
            .map_err(|e| DebateError::PlaybackFailed(e.to_string()))?;
        sink.append(source);
        let sink = Arc::new(sink);

        // sleep_until_end() returns when the queue drains or stop() empties it.
        let (done_tx, done_rx) = oneshot::channel();
        let watcher = Arc::clone(&sink);
        std::thread::spawn(move || {
            watcher.sleep_until_end();
            let _ = done_tx.send(Ok(()));
        });

        Ok(Playback {
            control: Arc::new(RodioControl { sink }),
            finished: done_rx,
        })
    }
}

struct RodioControl {
    sink: Arc<Sink>,
}

impl PlaybackControl for RodioControl {
    fn pause(&self) {
        self.sink.pause();
    }

    fn resume(&self) {
        self.sink.play();
    }

    fn stop(&self) {
        self.sink.stop();
    }
}
