//! In-memory synthesizer and audio output for player and session tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc, oneshot};

use crate::audio::{AudioOutput, Playback, PlaybackControl};
use crate::error::DebateError;
use crate::player::{NarrationCallback, NarrationEvent};
use crate::tts::{AudioClip, AudioFormat, SpeechSynthesizer};

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

/// Returns clips whose bytes are the segment text.
#[derive(Default)]
pub(crate) struct FakeSynthesizer {
    fetched: Mutex<Vec<String>>,
    fail_on: Option<String>,
    stall_on: Option<String>,
    gated: bool,
    started: Notify,
    gate: Notify,
}

impl FakeSynthesizer {
    pub(crate) fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn stalling_on(text: &str) -> Self {
        Self {
            stall_on: Some(text.to_string()),
            ..Self::default()
        }
    }

    /// Every fetch waits for [`release`](Self::release).
    pub(crate) fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    pub(crate) async fn wait_for_fetch(&self) {
        self.started.notified().await;
    }

    pub(crate) fn release(&self) {
        self.gate.notify_one();
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(&self, text: &str, _speed: f32) -> Result<AudioClip, DebateError> {
        self.fetched.lock().unwrap().push(text.to_string());
        self.started.notify_one();

        if self.gated {
            self.gate.notified().await;
        }
        if self.stall_on.as_deref() == Some(text) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_on.as_deref() == Some(text) {
            return Err(DebateError::FetchFailed(format!("no audio for {text}")));
        }

        Ok(AudioClip {
            bytes: text.as_bytes().to_vec(),
            format: AudioFormat::Mp3,
        })
    }
}

/// Records play/pause/resume/stop calls as `"<action> <segment text>"`.
pub(crate) struct FakeOutput {
    log: Log,
    auto_finish: bool,
    fail_on: Option<String>,
    current: Mutex<Option<oneshot::Sender<Result<(), DebateError>>>>,
}

impl FakeOutput {
    /// Clips end as soon as they start.
    pub(crate) fn auto_finish() -> Self {
        Self {
            log: Log::default(),
            auto_finish: true,
            fail_on: None,
            current: Mutex::new(None),
        }
    }

    /// Clips play until [`finish_current`](Self::finish_current).
    pub(crate) fn manual() -> Self {
        Self {
            auto_finish: false,
            ..Self::auto_finish()
        }
    }

    /// The clip for `text` reports a playback error instead of finishing.
    pub(crate) fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub(crate) fn shared_log(&self) -> Log {
        Arc::clone(&self.log)
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn finish_current(&self) {
        if let Some(done) = self.current.lock().unwrap().take() {
            let _ = done.send(Ok(()));
        }
    }
}

impl AudioOutput for FakeOutput {
    fn play(&self, clip: AudioClip) -> Result<Playback, DebateError> {
        let text = String::from_utf8(clip.bytes).unwrap();
        push(&self.log, format!("play {text}"));

        let (done_tx, done_rx) = oneshot::channel();
        if self.fail_on.as_deref() == Some(text.as_str()) {
            let _ = done_tx.send(Err(DebateError::PlaybackFailed(format!("{text} is corrupt"))));
        } else if self.auto_finish {
            let _ = done_tx.send(Ok(()));
        } else {
            *self.current.lock().unwrap() = Some(done_tx);
        }

        Ok(Playback {
            control: Arc::new(FakeControl {
                text,
                log: Arc::clone(&self.log),
            }),
            finished: done_rx,
        })
    }
}

struct FakeControl {
    text: String,
    log: Log,
}

impl PlaybackControl for FakeControl {
    fn pause(&self) {
        push(&self.log, format!("pause {}", self.text));
    }

    fn resume(&self) {
        push(&self.log, format!("resume {}", self.text));
    }

    fn stop(&self) {
        push(&self.log, format!("stop {}", self.text));
    }
}

/// Callback that forwards narration events into a channel.
pub(crate) fn event_channel() -> (NarrationCallback, mpsc::UnboundedReceiver<NarrationEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: NarrationCallback = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (callback, rx)
}

pub(crate) async fn next_event(rx: &mut mpsc::UnboundedReceiver<NarrationEvent>) -> NarrationEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for narration event")
        .expect("event channel closed")
}
