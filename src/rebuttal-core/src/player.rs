//! Chained audio player.
//!
//! [`ChainedPlayer`] is the pure state machine: it knows the segments of one
//! utterance, where the cursor is, and which transitions are legal. It never
//! touches audio itself; each accepted event yields at most one [`Effect`]
//! for the driver to carry out.
//!
//! [`PlayerDriver`] runs the machine on the async runtime. It fetches one
//! segment at a time, starts it once the clip is ready, waits for it to end,
//! and only then moves on. Failures skip the segment instead of ending the
//! utterance.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioOutput, PlaybackControl};
use crate::error::DebateError;
use crate::tts::SpeechSynthesizer;

/// Where a player is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Constructed, not started.
    Idle,
    /// Audio for segment `index` has been requested.
    Fetching { index: usize },
    /// Segment `index` is audible.
    Playing { index: usize },
    /// Segment `index` is suspended and can resume in place.
    Paused { index: usize },
    /// Every segment has been played or skipped.
    Done,
    /// Cancelled; nothing else will play.
    Stopped,
}

impl PlayerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerState::Done | PlayerState::Stopped)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Start,
    /// The current segment's clip is decoded and sound has started.
    AudioReady,
    /// The current segment played to the end.
    SegmentFinished,
    /// The current segment could not be fetched or played.
    SegmentFailed,
    Pause,
    Resume,
    Stop,
}

/// Side effect requested by an accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Fetch { index: usize },
    BeginPlayback,
    Suspend,
    Unsuspend,
    Halt,
}

/// State machine over the segments of one utterance.
#[derive(Debug, Clone)]
pub struct ChainedPlayer {
    segments: Vec<String>,
    cursor: usize,
    speed: f32,
    state: PlayerState,
}

impl ChainedPlayer {
    pub fn new(segments: Vec<String>, speed: f32) -> Self {
        Self {
            segments,
            cursor: 0,
            speed,
            state: PlayerState::Idle,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Feed one event through the machine.
    ///
    /// Events that are not legal in the current state are ignored and
    /// return `None`; they never move the machine.
    pub fn apply(&mut self, event: PlayerEvent) -> Option<Effect> {
        use PlayerState::*;

        match (self.state, event) {
            (Idle, PlayerEvent::Start) => {
                if self.segments.is_empty() {
                    self.state = Done;
                    None
                } else {
                    self.cursor = 0;
                    self.state = Fetching { index: 0 };
                    Some(Effect::Fetch { index: 0 })
                }
            }
            (Fetching { index }, PlayerEvent::AudioReady) => {
                self.state = Playing { index };
                Some(Effect::BeginPlayback)
            }
            (
                Fetching { .. } | Playing { .. } | Paused { .. },
                PlayerEvent::SegmentFinished | PlayerEvent::SegmentFailed,
            ) => self.advance(),
            (Playing { index }, PlayerEvent::Pause) => {
                self.state = Paused { index };
                Some(Effect::Suspend)
            }
            (Paused { index }, PlayerEvent::Resume) => {
                self.state = Playing { index };
                Some(Effect::Unsuspend)
            }
            (state, PlayerEvent::Stop) if !state.is_terminal() => {
                self.cursor = self.segments.len();
                self.state = Stopped;
                Some(Effect::Halt)
            }
            (state, event) => {
                tracing::debug!(?state, ?event, "Ignoring event not valid in this state");
                None
            }
        }
    }

    fn advance(&mut self) -> Option<Effect> {
        if self.cursor + 1 < self.segments.len() {
            self.cursor += 1;
            self.state = PlayerState::Fetching { index: self.cursor };
            Some(Effect::Fetch { index: self.cursor })
        } else {
            self.cursor = self.segments.len();
            self.state = PlayerState::Done;
            None
        }
    }
}

/// Pause/resume requests delivered to a running driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    Pause,
    Resume,
}

impl From<PlayerControl> for PlayerEvent {
    fn from(control: PlayerControl) -> Self {
        match control {
            PlayerControl::Pause => PlayerEvent::Pause,
            PlayerControl::Resume => PlayerEvent::Resume,
        }
    }
}

/// Progress reported while narrating.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationEvent {
    SegmentStarted { index: usize, total: usize },
    SegmentSkipped { index: usize, total: usize, reason: String },
    Paused,
    Resumed,
    Finished,
    Stopped,
}

/// Callback for narration events.
pub type NarrationCallback = Arc<dyn Fn(NarrationEvent) + Send + Sync>;

/// The one audible clip of a session, shared with its controller.
///
/// Stopping sets `stopped` and silences `current` under the same lock the
/// driver takes before starting a clip, so no clip can start after a stop.
#[derive(Default)]
pub(crate) struct OutputSlot {
    pub(crate) stopped: bool,
    pub(crate) current: Option<Arc<dyn PlaybackControl>>,
}

pub(crate) type SharedSlot = Arc<Mutex<OutputSlot>>;

pub(crate) fn lock_slot(slot: &SharedSlot) -> MutexGuard<'_, OutputSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

type Finished = oneshot::Receiver<Result<(), DebateError>>;

/// Runs a [`ChainedPlayer`] against real collaborators.
pub(crate) struct PlayerDriver {
    pub(crate) player: ChainedPlayer,
    pub(crate) synthesizer: Arc<dyn SpeechSynthesizer>,
    pub(crate) output: Arc<dyn AudioOutput>,
    pub(crate) slot: SharedSlot,
    pub(crate) cancel: CancellationToken,
    pub(crate) control: mpsc::UnboundedReceiver<PlayerControl>,
    pub(crate) fetch_timeout: Option<Duration>,
    pub(crate) callback: Option<NarrationCallback>,
}

impl PlayerDriver {
    /// Play the utterance to completion or cancellation.
    pub(crate) async fn run(mut self) -> PlayerState {
        let mut pending = self.player.apply(PlayerEvent::Start);
        let mut finished: Option<Finished> = None;

        loop {
            match pending.take() {
                Some(Effect::Fetch { index }) => {
                    pending = self.fetch_segment(index, &mut finished).await;
                    continue;
                }
                Some(Effect::Suspend) => {
                    self.with_current(|c| c.pause());
                    self.emit(NarrationEvent::Paused);
                }
                Some(Effect::Unsuspend) => {
                    self.with_current(|c| c.resume());
                    self.emit(NarrationEvent::Resumed);
                }
                Some(Effect::Halt) => self.halt(),
                Some(Effect::BeginPlayback) | None => {}
            }

            if self.player.state().is_terminal() {
                break;
            }

            let Some(done) = finished.as_mut() else {
                // Playing with nothing to wait on; move past the segment.
                pending = self.player.apply(PlayerEvent::SegmentFailed);
                continue;
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    pending = self.player.apply(PlayerEvent::Stop);
                }
                outcome = done => {
                    finished = None;
                    self.release_current();
                    pending = match outcome {
                        Ok(Ok(())) => self.player.apply(PlayerEvent::SegmentFinished),
                        Ok(Err(e)) => self.skip(e.to_string()),
                        Err(_) => self.skip("playback ended without a completion signal".to_string()),
                    };
                }
                Some(control) = self.control.recv() => {
                    pending = self.player.apply(control.into());
                }
            }
        }

        let state = self.player.state();
        match state {
            PlayerState::Done => {
                tracing::debug!("Narration finished");
                self.emit(NarrationEvent::Finished);
            }
            _ => {
                tracing::debug!("Narration stopped");
                self.emit(NarrationEvent::Stopped);
            }
        }
        state
    }

    /// Fetch segment `index` and start it. Returns the machine's next effect.
    async fn fetch_segment(&mut self, index: usize, finished: &mut Option<Finished>) -> Option<Effect> {
        let Some(text) = self.player.segment(index).map(str::to_owned) else {
            return self.player.apply(PlayerEvent::SegmentFailed);
        };
        let total = self.player.segments().len();
        tracing::debug!(index, total, backend = self.synthesizer.name(), "Fetching segment");

        let synthesizer = Arc::clone(&self.synthesizer);
        let speed = self.player.speed();
        let timeout = self.fetch_timeout;
        let fetch = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, synthesizer.fetch(&text, speed))
                    .await
                    .unwrap_or_else(|_| {
                        Err(DebateError::FetchFailed(format!("no audio after {limit:?}")))
                    }),
                None => synthesizer.fetch(&text, speed).await,
            }
        };
        tokio::pin!(fetch);

        let fetched = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.player.apply(PlayerEvent::Stop);
                }
                result = &mut fetch => break result,
                Some(control) = self.control.recv() => {
                    // Nothing is audible yet, so the machine drops these.
                    self.player.apply(control.into());
                }
            }
        };

        let clip = match fetched {
            Ok(clip) => clip,
            Err(e) => return self.skip(e.to_string()),
        };

        let mut slot = lock_slot(&self.slot);
        if slot.stopped {
            drop(slot);
            return self.player.apply(PlayerEvent::Stop);
        }

        match self.output.play(clip) {
            Ok(playback) => {
                slot.current = Some(playback.control);
                drop(slot);
                *finished = Some(playback.finished);
                self.emit(NarrationEvent::SegmentStarted { index, total });
                self.player.apply(PlayerEvent::AudioReady)
            }
            Err(e) => {
                drop(slot);
                self.skip(e.to_string())
            }
        }
    }

    fn skip(&mut self, reason: String) -> Option<Effect> {
        let index = self.player.cursor();
        let total = self.player.segments().len();
        tracing::warn!(index, total, %reason, "Skipping segment");
        self.emit(NarrationEvent::SegmentSkipped { index, total, reason });
        self.player.apply(PlayerEvent::SegmentFailed)
    }

    fn with_current(&self, f: impl FnOnce(&dyn PlaybackControl)) {
        if let Some(current) = lock_slot(&self.slot).current.as_deref() {
            f(current);
        }
    }

    fn release_current(&self) {
        lock_slot(&self.slot).current = None;
    }

    fn halt(&self) {
        let mut slot = lock_slot(&self.slot);
        slot.stopped = true;
        if let Some(current) = slot.current.take() {
            current.stop();
        }
    }

    fn emit(&self, event: NarrationEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}
