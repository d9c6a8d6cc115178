//! Playback session controller.
//!
//! Owns at most one live narration. Starting a new one silences the old one
//! first, so two utterances are never audible together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioOutput;
use crate::config::SpeechConfig;
use crate::error::DebateError;
use crate::player::{
    ChainedPlayer, NarrationCallback, PlayerControl, PlayerDriver, PlayerState, SharedSlot,
    lock_slot,
};
use crate::segmenter::split_text;
use crate::tts::SpeechSynthesizer;

/// One utterance being narrated on its own task.
struct PlaybackSession {
    control: mpsc::UnboundedSender<PlayerControl>,
    cancel: CancellationToken,
    slot: SharedSlot,
    task: JoinHandle<PlayerState>,
}

impl PlaybackSession {
    fn spawn(driver: PlayerDriver, control: mpsc::UnboundedSender<PlayerControl>) -> Self {
        let cancel = driver.cancel.clone();
        let slot = Arc::clone(&driver.slot);
        let task = tokio::spawn(driver.run());

        Self {
            control,
            cancel,
            slot,
            task,
        }
    }

    /// Silence the current clip now and make sure no further clip starts.
    fn stop(&self) {
        {
            let mut slot = lock_slot(&self.slot);
            slot.stopped = true;
            if let Some(current) = slot.current.take() {
                current.stop();
            }
        }
        self.cancel.cancel();
    }

    fn send(&self, control: PlayerControl) {
        // A finished driver has dropped its receiver; nothing to control.
        let _ = self.control.send(control);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Narrates utterances one at a time.
pub struct SessionController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    max_segment_length: usize,
    fetch_timeout: Option<Duration>,
    callback: Option<NarrationCallback>,
    live: Option<PlaybackSession>,
    paused: bool,
}

impl SessionController {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        speech: &SpeechConfig,
    ) -> Self {
        Self {
            synthesizer,
            output,
            max_segment_length: speech.max_segment_length,
            fetch_timeout: speech.fetch_timeout_secs.map(Duration::from_secs),
            callback: None,
            live: None,
            paused: false,
        }
    }

    /// Set a callback for narration events.
    pub fn with_callback(mut self, callback: NarrationCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Narrate `text`, replacing whatever is playing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn narrate(&mut self, text: &str, speed: f32) -> Result<(), DebateError> {
        self.stop();

        let segments = split_text(text, self.max_segment_length)?;
        tracing::info!(segments = segments.len(), speed, "Starting narration");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let driver = PlayerDriver {
            player: ChainedPlayer::new(segments, speed),
            synthesizer: Arc::clone(&self.synthesizer),
            output: Arc::clone(&self.output),
            slot: SharedSlot::default(),
            cancel: CancellationToken::new(),
            control: control_rx,
            fetch_timeout: self.fetch_timeout,
            callback: self.callback.clone(),
        };

        self.live = Some(PlaybackSession::spawn(driver, control_tx));
        self.paused = false;
        Ok(())
    }

    /// Flip between paused and playing. Returns the new paused flag.
    ///
    /// The flag is tracked here, not read back from the player. A request
    /// that arrives while no segment is audible (between fetches) flips the
    /// flag but is dropped by the player.
    pub fn toggle_pause(&mut self) -> bool {
        let Some(session) = self.live.as_ref() else {
            return self.paused;
        };

        self.paused = !self.paused;
        tracing::debug!(
            paused = self.paused,
            "Forwarding pause toggle; ignored unless a segment is audible"
        );
        session.send(if self.paused {
            PlayerControl::Pause
        } else {
            PlayerControl::Resume
        });
        self.paused
    }

    /// Stop the live narration, if any.
    pub fn stop(&mut self) {
        if let Some(session) = self.live.take() {
            session.stop();
            tracing::debug!("Stopped live narration");
        }
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether a narration is still playing or fetching.
    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(|s| !s.task.is_finished())
    }

    /// Wait for the live narration to end. Returns `None` when nothing is live.
    ///
    /// Cancel safe: dropping the future leaves the narration running.
    pub async fn wait(&mut self) -> Option<PlayerState> {
        let session = self.live.as_mut()?;
        let state = match (&mut session.task).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Narration task ended abnormally");
                PlayerState::Stopped
            }
        };

        self.live = None;
        self.paused = false;
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::NarrationEvent;
    use crate::testing::{FakeOutput, FakeSynthesizer, event_channel, next_event};

    fn controller(
        synthesizer: Arc<FakeSynthesizer>,
        output: Arc<FakeOutput>,
        max_segment_length: usize,
    ) -> SessionController {
        let speech = SpeechConfig {
            max_segment_length,
            ..SpeechConfig::default()
        };
        SessionController::new(synthesizer, output, &speech)
    }

    #[tokio::test]
    async fn test_narrate_plays_all_segments() {
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let output = Arc::new(FakeOutput::auto_finish());
        let mut controller = controller(synthesizer.clone(), output.clone(), 7);

        controller.narrate("AAA. BBB. CCC.", 1.0).unwrap();

        assert_eq!(controller.wait().await, Some(PlayerState::Done));
        assert_eq!(synthesizer.fetched(), vec!["AAA.", " BBB.", " CCC."]);
        assert!(!controller.is_live());
        assert_eq!(controller.wait().await, None);
    }

    #[tokio::test]
    async fn test_empty_text_completes_without_audio() {
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let output = Arc::new(FakeOutput::auto_finish());
        let mut controller = controller(synthesizer.clone(), output.clone(), 100);

        controller.narrate("", 1.0).unwrap();

        assert_eq!(controller.wait().await, Some(PlayerState::Done));
        assert!(synthesizer.fetched().is_empty());
        assert!(output.log().is_empty());
    }

    #[tokio::test]
    async fn test_new_narration_stops_previous_first() {
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let output = Arc::new(FakeOutput::manual());
        let log = output.shared_log();
        let (events, mut rx) = event_channel();
        let mut controller =
            controller(synthesizer.clone(), output.clone(), 100).with_callback(events);

        controller.narrate("First speech.", 1.0).unwrap();
        assert_eq!(next_event(&mut rx).await, NarrationEvent::SegmentStarted { index: 0, total: 1 });

        controller.narrate("Second speech.", 1.0).unwrap();
        // The two tasks report independently; only the audio log is ordered.
        let reported = [next_event(&mut rx).await, next_event(&mut rx).await];
        assert!(reported.contains(&NarrationEvent::Stopped));
        assert!(reported.contains(&NarrationEvent::SegmentStarted { index: 0, total: 1 }));

        assert_eq!(
            log.lock().unwrap().clone(),
            vec!["play First speech.", "stop First speech.", "play Second speech."]
        );
        assert_eq!(synthesizer.fetched(), vec!["First speech.", "Second speech."]);

        output.finish_current();
        assert_eq!(controller.wait().await, Some(PlayerState::Done));
    }

    #[tokio::test]
    async fn test_toggle_pause_tracks_flag_and_forwards() {
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let output = Arc::new(FakeOutput::manual());
        let (events, mut rx) = event_channel();
        let mut controller = controller(synthesizer, output.clone(), 100).with_callback(events);

        assert!(!controller.toggle_pause());

        controller.narrate("Hold on.", 1.0).unwrap();
        assert_eq!(next_event(&mut rx).await, NarrationEvent::SegmentStarted { index: 0, total: 1 });

        assert!(controller.toggle_pause());
        assert_eq!(next_event(&mut rx).await, NarrationEvent::Paused);
        assert!(!controller.toggle_pause());
        assert_eq!(next_event(&mut rx).await, NarrationEvent::Resumed);

        output.finish_current();
        assert_eq!(controller.wait().await, Some(PlayerState::Done));
        assert_eq!(output.log(), vec!["play Hold on.", "pause Hold on.", "resume Hold on."]);
    }

    #[tokio::test]
    async fn test_toggle_pause_between_segments_only_flips_flag() {
        let synthesizer = Arc::new(FakeSynthesizer::gated());
        let output = Arc::new(FakeOutput::manual());
        let (events, mut rx) = event_channel();
        let mut controller =
            controller(synthesizer.clone(), output.clone(), 100).with_callback(events);

        controller.narrate("Still fetching.", 1.0).unwrap();
        synthesizer.wait_for_fetch().await;

        assert!(controller.toggle_pause());
        assert!(controller.is_paused());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        synthesizer.release();

        assert_eq!(next_event(&mut rx).await, NarrationEvent::SegmentStarted { index: 0, total: 1 });
        assert_eq!(output.log(), vec!["play Still fetching."]);

        // The next press resumes the flag; the player has nothing to resume.
        assert!(!controller.toggle_pause());
        output.finish_current();
        assert_eq!(controller.wait().await, Some(PlayerState::Done));
        assert_eq!(output.log(), vec!["play Still fetching."]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let output = Arc::new(FakeOutput::manual());
        let (events, mut rx) = event_channel();
        let mut controller = controller(synthesizer, output.clone(), 100).with_callback(events);

        controller.narrate("Stop me.", 1.0).unwrap();
        assert_eq!(next_event(&mut rx).await, NarrationEvent::SegmentStarted { index: 0, total: 1 });

        controller.stop();
        controller.stop();
        assert_eq!(next_event(&mut rx).await, NarrationEvent::Stopped);
        assert!(!controller.is_live());
        assert!(!controller.is_paused());
        assert_eq!(output.log(), vec!["play Stop me.", "stop Stop me."]);
    }

    #[tokio::test]
    async fn test_stop_after_completion_is_noop() {
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let output = Arc::new(FakeOutput::auto_finish());
        let mut controller = controller(synthesizer, output.clone(), 100);

        controller.narrate("Done soon.", 1.0).unwrap();
        assert_eq!(controller.wait().await, Some(PlayerState::Done));

        controller.stop();
        assert_eq!(output.log(), vec!["play Done soon."]);
    }

    #[tokio::test]
    async fn test_zero_segment_length_is_reported() {
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let output = Arc::new(FakeOutput::auto_finish());
        let mut controller = controller(synthesizer, output, 0);

        let err = controller.narrate("Anything.", 1.0).unwrap_err();
        assert!(matches!(err, DebateError::InvalidSegmentLength(0)));
        assert!(!controller.is_live());
    }
}
