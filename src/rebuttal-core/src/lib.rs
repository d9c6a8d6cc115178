//! Rebuttal Core Library
//!
//! Generates cross-examination questions and counter speeches for a
//! debater's speech, and narrates them segment by segment.

pub mod audio;
pub mod config;
pub mod error;
pub mod evidence;
pub mod generator;
pub mod player;
pub mod segmenter;
pub mod session;
pub mod tts;

#[cfg(test)]
mod testing;

pub use audio::{AudioOutput, Playback, PlaybackControl, RodioOutput};
pub use config::{Config, SpeechBackend, default_config};
pub use error::DebateError;
pub use evidence::EvidenceDocument;
pub use generator::{GeneratorConfig, ResponseGenerator, ResponseKind};
pub use player::{ChainedPlayer, Effect, NarrationCallback, NarrationEvent, PlayerEvent, PlayerState};
pub use segmenter::{DEFAULT_MAX_SEGMENT_LENGTH, split_text};
pub use session::SessionController;
pub use tts::{AudioClip, AudioFormat, KokoroSpeech, OpenAiSpeech, SpeechSynthesizer};
