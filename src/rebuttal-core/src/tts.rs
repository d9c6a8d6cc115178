//! Speech synthesis for narration segments.
//!
//! A [`SpeechSynthesizer`] turns one segment of text into a playable
//! [`AudioClip`]. Two backends are provided: the remote OpenAI-compatible
//! speech endpoint and a local kokoro-tiny engine.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use tokio::sync::Mutex;

use crate::config::SpeechConfig;
use crate::error::DebateError;
use crate::segmenter::split_text;

/// Kokoro-tiny has a strict limit on input length.
const KOKORO_SAFE_LENGTH: usize = 200;
const KOKORO_SAMPLE_RATE: u32 = 24_000;
/// 0.3 seconds at 24kHz, keeps sub-chunks from clipping each other.
const KOKORO_CHUNK_GAP: usize = 7200;

/// Container format of an encoded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

/// Encoded audio for exactly one segment.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Fetches synthesized audio for a single segment.
///
/// Implementations perform no retries; the player decides what a failure
/// means for the rest of the utterance.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Synthesize `text` at the given playback `speed`.
    async fn fetch(&self, text: &str, speed: f32) -> Result<AudioClip, DebateError>;
}

/// OpenAI-compatible `/audio/speech` client.
pub struct OpenAiSpeech {
    api_base: String,
    api_key: String,
    model: String,
    voice: String,
    format: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        speech: &SpeechConfig,
    ) -> Result<Self, DebateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: speech.model.clone(),
            voice: speech.voice.clone(),
            format: speech.format.clone(),
            client,
        })
    }

    fn clip_format(&self) -> AudioFormat {
        if self.format.eq_ignore_ascii_case("wav") {
            AudioFormat::Wav
        } else {
            AudioFormat::Mp3
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    async fn fetch(&self, text: &str, speed: f32) -> Result<AudioClip, DebateError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": self.format,
            "speed": speed,
        });

        let resp = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DebateError::FetchFailed(format!("speech request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err_body = resp.text().await.unwrap_or_default();
            return Err(DebateError::FetchFailed(format!(
                "speech endpoint returned {status}: {err_body}"
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DebateError::FetchFailed(format!("speech response read error: {e}")))?
            .to_vec();

        tracing::debug!(chars = text.chars().count(), bytes = bytes.len(), "Fetched speech segment");

        Ok(AudioClip {
            bytes,
            format: self.clip_format(),
        })
    }
}

/// Offline synthesizer backed by kokoro-tiny (downloads its model on first run).
pub struct KokoroSpeech {
    engine: Arc<Mutex<TtsEngine>>,
    voice: String,
    available_voices: Vec<String>,
}

impl KokoroSpeech {
    /// Initialize the engine and check that `voice` exists.
    pub async fn new(voice: impl Into<String>) -> Result<Self, DebateError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| DebateError::TtsError(format!("Failed to initialize TTS: {}", e)))?;

        let available_voices = engine.voices();
        let speech = Self {
            engine: Arc::new(Mutex::new(engine)),
            voice: voice.into(),
            available_voices,
        };
        speech.validate_voice(&speech.voice)?;

        Ok(speech)
    }

    /// Get list of available voice IDs.
    pub fn available_voices(&self) -> &[String] {
        &self.available_voices
    }

    /// Validate that a voice ID exists.
    pub fn validate_voice(&self, voice_id: &str) -> Result<(), DebateError> {
        if voice_id.is_empty() {
            return Err(DebateError::TtsError(format!(
                "Voice ID cannot be empty. Available voices:\n{}",
                self.format_available_voices()
            )));
        }

        if !self.available_voices.iter().any(|v| v == voice_id) {
            return Err(DebateError::TtsError(format!(
                "Unknown voice '{}'. Available voices:\n{}",
                voice_id,
                self.format_available_voices()
            )));
        }

        Ok(())
    }

    /// Format the English voices for display.
    pub fn format_available_voices(&self) -> String {
        let mut english_voices: Vec<&String> = self
            .available_voices
            .iter()
            .filter(|v| {
                v.starts_with("af_")
                    || v.starts_with("am_")
                    || v.starts_with("bf_")
                    || v.starts_with("bm_")
            })
            .collect();
        english_voices.sort();

        english_voices
            .iter()
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl SpeechSynthesizer for KokoroSpeech {
    fn name(&self) -> &str {
        "kokoro"
    }

    async fn fetch(&self, text: &str, speed: f32) -> Result<AudioClip, DebateError> {
        let engine = Arc::clone(&self.engine);
        let voice = self.voice.clone();
        let samples = synthesize_chunks(text, move |chunk| {
            engine
                .blocking_lock()
                .synthesize(chunk, Some(voice.as_str()))
                .map_err(|e| DebateError::FetchFailed(format!("Synthesis failed: {}", e)))
        })
        .await?;

        let samples = adjust_audio_speed(samples, speed);
        let bytes = encode_wav(&samples, KOKORO_SAMPLE_RATE)?;

        Ok(AudioClip {
            bytes,
            format: AudioFormat::Wav,
        })
    }
}

/// Synthesize `text` in engine-sized pieces, each on the blocking pool.
///
/// The engine lock is taken per piece and the runtime is free between
/// pieces, so dropping the future stops synthesis after the current piece.
async fn synthesize_chunks<F>(text: &str, synthesize: F) -> Result<Vec<f32>, DebateError>
where
    F: Fn(&str) -> Result<Vec<f32>, DebateError> + Send + Sync + 'static,
{
    let synthesize = Arc::new(synthesize);
    let mut samples = Vec::new();

    for chunk in split_text(text, KOKORO_SAFE_LENGTH)? {
        let chunk = chunk.trim().to_string();
        if chunk.is_empty() {
            continue;
        }

        let synthesize = Arc::clone(&synthesize);
        let chunk_samples = tokio::task::spawn_blocking(move || synthesize(&chunk))
            .await
            .map_err(|e| DebateError::FetchFailed(format!("Synthesis task failed: {}", e)))??;

        samples.extend(chunk_samples);
        samples.extend(std::iter::repeat_n(0.0, KOKORO_CHUNK_GAP));
    }

    Ok(samples)
}

/// Adjust audio playback speed using linear interpolation.
/// Rate < 1.0 = slower (e.g., 0.75 = 75% speed), Rate > 1.0 = faster.
pub fn adjust_audio_speed(samples: Vec<f32>, rate: f32) -> Vec<f32> {
    if (rate - 1.0).abs() < 0.001 || rate <= 0.0 {
        return samples;
    }

    // Slower = longer
    let new_len = (samples.len() as f32 / rate) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f32 * rate;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f32;

        if src_idx + 1 < samples.len() {
            let sample = samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac;
            result.push(sample);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

/// Encode mono samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, DebateError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)
        .map_err(|e| DebateError::FetchFailed(format!("Failed to encode WAV: {}", e)))?;
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| DebateError::FetchFailed(format!("Failed to encode WAV: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| DebateError::FetchFailed(format!("Failed to encode WAV: {}", e)))?;

    Ok(bytes)
}
