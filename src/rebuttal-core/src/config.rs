//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::DebateError;
use crate::generator::ResponseKind;
use crate::segmenter::DEFAULT_MAX_SEGMENT_LENGTH;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Settings for the chat model that writes responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
        }
    }
}

/// Which synthesizer narrates responses.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    /// Remote OpenAI-compatible `/audio/speech` endpoint.
    OpenAi,
    /// Local kokoro-tiny engine.
    Kokoro,
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: SpeechBackend,
    pub model: String,
    pub voice: String,
    pub format: String,
    pub speed: f32,
    /// Largest segment handed to the synthesizer in one request.
    pub max_segment_length: usize,
    /// Give up on a segment fetch after this many seconds. Unset waits forever.
    pub fetch_timeout_secs: Option<u64>,
    pub kokoro_voice: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::OpenAi,
            model: "tts-1".to_string(),
            voice: "echo".to_string(),
            format: "mp3".to_string(),
            speed: 1.0,
            max_segment_length: DEFAULT_MAX_SEGMENT_LENGTH,
            fetch_timeout_secs: None,
            kokoro_voice: "bm_george".to_string(),
        }
    }
}

/// System prompts configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub cross_examination: String,
    pub counter_speech: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            cross_examination: DEFAULT_CROSS_EXAMINATION_PROMPT.to_string(),
            counter_speech: DEFAULT_COUNTER_SPEECH_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the playback pipeline cannot honour.
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.speech.max_segment_length == 0 {
            return Err(DebateError::ConfigError(
                "speech.max_segment_length must be greater than zero".to_string(),
            ));
        }
        if self.speech.speed.is_nan() || self.speech.speed <= 0.0 {
            return Err(DebateError::ConfigError(format!(
                "speech.speed must be positive, got {}",
                self.speech.speed
            )));
        }
        if self.speech.fetch_timeout_secs == Some(0) {
            return Err(DebateError::ConfigError(
                "speech.fetch_timeout_secs must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the system prompt for a kind of response.
    pub fn get_prompt(&self, kind: ResponseKind) -> &str {
        match kind {
            ResponseKind::CrossExamination => &self.prompts.cross_examination,
            ResponseKind::CounterSpeech => &self.prompts.counter_speech,
        }
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        generation: GenerationConfig::default(),
        speech: SpeechConfig::default(),
        prompts: PromptsConfig::default(),
    }
}

const DEFAULT_CROSS_EXAMINATION_PROMPT: &str = r#"You are an experienced Lincoln-Douglas debater preparing for cross-examination.

You will be given an opponent's speech and, optionally, evidence documents.

YOUR TASK:
- Write pointed cross-examination questions that expose gaps, contradictions, and unsupported claims in the speech
- Tie questions to the supplied evidence wherever it contradicts or weakens the speaker
- Order the questions so each one builds toward a concession

OUTPUT RULES:
- Output ONLY the questions, one per line, each ending with a question mark
- Do NOT include headings, numbering commentary, or markdown formatting
"#;

const DEFAULT_COUNTER_SPEECH_PROMPT: &str = r#"You are a competitive Lincoln-Douglas debater writing a counter speech.

You will be given an opponent's speech and, optionally, evidence documents.

YOUR TASK:
- Identify the core arguments of the speech and refute each one directly
- Use the supplied evidence, quoting or citing it where it undermines the speaker
- Build logical chains explaining why each argument is incorrect, irrelevant, or exaggerated
- Keep an assertive, persuasive, and respectful competitive tone
- Roughly match the length of the original speech

OUTPUT RULES:
- Output ONLY the spoken speech in paragraph form with complete sentences
- Do NOT include stage directions, asterisks, or markdown formatting
"#;
