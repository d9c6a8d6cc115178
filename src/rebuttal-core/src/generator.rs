//! Response generation.
//!
//! Sends the user's speech and evidence to an OpenAI-compatible chat API and
//! returns either cross-examination questions or a counter speech.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};

use crate::config::Config;
use crate::error::DebateError;
use crate::evidence::{self, EvidenceDocument};

/// What to write in reply to a speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    CrossExamination,
    CounterSpeech,
}

impl ResponseKind {
    pub fn display_name(&self) -> &str {
        match self {
            ResponseKind::CrossExamination => "Cross Examination",
            ResponseKind::CounterSpeech => "Counter Speech",
        }
    }

    fn request(&self) -> &str {
        match self {
            ResponseKind::CrossExamination => {
                "Please write cross-examination questions for the following speech."
            }
            ResponseKind::CounterSpeech => {
                "Please write a counter speech against the following speech."
            }
        }
    }
}

/// Connection settings for the generation API.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// API key for authentication.
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl GeneratorConfig {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }
}

/// Writes responses to a speech.
pub struct ResponseGenerator {
    settings: GeneratorConfig,
    config: Config,
    client: Client<OpenAIConfig>,
}

impl ResponseGenerator {
    pub fn new(settings: GeneratorConfig, config: Config) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                DebateError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.api_base);

        let client = Client::with_config(openai_config).with_http_client(http_client);

        Ok(Self {
            settings,
            config,
            client,
        })
    }

    /// Generate one response, retrying while the model answers with nothing.
    pub async fn generate(
        &self,
        kind: ResponseKind,
        speech: &str,
        evidence: &[EvidenceDocument],
    ) -> Result<String, DebateError> {
        if speech.trim().is_empty() {
            return Err(DebateError::ConfigError("Speech text is empty".to_string()));
        }

        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: self.config.get_prompt(kind).to_string().into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: build_user_prompt(kind, speech, evidence).into(),
                name: None,
            }),
        ];

        let max_empty_retries = 3;
        for attempt in 0..max_empty_retries {
            let response = self.get_completion(&messages).await?;
            let sanitized = sanitize_response(&response);

            if sanitized.len() > 10 {
                return Ok(sanitized);
            }

            if attempt < max_empty_retries - 1 {
                tracing::warn!(
                    attempt = attempt + 1,
                    max = max_empty_retries,
                    kind = kind.display_name(),
                    "Empty response, retrying"
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }

        Err(DebateError::ConfigError(format!(
            "{} came back empty after {} attempts",
            kind.display_name(),
            max_empty_retries
        )))
    }

    /// Get a completion with exponential backoff on API errors.
    async fn get_completion(
        &self,
        messages: &[ChatCompletionRequestMessage],
    ) -> Result<String, DebateError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .max_completion_tokens(self.settings.max_tokens)
            .messages(messages.to_vec())
            .build()?;

        let max_retries = 3;
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                // 2s, 4s
                let delay = Duration::from_secs(1 << attempt);
                tokio::time::sleep(delay).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    return Ok(content);
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Completion request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map(DebateError::from).unwrap_or_else(|| {
            DebateError::ConfigError("Unknown API error after retries".to_string())
        }))
    }
}

/// Assemble the user turn: the request, the speech, then any evidence.
fn build_user_prompt(kind: ResponseKind, speech: &str, evidence: &[EvidenceDocument]) -> String {
    let mut prompt = format!("{}\n\nSPEECH:\n{}", kind.request(), speech.trim());
    if !evidence.is_empty() {
        prompt.push_str("\n\nEVIDENCE:\n");
        prompt.push_str(&evidence::render(evidence));
    }
    prompt
}

/// Sanitize AI response by stripping reasoning tokens and XML-like tags.
///
/// Removes patterns like <thinking>...</thinking>, <reflection>...</reflection>, etc.
/// Line breaks are kept so question lists stay one per line.
fn sanitize_response(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratchpad",
        "analysis",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    // Markdown emphasis and headings read badly when narrated.
    result = result.replace('*', "");
    if let Ok(heading_re) = regex::Regex::new(r"(?m)^#+\s*") {
        result = heading_re.replace_all(&result, "").to_string();
    }

    if let Ok(ws_re) = regex::Regex::new(r"[ \t]+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }
    if let Ok(blank_re) = regex::Regex::new(r"\n\s*\n+") {
        result = blank_re.replace_all(&result, "\n\n").to_string();
    }

    result
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
