//! OpenAI-compatible chat completions provider
//!
//! Sends one chunk per request to a `/chat/completions` endpoint and asks the
//! model to act as a translator, or as an editor when a previous translation
//! of the chunk exists.
//!
//! # Configuration
//!
//! * `DELTA_I18N_API_KEY` - bearer token (required)
//! * `DELTA_I18N_API_BASE` - base URL, default `https://api.openai.com/v1`
//! * `DELTA_I18N_MODEL` - model name, default `gpt-4o-mini`
//!
//! # Example
//!
//! ```ignore
//! use delta_i18n::mt::{ChatTranslationProvider, MachineTranslator};
//!
//! let provider = ChatTranslationProvider::from_env()?;
//! let translated = provider.translate(&request).await?;
//! ```

use crate::context::TranslationRequest;
use crate::mt::error::{MtError, MtResult};
use crate::mt::translator::MachineTranslator;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You translate technical documentation written in Markdown/MDX. \
Return only the translated text of the chunk, on a single line, with no commentary. \
Keep inline code spans, HTML or JSX tags, link destinations and footnote references exactly as written. \
Translate link labels. Never translate or repeat the context passages.";

/// Chat completions translation provider
#[derive(Clone)]
pub struct ChatTranslationProvider {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatTranslationProvider {
    /// Request timeout for a single completion
    const TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a provider with explicit settings
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - New provider instance
    /// * `Err(MtError::Config)` - If the key or model is empty or the client cannot be built
    pub fn new(api_key: String, base_url: &str, model: String) -> MtResult<Self> {
        if api_key.trim().is_empty() {
            return Err(MtError::Config("API key cannot be empty".to_string()));
        }
        if model.trim().is_empty() {
            return Err(MtError::Config("Model name cannot be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| MtError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.trim().to_string(),
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
        })
    }

    /// Create a provider from the `DELTA_I18N_*` environment variables
    pub fn from_env() -> MtResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MtResult<Self> {
        let api_key = lookup("DELTA_I18N_API_KEY").ok_or_else(|| {
            MtError::Config("DELTA_I18N_API_KEY environment variable not set".to_string())
        })?;
        let base_url = lookup("DELTA_I18N_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = lookup("DELTA_I18N_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::new(api_key, &base_url, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn render_prompt(request: &TranslationRequest) -> String {
        let mut sections = vec![format!(
            "Translate this {} from {} to {}.",
            request.kind, request.source_locale, request.target_locale
        )];

        let context: Vec<String> = request
            .context_before
            .iter()
            .chain(request.context_after.iter())
            .map(|pair| format!("- {} => {}", pair.source, pair.translation))
            .collect();
        if !context.is_empty() {
            sections.push(format!(
                "Terminology context (do not translate):\n{}",
                context.join("\n")
            ));
        }

        if let Some(previous) = &request.previous {
            sections.push(format!(
                "The source text changed. Revise the existing translation, keeping its wording where the meaning is unchanged.\n\
                 Previous source: {}\n\
                 Previous translation: {}",
                previous.source, previous.translation
            ));
        }

        if request.strict && !request.preserve_spans.is_empty() {
            sections.push(format!(
                "Your previous answer altered protected markup. Copy each of these exactly, the same number of times:\n{}",
                request.preserve_spans.join("\n")
            ));
        }

        sections.push(format!("Text: {}", request.content));
        sections.join("\n\n")
    }

    fn classify_status(status: StatusCode, body: &str) -> MtError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            MtError::Unavailable(format!("API error ({}): {}", status, body))
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            MtError::Config(format!("API rejected credentials ({}): {}", status, body))
        } else {
            MtError::Translation(format!("API client error ({}): {}", status, body))
        }
    }
}

impl std::fmt::Debug for ChatTranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTranslationProvider")
            .field("api_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl MachineTranslator for ChatTranslationProvider {
    async fn translate(&self, request: &TranslationRequest) -> MtResult<String> {
        if request.content.trim().is_empty() {
            return Ok(String::new());
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::render_prompt(request),
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MtError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Self::classify_status(status, &error_text));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            MtError::Translation(format!("Failed to parse API response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| MtError::Translation("API response contained no translation".to_string()))
    }

    fn provider_name(&self) -> &str {
        "Chat Completions"
    }
}
