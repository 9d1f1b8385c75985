//! Generative text client.
//!
//! Defines the [`TextGenerator`] trait and its implementations:
//! - **[`GeminiGenerator`]**: calls the Gemini `generateContent` endpoint.
//! - **[`DisabledGenerator`]**: always fails with [`GenerationError::Disabled`];
//!   used when `generation.provider = "disabled"`.
//!
//! Every failure is reported as a [`GenerationError`] variant. The variant
//! is chosen from structured response fields (HTTP status, `error.status`,
//! `error.details[].reason`, `promptFeedback.blockReason`,
//! `candidates[0].finishReason`), never from the wording of upstream error
//! messages.
//!
//! There is no retry: a failed call is reported once and the chat pipeline
//! decides what to show instead.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GenerationConfig;

/// Maximum length of an upstream message carried in an error.
const MAX_ERROR_MESSAGE_LENGTH: usize = 300;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

const INVALID_KEY_REASONS: [&str; 2] = ["API_KEY_INVALID", "API_KEY_EXPIRED"];

/// Text returned by a successful generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
    /// The model stopped at the output token limit.
    pub truncated: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation is disabled")]
    Disabled,

    #[error("API key not set")]
    MissingCredential,

    #[error("API key rejected: {0}")]
    InvalidCredential(String),

    #[error("model overloaded")]
    Overloaded,

    #[error("blocked by safety filter: {0}")]
    Blocked(String),

    #[error("output truncated with no usable text")]
    Truncated,

    #[error("response contained no text")]
    Empty,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

impl GenerationError {
    /// Whether the chat pipeline may answer with the plain lecture listing
    /// instead of this error.
    pub fn allows_listing_fallback(&self) -> bool {
        matches!(
            self,
            GenerationError::Disabled
                | GenerationError::Overloaded
                | GenerationError::Truncated
                | GenerationError::Empty
                | GenerationError::Malformed(_)
        )
    }

    /// Message shown to the student when no fallback applies.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::Disabled => {
                "المساعد الذكي غير مفعّل حالياً، ولم أجد محاضرات مطابقة لسؤالك.".to_string()
            }
            GenerationError::MissingCredential => {
                "مفتاح API غير موجود. يرجى إضافة المفتاح في متغيرات البيئة.".to_string()
            }
            GenerationError::InvalidCredential(_) => {
                "مفتاح API مسرب أو غير صالح. يرجى إنشاء مفتاح جديد من Google AI Studio وإضافته في ملف .env"
                    .to_string()
            }
            GenerationError::Overloaded => {
                "النموذج محمّل حالياً. يرجى المحاولة مرة أخرى بعد قليل.".to_string()
            }
            GenerationError::Blocked(_) => {
                "تم حظر الرد لأسباب أمنية. يرجى إعادة صياغة السؤال.".to_string()
            }
            GenerationError::Truncated => "الرد طويل جداً. يرجى المحاولة مرة أخرى.".to_string(),
            GenerationError::Empty | GenerationError::Malformed(_) => {
                "الرد فارغ. يرجى المحاولة مرة أخرى.".to_string()
            }
            GenerationError::Upstream { status, message } => {
                if message.is_empty() {
                    format!("خطأ في API: {}", status)
                } else {
                    format!("خطأ في API: {} - {}", status, message)
                }
            }
            GenerationError::Network(_) => {
                "حدث خطأ في الاتصال بالإنترنت. يرجى التحقق من اتصالك والمحاولة مرة أخرى."
                    .to_string()
            }
        }
    }
}

/// A backend that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.5-flash"`).
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<GeneratedText, GenerationError>;
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<GeneratedText, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

// ============ Gemini ============

/// Client for `POST {base_url}/models/{model}:generateContent`.
///
/// The API key is read once from the environment variable named by
/// `generation.api_key_env`. A missing key is not an error at construction;
/// each call then fails with [`GenerationError::MissingCredential`].
pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
    api_key: Option<String>,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(var = %config.api_key_env, "generation API key not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_body(&self, prompt: &str) -> Value {
        let safety: Vec<Value> = SAFETY_CATEGORIES
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_MEDIUM_AND_ABOVE" }))
            .collect();

        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "topK": self.config.top_k,
                "topP": self.config.top_p,
                "maxOutputTokens": self.config.max_output_tokens,
            },
            "safetySettings": safety,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedText, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredential)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        debug!(status, bytes = body.len(), "generateContent response");
        parse_generate_response(status, &body)
    }
}

/// Classify a `generateContent` HTTP response.
pub fn parse_generate_response(status: u16, body: &str) -> Result<GeneratedText, GenerationError> {
    if !(200..300).contains(&status) {
        return Err(classify_error_body(status, body));
    }

    let json: Value =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;

    let candidate = match json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        Some(c) => c,
        None => {
            if let Some(reason) = json
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
            {
                return Err(GenerationError::Blocked(reason.to_string()));
            }
            if json.get("error").is_some() {
                return Err(classify_error_body(status, body));
            }
            return Err(GenerationError::Empty);
        }
    };

    // First part that carries non-blank text
    let text = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .and_then(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .find(|t| !t.trim().is_empty())
        })
        .map(str::to_string);

    let finish_reason = candidate.get("finishReason").and_then(|r| r.as_str());

    if let Some(reason) = finish_reason {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            return Err(GenerationError::Blocked(reason.to_string()));
        }
    }

    let truncated = finish_reason == Some("MAX_TOKENS");
    match text {
        Some(text) => {
            if truncated {
                warn!("generation truncated at token limit; using partial text");
            }
            Ok(GeneratedText { text, truncated })
        }
        None if truncated => Err(GenerationError::Truncated),
        None => Err(GenerationError::Empty),
    }
}

fn classify_error_body(status: u16, body: &str) -> GenerationError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let api_status = error
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or_default();
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(truncate_message)
        .unwrap_or_else(|| truncate_message(body));
    let reasons: Vec<&str> = error
        .and_then(|e| e.get("details"))
        .and_then(|d| d.as_array())
        .map(|details| {
            details
                .iter()
                .filter_map(|d| d.get("reason").and_then(|r| r.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if reasons.iter().any(|r| INVALID_KEY_REASONS.contains(r))
        || matches!(status, 401 | 403)
        || matches!(api_status, "UNAUTHENTICATED" | "PERMISSION_DENIED")
    {
        return GenerationError::InvalidCredential(message);
    }

    if matches!(status, 429 | 503) || matches!(api_status, "UNAVAILABLE" | "RESOURCE_EXHAUSTED") {
        return GenerationError::Overloaded;
    }

    GenerationError::Upstream { status, message }
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_LENGTH {
        message.to_string()
    } else {
        let cut: String = message.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect();
        format!("{}...", cut)
    }
}

/// Create the configured generator.
///
/// | Config Value | Generator |
/// |-------------|-----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"gemini"` | [`GeminiGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}
