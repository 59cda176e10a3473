//! Remote text rewrite.
//!
//! [`Rewriter`] is the seam between the text stage and the language model.
//! [`OpenAiRewriter`] talks to an OpenAI-compatible chat completions endpoint;
//! [`MockRewriter`] is used by tests.

use crate::defaults;
use crate::error::{PlainvoiceError, Result};
use crate::pipeline::{Unit, UnitTransform};
use crate::simplify::markdown::check_markdown;
use crate::simplify::prompt::build_prompt;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Rewrites one piece of text.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str) -> Result<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Settings for the chat completions client.
#[derive(Debug, Clone)]
pub struct RewriterConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat completions client.
pub struct OpenAiRewriter {
    client: reqwest::Client,
    endpoint: String,
    config: RewriterConfig,
}

impl OpenAiRewriter {
    /// Builds the HTTP client.
    ///
    /// # Errors
    /// Returns `MissingCredential` for an empty API key and `ClientSetup` if
    /// the client cannot be constructed.
    pub fn new(config: RewriterConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PlainvoiceError::MissingCredential {
                name: "OpenAI API key".to_string(),
                env_var: defaults::OPENAI_API_KEY_ENV.to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlainvoiceError::ClientSetup {
                message: e.to_string(),
            })?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        tracing::info!(model = %config.model, "rewrite client initialized");

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }
}

#[async_trait]
impl Rewriter for OpenAiRewriter {
    async fn rewrite(&self, text: &str) -> Result<String> {
        let prompt = build_prompt(text);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let body = serde_json::to_vec(&request).map_err(|e| PlainvoiceError::Rewrite {
            message: format!("Failed to encode request: {e}"),
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| PlainvoiceError::Rewrite {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(PlainvoiceError::RateLimited { retry_after });
        }

        let text = response.text().await.map_err(|e| PlainvoiceError::Rewrite {
            message: format!("Failed to read response: {e}"),
        })?;

        if !status.is_success() {
            return Err(PlainvoiceError::Rewrite {
                message: format!("API returned status {status}: {}", truncate(&text, 200)),
            });
        }

        parse_completion(&text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Extracts the first choice's content from a chat completions body.
fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| PlainvoiceError::InvalidResponse {
            message: format!("Failed to parse response: {e}"),
        })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| PlainvoiceError::InvalidResponse {
            message: "response has no message content".to_string(),
        })?;

    if content.trim().is_empty() {
        return Err(PlainvoiceError::InvalidResponse {
            message: "response content is empty".to_string(),
        });
    }
    Ok(content)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Unit transform that rewrites a unit and checks the result.
///
/// Markdown issues in the rewritten text are logged but the text is kept.
pub struct RewriteTransform {
    rewriter: Arc<dyn Rewriter>,
}

impl RewriteTransform {
    pub fn new(rewriter: Arc<dyn Rewriter>) -> Self {
        Self { rewriter }
    }
}

#[async_trait]
impl UnitTransform for RewriteTransform {
    type Output = String;

    async fn transform(&self, unit: &Unit) -> Result<String> {
        let rewritten = self.rewriter.rewrite(unit.payload()).await?;

        let issues = check_markdown(&rewritten);
        if !issues.is_empty() {
            let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
            tracing::warn!(
                unit = unit.index(),
                "markdown check failed ({}), keeping text as returned",
                issues.join(", ")
            );
        }
        Ok(rewritten)
    }

    fn name(&self) -> &str {
        self.rewriter.model_name()
    }
}

/// Mock rewriter for testing.
///
/// Wraps the input in a fixed prefix so tests can see which text went where.
#[derive(Debug, Clone, Default)]
pub struct MockRewriter {
    prefix: String,
    fail_containing: HashSet<String>,
    delay: Option<Duration>,
}

impl MockRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to every rewritten text.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Fail any text containing `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_containing.insert(marker.to_string());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Rewriter for MockRewriter {
    async fn rewrite(&self, text: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_containing.iter().any(|m| text.contains(m.as_str())) {
            return Err(PlainvoiceError::Rewrite {
                message: "mock rewrite failure".to_string(),
            });
        }
        Ok(format!("{}{}", self.prefix, text))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
