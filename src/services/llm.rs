use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;

/// One question to the AI provider. `instructions` becomes the system prompt.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub context: Option<String>,
    pub instructions: String,
}

impl AskRequest {
    fn prompt(&self) -> String {
        match &self.context {
            Some(context) if !context.is_empty() => format!("{}\n\n{}", context, self.question),
            _ => self.question.clone(),
        }
    }
}

/// The external answer API. Errors are returned as-is; callers decide on fallback.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn ask(&self, request: &AskRequest) -> Result<String>;
}

pub struct LLMClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

impl LLMClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(LLMClient {
            client: reqwest::Client::builder().build()?,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Rewriter for LLMClient {
    async fn ask(&self, request: &AskRequest) -> Result<String> {
        if request.question.trim().is_empty() {
            bail!("Question is required");
        }

        let mut request_builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": self.model,
                "system": request.instructions,
                "prompt": request.prompt(),
                "stream": false,
                "options": {
                    "temperature": self.temperature
                }
            }));

        if let Some(api_key) = &self.api_key {
            request_builder = request_builder.bearer_auth(api_key);
        }

        tracing::debug!(model = %self.model, "Sending AI request");
        let response = request_builder.send().await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            bail!("AI provider returned {}: {}", status, response_text);
        }

        let parsed: GenerateResponse = serde_json::from_str(&response_text)?;
        match parsed.response {
            Some(answer) => Ok(answer),
            None => bail!("AI provider response has no `response` field"),
        }
    }
}

const ASK_CONTEXT: &str =
    "Tell me about the subject in the question. Describe in brief. Less than 500 characters.";

/// Short lore lookup used by the reader UI.
pub async fn ask_about(rewriter: &dyn Rewriter, subject: &str, instructions: &str) -> Result<String> {
    let request = AskRequest {
        question: format!(
            "Tell me about: {}. Always answer how it is related to the main character. Describe the subject in brief. Total less than 500 characters.",
            subject.trim()
        ),
        context: Some(ASK_CONTEXT.to_string()),
        instructions: instructions.to_string(),
    };
    rewriter.ask(&request).await
}

pub const DEFAULT_REWRITE_STYLE: &str = "concise";

/// Rewrites arbitrary text in the requested style, `concise` when none is given.
pub async fn rewrite_text(rewriter: &dyn Rewriter, text: &str, style: Option<&str>) -> Result<String> {
    let style = style
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_REWRITE_STYLE);

    let request = AskRequest {
        question: text.to_string(),
        context: Some(format!(
            "Rewrite the following text in a {} style while maintaining the core meaning:",
            style
        )),
        instructions: String::new(),
    };
    let answer = rewriter.ask(&request).await?;
    if answer.trim().is_empty() {
        bail!("AI provider returned an empty rewrite");
    }
    Ok(answer)
}
