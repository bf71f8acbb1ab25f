//! # Text Generation
//!
//! Contract for the text-generation collaborator plus the
//! OpenAI-compatible chat-completions client used in production.

use crate::error::GenerationError;
use crate::models::ModelConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// JSON schema the output must follow
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// One generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Calling skill, for logs and scripted test replies
    pub skill: &'static str,
    pub system: &'static str,
    pub prompt: String,
    pub schema: Option<OutputSchema>,
}

/// Token usage reported for a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Rough estimate (4 chars per token) when the provider reports nothing
    pub fn estimate(prompt: &str, output: &str) -> Self {
        Self {
            input_tokens: prompt.len().div_ceil(4) as u64,
            output_tokens: output.len().div_ceil(4) as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Usage,
}

/// External text-generation service
#[async_trait]
pub trait TextGenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError>;
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI-compatible chat-completions client
pub struct ChatCompletionsClient {
    config: ModelConfig,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    /// Build a client, reading the API key from the provider's env var
    pub fn from_env(config: ModelConfig) -> Result<Self, GenerationError> {
        let var = config.provider.env_var();
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(var.to_string()))?;
        Self::new(config, api_key)
    }

    pub fn new(config: ModelConfig, api_key: impl Into<String>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            api_key: api_key.into(),
            client,
        })
    }

    fn body(&self, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
        });
        if let Some(schema) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                },
            });
        }
        body
    }
}

#[async_trait]
impl TextGenerationService for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Malformed("response has no content".into()))?;

        let usage = match chat.usage {
            Some(u) => Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            },
            None => Usage::estimate(&request.prompt, &text),
        };

        Ok(Generation { text, usage })
    }
}
