//! Persisted server configuration at `.shopwise/config.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shopwise_core::models::{LlmProvider, ModelConfig};
use shopwise_core::pipeline::{FilterPromptMode, PipelineConfig, TimeoutPolicy};
use std::path::Path;
use utoipa::ToSchema;

pub const CONFIG_PATH: &str = ".shopwise/config.json";

/// Overrides on top of the pipeline defaults; every field is optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, ToSchema)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_calls: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_query_clarifications: Option<u32>,
    /// "abort" or "continue"
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub timeout_policy: Option<TimeoutPolicy>,
    /// "sequential" or "concurrent"
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub filter_prompt_mode: Option<FilterPromptMode>,
}

impl PersistedConfig {
    pub async fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_PATH)).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn merge(&mut self, other: PersistedConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            provider,
            model,
            base_url,
            catalog_url,
            top_k,
            max_calls,
            max_tokens,
            prompt_timeout_secs,
            max_query_clarifications,
            timeout_policy,
            filter_prompt_mode
        );
    }

    /// Pipeline configuration with these overrides applied
    pub fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(provider) = self.provider.as_deref().and_then(LlmProvider::parse) {
            config.model = ModelConfig::for_provider(provider);
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.model = config.model.with_base_url(base_url.clone());
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k.max(1);
        }
        if let Some(max_calls) = self.max_calls {
            config.budget.max_calls = max_calls;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.budget.max_tokens = max_tokens;
        }
        if let Some(secs) = self.prompt_timeout_secs {
            config.prompt_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(rounds) = self.max_query_clarifications {
            config.max_query_clarifications = rounds;
        }
        if let Some(policy) = self.timeout_policy {
            config.timeout_policy = policy;
        }
        if let Some(mode) = self.filter_prompt_mode {
            config.filter_prompt_mode = mode;
        }
        config
    }
}
