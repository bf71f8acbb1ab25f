//! Pipeline configuration.

use super::budget::BudgetLimits;
use crate::models::ModelConfig;
use crate::state::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_SITE: &str = "https://www.flipkart.com";

/// What a stage does when its question goes unanswered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Fail the run with `PromptTimeout`
    #[default]
    Abort,
    /// Carry on as if the question had been skipped
    Continue,
}

/// How filter questions are put to the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPromptMode {
    /// One question at a time, in filter order
    #[default]
    Sequential,
    /// All questions at once, answers gathered in filter order
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    pub budget: BudgetLimits,
    /// Attempts per text-generation call before the run fails
    pub max_attempts: u32,
    pub top_k: usize,
    /// `None` waits for answers indefinitely
    pub prompt_timeout_secs: Option<u64>,
    pub max_query_clarifications: u32,
    pub timeout_policy: TimeoutPolicy,
    pub filter_prompt_mode: FilterPromptMode,
    /// Target site per product category
    pub sites: BTreeMap<Category, String>,
    pub default_site: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            budget: BudgetLimits::default(),
            max_attempts: 3,
            top_k: 10,
            prompt_timeout_secs: Some(300),
            max_query_clarifications: 1,
            timeout_policy: TimeoutPolicy::default(),
            filter_prompt_mode: FilterPromptMode::default(),
            sites: BTreeMap::new(),
            default_site: DEFAULT_SITE.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_secs.map(Duration::from_secs)
    }

    /// Deterministic category to site mapping
    pub fn site_for(&self, category: Category) -> &str {
        self.sites
            .get(&category)
            .map(String::as_str)
            .unwrap_or(&self.default_site)
    }
}
