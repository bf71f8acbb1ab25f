//! # Filter Skills
//!
//! The text-generation calls behind filter trimming and answer matching.
//! Their outputs are raw; `FilterEngine` validates them against the
//! declared filters.

use super::llm_helpers::SkillRunner;
use super::prompts;
use crate::error::PipelineError;
use crate::state::UserFilter;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const TRIM_SKILL: &str = "trim_filters";
pub const MATCH_SKILL: &str = "match_filter";
pub const RANGE_SKILL: &str = "match_range";

/// Filters whose value the request already states
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RelevanceOutput {
    /// Names of filters already pinned down by the request
    #[serde(default)]
    pub already_specified: Vec<String>,
}

/// Options a conversational answer intends
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MatchOutput {
    /// Declared options selected by the answer
    #[serde(default)]
    pub selected: Vec<String>,
}

/// Numeric bounds extracted from an answer
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RangeOutput {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

pub struct FilterSkill;

impl FilterSkill {
    pub async fn relevance(
        filters: &[UserFilter],
        original_query: &str,
        query: &str,
        runner: &SkillRunner,
    ) -> Result<RelevanceOutput, PipelineError> {
        let listing = filters
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Filters available:\n{}\n\nOriginal request: {}\nRequest with details: {}",
            listing, original_query, query
        );
        runner.structured(TRIM_SKILL, prompts::TRIM_FILTERS, prompt).await
    }

    pub async fn select(
        filter: &UserFilter,
        answer: &str,
        runner: &SkillRunner,
    ) -> Result<MatchOutput, PipelineError> {
        let options = filter
            .options()
            .iter()
            .map(|o| format!("- {}", o))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Filter: {}\nDeclared options:\n{}\n\nAnswer: {}",
            filter.name, options, answer
        );
        runner.structured(MATCH_SKILL, prompts::MATCH_FILTER, prompt).await
    }

    pub async fn bounds(
        filter: &UserFilter,
        answer: &str,
        runner: &SkillRunner,
    ) -> Result<RangeOutput, PipelineError> {
        let prompt = format!("Filter: {}\n\nAnswer: {}", filter, answer);
        runner.structured(RANGE_SKILL, prompts::MATCH_RANGE, prompt).await
    }
}
