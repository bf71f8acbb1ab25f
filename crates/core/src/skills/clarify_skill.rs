//! # Clarify Skill
//!
//! Decides whether the query needs a follow-up question and writes it.

use super::llm_helpers::SkillRunner;
use super::prompts;
use crate::error::PipelineError;
use crate::state::ProductClass;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const SKILL: &str = "clarify_query";

/// Output from the clarify skill
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClarifyOutput {
    /// Whether the request lacks details needed for a good search
    pub needs_clarification: bool,
    /// The single question to ask, empty when none is needed
    #[serde(default)]
    pub question: String,
}

impl ClarifyOutput {
    /// The question to ask, if one is needed and non-blank
    pub fn question(&self) -> Option<&str> {
        let question = self.question.trim();
        (self.needs_clarification && !question.is_empty()).then_some(question)
    }
}

pub struct ClarifySkill;

impl ClarifySkill {
    pub async fn run(
        pro_class: &ProductClass,
        query: &str,
        runner: &SkillRunner,
    ) -> Result<ClarifyOutput, PipelineError> {
        let prompt = format!("Product class: {}\nRequest so far: {}", pro_class, query);
        runner.structured(SKILL, prompts::CLARIFY, prompt).await
    }
}
