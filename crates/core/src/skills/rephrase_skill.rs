//! # Rephrase Skill
//!
//! Collapses the query and its clarifications into a short search string.

use super::llm_helpers::SkillRunner;
use super::prompts;
use crate::error::PipelineError;
use regex::Regex;
use std::sync::OnceLock;

pub const SKILL: &str = "rephrase";

/// Longest search string kept, in words
pub const MAX_WORDS: usize = 7;

pub struct RephraseSkill;

impl RephraseSkill {
    pub async fn run(query: &str, runner: &SkillRunner) -> Result<String, PipelineError> {
        let prompt = format!("Request and added details: {}", query);
        let raw = runner.text(SKILL, prompts::REPHRASE, prompt).await?;
        let cleaned = canonicalize(&raw);
        // A reply made only of punctuation keeps the working query
        Ok(if cleaned.is_empty() {
            canonicalize(query)
        } else {
            cleaned
        })
    }

    /// Long or punctuated queries are worth rephrasing even without
    /// clarifications.
    pub fn is_needed(query: &str, clarified: bool) -> bool {
        clarified || query.split_whitespace().count() > MAX_WORDS || canonicalize(query) != query
    }
}

/// Strip punctuation, collapse whitespace, cap at [`MAX_WORDS`]
pub fn canonicalize(text: &str) -> String {
    static PUNCT: OnceLock<Regex> = OnceLock::new();
    let re = PUNCT.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex"));
    re.replace_all(text, " ")
        .split_whitespace()
        .take(MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}
