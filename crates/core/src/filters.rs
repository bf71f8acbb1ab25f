//! # Filter Engine
//!
//! Reconciles a site's filter vocabulary with what the shopper said.
//!
//! - `trim`: drop non-discriminating filters (one option or fewer), then
//!   drop filters the request already pins down. Input order is kept.
//! - `resolve`: turn one free-text answer into the filter to apply, or
//!   skip/drop it. Selections are always a subset of the declared options.

use crate::error::PipelineError;
use crate::skills::{FilterSkill, SkillRunner};
use crate::state::{FilterKind, SharedContext, UserFilter};
use std::collections::HashSet;

/// Outcome of asking about one filter
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Blank or lone punctuation answer
    Skip,
    /// The answer matched nothing the filter offers
    Drop,
    Apply(UserFilter),
}

pub struct FilterEngine;

impl FilterEngine {
    /// Answers that mean "skip this filter", checked before any match call
    pub fn is_skip(answer: Option<&str>) -> bool {
        let Some(answer) = answer.map(str::trim) else {
            return true;
        };
        let mut chars = answer.chars();
        match (chars.next(), chars.next()) {
            (None, _) => true,
            (Some(c), None) => c.is_ascii_punctuation(),
            _ => false,
        }
    }

    /// Filters offering more than one choice, in input order
    pub fn discriminating(filters: &[UserFilter]) -> Vec<UserFilter> {
        filters
            .iter()
            .filter(|f| f.option_count() > 1)
            .cloned()
            .collect()
    }

    pub async fn trim(
        site_filters: &[UserFilter],
        ctx: &SharedContext,
        runner: &SkillRunner,
    ) -> Result<Vec<UserFilter>, PipelineError> {
        let mut kept = Self::discriminating(site_filters);
        if kept.is_empty() {
            return Ok(kept);
        }

        let relevance = FilterSkill::relevance(&kept, ctx.original_query(), &ctx.query, runner).await?;
        let specified: HashSet<String> = relevance
            .already_specified
            .iter()
            .map(|name| normalize(name))
            .collect();
        kept.retain(|f| !specified.contains(&normalize(&f.name)));
        Ok(kept)
    }

    /// Options the filter declares. A boolean without explicit options
    /// offers a plain yes/no.
    pub fn vocabulary(filter: &UserFilter) -> Vec<String> {
        match (filter.kind, &filter.selection) {
            (FilterKind::Boolean, None) => vec!["Yes".to_string(), "No".to_string()],
            _ => filter.options().to_vec(),
        }
    }

    /// Keep only declared options, in declared order and spelling
    pub fn restrict(filter: &UserFilter, proposed: &[String]) -> Vec<String> {
        let wanted: HashSet<String> = proposed.iter().map(|o| normalize(o)).collect();
        Self::vocabulary(filter)
            .into_iter()
            .filter(|option| wanted.contains(&normalize(option)))
            .collect()
    }

    /// Map an answer onto the filter's declared options. Empty means the
    /// filter should be dropped, never "select all".
    pub async fn match_options(
        filter: &UserFilter,
        answer: &str,
        runner: &SkillRunner,
    ) -> Result<Vec<String>, PipelineError> {
        let mut query_filter = filter.clone();
        query_filter.selection = Some(Self::vocabulary(filter));
        let proposed = FilterSkill::select(&query_filter, answer, runner).await?;
        let selected = Self::restrict(filter, &proposed.selected);
        if selected.len() < proposed.selected.len() {
            tracing::debug!(
                filter = %filter.name,
                proposed = proposed.selected.len(),
                kept = selected.len(),
                "discarded undeclared options"
            );
        }
        Ok(selected)
    }

    pub async fn resolve(
        filter: &UserFilter,
        answer: Option<&str>,
        runner: &SkillRunner,
    ) -> Result<Resolution, PipelineError> {
        if Self::is_skip(answer) {
            return Ok(Resolution::Skip);
        }
        let answer = answer.map(str::trim).unwrap_or_default();

        if filter.kind == FilterKind::Range {
            let bounds = FilterSkill::bounds(filter, answer, runner).await?;
            return Ok(match (bounds.min, bounds.max) {
                (None, None) => Resolution::Drop,
                (Some(low), Some(high)) if low > high => {
                    Resolution::Apply(filter.with_range(Some(high), Some(low)))
                }
                (low, high) => Resolution::Apply(filter.with_range(low, high)),
            });
        }

        let selected = Self::match_options(filter, answer, runner).await?;
        if selected.is_empty() {
            tracing::warn!(filter = %filter.name, "answer matched no declared option, dropping filter");
            Ok(Resolution::Drop)
        } else {
            Ok(Resolution::Apply(filter.with_selection(selected)))
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
