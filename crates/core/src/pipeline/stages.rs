//! # Pipeline Stages
//!
//! The fixed stage sequence of a shopping run. Stages are never
//! reordered; clarify-query is the one stage that may repeat.

use serde::{Deserialize, Serialize};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Deriving the product class
    Classify,
    /// Asking the user for missing details
    ClarifyQuery,
    /// Collapsing query and clarifications into a search string
    Rephrase,
    /// Mapping the product class to a target site
    SelectSite,
    /// Fetching the site's filters for the query
    DiscoverFilters,
    /// Dropping non-discriminating and already specified filters
    TrimFilters,
    /// Asking the user about each remaining filter
    ClarifyFilters,
    /// Searching with the resolved filters
    RetrieveCandidates,
    /// Building the result
    Finalize,
    Complete,
    Failed,
}

impl PipelineStage {
    /// Name used in the flow log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::ClarifyQuery => "clarify_query",
            Self::Rephrase => "rephrase",
            Self::SelectSite => "select_site",
            Self::DiscoverFilters => "discover_filters",
            Self::TrimFilters => "trim_filters",
            Self::ClarifyFilters => "clarify_filters",
            Self::RetrieveCandidates => "retrieve_candidates",
            Self::Finalize => "finalize",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current stage
    pub stage: PipelineStage,
    /// Answered clarify-query rounds so far
    pub clarifications: u32,
    /// Rounds allowed before moving on
    pub max_clarifications: u32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Pipeline {
    pub fn new(max_clarifications: u32) -> Self {
        let mut pipeline = Self {
            stage: PipelineStage::Classify,
            clarifications: 0,
            max_clarifications,
        };
        pipeline.skip_exhausted_clarify();
        pipeline
    }

    /// Advance to the next stage
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            PipelineStage::Classify => PipelineStage::ClarifyQuery,
            PipelineStage::ClarifyQuery => PipelineStage::Rephrase,
            PipelineStage::Rephrase => PipelineStage::SelectSite,
            PipelineStage::SelectSite => PipelineStage::DiscoverFilters,
            PipelineStage::DiscoverFilters => PipelineStage::TrimFilters,
            PipelineStage::TrimFilters => PipelineStage::ClarifyFilters,
            PipelineStage::ClarifyFilters => PipelineStage::RetrieveCandidates,
            PipelineStage::RetrieveCandidates => PipelineStage::Finalize,
            PipelineStage::Finalize => PipelineStage::Complete,
            PipelineStage::Complete => PipelineStage::Complete,
            PipelineStage::Failed => PipelineStage::Failed,
        };
        self.skip_exhausted_clarify();
    }

    fn skip_exhausted_clarify(&mut self) {
        if self.stage == PipelineStage::ClarifyQuery && self.clarifications >= self.max_clarifications {
            self.stage = PipelineStage::Rephrase;
        }
    }

    /// Record an answered clarification. Stays on clarify-query while
    /// rounds remain; returns whether another round follows.
    pub fn clarified(&mut self) -> bool {
        self.clarifications += 1;
        if self.clarifications >= self.max_clarifications {
            self.advance();
            false
        } else {
            true
        }
    }

    /// Fail the pipeline
    pub fn fail(&mut self) {
        self.stage = PipelineStage::Failed;
    }

    /// Check if pipeline is complete
    pub fn is_complete(&self) -> bool {
        matches!(self.stage, PipelineStage::Complete | PipelineStage::Failed)
    }

    /// Check if pipeline succeeded
    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}
