//! # Error Types
//!
//! Typed failures for collaborator calls and pipeline runs.
//!
//! ```text
//! GenerationError ──(retries exhausted)──▶ PipelineError::Generation
//! UsageMeter      ──(quota exhausted)────▶ PipelineError::BudgetExceeded
//! PromptScope     ──(no answer, abort)───▶ PipelineError::PromptTimeout
//! SearchError     ───────────────────────▶ PipelineError::Search
//! ```
//!
//! Recovered conditions (empty filtered search, unmatched filter answer)
//! never surface here; they are recorded in the flow log.

use thiserror::Error;

/// Failure of a single text-generation call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("malformed output: {0}")]
    Malformed(String),

    #[error("missing API key in ${0}")]
    MissingApiKey(String),
}

/// Failure reported by the product-search service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("search service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("unknown search session: {0}")]
    UnknownSession(String),

    #[error("failed to decode search response: {0}")]
    Decode(String),
}

/// The outbound half of the message channel is gone.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("message channel closed")]
pub struct ChannelError;

/// Run-wide quota on automated text-generation calls was exhausted.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("budget exceeded: {calls}/{max_calls} calls, {tokens}/{max_tokens} tokens")]
pub struct BudgetExceeded {
    pub calls: u32,
    pub max_calls: u32,
    pub tokens: u64,
    pub max_tokens: u64,
}

/// Fatal failure of one pipeline run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("{skill} failed after {attempts} attempts: {source}")]
    Generation {
        skill: &'static str,
        attempts: u32,
        #[source]
        source: GenerationError,
    },

    #[error(transparent)]
    BudgetExceeded(#[from] BudgetExceeded),

    #[error("no answer to question {question_id} during {stage}")]
    PromptTimeout {
        stage: &'static str,
        question_id: String,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("product search failed: {0}")]
    Search(#[from] SearchError),
}

impl PipelineError {
    /// Short machine-friendly tag used in run history.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::Generation { .. } => "generation",
            Self::BudgetExceeded(_) => "budget_exceeded",
            Self::PromptTimeout { .. } => "prompt_timeout",
            Self::Channel(_) => "channel",
            Self::Search(_) => "search",
        }
    }
}
