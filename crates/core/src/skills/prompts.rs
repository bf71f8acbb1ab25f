//! Default system prompts bundled at compile time.

/// Classifier - category and product type from the request
pub const CLASSIFY: &str = include_str!("defaults/classify.md");

/// Clarifier - one follow-up question when the request is too vague
pub const CLARIFY: &str = include_str!("defaults/clarify.md");

/// Query writer - short canonical search string
pub const REPHRASE: &str = include_str!("defaults/rephrase.md");

/// Relevance checker - filters the request already pins down
pub const TRIM_FILTERS: &str = include_str!("defaults/trim_filters.md");

/// Matcher - conversational answer to declared filter options
pub const MATCH_FILTER: &str = include_str!("defaults/match_filter.md");

/// Matcher - conversational answer to numeric bounds
pub const MATCH_RANGE: &str = include_str!("defaults/match_range.md");
