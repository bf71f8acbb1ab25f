//! # Shopping Skills
//!
//! Every automated text-generation call the pipeline makes.
//!
//! ```text
//! Stage
//!   └── Skill (prompt + output schema)
//!         └── SkillRunner (budget, retries, decoding)
//!               └── TextGenerationService
//! ```
//!
//! - `ClassifySkill` - category and product type
//! - `ClarifySkill` - follow-up question for vague requests
//! - `RephraseSkill` - short canonical search string
//! - `FilterSkill` - filter relevance and answer matching

pub mod generation;
pub mod llm_helpers;
pub mod prompts;

pub mod clarify_skill;
pub mod classify_skill;
pub mod filter_skill;
pub mod rephrase_skill;

pub use clarify_skill::{ClarifyOutput, ClarifySkill};
pub use classify_skill::ClassifySkill;
pub use filter_skill::{FilterSkill, MatchOutput, RangeOutput, RelevanceOutput};
pub use generation::{
    ChatCompletionsClient, Generation, GenerationRequest, OutputSchema, TextGenerationService, Usage,
};
pub use llm_helpers::SkillRunner;
pub use rephrase_skill::RephraseSkill;
