//! # Shopping Pipeline
//!
//! Orchestration core: the stage state machine, run budget, prompt
//! correlation over the message channel, and the orchestrator that ties
//! them to the collaborators.

pub mod budget;
pub mod config;
pub mod correlator;
pub mod orchestrator;
pub mod stages;

pub use budget::{BudgetLimits, UsageMeter};
pub use config::{FilterPromptMode, PipelineConfig, TimeoutPolicy};
pub use correlator::{PromptCorrelator, PromptScope};
pub use orchestrator::PipelineOrchestrator;
pub use stages::{Pipeline, PipelineStage};
