//! # Shopwise Core
//!
//! The "Brain" of Shopwise - turns a free-text product request into ranked
//! candidates, asking the shopper for details along the way.
//!
//! ## Architecture
//!
//! - `pipeline/` - Stage sequence, budget, prompt correlation, orchestrator
//! - `filters` - Trimming and resolving site filters
//! - `skills/` - Text-generation calls (classify, clarify, rephrase, filters)
//! - `catalog/` - Product-search contract and HTTP client
//! - `channel` - Messages exchanged with the shopper
//! - `models` - LLM provider configuration
//! - `state/` - Run context, catalog types, run history
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopwise_core::pipeline::{PipelineConfig, PipelineOrchestrator, PromptCorrelator};
//!
//! let correlator = Arc::new(PromptCorrelator::new(Arc::new(outbound_tx)));
//! let orchestrator = PipelineOrchestrator::new(config, generator, catalog, correlator);
//! let result = orchestrator.run_and_report("wireless earbuds").await?;
//! ```

pub mod catalog;
pub mod channel;
pub mod error;
pub mod filters;
pub mod models;
pub mod pipeline;
pub mod skills;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
