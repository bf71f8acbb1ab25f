//! # Shopwise API
//!
//! Shared application state plus the websocket and REST handlers.

pub mod chat;
pub mod runs;

use crate::config::{PersistedConfig, CONFIG_PATH};
use chrono::{DateTime, Utc};
use shopwise_core::catalog::ProductSearchService;
use shopwise_core::pipeline::PipelineConfig;
use shopwise_core::state::RunHistory;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state
pub struct AppState {
    /// Overrides persisted at `.shopwise/config.json`
    pub config: RwLock<PersistedConfig>,
    pub config_path: PathBuf,
    pub catalog: Arc<dyn ProductSearchService>,
    pub history: RunHistory,
    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: PersistedConfig, catalog: Arc<dyn ProductSearchService>, history: RunHistory) -> Self {
        Self {
            config: RwLock::new(config),
            config_path: PathBuf::from(CONFIG_PATH),
            catalog,
            history,
            started_at: Utc::now(),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Pipeline configuration for the next run
    pub async fn pipeline_config(&self) -> PipelineConfig {
        self.config.read().await.apply(PipelineConfig::default())
    }
}
