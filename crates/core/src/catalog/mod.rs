//! # Product Search
//!
//! Contract for the product-search collaborator and the scoped session
//! guard the pipeline uses to talk to it.
//!
//! ```text
//! SearchSession::open ──▶ discover_filters ──▶ search (×1..2) ──▶ close
//!        │                                                          ▲
//!        └──────────── dropped without close: close spawned ────────┘
//! ```

pub mod http;

pub use http::HttpCatalog;

use crate::error::SearchError;
use crate::state::{Product, SiteFilterSet, UserFilter};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Opaque handle to a search session. Not `Clone`: exactly one owner.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External product-search service (site scraper, catalog API)
#[async_trait]
pub trait ProductSearchService: Send + Sync {
    async fn open_session(&self) -> Result<SessionHandle, SearchError>;

    async fn discover_filters(
        &self,
        session: &SessionHandle,
        site: &str,
        query: &str,
    ) -> Result<SiteFilterSet, SearchError>;

    /// An empty list is a valid answer, not an error.
    async fn search(
        &self,
        session: &SessionHandle,
        site: &str,
        query: &str,
        filters: Option<&[UserFilter]>,
        top_k: usize,
    ) -> Result<Vec<Product>, SearchError>;

    async fn close_session(&self, session: SessionHandle) -> Result<(), SearchError>;
}

/// Search session owned by the stages that use it.
///
/// `close` releases the session on every normal exit path; `Drop` only
/// covers a run future that was cancelled mid-flight.
pub struct SearchSession {
    service: Arc<dyn ProductSearchService>,
    handle: Option<SessionHandle>,
}

impl SearchSession {
    pub async fn open(service: Arc<dyn ProductSearchService>) -> Result<Self, SearchError> {
        let handle = service.open_session().await?;
        tracing::debug!(session = %handle, "search session opened");
        Ok(Self {
            service,
            handle: Some(handle),
        })
    }

    fn handle(&self) -> Result<&SessionHandle, SearchError> {
        self.handle
            .as_ref()
            .ok_or_else(|| SearchError::UnknownSession("closed".to_string()))
    }

    pub async fn discover_filters(&self, site: &str, query: &str) -> Result<SiteFilterSet, SearchError> {
        self.service
            .discover_filters(self.handle()?, site, query)
            .await
    }

    pub async fn search(
        &self,
        site: &str,
        query: &str,
        filters: Option<&[UserFilter]>,
        top_k: usize,
    ) -> Result<Vec<Product>, SearchError> {
        self.service
            .search(self.handle()?, site, query, filters, top_k)
            .await
    }

    pub async fn close(mut self) -> Result<(), SearchError> {
        match self.handle.take() {
            Some(handle) => {
                tracing::debug!(session = %handle, "search session closing");
                self.service.close_session(handle).await
            }
            None => Ok(()),
        }
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        tracing::warn!(session = %handle, "search session dropped without close");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let service = Arc::clone(&self.service);
            runtime.spawn(async move {
                if let Err(e) = service.close_session(handle).await {
                    tracing::warn!("deferred session close failed: {}", e);
                }
            });
        }
    }
}
