//! # HTTP Catalog Client
//!
//! Talks to a product-search (scraper) service over REST:
//!
//! ```text
//! POST   {base}/sessions                         -> {"session_id": "..."}
//! GET    {base}/sessions/{id}/filters?site=&q=   -> [UserFilter]
//! POST   {base}/sessions/{id}/search             -> [Product]
//! DELETE {base}/sessions/{id}
//! ```

use super::{ProductSearchService, SessionHandle};
use crate::error::SearchError;
use crate::state::{Product, SiteFilterSet, UserFilter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize)]
struct OpenSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    site: &'a str,
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<&'a [UserFilter]>,
    top_k: usize,
}

/// REST client for the product-search service
pub struct HttpCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SearchError> {
        // Scraping a results page with filters applied is slow
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn session_url(&self, session: &SessionHandle) -> String {
        format!(
            "{}/sessions/{}",
            self.base_url,
            urlencoding::encode(session.id())
        )
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, SearchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Service {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))
    }
}

fn transport(e: reqwest::Error) -> SearchError {
    SearchError::Transport(e.to_string())
}

#[async_trait]
impl ProductSearchService for HttpCatalog {
    async fn open_session(&self) -> Result<SessionHandle, SearchError> {
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        let opened: OpenSessionResponse = Self::decode(response).await?;
        Ok(SessionHandle::new(opened.session_id))
    }

    async fn discover_filters(
        &self,
        session: &SessionHandle,
        site: &str,
        query: &str,
    ) -> Result<SiteFilterSet, SearchError> {
        let url = format!(
            "{}/filters?site={}&q={}",
            self.session_url(session),
            urlencoding::encode(site),
            urlencoding::encode(query)
        );
        let response = self.client.get(&url).send().await.map_err(transport)?;
        Self::decode(response).await
    }

    async fn search(
        &self,
        session: &SessionHandle,
        site: &str,
        query: &str,
        filters: Option<&[UserFilter]>,
        top_k: usize,
    ) -> Result<Vec<Product>, SearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.session_url(session)))
            .json(&SearchRequest {
                site,
                query,
                filters,
                top_k,
            })
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn close_session(&self, session: SessionHandle) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(self.session_url(&session))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(SearchError::Service {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}
