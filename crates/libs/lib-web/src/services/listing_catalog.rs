//! # HTTP Listing Catalog
//!
//! Reads listing summaries from the marketplace's listing service:
//!
//! ```text
//! GET {base}/listings/{id}  -> 200 {"id": 77, "title": "...", "city": "...", "price": 350000}
//!                           -> 404 when the listing does not exist
//! ```

use async_trait::async_trait;
use lib_core::dto::ListingSummary;
use lib_core::model::collab::ListingCatalog;
use lib_core::{AppError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpListingCatalog {
    http: Client,
    base_url: String,
}

impl HttpListingCatalog {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ListingCatalog for HttpListingCatalog {
    async fn listing_summary(&self, listing_id: i64) -> Result<Option<ListingSummary>> {
        let url = format!("{}/listings/{}", self.base_url, listing_id);
        debug!("[CATALOG] GET {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Listing catalog unreachable: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let listing = response
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("Listing catalog error: {}", e)))?
            .json::<ListingSummary>()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid listing catalog response: {}", e)))?;

        Ok(Some(listing))
    }
}
