//! Product catalog sources.
//!
//! A source discovers candidates for a keyword and enriches a single
//! candidate with its detail page. Sources classify failures but never
//! retry; the orchestrator owns the retry policy.

mod rainforest;

pub use rainforest::RainforestSource;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::models::{ProductCandidate, ProductDetail};

/// Trait for product catalog backends.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Search for candidates, reading at most `page_limit` result pages.
    ///
    /// Candidates are returned in result order, without duplicates.
    async fn search_products(
        &self,
        keyword: &str,
        page_limit: u32,
    ) -> Result<Vec<ProductCandidate>, ClientError>;

    /// Fetch the detail page of a candidate.
    ///
    /// Fails with `ClientError::NotFound` when the product is delisted.
    async fn fetch_detail(&self, candidate: &ProductCandidate)
    -> Result<ProductDetail, ClientError>;
}
