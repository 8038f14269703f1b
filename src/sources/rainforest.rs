//! Rainforest product API client.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::ProductSource;
use crate::error::ClientError;
use crate::models::{ImageRef, ProductCandidate, ProductDetail, SearchConfig, is_valid_product_id};
use crate::utils::http::status_error;

#[derive(Debug, Deserialize)]
struct RequestInfo {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    credits_used_this_request: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    request_info: Option<RequestInfo>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    asin: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    ratings_total: Option<u64>,
    #[serde(default)]
    price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    #[serde(default)]
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    request_info: Option<RequestInfo>,
    #[serde(default)]
    product: Option<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    bestsellers_rank: Vec<BestsellerRank>,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    main_image: Option<Image>,
    #[serde(default)]
    buybox_winner: Option<BuyBox>,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BestsellerRank {
    #[serde(default)]
    rank: Option<u64>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    link: String,
    #[serde(default)]
    variant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuyBox {
    #[serde(default)]
    price: Option<Price>,
}

impl Product {
    fn is_empty(&self) -> bool {
        self.title.as_deref().is_none_or(str::is_empty)
            && self.images.is_empty()
            && self.main_image.is_none()
    }

    fn category_path(&self) -> Option<String> {
        if self.categories.is_empty() {
            return None;
        }
        Some(
            self.categories
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(" > "),
        )
    }

    fn bestseller_rank(&self) -> Option<String> {
        let first = self.bestsellers_rank.first()?;
        match (first.rank, first.category.as_deref()) {
            (Some(rank), Some(category)) => Some(format!("#{rank} in {category}")),
            (Some(rank), None) => Some(format!("#{rank}")),
            _ => None,
        }
    }
}

/// Client for the Rainforest API (`/request` endpoint).
#[derive(Debug)]
pub struct RainforestSource {
    client: Client,
    base_url: String,
    api_key: String,
    amazon_domain: String,
    credits_used: AtomicU64,
}

impl RainforestSource {
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Rejected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            amazon_domain: config.amazon_domain.clone(),
            credits_used: AtomicU64::new(0),
        })
    }

    /// API credits consumed by this client so far.
    pub fn credits_used(&self) -> u64 {
        self.credits_used.load(Ordering::Relaxed)
    }

    fn track_credits(&self, info: Option<&RequestInfo>) {
        if let Some(credits) = info.and_then(|i| i.credits_used_this_request) {
            self.credits_used.fetch_add(credits, Ordering::Relaxed);
        }
    }

    async fn request<T>(&self, params: &[(&str, &str)]) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/request", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("amazon_domain", self.amazon_domain.as_str()),
            ])
            .query(params)
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response.json::<T>().await.map_err(ClientError::from_transport)
    }

    async fn search_page(&self, keyword: &str, page: u32) -> Result<SearchResponse, ClientError> {
        let page = page.to_string();
        tracing::debug!(keyword, page = %page, "rainforest search");
        let response: SearchResponse = self
            .request(&[
                ("type", "search"),
                ("search_term", keyword),
                ("page", page.as_str()),
            ])
            .await?;

        self.track_credits(response.request_info.as_ref());
        if let Some(info) = &response.request_info
            && !info.success
        {
            return Err(ClientError::Rejected(
                info.message
                    .clone()
                    .unwrap_or_else(|| "search request unsuccessful".to_string()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProductSource for RainforestSource {
    fn name(&self) -> &str {
        "rainforest"
    }

    async fn search_products(
        &self,
        keyword: &str,
        page_limit: u32,
    ) -> Result<Vec<ProductCandidate>, ClientError> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for page in 1..=page_limit {
            let response = self.search_page(keyword, page).await?;
            if response.search_results.is_empty() {
                break;
            }

            for result in response.search_results {
                let Some(id) = result.asin.filter(|a| is_valid_product_id(a)) else {
                    tracing::warn!(keyword, page, "dropping search result without a valid ASIN");
                    continue;
                };
                if !seen.insert(id.clone()) {
                    continue;
                }

                let mut candidate =
                    ProductCandidate::new(id, result.title.unwrap_or_default(), keyword);
                candidate.page = page;
                candidate.position = candidates.len() as u32 + 1;
                candidate.brand = result.brand;
                candidate.link = result.link;
                candidate.price = result.price.and_then(|p| p.raw);
                candidate.rating = result.rating;
                candidate.ratings_total = result.ratings_total;
                candidates.push(candidate);
            }
        }

        tracing::debug!(keyword, found = candidates.len(), "search finished");
        Ok(candidates)
    }

    async fn fetch_detail(
        &self,
        candidate: &ProductCandidate,
    ) -> Result<ProductDetail, ClientError> {
        tracing::debug!(asin = %candidate.id, "rainforest product");
        let response: ProductResponse = self
            .request(&[("type", "product"), ("asin", candidate.id.as_str())])
            .await?;

        self.track_credits(response.request_info.as_ref());
        if let Some(info) = &response.request_info
            && !info.success
        {
            return Err(ClientError::NotFound(format!(
                "{}: {}",
                candidate.id,
                info.message.as_deref().unwrap_or("product request unsuccessful")
            )));
        }

        let product = response
            .product
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ClientError::NotFound(format!("{}: empty product", candidate.id)))?;

        let brand = product.brand.clone().or_else(|| candidate.brand.clone());
        let context = format!(
            "{} {}",
            brand.as_deref().unwrap_or_default(),
            product.title.as_deref().unwrap_or(&candidate.title)
        )
        .trim()
        .to_string();

        let mut images: Vec<ImageRef> = product
            .images
            .iter()
            .map(|img| ImageRef {
                product_id: candidate.id.clone(),
                url: img.link.clone(),
                variant: img.variant.clone(),
                context: context.clone(),
            })
            .collect();
        if images.is_empty()
            && let Some(main) = &product.main_image
        {
            images.push(ImageRef {
                product_id: candidate.id.clone(),
                url: main.link.clone(),
                variant: Some(main.variant.clone().unwrap_or_else(|| "MAIN".to_string())),
                context: context.clone(),
            });
        }

        Ok(ProductDetail {
            candidate: candidate.clone(),
            category: product.category_path(),
            bestseller_rank: product.bestseller_rank(),
            price: product
                .buybox_winner
                .as_ref()
                .and_then(|b| b.price.as_ref())
                .and_then(|p| p.raw.clone()),
            brand,
            images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "request_info": {"success": true, "credits_used_this_request": 1},
            "search_results": [
                {"asin": "B07XJ8C8F5", "title": "Kids Gummies", "brand": "Zarbee's",
                 "rating": 4.6, "ratings_total": 1200, "price": {"raw": "$12.99"}},
                {"title": "Sponsored thing without asin"}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.search_results.len(), 2);
        assert_eq!(
            parsed.search_results[0].price.as_ref().and_then(|p| p.raw.as_deref()),
            Some("$12.99")
        );
        assert_eq!(
            parsed.request_info.and_then(|i| i.credits_used_this_request),
            Some(1)
        );
    }

    #[test]
    fn test_product_derived_fields() {
        let body = r#"{
            "title": "Kids Multivitamin",
            "categories": [{"name": "Health"}, {"name": "Vitamins"}],
            "bestsellers_rank": [{"rank": 42, "category": "Children's Vitamins"}],
            "images": [{"link": "https://img/1.jpg", "variant": "MAIN"}]
        }"#;
        let product: Product = serde_json::from_str(body).unwrap();
        assert_eq!(product.category_path().as_deref(), Some("Health > Vitamins"));
        assert_eq!(
            product.bestseller_rank().as_deref(),
            Some("#42 in Children's Vitamins")
        );
        assert!(!product.is_empty());
    }

    #[test]
    fn test_empty_product() {
        let product: Product = serde_json::from_str("{}").unwrap();
        assert!(product.is_empty());
        assert_eq!(product.category_path(), None);
        assert_eq!(product.bestseller_rank(), None);
    }

    #[test]
    fn test_request_info_defaults_to_success() {
        let info: RequestInfo = serde_json::from_str("{}").unwrap();
        assert!(info.success);
    }
}
