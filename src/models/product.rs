//! Product models flowing through the pipeline stages.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Check that an identifier looks like an ASIN.
pub fn is_valid_product_id(id: &str) -> bool {
    static ASIN: OnceLock<Regex> = OnceLock::new();
    ASIN.get_or_init(|| Regex::new(r"^[A-Z0-9]{10}$").expect("static regex"))
        .is_match(id)
}

/// A product discovered by the search stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    /// ASIN-like identifier
    pub id: String,
    pub title: String,
    /// Search keyword that surfaced the product
    pub keyword: String,
    /// Result page the product was found on (1-based)
    pub page: u32,
    /// Rank across all pages of the keyword's results (1-based)
    pub position: u32,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub ratings_total: Option<u64>,
}

impl ProductCandidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            keyword: keyword.into(),
            page: 1,
            position: 1,
            brand: None,
            link: None,
            price: None,
            rating: None,
            ratings_total: None,
        }
    }
}

/// Reference to a product image handed to the vision stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub product_id: String,
    pub url: String,
    /// Image slot label reported by the catalog (e.g. `MAIN`, `PT01`)
    pub variant: Option<String>,
    /// Free text describing the product, used to prime the vision model
    pub context: String,
}

impl ImageRef {
    fn is_main(&self) -> bool {
        self.variant
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("main"))
    }
}

/// A candidate enriched by the detail-fetch stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDetail {
    pub candidate: ProductCandidate,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub bestseller_rank: Option<String>,
    pub price: Option<String>,
    pub images: Vec<ImageRef>,
}

impl ProductDetail {
    /// Images worth sending to the vision model, most promising first.
    ///
    /// The facts panel is rarely the main listing photo, so `MAIN` images
    /// move to the back. Relative order is otherwise preserved.
    pub fn panel_images(&self, max: usize) -> Vec<ImageRef> {
        let (main, rest): (Vec<&ImageRef>, Vec<&ImageRef>) =
            self.images.iter().partition(|img| img.is_main());

        rest.into_iter()
            .chain(main)
            .take(max)
            .cloned()
            .collect()
    }

    /// Brand from the detail page, falling back to the search result.
    pub fn brand(&self) -> Option<&str> {
        self.brand
            .as_deref()
            .or(self.candidate.brand.as_deref())
            .filter(|b| !b.is_empty())
    }
}

/// One structured fact read from a supplement-facts panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub product_id: String,
    pub nutrient: String,
    pub amount: String,
    pub unit: String,
    pub daily_value: Option<String>,
    pub serving_size: Option<String>,
    pub form: Option<String>,
    pub age_group: Option<String>,
}

/// One line of the output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub product_id: String,
    pub keyword: String,
    pub title: String,
    pub brand: String,
    pub category: String,
    pub bestseller_rank: String,
    pub price: String,
    pub image_url: String,
    pub nutrient: String,
    pub amount: String,
    pub unit: String,
    pub daily_value: String,
    pub serving_size: String,
    pub form: String,
    pub age_group: String,
    pub extracted_at: String,
}

impl OutputRow {
    /// Column names, in file order.
    pub const HEADER: [&'static str; 16] = [
        "product_id",
        "keyword",
        "title",
        "brand",
        "category",
        "bestseller_rank",
        "price",
        "image_url",
        "nutrient",
        "amount",
        "unit",
        "daily_value",
        "serving_size",
        "form",
        "age_group",
        "extracted_at",
    ];

    /// Join a product's detail with one of its extracted facts.
    pub fn from_fact(detail: &ProductDetail, image_url: &str, fact: ExtractedFact) -> Self {
        let candidate = &detail.candidate;
        Self {
            product_id: fact.product_id,
            keyword: candidate.keyword.clone(),
            title: candidate.title.clone(),
            brand: detail.brand().unwrap_or_default().to_string(),
            category: detail.category.clone().unwrap_or_default(),
            bestseller_rank: detail.bestseller_rank.clone().unwrap_or_default(),
            price: detail
                .price
                .clone()
                .or_else(|| candidate.price.clone())
                .unwrap_or_default(),
            image_url: image_url.to_string(),
            nutrient: fact.nutrient,
            amount: fact.amount,
            unit: fact.unit,
            daily_value: fact.daily_value.unwrap_or_default(),
            serving_size: fact.serving_size.unwrap_or_default(),
            form: fact.form.unwrap_or_default(),
            age_group: fact.age_group.unwrap_or_default(),
            extracted_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
