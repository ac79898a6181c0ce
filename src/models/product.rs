use serde::{Deserialize, Serialize};

pub const DEFAULT_CURRENCY: &str = "IDR";

/// Minimal product stub found on a search results page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub product_url: String,
    pub product_name: String,
    pub thumbnail_url: Option<String>,
    pub discovery_index: usize,
}

/// Raw field values read from a product page, before candidate fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_text: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub image_url: Option<String>,
    pub store_name: Option<String>,
}

impl DetailFields {
    /// Fields the page did not yield, named as in the selector chains. A price
    /// text that could not be parsed counts as missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", self.name.is_none()),
            ("price", self.price.is_none()),
            ("description", self.description.is_none()),
            ("image", self.image_url.is_none()),
            ("store", self.store_name.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product_url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: String,
    pub image_url: Option<String>,
    pub store_name: Option<String>,
    pub extraction_completeness: f64,
    pub discovery_index: usize,
}

impl ProductDetail {
    /// Merges page fields with the candidate, which supplies the name and
    /// image when the page yielded none.
    pub fn from_fields(candidate: &Candidate, fields: DetailFields) -> Self {
        let name = fields
            .name
            .or_else(|| non_empty(&candidate.product_name));
        let image_url = fields.image_url.or_else(|| candidate.thumbnail_url.clone());

        let mut detail = Self {
            product_url: candidate.product_url.clone(),
            name,
            description: fields.description,
            price: fields.price,
            currency: fields
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            image_url,
            store_name: fields.store_name,
            extraction_completeness: 0.0,
            discovery_index: candidate.discovery_index,
        };
        detail.extraction_completeness = detail.compute_completeness();
        detail
    }

    /// Partial record used when the detail page could not be loaded at all.
    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self::from_fields(candidate, DetailFields::default())
    }

    fn compute_completeness(&self) -> f64 {
        let present = [
            self.name.is_some(),
            self.description.is_some(),
            self.price.is_some(),
            self.image_url.is_some(),
            self.store_name.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        present as f64 / 5.0
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A detail with its ranking scores attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub detail: ProductDetail,
    pub relevance_score: f64,
    pub completeness_score: f64,
    pub composite_score: f64,
}

/// A finalist image stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub source_url: String,
    pub local_path: String,
    pub byte_size: u64,
}
