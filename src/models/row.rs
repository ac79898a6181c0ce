use serde::{Deserialize, Serialize};

/// Column order of every emitted row.
pub const OUTPUT_COLUMNS: [&str; 11] = [
    "input_keyword",
    "product_name",
    "description",
    "price",
    "currency",
    "image_url",
    "image_local_path",
    "store_name",
    "product_url",
    "source_site",
    "scraped_at",
];

/// One result row. Missing data is an empty string, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub input_keyword: String,
    pub product_name: String,
    pub description: String,
    pub price: String,
    pub currency: String,
    pub image_url: String,
    pub image_local_path: String,
    pub store_name: String,
    pub product_url: String,
    pub source_site: String,
    pub scraped_at: String,
}

impl OutputRow {
    /// Values in [`OUTPUT_COLUMNS`] order.
    pub fn values(&self) -> [&str; 11] {
        [
            self.input_keyword.as_str(),
            self.product_name.as_str(),
            self.description.as_str(),
            self.price.as_str(),
            self.currency.as_str(),
            self.image_url.as_str(),
            self.image_local_path.as_str(),
            self.store_name.as_str(),
            self.product_url.as_str(),
            self.source_site.as_str(),
            self.scraped_at.as_str(),
        ]
    }
}
