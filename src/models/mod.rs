use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Kind of listing index being scraped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Rent,
    Sale,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Rent => "rent",
            ListingType::Sale => "sale",
        }
    }

    /// Path fragment every detail-page link of this type contains
    pub fn href_filter(&self) -> &'static str {
        match self {
            ListingType::Rent => "/houses-apartments-for-rent/",
            ListingType::Sale => "/houses-apartments-for-sale/",
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered detail-page URL and the listing id embedded in it.
/// Two links for the same listing may differ only in their query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLink {
    pub url: String,
    pub listing_id: String,
}

impl ListingLink {
    /// Returns `None` when the URL is not a listing detail page.
    pub fn parse(url: &str) -> Option<Self> {
        extract_listing_id(url).map(|listing_id| Self {
            url: url.to_string(),
            listing_id,
        })
    }
}

fn listing_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-([a-zA-Z0-9]+)\.html").expect("valid listing id pattern"))
}

/// Pulls the opaque id out of a URL like `.../3-bedroom-flat-AbC123.html`
pub fn extract_listing_id(url: &str) -> Option<String> {
    listing_id_pattern()
        .captures(url)
        .map(|caps| caps[1].to_string())
}

/// Listing as scraped from the detail page, all text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawListing {
    pub url: String,
    pub listing_id: String,
    pub listing_type: ListingType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<String>,
    #[serde(default)]
    pub bathrooms: Option<String>,
    #[serde(default)]
    pub house_type: Option<String>,
    #[serde(default)]
    pub posted_date: Option<String>,
    #[serde(default)]
    pub amenities: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: BTreeMap<String, String>,
}

impl RawListing {
    /// Record with only the required fields set
    pub fn new(url: impl Into<String>, listing_id: impl Into<String>, listing_type: ListingType) -> Self {
        Self {
            url: url.into(),
            listing_id: listing_id.into(),
            listing_type,
            title: None,
            price: None,
            region: None,
            area: None,
            bedrooms: None,
            bathrooms: None,
            house_type: None,
            posted_date: None,
            amenities: None,
            description: None,
            features: BTreeMap::new(),
        }
    }
}

/// Value of a structured attribute after normalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(i64),
    Text(String),
}

/// Listing with typed price, counts, timestamp and features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedListing {
    pub url: String,
    pub listing_id: String,
    pub listing_type: ListingType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<i64>,
    #[serde(default)]
    pub bathrooms: Option<i64>,
    #[serde(default)]
    pub house_type: Option<String>,
    pub posted_date: DateTime<Utc>,
    #[serde(default)]
    pub amenities: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: BTreeMap<String, FeatureValue>,
}

/// Result of delivering one listing to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub listing_id: String,
    pub success: bool,
}
