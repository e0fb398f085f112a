use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ScrapeConfig, SelectorConfig};
use crate::error::ExtractionFailure;
use crate::models::{ListingType, RawListing};
use crate::scrapers::traits::RenderedPage;

/// Turns a rendered listing detail page into a [`RawListing`]
#[derive(Debug, Clone)]
pub struct DetailExtractor {
    selectors: SelectorConfig,
    element_timeout: Duration,
    page_settle: Duration,
    rate_limit_cooldown: Duration,
}

/// Region, area and raw posted time split out of the location line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationParts {
    pub region: String,
    pub area: String,
    pub posted: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconAttributes {
    pub bedrooms: Option<String>,
    pub bathrooms: Option<String>,
    pub house_type: Option<String>,
}

impl DetailExtractor {
    pub fn new(config: &ScrapeConfig, selectors: &SelectorConfig) -> Self {
        Self {
            selectors: selectors.clone(),
            element_timeout: config.element_timeout(),
            page_settle: config.page_settle(),
            rate_limit_cooldown: config.rate_limit_cooldown(),
        }
    }

    /// Extract one listing. Browser errors anywhere in the routine come
    /// back as [`ExtractionFailure::Browser`]; nothing panics or escapes.
    pub fn extract(
        &self,
        page: &dyn RenderedPage,
        url: &str,
        listing_id: &str,
        listing_type: ListingType,
    ) -> Result<RawListing, ExtractionFailure> {
        self.try_extract(page, url, listing_id, listing_type)
            .map_err(|failure| match failure {
                Failure::MissingTitle => ExtractionFailure::MissingTitle {
                    url: url.to_string(),
                },
                Failure::Browser(source) => ExtractionFailure::Browser {
                    url: url.to_string(),
                    source,
                },
            })
    }

    fn try_extract(
        &self,
        page: &dyn RenderedPage,
        url: &str,
        listing_id: &str,
        listing_type: ListingType,
    ) -> Result<RawListing, Failure> {
        page.navigate(url)?;
        thread::sleep(self.page_settle);

        if page.content()?.contains(&self.selectors.rate_limit_marker) {
            warn!("Received 429 error on {}. Sleeping {:?} before retry...", url, self.rate_limit_cooldown);
            thread::sleep(self.rate_limit_cooldown);
            page.reload()?;
        }

        let Some(title) = self.first_text(page, &self.selectors.title)? else {
            warn!("[MISSING] Title not found for: {}", url);
            return Err(Failure::MissingTitle);
        };

        let price = self.first_text(page, &self.selectors.price)?;
        if price.is_none() {
            warn!("[MISSING] Price not found for: {}", url);
        }

        let location = match self.first_text(page, &self.selectors.location)? {
            Some(raw) => parse_location(&raw),
            None => {
                warn!("[MISSING] Location metadata not found for: {}", url);
                LocationParts::default()
            }
        };

        let icons = self.icon_attributes(page)?;
        let features = self.attribute_list(page)?;

        let mut amenities = BTreeSet::new();
        for selector in &self.selectors.amenities {
            amenities.extend(page.texts(selector)?.into_iter().filter(|t| !t.is_empty()));
        }

        let description = match self.first_text(page, &self.selectors.description)? {
            Some(raw) => clean_description(&raw),
            None => {
                warn!("[MISSING] Description not found for: {}", url);
                String::new()
            }
        };

        let mut listing = RawListing::new(url, listing_id, listing_type);
        listing.title = Some(title);
        listing.price = price;
        listing.region = Some(location.region);
        listing.area = Some(location.area);
        listing.posted_date = Some(location.posted);
        listing.bedrooms = icons.bedrooms;
        listing.bathrooms = icons.bathrooms;
        listing.house_type = icons.house_type;
        listing.amenities = Some(amenities.into_iter().collect::<Vec<_>>().join(", "));
        listing.description = Some(description);
        listing.features = features;
        Ok(listing)
    }

    /// First non-empty text among `candidates`, in order
    fn first_text(&self, page: &dyn RenderedPage, candidates: &[String]) -> anyhow::Result<Option<String>> {
        for selector in candidates {
            if let Some(text) = page.wait_for_text(selector, self.element_timeout)? {
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
        }
        Ok(None)
    }

    fn icon_attributes(&self, page: &dyn RenderedPage) -> anyhow::Result<IconAttributes> {
        let selector = &self.selectors.icon_attribute;
        let count = page.wait_for_count(selector, self.element_timeout)?;
        if count == 0 {
            warn!("[ICON ERROR] Icon features not found");
        }

        let mut icons = IconAttributes::default();
        for i in 0..count {
            match page.child_text(selector, i, &self.selectors.icon_label) {
                Ok(Some(text)) => classify_icon(&text, &mut icons),
                Ok(None) => debug!("[ICON SKIP] Icon block {} has no label", i),
                Err(e) => debug!("[ICON SKIP] Could not parse icon block {}: {}", i, e),
            }
        }
        Ok(icons)
    }

    fn attribute_list(
        &self,
        page: &dyn RenderedPage,
    ) -> anyhow::Result<std::collections::BTreeMap<String, String>> {
        let s = &self.selectors;
        let count = page.wait_for_count(&s.attribute, self.element_timeout)?;
        if count == 0 {
            warn!("[FEATURE ERROR] Structured features not found");
        }

        let mut features = std::collections::BTreeMap::new();
        for i in 0..count {
            let key = page.child_text(&s.attribute, i, &s.attribute_key);
            let value = page.child_text(&s.attribute, i, &s.attribute_value);
            match (key, value) {
                (Ok(Some(key)), Ok(Some(value))) => {
                    features.insert(feature_key(&key), value);
                }
                (Err(e), _) | (_, Err(e)) => {
                    debug!("[FEATURE SKIP] Label-value pair {} error: {}", i, e)
                }
                _ => debug!("[FEATURE SKIP] Label-value pair {} incomplete", i),
            }
        }
        Ok(features)
    }
}

enum Failure {
    MissingTitle,
    Browser(anyhow::Error),
}

impl From<anyhow::Error> for Failure {
    fn from(e: anyhow::Error) -> Self {
        Failure::Browser(e)
    }
}

/// `"Greater Accra, East Legon, 3 hours ago"` → region, area, posted
pub fn parse_location(raw: &str) -> LocationParts {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    LocationParts {
        region: parts.first().map(|s| s.to_string()).unwrap_or_default(),
        area: parts.get(1).map(|s| s.to_string()).unwrap_or_default(),
        posted: if parts.len() > 2 {
            parts[parts.len() - 1].to_string()
        } else {
            String::new()
        },
    }
}

fn digit_run() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid digit pattern"))
}

/// Sorts one icon label into bedrooms, bathrooms or house type.
/// Unmatched labels overwrite any earlier `house_type`.
pub fn classify_icon(label: &str, icons: &mut IconAttributes) {
    let text = label.trim().to_lowercase();
    let count = || digit_run().find(&text).map(|m| m.as_str().to_string());

    if text.contains("bedroom") {
        if let Some(n) = count() {
            icons.bedrooms = Some(n);
        }
    } else if text.contains("bathroom") {
        if let Some(n) = count() {
            icons.bathrooms = Some(n);
        }
    } else {
        icons.house_type = Some(capitalize(&text));
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `"Property Size"` → `"property_size"`
pub fn feature_key(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

fn whitespace_run() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s{2,}").expect("valid whitespace pattern"))
}

/// Collapses a bulleted, repetitive description into sentences.
pub fn clean_description(raw: &str) -> String {
    let mut seen = BTreeSet::new();
    let mut lines = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let cleaned = line
            .trim_matches(|c| c == '•' || c == '-' || c == ' ')
            .trim();
        if seen.insert(cleaned.to_string()) {
            lines.push(cleaned);
        }
    }

    if lines.is_empty() {
        return String::new();
    }

    let mut description = whitespace_run()
        .replace_all(&lines.join(". "), " ")
        .into_owned();
    if !description.ends_with('.') {
        description.push('.');
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::snapshot::{Frame, SnapshotPage};
    use std::collections::HashMap;
    use std::sync::Arc;

    const URL: &str = "https://jiji.com.gh/east-legon/houses-apartments-for-rent/2bdrm-apartment-Xy7Kq.html";

    fn extractor() -> DetailExtractor {
        let config = ScrapeConfig {
            page_settle_ms: 0,
            rate_limit_cooldown_secs: 0,
            element_timeout_secs: 0,
            ..ScrapeConfig::default()
        };
        DetailExtractor::new(&config, &SelectorConfig::default())
    }

    const DETAIL: &str = r#"
<html><body>
  <h1> 2 Bedroom Apartment for Rent </h1>
  <div class="b-advert-price__value">GH₵ 2,500</div>
  <div class="b-advert-info-statistics b-advert-info-statistics--region">Greater Accra, East Legon, 3 hours ago</div>
  <div class="b-advert-icon-attribute"><span>2 bedrooms</span></div>
  <div class="b-advert-icon-attribute"><span>3 bathrooms</span></div>
  <div class="b-advert-icon-attribute"><span>FURNISHED</span></div>
  <div class="b-advert-icon-attribute"><span>apartment</span></div>
  <div class="b-advert-attribute">
    <div class="b-advert-attribute__key">Property Size</div>
    <div class="b-advert-attribute__value">120 sqm</div>
  </div>
  <div class="b-advert-attribute">
    <div class="b-advert-attribute__key">Furnishing</div>
    <div class="b-advert-attribute__value">Semi-Furnished</div>
  </div>
  <div class="b-advert-attribute">
    <div class="b-advert-attribute__key">Orphan</div>
  </div>
  <span class="b-advert-attributes__tag">Wi-Fi</span>
  <span class="b-advert-attributes__tag">Balcony</span>
  <span class="b-advert-badge__content">Balcony</span>
  <span class="b-advert-badge__content">Air Conditioning</span>
  <div class="qa-description-text">• Spacious rooms
- Spacious rooms
Close to   the mall

Quiet area.</div>
</body></html>"#;

    #[test]
    fn extracts_full_detail_page() {
        let page = SnapshotPage::single(URL, DETAIL);
        let listing = extractor().extract(&page, URL, "Xy7Kq", ListingType::Rent).unwrap();

        assert_eq!(listing.title.as_deref(), Some("2 Bedroom Apartment for Rent"));
        assert_eq!(listing.price.as_deref(), Some("GH₵ 2,500"));
        assert_eq!(listing.region.as_deref(), Some("Greater Accra"));
        assert_eq!(listing.area.as_deref(), Some("East Legon"));
        assert_eq!(listing.posted_date.as_deref(), Some("3 hours ago"));
        assert_eq!(listing.bedrooms.as_deref(), Some("2"));
        assert_eq!(listing.bathrooms.as_deref(), Some("3"));
        // last unmatched icon wins
        assert_eq!(listing.house_type.as_deref(), Some("Apartment"));
        assert_eq!(listing.features.get("property_size").map(String::as_str), Some("120 sqm"));
        assert_eq!(listing.features.get("furnishing").map(String::as_str), Some("Semi-Furnished"));
        assert_eq!(listing.features.len(), 2);
        assert_eq!(listing.amenities.as_deref(), Some("Air Conditioning, Balcony, Wi-Fi"));
        assert_eq!(
            listing.description.as_deref(),
            Some("Spacious rooms. Close to the mall. Quiet area.")
        );
        assert_eq!(listing.listing_id, "Xy7Kq");
    }

    #[test]
    fn missing_title_fails_extraction() {
        let page = SnapshotPage::single(URL, r#"<div class="b-advert-price__value">GH₵ 10</div>"#);
        let err = extractor().extract(&page, URL, "Xy7Kq", ListingType::Rent).unwrap_err();
        assert!(matches!(err, ExtractionFailure::MissingTitle { .. }));
    }

    #[test]
    fn sparse_page_still_extracts() {
        let page = SnapshotPage::single(URL, "<h1>Shop space</h1>");
        let listing = extractor().extract(&page, URL, "Xy7Kq", ListingType::Sale).unwrap();

        assert_eq!(listing.price, None);
        assert_eq!(listing.region.as_deref(), Some(""));
        assert_eq!(listing.posted_date.as_deref(), Some(""));
        assert_eq!(listing.amenities.as_deref(), Some(""));
        assert_eq!(listing.description.as_deref(), Some(""));
        assert!(listing.features.is_empty());
        assert!(listing.house_type.is_none());
    }

    #[test]
    fn rate_limited_page_is_reloaded_once() {
        let mut pages = HashMap::new();
        pages.insert(
            URL.to_string(),
            vec![
                Frame::new("<html><body>HTTP ERROR 429</body></html>", 0),
                Frame::new("<h1>Recovered</h1>", 0),
            ],
        );
        let page = SnapshotPage::new(Arc::new(pages));

        let listing = extractor().extract(&page, URL, "Xy7Kq", ListingType::Rent).unwrap();
        assert_eq!(listing.title.as_deref(), Some("Recovered"));
    }

    #[test]
    fn navigation_error_becomes_failure_value() {
        let page = SnapshotPage::single("https://other.test/", "<h1>x</h1>");
        let err = extractor().extract(&page, URL, "Xy7Kq", ListingType::Rent).unwrap_err();
        assert!(matches!(err, ExtractionFailure::Browser { .. }));
    }

    #[test]
    fn location_needs_three_parts_for_posted_time() {
        assert_eq!(
            parse_location("Greater Accra, Osu"),
            LocationParts {
                region: "Greater Accra".into(),
                area: "Osu".into(),
                posted: String::new(),
            }
        );
        let parts = parse_location("Ashanti, Kumasi, Adum, 15/03");
        assert_eq!(parts.area, "Kumasi");
        assert_eq!(parts.posted, "15/03");
    }

    #[test]
    fn icon_classification() {
        let mut icons = IconAttributes::default();
        classify_icon("4 Bedrooms", &mut icons);
        classify_icon("Bathrooms", &mut icons);
        classify_icon("parking", &mut icons);
        classify_icon("duplex house", &mut icons);
        assert_eq!(icons.bedrooms.as_deref(), Some("4"));
        assert_eq!(icons.bathrooms, None);
        assert_eq!(icons.house_type.as_deref(), Some("Duplex house"));
    }

    #[test]
    fn description_keeps_single_trailing_period() {
        assert_eq!(clean_description("Nice place."), "Nice place.");
        assert_eq!(clean_description("  \n  "), "");
        assert_eq!(feature_key(" Number Of Floors "), "number_of_floors");
    }
}
