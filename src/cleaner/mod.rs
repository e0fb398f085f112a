//! Coerces raw scraped text into typed listing fields.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{NormalizeError, PipelineError, Result};
use crate::models::{FeatureValue, NormalizedListing, RawListing};

/// Digits only, e.g. `"GH₵ 2,500"` → `2500`. `None` when nothing numeric
/// remains or the value overflows.
pub fn clean_price(price: Option<&str>) -> Option<i64> {
    let digits: String = price?.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn first_number() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"(\d+)").expect("valid number pattern"))
}

fn day_month() -> &'static Regex {
    static DAY_MONTH: OnceLock<Regex> = OnceLock::new();
    DAY_MONTH.get_or_init(|| Regex::new(r"^(\d{2})/(\d{2})").expect("valid date pattern"))
}

/// Resolves the site's posted-time text against `now`.
///
/// Relative phrases (`"5 mins ago"`, `"3 hours ago"`, `"2 days ago"`) are
/// subtracted from `now`. A `DD/MM` date is placed in the current year, or
/// the previous one if that would be in the future. Anything else is
/// treated as just posted.
pub fn parse_posted_time(posted: Option<&str>, now: DateTime<Utc>) -> std::result::Result<DateTime<Utc>, NormalizeError> {
    let Some(posted) = posted else {
        return Ok(now);
    };
    let text = posted.trim().to_lowercase();
    let amount = || {
        first_number()
            .captures(&text)
            .and_then(|caps| caps[1].parse::<i64>().ok())
    };

    let offset = if text.contains("min") {
        amount().and_then(Duration::try_minutes)
    } else if text.contains("hour") {
        amount().and_then(Duration::try_hours)
    } else if text.contains("day") {
        amount().and_then(Duration::try_days)
    } else {
        None
    };
    if let Some(offset) = offset {
        return now
            .checked_sub_signed(offset)
            .ok_or_else(|| NormalizeError::InvalidDate(posted.to_string()));
    }

    if let Some(caps) = day_month().captures(&text) {
        let day: u32 = caps[1].parse().map_err(|_| NormalizeError::InvalidDate(posted.to_string()))?;
        let month: u32 = caps[2].parse().map_err(|_| NormalizeError::InvalidDate(posted.to_string()))?;
        let midnight = |year: i32| {
            NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt))
        };

        let this_year = midnight(now.year()).ok_or_else(|| NormalizeError::InvalidDate(posted.to_string()))?;
        if this_year <= now {
            return Ok(this_year);
        }
        return midnight(now.year() - 1).ok_or_else(|| NormalizeError::InvalidDate(posted.to_string()));
    }

    Ok(now)
}

/// Integer parse that never fails
pub fn safe_int(value: Option<&str>) -> Option<i64> {
    value?.trim().parse().ok()
}

/// Strips a `sqm` unit and turns purely numeric values into integers.
/// Anything else keeps its original text.
pub fn parse_features(raw: &BTreeMap<String, String>) -> BTreeMap<String, FeatureValue> {
    raw.iter()
        .map(|(key, value)| {
            let stripped = value.replace("sqm", "");
            let stripped = stripped.trim();
            let parsed = if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
                stripped.parse().ok().map(FeatureValue::Number)
            } else {
                None
            };
            (key.clone(), parsed.unwrap_or_else(|| FeatureValue::Text(value.clone())))
        })
        .collect()
}

pub fn clean_listing(raw: RawListing, now: DateTime<Utc>) -> std::result::Result<NormalizedListing, NormalizeError> {
    let posted_date = parse_posted_time(raw.posted_date.as_deref(), now)?;
    Ok(NormalizedListing {
        price: clean_price(raw.price.as_deref()),
        bedrooms: safe_int(raw.bedrooms.as_deref()),
        bathrooms: safe_int(raw.bathrooms.as_deref()),
        features: parse_features(&raw.features),
        posted_date,
        url: raw.url,
        listing_id: raw.listing_id,
        listing_type: raw.listing_type,
        title: raw.title,
        region: raw.region,
        area: raw.area,
        house_type: raw.house_type,
        amenities: raw.amenities,
        description: raw.description,
    })
}

/// Normalizes a batch relative to the current time
pub fn normalize(batch: Vec<RawListing>) -> Result<Vec<NormalizedListing>> {
    normalize_at(batch, Utc::now())
}

/// Normalizes every record it can; failures are logged by index and left
/// out. An empty result is an error.
pub fn normalize_at(batch: Vec<RawListing>, now: DateTime<Utc>) -> Result<Vec<NormalizedListing>> {
    info!("Cleaning {} listings...", batch.len());

    let mut cleaned = Vec::with_capacity(batch.len());
    for (i, raw) in batch.into_iter().enumerate() {
        match clean_listing(raw, now) {
            Ok(listing) => cleaned.push(listing),
            Err(e) => warn!("[SKIPPED] Listing {} due to error: {}", i, e),
        }
    }

    if cleaned.is_empty() {
        warn!("No valid listings after cleaning.");
        return Err(PipelineError::NothingNormalized);
    }
    Ok(cleaned)
}
