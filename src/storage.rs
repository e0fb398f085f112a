//! Timestamped batch files on local disk.
//!
//! Batches are JSON arrays named `{listing_type}_{YYYYMMDD_HHMMSS}.json`.
//! The timestamp is fixed-width, so the lexicographically greatest name is
//! the newest batch.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::ListingType;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn batch_file_name(listing_type: ListingType, at: DateTime<Utc>) -> String {
    format!("{}_{}.json", listing_type, timestamp(at))
}

/// Writes `records` as pretty JSON into a new timestamped file in `dir`
pub async fn write_batch<T: Serialize>(
    dir: &Path,
    listing_type: ListingType,
    records: &[T],
) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(batch_file_name(listing_type, Utc::now()));
    let json = serde_json::to_vec_pretty(records)?;
    fs::write(&path, json).await?;
    info!("💾 Saved {} records to {}", records.len(), path.display());
    Ok(path)
}

pub async fn read_batch<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !fs::try_exists(path).await? {
        return Err(PipelineError::FileNotFound(path.to_path_buf()));
    }
    let content = fs::read(path).await?;
    Ok(serde_json::from_slice(&content)?)
}

/// Newest batch of `listing_type` in `dir`, by the timestamp in its name
pub async fn latest_batch_file(dir: &Path, listing_type: ListingType) -> Result<PathBuf> {
    let missing = || PipelineError::BatchFileMissing {
        dir: dir.to_path_buf(),
        listing_type,
    };
    if !fs::try_exists(dir).await? {
        return Err(missing());
    }

    let pattern = Regex::new(&format!(r"^{}_(\d{{8}}_\d{{6}})\.json$", listing_type.as_str()))
        .expect("valid batch file pattern");

    let mut candidates = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(caps) = pattern.captures(name) {
            candidates.push((caps[1].to_string(), entry.path()));
        }
    }

    candidates
        .into_iter()
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
        .ok_or_else(missing)
}
