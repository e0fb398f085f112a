use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

use crate::error::Result;
use crate::models::ListingType;

/// Directory of listings that could not be published, one file each
#[derive(Debug, Clone)]
pub struct DeadLetterStore {
    dir: PathBuf,
}

impl DeadLetterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{dir}/{type}_failed_{id}.json`; an empty id falls back to the
    /// current timestamp
    pub fn path_for(&self, listing_type: ListingType, listing_id: &str) -> PathBuf {
        let key = if listing_id.is_empty() {
            let now = Utc::now();
            format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
        } else {
            listing_id.to_string()
        };
        self.dir.join(format!("{}_failed_{}.json", listing_type, key))
    }

    pub async fn write<T: Serialize>(&self, listing_type: ListingType, listing_id: &str, record: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(listing_type, listing_id);
        fs::write(&path, serde_json::to_vec_pretty(record)?).await?;
        warn!("Dead-lettered {} to {}", listing_id, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn keyed_by_type_and_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeadLetterStore::new(dir.path().join("failed"));

        let path = store
            .write(ListingType::Rent, "Xy7Kq", &json!({"listing_id": "Xy7Kq"}))
            .await
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "rent_failed_Xy7Kq.json");

        let saved: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["listing_id"], "Xy7Kq");
    }

    #[test]
    fn empty_id_uses_timestamp() {
        let store = DeadLetterStore::new("/tmp/failed");
        let name = store.path_for(ListingType::Sale, "");
        let name = name.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sale_failed_"));
        assert!(name.trim_start_matches("sale_failed_").starts_with(|c: char| c.is_ascii_digit()));
    }
}
