//! Pipeline configuration.
//!
//! Read once at startup from `config/settings.toml` (or `--config PATH`) and
//! handed by reference to every component. Missing fields fall back to the
//! defaults below; a missing default file means all defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::ListingType;

pub const DEFAULT_CONFIG_PATH: &str = "config/settings.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scrape: ScrapeConfig,
    pub selectors: SelectorConfig,
    pub paths: PathConfig,
    pub api: ApiConfig,
    pub object_store: ObjectStoreConfig,
    pub trigger: TriggerConfig,
}

impl Config {
    /// Load from an explicit path, or from the default path if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse { path, source: e })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scrape.max_workers == 0 {
            return Err(ConfigError::Invalid("scrape.max_workers must be at least 1".into()));
        }
        if self.object_store.max_attempts == 0 {
            return Err(ConfigError::Invalid("object_store.max_attempts must be at least 1".into()));
        }
        if self.scrape.max_stagnant_scrolls == 0 {
            return Err(ConfigError::Invalid(
                "scrape.max_stagnant_scrolls must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Browser and crawl behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub base_url_rent: String,
    pub base_url_sale: String,

    /// Maximum scrolls on the index page; unset means scroll until stagnant
    pub max_scrolls: Option<u32>,

    /// Consecutive scrolls without new links before giving up (default: 3)
    pub max_stagnant_scrolls: u32,

    /// Wait after loading the index page (default: 3000)
    pub initial_load_ms: u64,

    /// Wait after each scroll for lazy content (default: 3000)
    pub scroll_pause_ms: u64,

    /// Wait before a worker starts extracting (default: 3000)
    pub pre_extract_delay_ms: u64,

    /// Wait after navigating to a detail page (default: 5000)
    pub page_settle_ms: u64,

    /// Cooldown after a 429 page before the single reload (default: 60)
    pub rate_limit_cooldown_secs: u64,

    /// Bound on every element wait (default: 15)
    pub element_timeout_secs: u64,

    /// Cap on concurrent browser sessions (default: 4)
    pub max_workers: usize,

    pub headless: bool,
    pub user_agent: Option<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url_rent: "https://jiji.com.gh/houses-apartments-for-rent".to_string(),
            base_url_sale: "https://jiji.com.gh/houses-apartments-for-sale".to_string(),
            max_scrolls: None,
            max_stagnant_scrolls: 3,
            initial_load_ms: 3000,
            scroll_pause_ms: 3000,
            pre_extract_delay_ms: 3000,
            page_settle_ms: 5000,
            rate_limit_cooldown_secs: 60,
            element_timeout_secs: 15,
            max_workers: 4,
            headless: true,
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

impl ScrapeConfig {
    pub fn entry_url(&self, listing_type: ListingType) -> &str {
        match listing_type {
            ListingType::Rent => &self.base_url_rent,
            ListingType::Sale => &self.base_url_sale,
        }
    }

    pub fn initial_load(&self) -> Duration {
        Duration::from_millis(self.initial_load_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn pre_extract_delay(&self) -> Duration {
        Duration::from_millis(self.pre_extract_delay_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    /// Worker count: hardware parallelism, capped by `max_workers`
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.min(self.max_workers).max(1)
    }
}

/// CSS selector candidates, tried in order. The site serves several markup
/// variants so most fields list more than one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub title: Vec<String>,
    pub price: Vec<String>,
    pub location: Vec<String>,
    pub icon_attribute: String,
    pub icon_label: String,
    pub attribute: String,
    pub attribute_key: String,
    pub attribute_value: String,
    pub amenities: Vec<String>,
    pub description: Vec<String>,
    pub rate_limit_marker: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            title: vec!["h1".to_string()],
            price: vec![
                ".qa-advert-price-view-value".to_string(),
                ".b-advert-price__value".to_string(),
            ],
            location: vec![
                ".b-advert-info-statistics.b-advert-info-statistics--region".to_string(),
                ".qa-advert-location".to_string(),
            ],
            icon_attribute: ".b-advert-icon-attribute".to_string(),
            icon_label: "span".to_string(),
            attribute: ".b-advert-attribute".to_string(),
            attribute_key: ".b-advert-attribute__key".to_string(),
            attribute_value: ".b-advert-attribute__value".to_string(),
            amenities: vec![
                ".b-advert-attributes__tag".to_string(),
                ".b-advert-badge__content".to_string(),
            ],
            description: vec![
                ".qa-description-text".to_string(),
                ".b-advert-description".to_string(),
            ],
            rate_limit_marker: "HTTP ERROR 429".to_string(),
        }
    }
}

/// Local directories for batch files and dead letters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub raw_dir: PathBuf,
    pub cleaned_dir: PathBuf,
    pub failed_dir: PathBuf,
    pub compressed_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            cleaned_dir: PathBuf::from("data/cleaned"),
            failed_dir: PathBuf::from("data/failed"),
            compressed_dir: PathBuf::from("data/compressed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/api/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub kind: ObjectStoreKind,
    /// Custom S3 endpoint such as MinIO; unset means AWS
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Root directory (local kind)
    pub root: PathBuf,
    /// Falls back to `AWS_ACCESS_KEY_ID`
    pub access_key_id: Option<String>,
    /// Falls back to `AWS_SECRET_ACCESS_KEY`
    pub secret_access_key: Option<String>,
    pub max_attempts: u32,
    /// Upload each raw scrape batch under `raw/{type}/`
    pub upload_raw: bool,
    pub source: String,
    pub version: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            kind: ObjectStoreKind::Local,
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: "real-estate-listings".to_string(),
            root: PathBuf::from("data/object_store"),
            access_key_id: None,
            secret_access_key: None,
            max_attempts: 3,
            upload_raw: true,
            source: "https://jiji.com.gh/".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Optional orchestrator notified after a scrape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub url: Option<String>,
    pub dag_id: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            url: None,
            dag_id: "real_estate_data_pipeline".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[scrape]
max_scrolls = 10
max_workers = 2

[api]
url = "http://api.internal/v1"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.scrape.max_scrolls, Some(10));
        assert_eq!(config.scrape.max_workers, 2);
        assert_eq!(config.scrape.max_stagnant_scrolls, 3);
        assert_eq!(config.api.url, "http://api.internal/v1");
        assert_eq!(config.selectors.title, vec!["h1".to_string()]);
        assert_eq!(config.object_store.kind, ObjectStoreKind::Local);
    }

    #[test]
    fn shipped_settings_parse() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/settings.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scrape.max_workers, 4);
        assert!(config.trigger.url.is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/settings.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scrape]\nmax_workers = 0").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn worker_count_is_capped() {
        let scrape = ScrapeConfig {
            max_workers: 1,
            ..ScrapeConfig::default()
        };
        assert_eq!(scrape.worker_count(), 1);
    }

    #[test]
    fn entry_url_follows_listing_type() {
        let scrape = ScrapeConfig::default();
        assert!(scrape.entry_url(ListingType::Sale).ends_with("for-sale"));
        assert!(scrape.entry_url(ListingType::Rent).ends_with("for-rent"));
    }
}
