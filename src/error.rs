use std::path::PathBuf;
use thiserror::Error;

use crate::models::ListingType;

/// Step-level failures. Any of these makes the process exit non-zero.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Link discovery failed: {0:#}")]
    Discovery(anyhow::Error),

    #[error("No listing links found for {0}")]
    NoLinks(ListingType),

    #[error("No listings scraped for {listing_type} ({attempted} attempted)")]
    NothingScraped {
        listing_type: ListingType,
        attempted: usize,
    },

    #[error("No {listing_type} batch file found in {}", .dir.display())]
    BatchFileMissing {
        dir: PathBuf,
        listing_type: ListingType,
    },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No listings to publish")]
    EmptyBatch,

    #[error("No valid listings after cleaning")]
    NothingNormalized,

    #[error("Upload of {key} failed after {attempts} attempts: {last_error:#}")]
    UploadExhausted {
        key: String,
        attempts: u32,
        last_error: anyhow::Error,
    },

    #[error("Failed to set up {sink} client: {source:#}")]
    Client {
        sink: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("No batch paths given to trigger the DAG with")]
    NoTriggerPaths,

    #[error("No orchestrator configured ([trigger].url is unset)")]
    TriggerNotConfigured,

    #[error("DAG trigger failed: {0:#}")]
    Trigger(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a single detail page produced no record
#[derive(Error, Debug)]
pub enum ExtractionFailure {
    #[error("title not found on {url}")]
    MissingTitle { url: String },

    #[error("browser error on {url}: {source:#}")]
    Browser {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Why a single raw record could not be normalized
#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("invalid posted date '{0}'")]
    InvalidDate(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
