use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::{ObjectStoreConfig, ObjectStoreKind};
use crate::error::PipelineError;
use crate::models::{ListingType, NormalizedListing, RawListing};
use crate::retry::{retry, RetryOutcome, RetryPolicy};
use crate::storage;

const GZIP: &str = "application/gzip";
const JSON: &str = "application/json";

/// Minimal bucket interface: make sure it exists, put bytes, attach tags
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn ensure_bucket(&self) -> Result<()>;

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    async fn put_tags(&self, key: &str, tags: &[(String, String)]) -> Result<()>;

    /// Human-readable location, e.g. `s3://bucket/key`
    fn uri(&self, key: &str) -> String;
}

pub fn from_config(config: &ObjectStoreConfig) -> Result<Box<dyn ObjectStore>> {
    match config.kind {
        ObjectStoreKind::Local => Ok(Box::new(LocalObjectStore::new(config.root.join(&config.bucket)))),
        ObjectStoreKind::S3 => Ok(Box::new(S3ObjectStore::new(config)?)),
    }
}

/// Amazon S3, or any SigV4 endpoint such as MinIO when `endpoint` is set
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3ObjectStore {
    /// Credentials come from the config, falling back to
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    pub fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let access_key = config
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .ok_or_else(|| anyhow!("object_store.access_key_id or AWS_ACCESS_KEY_ID is required"))?;
        let secret_key = config
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .ok_or_else(|| anyhow!("object_store.secret_access_key or AWS_SECRET_ACCESS_KEY is required"))?;
        let credentials = Credentials::new(Some(&access_key), Some(&secret_key), None, None, None)
            .context("Invalid S3 credentials")?;

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
            },
            None => config
                .region
                .parse()
                .with_context(|| format!("Unknown S3 region '{}'", config.region))?,
        };
        // Custom endpoints (MinIO, localstack) only resolve path-style
        let path_style = config.endpoint.is_some();

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .context("Failed to configure S3 bucket")?;
        if path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            region,
            credentials,
            path_style,
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self) -> Result<()> {
        if self.bucket.exists().await? {
            info!("Bucket '{}' already exists.", self.bucket.name());
            return Ok(());
        }

        info!("Creating bucket: {}", self.bucket.name());
        // BucketConfiguration carries the LocationConstraint for non-default regions
        let name = self.bucket.name();
        let config = BucketConfiguration::default();
        if self.path_style {
            Bucket::create_with_path_style(&name, self.region.clone(), self.credentials.clone(), config).await?;
        } else {
            Bucket::create(&name, self.region.clone(), self.credentials.clone(), config).await?;
        }
        Ok(())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.bucket
            .put_object_with_content_type(key, &body, content_type)
            .await?;
        Ok(())
    }

    async fn put_tags(&self, key: &str, tags: &[(String, String)]) -> Result<()> {
        let tags: Vec<(&str, &str)> = tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        self.bucket.put_object_tagging(key, &tags).await?;
        Ok(())
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket.name(), key)
    }
}

/// Directory-backed store; tags live in a `.tags.json` sidecar
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn ensure_bucket(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, body).await?;
        Ok(())
    }

    async fn put_tags(&self, key: &str, tags: &[(String, String)]) -> Result<()> {
        let path = self.path_for(&format!("{}.tags.json", key));
        let map: std::collections::BTreeMap<_, _> = tags.iter().cloned().collect();
        fs::write(&path, serde_json::to_vec_pretty(&map)?).await?;
        Ok(())
    }

    fn uri(&self, key: &str) -> String {
        format!("file://{}", self.path_for(key).display())
    }
}

#[derive(Debug, Serialize)]
pub struct EnvelopeMetadata {
    pub scraped_at: String,
    pub listing_type: ListingType,
    pub listing_count: usize,
    pub scraper_version: String,
    pub cleaned: bool,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub metadata: EnvelopeMetadata,
    pub data: &'a [NormalizedListing],
}

/// Where and how an object-store publish writes
#[derive(Debug, Clone)]
pub struct ObjectPublishOptions {
    pub compressed_dir: PathBuf,
    pub retry: RetryPolicy,
    pub version: String,
    pub source: String,
}

impl ObjectPublishOptions {
    pub fn from_config(config: &ObjectStoreConfig, compressed_dir: &Path) -> Self {
        Self {
            compressed_dir: compressed_dir.to_path_buf(),
            retry: RetryPolicy::exponential(config.max_attempts),
            version: config.version.clone(),
            source: config.source.clone(),
        }
    }
}

pub fn object_key(listing_type: ListingType, timestamp: &str) -> String {
    format!("listings/{0}/{0}_{1}.json.gz", listing_type, timestamp)
}

/// Key of an uncompressed raw scrape batch
pub fn raw_object_key(listing_type: ListingType, timestamp: &str) -> String {
    format!("raw/{0}/{0}_{1}.json", listing_type, timestamp)
}

fn gzip_json<T: Serialize>(value: &T) -> Result<Vec<u8>, PipelineError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer_pretty(&mut encoder, value)?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

/// Ensures the bucket and puts `body`, retrying both together
async fn upload_with_retry(
    store: &dyn ObjectStore,
    key: &str,
    body: Vec<u8>,
    content_type: &str,
    policy: &RetryPolicy,
) -> Result<(), PipelineError> {
    let label = format!("Upload of {}", key);
    let outcome = retry(policy, &label, || {
        let body = body.clone();
        async move {
            store.ensure_bucket().await?;
            store.put_object(key, body, content_type).await
        }
    })
    .await;

    match outcome {
        RetryOutcome::Succeeded { .. } => Ok(()),
        RetryOutcome::Exhausted {
            attempts,
            last_error,
        } => Err(PipelineError::UploadExhausted {
            key: key.to_string(),
            attempts,
            last_error,
        }),
    }
}

/// Wraps the batch in a metadata envelope, gzips it to the compressed dir
/// and uploads it with retry. Returns the uploaded object's URI.
pub async fn publish_to_object_store(
    listings: &[NormalizedListing],
    listing_type: ListingType,
    store: &dyn ObjectStore,
    options: &ObjectPublishOptions,
) -> Result<String, PipelineError> {
    if listings.is_empty() {
        warn!("No listings to publish.");
        return Err(PipelineError::EmptyBatch);
    }

    let now = Utc::now();
    let envelope = Envelope {
        metadata: EnvelopeMetadata {
            scraped_at: now.to_rfc3339(),
            listing_type,
            listing_count: listings.len(),
            scraper_version: options.version.clone(),
            cleaned: true,
            source: options.source.clone(),
        },
        data: listings,
    };

    let ts = storage::timestamp(now);
    let body = gzip_json(&envelope)?;

    fs::create_dir_all(&options.compressed_dir).await?;
    let local_path = options
        .compressed_dir
        .join(format!("{}_{}.json.gz", listing_type, ts));
    fs::write(&local_path, &body).await?;
    info!("💾 Compressed {} listings to {}", listings.len(), local_path.display());

    let key = object_key(listing_type, &ts);
    upload_with_retry(store, &key, body, GZIP, &options.retry).await?;

    let tags = vec![
        ("listing_type".to_string(), listing_type.to_string()),
        ("version".to_string(), options.version.clone()),
        ("source".to_string(), "jiji".to_string()),
    ];
    if let Err(e) = store.put_tags(&key, &tags).await {
        warn!("Failed to tag uploaded object {}: {:#}", key, e);
    }

    let uri = store.uri(&key);
    info!("Uploaded to {}", uri);
    Ok(uri)
}

/// Uploads a raw scrape batch as plain JSON under `raw/{type}/` so the
/// orchestrator can pick it up. Returns the object's URI.
pub async fn upload_raw_batch(
    records: &[RawListing],
    listing_type: ListingType,
    store: &dyn ObjectStore,
    policy: &RetryPolicy,
) -> Result<String, PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }

    let key = raw_object_key(listing_type, &storage::timestamp(Utc::now()));
    let body = serde_json::to_vec_pretty(records)?;
    upload_with_retry(store, &key, body, JSON, policy).await?;

    let uri = store.uri(&key);
    info!("Uploaded {} raw {} listings to {}", records.len(), listing_type, uri);
    Ok(uri)
}
