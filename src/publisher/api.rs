use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ApiConfig;
use crate::error::PipelineError;
use crate::models::{NormalizedListing, PublishOutcome};
use crate::publisher::dead_letter::DeadLetterStore;

/// The two calls the listings API exposes for writes
#[async_trait]
pub trait ListingApi: Send + Sync {
    /// `PUT /listing/{listing_id}`
    async fn update(&self, listing: &NormalizedListing) -> Result<StatusCode>;

    /// `POST /listing`
    async fn create(&self, listing: &NormalizedListing) -> Result<StatusCode>;
}

/// reqwest-backed client for the listings API
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ListingApi for ApiClient {
    async fn update(&self, listing: &NormalizedListing) -> Result<StatusCode> {
        let url = format!("{}/listing/{}", self.base_url, listing.listing_id);
        let response = self.client.put(&url).json(listing).send().await?;
        Ok(response.status())
    }

    async fn create(&self, listing: &NormalizedListing) -> Result<StatusCode> {
        let url = format!("{}/listing", self.base_url);
        let response = self.client.post(&url).json(listing).send().await?;
        Ok(response.status())
    }
}

/// Update first, create on 404. Anything else non-2xx, or a transport
/// error, is a failed outcome; nothing is retried here.
pub async fn upsert(api: &dyn ListingApi, listing: &NormalizedListing) -> PublishOutcome {
    let listing_id = listing.listing_id.clone();
    let success = match try_upsert(api, listing).await {
        Ok(done) => done,
        Err(e) => {
            warn!("[FAILED] {}: {:#}", listing_id, e);
            false
        }
    };
    PublishOutcome { listing_id, success }
}

async fn try_upsert(api: &dyn ListingApi, listing: &NormalizedListing) -> Result<bool> {
    let status = api.update(listing).await?;
    if status == StatusCode::NOT_FOUND {
        let created = api.create(listing).await?;
        if created.is_success() {
            info!("[CREATE] {}", listing.listing_id);
            return Ok(true);
        }
        warn!("[FAILED] {}: create returned {}", listing.listing_id, created);
        return Ok(false);
    }
    if status.is_success() {
        info!("[UPDATE] {}", listing.listing_id);
        return Ok(true);
    }
    warn!("[FAILED] {}: update returned {}", listing.listing_id, status);
    Ok(false)
}

/// Counts from one publish run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSummary {
    pub attempted: usize,
    pub succeeded: usize,
}

/// Sends every listing to the API on `concurrency` workers. Failures go to
/// the dead-letter store. The run succeeds even if every item fails; only
/// an empty batch or a dead-letter write error fails it.
pub async fn publish_to_api(
    mut listings: Vec<NormalizedListing>,
    api: Arc<dyn ListingApi>,
    concurrency: usize,
    limit: Option<usize>,
    dead_letters: &DeadLetterStore,
) -> Result<PublishSummary, PipelineError> {
    if let Some(limit) = limit {
        listings.truncate(limit);
    }
    if listings.is_empty() {
        warn!("No listings to publish.");
        return Err(PipelineError::EmptyBatch);
    }

    let concurrency = concurrency.max(1);
    let attempted = listings.len();
    info!("Publishing {} listings with {} workers...", attempted, concurrency);

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    for listing in listings {
        let api = api.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let outcome = upsert(api.as_ref(), &listing).await;
            (listing, outcome)
        });
    }

    let mut succeeded = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, outcome)) if outcome.success => succeeded += 1,
            Ok((listing, outcome)) => {
                debug!("Publishing {} failed", outcome.listing_id);
                dead_letters
                    .write(listing.listing_type, &listing.listing_id, &listing)
                    .await?;
            }
            Err(e) => error!("Publish task join error: {}", e),
        }
    }

    info!("Published {}/{} listings", succeeded, attempted);
    Ok(PublishSummary {
        attempted,
        succeeded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingType;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeApi {
        update_status: Option<StatusCode>,
        create_status: Option<StatusCode>,
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl FakeApi {
        fn responding(update: StatusCode, create: StatusCode) -> Self {
            Self {
                update_status: Some(update),
                create_status: Some(create),
                ..Self::default()
            }
        }

        fn count(&self, method: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|(m, _)| *m == method).count()
        }
    }

    #[async_trait]
    impl ListingApi for FakeApi {
        async fn update(&self, listing: &NormalizedListing) -> Result<StatusCode> {
            self.calls.lock().unwrap().push(("PUT", listing.listing_id.clone()));
            self.update_status.ok_or_else(|| anyhow::anyhow!("connection refused"))
        }

        async fn create(&self, listing: &NormalizedListing) -> Result<StatusCode> {
            self.calls.lock().unwrap().push(("POST", listing.listing_id.clone()));
            self.create_status.ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    fn listing(id: &str) -> NormalizedListing {
        NormalizedListing {
            url: format!("https://jiji.com.gh/accra/houses-apartments-for-rent/flat-{}.html", id),
            listing_id: id.to_string(),
            listing_type: ListingType::Rent,
            title: Some("Flat".into()),
            price: Some(2500),
            region: None,
            area: None,
            bedrooms: Some(2),
            bathrooms: None,
            house_type: None,
            posted_date: Utc::now(),
            amenities: None,
            description: None,
            features: BTreeMap::new(),
        }
    }

    fn batch(n: usize) -> Vec<NormalizedListing> {
        (0..n).map(|i| listing(&format!("L{}", i))).collect()
    }

    #[tokio::test]
    async fn not_found_falls_back_to_create() {
        let dir = tempfile::tempdir().unwrap();
        let dead = DeadLetterStore::new(dir.path());
        let api = Arc::new(FakeApi::responding(StatusCode::NOT_FOUND, StatusCode::CREATED));

        let summary = publish_to_api(batch(5), api.clone(), 2, None, &dead).await.unwrap();

        assert_eq!(summary, PublishSummary { attempted: 5, succeeded: 5 });
        assert_eq!(api.count("PUT"), 5);
        assert_eq!(api.count("POST"), 5);
        assert_eq!(fs_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn fallback_matches_direct_updates() {
        let dir = tempfile::tempdir().unwrap();
        let dead = DeadLetterStore::new(dir.path());

        let updating = Arc::new(FakeApi::responding(StatusCode::OK, StatusCode::CREATED));
        let creating = Arc::new(FakeApi::responding(StatusCode::NOT_FOUND, StatusCode::CREATED));
        let a = publish_to_api(batch(4), updating.clone(), 4, None, &dead).await.unwrap();
        let b = publish_to_api(batch(4), creating, 4, None, &dead).await.unwrap();

        assert_eq!(a.succeeded, b.succeeded);
        assert_eq!(updating.count("POST"), 0);
    }

    #[tokio::test]
    async fn failures_are_dead_lettered_but_step_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let dead = DeadLetterStore::new(dir.path());
        let api = Arc::new(FakeApi::responding(StatusCode::INTERNAL_SERVER_ERROR, StatusCode::CREATED));

        let summary = publish_to_api(batch(3), api.clone(), 3, None, &dead).await.unwrap();

        assert_eq!(summary.succeeded, 0);
        assert_eq!(api.count("POST"), 0);
        assert_eq!(fs_count(dir.path()), 3);
        assert!(dir.path().join("rent_failed_L0.json").exists());
    }

    #[tokio::test]
    async fn transport_errors_are_item_failures() {
        let dir = tempfile::tempdir().unwrap();
        let dead = DeadLetterStore::new(dir.path());
        let api = Arc::new(FakeApi::default());

        let summary = publish_to_api(batch(2), api, 1, None, &dead).await.unwrap();
        assert_eq!(summary, PublishSummary { attempted: 2, succeeded: 0 });
        assert_eq!(fs_count(dir.path()), 2);
    }

    #[tokio::test]
    async fn limit_truncates_and_empty_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dead = DeadLetterStore::new(dir.path());
        let api = Arc::new(FakeApi::responding(StatusCode::OK, StatusCode::CREATED));

        let summary = publish_to_api(batch(10), api.clone(), 4, Some(3), &dead).await.unwrap();
        assert_eq!(summary.attempted, 3);

        let err = publish_to_api(Vec::new(), api, 4, None, &dead).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));
    }

    fn fs_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }
}
