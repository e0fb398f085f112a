use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cleaner;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::{ListingType, NormalizedListing, RawListing};
use crate::publisher::{self, ApiClient, DeadLetterStore, ObjectPublishOptions};
use crate::retry::RetryPolicy;
use crate::scrapers::{ScrapeCoordinator, SessionFactory};
use crate::storage;
use crate::trigger::DagTrigger;

/// Pipeline step selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Step {
    Scrape,
    Clean,
    Publish,
    TriggerDag,
}

/// Where the publish step sends records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Sink {
    #[default]
    Api,
    ObjectStore,
}

/// Run parameters shared by every step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub listing_type: ListingType,
    pub threads: usize,
    pub limit: Option<usize>,
    pub sink: Sink,
    /// Explicit input batch instead of the latest one
    pub input: Option<PathBuf>,
    /// Batch locations handed to the orchestrator by `trigger-dag`
    pub rent_path: Option<String>,
    pub sale_path: Option<String>,
}

impl StepContext {
    pub fn new(listing_type: ListingType) -> Self {
        Self {
            listing_type,
            threads: 1,
            limit: None,
            sink: Sink::default(),
            input: None,
            rent_path: None,
            sale_path: None,
        }
    }
}

/// One-line result printed at the end of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSummary(pub String);

/// Common interface every step implements
#[async_trait]
pub trait StepHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &StepContext) -> Result<StepSummary>;
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Scrape => "scrape",
            Step::Clean => "clean",
            Step::Publish => "publish",
            Step::TriggerDag => "trigger-dag",
        }
    }

    pub fn handler(self, config: Arc<Config>) -> Box<dyn StepHandler> {
        match self {
            Step::Scrape => Box::new(ScrapeStep::new(config)),
            Step::Clean => Box::new(CleanStep { config }),
            Step::Publish => Box::new(PublishStep { config }),
            Step::TriggerDag => Box::new(TriggerDagStep { config }),
        }
    }
}

async fn resolve_input(input: &Option<PathBuf>, dir: &Path, listing_type: ListingType) -> Result<PathBuf> {
    match input {
        Some(path) if tokio::fs::try_exists(path).await? => Ok(path.clone()),
        Some(path) => Err(PipelineError::FileNotFound(path.clone())),
        None => storage::latest_batch_file(dir, listing_type).await,
    }
}

pub struct ScrapeStep {
    config: Arc<Config>,
    sessions: Option<Arc<dyn SessionFactory>>,
}

impl ScrapeStep {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            sessions: None,
        }
    }

    /// Scrape with a specific session source instead of launching Chrome
    pub fn with_sessions(config: Arc<Config>, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            config,
            sessions: Some(sessions),
        }
    }
}

#[async_trait]
impl StepHandler for ScrapeStep {
    fn name(&self) -> &'static str {
        Step::Scrape.as_str()
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepSummary> {
        let sessions: Arc<dyn SessionFactory> = match &self.sessions {
            Some(sessions) => sessions.clone(),
            None => Arc::new(crate::scrapers::ChromeLauncher::new(&self.config.scrape)),
        };

        let coordinator = ScrapeCoordinator::new(&self.config, sessions);
        let report = coordinator.run(ctx.listing_type).await?;

        let path = storage::write_batch(&self.config.paths.raw_dir, ctx.listing_type, &report.records).await?;

        let location = if self.config.object_store.upload_raw {
            let store = publisher::object_store::from_config(&self.config.object_store)
                .map_err(|source| PipelineError::Client {
                    sink: "object store",
                    source,
                })?;
            let policy = RetryPolicy::exponential(self.config.object_store.max_attempts);
            publisher::upload_raw_batch(&report.records, ctx.listing_type, store.as_ref(), &policy).await?
        } else {
            path.display().to_string()
        };

        match DagTrigger::from_config(&self.config.trigger) {
            Ok(Some(trigger)) => trigger.notify(ctx.listing_type, &location).await,
            Ok(None) => {}
            Err(e) => warn!("Orchestrator trigger unavailable: {:#}", e),
        }

        Ok(StepSummary(format!(
            "Scraped {}/{} {} listings into {}",
            report.records.len(),
            report.attempted,
            ctx.listing_type,
            location
        )))
    }
}

pub struct CleanStep {
    config: Arc<Config>,
}

#[async_trait]
impl StepHandler for CleanStep {
    fn name(&self) -> &'static str {
        Step::Clean.as_str()
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepSummary> {
        let input = resolve_input(&ctx.input, &self.config.paths.raw_dir, ctx.listing_type).await?;
        info!("Cleaning raw batch {}", input.display());

        let raw: Vec<RawListing> = storage::read_batch(&input).await?;
        let total = raw.len();
        let cleaned = cleaner::normalize(raw)?;

        let path = storage::write_batch(&self.config.paths.cleaned_dir, ctx.listing_type, &cleaned).await?;
        Ok(StepSummary(format!(
            "Cleaned {}/{} listings into {}",
            cleaned.len(),
            total,
            path.display()
        )))
    }
}

pub struct PublishStep {
    config: Arc<Config>,
}

#[async_trait]
impl StepHandler for PublishStep {
    fn name(&self) -> &'static str {
        Step::Publish.as_str()
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepSummary> {
        let input = resolve_input(&ctx.input, &self.config.paths.cleaned_dir, ctx.listing_type).await?;
        info!("Publishing cleaned batch {}", input.display());
        let mut listings: Vec<NormalizedListing> = storage::read_batch(&input).await?;

        match ctx.sink {
            Sink::Api => {
                let api = ApiClient::new(&self.config.api)
                    .map_err(|source| PipelineError::Client { sink: "api", source })?;
                let dead_letters = DeadLetterStore::new(&self.config.paths.failed_dir);
                let summary = publisher::publish_to_api(
                    listings,
                    Arc::new(api),
                    ctx.threads,
                    ctx.limit,
                    &dead_letters,
                )
                .await?;
                Ok(StepSummary(format!(
                    "Published {}/{} listings",
                    summary.succeeded, summary.attempted
                )))
            }
            Sink::ObjectStore => {
                if let Some(limit) = ctx.limit {
                    listings.truncate(limit);
                }
                let store = publisher::object_store::from_config(&self.config.object_store)
                    .map_err(|source| PipelineError::Client {
                        sink: "object store",
                        source,
                    })?;
                let options = ObjectPublishOptions::from_config(
                    &self.config.object_store,
                    &self.config.paths.compressed_dir,
                );
                let uri = publisher::publish_to_object_store(&listings, ctx.listing_type, store.as_ref(), &options)
                    .await?;
                Ok(StepSummary(format!("Published {} listings to {}", listings.len(), uri)))
            }
        }
    }
}

/// Starts a DAG run for batches that are already uploaded
pub struct TriggerDagStep {
    config: Arc<Config>,
}

#[async_trait]
impl StepHandler for TriggerDagStep {
    fn name(&self) -> &'static str {
        Step::TriggerDag.as_str()
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepSummary> {
        let mut paths = BTreeMap::new();
        if let Some(path) = &ctx.rent_path {
            paths.insert(ListingType::Rent, path.clone());
        }
        if let Some(path) = &ctx.sale_path {
            paths.insert(ListingType::Sale, path.clone());
        }
        if paths.is_empty() {
            return Err(PipelineError::NoTriggerPaths);
        }

        let trigger = DagTrigger::from_config(&self.config.trigger)
            .map_err(|source| PipelineError::Client {
                sink: "orchestrator",
                source,
            })?
            .ok_or(PipelineError::TriggerNotConfigured)?;
        trigger.trigger(&paths).await.map_err(PipelineError::Trigger)?;

        Ok(StepSummary(format!(
            "Triggered DAG {} with {} batch paths",
            self.config.trigger.dag_id,
            paths.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerConfig;

    #[tokio::test]
    async fn trigger_dag_needs_a_path() {
        let config = Arc::new(Config::default());
        let err = Step::TriggerDag
            .handler(config)
            .run(&StepContext::new(ListingType::Rent))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoTriggerPaths));
    }

    #[tokio::test]
    async fn trigger_dag_needs_an_orchestrator() {
        let config = Arc::new(Config::default());
        let mut ctx = StepContext::new(ListingType::Rent);
        ctx.rent_path = Some("s3://real-estate-listings/raw/rent/rent_20240101_100000.json".into());

        let err = Step::TriggerDag.handler(config).run(&ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::TriggerNotConfigured));
    }

    #[tokio::test]
    async fn trigger_dag_failure_fails_the_step() {
        let config = Arc::new(Config {
            trigger: TriggerConfig {
                url: Some("http://127.0.0.1:9".into()),
                dag_id: "dag".into(),
            },
            ..Config::default()
        });
        let mut ctx = StepContext::new(ListingType::Sale);
        ctx.sale_path = Some("s3://real-estate-listings/raw/sale/sale_20240101_100000.json".into());

        let err = Step::TriggerDag.handler(config).run(&ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Trigger(_)));
    }

    #[test]
    fn step_names_match_cli_values() {
        use clap::ValueEnum;
        for step in Step::value_variants() {
            let value = step.to_possible_value().unwrap();
            assert_eq!(value.get_name(), step.as_str());
        }
    }
}
