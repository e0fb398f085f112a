use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::models::ListingType;
use crate::pipeline::{Sink, Step, StepContext, StepSummary};

#[derive(Parser, Debug)]
#[command(name = "listing-scout")]
#[command(about = "Scrape, clean and publish Jiji Ghana property listings")]
#[command(version)]
pub struct Cli {
    /// Pipeline step to run
    #[arg(value_enum)]
    pub step: Step,

    #[arg(long, value_enum, default_value_t = ListingType::Rent)]
    pub listing_type: ListingType,

    /// Publish workers (default: available parallelism)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Publish at most N listings (0 means no limit)
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, value_enum, default_value_t = Sink::Api)]
    pub sink: Sink,

    /// Batch file to clean or publish instead of the latest one
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Raw rent batch location for trigger-dag
    #[arg(long)]
    pub rent_path: Option<String>,

    /// Raw sale batch location for trigger-dag
    #[arg(long)]
    pub sale_path: Option<String>,

    /// Directory for per-step log files
    #[arg(long, env = "LISTING_SCOUT_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Settings file (default: config/settings.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listing API base URL, overrides [api].url
    #[arg(long, env = "LISTING_SCOUT_API_URL")]
    pub api_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    pub fn context(&self) -> StepContext {
        let threads = self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        StepContext {
            listing_type: self.listing_type,
            threads: threads.max(1),
            limit: self.limit.filter(|&n| n > 0),
            sink: self.sink,
            input: self.input.clone(),
            rent_path: self.rent_path.clone(),
            sale_path: self.sale_path.clone(),
        }
    }

    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(url) = &self.api_url {
            config.api.url = url.clone();
        }
        Ok(config)
    }

    /// Loads settings and runs the selected step to completion
    pub async fn run(&self) -> Result<StepSummary> {
        let config = Arc::new(self.load_config()?);
        let handler = self.step.handler(config);
        tracing::info!("▶️  Running {} step for {} listings", handler.name(), self.listing_type);
        handler.run(&self.context()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["listing-scout", "scrape"]).unwrap();
        assert_eq!(cli.step, Step::Scrape);
        assert_eq!(cli.listing_type, ListingType::Rent);
        assert_eq!(cli.sink, Sink::Api);
        assert!(cli.context().threads >= 1);
    }

    #[test]
    fn publish_flags() {
        let cli = Cli::try_parse_from([
            "listing-scout",
            "publish",
            "--listing-type",
            "sale",
            "--threads",
            "8",
            "--limit",
            "20",
            "--sink",
            "object-store",
            "--api-url",
            "http://api:8000/api/v1",
        ])
        .unwrap();
        let ctx = cli.context();
        assert_eq!(ctx.listing_type, ListingType::Sale);
        assert_eq!(ctx.threads, 8);
        assert_eq!(ctx.limit, Some(20));
        assert_eq!(ctx.sink, Sink::ObjectStore);
        assert_eq!(cli.api_url.as_deref(), Some("http://api:8000/api/v1"));
    }

    #[test]
    fn zero_limit_means_everything() {
        let cli = Cli::try_parse_from(["listing-scout", "publish", "--limit", "0"]).unwrap();
        assert_eq!(cli.context().limit, None);
    }

    #[test]
    fn trigger_dag_paths() {
        let cli = Cli::try_parse_from([
            "listing-scout",
            "trigger-dag",
            "--rent-path",
            "s3://real-estate-listings/raw/rent/rent_20240101_100000.json",
            "--log-dir",
            "/var/log/listing-scout",
        ])
        .unwrap();
        assert_eq!(cli.step, Step::TriggerDag);
        assert_eq!(cli.log_dir, PathBuf::from("/var/log/listing-scout"));
        let ctx = cli.context();
        assert!(ctx.rent_path.unwrap().ends_with("rent_20240101_100000.json"));
        assert_eq!(ctx.sale_path, None);
    }

    #[test]
    fn rejects_unknown_step() {
        assert!(Cli::try_parse_from(["listing-scout", "train"]).is_err());
    }
}
