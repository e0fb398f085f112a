use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ExtractionFailure, PipelineError, Result};
use crate::models::{ListingLink, ListingType, RawListing};
use crate::scrapers::discovery::LinkDiscovery;
use crate::scrapers::extractor::DetailExtractor;
use crate::scrapers::traits::SessionFactory;

/// Records from one scrape run plus how many URLs were attempted
#[derive(Debug)]
pub struct ScrapeReport {
    pub records: Vec<RawListing>,
    pub attempted: usize,
}

/// Discovers links, then extracts them on a bounded pool of browser workers
pub struct ScrapeCoordinator {
    sessions: Arc<dyn SessionFactory>,
    discovery: LinkDiscovery,
    extractor: Arc<DetailExtractor>,
    entry_rent: String,
    entry_sale: String,
    workers: usize,
    pre_extract_delay: Duration,
}

impl ScrapeCoordinator {
    pub fn new(config: &Config, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            sessions,
            discovery: LinkDiscovery::new(&config.scrape),
            extractor: Arc::new(DetailExtractor::new(&config.scrape, &config.selectors)),
            entry_rent: config.scrape.entry_url(ListingType::Rent).to_string(),
            entry_sale: config.scrape.entry_url(ListingType::Sale).to_string(),
            workers: config.scrape.worker_count(),
            pre_extract_delay: config.scrape.pre_extract_delay(),
        }
    }

    pub async fn run(&self, listing_type: ListingType) -> Result<ScrapeReport> {
        info!("Starting scraping for {} listings", listing_type);

        let found = self.discover(listing_type).await?;
        let (links, skipped) = dedup_links(found);
        if links.is_empty() {
            return Err(PipelineError::NoLinks(listing_type));
        }

        let total = links.len() + skipped;
        info!(
            "Found {} unique listings ({} non-listing links skipped), scraping with {} workers",
            links.len(),
            skipped,
            self.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for link in links {
            let semaphore = semaphore.clone();
            let sessions = self.sessions.clone();
            let extractor = self.extractor.clone();
            let delay = self.pre_extract_delay;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let url = link.url.clone();
                let result = tokio::task::spawn_blocking(move || {
                    scrape_single_listing(sessions.as_ref(), &extractor, &link, listing_type, delay)
                })
                .await;
                (url, result)
            });
        }

        let mut records = Vec::new();
        let mut done = skipped;
        while let Some(joined) = tasks.join_next().await {
            done += 1;
            match joined {
                Ok((_, Ok(Ok(listing)))) => {
                    info!("[{}/{}] Scraped {}", done, total, listing.listing_id);
                    records.push(listing);
                }
                Ok((_, Ok(Err(failure)))) => {
                    warn!("[{}/{}] [SCRAPE FAIL] {}", done, total, failure);
                }
                Ok((url, Err(e))) => {
                    error!("[{}/{}] Worker for {} panicked: {}", done, total, url, e);
                }
                Err(e) => error!("[{}/{}] Task join error: {}", done, total, e),
            }
        }

        info!("Scraped {}/{} listings", records.len(), total);

        if records.is_empty() {
            return Err(PipelineError::NothingScraped {
                listing_type,
                attempted: total,
            });
        }

        Ok(ScrapeReport {
            records,
            attempted: total,
        })
    }

    async fn discover(&self, listing_type: ListingType) -> Result<Vec<String>> {
        let sessions = self.sessions.clone();
        let discovery = self.discovery.clone();
        let entry = match listing_type {
            ListingType::Rent => self.entry_rent.clone(),
            ListingType::Sale => self.entry_sale.clone(),
        };

        let found = tokio::task::spawn_blocking(move || {
            // Session lives only for discovery
            let session = sessions.open()?;
            discovery.discover(session.as_ref(), &entry, listing_type.href_filter())
        })
        .await?
        .map_err(PipelineError::Discovery)?;

        Ok(found.into_iter().collect())
    }
}

/// Collapses URLs onto their listing id, keeping the first URL seen for
/// each. Returns the unique links and the number of non-listing URLs.
fn dedup_links(urls: Vec<String>) -> (Vec<ListingLink>, usize) {
    let mut by_id: BTreeMap<String, ListingLink> = BTreeMap::new();
    let mut skipped = 0;
    for url in urls {
        match ListingLink::parse(&url) {
            Some(link) => {
                if let Some(first) = by_id.get(&link.listing_id) {
                    debug!("Duplicate of {} at {}", first.listing_id, url);
                } else {
                    by_id.insert(link.listing_id.clone(), link);
                }
            }
            None => {
                warn!("[SKIPPING] Not apartment listing: {}", url);
                skipped += 1;
            }
        }
    }
    (by_id.into_values().collect(), skipped)
}

/// Runs on a blocking worker thread with its own browser session
fn scrape_single_listing(
    sessions: &dyn SessionFactory,
    extractor: &DetailExtractor,
    link: &ListingLink,
    listing_type: ListingType,
    delay: Duration,
) -> std::result::Result<RawListing, ExtractionFailure> {
    let session = sessions.open().map_err(|source| ExtractionFailure::Browser {
        url: link.url.clone(),
        source,
    })?;
    thread::sleep(delay);

    extractor.extract(session.as_ref(), &link.url, &link.listing_id, listing_type)
}
