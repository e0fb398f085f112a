use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ScrapeConfig;
use crate::scrapers::traits::RenderedPage;

/// Collects listing URLs from an infinite-scroll index page
#[derive(Debug, Clone)]
pub struct LinkDiscovery {
    max_scrolls: Option<u32>,
    max_stagnant: u32,
    initial_load: Duration,
    scroll_pause: Duration,
}

impl LinkDiscovery {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            max_scrolls: config.max_scrolls,
            max_stagnant: config.max_stagnant_scrolls,
            initial_load: config.initial_load(),
            scroll_pause: config.scroll_pause(),
        }
    }

    /// Scrolls `entry_url` until the scroll budget runs out, no new links
    /// show up for `max_stagnant` scrolls in a row, or the page stops
    /// growing. Navigation failures are returned as-is.
    pub fn discover(
        &self,
        page: &dyn RenderedPage,
        entry_url: &str,
        href_filter: &str,
    ) -> Result<BTreeSet<String>> {
        page.navigate(entry_url)
            .with_context(|| format!("Failed to load index page {}", entry_url))?;
        thread::sleep(self.initial_load);

        let selector = format!("a[href*='{}']", href_filter);
        let mut links = BTreeSet::new();
        let mut scrolls: u32 = 0;
        let mut stagnant: u32 = 0;
        let mut last_height = page.scroll_height()?;

        while self.max_scrolls.map_or(true, |max| scrolls < max) {
            page.scroll_to_bottom()?;
            thread::sleep(self.scroll_pause);

            let before = links.len();
            links.extend(page.hrefs(&selector)?);
            scrolls += 1;

            info!("Scroll #{} → {} total links", scrolls, links.len());

            if links.len() == before {
                stagnant += 1;
            } else {
                stagnant = 0;
            }

            if stagnant >= self.max_stagnant {
                warn!("No new links after {} scrolls. Stopping.", self.max_stagnant);
                break;
            }

            let height = page.scroll_height()?;
            if height <= last_height {
                info!("Page height stopped growing at {}px. Stopping.", height);
                break;
            }
            last_height = height;
        }

        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::snapshot::{Frame, SnapshotPage};
    use std::collections::HashMap;
    use std::sync::Arc;

    const ENTRY: &str = "https://jiji.com.gh/houses-apartments-for-rent";
    const FILTER: &str = "/houses-apartments-for-rent/";

    fn discovery(max_scrolls: Option<u32>) -> LinkDiscovery {
        LinkDiscovery::new(&ScrapeConfig {
            max_scrolls,
            initial_load_ms: 0,
            scroll_pause_ms: 0,
            ..ScrapeConfig::default()
        })
    }

    fn anchors(ids: &[&str]) -> String {
        ids.iter()
            .map(|id| format!(r#"<a href="/accra{}flat-{}.html">{}</a>"#, FILTER, id, id))
            .chain(std::iter::once(r#"<a href="/help">help</a>"#.to_string()))
            .collect()
    }

    fn page(frames: Vec<Frame>) -> SnapshotPage {
        let mut pages = HashMap::new();
        pages.insert(ENTRY.to_string(), frames);
        SnapshotPage::new(Arc::new(pages))
    }

    #[test]
    fn repeated_hrefs_collapse_to_one_entry() {
        let page = page(vec![
            Frame::new(anchors(&[]), 100),
            Frame::new(anchors(&["A1", "B2"]), 200),
            Frame::new(anchors(&["A1", "B2", "C3"]), 300),
            Frame::new(anchors(&["A1", "B2", "C3"]), 300),
        ]);

        let links = discovery(None).discover(&page, ENTRY, FILTER).unwrap();
        assert_eq!(links.len(), 3);
        assert!(links.contains("https://jiji.com.gh/accra/houses-apartments-for-rent/flat-A1.html"));
        assert!(!links.iter().any(|l| l.ends_with("/help")));
    }

    #[test]
    fn stops_after_three_stagnant_scrolls() {
        // Height keeps growing but nothing new appears after the first scroll
        let mut frames = vec![Frame::new(anchors(&[]), 100)];
        for i in 0..10 {
            frames.push(Frame::new(anchors(&["A1"]), 200 + i * 100));
        }
        let page = page(frames);

        let links = discovery(None).discover(&page, ENTRY, FILTER).unwrap();
        assert_eq!(links.len(), 1);
        // 1 productive scroll + 3 stagnant ones
        assert_eq!(page.scroll_height().unwrap(), 500);
    }

    #[test]
    fn respects_max_scrolls() {
        let mut frames = vec![Frame::new(anchors(&[]), 100)];
        let ids: Vec<String> = (0..10).map(|i| format!("L{}", i)).collect();
        for i in 0..10 {
            let visible: Vec<&str> = ids[..=i].iter().map(String::as_str).collect();
            frames.push(Frame::new(anchors(&visible), 200 + i as u64 * 100));
        }
        let page = page(frames);

        let links = discovery(Some(2)).discover(&page, ENTRY, FILTER).unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn navigation_failure_is_an_error() {
        let page = page(vec![]);
        let result = discovery(None).discover(&page, "https://jiji.com.gh/elsewhere", FILTER);
        assert!(result.is_err());
    }
}
