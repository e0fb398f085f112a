//! Replays pre-rendered HTML through the [`RenderedPage`] interface.
//!
//! Each URL maps to a sequence of frames. Navigation shows the first frame;
//! every scroll or reload advances to the next one (staying on the last),
//! which is enough to model lazy-loading index pages and a 429 page that
//! recovers after a reload. Waits resolve immediately against the current
//! frame.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::scrapers::traits::{RenderedPage, SessionFactory};

#[derive(Debug, Clone)]
pub struct Frame {
    pub html: String,
    pub height: u64,
}

impl Frame {
    pub fn new(html: impl Into<String>, height: u64) -> Self {
        Self {
            html: html.into(),
            height,
        }
    }
}

/// Hands out independent [`SnapshotPage`] sessions over shared frames
#[derive(Debug, Clone, Default)]
pub struct SnapshotFactory {
    pages: Arc<HashMap<String, Vec<Frame>>>,
}

impl SnapshotFactory {
    pub fn new(pages: HashMap<String, Vec<Frame>>) -> Self {
        Self {
            pages: Arc::new(pages),
        }
    }
}

impl SessionFactory for SnapshotFactory {
    fn open(&self) -> Result<Box<dyn RenderedPage>> {
        Ok(Box::new(SnapshotPage::new(self.pages.clone())))
    }
}

#[derive(Debug, Default)]
struct Cursor {
    url: Option<String>,
    frame: usize,
}

pub struct SnapshotPage {
    pages: Arc<HashMap<String, Vec<Frame>>>,
    cursor: RefCell<Cursor>,
}

impl SnapshotPage {
    pub fn new(pages: Arc<HashMap<String, Vec<Frame>>>) -> Self {
        Self {
            pages,
            cursor: RefCell::new(Cursor::default()),
        }
    }

    /// Single page with a single frame
    pub fn single(url: &str, html: &str) -> Self {
        let mut pages = HashMap::new();
        pages.insert(url.to_string(), vec![Frame::new(html, 0)]);
        Self::new(Arc::new(pages))
    }

    fn frame(&self) -> Result<&Frame> {
        let cursor = self.cursor.borrow();
        let url = cursor.url.as_ref().ok_or_else(|| anyhow!("no page loaded"))?;
        let frames = self
            .pages
            .get(url)
            .ok_or_else(|| anyhow!("page disappeared: {}", url))?;
        frames
            .get(cursor.frame.min(frames.len().saturating_sub(1)))
            .ok_or_else(|| anyhow!("no frames for {}", url))
    }

    fn document(&self) -> Result<Html> {
        Ok(Html::parse_document(&self.frame()?.html))
    }

    fn advance(&self) {
        self.cursor.borrow_mut().frame += 1;
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{}': {:?}", selector, e))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

impl RenderedPage for SnapshotPage {
    fn navigate(&self, url: &str) -> Result<()> {
        if !self.pages.contains_key(url) {
            return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED at {}", url));
        }
        let mut cursor = self.cursor.borrow_mut();
        cursor.url = Some(url.to_string());
        cursor.frame = 0;
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        self.frame()?;
        self.advance();
        Ok(())
    }

    fn content(&self) -> Result<String> {
        Ok(self.frame()?.html.clone())
    }

    fn scroll_to_bottom(&self) -> Result<()> {
        self.frame()?;
        self.advance();
        Ok(())
    }

    fn scroll_height(&self) -> Result<u64> {
        Ok(self.frame()?.height)
    }

    fn hrefs(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        let base = self
            .cursor
            .borrow()
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok());
        let document = self.document()?;

        Ok(document
            .select(&selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| match &base {
                Some(base) => base.join(href).ok().map(String::from),
                None => Some(href.to_string()),
            })
            .collect())
    }

    fn wait_for_text(&self, selector: &str, _timeout: Duration) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = self.document()?;
        let text = document.select(&selector).next().map(element_text);
        Ok(text)
    }

    fn wait_for_count(&self, selector: &str, _timeout: Duration) -> Result<usize> {
        let selector = parse_selector(selector)?;
        let document = self.document()?;
        let count = document.select(&selector).count();
        Ok(count)
    }

    fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        let document = self.document()?;
        let texts = document.select(&selector).map(element_text).collect();
        Ok(texts)
    }

    fn child_text(&self, selector: &str, index: usize, child: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let child = parse_selector(child)?;
        let document = self.document()?;
        let text = document
            .select(&selector)
            .nth(index)
            .and_then(|element| element.select(&child).next())
            .map(element_text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hrefs_resolve_against_current_url() {
        let page = SnapshotPage::single(
            "https://jiji.com.gh/houses-apartments-for-rent",
            r#"<a href="/accra/houses-apartments-for-rent/flat-A1.html">x</a>"#,
        );
        page.navigate("https://jiji.com.gh/houses-apartments-for-rent").unwrap();
        let hrefs = page.hrefs("a[href*='/houses-apartments-for-rent/']").unwrap();
        assert_eq!(hrefs, vec!["https://jiji.com.gh/accra/houses-apartments-for-rent/flat-A1.html"]);
    }

    #[test]
    fn scrolling_advances_and_sticks_on_last_frame() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://x.test/".to_string(),
            vec![Frame::new("<p>one</p>", 100), Frame::new("<p>two</p>", 200)],
        );
        let page = SnapshotPage::new(Arc::new(pages));
        page.navigate("https://x.test/").unwrap();
        assert_eq!(page.scroll_height().unwrap(), 100);
        page.scroll_to_bottom().unwrap();
        page.scroll_to_bottom().unwrap();
        assert_eq!(page.scroll_height().unwrap(), 200);
        assert_eq!(page.texts("p").unwrap(), vec!["two"]);
    }

    #[test]
    fn unknown_url_fails_navigation() {
        let page = SnapshotPage::new(Arc::new(HashMap::new()));
        assert!(page.navigate("https://nowhere.test/").is_err());
    }
}
