use anyhow::Result;
use std::time::Duration;

/// A live, rendered page owned by one worker.
///
/// Implementations release their underlying browser resources on drop, so
/// holding a session for the duration of a task is enough to guarantee
/// teardown on every exit path.
pub trait RenderedPage {
    /// Load `url` and wait for navigation to finish
    fn navigate(&self, url: &str) -> Result<()>;

    fn reload(&self) -> Result<()>;

    /// Full HTML of the current document
    fn content(&self) -> Result<String>;

    fn scroll_to_bottom(&self) -> Result<()>;

    fn scroll_height(&self) -> Result<u64>;

    /// Absolute `href` of every anchor matching `selector`
    fn hrefs(&self, selector: &str) -> Result<Vec<String>>;

    /// Trimmed text of the first element matching `selector`, waiting up
    /// to `timeout` for it. `None` when nothing appears in time.
    fn wait_for_text(&self, selector: &str, timeout: Duration) -> Result<Option<String>>;

    /// Number of elements matching `selector` once at least one appears
    fn wait_for_count(&self, selector: &str, timeout: Duration) -> Result<usize>;

    /// Trimmed text of every element matching `selector`
    fn texts(&self, selector: &str) -> Result<Vec<String>>;

    /// Re-queries `selector`, takes the element at `index` and returns the
    /// text content of its first `child` match.
    fn child_text(&self, selector: &str, index: usize, child: &str) -> Result<Option<String>>;
}

/// Opens fresh, isolated browser sessions
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn RenderedPage>>;
}
