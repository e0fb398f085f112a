use anyhow::{anyhow, Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ScrapeConfig;
use crate::scrapers::traits::{RenderedPage, SessionFactory};

const CHROME_ARGS: [&str; 3] = ["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"];

/// Launches one headless Chrome per session
pub struct ChromeLauncher {
    headless: bool,
    user_agent: Option<String>,
}

impl ChromeLauncher {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            headless: config.headless,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl SessionFactory for ChromeLauncher {
    fn open(&self) -> Result<Box<dyn RenderedPage>> {
        let session = ChromeSession::launch(self.headless, self.user_agent.as_deref())?;
        Ok(Box::new(session))
    }
}

/// A browser process with a single tab. Dropping it closes the tab and
/// kills the process.
pub struct ChromeSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl ChromeSession {
    pub fn launch(headless: bool, user_agent: Option<&str>) -> Result<Self> {
        debug!("Launching headless Chrome...");

        let args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(300))
            .args(args)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open tab")?;

        if headless {
            if let Some(ua) = user_agent {
                tab.set_user_agent(ua, None, None)
                    .context("Failed to set user agent")?;
            }
        }

        Ok(Self { tab, _browser: browser })
    }

    fn evaluate_string(&self, script: &str) -> Result<String> {
        let result = self.tab.evaluate(script, false)?;
        match result.value {
            Some(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("script did not return a string: {}", value)),
            None => Err(anyhow!("script returned no value")),
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!("Tab close failed during teardown: {}", e);
        }
        // Chrome itself is killed when `_browser` drops
        debug!("Browser session released");
    }
}

impl RenderedPage for ChromeSession {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?
            .wait_until_navigated()
            .with_context(|| format!("Navigation to {} did not complete", url))?;
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        self.tab.reload(false, None).context("Reload failed")?;
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    fn content(&self) -> Result<String> {
        self.tab.get_content()
    }

    fn scroll_to_bottom(&self) -> Result<()> {
        self.tab
            .evaluate("window.scrollTo(0, document.body.scrollHeight);", false)?;
        Ok(())
    }

    fn scroll_height(&self) -> Result<u64> {
        let result = self.tab.evaluate("document.body.scrollHeight", false)?;
        Ok(result.value.and_then(|v| v.as_u64()).unwrap_or(0))
    }

    fn hrefs(&self, selector: &str) -> Result<Vec<String>> {
        let selector_literal = serde_json::to_string(selector)?;
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(a => a.href).filter(h => h))",
            selector_literal
        );
        let json = self.evaluate_string(&script)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn wait_for_text(&self, selector: &str, timeout: Duration) -> Result<Option<String>> {
        match self.tab.wait_for_element_with_custom_timeout(selector, timeout) {
            Ok(element) => Ok(Some(element.get_inner_text()?.trim().to_string())),
            Err(e) => {
                debug!("No '{}' within {:?}: {}", selector, timeout, e);
                Ok(None)
            }
        }
    }

    fn wait_for_count(&self, selector: &str, timeout: Duration) -> Result<usize> {
        if let Err(e) = self.tab.wait_for_element_with_custom_timeout(selector, timeout) {
            debug!("No '{}' within {:?}: {}", selector, timeout, e);
            return Ok(0);
        }
        Ok(self.tab.find_elements(selector).map(|els| els.len()).unwrap_or(0))
    }

    fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let elements = match self.tab.find_elements(selector) {
            Ok(elements) => elements,
            Err(_) => return Ok(Vec::new()),
        };

        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            match element.get_inner_text() {
                Ok(text) => texts.push(text.trim().to_string()),
                Err(e) => warn!("Could not read text of '{}': {}", selector, e),
            }
        }
        Ok(texts)
    }

    fn child_text(&self, selector: &str, index: usize, child: &str) -> Result<Option<String>> {
        // Fresh query each call; earlier handles may be stale after DOM updates
        let elements = self.tab.find_elements(selector)?;
        let Some(element) = elements.get(index) else {
            return Ok(None);
        };
        let Ok(child_element) = element.find_element(child) else {
            return Ok(None);
        };

        let result = child_element.call_js_fn("function() { return this.textContent; }", vec![], false)?;
        Ok(result
            .value
            .and_then(|v| v.as_str().map(|s| s.trim().to_string())))
    }
}
