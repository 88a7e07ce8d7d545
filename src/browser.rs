use crate::config::USER_AGENT;
use crate::dom::{DomResult, Element, Page};
use crate::error::ScrapeError;
use crate::session::Launcher;
use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

fn driver_err(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Driver(e.to_string())
}

/// `find_elements` reports "nothing matched" as an error; turn it into an empty list.
fn or_empty<T>(result: anyhow::Result<Vec<T>>) -> DomResult<Vec<T>> {
    match result {
        Ok(found) => Ok(found),
        Err(e) if e.downcast_ref::<NoElementFound>().is_some() => Ok(Vec::new()),
        Err(e) => Err(driver_err(e)),
    }
}

const CLICK_JS: &str = "function() { this.click(); }";
const CLEAR_JS: &str = "function() { this.value = ''; this.focus(); }";
const INTERACTABLE_JS: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    return !this.disabled && r.width > 0 && r.height > 0; }";
const INNER_TEXT_JS: &str = "function() { return this.innerText || this.textContent || ''; }";

pub struct ChromeElement<'a> {
    inner: headless_chrome::Element<'a>,
}

impl<'a> Element for ChromeElement<'a> {
    fn find_all(&self, css: &str) -> DomResult<Vec<Self>> {
        Ok(or_empty(self.inner.find_elements(css))?
            .into_iter()
            .map(|inner| ChromeElement { inner })
            .collect())
    }

    fn inner_text(&self) -> DomResult<String> {
        let result = self
            .inner
            .call_js_fn(INNER_TEXT_JS, vec![], false)
            .map_err(driver_err)?;
        Ok(result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    fn attribute(&self, name: &str) -> DomResult<Option<String>> {
        let attrs = self.inner.get_attributes().map_err(driver_err)?;
        Ok(attrs.and_then(|pairs| {
            pairs
                .chunks(2)
                .find(|kv| kv[0] == name)
                .and_then(|kv| kv.get(1).cloned())
        }))
    }
}

/// One Chrome process with a single tab.
pub struct ChromePage {
    // Kept alive for as long as the tab is in use; dropping it kills Chrome.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn launch(headless: bool) -> DomResult<Self> {
        let user_agent = format!("--user-agent={}", USER_AGENT);
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some((1366, 900)))
            .idle_browser_timeout(Duration::from_secs(120))
            .args(vec![OsStr::new(user_agent.as_str())])
            .build()
            .map_err(|e| ScrapeError::SessionUnavailable(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| ScrapeError::SessionUnavailable(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ScrapeError::SessionUnavailable(e.to_string()))?;
        Ok(ChromePage { _browser: browser, tab })
    }
}

impl Page for ChromePage {
    type Element<'a> = ChromeElement<'a> where Self: 'a;

    fn navigate(&self, url: &str) -> DomResult<()> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(driver_err)?;
        Ok(())
    }

    fn title(&self) -> DomResult<String> {
        self.tab.get_title().map_err(driver_err)
    }

    fn find_all(&self, css: &str) -> DomResult<Vec<ChromeElement<'_>>> {
        Ok(or_empty(self.tab.find_elements(css))?
            .into_iter()
            .map(|inner| ChromeElement { inner })
            .collect())
    }

    fn script_click(&self, element: &ChromeElement<'_>) -> DomResult<()> {
        element
            .inner
            .call_js_fn(CLICK_JS, vec![], false)
            .map_err(driver_err)?;
        Ok(())
    }

    fn fill(&self, element: &ChromeElement<'_>, text: &str) -> DomResult<()> {
        element
            .inner
            .call_js_fn(CLEAR_JS, vec![], false)
            .map_err(driver_err)?;
        self.tab.type_str(text).map_err(driver_err)?;
        Ok(())
    }

    fn is_interactable(&self, element: &ChromeElement<'_>) -> DomResult<bool> {
        let result = element
            .inner
            .call_js_fn(INTERACTABLE_JS, vec![], false)
            .map_err(driver_err)?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn close(&self) {
        if let Err(e) = self.tab.close(false) {
            debug!("Tab close reported: {}", e);
        }
    }
}

/// Launches a new Chrome process for every session.
#[derive(Debug, Clone, Copy)]
pub struct ChromeLauncher {
    pub headless: bool,
}

impl Launcher for ChromeLauncher {
    type Page = ChromePage;

    fn launch(&mut self) -> Result<ChromePage, ScrapeError> {
        info!("Starting Chrome (headless: {})", self.headless);
        ChromePage::launch(self.headless)
    }
}
