//! Minimal browser surface the portal flow needs.
//!
//! Everything above this module (navigation, extraction, sessions) is written
//! against [`Page`] and [`Element`], so the same code drives a live Chrome tab
//! or an HTML fixture.

use crate::delay_manager::Clock;
use crate::error::ScrapeError;
use log::debug;
use std::time::Duration;

pub type DomResult<T> = Result<T, ScrapeError>;

/// A node inside the rendered document.
pub trait Element: Sized {
    /// Descendants matching a CSS selector, in document order. No match is an empty vec.
    fn find_all(&self, css: &str) -> DomResult<Vec<Self>>;

    /// Rendered text, untrimmed.
    fn inner_text(&self) -> DomResult<String>;

    fn attribute(&self, name: &str) -> DomResult<Option<String>>;

    fn first(&self, css: &str) -> DomResult<Option<Self>> {
        Ok(self.find_all(css)?.into_iter().next())
    }

    fn text(&self) -> DomResult<String> {
        Ok(self.inner_text()?.trim().to_string())
    }
}

/// One live page of one browser session.
pub trait Page {
    type Element<'a>: Element
    where
        Self: 'a;

    fn navigate(&self, url: &str) -> DomResult<()>;

    fn title(&self) -> DomResult<String>;

    /// Elements matching a CSS selector anywhere in the document.
    fn find_all(&self, css: &str) -> DomResult<Vec<Self::Element<'_>>>;

    /// Click through a script call so overlays cannot intercept it.
    fn script_click(&self, element: &Self::Element<'_>) -> DomResult<()>;

    /// Clear a text input and type `text` into it.
    fn fill(&self, element: &Self::Element<'_>, text: &str) -> DomResult<()>;

    /// Visible and enabled.
    fn is_interactable(&self, element: &Self::Element<'_>) -> DomResult<bool>;

    /// Release the underlying browser resources.
    fn close(&self);
}

/// Text condition checked on the element itself or on one of its descendants.
#[derive(Debug, Clone, Copy)]
pub struct TextFilter {
    pub within: Option<&'static str>,
    pub contains: &'static str,
}

/// CSS selector plus an optional text condition.
#[derive(Debug, Clone, Copy)]
pub struct Locator {
    pub css: &'static str,
    pub text: Option<TextFilter>,
}

impl Locator {
    pub const fn css(css: &'static str) -> Self {
        Locator { css, text: None }
    }

    /// `css` elements whose own text contains `contains`.
    pub const fn with_text(css: &'static str, contains: &'static str) -> Self {
        Locator { css, text: Some(TextFilter { within: None, contains }) }
    }

    /// `css` elements holding a `within` descendant whose text contains `contains`.
    pub const fn with_descendant_text(css: &'static str, within: &'static str, contains: &'static str) -> Self {
        Locator { css, text: Some(TextFilter { within: Some(within), contains }) }
    }

    /// All matches in document order. Elements whose text cannot be read are skipped.
    pub fn resolve<'a, P: Page>(&self, page: &'a P) -> DomResult<Vec<P::Element<'a>>> {
        let candidates = page.find_all(self.css)?;
        let Some(filter) = self.text else {
            return Ok(candidates);
        };
        Ok(candidates
            .into_iter()
            .filter(|el| text_matches(el, filter))
            .collect())
    }
}

fn text_matches<E: Element>(el: &E, filter: TextFilter) -> bool {
    match filter.within {
        None => el
            .inner_text()
            .map(|t| t.contains(filter.contains))
            .unwrap_or(false),
        Some(inner) => el
            .find_all(inner)
            .map(|found| {
                found
                    .iter()
                    .any(|d| d.inner_text().map(|t| t.contains(filter.contains)).unwrap_or(false))
            })
            .unwrap_or(false),
    }
}

/// Named lookup attempt in a fallback chain.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub locator: Locator,
}

impl Strategy {
    pub const fn new(name: &'static str, locator: Locator) -> Self {
        Strategy { name, locator }
    }
}

/// Poll interval and upper bound of a wait.
#[derive(Debug, Clone, Copy)]
pub struct Wait {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Wait {
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Wait { timeout, poll }
    }
}

/// Calls `probe` until it yields a value or `wait.timeout` elapses.
/// The probe always runs at least once.
pub fn wait_for<T>(clock: &dyn Clock, wait: Wait, mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = clock.now() + wait.timeout;
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if clock.now() >= deadline {
            return None;
        }
        clock.sleep(wait.poll);
    }
}

/// Waits until `css` yields at least `min` elements.
pub fn wait_for_elements<'a, P: Page>(
    page: &'a P,
    clock: &dyn Clock,
    wait: Wait,
    css: &str,
    min: usize,
) -> Option<Vec<P::Element<'a>>> {
    wait_for(clock, wait, || match page.find_all(css) {
        Ok(found) if found.len() >= min => Some(found),
        Ok(_) => None,
        Err(e) => {
            debug!("Lookup of '{}' failed while waiting: {}", css, e);
            None
        }
    })
}

/// First element located by `locator` that is also interactable, polled within `wait`.
pub fn wait_for_clickable<'a, P: Page>(
    page: &'a P,
    clock: &dyn Clock,
    wait: Wait,
    locator: &Locator,
) -> Option<P::Element<'a>> {
    wait_for(clock, wait, || {
        let found = locator.resolve(page).ok()?;
        found
            .into_iter()
            .find(|el| page.is_interactable(el).unwrap_or(false))
    })
}

/// Tries each strategy in order, each with its own wait; first clickable hit wins.
pub fn locate_first<'a, P: Page>(
    page: &'a P,
    clock: &dyn Clock,
    wait: Wait,
    strategies: &[Strategy],
) -> Option<(&'static str, P::Element<'a>)> {
    strategies.iter().find_map(|strategy| {
        debug!("Trying strategy '{}' ({})", strategy.name, strategy.locator.css);
        wait_for_clickable(page, clock, wait, &strategy.locator).map(|el| (strategy.name, el))
    })
}
