use crate::delay_manager::{Backoff, Clock};
use crate::dom::Page;
use crate::error::ScrapeError;
use log::{debug, error, info, warn};
use std::rc::Rc;
use std::time::Duration;

/// Page titles that mean the portal refused to serve us.
const BLOCK_MARKERS: [&str; 4] = ["403", "Forbidden", "429", "Too Many Requests"];

pub fn is_blocked(title: &str) -> bool {
    BLOCK_MARKERS.iter().any(|marker| title.contains(marker))
}

/// Opens fresh browser pages.
pub trait Launcher {
    type Page: Page;

    fn launch(&mut self) -> Result<Self::Page, ScrapeError>;
}

/// A live page owned by one attempt. Dropping it closes the browser.
pub struct Session<P: Page> {
    page: P,
}

impl<P: Page> Session<P> {
    pub fn new(page: P) -> Self {
        Session { page }
    }

    pub fn page(&self) -> &P {
        &self.page
    }
}

impl<P: Page> Drop for Session<P> {
    fn drop(&mut self) {
        debug!("Closing browser session");
        self.page.close();
    }
}

pub struct SessionManager<L: Launcher> {
    launcher: L,
    url: String,
    settle: Duration,
    block_retries: u32,
    backoff: Backoff,
    clock: Rc<dyn Clock>,
}

impl<L: Launcher> SessionManager<L> {
    pub fn new(
        launcher: L,
        url: impl Into<String>,
        settle: Duration,
        block_retries: u32,
        backoff: Backoff,
        clock: Rc<dyn Clock>,
    ) -> Self {
        SessionManager {
            launcher,
            url: url.into(),
            settle,
            block_retries,
            backoff,
            clock,
        }
    }

    #[cfg(test)]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Opens a page on the portal. Block pages are retried with exponential
    /// backoff up to `block_retries` times; an empty title fails immediately.
    pub fn acquire(&mut self) -> Result<Session<L::Page>, ScrapeError> {
        let mut attempt = 0u32;
        loop {
            let page = self.launcher.launch().map_err(|e| match e {
                ScrapeError::SessionUnavailable(_) => e,
                other => ScrapeError::SessionUnavailable(other.to_string()),
            })?;
            let session = Session::new(page);

            info!("Attempting to access: {}", self.url);
            if let Err(e) = session.page().navigate(&self.url) {
                error!("Error accessing URL: {}", e);
                return Err(ScrapeError::SessionUnavailable(e.to_string()));
            }
            self.clock.sleep(self.settle);

            let title = match session.page().title() {
                Ok(t) => t,
                Err(e) => {
                    warn!("Could not read page title: {}", e);
                    String::new()
                }
            };
            if title.is_empty() {
                error!("Failed to load page (no title found)");
                return Err(ScrapeError::SessionUnavailable("page loaded without a title".to_string()));
            }
            info!("Page title: {}", title);

            if !is_blocked(&title) {
                return Ok(session);
            }

            warn!("Access blocked ({}). Backing off before retry.", title);
            drop(session);
            attempt += 1;
            if attempt > self.block_retries {
                error!("Failed to access URL after {} retries (blocked).", self.block_retries);
                return Err(ScrapeError::Blocked { attempts: attempt });
            }
            let delay = self.backoff.delay(attempt);
            info!("Waiting {} seconds before retry...", delay.as_secs());
            self.clock.sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay_manager::ManualClock;
    use crate::fixture::{FixturePage, FixtureStats};

    /// Hands out one page per entry in `titles`; the last title repeats.
    struct TitleLauncher {
        titles: Vec<&'static str>,
        launched: usize,
        stats: Vec<Rc<FixtureStats>>,
    }

    impl TitleLauncher {
        fn new(titles: Vec<&'static str>) -> Self {
            TitleLauncher { titles, launched: 0, stats: Vec::new() }
        }
    }

    impl Launcher for TitleLauncher {
        type Page = FixturePage;

        fn launch(&mut self) -> Result<FixturePage, ScrapeError> {
            let title = self.titles[self.launched.min(self.titles.len() - 1)];
            self.launched += 1;
            let page = FixturePage::single(&format!("<html><head><title>{}</title></head><body></body></html>", title));
            self.stats.push(page.stats());
            Ok(page)
        }
    }

    fn manager(titles: Vec<&'static str>, clock: Rc<ManualClock>) -> SessionManager<TitleLauncher> {
        SessionManager::new(
            TitleLauncher::new(titles),
            "https://portal.test/",
            Duration::from_secs(2),
            2,
            Backoff::new(Duration::from_secs(5)),
            clock,
        )
    }

    #[test]
    fn block_markers() {
        assert!(is_blocked("403 Forbidden"));
        assert!(is_blocked("Error 429"));
        assert!(!is_blocked("Consulta de Procesos"));
    }

    #[test]
    fn backs_off_after_blocks_then_succeeds() {
        let clock = Rc::new(ManualClock::new());
        let mut sessions = manager(vec!["403 Forbidden", "403 Forbidden", "Consulta de Procesos"], clock.clone());

        let session = sessions.acquire().unwrap();
        assert_eq!(session.page().title().unwrap(), "Consulta de Procesos");
        assert_eq!(sessions.launcher().launched, 3);

        // settle, backoff(1), settle, backoff(2), settle
        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 5);
        let backoffs = [sleeps[1], sleeps[3]];
        for (n, wait) in backoffs.iter().enumerate() {
            let floor = Duration::from_secs(5 * 2u64.pow(n as u32 + 1));
            assert!(*wait >= floor && *wait <= floor + Duration::from_secs(3), "{:?}", wait);
        }
        assert!(backoffs[0] <= backoffs[1]);

        // blocked pages were closed, the live one is still open
        let closes: Vec<usize> = sessions.launcher().stats.iter().map(|s| s.closes.get()).collect();
        assert_eq!(closes, vec![1, 1, 0]);
        drop(session);
        assert_eq!(sessions.launcher().stats[2].closes.get(), 1);
    }

    #[test]
    fn gives_up_after_block_retries() {
        let clock = Rc::new(ManualClock::new());
        let mut sessions = manager(vec!["403 Forbidden"], clock);
        match sessions.acquire() {
            Err(ScrapeError::Blocked { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected Blocked, got {:?}", other.map(|_| ())),
        }
        assert_eq!(sessions.launcher().launched, 3);
        assert!(sessions.launcher().stats.iter().all(|s| s.closes.get() == 1));
    }

    #[test]
    fn empty_title_is_unavailable() {
        let clock = Rc::new(ManualClock::new());
        let mut sessions = manager(vec![""], clock);
        assert!(matches!(sessions.acquire(), Err(ScrapeError::SessionUnavailable(_))));
        assert_eq!(sessions.launcher().launched, 1);
        assert_eq!(sessions.launcher().stats[0].closes.get(), 1);
    }
}
