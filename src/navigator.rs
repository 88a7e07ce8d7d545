//! Drives the portal from the search form to the detail tabs.
//!
//! Each step waits (bounded) for the controls it needs and clicks through
//! scripts. Steps must run in the order of [`Stage`].

use crate::config::Timeouts;
use crate::delay_manager::Clock;
use crate::dom::{self, Element, Locator, Page, Strategy, Wait};
use crate::error::ScrapeError;
use crate::extractor::looks_like_timestamp;
use log::{debug, error, info, warn};
use std::rc::Rc;
use std::time::Duration;

const RADIO: &str = "input[type='radio']";
const TEXT_INPUT: &str = "input[type='text']";
const TAB: &str = "div[role='tab']";

const CONSULTAR: [Strategy; 3] = [
    Strategy::new("aria-label", Locator::css("button[aria-label*='Consultar']")),
    Strategy::new("span text", Locator::with_descendant_text("button", "span", "Consultar")),
    Strategy::new(
        "success class",
        Locator::with_descendant_text("button[class*='success']", "span", "Consultar"),
    ),
];

const VOLVER: [Strategy; 2] = [
    Strategy::new("span text", Locator::with_descendant_text("button", "span", "Volver")),
    Strategy::new("aria-label", Locator::css("button[aria-label*='Volver']")),
];

/// Progress through one session, strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    ModeSelected,
    QuerySubmitted,
    DialogDismissed,
    DetailOpened,
    Actuaciones,
    SujetosProcesales,
    Done,
}

/// Detail tabs of a case record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailTab {
    Actuaciones,
    SujetosProcesales,
}

impl DetailTab {
    pub fn label(self) -> &'static str {
        match self {
            DetailTab::Actuaciones => "Actuaciones",
            DetailTab::SujetosProcesales => "Sujetos Procesales",
        }
    }

    fn stage(self) -> Stage {
        match self {
            DetailTab::Actuaciones => Stage::Actuaciones,
            DetailTab::SujetosProcesales => Stage::SujetosProcesales,
        }
    }
}

pub struct Navigator {
    clock: Rc<dyn Clock>,
    timeouts: Timeouts,
    stage: Stage,
}

impl Navigator {
    pub fn new(clock: Rc<dyn Clock>, timeouts: Timeouts) -> Self {
        Navigator {
            clock,
            timeouts,
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Back to `Start` for a new session.
    pub fn reset(&mut self) {
        self.stage = Stage::Start;
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next >= self.stage, "navigation went backwards: {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn wait(&self, timeout: Duration) -> Wait {
        Wait::new(timeout, self.timeouts.poll)
    }

    fn settle(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    /// Picks the second search mode ("por número de radicación").
    pub fn select_search_mode<P: Page>(&mut self, page: &P) -> Result<(), ScrapeError> {
        let Some(radios) = dom::wait_for_elements(page, self.clock.as_ref(), self.wait(self.timeouts.element), RADIO, 2)
        else {
            let found = page.find_all(RADIO).map(|r| r.len()).unwrap_or(0);
            error!("Found only {} radio button(s), need at least 2", found);
            return Err(ScrapeError::ElementNotFound("search mode radio buttons"));
        };

        page.script_click(&radios[1])?;
        info!("Successfully selected 2nd radio button");
        self.settle(self.timeouts.short_settle);
        self.advance(Stage::ModeSelected);
        Ok(())
    }

    pub fn enter_query<P: Page>(&mut self, page: &P, case_number: &str) -> Result<(), ScrapeError> {
        let Some(inputs) = dom::wait_for_elements(page, self.clock.as_ref(), self.wait(self.timeouts.element), TEXT_INPUT, 1)
        else {
            error!("No text input field found");
            return Err(ScrapeError::ElementNotFound("case number input"));
        };

        // the first text input is the search box
        page.fill(&inputs[0], case_number)?;
        info!("Successfully entered search number: {}", case_number);
        self.settle(self.timeouts.short_settle);
        Ok(())
    }

    /// Clicks CONSULTAR, trying each locating strategy in turn.
    pub fn submit_query<P: Page>(&mut self, page: &P) -> Result<(), ScrapeError> {
        let Some((strategy, button)) =
            dom::locate_first(page, self.clock.as_ref(), self.wait(self.timeouts.strategy), &CONSULTAR)
        else {
            error!("Could not find CONSULTAR button with any strategy");
            return Err(ScrapeError::ElementNotFound("CONSULTAR button"));
        };

        page.script_click(&button)?;
        info!("Successfully clicked CONSULTAR button ({})", strategy);
        self.settle(self.timeouts.long_settle);
        self.advance(Stage::QuerySubmitted);
        Ok(())
    }

    /// Closes the "VOLVER" dialog when the portal shows one. Never fails.
    pub fn dismiss_dialog_if_present<P: Page>(&mut self, page: &P) {
        match dom::locate_first(page, self.clock.as_ref(), self.wait(self.timeouts.dialog), &VOLVER) {
            Some((strategy, button)) => match page.script_click(&button) {
                Ok(()) => {
                    info!("Successfully clicked VOLVER button ({})", strategy);
                    self.settle(self.timeouts.short_settle);
                    self.advance(Stage::DialogDismissed);
                }
                Err(e) => warn!("VOLVER button found but click failed: {}", e),
            },
            None => info!("No VOLVER button found (dialog may not have appeared)"),
        }
    }

    /// Opens the first result whose second column holds a button.
    pub fn open_first_result<P: Page>(&mut self, page: &P) -> Result<(), ScrapeError> {
        let Some(tables) = dom::wait_for_elements(page, self.clock.as_ref(), self.wait(self.timeouts.element), "table", 1)
        else {
            error!("No results table appeared");
            return Err(ScrapeError::ElementNotFound("results table"));
        };

        let rows = tables[0].find_all("tr")?;
        if rows.len() < 2 {
            error!("Table has less than 2 rows (no data rows)");
            return Err(ScrapeError::NoClickableRow);
        }

        for (index, row) in rows.iter().enumerate().skip(1) {
            let row_number = index + 1;
            let cells = match row.find_all("td") {
                Ok(cells) => cells,
                Err(e) => {
                    debug!("Error processing row {}: {}", row_number, e);
                    continue;
                }
            };
            if cells.len() < 2 {
                debug!("Row {} has less than 2 columns, skipping", row_number);
                continue;
            }

            match cells[1].first("button") {
                Ok(Some(button)) => {
                    let number = button.text().unwrap_or_default();
                    info!("Found clickable number in row {}: {}", row_number, number);
                    page.script_click(&button)?;
                    info!("Successfully clicked the number: {}", number);
                    self.settle(self.timeouts.long_settle);
                    self.advance(Stage::DetailOpened);
                    return Ok(());
                }
                Ok(None) => {
                    if let Ok(Some(p)) = cells[1].first("p") {
                        debug!("Row {} has non-clickable number: {}", row_number, p.text().unwrap_or_default());
                    }
                }
                Err(e) => debug!("Error processing row {}: {}", row_number, e),
            }
        }

        error!("No clickable numbers found in table");
        Err(ScrapeError::NoClickableRow)
    }

    /// Activates a detail tab. For Actuaciones also waits for the table to fill,
    /// which is logged but never fatal.
    pub fn open_tab<P: Page>(&mut self, page: &P, tab: DetailTab) -> Result<(), ScrapeError> {
        if dom::wait_for_elements(page, self.clock.as_ref(), self.wait(self.timeouts.element), TAB, 1).is_none() {
            error!("No tabs found while looking for {}", tab.label());
            return Err(ScrapeError::ElementNotFound("detail tabs"));
        }

        let Some(target) = Locator::with_text(TAB, tab.label()).resolve(page)?.into_iter().next() else {
            error!("Tab {} not found", tab.label());
            return Err(ScrapeError::ElementNotFound(tab.label()));
        };

        page.script_click(&target)?;
        info!("Successfully clicked {} tab", tab.label());
        self.advance(tab.stage());

        match tab {
            DetailTab::Actuaciones => {
                self.settle(self.timeouts.short_settle);
                if !self.wait_for_table_ready(page, self.timeouts.table_ready) {
                    warn!("Actuaciones table may not be fully loaded yet");
                }
            }
            DetailTab::SujetosProcesales => self.settle(self.timeouts.long_settle),
        }
        Ok(())
    }

    /// True once some table cell holds text that is not just a date or timestamp.
    pub fn wait_for_table_ready<P: Page>(&self, page: &P, timeout: Duration) -> bool {
        dom::wait_for(self.clock.as_ref(), self.wait(timeout), || {
            self.has_content_cell(page).then_some(())
        })
        .is_some()
    }

    fn has_content_cell<P: Page>(&self, page: &P) -> bool {
        let Ok(tables) = page.find_all("table") else {
            return false;
        };
        for table in &tables {
            let Ok(rows) = table.find_all("tr") else { continue };
            for row in &rows {
                let cells = match row.find_all("td") {
                    Ok(cells) if !cells.is_empty() => cells,
                    _ => row.find_all("th").unwrap_or_default(),
                };
                for cell in &cells {
                    let Ok(text) = cell.text() else { continue };
                    if !text.is_empty() && !looks_like_timestamp(&text) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Marks the flow complete.
    pub fn finish(&mut self) {
        self.advance(Stage::Done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay_manager::ManualClock;
    use crate::fixture::FixturePage;

    fn navigator() -> (Navigator, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new());
        (Navigator::new(clock.clone(), Timeouts::default()), clock)
    }

    const SEARCH: &str = r#"<html><head><title>Consulta</title></head><body>
        <input type="radio" name="m" value="1"><input type="radio" name="m" value="2">
        <input type="text" id="q">
        <button class="v-btn success" data-goto="results"><span>Consultar</span></button>
    </body></html>"#;

    #[test]
    fn search_form_flow() {
        let page = FixturePage::new(&[("search", SEARCH), ("results", "<title>R</title><table></table>")]);
        let (mut nav, _) = navigator();

        nav.select_search_mode(&page).unwrap();
        nav.enter_query(&page, "11001310300120230001200").unwrap();
        nav.submit_query(&page).unwrap();

        assert_eq!(nav.stage(), Stage::QuerySubmitted);
        assert_eq!(page.current_screen(), "results");
        assert_eq!(*page.stats().typed.borrow(), vec!["11001310300120230001200".to_string()]);
        assert_eq!(page.stats().clicks.get(), 2);
    }

    #[test]
    fn single_radio_is_element_not_found() {
        let page = FixturePage::single(r#"<title>x</title><input type="radio">"#);
        let (mut nav, clock) = navigator();
        assert!(matches!(nav.select_search_mode(&page), Err(ScrapeError::ElementNotFound(_))));
        assert_eq!(clock.elapsed(), Timeouts::default().element);
    }

    #[test]
    fn submit_fails_after_all_strategies() {
        let page = FixturePage::single(r#"<title>x</title><button>Buscar</button>"#);
        let (mut nav, clock) = navigator();
        assert!(matches!(nav.submit_query(&page), Err(ScrapeError::ElementNotFound(_))));
        // three strategies, each with its own wait
        assert_eq!(clock.elapsed(), Timeouts::default().strategy * 3);
    }

    #[test]
    fn missing_dialog_is_not_an_error() {
        let page = FixturePage::single("<title>x</title><p>sin dialogo</p>");
        let (mut nav, _) = navigator();
        nav.dismiss_dialog_if_present(&page);
        assert_eq!(page.stats().clicks.get(), 0);

        let page = FixturePage::single(r#"<title>x</title><button aria-label="Volver al inicio">x</button>"#);
        nav.dismiss_dialog_if_present(&page);
        assert_eq!(page.stats().clicks.get(), 1);
        assert_eq!(nav.stage(), Stage::DialogDismissed);
    }

    #[test]
    fn opens_first_row_with_button() {
        let page = FixturePage::new(&[
            (
                "results",
                r#"<title>R</title><table>
                <tr><th>#</th><th>Numero</th></tr>
                <tr><td>1</td><td><p>11001310300120230001200</p></td></tr>
                <tr><td>2</td></tr>
                <tr><td>3</td><td><button data-goto="detail">11001310300120230001200</button></td></tr>
                <tr><td>4</td><td><button data-goto="other">x</button></td></tr>
            </table>"#,
            ),
            ("detail", "<title>D</title>"),
            ("other", "<title>O</title>"),
        ]);
        let (mut nav, _) = navigator();
        nav.open_first_result(&page).unwrap();
        assert_eq!(page.current_screen(), "detail");
        assert_eq!(nav.stage(), Stage::DetailOpened);
    }

    #[test]
    fn rows_without_buttons_are_no_clickable_row() {
        let page = FixturePage::single(
            "<title>R</title><table><tr><th>a</th><th>b</th></tr><tr><td>1</td><td><p>x</p></td></tr></table>",
        );
        let (mut nav, _) = navigator();
        assert!(matches!(nav.open_first_result(&page), Err(ScrapeError::NoClickableRow)));
    }

    #[test]
    fn tab_switch_and_readiness() {
        let page = FixturePage::new(&[
            (
                "detail",
                r#"<title>D</title><div role="tab">Datos del proceso</div>
                <div role="tab" data-goto="acts">Actuaciones</div>
                <div role="tab" data-goto="parties">Sujetos Procesales</div>"#,
            ),
            (
                "acts",
                r#"<title>D</title><div role="tab" data-goto="parties">Sujetos Procesales</div>
                <table><thead><tr><th>Fecha</th></tr></thead><tbody><tr><td>2023-01-10</td></tr></tbody></table>"#,
            ),
            ("parties", "<title>D</title>"),
        ]);
        let (mut nav, clock) = navigator();

        nav.open_tab(&page, DetailTab::Actuaciones).unwrap();
        assert_eq!(page.current_screen(), "acts");
        // the header "Fecha" is real content, so readiness resolves on the first poll
        assert_eq!(clock.elapsed(), Timeouts::default().short_settle);

        nav.open_tab(&page, DetailTab::SujetosProcesales).unwrap();
        assert_eq!(nav.stage(), Stage::SujetosProcesales);
        assert!(matches!(
            nav.open_tab(&page, DetailTab::Actuaciones),
            Err(ScrapeError::ElementNotFound(_))
        ));
    }

    #[test]
    fn timestamps_alone_are_not_ready() {
        let (nav, clock) = navigator();
        let page = FixturePage::single(
            "<title>t</title><table><tr><td>2023-01-10</td><td>10 Enero 2023</td><td>  </td></tr></table>",
        );
        assert!(!nav.wait_for_table_ready(&page, Duration::from_secs(8)));
        assert_eq!(clock.elapsed(), Duration::from_secs(8));

        let page = FixturePage::single(
            "<title>t</title><table><tr><td>2023-01-10</td><td>Auto admite demanda</td></tr></table>",
        );
        assert!(nav.wait_for_table_ready(&page, Duration::from_secs(8)));
    }
}
