//! [`Page`] over static HTML, parsed with `scraper`.
//!
//! A fixture is a list of named screens. Clicking an element that carries (or
//! sits inside an element carrying) `data-goto="<screen>"` switches the current
//! screen, which is enough to replay the portal flow offline. Counters record
//! how much of the document was touched. An element marked `data-fail` fails
//! every lookup and text read made through it, like a node that went stale.

use crate::dom::{DomResult, Element, Page};
use crate::error::ScrapeError;
use scraper::{ElementRef, Html, Selector};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Screen {
    name: String,
    html: Html,
}

impl Screen {
    fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.root_element().descendants().filter_map(ElementRef::wrap)
    }

    fn element(&self, index: usize) -> Option<ElementRef<'_>> {
        self.elements().nth(index)
    }

    fn index_of(&self, target: ElementRef<'_>) -> Option<usize> {
        self.elements().position(|e| e.id() == target.id())
    }
}

/// Interaction counters shared by a page and its elements.
#[derive(Debug, Default)]
pub struct FixtureStats {
    pub text_reads: Cell<usize>,
    pub lookups: Cell<usize>,
    pub clicks: Cell<usize>,
    pub navigations: Cell<usize>,
    pub closes: Cell<usize>,
    pub typed: RefCell<Vec<String>>,
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

fn parse_selector(css: &str) -> DomResult<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::Driver(format!("bad selector '{}': {}", css, e)))
}

#[derive(Clone)]
pub struct FixtureElement {
    screen: Rc<Screen>,
    index: usize,
    stats: Rc<FixtureStats>,
}

impl FixtureElement {
    fn with_ref<T>(&self, f: impl FnOnce(ElementRef<'_>) -> T) -> DomResult<T> {
        self.screen
            .element(self.index)
            .map(f)
            .ok_or_else(|| ScrapeError::Driver("stale fixture element".to_string()))
    }

    fn fail_if_marked(&self) -> DomResult<()> {
        if self.with_ref(|el| el.value().attr("data-fail").is_some())? {
            return Err(ScrapeError::Driver("element detached from document".to_string()));
        }
        Ok(())
    }

    fn self_or_ancestor_attr(&self, name: &str) -> DomResult<Option<String>> {
        self.with_ref(|el| {
            std::iter::once(el)
                .chain(el.ancestors().filter_map(ElementRef::wrap))
                .find_map(|e| e.value().attr(name).map(str::to_string))
        })
    }
}

impl Element for FixtureElement {
    fn find_all(&self, css: &str) -> DomResult<Vec<Self>> {
        bump(&self.stats.lookups);
        self.fail_if_marked()?;
        let selector = parse_selector(css)?;
        let indices: Vec<usize> = self.with_ref(|el| {
            el.select(&selector)
                .filter_map(|found| self.screen.index_of(found))
                .collect()
        })?;
        Ok(indices
            .into_iter()
            .map(|index| FixtureElement {
                screen: Rc::clone(&self.screen),
                index,
                stats: Rc::clone(&self.stats),
            })
            .collect())
    }

    fn inner_text(&self) -> DomResult<String> {
        bump(&self.stats.text_reads);
        self.fail_if_marked()?;
        self.with_ref(|el| el.text().collect::<String>())
    }

    fn attribute(&self, name: &str) -> DomResult<Option<String>> {
        self.with_ref(|el| el.value().attr(name).map(str::to_string))
    }
}

pub struct FixturePage {
    screens: Vec<Rc<Screen>>,
    current: Cell<usize>,
    stats: Rc<FixtureStats>,
}

impl FixturePage {
    /// Screens as `(name, html)`; the first one is shown after `navigate`.
    pub fn new(screens: &[(&str, &str)]) -> Self {
        FixturePage {
            screens: screens
                .iter()
                .map(|(name, html)| {
                    Rc::new(Screen {
                        name: name.to_string(),
                        html: Html::parse_document(html),
                    })
                })
                .collect(),
            current: Cell::new(0),
            stats: Rc::new(FixtureStats::default()),
        }
    }

    pub fn single(html: &str) -> Self {
        Self::new(&[("main", html)])
    }

    pub fn stats(&self) -> Rc<FixtureStats> {
        Rc::clone(&self.stats)
    }

    pub fn current_screen(&self) -> &str {
        self.screens
            .get(self.current.get())
            .map(|s| s.name.as_str())
            .unwrap_or("")
    }

    fn screen(&self) -> DomResult<&Rc<Screen>> {
        self.screens
            .get(self.current.get())
            .ok_or_else(|| ScrapeError::Driver("fixture has no screens".to_string()))
    }
}

impl Page for FixturePage {
    type Element<'a> = FixtureElement where Self: 'a;

    fn navigate(&self, _url: &str) -> DomResult<()> {
        bump(&self.stats.navigations);
        self.current.set(0);
        Ok(())
    }

    fn title(&self) -> DomResult<String> {
        let screen = self.screen()?;
        let selector = parse_selector("title")?;
        Ok(screen
            .html
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default())
    }

    fn find_all(&self, css: &str) -> DomResult<Vec<FixtureElement>> {
        bump(&self.stats.lookups);
        let screen = self.screen()?;
        let selector = parse_selector(css)?;
        Ok(screen
            .html
            .select(&selector)
            .filter_map(|found| screen.index_of(found))
            .map(|index| FixtureElement {
                screen: Rc::clone(screen),
                index,
                stats: Rc::clone(&self.stats),
            })
            .collect())
    }

    fn script_click(&self, element: &FixtureElement) -> DomResult<()> {
        bump(&self.stats.clicks);
        if let Some(target) = element.self_or_ancestor_attr("data-goto")? {
            let next = self
                .screens
                .iter()
                .position(|s| s.name == target)
                .ok_or_else(|| ScrapeError::Driver(format!("fixture has no screen '{}'", target)))?;
            self.current.set(next);
        }
        Ok(())
    }

    fn fill(&self, _element: &FixtureElement, text: &str) -> DomResult<()> {
        self.stats.typed.borrow_mut().push(text.to_string());
        Ok(())
    }

    fn is_interactable(&self, element: &FixtureElement) -> DomResult<bool> {
        let disabled = element.attribute("disabled")?.is_some();
        let hidden = element.self_or_ancestor_attr("hidden")?.is_some();
        Ok(!disabled && !hidden)
    }

    fn close(&self) {
        bump(&self.stats.closes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_switches_screen() {
        let page = FixturePage::new(&[
            ("search", "<title>Search</title><button data-goto='results'><span>Go</span></button>"),
            ("results", "<title>Results</title><table><tr><td>1</td></tr></table>"),
        ]);
        assert_eq!(page.title().unwrap(), "Search");
        let span = page.find_all("button span").unwrap().remove(0);
        page.script_click(&span).unwrap();
        assert_eq!(page.current_screen(), "results");
        assert_eq!(page.title().unwrap(), "Results");
        assert_eq!(page.find_all("td").unwrap().len(), 1);

        page.navigate("http://example.test").unwrap();
        assert_eq!(page.current_screen(), "search");
        assert_eq!(page.stats().clicks.get(), 1);
    }

    #[test]
    fn nested_lookup_is_scoped_to_element() {
        let page = FixturePage::single(
            "<table id='a'><tr><td>x</td></tr></table><table id='b'><tr><td>y</td><td>z</td></tr></table>",
        );
        let tables = page.find_all("table").unwrap();
        assert_eq!(tables[0].find_all("td").unwrap().len(), 1);
        let cells = tables[1].find_all("td").unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1].text().unwrap(), "z");
        assert_eq!(page.stats().text_reads.get(), 1);
    }

    #[test]
    fn marked_elements_fail_lookups_and_reads() {
        let page = FixturePage::single("<table><tr data-fail><td>x</td></tr><tr><td>y</td></tr></table>");
        let rows = page.find_all("tr").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[0].find_all("td"), Err(ScrapeError::Driver(_))));
        assert!(matches!(rows[0].inner_text(), Err(ScrapeError::Driver(_))));
        assert_eq!(rows[1].first("td").unwrap().unwrap().text().unwrap(), "y");
    }

    #[test]
    fn hidden_and_disabled_are_not_interactable() {
        let page = FixturePage::single(
            "<div hidden><button id='h'>a</button></div><button id='d' disabled>b</button><button id='ok'>c</button>",
        );
        let buttons = page.find_all("button").unwrap();
        let flags: Vec<bool> = buttons.iter().map(|b| page.is_interactable(b).unwrap()).collect();
        assert_eq!(flags, vec![false, false, true]);
    }
}
