use crate::config::Timeouts;
use crate::delay_manager::Clock;
use crate::dom::{self, Element, Page, Wait};
use log::{debug, error, info, warn};
use regex::Regex;
use std::rc::Rc;
use std::sync::LazyLock;

/// Width of the Actuaciones row written to the store.
pub const ACTION_COLUMNS: usize = 6;

/// Header words that identify the Actuaciones table.
const HEADER_KEYWORDS: [&str; 6] = ["fecha", "actuaci", "despacho", "tipo", "documento", "observacion"];

/// Nested elements whose text wins over the cell's own text, in order.
const CELL_TEXT_SOURCES: [&str; 3] = ["button", "span", "a"];

/// First row of the Actuaciones table, padded with empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionRow(pub [String; ACTION_COLUMNS]);

impl ActionRow {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(String::is_empty)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parties {
    pub plaintiff: String,
    pub defendant: String,
}

/// `YYYY-MM-DD` shaped: ten characters with dashes at positions 4 and 7.
pub fn looks_like_date(value: &str) -> bool {
    let chars: Vec<char> = value.chars().collect();
    chars.len() == 10 && chars[4] == '-' && chars[7] == '-'
}

/// Short text with a colon is another field's label, not a value.
pub fn looks_like_label(value: &str) -> bool {
    value.contains(':') && value.chars().count() < 30
}

/// ISO date, "3 Mar 2023" style date, ISO date-time.
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}|\d{1,2}\s+[A-Za-z]{3,}\s+\d{4}|\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}")
        .expect("timestamp pattern is valid")
});

/// Cell text that holds a date or timestamp somewhere in it.
pub fn looks_like_timestamp(value: &str) -> bool {
    TIMESTAMP.is_match(value)
}

pub fn accept_court_candidate(value: &str) -> bool {
    !value.is_empty() && !looks_like_date(value) && !looks_like_label(value)
}

/// What the first populated row of a table says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    pub text: String,
    pub columns: usize,
}

/// Ordering key for candidate tables: keyword match, then exactly six
/// columns, then column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableScore {
    pub keyword: bool,
    pub six_columns: bool,
    pub columns: usize,
}

impl TableScore {
    pub fn of(header: &TableHeader) -> Self {
        TableScore {
            keyword: HEADER_KEYWORDS.iter().any(|k| header.text.contains(k)),
            six_columns: header.columns == ACTION_COLUMNS,
            columns: header.columns,
        }
    }
}

/// Index of the best table; ties go to the earliest. Tables without a header
/// row (`None`) never win.
pub fn rank_tables(headers: &[Option<TableHeader>]) -> Option<usize> {
    let mut best: Option<(usize, TableScore)> = None;
    for (index, header) in headers.iter().enumerate() {
        let Some(header) = header else { continue };
        let score = TableScore::of(header);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

/// Reads case fields out of the portal's loosely structured tables.
///
/// All reads are best effort: a row or cell that cannot be read is skipped
/// and a missing field comes back as an empty string.
pub struct Extractor {
    clock: Rc<dyn Clock>,
    timeouts: Timeouts,
}

impl Extractor {
    pub fn new(clock: Rc<dyn Clock>, timeouts: Timeouts) -> Self {
        Extractor { clock, timeouts }
    }

    fn wait_for_tables<'a, P: Page>(&self, page: &'a P) -> Option<Vec<P::Element<'a>>> {
        dom::wait_for_elements(
            page,
            self.clock.as_ref(),
            Wait::new(self.timeouts.element, self.timeouts.poll),
            "table",
            1,
        )
    }

    /// Value next to the `Despacho:` header in the Datos del Proceso view.
    pub fn extract_court<P: Page>(&self, page: &P) -> String {
        let Some(tables) = self.wait_for_tables(page) else {
            error!("No tables found in Datos de Proceso");
            return String::new();
        };

        for table in &tables {
            let Ok(rows) = table.find_all("tr") else { continue };
            for row in &rows {
                let (Ok(headers), Ok(cells)) = (row.find_all("th"), row.find_all("td")) else {
                    continue;
                };
                if headers.is_empty() || cells.is_empty() {
                    continue;
                }
                match headers[0].text() {
                    Ok(label) if label == "Despacho:" => {}
                    _ => continue,
                }
                let Ok(value) = cells[0].text() else { continue };
                if accept_court_candidate(&value) {
                    info!("Found Despacho: {}", value);
                    return value;
                }
                debug!("Rejected Despacho candidate: {:?}", value);
            }
        }

        warn!("Despacho row not found in table");
        self.log_table_outline(page);
        String::new()
    }

    /// Dumps the first rows of every table at debug level.
    pub fn log_table_outline<P: Page>(&self, page: &P) {
        let Ok(tables) = page.find_all("table") else { return };
        debug!("Found {} table(s) on page", tables.len());
        for (t, table) in tables.iter().enumerate() {
            let rows = table.find_all("tr").unwrap_or_default();
            debug!("  Table {}: {} row(s)", t + 1, rows.len());
            for (r, row) in rows.iter().take(10).enumerate() {
                let cells = match row.find_all("th") {
                    Ok(th) if !th.is_empty() => th,
                    _ => row.find_all("td").unwrap_or_default(),
                };
                let texts: Vec<String> = cells
                    .iter()
                    .map(|c| {
                        let text = c.text().unwrap_or_default();
                        if text.chars().count() > 50 {
                            format!("{}...", text.chars().take(50).collect::<String>())
                        } else {
                            text
                        }
                    })
                    .collect();
                debug!("    Row {}: {:?}", r + 1, texts);
            }
        }
    }

    fn header_of<E: Element>(table: &E) -> Option<TableHeader> {
        let rows = table.find_all("tr").ok()?;
        rows.iter().find_map(|row| {
            let cells = match row.find_all("th") {
                Ok(th) if !th.is_empty() => th,
                _ => row.find_all("td").ok()?,
            };
            if cells.is_empty() {
                return None;
            }
            let text = cells
                .iter()
                .map(|c| c.text().unwrap_or_default().to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            Some(TableHeader { text, columns: cells.len() })
        })
    }

    fn cell_text<E: Element>(cell: &E) -> String {
        for css in CELL_TEXT_SOURCES {
            if let Ok(Some(inner)) = cell.first(css) {
                if let Ok(text) = inner.text() {
                    return text;
                }
            }
        }
        cell.text().unwrap_or_default()
    }

    /// Most recent entry of the Actuaciones table.
    pub fn extract_first_action_row<P: Page>(&self, page: &P) -> ActionRow {
        let Some(tables) = self.wait_for_tables(page) else {
            error!("No tables found on Actuaciones tab");
            return ActionRow::default();
        };

        let headers: Vec<Option<TableHeader>> = tables.iter().map(Self::header_of).collect();
        let chosen = rank_tables(&headers).unwrap_or(0);
        debug!("Actuaciones table candidate {} of {}", chosen + 1, tables.len());
        let table = &tables[chosen];

        // Body rows are data rows; without a body the first row is the header.
        let tbodies = table.find_all("tbody").unwrap_or_default();
        let data_row = match tbodies.first() {
            Some(body) => body.find_all("tr").unwrap_or_default().into_iter().next(),
            None => {
                let mut rows = table.find_all("tr").unwrap_or_default();
                if rows.len() > 1 {
                    Some(rows.swap_remove(1))
                } else {
                    rows.into_iter().next()
                }
            }
        };
        let Some(data_row) = data_row else {
            error!("Actuaciones table has no rows");
            return ActionRow::default();
        };

        let cells = match data_row.find_all("td") {
            Ok(td) if !td.is_empty() => td,
            _ => data_row.find_all("th").unwrap_or_default(),
        };

        let mut row = ActionRow::default();
        for (slot, cell) in row.0.iter_mut().zip(cells.iter()) {
            *slot = Self::cell_text(cell);
        }
        info!("Actuaciones first row extracted");
        row
    }

    /// Demandante / Demandado from the Sujetos Procesales tables. Stops reading
    /// as soon as both are known.
    pub fn extract_parties<P: Page>(&self, page: &P) -> Parties {
        let mut parties = Parties::default();
        let Some(tables) = self.wait_for_tables(page) else {
            error!("No tables found in Sujetos Procesales");
            return parties;
        };

        for table in &tables {
            let Ok(rows) = table.find_all("tr") else { continue };
            for row in &rows {
                let Ok(cells) = row.find_all("td") else { continue };
                if cells.len() < 2 {
                    continue;
                }
                let (Ok(role), Ok(name)) = (cells[0].text(), cells[1].text()) else {
                    continue;
                };

                if role == "Demandante" && parties.plaintiff.is_empty() {
                    info!("Found Demandante: {}", name);
                    parties.plaintiff = name;
                } else if role == "Demandado" && parties.defendant.is_empty() {
                    info!("Found Demandado: {}", name);
                    parties.defendant = name;
                }

                if !parties.plaintiff.is_empty() && !parties.defendant.is_empty() {
                    return parties;
                }
            }
        }

        info!("Demandante: {}", or_missing(&parties.plaintiff));
        info!("Demandado: {}", or_missing(&parties.defendant));
        parties
    }
}

fn or_missing(value: &str) -> &str {
    if value.is_empty() {
        "(not found)"
    } else {
        value
    }
}
