use crate::error::StoreError;
use calamine::{open_workbook, Reader, Xlsx};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use umya_spreadsheet::NumberingFormat;

/// Column D (1-based) holds the case number.
pub const KEY_COLUMN: u32 = 4;

/// Fixed column ranges written back to the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    /// Column A.
    Plaintiff,
    /// Column B.
    Defendant,
    /// Column C.
    Court,
    /// Columns E..J.
    LatestAction,
}

impl FieldGroup {
    /// First column (1-based).
    pub fn first_column(self) -> u32 {
        match self {
            FieldGroup::Plaintiff => 1,
            FieldGroup::Defendant => 2,
            FieldGroup::Court => 3,
            FieldGroup::LatestAction => 5,
        }
    }

    pub fn width(self) -> usize {
        match self {
            FieldGroup::LatestAction => 6,
            _ => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldGroup::Plaintiff => "Demandante",
            FieldGroup::Defendant => "Demandado",
            FieldGroup::Court => "Despacho",
            FieldGroup::LatestAction => "Actuaciones",
        }
    }

    /// Exactly `width()` values: extra ones dropped, missing ones empty.
    pub fn fit(self, values: &[String]) -> Vec<String> {
        (0..self.width())
            .map(|i| values.get(i).cloned().unwrap_or_default())
            .collect()
    }
}

/// Tabular source of case numbers, keyed by column D.
pub trait RecordStore {
    /// Case numbers below the header row, blanks skipped, in file order.
    fn list_pending_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Writes `values` into `group`'s columns on the first row whose key
    /// matches, then saves the file.
    fn upsert_fields(&mut self, key: &str, group: FieldGroup, values: &[String]) -> Result<(), StoreError>;
}

/// Picks the backend from the file extension; anything but xlsx/xlsm is CSV.
pub fn open_store<P: AsRef<Path>>(path: P) -> Box<dyn RecordStore> {
    let path = path.as_ref().to_path_buf();
    let is_excel = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xlsm"));
    if is_excel {
        Box::new(XlsxStore::new(path))
    } else {
        Box::new(CsvStore::new(path))
    }
}

fn ensure_exists(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        Ok(())
    } else {
        error!("Record store file not found: {:?}", path);
        Err(StoreError::StoreUnavailable(path.to_path_buf()))
    }
}

fn xlsx_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Xlsx(e.to_string())
}

/// First worksheet of an .xlsx workbook. Keys are read with calamine, writes
/// go through umya-spreadsheet so styles and other sheets survive.
#[derive(Debug, Clone)]
pub struct XlsxStore {
    path: PathBuf,
}

impl XlsxStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        XlsxStore { path: path.into() }
    }
}

impl RecordStore for XlsxStore {
    fn list_pending_keys(&self) -> Result<Vec<String>, StoreError> {
        ensure_exists(&self.path)?;
        info!("Reading numbers from Excel file: {:?}", self.path);

        let mut workbook: Xlsx<_> = open_workbook(&self.path).map_err(xlsx_err)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| StoreError::Xlsx("workbook has no worksheets".to_string()))?
            .map_err(xlsx_err)?;

        let mut keys = Vec::new();
        let Some((last_row, _)) = range.end() else {
            warn!("No numbers found in Excel file");
            return Ok(keys);
        };

        // absolute row 0 is the header
        for row in 1..=last_row {
            let Some(cell) = range.get_value((row, KEY_COLUMN - 1)) else { continue };
            let key = cell.to_string().trim().to_string();
            if !key.is_empty() {
                debug!("Row {}: {}", row + 1, key);
                keys.push(key);
            }
        }

        if keys.is_empty() {
            warn!("No numbers found in Excel file");
        } else {
            info!("Successfully read {} number(s) from Excel", keys.len());
        }
        Ok(keys)
    }

    fn upsert_fields(&mut self, key: &str, group: FieldGroup, values: &[String]) -> Result<(), StoreError> {
        ensure_exists(&self.path)?;
        let mut book = umya_spreadsheet::reader::xlsx::read(&self.path).map_err(xlsx_err)?;
        let sheet = book
            .get_sheet_mut(&0)
            .ok_or_else(|| StoreError::Xlsx("workbook has no worksheets".to_string()))?;

        let wanted = key.trim();
        let target_row = (2..=sheet.get_highest_row())
            .find(|&row| sheet.get_value((KEY_COLUMN, row)).trim() == wanted)
            .ok_or_else(|| {
                error!("Number {} not found in Excel file", key);
                StoreError::KeyNotFound(key.to_string())
            })?;

        for (offset, value) in group.fit(values).into_iter().enumerate() {
            let column = group.first_column() + offset as u32;
            debug!("  Row {}, Col {} ({}): {}", target_row, column, group.name(), value);
            let cell = sheet.get_cell_mut((column, target_row));
            cell.set_value_string(value);
            // text format keeps case numbers and dates from being reinterpreted
            cell.get_style_mut()
                .get_number_format_mut()
                .set_format_code(NumberingFormat::FORMAT_TEXT);
        }

        umya_spreadsheet::writer::xlsx::write(&book, &self.path).map_err(xlsx_err)?;
        info!("Successfully wrote {} to Excel for: {}", group.name(), key);
        Ok(())
    }
}

/// Same layout as the spreadsheet, as a headed CSV file rewritten on each upsert.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvStore { path: path.into() }
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        ensure_exists(&self.path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    fn write_rows(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_path(&self.path)?;
        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn key_of(row: &[String]) -> &str {
    row.get(KEY_COLUMN as usize - 1).map(|s| s.trim()).unwrap_or("")
}

impl RecordStore for CsvStore {
    fn list_pending_keys(&self) -> Result<Vec<String>, StoreError> {
        info!("Reading numbers from CSV file: {:?}", self.path);
        let keys: Vec<String> = self
            .read_rows()?
            .iter()
            .skip(1)
            .map(|row| key_of(row).to_string())
            .filter(|key| !key.is_empty())
            .collect();
        info!("Loaded {} number(s) from CSV {:?}", keys.len(), self.path);
        Ok(keys)
    }

    fn upsert_fields(&mut self, key: &str, group: FieldGroup, values: &[String]) -> Result<(), StoreError> {
        let mut rows = self.read_rows()?;
        let wanted = key.trim();
        let row = rows
            .iter_mut()
            .skip(1)
            .find(|row| key_of(row) == wanted)
            .ok_or_else(|| {
                error!("Number {} not found in CSV file", key);
                StoreError::KeyNotFound(key.to_string())
            })?;

        let start = group.first_column() as usize - 1;
        let fitted = group.fit(values);
        if row.len() < start + fitted.len() {
            row.resize(start + fitted.len(), String::new());
        }
        for (offset, value) in fitted.into_iter().enumerate() {
            row[start + offset] = value;
        }

        self.write_rows(&rows)?;
        info!("Successfully wrote {} to CSV for: {}", group.name(), key);
        Ok(())
    }
}
