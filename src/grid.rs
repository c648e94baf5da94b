//! The cell-grid contract between the workbook loader and the layout engine.
//!
//! Rows and columns are 1-based, matching the addresses users see in a
//! spreadsheet application. A missing cell and a whitespace-only text cell are
//! both treated as empty by the inference passes.

use crate::utils::{format_number, parse_number};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl CellValue {
    /// Renders the value the way it would read in the sheet. Integral numbers
    /// lose their trailing `.0` so account codes stored as numbers read as codes.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Text(text) => Cow::Borrowed(text.as_str()),
            CellValue::Number(number) => Cow::Owned(format_number(*number)),
            CellValue::Bool(flag) => Cow::Owned(flag.to_string()),
            CellValue::Date(date) => Cow::Owned(date.format("%Y-%m-%d").to_string()),
        }
    }

    /// Numeric reading of the cell: real numbers, or text such as `1,234.50`
    /// and `(300)`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(number) => Some(*number),
            CellValue::Text(text) => parse_number(text),
            CellValue::Bool(_) | CellValue::Date(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

/// A rectangle of merged cells. The origin cell `(min_row, min_col)` holds the
/// visible value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct MergeRange {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl MergeRange {
    pub fn new(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self {
            min_row: min_row.min(max_row),
            min_col: min_col.min(max_col),
            max_row: max_row.max(min_row),
            max_col: max_col.max(min_col),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.min_row..=self.max_row).contains(&row) && (self.min_col..=self.max_col).contains(&col)
    }

    pub fn overlaps_rows(&self, first_row: usize, last_row: usize) -> bool {
        self.min_row <= last_row && self.max_row >= first_row
    }

    pub fn row_span(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    pub fn col_span(&self) -> usize {
        self.max_col - self.min_col + 1
    }
}

/// One materialized sheet.
pub trait Grid {
    fn max_row(&self) -> usize;

    fn max_column(&self) -> usize;

    /// `None` for cells that hold nothing.
    fn cell(&self, row: usize, col: usize) -> Option<&CellValue>;

    fn merges(&self) -> &[MergeRange];

    /// Trimmed text of a non-blank cell.
    fn text(&self, row: usize, col: usize) -> Option<String> {
        self.cell(row, col)
            .filter(|value| !value.is_blank())
            .map(|value| value.to_text().trim().to_string())
    }

    /// Text of a non-blank cell with leading indentation kept and trailing
    /// whitespace removed.
    fn raw_text(&self, row: usize, col: usize) -> Option<String> {
        self.cell(row, col)
            .filter(|value| !value.is_blank())
            .map(|value| value.to_text().trim_end().to_string())
    }

    fn number(&self, row: usize, col: usize) -> Option<f64> {
        self.cell(row, col).and_then(CellValue::as_number)
    }
}

/// Sheet lookup supplied by the workbook loader.
pub trait Workbook {
    fn sheet(&self, name: &str) -> Option<&dyn Grid>;
}

/// An in-memory grid, used by tests and by callers that already hold the
/// cell values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryGrid {
    cells: BTreeMap<(usize, usize), CellValue>,
    merges: Vec<MergeRange>,
    max_row: usize,
    max_col: usize,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a grid from row-major values starting at A1. `None` leaves the
    /// cell empty.
    pub fn from_rows<R, V>(rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<Option<V>>>,
        V: Into<CellValue>,
    {
        let mut grid = Self::new();
        for (row_offset, row) in rows.into_iter().enumerate() {
            for (col_offset, value) in row.into_iter().enumerate() {
                if let Some(value) = value {
                    grid.set(row_offset + 1, col_offset + 1, value);
                }
            }
        }
        grid
    }

    pub fn set(&mut self, row: usize, col: usize, value: impl Into<CellValue>) {
        if row == 0 || col == 0 {
            return;
        }
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
        self.cells.insert((row, col), value.into());
    }

    pub fn with(mut self, row: usize, col: usize, value: impl Into<CellValue>) -> Self {
        self.set(row, col, value);
        self
    }

    pub fn merge(&mut self, min_row: usize, min_col: usize, max_row: usize, max_col: usize) {
        let range = MergeRange::new(min_row, min_col, max_row, max_col);
        self.max_row = self.max_row.max(range.max_row);
        self.max_col = self.max_col.max(range.max_col);
        self.merges.push(range);
    }

    pub fn with_merge(mut self, min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        self.merge(min_row, min_col, max_row, max_col);
        self
    }
}

impl Grid for MemoryGrid {
    fn max_row(&self) -> usize {
        self.max_row
    }

    fn max_column(&self) -> usize {
        self.max_col
    }

    fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.cells.get(&(row, col))
    }

    fn merges(&self) -> &[MergeRange] {
        &self.merges
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: BTreeMap<String, MemoryGrid>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, grid: MemoryGrid) {
        self.sheets.insert(name.into(), grid);
    }

    pub fn with_sheet(mut self, name: impl Into<String>, grid: MemoryGrid) -> Self {
        self.insert(name, grid);
        self
    }
}

impl Workbook for MemoryWorkbook {
    fn sheet(&self, name: &str) -> Option<&dyn Grid> {
        self.sheets.get(name).map(|grid| grid as &dyn Grid)
    }
}

/// Spreadsheet column label for a 1-based column index (1 → `A`, 27 → `AA`).
pub fn column_letter(col: usize) -> String {
    let mut index = col.max(1);
    let mut label = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        label.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    label.iter().rev().collect()
}

/// A1-style address for 1-based coordinates.
pub fn cell_address(row: usize, col: usize) -> String {
    format!("{}{}", column_letter(col), row)
}
