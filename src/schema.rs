use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    #[schemars(description = "Statement of financial position: assets, liabilities and equity at a date")]
    BalanceSheet,

    #[schemars(description = "Profit and loss for a period")]
    IncomeStatement,

    #[schemars(description = "Operating, investing and financing cash flows")]
    CashFlow,

    #[schemars(
        description = "Every ledger account with opening/closing balances and period movement, usually split into debit and credit"
    )]
    TrialBalance,

    #[default]
    #[schemars(description = "No vocabulary matched")]
    Unknown,
}

impl TableType {
    pub fn label(&self) -> &'static str {
        match self {
            TableType::BalanceSheet => "balance_sheet",
            TableType::IncomeStatement => "income_statement",
            TableType::CashFlow => "cash_flow",
            TableType::TrialBalance => "trial_balance",
            TableType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse meaning of a column, taken from the first keyword group its header
/// text matches.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Debit,
    Credit,
    Beginning,
    Ending,
    Current,
    Previous,
    Amount,
    Balance,
    #[default]
    Unknown,
}

impl DataType {
    pub fn label(&self) -> &'static str {
        match self {
            DataType::Debit => "debit",
            DataType::Credit => "credit",
            DataType::Beginning => "beginning",
            DataType::Ending => "ending",
            DataType::Current => "current",
            DataType::Previous => "previous",
            DataType::Amount => "amount",
            DataType::Balance => "balance",
            DataType::Unknown => "unknown",
        }
    }
}

/// Accounting period a column reports on. `Beginning` is the start of the
/// fiscal year (年初), `Opening` the start of the reporting period (期初).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Beginning,
    Opening,
    Current,
    Previous,
    Ending,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
    Total,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Amount,
    Balance,
    Total,
    Subtotal,
}

/// Where a header cell's text came from when it sits inside a merged block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct HeaderSpan {
    pub row_span: usize,
    pub col_span: usize,
    pub origin_row: usize,
    pub origin_col: usize,
    #[schemars(description = "True only for the merge's leftmost column")]
    pub is_origin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ColumnInfo {
    #[schemars(description = "1-based column index, unique within a schema")]
    pub index: usize,
    pub letter: String,
    pub primary_header: String,
    pub secondary_header: String,
    pub primary_span: Option<HeaderSpan>,
    pub secondary_span: Option<HeaderSpan>,
    #[schemars(description = "Sampled rows below the header were mostly numeric")]
    pub is_numeric: bool,
    pub data_type: DataType,
    pub period: Option<Period>,
    pub direction: Option<Direction>,
    pub aggregate: Option<Aggregate>,
    #[schemars(description = "Stable, non-empty key used to address this column's values")]
    pub normalized_key: String,
    pub display_name: String,
    pub is_data_column: bool,
    #[schemars(description = "Both header levels were blank or a placeholder such as '---'")]
    pub is_placeholder: bool,
}

impl ColumnInfo {
    /// Primary and secondary header text joined with a space.
    pub fn header_text(&self) -> String {
        crate::utils::join_non_empty(&[&self.primary_header, &self.secondary_header], " ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TableSchema {
    pub sheet_name: String,
    pub table_type: TableType,
    pub header_start_row: usize,
    pub header_rows: usize,
    #[schemars(description = "First row holding line items; never inside the header block")]
    pub data_start_row: usize,
    pub name_columns: Vec<usize>,
    pub code_columns: Vec<usize>,
    pub columns: Vec<ColumnInfo>,
    pub has_hierarchy: bool,
    pub has_merged_header: bool,
}

impl TableSchema {
    /// The degraded result for sheets with no recognizable layout.
    pub fn empty(sheet_name: &str) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            table_type: TableType::Unknown,
            header_start_row: 1,
            header_rows: 0,
            data_start_row: 1,
            name_columns: Vec::new(),
            code_columns: Vec::new(),
            columns: Vec::new(),
            has_hierarchy: false,
            has_merged_header: false,
        }
    }

    pub fn column(&self, index: usize) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.index == index)
    }

    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|column| column.is_data_column)
    }

    /// Last row of the header block, or the row above the data when the block
    /// is empty.
    pub fn header_end_row(&self) -> usize {
        (self.header_start_row + self.header_rows).saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A line item on a target sheet whose value is still to be filled in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TargetItem {
    pub id: String,
    pub sheet_name: String,
    pub row: usize,
    #[schemars(description = "Text with the numbering token removed; leading indentation kept")]
    pub name: String,
    pub original_text: String,
    #[schemars(description = "Leading whitespace count of the original text")]
    pub level: usize,
    pub hierarchical_level: usize,
    #[schemars(description = "Final nesting level differs from the level read off the text")]
    pub level_adjusted: bool,
    #[schemars(description = "Numbering the author wrote in front of the text, digits only")]
    pub display_index: Option<String>,
    pub hierarchical_number: String,
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
    #[schemars(description = "Position of the parent within this sheet's items")]
    pub parent_index: Option<usize>,
    pub child_indices: Vec<usize>,
    pub target_cell_address: String,
    #[schemars(description = "Cell address of this row in every registered column, keyed by normalized key")]
    pub columns: BTreeMap<String, String>,
}

/// A row of candidate values on a source sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SourceItem {
    pub id: String,
    pub sheet_name: String,
    pub row: usize,
    pub name: String,
    pub account_code: Option<String>,
    pub hierarchy_level: usize,
    pub parent_code: Option<String>,
    pub table_type: TableType,
    #[schemars(description = "Values keyed by the sheet schema's normalized keys; null when the cell is empty or not numeric")]
    pub data_columns: BTreeMap<String, Option<f64>>,
    #[schemars(description = "First non-null value in column order")]
    pub primary_value: Option<f64>,
    pub cell_address: String,
}

impl SourceItem {
    /// Name indented two spaces per hierarchy level and prefixed with the
    /// account code when there is one.
    pub fn indented_name(&self) -> String {
        let indent = "  ".repeat(self.hierarchy_level.saturating_sub(1));
        match &self.account_code {
            Some(code) => format!("{}{} {}", indent, code, self.name),
            None => format!("{}{}", indent, self.name),
        }
    }
}

/// A target sheet and the column its values will be written to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct TargetSheet {
    pub name: String,
    #[schemars(description = "1-based numeric column; when absent the first data column is used")]
    pub target_column: Option<usize>,
}

impl TargetSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_column: None,
        }
    }

    pub fn with_column(name: impl Into<String>, target_column: usize) -> Self {
        Self {
            name: name.into(),
            target_column: Some(target_column),
        }
    }
}

/// Output of one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Extraction {
    pub target_items: Vec<TargetItem>,
    pub source_items: Vec<SourceItem>,
    pub schemas: BTreeMap<String, TableSchema>,
}

impl Extraction {
    pub fn targets_for<'a>(&'a self, sheet: &'a str) -> impl Iterator<Item = &'a TargetItem> + 'a {
        self.target_items.iter().filter(move |item| item.sheet_name == sheet)
    }

    pub fn sources_for<'a>(&'a self, sheet: &'a str) -> impl Iterator<Item = &'a SourceItem> + 'a {
        self.source_items.iter().filter(move |item| item.sheet_name == sheet)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Extraction)
    }
}
