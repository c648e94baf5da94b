use crate::error::Result;
use crate::schema::TableType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the inference passes consult: scan bounds, ratios and the
/// curated keyword tables. Plain data; compile it into a
/// [`crate::vocabulary::Vocabulary`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExtractionConfig {
    pub limits: ScanLimits,
    pub keywords: KeywordTables,
    pub key_dictionaries: KeyDictionaries,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            limits: ScanLimits::default(),
            keywords: KeywordTables::default(),
            key_dictionaries: KeyDictionaries::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ExtractionConfig)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScanLimits {
    #[schemars(description = "Rows inspected when looking for the header block")]
    pub max_header_scan_rows: usize,
    #[schemars(description = "Upper bound on the rows a header block may span")]
    pub max_header_rows: usize,
    #[schemars(description = "Columns inspected by schema inference")]
    pub max_columns: usize,
    #[schemars(description = "Rows below the header sampled to decide whether a column is numeric")]
    pub numeric_sample_rows: usize,
    #[schemars(description = "Leading rows whose text feeds table-type classification")]
    pub type_scan_rows: usize,
    #[schemars(description = "Leading columns whose text feeds table-type classification")]
    pub type_scan_columns: usize,
    #[schemars(description = "Leading columns considered as name or code columns")]
    pub name_code_columns: usize,
    #[schemars(description = "Rows sampled per candidate name/code column")]
    pub name_code_sample_rows: usize,
    #[schemars(description = "Rows after the header searched for the first data row")]
    pub data_start_search_rows: usize,
    #[schemars(description = "Header cells longer than this (in characters) look like data")]
    pub max_header_text_chars: usize,
    pub numeric_ratio: f64,
    pub code_ratio: f64,
    pub name_ratio: f64,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_header_scan_rows: 12,
            max_header_rows: 4,
            max_columns: 16,
            numeric_sample_rows: 10,
            type_scan_rows: 10,
            type_scan_columns: 10,
            name_code_columns: 5,
            name_code_sample_rows: 6,
            data_start_search_rows: 8,
            max_header_text_chars: 30,
            numeric_ratio: 0.5,
            code_ratio: 0.7,
            name_ratio: 0.7,
        }
    }
}

/// Regular expressions, matched case-insensitively against cell text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct KeywordTables {
    pub balance_sheet: Vec<String>,
    pub income_statement: Vec<String>,
    pub cash_flow: Vec<String>,
    pub trial_balance: Vec<String>,

    pub header: Vec<String>,
    pub meta: Vec<String>,
    pub numbered_row: Vec<String>,
    pub total_row: Vec<String>,

    pub name_header: Vec<String>,
    pub code_header: Vec<String>,
    pub line_number: Vec<String>,
    pub account_code: String,
    pub excluded_account_names: Vec<String>,

    pub debit: Vec<String>,
    pub credit: Vec<String>,
    pub year_opening: Vec<String>,
    pub opening: Vec<String>,
    pub current: Vec<String>,
    pub previous: Vec<String>,
    pub ending: Vec<String>,
    pub amount: Vec<String>,
    pub balance: Vec<String>,
    pub total: Vec<String>,
    pub subtotal: Vec<String>,

    pub numbering_tokens: Vec<String>,
    pub top_level: Vec<String>,
    pub subordinate: Vec<String>,
    pub target_skip: Vec<String>,
}

fn patterns(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            balance_sheet: patterns(&[
                r"资产负债表",
                r"资产.*负债",
                r"balance\s*sheet",
                r"financial\s+position",
                r"资产总计",
                r"负债(合计|总计)",
                r"所有者权益",
            ]),
            income_statement: patterns(&[
                r"利润表",
                r"损益表",
                r"income\s*statement",
                r"profit.*loss",
                r"营业收入",
                r"营业利润",
                r"净利润",
            ]),
            cash_flow: patterns(&[
                r"现金流量表",
                r"cash\s*flows?",
                r"经营活动",
                r"投资活动",
                r"筹资活动",
            ]),
            trial_balance: patterns(&[
                r"科目余额表",
                r"余额表",
                r"试算平衡",
                r"trial\s*balance",
                r"科目(代码|编码|名称)",
                r"账.*(余额|发生额)",
                r"本期发生额",
                r"期初余额.*借方",
            ]),

            header: patterns(&[
                r"项目",
                r"科目",
                r"名称",
                r"代码",
                r"编码",
                r"编号",
                r"金额",
                r"余额",
                r"借方",
                r"贷方",
                r"期初",
                r"期末",
                r"本期",
                r"上期",
                r"年初",
                r"年末",
                r"本年",
                r"上年",
                r"累计",
                r"行次",
                r"发生额",
                r"摘要",
                r"\b(items?|accounts?|name|code|amount|balance|debit|credit)\b",
                r"\b(opening|closing|beginning|ending|current|previous|prior|period|description|notes?|year)\b",
            ]),
            meta: patterns(&[
                r"单位",
                r"编制",
                r"制表",
                r"日期",
                r"币种",
                r"\d{4}\s*年",
                r"\d+\s*月\s*\d*\s*日?",
                r"公司",
                r"审核",
                r"负责人",
                r"表\s*$",
                r"\b(unit|currency|date|company|prepared\s+by|reviewed\s+by)\b",
                r"\b(ltd|inc|llc|plc)\b",
                r"\bin\s+(thousands|millions)\b",
                r"\b(as\s+(at|of)|period\s+ended|year\s+ended)\b",
                r"(statement|report)\s*$",
            ]),
            numbered_row: patterns(&[
                r"^\s*\d+\s*[.、．]",
                r"^\s*[一二三四五六七八九十]+\s*、",
                r"^\s*[（(]\s*[一二三四五六七八九十\d]+\s*[)）]",
            ]),
            total_row: patterns(&[r"合计", r"总计", r"小计", r"\b(sub)?total\b"]),

            name_header: patterns(&[
                r"名称",
                r"项目",
                r"科目",
                r"摘要",
                r"\b(name|items?|accounts?|description|particulars)\b",
            ]),
            code_header: patterns(&[
                r"代码",
                r"编码",
                r"编号",
                r"科目号",
                r"\bcode\b",
                r"\baccount\s+(no\.?|number)",
                r"^\s*no\.?\s*$",
            ]),
            line_number: patterns(&[r"行次", r"栏次", r"^\s*line(\s+no\.?)?\s*$"]),
            account_code: r"^\d{3,12}(\.\d+)*$".to_string(),
            excluded_account_names: patterns(&[
                r"^(日期|期间|单位)\s*[:：]",
                r"^(科目代码|科目名称|期初|期末|借方|贷方|合计|小计|年初|本期|余额|发生额)$",
                r"^\d+$",
                r"^[\d.,\s\-()]+$",
            ]),

            debit: patterns(&[r"借方", r"\bdebit\b", r"\bdr\.?(\s|$)"]),
            credit: patterns(&[r"贷方", r"\bcredit\b", r"\bcr\.?(\s|$)"]),
            year_opening: patterns(&[
                r"年初",
                r"\bbeginning\b",
                r"start\s+of\s+(the\s+)?year",
            ]),
            opening: patterns(&[r"期初", r"\bopening\b", r"开始", r"起始"]),
            current: patterns(&[
                r"本期",
                r"本年",
                r"本月",
                r"发生",
                r"\bcurrent\b",
                r"\bmovements?\b",
                r"this\s+(year|period|month)",
            ]),
            previous: patterns(&[
                r"上期",
                r"上年",
                r"去年",
                r"上月",
                r"\b(previous|prior)\b",
                r"last\s+(year|period|month)",
            ]),
            ending: patterns(&[r"期末", r"年末", r"\bending\b", r"\bclosing\b"]),
            amount: patterns(&[r"金额", r"数额", r"发生额", r"\bamount\b", r"\bvalue\b"]),
            balance: patterns(&[r"余额", r"\bbalance\b"]),
            total: patterns(&[r"合计", r"总计", r"\btotal\b", r"\bsum\b"]),
            subtotal: patterns(&[r"小计", r"\bsubtotal\b"]),

            numbering_tokens: patterns(&[
                r"^(\d+)\.\s*",
                r"^(\d+)\s+",
                r"^(\d+)、\s*",
                r"^[(（](\d+)[)）]\s*",
            ]),
            top_level: patterns(&[
                r"^\d+\.(\D|$)",
                r"^[一二三四五六七八九十]+、",
                r"^[（(][一二三四五六七八九十]+[)）]",
            ]),
            subordinate: patterns(&[
                r"其中",
                r"^(减|加|包括|含)\s*[:：]",
                r"^(including|less|plus|add|of\s+which)\b\s*:?",
            ]),
            target_skip: patterns(&[r"^(项目|金额|单位|期间)", r"^(items?|amount|unit|period)\b"]),
        }
    }
}

/// One canonical data-column key with the header spellings that map to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeyRule {
    pub key: String,
    pub display: String,
    #[schemars(description = "Header spellings; compared after removing whitespace and punctuation")]
    pub aliases: Vec<String>,
}

impl KeyRule {
    fn new(key: &str, display: &str, aliases: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            display: display.to_string(),
            aliases: patterns(aliases),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct KeyDictionaries {
    pub balance_sheet: Vec<KeyRule>,
    pub income_statement: Vec<KeyRule>,
    pub cash_flow: Vec<KeyRule>,
    pub trial_balance: Vec<KeyRule>,
}

impl KeyDictionaries {
    /// Rules for one statement type. Unknown tables consult every dictionary,
    /// trial balance last.
    pub fn rules_for(&self, table_type: TableType) -> Vec<&KeyRule> {
        match table_type {
            TableType::BalanceSheet => self.balance_sheet.iter().collect(),
            TableType::IncomeStatement => self.income_statement.iter().collect(),
            TableType::CashFlow => self.cash_flow.iter().collect(),
            TableType::TrialBalance => self.trial_balance.iter().collect(),
            TableType::Unknown => self
                .balance_sheet
                .iter()
                .chain(&self.income_statement)
                .chain(&self.cash_flow)
                .chain(&self.trial_balance)
                .collect(),
        }
    }
}

impl Default for KeyDictionaries {
    fn default() -> Self {
        Self {
            balance_sheet: vec![
                KeyRule::new(
                    "ending_balance",
                    "期末余额",
                    &["期末余额", "期末数", "期末金额", "年末余额", "年末数", "closing balance", "ending balance"],
                ),
                KeyRule::new(
                    "year_opening_balance",
                    "年初余额",
                    &["年初余额", "年初数", "年初金额", "上年年末余额", "beginning balance", "opening balance"],
                ),
            ],
            income_statement: vec![
                KeyRule::new("current_amount", "本期金额", &["本期金额", "本期数", "本月数", "本月金额", "current period"]),
                KeyRule::new("previous_amount", "上期金额", &["上期金额", "上期数", "上年同期", "prior period", "previous period"]),
                KeyRule::new("current_ytd", "本年累计", &["本年累计", "本年累计数", "本年累计金额", "year to date"]),
                KeyRule::new("previous_ytd", "上年累计", &["上年累计", "上年累计数", "上年同期累计", "prior year to date"]),
            ],
            cash_flow: vec![
                KeyRule::new("current_amount", "本期金额", &["本期金额", "本期数", "本年金额", "current period"]),
                KeyRule::new("previous_amount", "上期金额", &["上期金额", "上期数", "上年金额", "prior period"]),
            ],
            trial_balance: vec![
                KeyRule::new("year_opening_debit", "年初借方", &["年初余额借方", "年初借方", "beginning balance debit"]),
                KeyRule::new("year_opening_credit", "年初贷方", &["年初余额贷方", "年初贷方", "beginning balance credit"]),
                KeyRule::new("year_opening_total", "年初合计", &["年初余额合计", "年初合计"]),
                KeyRule::new("opening_debit", "期初借方", &["期初余额借方", "期初借方", "opening balance debit"]),
                KeyRule::new("opening_credit", "期初贷方", &["期初余额贷方", "期初贷方", "opening balance credit"]),
                KeyRule::new("opening_total", "期初合计", &["期初余额合计", "期初合计"]),
                KeyRule::new("movement_debit", "本期借方", &["本期发生额借方", "本期借方", "period movement debit"]),
                KeyRule::new("movement_credit", "本期贷方", &["本期发生额贷方", "本期贷方", "period movement credit"]),
                KeyRule::new("movement_total", "本期合计", &["本期发生额合计", "本期合计"]),
                KeyRule::new("ending_debit", "期末借方", &["期末余额借方", "期末借方", "closing balance debit", "ending balance debit"]),
                KeyRule::new("ending_credit", "期末贷方", &["期末余额贷方", "期末贷方", "closing balance credit", "ending balance credit"]),
                KeyRule::new("ending_total", "期末合计", &["期末余额合计", "期末合计"]),
            ],
        }
    }
}
