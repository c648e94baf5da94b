//! Compiled form of [`KeywordTables`]. Built once, then borrowed by every
//! inference component.

use crate::config::KeywordTables;
use crate::error::{LayoutError, Result};
use crate::schema::TableType;
use regex::{Regex, RegexBuilder};

/// A named, ordered group of case-insensitive patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    group: String,
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn compile(group: &str, sources: &[String]) -> Result<Self> {
        let patterns = sources
            .iter()
            .map(|source| compile_pattern(group, source))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            group: group.to_string(),
            patterns,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }

    /// First pattern (in table order) that matches, with the text of its first
    /// capture group or the whole match.
    pub fn first_capture<'t>(&self, text: &'t str) -> Option<(&'t str, &'t str)> {
        self.patterns.iter().find_map(|pattern| {
            let captures = pattern.captures(text)?;
            let whole = captures.get(0)?;
            let token = captures.get(1).unwrap_or(whole);
            Some((whole.as_str(), token.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile_pattern(group: &str, source: &str) -> Result<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|source_error| LayoutError::InvalidPattern {
            group: group.to_string(),
            pattern: source.to_string(),
            source: source_error,
        })
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub balance_sheet: PatternSet,
    pub income_statement: PatternSet,
    pub cash_flow: PatternSet,
    pub trial_balance: PatternSet,

    pub header: PatternSet,
    pub meta: PatternSet,
    pub numbered_row: PatternSet,
    pub total_row: PatternSet,

    pub name_header: PatternSet,
    pub code_header: PatternSet,
    pub line_number: PatternSet,
    pub account_code: Regex,
    pub excluded_account_names: PatternSet,

    pub debit: PatternSet,
    pub credit: PatternSet,
    pub year_opening: PatternSet,
    pub opening: PatternSet,
    pub current: PatternSet,
    pub previous: PatternSet,
    pub ending: PatternSet,
    pub amount: PatternSet,
    pub balance: PatternSet,
    pub total: PatternSet,
    pub subtotal: PatternSet,

    pub numbering_tokens: PatternSet,
    pub top_level: PatternSet,
    pub subordinate: PatternSet,
    pub target_skip: PatternSet,

    code_sample: Regex,
    leading_code: Regex,
    pure_number: Regex,
}

impl Vocabulary {
    pub fn compile(tables: &KeywordTables) -> Result<Self> {
        Ok(Self {
            balance_sheet: PatternSet::compile("balance_sheet", &tables.balance_sheet)?,
            income_statement: PatternSet::compile("income_statement", &tables.income_statement)?,
            cash_flow: PatternSet::compile("cash_flow", &tables.cash_flow)?,
            trial_balance: PatternSet::compile("trial_balance", &tables.trial_balance)?,

            header: PatternSet::compile("header", &tables.header)?,
            meta: PatternSet::compile("meta", &tables.meta)?,
            numbered_row: PatternSet::compile("numbered_row", &tables.numbered_row)?,
            total_row: PatternSet::compile("total_row", &tables.total_row)?,

            name_header: PatternSet::compile("name_header", &tables.name_header)?,
            code_header: PatternSet::compile("code_header", &tables.code_header)?,
            line_number: PatternSet::compile("line_number", &tables.line_number)?,
            account_code: compile_pattern("account_code", &tables.account_code)?,
            excluded_account_names: PatternSet::compile(
                "excluded_account_names",
                &tables.excluded_account_names,
            )?,

            debit: PatternSet::compile("debit", &tables.debit)?,
            credit: PatternSet::compile("credit", &tables.credit)?,
            year_opening: PatternSet::compile("year_opening", &tables.year_opening)?,
            opening: PatternSet::compile("opening", &tables.opening)?,
            current: PatternSet::compile("current", &tables.current)?,
            previous: PatternSet::compile("previous", &tables.previous)?,
            ending: PatternSet::compile("ending", &tables.ending)?,
            amount: PatternSet::compile("amount", &tables.amount)?,
            balance: PatternSet::compile("balance", &tables.balance)?,
            total: PatternSet::compile("total", &tables.total)?,
            subtotal: PatternSet::compile("subtotal", &tables.subtotal)?,

            numbering_tokens: PatternSet::compile("numbering_tokens", &tables.numbering_tokens)?,
            top_level: PatternSet::compile("top_level", &tables.top_level)?,
            subordinate: PatternSet::compile("subordinate", &tables.subordinate)?,
            target_skip: PatternSet::compile("target_skip", &tables.target_skip)?,

            code_sample: compile_pattern("code_sample", r"^\d{4,8}")?,
            leading_code: compile_pattern("leading_code", r"^(\d{3,12}(?:\.\d+)*)(?:\s+|[-_、.．:：]\s*|$)")?,
            pure_number: compile_pattern("pure_number", r"^\d+\.?\d*$")?,
        })
    }

    /// The built-in keyword tables.
    pub fn standard() -> Result<Self> {
        Self::compile(&KeywordTables::default())
    }

    /// First statement vocabulary matching `text`, checked in the order
    /// balance sheet, income statement, cash flow, trial balance.
    pub fn table_type(&self, text: &str) -> Option<TableType> {
        [
            (&self.balance_sheet, TableType::BalanceSheet),
            (&self.income_statement, TableType::IncomeStatement),
            (&self.cash_flow, TableType::CashFlow),
            (&self.trial_balance, TableType::TrialBalance),
        ]
        .into_iter()
        .find(|(set, _)| set.is_match(text))
        .map(|(_, table_type)| table_type)
    }

    pub fn is_account_code(&self, text: &str) -> bool {
        self.account_code.is_match(text.trim())
    }

    /// Sample value that reads like an account code (a 4-8 digit run).
    pub fn looks_like_code(&self, text: &str) -> bool {
        self.code_sample.is_match(text.trim())
    }

    /// Account code written at the start of a name cell, e.g. `1002 银行存款`.
    pub fn leading_code<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.leading_code
            .captures(text.trim())
            .and_then(|captures| captures.get(1))
            .map(|code| code.as_str())
    }

    pub fn is_pure_number(&self, text: &str) -> bool {
        self.pure_number.is_match(text.trim())
    }
}
