//! Column keys: the fallback chain that gives every column a stable,
//! non-empty `normalized_key`, and the registry that keeps keys and display
//! names unique within a sheet.

use crate::classifier::ColumnClassifier;
use crate::config::{KeyDictionaries, KeyRule};
use crate::grid::column_letter;
use crate::schema::{DataType, Direction, Period, TableType};
use crate::utils::{join_non_empty, sanitize_key};
use std::collections::BTreeSet;

/// Which link of the chain produced a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Dictionary,
    Structural,
    HeaderText,
    Positional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnKey {
    pub key: String,
    pub display: String,
    pub source: KeySource,
}

/// A key a statement type expects, with the header structure that implies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalKey {
    pub key: &'static str,
    pub display: &'static str,
    pub periods: &'static [Period],
    /// `None` accepts any direction.
    pub direction: Option<Direction>,
}

const fn canonical(
    key: &'static str,
    display: &'static str,
    periods: &'static [Period],
    direction: Option<Direction>,
) -> CanonicalKey {
    CanonicalKey {
        key,
        display,
        periods,
        direction,
    }
}

const TRIAL_BALANCE_KEYS: &[CanonicalKey] = &[
    canonical("year_opening_debit", "年初借方", &[Period::Beginning], Some(Direction::Debit)),
    canonical("year_opening_credit", "年初贷方", &[Period::Beginning], Some(Direction::Credit)),
    canonical("year_opening_total", "年初合计", &[Period::Beginning], Some(Direction::Total)),
    canonical("opening_debit", "期初借方", &[Period::Opening], Some(Direction::Debit)),
    canonical("opening_credit", "期初贷方", &[Period::Opening], Some(Direction::Credit)),
    canonical("opening_total", "期初合计", &[Period::Opening], Some(Direction::Total)),
    canonical("movement_debit", "本期借方", &[Period::Current], Some(Direction::Debit)),
    canonical("movement_credit", "本期贷方", &[Period::Current], Some(Direction::Credit)),
    canonical("movement_total", "本期合计", &[Period::Current], Some(Direction::Total)),
    canonical("ending_debit", "期末借方", &[Period::Ending], Some(Direction::Debit)),
    canonical("ending_credit", "期末贷方", &[Period::Ending], Some(Direction::Credit)),
    canonical("ending_total", "期末合计", &[Period::Ending], Some(Direction::Total)),
];

const BALANCE_SHEET_KEYS: &[CanonicalKey] = &[
    canonical("ending_balance", "期末余额", &[Period::Ending], None),
    canonical(
        "year_opening_balance",
        "年初余额",
        &[Period::Beginning, Period::Opening],
        None,
    ),
];

const PERIOD_STATEMENT_KEYS: &[CanonicalKey] = &[
    canonical("current_amount", "本期金额", &[Period::Current], None),
    canonical("previous_amount", "上期金额", &[Period::Previous], None),
];

/// Canonical keys a statement type's columns are expected to carry.
pub fn canonical_keys(table_type: TableType) -> &'static [CanonicalKey] {
    match table_type {
        TableType::TrialBalance => TRIAL_BALANCE_KEYS,
        TableType::BalanceSheet => BALANCE_SHEET_KEYS,
        TableType::IncomeStatement | TableType::CashFlow => PERIOD_STATEMENT_KEYS,
        TableType::Unknown => &[],
    }
}

/// Header text with case, whitespace and punctuation removed, for alias
/// comparison.
pub fn compact(text: &str) -> String {
    sanitize_key(text).replace('_', "")
}

pub struct KeyResolver<'a> {
    dictionaries: &'a KeyDictionaries,
    classifier: &'a ColumnClassifier<'a>,
}

impl<'a> KeyResolver<'a> {
    pub fn new(dictionaries: &'a KeyDictionaries, classifier: &'a ColumnClassifier<'a>) -> Self {
        Self {
            dictionaries,
            classifier,
        }
    }

    /// Runs the chain: dictionary, structural match, header text, position.
    pub fn resolve(
        &self,
        table_type: TableType,
        index: usize,
        primary: &str,
        secondary: &str,
        data_type: DataType,
    ) -> ColumnKey {
        self.from_dictionary(table_type, primary, secondary)
            .or_else(|| self.from_structure(table_type, primary, secondary, data_type))
            .or_else(|| from_header_text(primary, secondary))
            .unwrap_or_else(|| positional(index))
    }

    fn from_dictionary(&self, table_type: TableType, primary: &str, secondary: &str) -> Option<ColumnKey> {
        let header = compact(&join_non_empty(&[primary, secondary], " "));
        if header.is_empty() {
            return None;
        }

        let rules = self.dictionaries.rules_for(table_type);
        let as_key = |rule: &KeyRule| ColumnKey {
            key: rule.key.clone(),
            display: rule.display.clone(),
            source: KeySource::Dictionary,
        };

        let exact = rules
            .iter()
            .find(|rule| rule.aliases.iter().any(|alias| compact(alias) == header));
        if let Some(rule) = exact {
            return Some(as_key(rule));
        }

        // Longest contained alias wins; the earlier rule wins a tie.
        let mut best: Option<(&KeyRule, usize)> = None;
        for rule in &rules {
            for alias in &rule.aliases {
                let alias = compact(alias);
                if alias.is_empty() || !header.contains(&alias) {
                    continue;
                }
                let length = alias.chars().count();
                if best.map_or(true, |(_, best_length)| length > best_length) {
                    best = Some((rule, length));
                }
            }
        }
        best.map(|(rule, _)| as_key(rule))
    }

    fn from_structure(
        &self,
        table_type: TableType,
        primary: &str,
        secondary: &str,
        data_type: DataType,
    ) -> Option<ColumnKey> {
        let period = self
            .classifier
            .period(primary)
            .or_else(|| self.classifier.period(secondary))?;
        let direction = self.classifier.resolve_pair(primary, secondary, data_type).map(|(_, d)| d);

        canonical_keys(table_type)
            .iter()
            .find(|candidate| {
                candidate.periods.contains(&period)
                    && candidate.direction.map_or(true, |wanted| direction == Some(wanted))
            })
            .map(|candidate| ColumnKey {
                key: candidate.key.to_string(),
                display: candidate.display.to_string(),
                source: KeySource::Structural,
            })
    }
}

fn from_header_text(primary: &str, secondary: &str) -> Option<ColumnKey> {
    let key = sanitize_key(&join_non_empty(&[primary, secondary], " "));
    if key.is_empty() {
        return None;
    }
    Some(ColumnKey {
        key,
        display: join_non_empty(&[primary, secondary], "-"),
        source: KeySource::HeaderText,
    })
}

/// `col_E` for column 5.
pub fn positional(index: usize) -> ColumnKey {
    let letter = column_letter(index);
    ColumnKey {
        key: format!("col_{}", letter),
        display: format!("Column {}", letter),
        source: KeySource::Positional,
    }
}

/// Hands out sheet-unique keys (`_2`, `_3` suffixes) and display names
/// (` (2)`, ` (3)` suffixes) in registration order.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    keys: BTreeSet<String>,
    displays: BTreeSet<String>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, candidate: ColumnKey) -> ColumnKey {
        let key = unique(&mut self.keys, &candidate.key, |base, n| format!("{}_{}", base, n));
        let display = unique(&mut self.displays, &candidate.display, |base, n| {
            format!("{} ({})", base, n)
        });
        ColumnKey {
            key,
            display,
            source: candidate.source,
        }
    }
}

fn unique(taken: &mut BTreeSet<String>, base: &str, suffixed: impl Fn(&str, usize) -> String) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = suffixed(base, n);
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::vocabulary::Vocabulary;

    fn resolve(table_type: TableType, index: usize, primary: &str, secondary: &str) -> ColumnKey {
        let config = ExtractionConfig::default();
        let vocabulary = Vocabulary::compile(&config.keywords).unwrap();
        let classifier = ColumnClassifier::new(&vocabulary);
        let resolver = KeyResolver::new(&config.key_dictionaries, &classifier);
        let data_type = classifier.classify(primary, secondary).data_type;
        resolver.resolve(table_type, index, primary, secondary, data_type)
    }

    #[test]
    fn test_dictionary_exact_and_partial() {
        let exact = resolve(TableType::TrialBalance, 3, "期初余额", "借方");
        assert_eq!(exact.key, "opening_debit");
        assert_eq!(exact.source, KeySource::Dictionary);

        let partial = resolve(TableType::BalanceSheet, 3, "期末余额（元）", "");
        assert_eq!(partial.key, "ending_balance");
        assert_eq!(partial.display, "期末余额");

        let english = resolve(TableType::Unknown, 3, "Beginning Balance", "Debit");
        assert_eq!(english.key, "year_opening_debit");
    }

    #[test]
    fn test_structural_match() {
        let key = resolve(TableType::TrialBalance, 7, "期末", "Dr");
        assert_eq!(key.key, "ending_debit");
        assert_eq!(key.source, KeySource::Structural);

        let income = resolve(TableType::IncomeStatement, 4, "本月实际", "");
        assert_eq!(income.key, "current_amount");
    }

    #[test]
    fn test_header_text_and_positional_fallbacks() {
        let text = resolve(TableType::Unknown, 6, "Notes", "Ref");
        assert_eq!(text.key, "notes_ref");
        assert_eq!(text.display, "Notes-Ref");
        assert_eq!(text.source, KeySource::HeaderText);

        let blank = resolve(TableType::TrialBalance, 5, "", "");
        assert_eq!(blank.key, "col_E");
        assert_eq!(blank.display, "Column E");
        assert_eq!(resolve(TableType::TrialBalance, 5, "", ""), blank);
    }

    #[test]
    fn test_registry_suffixes_duplicates() {
        let mut registry = KeyRegistry::new();
        let first = registry.register(resolve(TableType::BalanceSheet, 3, "期末余额", ""));
        let second = registry.register(resolve(TableType::BalanceSheet, 4, "期末数", ""));
        let third = registry.register(resolve(TableType::BalanceSheet, 5, "期末金额", ""));
        assert_eq!(first.key, "ending_balance");
        assert_eq!(second.key, "ending_balance_2");
        assert_eq!(third.key, "ending_balance_3");
        assert_eq!(second.display, "期末余额 (2)");
    }

    #[test]
    fn test_canonical_keys_per_statement() {
        assert_eq!(canonical_keys(TableType::TrialBalance).len(), 12);
        assert_eq!(canonical_keys(TableType::CashFlow)[0].key, "current_amount");
        assert!(canonical_keys(TableType::Unknown).is_empty());
    }
}
