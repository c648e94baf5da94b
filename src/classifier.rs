use crate::schema::{Aggregate, ColumnInfo, DataType, Direction, Period};
use crate::utils::join_non_empty;
use crate::vocabulary::Vocabulary;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic reading of one column's header text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Classification {
    pub data_type: DataType,
    pub period: Option<Period>,
    pub direction: Option<Direction>,
    pub aggregate: Option<Aggregate>,
}

impl Classification {
    /// The header names a period, a direction or an amount/balance/total.
    pub fn has_financial_keyword(&self) -> bool {
        self.period.is_some() || self.direction.is_some() || self.aggregate.is_some()
    }
}

/// (period, direction) → column index for trial-balance-shaped tables.
pub type StructureMap = BTreeMap<(Period, Direction), usize>;

pub struct ColumnClassifier<'a> {
    vocabulary: &'a Vocabulary,
}

impl<'a> ColumnClassifier<'a> {
    pub fn new(vocabulary: &'a Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn classify(&self, primary: &str, secondary: &str) -> Classification {
        let text = join_non_empty(&[primary, secondary], " ");
        if text.is_empty() {
            return Classification::default();
        }

        Classification {
            data_type: self.data_type(&text),
            period: self.period(&text),
            direction: self.direction(&text),
            aggregate: self.aggregate(&text),
        }
    }

    /// Ordered keyword groups; the first hit decides. Non-empty text that
    /// matches nothing is an amount.
    pub fn data_type(&self, text: &str) -> DataType {
        let v = self.vocabulary;
        if v.debit.is_match(text) {
            DataType::Debit
        } else if v.credit.is_match(text) {
            DataType::Credit
        } else if v.year_opening.is_match(text) || v.opening.is_match(text) {
            DataType::Beginning
        } else if v.ending.is_match(text) {
            DataType::Ending
        } else if v.current.is_match(text) {
            DataType::Current
        } else if v.previous.is_match(text) {
            DataType::Previous
        } else if v.amount.is_match(text) {
            DataType::Amount
        } else if v.balance.is_match(text) {
            DataType::Balance
        } else if text.trim().is_empty() {
            DataType::Unknown
        } else {
            DataType::Amount
        }
    }

    pub fn period(&self, text: &str) -> Option<Period> {
        let v = self.vocabulary;
        if v.year_opening.is_match(text) {
            Some(Period::Beginning)
        } else if v.opening.is_match(text) {
            Some(Period::Opening)
        } else if v.ending.is_match(text) {
            Some(Period::Ending)
        } else if v.previous.is_match(text) {
            Some(Period::Previous)
        } else if v.current.is_match(text) {
            Some(Period::Current)
        } else {
            None
        }
    }

    pub fn direction(&self, text: &str) -> Option<Direction> {
        let v = self.vocabulary;
        if v.debit.is_match(text) {
            Some(Direction::Debit)
        } else if v.credit.is_match(text) {
            Some(Direction::Credit)
        } else if v.total.is_match(text) {
            Some(Direction::Total)
        } else {
            None
        }
    }

    pub fn aggregate(&self, text: &str) -> Option<Aggregate> {
        let v = self.vocabulary;
        if v.subtotal.is_match(text) {
            Some(Aggregate::Subtotal)
        } else if v.total.is_match(text) {
            Some(Aggregate::Total)
        } else if v.balance.is_match(text) {
            Some(Aggregate::Balance)
        } else if v.amount.is_match(text) {
            Some(Aggregate::Amount)
        } else {
            None
        }
    }

    /// Resolves every data column to a (period, direction) pair. Columns that
    /// resolve to no pair are left out; the first column wins a duplicate pair.
    pub fn build_structure(&self, columns: &[ColumnInfo]) -> StructureMap {
        let mut structure = StructureMap::new();

        for column in columns.iter().filter(|column| column.is_data_column) {
            if let Some(pair) = self.structure_pair(column) {
                structure.entry(pair).or_insert(column.index);
            }
        }

        structure
    }

    pub fn structure_pair(&self, column: &ColumnInfo) -> Option<(Period, Direction)> {
        self.resolve_pair(&column.primary_header, &column.secondary_header, column.data_type)
    }

    /// Period from the primary header, direction from the secondary header
    /// (or from the resolved data type when there is no secondary header).
    pub fn resolve_pair(
        &self,
        primary: &str,
        secondary: &str,
        data_type: DataType,
    ) -> Option<(Period, Direction)> {
        let period = self.period(primary).or_else(|| self.period(secondary))?;

        let direction = if secondary.is_empty() {
            match data_type {
                DataType::Debit => Some(Direction::Debit),
                DataType::Credit => Some(Direction::Credit),
                _ => self
                    .direction(primary)
                    .or_else(|| self.bare_balance(primary)),
            }
        } else {
            self.direction(secondary)
                .or_else(|| self.bare_balance(secondary))
        }?;

        Some((period, direction))
    }

    /// A balance label with no debit/credit marker reads as the net total.
    fn bare_balance(&self, text: &str) -> Option<Direction> {
        let v = self.vocabulary;
        (v.balance.is_match(text) && !v.debit.is_match(text) && !v.credit.is_match(text))
            .then_some(Direction::Total)
    }
}
