use crate::config::ExtractionConfig;
use crate::error::{LayoutError, Result};
use crate::grid::{cell_address, Grid, Workbook};
use crate::hierarchy::HierarchyBuilder;
use crate::inference::SchemaInferenceEngine;
use crate::schema::{Extraction, SourceItem, TableSchema, TableType, TargetItem, TargetSheet};
use crate::utils::is_filler_text;
use crate::vocabulary::Vocabulary;
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// How rows of a source sheet become [`SourceItem`]s. Chosen once per sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStrategy {
    /// Account-coded rows; hierarchy comes from the code.
    TrialBalance,
    /// Named rows with no account-code hierarchy.
    General,
}

impl SourceStrategy {
    pub fn for_table(table_type: TableType) -> Self {
        match table_type {
            TableType::TrialBalance => SourceStrategy::TrialBalance,
            _ => SourceStrategy::General,
        }
    }
}

/// Hierarchy level of an account code: dot segments when dotted, otherwise
/// digit-length bands (≥12 → 4, ≥9 → 3, ≥6 → 2, ≥3 → 1).
pub fn code_level(code: &str) -> usize {
    if code.contains('.') {
        return code.split('.').filter(|segment| !segment.is_empty()).count();
    }
    match code.chars().filter(char::is_ascii_digit).count() {
        n if n >= 12 => 4,
        n if n >= 9 => 3,
        n if n >= 6 => 2,
        n if n >= 3 => 1,
        _ => 0,
    }
}

/// Code of the parent account: the code minus its last dot segment, or minus
/// its last two digits but never shorter than four.
pub fn parent_code(code: &str) -> Option<String> {
    if let Some((parent, _)) = code.rsplit_once('.') {
        return (!parent.is_empty()).then(|| parent.to_string());
    }
    let length = code.len();
    if length > 4 && code.is_ascii() {
        let cut = length.saturating_sub(2).max(4);
        return Some(code[..cut].to_string());
    }
    None
}

pub struct ExtractionOrchestrator<'a> {
    vocabulary: &'a Vocabulary,
    engine: SchemaInferenceEngine<'a>,
    hierarchy: HierarchyBuilder<'a>,
}

impl<'a> ExtractionOrchestrator<'a> {
    pub fn new(config: &'a ExtractionConfig, vocabulary: &'a Vocabulary) -> Self {
        Self {
            vocabulary,
            engine: SchemaInferenceEngine::new(config, vocabulary),
            hierarchy: HierarchyBuilder::new(vocabulary),
        }
    }

    pub fn engine(&self) -> &SchemaInferenceEngine<'a> {
        &self.engine
    }

    /// Extracts every listed sheet. Sheets are processed in the order given;
    /// a sheet the workbook cannot supply fails the whole run.
    pub fn extract<S: AsRef<str>>(
        &self,
        workbook: &dyn Workbook,
        target_sheets: &[TargetSheet],
        source_sheets: &[S],
    ) -> Result<Extraction> {
        let mut extraction = Extraction::default();

        for target in target_sheets {
            if target.target_column == Some(0) {
                return Err(LayoutError::InvalidTargetColumn {
                    sheet: target.name.clone(),
                    column: 0,
                });
            }
            let grid = workbook
                .sheet(&target.name)
                .ok_or_else(|| LayoutError::MissingSheet(target.name.clone()))?;
            let schema = self.schema_for(&mut extraction.schemas, &target.name, grid);
            let items = self.extract_targets(target, grid, &schema)?;
            extraction.target_items.extend(items);
        }

        for name in source_sheets {
            let name = name.as_ref();
            let grid = workbook
                .sheet(name)
                .ok_or_else(|| LayoutError::MissingSheet(name.to_string()))?;
            let schema = self.schema_for(&mut extraction.schemas, name, grid);
            extraction.source_items.extend(self.extract_sources(name, grid, &schema));
        }

        info!(
            "Extracted {} target item(s) and {} source item(s) from {} sheet(s)",
            extraction.target_items.len(),
            extraction.source_items.len(),
            extraction.schemas.len()
        );
        Ok(extraction)
    }

    fn schema_for(
        &self,
        schemas: &mut BTreeMap<String, TableSchema>,
        name: &str,
        grid: &dyn Grid,
    ) -> TableSchema {
        schemas
            .entry(name.to_string())
            .or_insert_with(|| self.engine.infer(name, grid))
            .clone()
    }

    /// Line items of a target sheet, in row order, with levels, numbers and
    /// parent links filled in.
    pub fn extract_targets(
        &self,
        target: &TargetSheet,
        grid: &dyn Grid,
        schema: &TableSchema,
    ) -> Result<Vec<TargetItem>> {
        let sheet = target.name.as_str();
        let name_columns = if schema.name_columns.is_empty() {
            warn!("Sheet '{}' has no recognized name column; reading column A", sheet);
            vec![1]
        } else {
            schema.name_columns.clone()
        };

        let mut records: Vec<(usize, String)> = Vec::new();
        for row in schema.data_start_row..=grid.max_row() {
            let text = match name_columns
                .iter()
                .filter_map(|&col| grid.raw_text(row, col))
                .find(|text| !is_filler_text(text))
            {
                Some(text) => text,
                None => continue,
            };
            if self.skip_target_text(row, schema, text.trim()) {
                debug!("Sheet '{}' row {}: '{}' is not a line item", sheet, row, text.trim());
                continue;
            }
            records.push((row, text));
        }

        let nodes = self.hierarchy.build(&records);
        self.hierarchy.verify(sheet, &nodes)?;

        let target_column = target
            .target_column
            .or_else(|| schema.data_columns().next().map(|column| column.index))
            .or_else(|| schema.columns.first().map(|column| column.index))
            .unwrap_or(1);

        let ids: Vec<String> = nodes.iter().map(|node| format!("{}_{}", sheet, node.row)).collect();
        let items: Vec<TargetItem> = nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| TargetItem {
                id: ids[index].clone(),
                sheet_name: sheet.to_string(),
                row: node.row,
                name: node.name,
                original_text: node.original_text,
                level: node.raw_level,
                hierarchical_level: node.level,
                level_adjusted: node.level_adjusted,
                display_index: node.display_index,
                hierarchical_number: node.hierarchical_number,
                parent_id: node.parent.map(|parent| ids[parent].clone()),
                children_ids: node.children.iter().map(|&child| ids[child].clone()).collect(),
                parent_index: node.parent,
                child_indices: node.children,
                target_cell_address: cell_address(node.row, target_column),
                columns: schema
                    .columns
                    .iter()
                    .map(|column| (column.normalized_key.clone(), cell_address(node.row, column.index)))
                    .collect(),
            })
            .collect();

        info!(
            "Target sheet '{}': {} line item(s), values go to column {}",
            sheet,
            items.len(),
            crate::grid::column_letter(target_column)
        );
        Ok(items)
    }

    fn skip_target_text(&self, row: usize, schema: &TableSchema, text: &str) -> bool {
        if text.chars().count() < 2 {
            return true;
        }
        if row <= schema.data_start_row && self.vocabulary.target_skip.is_match(text) {
            return true;
        }
        // Signature lines such as "单位负责人：" at the foot of a statement.
        (text.contains(':') || text.contains('：'))
            && self.vocabulary.meta.is_match(text)
            && !self.vocabulary.subordinate.is_match(text)
    }

    /// Candidate records of a source sheet, using the strategy its table type
    /// selects.
    pub fn extract_sources(&self, sheet: &str, grid: &dyn Grid, schema: &TableSchema) -> Vec<SourceItem> {
        if schema.is_empty() {
            warn!("Source sheet '{}' has no recognizable layout", sheet);
            return Vec::new();
        }

        let strategy = SourceStrategy::for_table(schema.table_type);
        let items: Vec<SourceItem> = (schema.data_start_row..=grid.max_row())
            .filter_map(|row| match strategy {
                SourceStrategy::TrialBalance => self.trial_balance_row(sheet, grid, schema, row),
                SourceStrategy::General => self.general_row(sheet, grid, schema, row),
            })
            .collect();

        info!(
            "Source sheet '{}': {} record(s) using the {:?} strategy",
            sheet,
            items.len(),
            strategy
        );
        items
    }

    fn trial_balance_row(&self, sheet: &str, grid: &dyn Grid, schema: &TableSchema, row: usize) -> Option<SourceItem> {
        let name_text = self.first_name(grid, schema, row);

        let code = schema
            .code_columns
            .iter()
            .filter_map(|&col| grid.text(row, col))
            .find(|text| self.vocabulary.is_account_code(text))
            .or_else(|| {
                name_text
                    .as_deref()
                    .and_then(|text| self.vocabulary.leading_code(text))
                    .map(str::to_string)
            });

        let name = name_text
            .as_deref()
            .map(|text| strip_code(text, code.as_deref()))
            .filter(|text| self.is_account_name(text));

        let (values, primary_value) = read_values(grid, schema, row);
        let name = match (name, &code) {
            (Some(name), _) => name,
            (None, Some(code)) => format!("Account {}", code),
            (None, None) => return None,
        };
        if code.is_none() && primary_value.is_none() {
            return None;
        }

        let id = match &code {
            Some(code) => format!("{}_{}_{}", sheet, code, row),
            None => format!("{}_{}", sheet, row),
        };

        Some(SourceItem {
            id,
            sheet_name: sheet.to_string(),
            row,
            name,
            hierarchy_level: code.as_deref().map_or(0, code_level),
            parent_code: code.as_deref().and_then(parent_code),
            account_code: code,
            table_type: schema.table_type,
            data_columns: values,
            primary_value,
            cell_address: self.name_cell(schema, row),
        })
    }

    fn general_row(&self, sheet: &str, grid: &dyn Grid, schema: &TableSchema, row: usize) -> Option<SourceItem> {
        let name = self.first_name(grid, schema, row)?;
        let (values, primary_value) = read_values(grid, schema, row);
        if primary_value.is_none() {
            return None;
        }

        Some(SourceItem {
            id: format!("{}_{}", sheet, row),
            sheet_name: sheet.to_string(),
            row,
            name,
            account_code: None,
            hierarchy_level: 0,
            parent_code: None,
            table_type: schema.table_type,
            data_columns: values,
            primary_value,
            cell_address: self.name_cell(schema, row),
        })
    }

    /// First value among the name columns that is not blank or symbols only.
    fn first_name(&self, grid: &dyn Grid, schema: &TableSchema, row: usize) -> Option<String> {
        schema
            .name_columns
            .iter()
            .filter_map(|&col| grid.text(row, col))
            .find(|text| !is_filler_text(text))
    }

    fn name_cell(&self, schema: &TableSchema, row: usize) -> String {
        let col = schema
            .name_columns
            .first()
            .or_else(|| schema.code_columns.first())
            .copied()
            .unwrap_or(1);
        cell_address(row, col)
    }

    /// Rejects labels, totals and numbers that sit where an account name
    /// would.
    fn is_account_name(&self, text: &str) -> bool {
        let length = text.chars().count();
        (2..=50).contains(&length)
            && text.chars().any(char::is_alphabetic)
            && !self.vocabulary.excluded_account_names.is_match(text)
            && !self.vocabulary.total_row.is_match(text)
    }
}

/// Values of every data column, keyed by normalized key, and the first
/// non-empty one in column order.
fn read_values(grid: &dyn Grid, schema: &TableSchema, row: usize) -> (BTreeMap<String, Option<f64>>, Option<f64>) {
    let mut values = BTreeMap::new();
    let mut primary = None;
    for column in schema.data_columns() {
        let value = grid.number(row, column.index);
        if primary.is_none() {
            primary = value;
        }
        values.insert(column.normalized_key.clone(), value);
    }
    (values, primary)
}

/// Removes a leading copy of the account code from a name cell.
fn strip_code(text: &str, code: Option<&str>) -> String {
    let trimmed = text.trim();
    match code.and_then(|code| trimmed.strip_prefix(code)) {
        Some(rest) => rest
            .trim_start_matches(|c: char| c.is_whitespace() || "-_、.．:：".contains(c))
            .to_string(),
        None => trimmed.to_string(),
    }
}
