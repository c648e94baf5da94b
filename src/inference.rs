use crate::classifier::ColumnClassifier;
use crate::config::{ExtractionConfig, ScanLimits};
use crate::grid::{column_letter, Grid};
use crate::header::{HeaderBlock, HeaderScanner, MergeLookup};
use crate::keys::{KeyRegistry, KeyResolver};
use crate::schema::{ColumnInfo, HeaderSpan, TableSchema, TableType};
use crate::utils::{clean_header_text, contains_cjk, is_filler_text, leading_whitespace};
use crate::vocabulary::Vocabulary;
use log::{debug, info, warn};

/// Header text of one column, resolved through merges.
#[derive(Debug, Clone, Default)]
struct HeaderCells {
    primary: String,
    secondary: String,
    primary_span: Option<HeaderSpan>,
    secondary_span: Option<HeaderSpan>,
    skip: bool,
}

struct ColumnDraft {
    index: usize,
    header: HeaderCells,
    is_numeric: bool,
}

/// Infers the layout of one sheet. Pure: the same grid always yields the same
/// schema, and no grid yields an error.
pub struct SchemaInferenceEngine<'a> {
    config: &'a ExtractionConfig,
    vocabulary: &'a Vocabulary,
    classifier: ColumnClassifier<'a>,
}

impl<'a> SchemaInferenceEngine<'a> {
    pub fn new(config: &'a ExtractionConfig, vocabulary: &'a Vocabulary) -> Self {
        Self {
            config,
            vocabulary,
            classifier: ColumnClassifier::new(vocabulary),
        }
    }

    fn limits(&self) -> &ScanLimits {
        &self.config.limits
    }

    pub fn classifier(&self) -> &ColumnClassifier<'a> {
        &self.classifier
    }

    pub fn infer(&self, sheet_hint: &str, grid: &dyn Grid) -> TableSchema {
        if !has_two_non_empty_rows(grid) {
            warn!("Sheet '{}' has fewer than two non-empty rows; using an empty schema", sheet_hint);
            return TableSchema::empty(sheet_hint);
        }

        let table_type = self.classify_table(sheet_hint, grid);
        let block = HeaderScanner::new(self.vocabulary, self.limits()).discover(grid);
        let merges = MergeLookup::for_block(grid, &block, self.limits().max_columns);
        let header_end = block.end_row();

        let drafts = self.draft_columns(grid, &block, &merges);
        let code_columns = self.detect_code_columns(grid, header_end, &drafts);
        let name_columns = self.detect_name_columns(grid, header_end, &drafts, &code_columns);
        let columns = self.build_columns(table_type, drafts, &name_columns, &code_columns);

        let data_start_row = self.find_data_start(grid, header_end, &columns, &name_columns, &code_columns);
        let has_hierarchy = (table_type == TableType::TrialBalance && !code_columns.is_empty())
            || self.has_indented_names(grid, data_start_row, &name_columns);

        let schema = TableSchema {
            sheet_name: sheet_hint.to_string(),
            table_type,
            header_start_row: block.start_row,
            header_rows: block.rows,
            data_start_row,
            name_columns,
            code_columns,
            columns,
            has_hierarchy,
            has_merged_header: merges.has_spanning_merge(),
        };

        info!(
            "Sheet '{}': {} with {} header row(s) at row {}, {} column(s), data from row {}",
            sheet_hint,
            schema.table_type,
            schema.header_rows,
            schema.header_start_row,
            schema.columns.len(),
            schema.data_start_row
        );
        schema
    }

    /// The sheet name decides when it names a statement; otherwise the name
    /// plus the text of the top-left corner of the sheet.
    pub fn classify_table(&self, sheet_hint: &str, grid: &dyn Grid) -> TableType {
        if let Some(table_type) = self.vocabulary.table_type(sheet_hint) {
            return table_type;
        }

        let mut text = sheet_hint.to_string();
        let last_row = grid.max_row().min(self.limits().type_scan_rows);
        let last_col = grid.max_column().min(self.limits().type_scan_columns);
        for row in 1..=last_row {
            for col in 1..=last_col {
                if let Some(cell) = grid.text(row, col) {
                    text.push(' ');
                    text.push_str(&cell);
                }
            }
        }

        self.vocabulary.table_type(&text).unwrap_or_default()
    }

    fn draft_columns(&self, grid: &dyn Grid, block: &HeaderBlock, merges: &MergeLookup) -> Vec<ColumnDraft> {
        let last_col = grid.max_column().min(self.limits().max_columns);
        let mut drafts: Vec<ColumnDraft> = Vec::new();

        for col in 1..=last_col {
            let mut header = self.resolve_header(grid, block, merges, col);
            if header.skip {
                debug!("Column {} continues a merged header; skipped", column_letter(col));
                continue;
            }

            // An unmerged parent label written once over its sub-labels.
            if header.primary.is_empty() && !header.secondary.is_empty() {
                if let Some(previous) = drafts.last().filter(|draft| draft.index + 1 == col) {
                    if !previous.header.primary.is_empty() && !previous.header.secondary.is_empty() {
                        header.primary = previous.header.primary.clone();
                    }
                }
            }
            if header.primary.is_empty() && !header.secondary.is_empty() {
                header.primary = std::mem::take(&mut header.secondary);
                header.primary_span = header.secondary_span.take();
            }

            let (samples, numeric) = self.sample_numeric(grid, block.end_row(), col);
            if header.primary.is_empty() && samples == 0 {
                continue;
            }

            drafts.push(ColumnDraft {
                index: col,
                header,
                is_numeric: numeric > 0
                    && numeric as f64 / samples as f64 >= self.limits().numeric_ratio,
            });
        }

        drafts
    }

    fn resolve_header(&self, grid: &dyn Grid, block: &HeaderBlock, merges: &MergeLookup, col: usize) -> HeaderCells {
        if block.rows == 0 {
            return HeaderCells::default();
        }

        let (primary, primary_span) = header_cell(grid, merges, block.start_row, col);
        let (secondary, secondary_span) = secondary_text(grid, block, merges, col, &primary);

        let mut skip = false;
        if let Some(span) = primary_span.filter(|span| !span.is_origin && span.col_span > 1) {
            let (origin_secondary, _) = {
                let (origin_primary, _) = header_cell(grid, merges, block.start_row, span.origin_col);
                secondary_text(grid, block, merges, span.origin_col, &origin_primary)
            };
            skip = secondary.is_empty() || secondary == origin_secondary;
        }

        HeaderCells {
            primary,
            secondary,
            primary_span,
            secondary_span,
            skip,
        }
    }

    /// (non-empty samples, numeric samples) below the header.
    fn sample_numeric(&self, grid: &dyn Grid, header_end: usize, col: usize) -> (usize, usize) {
        let first = header_end + 1;
        let last = (header_end + self.limits().numeric_sample_rows).min(grid.max_row());
        let mut samples = 0;
        let mut numeric = 0;
        for row in first..=last {
            match grid.cell(row, col) {
                Some(value) if !value.is_blank() => {
                    samples += 1;
                    if value.is_numeric() {
                        numeric += 1;
                    }
                }
                _ => {}
            }
        }
        (samples, numeric)
    }

    fn text_samples(&self, grid: &dyn Grid, header_end: usize, col: usize) -> Vec<String> {
        let first = header_end + 1;
        let last = (header_end + self.limits().name_code_sample_rows).min(grid.max_row());
        (first..=last)
            .filter_map(|row| grid.text(row, col))
            .filter(|text| !is_filler_text(text))
            .collect()
    }

    fn candidates<'d>(&self, drafts: &'d [ColumnDraft]) -> impl Iterator<Item = &'d ColumnDraft> {
        let limit = self.limits().name_code_columns;
        drafts.iter().filter(move |draft| draft.index <= limit)
    }

    fn has_financial_header(&self, header: &HeaderCells) -> bool {
        self.classifier
            .classify(&header.primary, &header.secondary)
            .has_financial_keyword()
    }

    fn detect_code_columns(&self, grid: &dyn Grid, header_end: usize, drafts: &[ColumnDraft]) -> Vec<usize> {
        self.candidates(drafts)
            .filter(|draft| !self.has_financial_header(&draft.header))
            .filter(|draft| {
                let header = header_text(&draft.header);
                if !header.is_empty() && self.vocabulary.code_header.is_match(&header) {
                    return true;
                }
                let samples = self.text_samples(grid, header_end, draft.index);
                let hits = samples
                    .iter()
                    .filter(|sample| self.vocabulary.looks_like_code(sample))
                    .count();
                meets_ratio(hits, samples.len(), self.limits().code_ratio)
            })
            .map(|draft| draft.index)
            .collect()
    }

    fn detect_name_columns(
        &self,
        grid: &dyn Grid,
        header_end: usize,
        drafts: &[ColumnDraft],
        code_columns: &[usize],
    ) -> Vec<usize> {
        let detected: Vec<usize> = self
            .candidates(drafts)
            .filter(|draft| !code_columns.contains(&draft.index))
            .filter(|draft| !self.has_financial_header(&draft.header))
            .filter(|draft| {
                let header = header_text(&draft.header);
                if !header.is_empty() && self.vocabulary.name_header.is_match(&header) {
                    return true;
                }
                let samples = self.text_samples(grid, header_end, draft.index);
                let hits = samples
                    .iter()
                    .filter(|sample| contains_cjk(sample) && !self.vocabulary.is_pure_number(sample))
                    .count();
                meets_ratio(hits, samples.len(), self.limits().name_ratio)
            })
            .map(|draft| draft.index)
            .collect();

        if !detected.is_empty() {
            return detected;
        }

        let fallback = self
            .candidates(drafts)
            .find(|draft| {
                !code_columns.contains(&draft.index)
                    && !draft.is_numeric
                    && !self.text_samples(grid, header_end, draft.index).is_empty()
            })
            .map(|draft| draft.index)
            .or_else(|| (!code_columns.contains(&1)).then_some(1));

        match fallback {
            Some(col) => {
                debug!("No name column recognized; using column {}", column_letter(col));
                vec![col]
            }
            None => Vec::new(),
        }
    }

    fn build_columns(
        &self,
        table_type: TableType,
        drafts: Vec<ColumnDraft>,
        name_columns: &[usize],
        code_columns: &[usize],
    ) -> Vec<ColumnInfo> {
        let resolver = KeyResolver::new(&self.config.key_dictionaries, &self.classifier);
        let mut registry = KeyRegistry::new();

        drafts
            .into_iter()
            .map(|draft| {
                let ColumnDraft {
                    index,
                    header,
                    is_numeric,
                } = draft;
                let classification = self.classifier.classify(&header.primary, &header.secondary);
                let text = header_text(&header);
                let is_label_column = name_columns.contains(&index)
                    || code_columns.contains(&index)
                    || (!text.is_empty() && self.vocabulary.line_number.is_match(&text));

                let key = registry.register(resolver.resolve(
                    table_type,
                    index,
                    &header.primary,
                    &header.secondary,
                    classification.data_type,
                ));

                ColumnInfo {
                    index,
                    letter: column_letter(index),
                    is_placeholder: header.primary.is_empty() && header.secondary.is_empty(),
                    primary_header: header.primary,
                    secondary_header: header.secondary,
                    primary_span: header.primary_span,
                    secondary_span: header.secondary_span,
                    is_numeric,
                    data_type: classification.data_type,
                    period: classification.period,
                    direction: classification.direction,
                    aggregate: classification.aggregate,
                    normalized_key: key.key,
                    display_name: key.display,
                    is_data_column: !is_label_column
                        && (is_numeric || classification.has_financial_keyword()),
                }
            })
            .collect()
    }

    /// First row below the header with a usable name or a number in a value
    /// column.
    fn find_data_start(
        &self,
        grid: &dyn Grid,
        header_end: usize,
        columns: &[ColumnInfo],
        name_columns: &[usize],
        code_columns: &[usize],
    ) -> usize {
        let first = header_end + 1;
        let last = (header_end + self.limits().data_start_search_rows).min(grid.max_row());
        let value_columns: Vec<usize> = columns
            .iter()
            .map(|column| column.index)
            .filter(|index| !name_columns.contains(index) && !code_columns.contains(index))
            .collect();

        (first..=last)
            .find(|&row| {
                let named = name_columns.iter().any(|&col| {
                    grid.text(row, col).is_some_and(|text| {
                        !is_filler_text(&text)
                            && !self.vocabulary.meta.is_match(&text)
                            && !self.vocabulary.is_pure_number(&text)
                    })
                });
                named || value_columns.iter().any(|&col| grid.number(row, col).is_some())
            })
            .unwrap_or(first)
    }

    fn has_indented_names(&self, grid: &dyn Grid, data_start: usize, name_columns: &[usize]) -> bool {
        let last = (data_start + self.limits().numeric_sample_rows).min(grid.max_row());
        (data_start..=last).any(|row| {
            name_columns.iter().any(|&col| {
                grid.raw_text(row, col).is_some_and(|text| {
                    let trimmed = text.trim();
                    leading_whitespace(&text) > 0
                        || self.vocabulary.numbered_row.is_match(trimmed)
                        || self.vocabulary.subordinate.is_match(trimmed)
                })
            })
        })
    }
}

/// Cleaned text at (row, col), read from the merge origin when the cell sits
/// inside a merged block.
fn header_cell(grid: &dyn Grid, merges: &MergeLookup, row: usize, col: usize) -> (String, Option<HeaderSpan>) {
    match merges.get(row, col) {
        Some(merge) => {
            let text = grid
                .text(merge.min_row, merge.min_col)
                .map(|text| clean_header_text(&text))
                .unwrap_or_default();
            let span = HeaderSpan {
                row_span: merge.row_span(),
                col_span: merge.col_span(),
                origin_row: merge.min_row,
                origin_col: merge.min_col,
                is_origin: col == merge.min_col,
            };
            (text, Some(span))
        }
        None => (
            grid.text(row, col).map(|text| clean_header_text(&text)).unwrap_or_default(),
            None,
        ),
    }
}

/// Text of the header rows below the first, joined. Rows covered by the same
/// vertical merge as the primary cell add nothing.
fn secondary_text(
    grid: &dyn Grid,
    block: &HeaderBlock,
    merges: &MergeLookup,
    col: usize,
    primary: &str,
) -> (String, Option<HeaderSpan>) {
    let primary_merge = merges.get(block.start_row, col).copied();
    let mut parts: Vec<String> = Vec::new();
    let mut span = None;

    for row in block.start_row + 1..=block.end_row() {
        if primary_merge.is_some() && merges.get(row, col).copied() == primary_merge {
            continue;
        }
        let (text, cell_span) = header_cell(grid, merges, row, col);
        if text.is_empty() || text == primary || parts.contains(&text) {
            continue;
        }
        if span.is_none() {
            span = cell_span;
        }
        parts.push(text);
    }

    (parts.join(" "), span)
}

fn header_text(header: &HeaderCells) -> String {
    crate::utils::join_non_empty(&[&header.primary, &header.secondary], " ")
}

fn meets_ratio(hits: usize, total: usize, threshold: f64) -> bool {
    total > 0 && hits as f64 / total as f64 >= threshold
}

fn has_two_non_empty_rows(grid: &dyn Grid) -> bool {
    let mut found = 0;
    for row in 1..=grid.max_row() {
        let non_empty = (1..=grid.max_column())
            .any(|col| grid.cell(row, col).is_some_and(|value| !value.is_blank()));
        if non_empty {
            found += 1;
            if found >= 2 {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MemoryGrid;
    use crate::schema::{DataType, Direction, Period};

    fn grid(rows: Vec<Vec<&str>>) -> MemoryGrid {
        MemoryGrid::from_rows(rows.into_iter().map(|row| {
            row.into_iter()
                .map(|cell| if cell.is_empty() { None } else { Some(cell) })
                .collect::<Vec<_>>()
        }))
    }

    fn infer(name: &str, grid: &MemoryGrid) -> TableSchema {
        let config = ExtractionConfig::default();
        let vocabulary = Vocabulary::compile(&config.keywords).unwrap();
        SchemaInferenceEngine::new(&config, &vocabulary).infer(name, grid)
    }

    fn trial_balance() -> MemoryGrid {
        grid(vec![
            vec!["科目余额表"],
            vec!["编制单位：示例有限公司", "", "", "", "", "", "单位：元"],
            vec!["科目代码", "科目名称", "期初余额", "", "本期发生额", "", "期末余额", ""],
            vec!["", "", "借方", "贷方", "借方", "贷方", "借方", "贷方"],
            vec!["1001", "库存现金", "5,000.00", "", "1,200.00", "800.00", "5,400.00", ""],
            vec!["1002", "银行存款", "120,000.00", "", "30,000.00", "45,000.00", "105,000.00", ""],
            vec!["100201", "工商银行", "80,000.00", "", "", "", "80,000.00", ""],
            vec!["2202", "应付账款", "", "30,000.00", "", "", "", "30,000.00"],
        ])
        .with_merge(3, 1, 4, 1)
        .with_merge(3, 2, 4, 2)
        .with_merge(3, 3, 3, 4)
        .with_merge(3, 5, 3, 6)
        .with_merge(3, 7, 3, 8)
    }

    #[test]
    fn test_trial_balance_schema() {
        let schema = infer("Sheet1", &trial_balance());

        assert_eq!(schema.table_type, TableType::TrialBalance);
        assert_eq!(schema.header_start_row, 3);
        assert_eq!(schema.header_rows, 2);
        assert_eq!(schema.data_start_row, 5);
        assert_eq!(schema.code_columns, vec![1]);
        assert_eq!(schema.name_columns, vec![2]);
        assert!(schema.has_hierarchy);
        assert!(schema.has_merged_header);

        let keys: Vec<&str> = schema.data_columns().map(|c| c.normalized_key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "opening_debit",
                "opening_credit",
                "movement_debit",
                "movement_credit",
                "ending_debit",
                "ending_credit"
            ]
        );

        let credit = schema.column(4).unwrap();
        assert_eq!(credit.primary_header, "期初余额");
        assert_eq!(credit.secondary_header, "贷方");
        assert_eq!(credit.data_type, DataType::Credit);
        assert_eq!(credit.period, Some(Period::Opening));
        assert_eq!(credit.direction, Some(Direction::Credit));
        assert!(!credit.primary_span.unwrap().is_origin);

        let code = schema.column(1).unwrap();
        assert_eq!(code.primary_header, "科目代码");
        assert_eq!(code.secondary_header, "");
        assert!(!code.is_data_column);
    }

    #[test]
    fn test_income_statement_schema() {
        let sheet = grid(vec![
            vec!["利润表"],
            vec!["项目", "行次", "本期金额", "上期金额"],
            vec!["一、营业收入", "1", "1,000", "900"],
            vec!["  减：营业成本", "2", "600", "500"],
            vec!["二、营业利润", "3", "400", "400"],
        ]);
        let schema = infer("Sheet2", &sheet);

        assert_eq!(schema.table_type, TableType::IncomeStatement);
        assert_eq!(schema.header_start_row, 2);
        assert_eq!(schema.header_rows, 1);
        assert_eq!(schema.data_start_row, 3);
        assert_eq!(schema.name_columns, vec![1]);
        assert!(schema.code_columns.is_empty());
        assert!(schema.has_hierarchy);

        let keys: Vec<&str> = schema.data_columns().map(|c| c.normalized_key.as_str()).collect();
        assert_eq!(keys, vec!["current_amount", "previous_amount"]);
        assert!(!schema.column(2).unwrap().is_data_column);
    }

    #[test]
    fn test_blank_header_gets_positional_key() {
        let sheet = grid(vec![
            vec!["Item", "Note", "Current", "Previous", ""],
            vec!["Revenue", "A", "100", "90", "7"],
            vec!["Costs", "B", "60", "50", "8"],
        ]);
        let schema = infer("Report", &sheet);

        let blank = schema.column(5).unwrap();
        assert!(blank.is_placeholder);
        assert_eq!(blank.normalized_key, "col_E");
        assert_eq!(blank.data_type, DataType::Unknown);
        assert!(blank.is_data_column);
        assert_eq!(schema.column(2).unwrap().data_type, DataType::Amount);
    }

    #[test]
    fn test_sparse_sheet_degrades_to_empty_schema() {
        let schema = infer("Empty", &grid(vec![vec!["Only a title"]]));
        assert_eq!(schema, TableSchema::empty("Empty"));
    }

    #[test]
    fn test_infer_is_deterministic() {
        let sheet = trial_balance();
        assert_eq!(infer("TB", &sheet), infer("TB", &sheet));
    }

    #[test]
    fn test_sheet_name_decides_table_type() {
        let sheet = grid(vec![vec!["项目", "金额"], vec!["现金", "10"]]);
        assert_eq!(infer("资产负债表", &sheet).table_type, TableType::BalanceSheet);
        assert_eq!(infer("Sheet9", &sheet).table_type, TableType::Unknown);
    }
}
