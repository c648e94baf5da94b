//! Header-block discovery and merge lookup.

use crate::config::ScanLimits;
use crate::grid::{CellValue, Grid, MergeRange};
use crate::vocabulary::Vocabulary;
use log::debug;
use std::collections::BTreeMap;

/// Per-row evidence used to tell header rows from titles and data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMetrics {
    pub row: usize,
    pub non_empty: usize,
    pub keyword_hits: usize,
    pub numeric: usize,
    pub meta_hits: usize,
    pub longest_text: usize,
    pub first_text: Option<String>,
}

impl RowMetrics {
    pub fn numeric_ratio(&self) -> f64 {
        ratio(self.numeric, self.non_empty)
    }

    pub fn meta_ratio(&self) -> f64 {
        ratio(self.meta_hits, self.non_empty)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Blank,
    Description,
    DataLike,
    Header { strong: bool },
    Text,
}

/// Rows `start_row ..= start_row + rows - 1`. A block with `rows == 0` means
/// the sheet has no recognizable header and data begins at `start_row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBlock {
    pub start_row: usize,
    pub rows: usize,
}

impl HeaderBlock {
    pub fn end_row(&self) -> usize {
        (self.start_row + self.rows).saturating_sub(1)
    }

    pub fn contains(&self, row: usize) -> bool {
        self.rows > 0 && (self.start_row..=self.end_row()).contains(&row)
    }
}

pub struct HeaderScanner<'a> {
    vocabulary: &'a Vocabulary,
    limits: &'a ScanLimits,
}

impl<'a> HeaderScanner<'a> {
    pub fn new(vocabulary: &'a Vocabulary, limits: &'a ScanLimits) -> Self {
        Self { vocabulary, limits }
    }

    fn last_column(&self, grid: &dyn Grid) -> usize {
        grid.max_column().min(self.limits.max_columns)
    }

    pub fn metrics(&self, grid: &dyn Grid, row: usize) -> RowMetrics {
        let mut metrics = RowMetrics {
            row,
            ..RowMetrics::default()
        };

        for col in 1..=self.last_column(grid) {
            let value = match grid.cell(row, col) {
                Some(value) if !value.is_blank() => value,
                _ => continue,
            };
            metrics.non_empty += 1;

            if let CellValue::Date(_) = value {
                metrics.meta_hits += 1;
                continue;
            }
            if value.is_numeric() {
                metrics.numeric += 1;
                continue;
            }

            let text = value.to_text();
            let text = text.trim();
            if metrics.first_text.is_none() {
                metrics.first_text = Some(text.to_string());
            }
            metrics.longest_text = metrics.longest_text.max(text.chars().count());
            if self.vocabulary.header.is_match(text) {
                metrics.keyword_hits += 1;
            }
            if self.vocabulary.meta.is_match(text) {
                metrics.meta_hits += 1;
            }
        }

        metrics
    }

    pub fn classify(&self, metrics: &RowMetrics) -> RowKind {
        if metrics.non_empty == 0 {
            return RowKind::Blank;
        }
        if metrics.keyword_hits == 0 && metrics.numeric_ratio() >= self.limits.numeric_ratio {
            return RowKind::DataLike;
        }
        if metrics.non_empty <= 2 && (metrics.meta_ratio() >= 0.5 || metrics.keyword_hits == 0) {
            return RowKind::Description;
        }
        if metrics.non_empty < 2 {
            return RowKind::Description;
        }
        if metrics.keyword_hits >= 2 && metrics.meta_hits * 2 < metrics.non_empty {
            return RowKind::Header { strong: true };
        }
        if metrics.keyword_hits >= 1 {
            return RowKind::Header { strong: false };
        }
        RowKind::Text
    }

    /// Picks the earliest strong header row (else the earliest weak one, else
    /// the first plain text row) and grows the block downwards.
    pub fn discover(&self, grid: &dyn Grid) -> HeaderBlock {
        let last_scan_row = grid.max_row().min(self.limits.max_header_scan_rows);
        let rows: Vec<(RowMetrics, RowKind)> = (1..=last_scan_row)
            .map(|row| {
                let metrics = self.metrics(grid, row);
                let kind = self.classify(&metrics);
                (metrics, kind)
            })
            .collect();

        let pick = |wanted: fn(RowKind) -> bool| {
            rows.iter()
                .find(|(_, kind)| wanted(*kind))
                .map(|(metrics, _)| metrics.row)
        };

        let start = pick(|kind| kind == RowKind::Header { strong: true })
            .or_else(|| pick(|kind| kind == RowKind::Header { strong: false }))
            .or_else(|| pick(|kind| kind == RowKind::Text));

        let start_row = match start {
            Some(row) => self.group_label_row(grid, row).unwrap_or(row),
            None => {
                let first_data = rows
                    .iter()
                    .find(|(_, kind)| *kind == RowKind::DataLike)
                    .or_else(|| rows.iter().find(|(_, kind)| *kind != RowKind::Blank))
                    .map(|(metrics, _)| metrics.row)
                    .unwrap_or(1);
                debug!("No header row found; data assumed to begin at row {}", first_data);
                return HeaderBlock {
                    start_row: first_data,
                    rows: 0,
                };
            }
        };

        let mut block = HeaderBlock { start_row, rows: 1 };
        while block.rows < self.limits.max_header_rows {
            let next = block.end_row() + 1;
            if next > grid.max_row() {
                break;
            }
            let metrics = self.metrics(grid, next);
            let covered = self.covered_by_block_merge(grid, &block, next);
            if covered && self.classify(&metrics) != RowKind::DataLike {
                block.rows += 1;
                continue;
            }
            if self.stops_block(&metrics) || !self.is_continuation(grid, &metrics) {
                break;
            }
            block.rows += 1;
        }

        debug!(
            "Header block at rows {}..={} ({} rows)",
            block.start_row,
            block.end_row(),
            block.rows
        );
        block
    }

    /// The row above `header_row` when its only header content is a label
    /// merged across several columns that sit over sub-labels, e.g.
    /// "Beginning Balance" over "Debit" and "Credit". Such a row has too few
    /// cells to classify as a header by itself. Titles (meta text, or a merge
    /// spanning the whole sheet from column A) are not group labels.
    pub fn group_label_row(&self, grid: &dyn Grid, header_row: usize) -> Option<usize> {
        let upper = header_row.checked_sub(1).filter(|&row| row >= 1)?;
        let metrics = self.metrics(grid, upper);
        if metrics.keyword_hits == 0
            || metrics.meta_hits > 0
            || self.classify(&metrics) == RowKind::DataLike
        {
            return None;
        }

        let last_column = self.last_column(grid);
        let over_sub_labels = grid.merges().iter().any(|merge| {
            merge.min_row == upper
                && merge.max_row == upper
                && merge.col_span() > 1
                && merge.min_col <= last_column
                && (merge.min_col > 1 || merge.col_span() < last_column)
                && (merge.min_col..=merge.max_col.min(last_column))
                    .any(|col| grid.text(header_row, col).is_some())
        });

        if over_sub_labels {
            debug!("Row {} holds a merged group label over header row {}", upper, header_row);
        }
        over_sub_labels.then_some(upper)
    }

    /// The first row that reads like data ends the header block.
    pub fn stops_block(&self, metrics: &RowMetrics) -> bool {
        if metrics.non_empty < 2 {
            return true;
        }
        if metrics.numeric > 0 && metrics.numeric_ratio() >= self.limits.numeric_ratio {
            return true;
        }
        if metrics.longest_text > self.limits.max_header_text_chars {
            return true;
        }
        match &metrics.first_text {
            Some(text) => {
                self.vocabulary.numbered_row.is_match(text) || self.vocabulary.total_row.is_match(text)
            }
            None => false,
        }
    }

    fn is_continuation(&self, grid: &dyn Grid, metrics: &RowMetrics) -> bool {
        let kind = self.classify(metrics);
        if kind == RowKind::DataLike {
            return false;
        }
        metrics.keyword_hits > 0 || self.has_merge_origin(grid, metrics.row)
    }

    fn has_merge_origin(&self, grid: &dyn Grid, row: usize) -> bool {
        let last_column = self.last_column(grid);
        grid.merges()
            .iter()
            .any(|merge| merge.min_row == row && merge.min_col <= last_column)
    }

    fn covered_by_block_merge(&self, grid: &dyn Grid, block: &HeaderBlock, row: usize) -> bool {
        let last_column = self.last_column(grid);
        grid.merges().iter().any(|merge| {
            block.contains(merge.min_row) && merge.max_row >= row && merge.min_col <= last_column
        })
    }
}

/// (row, col) → the merge rectangle covering that cell, restricted to merges
/// that overlap the header block.
#[derive(Debug, Clone, Default)]
pub struct MergeLookup {
    cells: BTreeMap<(usize, usize), MergeRange>,
}

impl MergeLookup {
    pub fn for_block(grid: &dyn Grid, block: &HeaderBlock, max_columns: usize) -> Self {
        let mut cells = BTreeMap::new();
        if block.rows == 0 {
            return Self { cells };
        }

        let last_column = grid.max_column().min(max_columns);
        for merge in grid.merges() {
            if !merge.overlaps_rows(block.start_row, block.end_row()) {
                continue;
            }
            let first_row = merge.min_row.max(block.start_row);
            let last_row = merge.max_row.min(block.end_row());
            for row in first_row..=last_row {
                for col in merge.min_col..=merge.max_col.min(last_column) {
                    cells.entry((row, col)).or_insert(*merge);
                }
            }
        }

        Self { cells }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&MergeRange> {
        self.cells.get(&(row, col))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when any merge in the block spans more than one cell.
    pub fn has_spanning_merge(&self) -> bool {
        self.cells
            .values()
            .any(|merge| merge.row_span() > 1 || merge.col_span() > 1)
    }
}
