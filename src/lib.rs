//! # Ledger Layout
//!
//! A library for reading spreadsheet-shaped financial statements whose layout
//! is not known in advance and turning each sheet into structured records.
//!
//! ## Core Concepts
//!
//! - **Target sheets**: statements whose value cells are still to be filled.
//!   Each text row becomes a [`TargetItem`] with a nesting level, a dotted
//!   hierarchical number and a parent link.
//! - **Source sheets**: statements that supply values. Each row becomes a
//!   [`SourceItem`] whose numbers are keyed by stable column keys.
//! - **Schema inference**: header rows, merged header cells, column meaning,
//!   name/code columns and the first data row are discovered per sheet
//!   ([`TableSchema`]).
//! - **Trial balances**: account-coded sheets get code-derived hierarchy levels
//!   and parent codes.
//!
//! Heuristics never fail a run. Unrecognized layouts degrade to
//! `TableType::Unknown`, positional column keys and empty schemas; only a
//! sheet the workbook cannot supply (or an invalid configuration) is an error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_layout::*;
//!
//! let workbook = MemoryWorkbook::new()
//!     .with_sheet("利润表", MemoryGrid::from_rows(vec![
//!         vec![Some("项目"), Some("本期金额")],
//!         vec![Some("一、营业收入"), None],
//!         vec![Some("  减：营业成本"), None],
//!     ]))
//!     .with_sheet("科目余额表", trial_balance_grid);
//!
//! let layout = LedgerLayout::standard().unwrap();
//! let extraction = layout
//!     .extract(&workbook, &[TargetSheet::new("利润表")], &["科目余额表"])
//!     .unwrap();
//!
//! for item in &extraction.target_items {
//!     println!("{} {} -> {}", item.hierarchical_number, item.name.trim(), item.target_cell_address);
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod grid;
pub mod header;
pub mod hierarchy;
pub mod inference;
pub mod keys;
pub mod schema;
pub mod utils;
pub mod vocabulary;

pub use classifier::{Classification, ColumnClassifier, StructureMap};
pub use config::{ExtractionConfig, KeyDictionaries, KeyRule, KeywordTables, ScanLimits};
pub use error::{LayoutError, Result};
pub use extractor::{code_level, parent_code, ExtractionOrchestrator, SourceStrategy};
pub use grid::{cell_address, column_letter, CellValue, Grid, MemoryGrid, MemoryWorkbook, MergeRange, Workbook};
pub use hierarchy::{HierarchyBuilder, HierarchyNode, HierarchyReport};
pub use inference::SchemaInferenceEngine;
pub use keys::{canonical_keys, CanonicalKey, KeySource};
pub use schema::*;
pub use vocabulary::Vocabulary;

use log::debug;

/// Owns a configuration and its compiled vocabulary, and hands out the
/// borrowing components for each run.
#[derive(Debug, Clone)]
pub struct LedgerLayout {
    config: ExtractionConfig,
    vocabulary: Vocabulary,
}

impl LedgerLayout {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        let vocabulary = Vocabulary::compile(&config.keywords)?;
        debug!(
            "Compiled vocabulary: {} header, {} meta and {} subordinate pattern(s)",
            vocabulary.header.len(),
            vocabulary.meta.len(),
            vocabulary.subordinate.len()
        );
        Ok(Self { config, vocabulary })
    }

    /// The built-in keyword tables and scan limits.
    pub fn standard() -> Result<Self> {
        Self::new(ExtractionConfig::default())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(ExtractionConfig::from_json(json)?)
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn orchestrator(&self) -> ExtractionOrchestrator<'_> {
        ExtractionOrchestrator::new(&self.config, &self.vocabulary)
    }

    pub fn extract<S: AsRef<str>>(
        &self,
        workbook: &dyn Workbook,
        target_sheets: &[TargetSheet],
        source_sheets: &[S],
    ) -> Result<Extraction> {
        self.orchestrator().extract(workbook, target_sheets, source_sheets)
    }

    pub fn infer(&self, sheet_name: &str, grid: &dyn Grid) -> TableSchema {
        SchemaInferenceEngine::new(&self.config, &self.vocabulary).infer(sheet_name, grid)
    }

    /// Builds and checks the line-item tree for `(row, text)` records.
    pub fn hierarchy<S: AsRef<str>>(&self, records: &[(usize, S)]) -> Result<(Vec<HierarchyNode>, HierarchyReport)> {
        let builder = HierarchyBuilder::new(&self.vocabulary);
        let nodes = builder.build(records);
        builder.verify("records", &nodes)?;
        let report = builder.report(&nodes);
        Ok((nodes, report))
    }
}

/// Extracts with the built-in configuration.
pub fn extract_workbook<S: AsRef<str>>(
    workbook: &dyn Workbook,
    target_sheets: &[TargetSheet],
    source_sheets: &[S],
) -> Result<Extraction> {
    LedgerLayout::standard()?.extract(workbook, target_sheets, source_sheets)
}
