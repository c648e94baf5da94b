use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use ledger_layout::*;
use std::collections::BTreeSet;

const TRIAL_BALANCE_CSV: &str = "\
科目余额表,,,,,,,
科目代码,科目名称,期初余额,,本期发生额,,期末余额,
,,借方,贷方,借方,贷方,借方,贷方
1001,库存现金,\"5,000.00\",,\"1,200.00\",800.00,\"5,400.00\",
1002,银行存款,\"120,000.00\",,\"30,000.00\",\"45,000.00\",\"105,000.00\",
100201,工商银行,\"80,000.00\",,,,\"80,000.00\",
100101,人民币,\"5,000.00\",,,,\"5,000.00\",
2202,应付账款,,\"30,000.00\",,,,\"30,000.00\"
,2241 其他应付款,,\"1,000.00\",,,,\"1,000.00\"
合计,,\"210,000.00\",\"31,000.00\",\"31,200.00\",\"45,800.00\",\"195,400.00\",\"31,000.00\"
";

const INCOME_STATEMENT_CSV: &str = "\
利润表,,,
编制单位：示例有限公司,,,单位：元
项目,行次,本期金额,上期金额
一、营业收入,1,,
  减：营业成本,2,,
    其中：材料成本,3,,
  税金及附加,4,,
二、营业利润,5,,
  加：营业外收入,6,,
三、利润总额,7,,
单位负责人：张三,,,
";

/// Builds a grid from CSV text; empty fields stay empty.
fn grid_from_csv(text: &str) -> Result<MemoryGrid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = MemoryGrid::new();
    for (row_offset, record) in reader.records().enumerate() {
        let record = record?;
        for (col_offset, field) in record.iter().enumerate() {
            if !field.is_empty() {
                grid.set(row_offset + 1, col_offset + 1, field);
            }
        }
    }
    Ok(grid)
}

fn layout() -> Result<LedgerLayout> {
    Ok(LedgerLayout::standard()?)
}

fn assert_tree_invariants(items: &[TargetItem]) {
    for (index, item) in items.iter().enumerate() {
        if index > 0 && items[index - 1].sheet_name == item.sheet_name {
            assert!(
                item.hierarchical_level <= items[index - 1].hierarchical_level + 1,
                "level jump at row {}",
                item.row
            );
        }
        if let Some(parent_id) = &item.parent_id {
            let parent = items
                .iter()
                .find(|candidate| &candidate.id == parent_id)
                .expect("parent id refers to an item");
            assert!(parent.row < item.row);
            assert!(parent.hierarchical_level < item.hierarchical_level);
            assert!(parent.children_ids.contains(&item.id));
        }
        if let Some(parent_index) = item.parent_index {
            assert!(parent_index < index);
        }
    }
}

fn assert_unique_keys(schema: &TableSchema) {
    let keys: BTreeSet<&str> = schema
        .columns
        .iter()
        .map(|column| column.normalized_key.as_str())
        .collect();
    assert_eq!(keys.len(), schema.columns.len(), "duplicate keys in {}", schema.sheet_name);
    assert!(keys.iter().all(|key| !key.is_empty()));
}

#[test]
fn test_merged_two_row_header() -> Result<()> {
    let grid = MemoryGrid::new()
        .with(1, 1, "Account Code")
        .with(1, 2, "Account Name")
        .with(1, 3, "Beginning Balance")
        .with(1, 5, "Ending Balance")
        .with(2, 3, "Debit")
        .with(2, 4, "Credit")
        .with(2, 5, "Debit")
        .with(2, 6, "Credit")
        .with(3, 1, 1001_i64)
        .with(3, 2, "Cash")
        .with(3, 3, 100.0)
        .with(3, 5, 150.0)
        .with(4, 1, 2001_i64)
        .with(4, 2, "Payables")
        .with(4, 4, 50.0)
        .with(4, 6, 70.0)
        .with_merge(1, 3, 1, 4)
        .with_merge(1, 5, 1, 6)
        .with_merge(1, 1, 2, 1)
        .with_merge(1, 2, 2, 2);

    let schema = layout()?.infer("Balances", &grid);

    assert_eq!(schema.header_start_row, 1);
    assert_eq!(schema.header_rows, 2);
    assert_eq!(schema.data_start_row, 3);
    assert!(schema.has_merged_header);

    let debit = schema.column(3).ok_or_else(|| anyhow!("column C missing"))?;
    let credit = schema.column(4).ok_or_else(|| anyhow!("column D missing"))?;
    assert_eq!(debit.primary_header, "Beginning Balance");
    assert_eq!(credit.primary_header, "Beginning Balance");
    assert_eq!(debit.secondary_header, "Debit");
    assert_eq!(credit.secondary_header, "Credit");
    assert_eq!(debit.data_type, DataType::Debit);
    assert_eq!(credit.data_type, DataType::Credit);
    assert!(debit.primary_span.map_or(false, |span| span.is_origin));
    assert!(credit.primary_span.map_or(false, |span| !span.is_origin && span.origin_col == 3));
    assert_ne!(debit.normalized_key, credit.normalized_key);

    assert_eq!(schema.code_columns, vec![1]);
    assert_eq!(schema.name_columns, vec![2]);
    assert_unique_keys(&schema);
    Ok(())
}

#[test]
fn test_group_label_row_above_debit_credit() -> Result<()> {
    let grid = MemoryGrid::new()
        .with(1, 3, "Beginning Balance")
        .with(2, 3, "Debit")
        .with(2, 4, "Credit")
        .with(3, 1, "Cash")
        .with(3, 3, 100.0)
        .with(4, 1, "Bank")
        .with(4, 3, 200.0)
        .with(4, 4, 50.0)
        .with_merge(1, 3, 1, 4);

    let schema = layout()?.infer("Sheet1", &grid);
    assert_eq!(schema.header_start_row, 1);
    assert_eq!(schema.header_rows, 2);
    assert_eq!(schema.data_start_row, 3);

    let debit = schema.column(3).ok_or_else(|| anyhow!("column C missing"))?;
    let credit = schema.column(4).ok_or_else(|| anyhow!("column D missing"))?;
    assert_eq!(debit.primary_header, "Beginning Balance");
    assert_eq!(credit.primary_header, "Beginning Balance");
    assert_eq!(debit.secondary_header, "Debit");
    assert_eq!(credit.secondary_header, "Credit");
    assert_eq!(debit.data_type, DataType::Debit);
    assert_eq!(credit.data_type, DataType::Credit);
    assert_eq!(debit.normalized_key, "year_opening_debit");
    assert_eq!(credit.normalized_key, "year_opening_credit");
    assert_eq!(schema.name_columns, vec![1]);
    assert_unique_keys(&schema);
    Ok(())
}

#[test]
fn test_numbered_target_items() -> Result<()> {
    let grid = MemoryGrid::new()
        .with(1, 1, "Item")
        .with(1, 2, "Amount")
        .with(2, 1, "1.Revenue")
        .with(3, 1, "  Cost of sales")
        .with(4, 1, "2.Tax");
    let workbook = MemoryWorkbook::new().with_sheet("P&L", grid);

    let extraction = layout()?.extract(&workbook, &[TargetSheet::new("P&L")], &[] as &[&str])?;
    let items = &extraction.target_items;

    let numbers: Vec<&str> = items.iter().map(|item| item.hierarchical_number.as_str()).collect();
    assert_eq!(numbers, vec!["1", "1.1", "2"]);

    let revenue = &items[0];
    let cost = &items[1];
    assert_eq!(revenue.name, "Revenue");
    assert_eq!(revenue.display_index.as_deref(), Some("1"));
    assert_eq!(cost.parent_id.as_deref(), Some(revenue.id.as_str()));
    assert_eq!(cost.original_text, "  Cost of sales");
    assert_eq!(cost.level, 2);
    assert_eq!(cost.hierarchical_level, 1);
    assert_eq!(cost.target_cell_address, "B3");
    assert_eq!(items[2].parent_id, None);
    assert_tree_invariants(items);
    Ok(())
}

#[test]
fn test_trial_balance_source_records() -> Result<()> {
    let workbook = MemoryWorkbook::new().with_sheet("TB", grid_from_csv(TRIAL_BALANCE_CSV)?);
    let extraction = layout()?.extract(&workbook, &[], &["TB"])?;

    let schema = &extraction.schemas["TB"];
    assert_eq!(schema.table_type, TableType::TrialBalance);
    assert_eq!(schema.header_rows, 2);
    assert_eq!(schema.column(4).map(|c| c.primary_header.as_str()), Some("期初余额"));
    assert_unique_keys(schema);

    let items = &extraction.source_items;
    assert_eq!(items.len(), 6, "the total row is not an account");

    let rmb = items
        .iter()
        .find(|item| item.account_code.as_deref() == Some("100101"))
        .ok_or_else(|| anyhow!("account 100101 missing"))?;
    assert_eq!(rmb.hierarchy_level, 2);
    assert_eq!(rmb.parent_code.as_deref(), Some("1001"));
    assert_eq!(rmb.id, "TB_100101_7");
    assert_eq!(rmb.name, "人民币");
    assert_eq!(rmb.table_type, TableType::TrialBalance);

    let cash = &items[0];
    assert_eq!(cash.account_code.as_deref(), Some("1001"));
    assert_eq!(cash.hierarchy_level, 1);
    assert_eq!(cash.data_columns["opening_debit"], Some(5000.0));
    assert_eq!(cash.data_columns["movement_credit"], Some(800.0));
    assert_eq!(cash.data_columns["ending_credit"], None);
    assert_eq!(cash.primary_value, Some(5000.0));
    assert_eq!(cash.cell_address, "B4");
    assert_eq!(cash.indented_name(), "1001 库存现金");

    let other = items
        .iter()
        .find(|item| item.row == 9)
        .ok_or_else(|| anyhow!("row 9 missing"))?;
    assert_eq!(other.account_code.as_deref(), Some("2241"));
    assert_eq!(other.name, "其他应付款");

    for item in items {
        for key in item.data_columns.keys() {
            assert!(schema.columns.iter().any(|column| &column.normalized_key == key));
        }
    }
    Ok(())
}

#[test]
fn test_blank_headers_get_distinct_positional_keys() -> Result<()> {
    let grid = MemoryGrid::new()
        .with(1, 1, "项目")
        .with(1, 2, "行次")
        .with(1, 3, "本期金额")
        .with(1, 4, "上期金额")
        .with(1, 5, "   ")
        .with(2, 1, "营业收入")
        .with(2, 2, 1_i64)
        .with(2, 3, 1000.0)
        .with(2, 4, 900.0)
        .with(2, 5, 5.0)
        .with(2, 6, 6.0)
        .with(3, 1, "营业成本")
        .with(3, 2, 2_i64)
        .with(3, 3, 600.0)
        .with(3, 4, 550.0)
        .with(3, 5, 7.0)
        .with(3, 6, 8.0);

    let layout = layout()?;
    let schema = layout.infer("Sheet1", &grid);
    let fifth = schema.column(5).ok_or_else(|| anyhow!("column E missing"))?;
    let sixth = schema.column(6).ok_or_else(|| anyhow!("column F missing"))?;

    assert!(fifth.is_placeholder);
    assert_eq!(fifth.normalized_key, "col_E");
    assert_eq!(sixth.normalized_key, "col_F");
    assert_eq!(fifth.display_name, "Column E");
    assert_eq!(layout.infer("Sheet1", &grid).column(5).map(|c| c.normalized_key.clone()), Some("col_E".to_string()));
    assert_unique_keys(&schema);
    Ok(())
}

#[test]
fn test_level_jump_is_repaired_and_flagged() -> Result<()> {
    let layout = layout()?;
    let (nodes, report) = layout.hierarchy(&[(1, "Assets"), (2, " Current assets"), (3, "    Cash")])?;

    let resolved: Vec<usize> = nodes.iter().map(|node| node.resolved_level).collect();
    let levels: Vec<usize> = nodes.iter().map(|node| node.level).collect();
    assert_eq!(resolved, vec![0, 1, 4]);
    assert_eq!(levels, vec![0, 1, 2]);
    assert!(nodes[2].level_adjusted);
    assert!(!nodes[0].level_adjusted && !nodes[1].level_adjusted);
    assert_eq!(report.adjusted, 1);
    Ok(())
}

#[test]
fn test_equally_indented_items_are_siblings() -> Result<()> {
    let layout = layout()?;
    let (nodes, _) = layout.hierarchy(&[(1, "Assets"), (2, "  Cash"), (3, "  Receivables"), (4, "  Inventory")])?;

    let parents: Vec<Option<usize>> = nodes.iter().map(|node| node.parent).collect();
    assert_eq!(parents, vec![None, Some(0), Some(0), Some(0)]);
    let numbers: Vec<&str> = nodes.iter().map(|node| node.hierarchical_number.as_str()).collect();
    assert_eq!(numbers, vec!["1", "1.1", "1.2", "1.3"]);

    let (nodes, _) = layout.hierarchy(&[
        (1, "一、营业收入"),
        (2, "减：营业成本"),
        (3, "加：其他收益"),
        (4, "二、营业利润"),
    ])?;
    let numbers: Vec<&str> = nodes.iter().map(|node| node.hierarchical_number.as_str()).collect();
    assert_eq!(numbers, vec!["1", "1.1", "1.2", "2"]);
    assert_eq!(nodes[2].parent, Some(0));
    Ok(())
}

#[test]
fn test_income_statement_target_sheet() -> Result<()> {
    let workbook = MemoryWorkbook::new().with_sheet("利润表", grid_from_csv(INCOME_STATEMENT_CSV)?);
    let extraction = layout()?.extract(&workbook, &[TargetSheet::with_column("利润表", 3)], &[] as &[&str])?;
    let items = &extraction.target_items;

    let names: Vec<&str> = items.iter().map(|item| item.name.trim()).collect();
    assert_eq!(
        names,
        vec![
            "一、营业收入",
            "减：营业成本",
            "其中：材料成本",
            "税金及附加",
            "二、营业利润",
            "加：营业外收入",
            "三、利润总额"
        ]
    );

    let numbers: Vec<&str> = items.iter().map(|item| item.hierarchical_number.as_str()).collect();
    assert_eq!(numbers, vec!["1", "1.1", "1.1.1", "1.2", "2", "2.1", "3"]);
    assert_eq!(items[2].parent_index, Some(1));
    assert_eq!(items[1].child_indices, vec![2]);
    assert_eq!(items[3].parent_index, Some(0));
    assert_eq!(items[0].child_indices, vec![1, 3]);
    assert_eq!(items[0].target_cell_address, "C4");
    assert_eq!(items[0].columns["previous_amount"], "D4");
    assert_tree_invariants(items);

    let schema = &extraction.schemas["利润表"];
    assert_eq!(schema.table_type, TableType::IncomeStatement);
    assert_eq!(schema.header_start_row, 3);
    assert!(schema.has_hierarchy);
    Ok(())
}

#[test]
fn test_inference_is_deterministic() -> Result<()> {
    let layout = layout()?;
    let grid = grid_from_csv(TRIAL_BALANCE_CSV)?;
    assert_eq!(layout.infer("TB", &grid), layout.infer("TB", &grid));

    let workbook = MemoryWorkbook::new()
        .with_sheet("TB", grid)
        .with_sheet("利润表", grid_from_csv(INCOME_STATEMENT_CSV)?);
    let first = layout.extract(&workbook, &[TargetSheet::new("利润表")], &["TB"])?;
    let second = layout.extract(&workbook, &[TargetSheet::new("利润表")], &["TB"])?;
    assert_eq!(first.to_json()?, second.to_json()?);
    Ok(())
}

#[test]
fn test_missing_sheet_is_fatal() -> Result<()> {
    let workbook = MemoryWorkbook::new();
    let result = layout()?.extract(&workbook, &[], &["Ghost"]);
    assert!(matches!(result, Err(LayoutError::MissingSheet(ref name)) if name == "Ghost"));
    Ok(())
}

#[test]
fn test_sparse_sheet_yields_empty_results() -> Result<()> {
    let workbook = MemoryWorkbook::new().with_sheet("Notes", MemoryGrid::new().with(1, 1, "Draft"));
    let extraction = layout()?.extract(&workbook, &[], &["Notes"])?;
    assert!(extraction.source_items.is_empty());
    assert_eq!(extraction.schemas["Notes"], TableSchema::empty("Notes"));
    Ok(())
}

#[test]
fn test_date_cells_count_as_meta() -> Result<()> {
    let date = NaiveDate::from_ymd_opt(2023, 12, 31).ok_or_else(|| anyhow!("bad date"))?;
    let grid = MemoryGrid::new()
        .with(1, 1, "资产负债表")
        .with(2, 1, date)
        .with(2, 3, "单位：元")
        .with(3, 1, "项目")
        .with(3, 2, "期末余额")
        .with(3, 3, "年初余额")
        .with(4, 1, "货币资金")
        .with(4, 2, "1,500")
        .with(4, 3, "1,200");

    let schema = layout()?.infer("Sheet1", &grid);
    assert_eq!(schema.table_type, TableType::BalanceSheet);
    assert_eq!(schema.header_start_row, 3);
    assert_eq!(schema.data_start_row, 4);
    let keys: Vec<&str> = schema.data_columns().map(|c| c.normalized_key.as_str()).collect();
    assert_eq!(keys, vec!["ending_balance", "year_opening_balance"]);
    Ok(())
}

#[test]
fn test_config_from_json_file() -> Result<()> {
    let path = std::env::temp_dir().join("ledger_layout_config_test.json");
    std::fs::write(&path, r#"{"limits": {"max_columns": 4}}"#)?;
    let config = ExtractionConfig::from_json_file(&path)?;
    std::fs::remove_file(&path)?;
    assert_eq!(config.limits.max_columns, 4);

    let layout = LedgerLayout::new(config)?;
    let grid = grid_from_csv(TRIAL_BALANCE_CSV)?;
    let schema = layout.infer("TB", &grid);
    assert!(schema.columns.iter().all(|column| column.index <= 4));
    Ok(())
}
