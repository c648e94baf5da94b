use ledger_layout::{LedgerLayout, MemoryGrid, MemoryWorkbook, TargetSheet};

fn text_row<'a>(cells: &[&'a str]) -> Vec<Option<&'a str>> {
    cells
        .iter()
        .map(|cell| if cell.is_empty() { None } else { Some(*cell) })
        .collect()
}

fn main() {
    let trial_balance = MemoryGrid::from_rows(vec![
        text_row(&["科目余额表"]),
        text_row(&["科目代码", "科目名称", "期初余额", "", "本期发生额", "", "期末余额", ""]),
        text_row(&["", "", "借方", "贷方", "借方", "贷方", "借方", "贷方"]),
        text_row(&["1001", "库存现金", "5,000.00", "", "1,200.00", "800.00", "5,400.00", ""]),
        text_row(&["1002", "银行存款", "120,000.00", "", "30,000.00", "45,000.00", "105,000.00", ""]),
        text_row(&["100201", "工商银行", "80,000.00", "", "", "", "80,000.00", ""]),
        text_row(&["2202", "应付账款", "", "30,000.00", "", "", "", "30,000.00"]),
    ])
    .with_merge(2, 1, 3, 1)
    .with_merge(2, 2, 3, 2)
    .with_merge(2, 3, 2, 4)
    .with_merge(2, 5, 2, 6)
    .with_merge(2, 7, 2, 8);

    let balance_sheet = MemoryGrid::from_rows(vec![
        text_row(&["资产负债表"]),
        text_row(&["项目", "期末余额", "年初余额"]),
        text_row(&["一、流动资产", "", ""]),
        text_row(&["  货币资金", "", ""]),
        text_row(&["  应收账款", "", ""]),
        text_row(&["二、负债", "", ""]),
        text_row(&["  应付账款", "", ""]),
    ]);

    let workbook = MemoryWorkbook::new()
        .with_sheet("科目余额表", trial_balance)
        .with_sheet("资产负债表", balance_sheet);

    let layout = LedgerLayout::standard().expect("built-in keyword tables compile");
    let extraction = layout
        .extract(&workbook, &[TargetSheet::new("资产负债表")], &["科目余额表"])
        .expect("every listed sheet is present");

    println!("Target line items:");
    for item in &extraction.target_items {
        println!(
            "  {:<6} {:<12} -> {}",
            item.hierarchical_number,
            item.name.trim(),
            item.target_cell_address
        );
    }

    println!("\nSource records:");
    for item in &extraction.source_items {
        let ending = item.data_columns.get("ending_debit").copied().flatten();
        println!(
            "  {:<20} parent={:<6} ending_debit={}",
            item.indented_name(),
            item.parent_code.as_deref().unwrap_or("-"),
            ending.map_or("-".to_string(), |value| format!("{:.2}", value))
        );
    }

    match extraction.to_json() {
        Ok(json) => println!("\n{} bytes of JSON output", json.len()),
        Err(error) => eprintln!("Could not serialize the extraction: {}", error),
    }
}
