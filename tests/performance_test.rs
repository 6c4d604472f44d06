//! パフォーマンステスト
//!
//! 大きなシートをストリーミングで処理できること、早期終了後に
//! 残りの行を読み込まないことを検証します。
//!
//! 注意: 処理時間の計測値は目安として出力するだけで、アサーションには使用しません。

use rust_xlsxwriter::*;
use sheetsense::{CellValue, CoordinatorBuilder, IngestorBuilder, RawRow};
use std::cell::Cell;
use std::io::Cursor;
use std::time::Instant;

/// 行数を指定して売上表を生成
fn generate_sales(rows: u32) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Sales")?;

    let headers = ["Product", "Region", "Units", "Revenue", "Margin"];
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    for i in 1..=rows {
        worksheet.write_string(i, 0, &format!("Product {}", i))?;
        worksheet.write_string(i, 1, ["North", "South", "East", "West"][(i % 4) as usize])?;
        worksheet.write_number(i, 2, f64::from(i % 97))?;
        worksheet.write_number(i, 3, f64::from(i) * 1.5)?;
        worksheet.write_number(i, 4, 0.25)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[test]
fn test_large_sheet_streaming() {
    const ROWS: u32 = 20_000;
    let excel_data = generate_sales(ROWS).unwrap();
    let ingestor = IngestorBuilder::new().build().unwrap();
    let mut source = ingestor
        .open_reader("sales.xlsx", Cursor::new(excel_data))
        .unwrap();

    let start = Instant::now();
    let mut count = 0usize;
    let mut last_index = 0u32;
    let summary = ingestor
        .for_each_row(&mut source, |row| {
            // 行順に出力される
            assert!(row.row_index() > last_index);
            last_index = row.row_index();
            count += 1;
            Ok(())
        })
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(count, ROWS as usize);
    assert_eq!(summary.rows_emitted, ROWS as usize);
    assert_eq!(last_index, ROWS + 1);
    println!(
        "Streamed {} rows in {:.2?} ({:.0} rows/sec)",
        count,
        elapsed,
        count as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
}

#[test]
fn test_early_exit_stops_pulling_rows() {
    // ヘッダー + 5行 + 大量の空行。しきい値を超えた時点で読み込みを止める
    let pulled = Cell::new(0usize);
    let rows = (1..=1_000_000u32).map(|number| {
        pulled.set(pulled.get() + 1);
        let cells = match number {
            1 => vec![CellValue::from("Item"), CellValue::from("Qty")],
            2..=6 => vec![CellValue::from(format!("Item {}", number)), CellValue::from(1.0)],
            _ => Vec::new(),
        };
        RawRow::new(number, cells)
    });

    let ingestor = IngestorBuilder::new().build().unwrap();
    let mut iter = ingestor.sheet_rows("Stock", rows);
    let emitted = iter.by_ref().count();

    assert_eq!(emitted, 5);
    // 6行 + しきい値(50) + 1行
    assert_eq!(pulled.get(), 57);
    assert!(iter.pipeline().stats().early_exit);
}

#[test]
#[ignore] // 手動実行用
fn test_index_large_workbook() {
    const ROWS: u32 = 100_000;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = CoordinatorBuilder::local()
        .with_source_dir(dir.path())
        .build()
        .unwrap();

    let paths = coordinator
        .replace_sources(vec![("sales.xlsx".to_string(), generate_sales(ROWS).unwrap())])
        .unwrap();

    let report = coordinator.rebuild(&paths).unwrap();
    assert_eq!(report.rows_indexed, ROWS as usize);
    println!(
        "Indexed {} rows in {:.2?}",
        report.rows_indexed, report.elapsed
    );

    let result = coordinator.search("Product 42 revenue").unwrap();
    assert!(!result.context.is_empty());
}
