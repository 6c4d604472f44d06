//! パフォーマンスベンチマーク
//!
//! このモジュールは、sheetsenseクレートのパフォーマンスを測定するためのベンチマークを提供します。
//!
//! 実装するベンチマーク:
//! - ワークブック取り込みのスループット（行/秒）
//! - パイプライン単体（ヘッダー探索・分類・意味化）のスループット
//! - 埋め込みとインデックス作成のスループット

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rust_xlsxwriter::{Workbook, XlsxError};
use sheetsense::{
    CellValue, CoordinatorBuilder, EmbeddingBackend, HashingEmbedder, IngestorBuilder, RawRow,
};
use std::io::Cursor;

/// 指定行数の売上表を生成
fn generate_workbook(rows: u32) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Sales")?;

    let headers = ["Product", "Region", "Jan", "Feb", "Mar", "Apr", "May", "Jun"];
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    for i in 1..=rows {
        worksheet.write_string(i, 0, &format!("Product {}", i))?;
        worksheet.write_string(i, 1, ["North", "South", "East", "West"][(i % 4) as usize])?;
        for col in 2..8u16 {
            worksheet.write_number(i, col, f64::from(i) * f64::from(col))?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// メモリ上の行データを生成
fn generate_rows(rows: u32) -> Vec<RawRow> {
    let mut out = Vec::with_capacity(rows as usize + 1);
    out.push(RawRow::new(
        1,
        ["Product", "Region", "Units", "Revenue"]
            .iter()
            .map(|s| CellValue::from(*s))
            .collect(),
    ));
    for i in 0..rows {
        out.push(RawRow::new(
            i + 2,
            vec![
                CellValue::from(format!("Product {}", i)),
                CellValue::from("North"),
                CellValue::from(f64::from(i % 50)),
                CellValue::Empty,
            ],
        ));
    }
    out
}

/// ワークブック取り込みのスループット
fn benchmark_ingest_workbook(c: &mut Criterion) {
    const ROWS: u32 = 10_000;
    let data = generate_workbook(ROWS).unwrap();
    let ingestor = IngestorBuilder::new().build().unwrap();

    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Elements(u64::from(ROWS)));
    group.sample_size(10);

    group.bench_function("workbook_10k_rows", |b| {
        b.iter(|| {
            let mut source = ingestor
                .open_reader("sales.xlsx", Cursor::new(black_box(data.clone())))
                .unwrap();
            let mut count = 0usize;
            ingestor
                .for_each_row(&mut source, |row| {
                    black_box(row.document_text());
                    count += 1;
                    Ok(())
                })
                .unwrap();
            black_box(count)
        });
    });

    group.finish();
}

/// パイプライン単体のスループット
fn benchmark_pipeline(c: &mut Criterion) {
    const ROWS: u32 = 50_000;
    let rows = generate_rows(ROWS);
    let ingestor = IngestorBuilder::new().build().unwrap();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(u64::from(ROWS)));

    group.bench_function("sheet_rows_50k", |b| {
        b.iter(|| {
            let count = ingestor
                .sheet_rows("Sales", black_box(rows.clone()))
                .map(|row| black_box(row.document_text()))
                .count();
            black_box(count)
        });
    });

    group.finish();
}

/// 埋め込みとインデックス作成のスループット
fn benchmark_indexing(c: &mut Criterion) {
    const ROWS: u32 = 2_000;
    let data = generate_workbook(ROWS).unwrap();
    let embedder = HashingEmbedder::default();
    let texts: Vec<String> = (0..500)
        .map(|i| format!("Sheet: Sales | Row_Item: Product {} | Data: Jan={}", i, i))
        .collect();

    let mut group = c.benchmark_group("indexing");
    group.sample_size(10);

    group.throughput(Throughput::Elements(texts.len() as u64));
    group.bench_function("embed_batch_500", |b| {
        b.iter(|| black_box(embedder.embed_batch(black_box(&texts)).unwrap()));
    });

    let dir = tempfile::tempdir().unwrap();
    let coordinator = CoordinatorBuilder::local()
        .with_source_dir(dir.path())
        .build()
        .unwrap();
    let paths = coordinator
        .replace_sources(vec![("sales.xlsx".to_string(), data)])
        .unwrap();

    group.throughput(Throughput::Elements(u64::from(ROWS)));
    group.bench_function("rebuild_2k_rows", |b| {
        b.iter(|| black_box(coordinator.rebuild(black_box(&paths)).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_ingest_workbook,
    benchmark_pipeline,
    benchmark_indexing
);
criterion_main!(benches);
