//! Index and Search Example
//!
//! This example indexes one or more workbooks with the local embedder and
//! in-memory store, then answers a question against the index.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=sheetsense=debug cargo run --example index_and_search -- \
//!     "How many widgets in January?" inventory.xlsx budget.xlsx
//! ```
//!
//! An optional `SHEETSENSE_SETTINGS` environment variable points to a JSON
//! settings file (`{"ingest": {...}, "index": {...}}`).

use std::path::PathBuf;
use std::process;

use sheetsense::{CoordinatorBuilder, SheetOutcome, SheetSenseError, Settings};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn run(query: &str, files: Vec<PathBuf>) -> Result<(), SheetSenseError> {
    let settings = match std::env::var_os("SHEETSENSE_SETTINGS") {
        Some(path) => Settings::from_json_file(PathBuf::from(path))?,
        None => Settings::default(),
    };
    let coordinator = settings.apply_to(CoordinatorBuilder::local())?.build()?;

    let report = coordinator.rebuild(&files)?;
    for (file, reason) in &report.failed_files {
        eprintln!("Skipped {}: {}", file, reason);
    }
    for workbook in &report.workbooks {
        for outcome in &workbook.sheets {
            match outcome {
                SheetOutcome::Processed { sheet, stats } => println!(
                    "{} / {}: {} rows (header at row {})",
                    workbook.file,
                    sheet,
                    stats.rows_emitted,
                    stats.header_row.unwrap_or_default()
                ),
                other => println!("{} / {}: skipped", workbook.file, other.sheet()),
            }
        }
    }
    println!(
        "Indexed {} rows in {:.2?}\n",
        report.rows_indexed, report.elapsed
    );

    let status = coordinator.status()?;
    if !status.example_queries.is_empty() {
        println!("Try asking:");
        for example in &status.example_queries {
            println!("  - {}", example);
        }
        println!();
    }

    match coordinator.search(query) {
        Ok(result) => {
            println!("{}", result.result);
            Ok(())
        }
        Err(SheetSenseError::IndexEmpty) => {
            println!("Nothing was indexed; no rows to search.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn main() {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(query) = args.next() else {
        eprintln!("Usage: index_and_search <query> <workbook.xlsx>...");
        process::exit(2);
    };
    let files: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if files.is_empty() {
        eprintln!("Error: at least one workbook path is required");
        process::exit(2);
    }

    if let Err(e) = run(&query, files) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
