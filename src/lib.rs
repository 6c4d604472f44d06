//! sheetsense - Streaming spreadsheet ingestion and retrieval for RAG systems
//!
//! This crate reads spreadsheet workbooks (XLSX, XLSM, XLSB, XLS, ODS) one row at a
//! time, discovers the header row of each sheet, and turns every data row into a
//! self-describing `SemanticRow` ("Sheet: S1 | Row_Item: Widget | Data: Jan=10")
//! that can be embedded and stored in a vector store for retrieval.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sheetsense::IngestorBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create an ingestor with default settings
//!     let ingestor = IngestorBuilder::new().build()?;
//!
//!     // Stream every semantic row of the workbook
//!     let mut source = ingestor.open_path("inventory.xlsx")?;
//!     let summary = ingestor.for_each_row(&mut source, |row| {
//!         println!("{}", row.document_text());
//!         Ok(())
//!     })?;
//!
//!     println!("{} rows", summary.rows_emitted);
//!     Ok(())
//! }
//! ```
//!
//! # Custom Configuration
//!
//! ```rust,no_run
//! use sheetsense::{HeaderStrategy, IngestorBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ingestor = IngestorBuilder::new()
//!         .with_header_window(20)                              // Look further for the header
//!         .with_empty_run_threshold(100)                       // Tolerate longer empty gaps
//!         .with_skip_sheet_patterns(["summary", "pivot"])      // Ignore these sheets
//!         .with_header_strategy(HeaderStrategy::FirstTextualRow)
//!         .build()?;
//!
//!     for row in ingestor.collect_path("budget.xlsx")? {
//!         println!("{:?}", row.metadata());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Indexing and Search
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use sheetsense::CoordinatorBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Local embedder, in-memory store and extractive answers
//!     let coordinator = CoordinatorBuilder::local().build()?;
//!
//!     coordinator.rebuild(&[PathBuf::from("inventory.xlsx")])?;
//!
//!     let result = coordinator.search("How many widgets in January?")?;
//!     println!("{}", result.result);
//!     for item in result.context {
//!         println!("[{}] {}", item.sheet, item.snippet);
//!     }
//!     Ok(())
//! }
//! ```

mod api;
mod builder;
mod classifier;
mod error;
mod header;
mod index;
mod parser;
mod pipeline;
mod security;
mod semantic;
mod settings;
mod types;

// 公開API
pub use api::{
    HeaderStrategy, DEFAULT_EMPTY_RUN_THRESHOLD, DEFAULT_HEADER_WINDOW,
    DEFAULT_SKIP_SHEET_PATTERNS, LABEL_COLUMN,
};
pub use builder::{Ingestor, IngestorBuilder, SheetOutcome, WorkbookSummary};
pub use classifier::{classify, RowClass};
pub use error::SheetSenseError;
pub use header::{discover_header, header_score, HeaderRow};
pub use index::{
    build_prompt, ContextEntry, ContextItem, CoordinatorBuilder, EmbeddingBackend,
    ExtractiveSynthesizer, HashingEmbedder, InMemoryVectorStore, IndexReport, IndexState,
    IndexStatus, IndexingCoordinator, JobPhase, ProgressSnapshot, Prompt, SearchResult,
    SourceDirectory, SourceFile, StoredHit, Synthesizer, VectorStore, DEFAULT_BATCH_SIZE,
    DEFAULT_DIMENSIONS, DEFAULT_TOP_K, SYSTEM_INSTRUCTION,
};
pub use parser::WorkbookSource;
pub use pipeline::{is_skipped_sheet, SheetPipeline, SheetRows, SheetState, SheetStats};
pub use security::SecurityConfig;
pub use semantic::{
    build_semantic_row, parse_document_prefix, store_id, RowMetadata, SemanticRow,
    LABEL_PLACEHOLDER,
};
pub use settings::{IndexSettings, IngestSettings, Settings};
pub use types::{CellValue, RawRow};
