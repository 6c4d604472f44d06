//! Builder Module
//!
//! Fluent Builder APIを提供し、`Ingestor`インスタンスを段階的に構築する。

use std::io::{BufWriter, Read, Seek, Write};
use std::ops::ControlFlow;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{
    HeaderStrategy, DEFAULT_EMPTY_RUN_THRESHOLD, DEFAULT_HEADER_WINDOW,
    DEFAULT_SKIP_SHEET_PATTERNS,
};
use crate::error::SheetSenseError;
use crate::parser::WorkbookSource;
use crate::pipeline::{SheetPipeline, SheetRows, SheetState, SheetStats};
use crate::security::SecurityConfig;
use crate::semantic::{RowMetadata, SemanticRow};
use crate::types::RawRow;

/// 取り込み処理の設定を保持する内部構造体
#[derive(Debug, Clone)]
pub(crate) struct IngestConfig {
    /// ヘッダー探索の先読み行数（空行を除く）
    pub header_window: usize,

    /// 早期終了とみなす連続空行数のしきい値
    pub empty_run_threshold: usize,

    /// 除外するシート名の部分文字列
    pub skip_sheet_patterns: Vec<String>,

    /// ヘッダー行の探索方式
    pub header_strategy: HeaderStrategy,

    /// セキュリティ制限
    pub security: SecurityConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            header_window: DEFAULT_HEADER_WINDOW,
            empty_run_threshold: DEFAULT_EMPTY_RUN_THRESHOLD,
            skip_sheet_patterns: DEFAULT_SKIP_SHEET_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            header_strategy: HeaderStrategy::ScoredWindow,
            security: SecurityConfig::default(),
        }
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `Ingestor`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust
/// use sheetsense::{HeaderStrategy, IngestorBuilder};
///
/// # fn main() -> Result<(), sheetsense::SheetSenseError> {
/// let ingestor = IngestorBuilder::new()
///     .with_header_window(20)
///     .with_header_strategy(HeaderStrategy::FirstTextualRow)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct IngestorBuilder {
    /// 内部設定（構築中）
    config: IngestConfig,
}

impl IngestorBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - ヘッダー探索ウィンドウ: 15行
    /// - 連続空行しきい値: 50行
    /// - 除外シート: `dashboard` / `chart` / `notes` を含む名前
    /// - ヘッダー探索方式: `HeaderStrategy::ScoredWindow`
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
        }
    }

    /// ヘッダー探索の先読み行数を指定する（空行は数えない）
    pub fn with_header_window(mut self, rows: usize) -> Self {
        self.config.header_window = rows;
        self
    }

    /// 早期終了とみなす連続空行数のしきい値を指定する
    ///
    /// 連続空行数がこの値を**超えた**時点でシートの読み込みを終了します。
    pub fn with_empty_run_threshold(mut self, rows: usize) -> Self {
        self.config.empty_run_threshold = rows;
        self
    }

    /// 除外するシート名の部分文字列を指定する（大文字小文字を区別しない）
    ///
    /// # 使用例
    ///
    /// ```rust
    /// use sheetsense::IngestorBuilder;
    ///
    /// let builder = IngestorBuilder::new()
    ///     .with_skip_sheet_patterns(["summary", "pivot"]);
    /// ```
    pub fn with_skip_sheet_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.skip_sheet_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// ヘッダー行の探索方式を指定する
    pub fn with_header_strategy(mut self, strategy: HeaderStrategy) -> Self {
        self.config.header_strategy = strategy;
        self
    }

    /// セキュリティ制限を指定する
    pub fn with_security_config(mut self, security: SecurityConfig) -> Self {
        self.config.security = security;
        self
    }

    /// 設定を検証し、`Ingestor`インスタンスを構築する
    ///
    /// # 発生し得るエラー
    ///
    /// * `SheetSenseError::Config(String)`: 設定の検証に失敗した場合
    ///   * 先読み行数、または連続空行しきい値が0
    ///   * 空文字列の除外パターン（すべてのシートに一致してしまう）
    ///   * セキュリティ制限の値が0
    pub fn build(self) -> Result<Ingestor, SheetSenseError> {
        // 1. ストリーミング設定の検証
        if self.config.header_window == 0 {
            return Err(SheetSenseError::Config(
                "Header window must be at least 1 row".to_string(),
            ));
        }

        if self.config.empty_run_threshold == 0 {
            return Err(SheetSenseError::Config(
                "Empty run threshold must be at least 1 row".to_string(),
            ));
        }

        // 2. 除外パターンの検証
        if let Some(index) = self
            .config
            .skip_sheet_patterns
            .iter()
            .position(|p| p.trim().is_empty())
        {
            return Err(SheetSenseError::Config(format!(
                "Skip sheet pattern #{} is empty",
                index
            )));
        }

        // 3. セキュリティ制限の検証
        let security = &self.config.security;
        if security.max_input_file_size == 0
            || security.max_file_count == 0
            || security.max_file_size == 0
            || security.max_decompressed_size == 0
        {
            return Err(SheetSenseError::Config(
                "Security limits must be greater than zero".to_string(),
            ));
        }

        Ok(Ingestor::new(self.config))
    }
}

/// シートごとの処理結果
#[derive(Debug, Clone, PartialEq)]
pub enum SheetOutcome {
    /// 処理済み
    Processed {
        /// シート名
        sheet: String,
        /// 統計
        stats: SheetStats,
    },
    /// 除外パターンに一致したためスキップ
    Skipped {
        /// シート名
        sheet: String,
    },
    /// 先読みウィンドウ内に空でない行がなかったためスキップ
    NoHeader {
        /// シート名
        sheet: String,
    },
    /// 読み込みに失敗したためスキップ
    Failed {
        /// シート名
        sheet: String,
        /// 失敗理由
        reason: String,
    },
}

impl SheetOutcome {
    /// シート名
    pub fn sheet(&self) -> &str {
        match self {
            SheetOutcome::Processed { sheet, .. }
            | SheetOutcome::Skipped { sheet }
            | SheetOutcome::NoHeader { sheet }
            | SheetOutcome::Failed { sheet, .. } => sheet,
        }
    }
}

/// ワークブック単位の処理結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookSummary {
    /// ファイル名
    pub file: String,
    /// シートごとの結果（ワークブック内の順序）
    pub sheets: Vec<SheetOutcome>,
    /// 出力した`SemanticRow`の総数
    pub rows_emitted: usize,
}

/// JSON Lines出力の1レコード
#[derive(Serialize)]
struct JsonlRecord {
    id: String,
    document: String,
    metadata: RowMetadata,
}

/// 取り込み処理のファサード
///
/// ワークブックの各シートをストリーミングパイプラインに通し、
/// `SemanticRow`をシート順・行順に出力します。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetsense::IngestorBuilder;
///
/// # fn main() -> Result<(), sheetsense::SheetSenseError> {
/// let ingestor = IngestorBuilder::new().build()?;
/// for row in ingestor.collect_path("inventory.xlsx")? {
///     println!("{}", row.document_text());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Ingestor {
    /// 取り込み設定
    config: IngestConfig,
}

impl Ingestor {
    pub(crate) fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// セキュリティ制限
    pub fn security_config(&self) -> &SecurityConfig {
        &self.config.security
    }

    /// ファイルパスからワークブックを開く（この`Ingestor`のセキュリティ制限を適用）
    pub fn open_path<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<WorkbookSource<std::io::BufReader<std::fs::File>>, SheetSenseError> {
        WorkbookSource::open_with_config(path, &self.config.security)
    }

    /// リーダーからワークブックを開く（この`Ingestor`のセキュリティ制限を適用）
    pub fn open_reader<R: Read>(
        &self,
        name: impl Into<String>,
        reader: R,
    ) -> Result<WorkbookSource<std::io::Cursor<Vec<u8>>>, SheetSenseError> {
        WorkbookSource::from_reader_with_config(name, reader, &self.config.security)
    }

    /// 1シート分の行イテレーターを`SemanticRow`の遅延イテレーターに変換する
    ///
    /// シート名が除外パターンに一致する場合、行を1つも読まずに終了します。
    pub fn sheet_rows<I>(&self, sheet_name: &str, rows: I) -> SheetRows<I::IntoIter>
    where
        I: IntoIterator<Item = RawRow>,
    {
        SheetRows::new(rows.into_iter(), SheetPipeline::new(sheet_name, &self.config))
    }

    /// ワークブックの全シートを処理し、`SemanticRow`を1つずつ`sink`に渡す
    ///
    /// # 引数
    ///
    /// * `source` - 開いたワークブック
    /// * `sink` - 行ごとに呼び出されるコールバック
    ///
    /// # 戻り値
    ///
    /// * `Ok(WorkbookSummary)` - シートごとの結果
    /// * `Err(SheetSenseError)` - `sink`がエラーを返した場合（処理はそこで中断）
    ///
    /// # エラー処理
    ///
    /// シート単位の失敗（読み込みエラー、ヘッダーなし）はログに記録され、
    /// 次のシートの処理が継続されます。
    pub fn for_each_row<RS, F>(
        &self,
        source: &mut WorkbookSource<RS>,
        mut sink: F,
    ) -> Result<WorkbookSummary, SheetSenseError>
    where
        RS: Read + Seek,
        F: FnMut(SemanticRow) -> Result<(), SheetSenseError>,
    {
        let mut summary = WorkbookSummary {
            file: source.name().to_string(),
            ..Default::default()
        };

        for sheet in source.sheet_names() {
            let mut pipeline = SheetPipeline::new(sheet.as_str(), &self.config);
            if pipeline.state() == SheetState::Skipped {
                info!(file = %summary.file, sheet = %sheet, "Skipping sheet by name");
                summary.sheets.push(SheetOutcome::Skipped { sheet });
                continue;
            }

            let mut sink_error = None;
            let read = source.visit_rows(&sheet, |row| {
                let flow = pipeline.push(row);
                for semantic in pipeline.drain_ready() {
                    if let Err(e) = sink(semantic) {
                        sink_error = Some(e);
                        return ControlFlow::Break(());
                    }
                }
                flow
            });

            if let Some(e) = sink_error {
                return Err(e);
            }

            if let Err(e) = read {
                warn!(file = %summary.file, sheet = %sheet, error = %e, "Failed to read sheet");
                summary.sheets.push(SheetOutcome::Failed {
                    sheet,
                    reason: e.to_string(),
                });
                continue;
            }

            match pipeline.finish() {
                Ok(stats) => {
                    for semantic in pipeline.drain_ready() {
                        sink(semantic)?;
                    }
                    summary.rows_emitted += stats.rows_emitted;
                    summary.sheets.push(SheetOutcome::Processed { sheet, stats });
                }
                Err(SheetSenseError::NoHeaderFound { .. }) => {
                    warn!(file = %summary.file, sheet = %sheet, "No header row found, skipping sheet");
                    summary.sheets.push(SheetOutcome::NoHeader { sheet });
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            file = %summary.file,
            sheets = summary.sheets.len(),
            rows = summary.rows_emitted,
            "Workbook processed"
        );
        Ok(summary)
    }

    /// ファイルパスのワークブックから全`SemanticRow`を収集する
    pub fn collect_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<SemanticRow>, SheetSenseError> {
        let mut source = self.open_path(path)?;
        self.collect(&mut source)
    }

    /// リーダーのワークブックから全`SemanticRow`を収集する
    pub fn collect_reader<R: Read>(
        &self,
        name: impl Into<String>,
        reader: R,
    ) -> Result<Vec<SemanticRow>, SheetSenseError> {
        let mut source = self.open_reader(name, reader)?;
        self.collect(&mut source)
    }

    fn collect<RS: Read + Seek>(
        &self,
        source: &mut WorkbookSource<RS>,
    ) -> Result<Vec<SemanticRow>, SheetSenseError> {
        let mut rows = Vec::new();
        self.for_each_row(source, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// ワークブックの全`SemanticRow`をJSON Lines形式で書き出す
    ///
    /// 各行は`{"id": ..., "document": ..., "metadata": {...}}`です。
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use std::fs::File;
    /// use sheetsense::IngestorBuilder;
    ///
    /// # fn main() -> Result<(), sheetsense::SheetSenseError> {
    /// let ingestor = IngestorBuilder::new().build()?;
    /// let mut source = ingestor.open_path("inventory.xlsx")?;
    /// let output = File::create("inventory.jsonl")?;
    /// ingestor.write_jsonl(&mut source, output)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn write_jsonl<RS, W>(
        &self,
        source: &mut WorkbookSource<RS>,
        output: W,
    ) -> Result<WorkbookSummary, SheetSenseError>
    where
        RS: Read + Seek,
        W: Write,
    {
        let file = source.name().to_string();
        let mut writer = BufWriter::new(output);

        let summary = self.for_each_row(source, |row| {
            let record = JsonlRecord {
                id: row.store_id(&file),
                document: row.document_text(),
                metadata: row.metadata(),
            };
            serde_json::to_writer(&mut writer, &record).map_err(std::io::Error::from)?;
            writeln!(writer)?;
            Ok(())
        })?;

        writer.flush()?;
        Ok(summary)
    }
}
