//! Streaming Sheet Pipeline Module
//!
//! シート単位のストリーミング処理を実装するモジュール。
//! 先頭の数行だけをバッファしてヘッダーを発見し、残りは1行ずつ分類・意味化します。
//!
//! # 状態遷移
//!
//! ```text
//! BufferingHeader --(W行 or 入力終端)--> [ヘッダー発見・バッファ再生] --> Streaming --> Done
//!        |                                                                  ^
//!        +--(連続空行がしきい値超過)----------------------------------------+
//! Skipped（除外シート。行を一切読まない）
//! ```

use std::collections::VecDeque;
use std::ops::ControlFlow;

use tracing::{debug, info};

use crate::builder::IngestConfig;
use crate::classifier::{classify, RowClass};
use crate::error::SheetSenseError;
use crate::header::{discover_header, HeaderRow};
use crate::semantic::{build_semantic_row, SemanticRow};
use crate::types::RawRow;

/// パイプラインの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetState {
    /// ヘッダー探索のため先頭行をバッファ中
    BufferingHeader,
    /// ヘッダー確定後、1行ずつ処理中
    Streaming,
    /// 終了（入力終端、早期終了、またはヘッダーなし）
    Done,
    /// 除外対象のシート
    Skipped,
}

/// シート処理の統計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetStats {
    /// 読み込んだ行数（空行を含む）
    pub rows_read: usize,
    /// 出力した`SemanticRow`の数
    pub rows_emitted: usize,
    /// ラベルなしで破棄した行数
    pub rows_discarded: usize,
    /// 連続空行により早期終了したかどうか
    pub early_exit: bool,
    /// ヘッダー行の物理行番号
    pub header_row: Option<u32>,
}

/// シート除外判定
///
/// シート名が除外パターンのいずれかを部分文字列として含む場合に`true`を返します
/// （大文字小文字を区別しない）。
pub fn is_skipped_sheet(sheet_name: &str, patterns: &[String]) -> bool {
    let lowered = sheet_name.to_lowercase();
    patterns
        .iter()
        .any(|pattern| lowered.contains(&pattern.to_lowercase()))
}

/// 1シート分のストリーミング処理
///
/// `push`で行を1つずつ受け取り、出力可能になった`SemanticRow`を内部キューに積みます。
/// メモリ使用量はヘッダー探索ウィンドウの大きさ`W`に比例します。
#[derive(Debug)]
pub struct SheetPipeline {
    sheet_name: String,
    header_window: usize,
    empty_run_threshold: usize,
    strategy: crate::api::HeaderStrategy,
    state: SheetState,
    buffer: Vec<RawRow>,
    header: Option<HeaderRow>,
    consecutive_empty: usize,
    ready: VecDeque<SemanticRow>,
    stats: SheetStats,
}

impl SheetPipeline {
    pub(crate) fn new(sheet_name: impl Into<String>, config: &IngestConfig) -> Self {
        let sheet_name = sheet_name.into();
        let state = if is_skipped_sheet(&sheet_name, &config.skip_sheet_patterns) {
            SheetState::Skipped
        } else {
            SheetState::BufferingHeader
        };

        Self {
            sheet_name,
            header_window: config.header_window,
            empty_run_threshold: config.empty_run_threshold,
            strategy: config.header_strategy,
            state,
            buffer: Vec::with_capacity(config.header_window),
            header: None,
            consecutive_empty: 0,
            ready: VecDeque::new(),
            stats: SheetStats::default(),
        }
    }

    /// シート名
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// 現在の状態
    pub fn state(&self) -> SheetState {
        self.state
    }

    /// 確定したヘッダー行
    pub fn header(&self) -> Option<&HeaderRow> {
        self.header.as_ref()
    }

    /// 統計
    pub fn stats(&self) -> &SheetStats {
        &self.stats
    }

    /// 1行を処理する
    ///
    /// # 戻り値
    ///
    /// * `ControlFlow::Continue(())` - 次の行を受け付ける
    /// * `ControlFlow::Break(())` - 終了状態。以降の行を読み込む必要はない
    pub fn push(&mut self, row: RawRow) -> ControlFlow<()> {
        match self.state {
            SheetState::Done | SheetState::Skipped => return ControlFlow::Break(()),
            SheetState::BufferingHeader | SheetState::Streaming => {}
        }

        self.stats.rows_read += 1;

        if row.is_empty() {
            self.consecutive_empty += 1;
            if self.consecutive_empty > self.empty_run_threshold {
                if self.state == SheetState::BufferingHeader {
                    self.resolve_header();
                }
                self.stop_early(row.number);
                return ControlFlow::Break(());
            }
            return ControlFlow::Continue(());
        }
        self.consecutive_empty = 0;

        match self.state {
            SheetState::BufferingHeader => {
                self.buffer.push(row);
                if self.buffer.len() >= self.header_window {
                    self.resolve_header();
                }
            }
            SheetState::Streaming => self.accept(row),
            SheetState::Done | SheetState::Skipped => {}
        }

        if self.state == SheetState::Done {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// 入力終端を通知する
    ///
    /// バッファ中の行があればここでヘッダー探索と再生を行います。
    ///
    /// # 戻り値
    ///
    /// * `Ok(SheetStats)` - 処理が完了した場合（除外シートは空の統計）
    /// * `Err(SheetSenseError::NoHeaderFound)` - 空でない行が1つもなかった場合
    pub fn finish(&mut self) -> Result<SheetStats, SheetSenseError> {
        match self.state {
            SheetState::Skipped => return Ok(self.stats.clone()),
            SheetState::BufferingHeader => self.resolve_header(),
            SheetState::Streaming | SheetState::Done => {}
        }
        self.state = SheetState::Done;

        if self.header.is_none() {
            return Err(SheetSenseError::NoHeaderFound {
                sheet: self.sheet_name.clone(),
            });
        }

        debug!(
            sheet = %self.sheet_name,
            rows_read = self.stats.rows_read,
            rows_emitted = self.stats.rows_emitted,
            rows_discarded = self.stats.rows_discarded,
            "Finished sheet"
        );
        Ok(self.stats.clone())
    }

    /// 出力可能な行を1つ取り出す
    pub fn pop_ready(&mut self) -> Option<SemanticRow> {
        self.ready.pop_front()
    }

    /// 出力可能な行をすべて取り出す
    pub fn drain_ready(&mut self) -> impl Iterator<Item = SemanticRow> + '_ {
        self.ready.drain(..)
    }

    /// バッファからヘッダーを発見し、ヘッダー以降の行を再生する
    fn resolve_header(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);

        let Some(header) = discover_header(&buffer, self.strategy) else {
            debug!(sheet = %self.sheet_name, "No non-empty rows in header window");
            self.state = SheetState::Done;
            return;
        };

        debug!(
            sheet = %self.sheet_name,
            row = header.row_number,
            buffered = buffer.len(),
            headers = ?header.headers,
            "Header row selected"
        );

        let offset = header.header_offset();
        self.stats.header_row = Some(header.row_number);
        self.header = Some(header);
        self.state = SheetState::Streaming;

        for row in buffer.into_iter().skip(offset) {
            self.accept(row);
        }
    }

    /// 空でない1行を分類し、使用可能なら意味化してキューに積む
    fn accept(&mut self, row: RawRow) {
        let Some(header) = &self.header else {
            return;
        };

        match classify(&row.cells) {
            RowClass::Usable => {
                let semantic = build_semantic_row(&self.sheet_name, row.number, &row.cells, header);
                self.ready.push_back(semantic);
                self.stats.rows_emitted += 1;
            }
            RowClass::Unlabeled => self.stats.rows_discarded += 1,
            RowClass::Empty => {}
        }
    }

    fn stop_early(&mut self, row_number: u32) {
        info!(
            sheet = %self.sheet_name,
            row = row_number,
            threshold = self.empty_run_threshold,
            "Early exit after consecutive empty rows"
        );
        self.stats.early_exit = true;
        self.state = SheetState::Done;
    }
}

/// 行イテレーターを`SemanticRow`の遅延イテレーターに変換するアダプター
///
/// `Ingestor::sheet_rows`で生成します。
///
/// # 使用例
///
/// ```rust
/// use sheetsense::{CellValue, IngestorBuilder, RawRow};
///
/// # fn main() -> Result<(), sheetsense::SheetSenseError> {
/// let ingestor = IngestorBuilder::new().build()?;
/// let rows = vec![
///     RawRow::new(1, vec!["Item".into(), "Jan".into(), "Feb".into()]),
///     RawRow::new(2, vec!["Widget".into(), 10.0.into(), CellValue::Empty]),
/// ];
///
/// let docs: Vec<String> = ingestor
///     .sheet_rows("S1", rows)
///     .map(|row| row.document_text())
///     .collect();
/// assert_eq!(docs, vec!["Sheet: S1 | Row_Item: Widget | Data: Jan=10"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SheetRows<I> {
    rows: I,
    pipeline: SheetPipeline,
    outcome: Option<Result<SheetStats, String>>,
}

impl<I> SheetRows<I>
where
    I: Iterator<Item = RawRow>,
{
    pub(crate) fn new(rows: I, pipeline: SheetPipeline) -> Self {
        Self {
            rows,
            pipeline,
            outcome: None,
        }
    }

    /// パイプラインの状態
    pub fn pipeline(&self) -> &SheetPipeline {
        &self.pipeline
    }

    /// 処理結果（イテレーターを最後まで消費した後に`Some`）
    ///
    /// `Err`の場合はヘッダーが見つからなかった理由を保持します。
    pub fn outcome(&self) -> Option<&Result<SheetStats, String>> {
        self.outcome.as_ref()
    }

    fn complete(&mut self) {
        if self.outcome.is_none() {
            self.outcome = Some(self.pipeline.finish().map_err(|e| e.to_string()));
        }
    }
}

impl<I> Iterator for SheetRows<I>
where
    I: Iterator<Item = RawRow>,
{
    type Item = SemanticRow;

    fn next(&mut self) -> Option<SemanticRow> {
        loop {
            if let Some(row) = self.pipeline.pop_ready() {
                return Some(row);
            }
            if self.outcome.is_some() {
                return None;
            }
            if self.pipeline.state() == SheetState::Skipped {
                self.complete();
                continue;
            }

            match self.rows.next() {
                Some(row) => {
                    if self.pipeline.push(row).is_break() {
                        self.complete();
                    }
                }
                None => self.complete(),
            }
        }
    }
}
