//! Indexing Module
//!
//! `SemanticRow`をバッチ単位で埋め込み、ベクトルストアに書き込む
//! インデックス作成コーディネーターと、その協調者（埋め込み・ストア・回答生成）の
//! トレイトを定義するモジュール。

mod hashing;
mod memory;
mod progress;
mod source_dir;
mod synth;

pub use hashing::{HashingEmbedder, DEFAULT_DIMENSIONS};
pub use memory::InMemoryVectorStore;
pub use progress::{JobPhase, ProgressSnapshot};
pub use source_dir::{SourceDirectory, SourceFile};
pub use synth::{build_prompt, ExtractiveSynthesizer, Prompt, SYSTEM_INSTRUCTION};

use std::collections::HashSet;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::builder::{Ingestor, IngestorBuilder, WorkbookSummary};
use crate::error::SheetSenseError;
use crate::semantic::{RowMetadata, SemanticRow};
use progress::ProgressTracker;

/// 既定のバッチサイズ
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// 既定の検索件数
pub const DEFAULT_TOP_K: usize = 15;

/// 例示クエリの生成に使用するメタデータの件数
const EXAMPLE_QUERY_SAMPLE: usize = 10;

/// 例示クエリの最大数
const MAX_EXAMPLE_QUERIES: usize = 5;

/// 合成に失敗した場合の回答文
const SYNTHESIS_FAILED: &str = "Error generating response.";

/// 埋め込みバックエンド
///
/// 実装は入力と同じ長さ・同じ順序のベクトルを返す必要があります。
/// 失敗はバッチ全体の失敗として扱われます。
pub trait EmbeddingBackend: Send + Sync {
    /// テキストのバッチを埋め込む
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SheetSenseError>;
}

/// ベクトルストア
///
/// ストアはコーディネーターだけが変更します。
pub trait VectorStore: Send {
    /// エントリを追加する（4つの列は同じ長さ）
    fn add(
        &mut self,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<RowMetadata>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), SheetSenseError>;

    /// 類似度の高い順に最大`k`件を返す
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<StoredHit>, SheetSenseError>;

    /// エントリ数
    fn count(&self) -> Result<usize, SheetSenseError>;

    /// すべてのエントリを削除する
    fn reset(&mut self) -> Result<(), SheetSenseError>;

    /// 先頭から最大`limit`件のメタデータを返す
    fn peek(&self, limit: usize) -> Result<Vec<RowMetadata>, SheetSenseError>;
}

/// 回答生成
pub trait Synthesizer: Send + Sync {
    /// 質問と検索結果から回答文を生成する
    fn answer(&self, query: &str, context: &[ContextEntry]) -> Result<String, SheetSenseError>;
}

/// ストアの検索結果1件
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    /// エントリID
    pub id: String,
    /// 文書テキスト
    pub document: String,
    /// メタデータ
    pub metadata: RowMetadata,
    /// 類似度
    pub score: f32,
}

/// 回答生成に渡す文脈1件
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    /// 文書テキスト
    pub document: String,
    /// メタデータ
    pub metadata: RowMetadata,
}

/// 検索結果に添える文脈
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextItem {
    /// シート名
    pub sheet: String,
    /// 行ラベル
    pub metric: String,
    /// 文書テキスト
    pub snippet: String,
}

/// 検索結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// 質問
    pub query: String,
    /// 回答文
    pub result: String,
    /// 回答の根拠となった文脈（類似度順）
    pub context: Vec<ContextItem>,
}

/// インデックスの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// インデックス作成中
    Indexing,
    /// 待機中
    Ok,
}

/// インデックスの状態レポート
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    /// 状態
    pub status: IndexState,
    /// ストアのエントリ数
    pub indexed_concepts: usize,
    /// 進捗メッセージ
    pub message: String,
    /// 例示クエリ（待機中かつ空でない場合のみ）
    pub example_queries: Vec<String>,
}

/// インデックス作成ジョブの結果
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// 処理したワークブック
    pub workbooks: Vec<WorkbookSummary>,
    /// 読み込めなかったファイルと理由
    pub failed_files: Vec<(String, String)>,
    /// ストアに書き込んだ行数
    pub rows_indexed: usize,
    /// 所要時間
    pub elapsed: Duration,
}

/// `IndexingCoordinator`を構築するためのビルダー
///
/// # 使用例
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sheetsense::{
///     CoordinatorBuilder, ExtractiveSynthesizer, HashingEmbedder, InMemoryVectorStore,
/// };
///
/// # fn main() -> Result<(), sheetsense::SheetSenseError> {
/// let coordinator = CoordinatorBuilder::new(
///     Arc::new(HashingEmbedder::default()),
///     Box::new(InMemoryVectorStore::new()),
///     Arc::new(ExtractiveSynthesizer),
/// )
/// .with_batch_size(200)
/// .with_top_k(10)
/// .with_source_dir("./data")
/// .build()?;
/// # Ok(())
/// # }
/// ```
pub struct CoordinatorBuilder {
    embedder: Arc<dyn EmbeddingBackend>,
    store: Box<dyn VectorStore>,
    synthesizer: Arc<dyn Synthesizer>,
    batch_size: usize,
    top_k: usize,
    source_dir: Option<PathBuf>,
    ingestor: Option<Ingestor>,
}

impl CoordinatorBuilder {
    /// 協調者を指定してビルダーを生成
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        store: Box<dyn VectorStore>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            embedder,
            store,
            synthesizer,
            batch_size: DEFAULT_BATCH_SIZE,
            top_k: DEFAULT_TOP_K,
            source_dir: None,
            ingestor: None,
        }
    }

    /// ローカルの協調者（`HashingEmbedder` / `InMemoryVectorStore` / `ExtractiveSynthesizer`）でビルダーを生成
    pub fn local() -> Self {
        Self::new(
            Arc::new(HashingEmbedder::default()),
            Box::new(InMemoryVectorStore::new()),
            Arc::new(ExtractiveSynthesizer),
        )
    }

    /// 1回の埋め込み・書き込みで扱う行数を設定
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    /// 検索で取得する件数を設定
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// アップロードされたワークブックの保存先を設定
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// ワークブックの取り込みに使用する`Ingestor`を設定
    pub fn with_ingestor(mut self, ingestor: Ingestor) -> Self {
        self.ingestor = Some(ingestor);
        self
    }

    /// コーディネーターを構築
    ///
    /// # 戻り値
    ///
    /// * `Ok(IndexingCoordinator)` - 構築に成功した場合
    /// * `Err(SheetSenseError::Config)` - バッチサイズまたは検索件数が0の場合
    /// * `Err(SheetSenseError::Io)` - 保存先ディレクトリを作成できない場合
    pub fn build(self) -> Result<IndexingCoordinator, SheetSenseError> {
        if self.batch_size == 0 {
            return Err(SheetSenseError::Config(
                "Batch size must be at least 1".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(SheetSenseError::Config(
                "Top-k must be at least 1".to_string(),
            ));
        }

        let sources = self.source_dir.map(SourceDirectory::new).transpose()?;
        let ingestor = match self.ingestor {
            Some(ingestor) => ingestor,
            None => IngestorBuilder::new().build()?,
        };

        Ok(IndexingCoordinator {
            ingestor,
            embedder: self.embedder,
            store: Mutex::new(self.store),
            synthesizer: self.synthesizer,
            sources,
            progress: ProgressTracker::default(),
            running: Arc::new(AtomicBool::new(false)),
            batch_size: self.batch_size,
            top_k: self.top_k,
        })
    }
}

/// 実行中ジョブの占有権（ドロップ時に解放）
struct JobGuard {
    running: Arc<AtomicBool>,
}

impl JobGuard {
    fn acquire(running: &Arc<AtomicBool>) -> Result<Self, SheetSenseError> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SheetSenseError::JobInProgress)?;
        Ok(Self {
            running: Arc::clone(running),
        })
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// 埋め込み待ちの行
#[derive(Default)]
struct PendingBatch {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<RowMetadata>,
}

impl PendingBatch {
    fn push(&mut self, file: &str, row: &SemanticRow) {
        self.ids.push(row.store_id(file));
        self.documents.push(row.document_text());
        self.metadatas.push(row.metadata());
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// インデックス作成コーディネーター
///
/// ワークブックを順に取り込み、`SemanticRow`をバッチ単位で埋め込んで
/// ベクトルストアに書き込みます。同時に実行できるジョブは1つだけです。
///
/// # 使用例
///
/// ```rust,no_run
/// use std::path::PathBuf;
/// use sheetsense::CoordinatorBuilder;
///
/// # fn main() -> Result<(), sheetsense::SheetSenseError> {
/// let coordinator = CoordinatorBuilder::local().build()?;
/// coordinator.rebuild(&[PathBuf::from("inventory.xlsx")])?;
///
/// let result = coordinator.search("How many widgets in January?")?;
/// println!("{}", result.result);
/// # Ok(())
/// # }
/// ```
pub struct IndexingCoordinator {
    ingestor: Ingestor,
    embedder: Arc<dyn EmbeddingBackend>,
    store: Mutex<Box<dyn VectorStore>>,
    synthesizer: Arc<dyn Synthesizer>,
    sources: Option<SourceDirectory>,
    progress: ProgressTracker,
    running: Arc<AtomicBool>,
    batch_size: usize,
    top_k: usize,
}

impl IndexingCoordinator {
    /// 現在の進捗
    pub fn progress(&self) -> Arc<ProgressSnapshot> {
        self.progress.snapshot()
    }

    /// ジョブ実行中かどうか
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// ワークブックの保存先
    pub fn source_directory(&self) -> Option<&SourceDirectory> {
        self.sources.as_ref()
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, Box<dyn VectorStore>>, SheetSenseError> {
        self.store
            .lock()
            .map_err(|_| SheetSenseError::Store("Vector store lock poisoned".to_string()))
    }

    fn require_sources(&self) -> Result<&SourceDirectory, SheetSenseError> {
        self.sources.as_ref().ok_or_else(|| {
            SheetSenseError::Config("No source directory configured".to_string())
        })
    }

    /// インデックスを作り直す（呼び出しスレッドで実行）
    ///
    /// ストアを空にしてから、`files`を順に取り込みます。
    ///
    /// # 引数
    ///
    /// * `files` - 取り込むワークブックのパス
    ///
    /// # 戻り値
    ///
    /// * `Ok(IndexReport)` - ジョブが完了した場合（一部のファイルが読み込めなかった場合も含む）
    /// * `Err(SheetSenseError::JobInProgress)` - 別のジョブが実行中の場合
    /// * `Err(SheetSenseError::EmbeddingBackend | Store)` - ジョブが中断された場合（ストアは空）
    pub fn rebuild(&self, files: &[PathBuf]) -> Result<IndexReport, SheetSenseError> {
        let _guard = JobGuard::acquire(&self.running)?;
        self.run_job(files)
    }

    /// インデックスの作り直しをバックグラウンドスレッドで開始する
    ///
    /// 別のジョブが実行中の場合は、スレッドを起動せずに`JobInProgress`を返します。
    /// 進捗は`progress()` / `status()`で確認できます。
    pub fn spawn_rebuild(
        self: &Arc<Self>,
        files: Vec<PathBuf>,
    ) -> Result<JoinHandle<Result<IndexReport, SheetSenseError>>, SheetSenseError> {
        let guard = JobGuard::acquire(&self.running)?;
        // 起動前に実行中の状態を公開する
        self.progress.start(files.len());

        let coordinator = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("sheetsense-indexer".to_string())
            .spawn(move || {
                let _guard = guard;
                coordinator.run_job(&files)
            });
        self.check_spawned(spawned)
    }

    /// スレッドを起動できなかった場合、公開済みの実行中状態を失敗に戻す
    ///
    /// ジョブガードはクロージャと一緒に破棄されるため、次のジョブは開始できます。
    fn check_spawned<T>(&self, spawned: std::io::Result<T>) -> Result<T, SheetSenseError> {
        spawned.map_err(|e| {
            error!(error = %e, "Failed to start indexing thread");
            self.progress.fail(&e.to_string());
            SheetSenseError::from(e)
        })
    }

    /// 保存済みのワークブックでインデックスを作り直す
    pub fn rebuild_from_sources(&self) -> Result<IndexReport, SheetSenseError> {
        let files = self.require_sources()?.paths()?;
        self.rebuild(&files)
    }

    /// ワークブックの集合を置き換える
    ///
    /// インデックスと既存の保存ファイルをすべて削除してから、`files`を保存します。
    /// インデックスの作り直しは行いません。
    ///
    /// # 戻り値
    ///
    /// * `Ok(Vec<PathBuf>)` - 保存したファイルのパス（`rebuild` / `spawn_rebuild`に渡せます）
    /// * `Err(SheetSenseError::InvalidFileName)` - 安全でないファイル名が含まれる場合（何も削除しません）
    /// * `Err(SheetSenseError::JobInProgress)` - ジョブが実行中の場合
    pub fn replace_sources(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<PathBuf>, SheetSenseError> {
        let sources = self.require_sources()?;
        for (name, _) in &files {
            crate::security::validate_file_name(name).map_err(SheetSenseError::InvalidFileName)?;
        }

        let _guard = JobGuard::acquire(&self.running)?;
        self.clear_all()?;

        let mut paths = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            paths.push(sources.store(&name, &bytes)?);
        }
        info!(files = paths.len(), "Replaced source workbooks");
        Ok(paths)
    }

    /// 進捗・インデックス・保存ファイルをすべて初期化する
    pub fn reset_all(&self) -> Result<(), SheetSenseError> {
        let _guard = JobGuard::acquire(&self.running)?;
        self.clear_all()
    }

    fn clear_all(&self) -> Result<(), SheetSenseError> {
        self.progress.reset();
        self.lock_store()?.reset()?;
        if let Some(sources) = &self.sources {
            let removed = sources.clear()?;
            debug!(removed, "Cleared source directory");
        }
        info!("Index reset");
        Ok(())
    }

    /// 保存済みのワークブック一覧
    pub fn list_sources(&self) -> Result<Vec<SourceFile>, SheetSenseError> {
        self.require_sources()?.list()
    }

    /// 保存済みのワークブックの内容
    pub fn read_source(&self, name: &str) -> Result<Vec<u8>, SheetSenseError> {
        self.require_sources()?.read(name)
    }

    fn run_job(&self, files: &[PathBuf]) -> Result<IndexReport, SheetSenseError> {
        let started = Instant::now();
        self.progress.start(files.len());
        info!(files = files.len(), "Indexing started");

        match self.index_files(files) {
            Ok(mut report) => {
                report.elapsed = started.elapsed();
                let seconds = report.elapsed.as_secs_f64();
                let rows_per_sec = if seconds > 0.0 {
                    report.rows_indexed as f64 / seconds
                } else {
                    0.0
                };
                self.progress.complete(seconds);
                info!(
                    rows = report.rows_indexed,
                    seconds,
                    rows_per_sec,
                    failed_files = report.failed_files.len(),
                    "Indexing complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Indexing failed, clearing index");
                match self.lock_store() {
                    Ok(mut store) => {
                        if let Err(reset_error) = store.reset() {
                            warn!(error = %reset_error, "Failed to clear index after failure");
                        }
                    }
                    Err(lock_error) => {
                        warn!(error = %lock_error, "Failed to clear index after failure")
                    }
                }
                self.progress.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn index_files(&self, files: &[PathBuf]) -> Result<IndexReport, SheetSenseError> {
        self.lock_store()?.reset()?;

        let mut report = IndexReport::default();
        for path in files {
            let file = display_name(path);
            self.progress.begin_file(&file);

            let mut source = match self.ingestor.open_path(path) {
                Ok(source) => source,
                Err(e) if e.is_per_file() => {
                    warn!(file = %file, error = %e, "Skipping unreadable workbook");
                    report.failed_files.push((file, e.to_string()));
                    self.progress.end_file();
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut batch = PendingBatch::default();
            let mut indexed = 0;
            let summary = self.ingestor.for_each_row(&mut source, |row| {
                batch.push(&file, &row);
                if batch.len() >= self.batch_size {
                    indexed += self.flush(&mut batch)?;
                }
                Ok(())
            })?;
            indexed += self.flush(&mut batch)?;

            debug!(file = %file, rows = indexed, "Workbook indexed");
            report.rows_indexed += indexed;
            report.workbooks.push(summary);
            self.progress.end_file();
        }
        Ok(report)
    }

    /// バッチを埋め込んでストアに書き込む
    fn flush(&self, batch: &mut PendingBatch) -> Result<usize, SheetSenseError> {
        let rows = batch.len();
        if rows == 0 {
            return Ok(0);
        }
        let PendingBatch {
            ids,
            documents,
            metadatas,
        } = mem::take(batch);

        let embed_started = Instant::now();
        let embeddings = self.embedder.embed_batch(&documents)?;
        let embed_elapsed = embed_started.elapsed();
        if embeddings.len() != rows {
            return Err(SheetSenseError::EmbeddingBackend(format!(
                "Expected {} embeddings, got {}",
                rows,
                embeddings.len()
            )));
        }

        let store_started = Instant::now();
        self.lock_store()?.add(ids, documents, metadatas, embeddings)?;
        let store_elapsed = store_started.elapsed();

        self.progress.add_rows(rows);
        debug!(
            rows,
            embed_ms = embed_elapsed.as_millis() as u64,
            store_ms = store_elapsed.as_millis() as u64,
            "Batch indexed"
        );
        Ok(rows)
    }

    /// 自然文の質問でインデックスを検索し、回答を生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(SearchResult)` - 回答と根拠の文脈。回答生成に失敗した場合、回答文は
    ///   `"Error generating response."`になります
    /// * `Err(SheetSenseError::IndexEmpty)` - インデックスが空の場合
    pub fn search(&self, query: &str) -> Result<SearchResult, SheetSenseError> {
        if self.lock_store()?.count()? == 0 {
            return Err(SheetSenseError::IndexEmpty);
        }

        let embedding = self
            .embedder
            .embed_batch(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SheetSenseError::EmbeddingBackend("No embedding returned for query".to_string())
            })?;
        let hits = self.lock_store()?.query(&embedding, self.top_k)?;
        debug!(query, hits = hits.len(), "Retrieved context");

        let context: Vec<ContextEntry> = hits
            .into_iter()
            .map(|hit| ContextEntry {
                document: hit.document,
                metadata: hit.metadata,
            })
            .collect();

        let result = match self.synthesizer.answer(query, &context) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(query, error = %e, "Answer synthesis failed");
                SYNTHESIS_FAILED.to_string()
            }
        };

        Ok(SearchResult {
            query: query.to_string(),
            result,
            context: context
                .into_iter()
                .map(|entry| ContextItem {
                    sheet: entry.metadata.sheet,
                    metric: entry.metadata.header,
                    snippet: entry.document,
                })
                .collect(),
        })
    }

    /// インデックスの状態
    pub fn status(&self) -> Result<IndexStatus, SheetSenseError> {
        let snapshot = self.progress.snapshot();
        let indexed_concepts = self.lock_store()?.count()?;
        let indexing = snapshot.is_indexing();

        let example_queries = if !indexing && indexed_concepts > 0 {
            self.example_queries()?
        } else {
            Vec::new()
        };

        Ok(IndexStatus {
            status: if indexing {
                IndexState::Indexing
            } else {
                IndexState::Ok
            },
            indexed_concepts,
            message: snapshot.message.clone(),
            example_queries,
        })
    }

    /// ストア先頭のメタデータから例示クエリを生成する
    pub fn example_queries(&self) -> Result<Vec<String>, SheetSenseError> {
        let sample = self.lock_store()?.peek(EXAMPLE_QUERY_SAMPLE)?;
        Ok(example_queries_from(&sample))
    }
}

fn example_queries_from(sample: &[RowMetadata]) -> Vec<String> {
    let mut seen = HashSet::new();
    sample
        .iter()
        .filter(|meta| seen.insert((meta.header.as_str(), meta.sheet.as_str())))
        .take(MAX_EXAMPLE_QUERIES)
        .map(|meta| format!("What is the {} in {}?", meta.header, meta.sheet))
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
