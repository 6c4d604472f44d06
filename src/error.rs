//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use thiserror::Error;

/// sheetsenseクレート全体で使用するエラー型
///
/// ワークブックの読み込み、行の意味化、埋め込み、ベクトルストアへの書き込みまで、
/// パイプライン全体のエラーを統一的に扱います。
///
/// # エラーの扱い
///
/// - ファイル単位: `SourceUnreadable` / `SecurityViolation` はそのファイルのみ失敗し、
///   他のファイルの処理は継続します。
/// - シート単位: `NoHeaderFound` はシートをスキップし、ワークブックの処理は継続します。
/// - ジョブ単位: `EmbeddingBackend` / `Store` はインデックス作成ジョブ全体を中断します。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetsense::{IngestorBuilder, SheetSenseError};
///
/// # fn main() -> Result<(), SheetSenseError> {
/// let ingestor = IngestorBuilder::new().build()?;
/// match ingestor.collect_path("missing.xlsx") {
///     Err(SheetSenseError::SourceUnreadable { file, reason }) => {
///         eprintln!("{} を読み込めません: {}", file, reason);
///     }
///     other => {
///         other?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum SheetSenseError {
    /// I/O操作中に発生したエラー
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ファイルが存在しない、または有効なワークブックコンテナではない
    ///
    /// そのファイル全体が失敗します（部分的な復旧は行いません）。
    #[error("Cannot read workbook '{file}': {reason}")]
    SourceUnreadable {
        /// ファイル名または入力の識別子
        file: String,
        /// 失敗理由（calamine / zip 由来のメッセージ）
        reason: String,
    },

    /// 先読みウィンドウ内に空でない行が存在しない
    ///
    /// 致命的ではありません。呼び出し側はシートをスキップします。
    #[error("No header row found in sheet '{sheet}'")]
    NoHeaderFound {
        /// 対象シート名
        sheet: String,
    },

    /// 埋め込みバックエンドの呼び出しに失敗した
    ///
    /// バッチ全体が失敗として扱われ、インデックス作成ジョブは中断されます。
    #[error("Embedding backend error: {0}")]
    EmbeddingBackend(String),

    /// ベクトルストアへの書き込み・問い合わせに失敗した
    #[error("Vector store error: {0}")]
    Store(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb、パストラバーサル、ファイルサイズ制限などに違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// 設定の検証に失敗したエラー
    ///
    /// `IngestorBuilder::build()` / `CoordinatorBuilder::build()` 時に発生します。
    #[error("Configuration error: {0}")]
    Config(String),

    /// 別のインデックス作成ジョブが実行中
    #[error("An indexing job is already running")]
    JobInProgress,

    /// インデックスが空のため検索できない
    #[error("Index empty")]
    IndexEmpty,

    /// 保存先として安全でないファイル名
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}

impl SheetSenseError {
    /// ファイル単位で回復可能なエラーかどうか
    ///
    /// `true`の場合、インデックス作成は次のファイルへ進みます。
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            SheetSenseError::SourceUnreadable { .. }
                | SheetSenseError::SecurityViolation(_)
                | SheetSenseError::Io(_)
        )
    }

    pub(crate) fn unreadable(file: impl Into<String>, reason: impl ToString) -> Self {
        SheetSenseError::SourceUnreadable {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}
