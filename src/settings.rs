//! Settings Module
//!
//! JSON形式の設定ファイルを読み込み、`IngestorBuilder` / `CoordinatorBuilder`に
//! 反映するモジュール。すべての項目に既定値があり、必要な項目だけを記述できます。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::{
    HeaderStrategy, DEFAULT_EMPTY_RUN_THRESHOLD, DEFAULT_HEADER_WINDOW,
    DEFAULT_SKIP_SHEET_PATTERNS,
};
use crate::builder::IngestorBuilder;
use crate::error::SheetSenseError;
use crate::index::{CoordinatorBuilder, DEFAULT_BATCH_SIZE, DEFAULT_TOP_K};
use crate::security::SecurityConfig;

/// 取り込み設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    /// ヘッダー探索の先読み行数
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

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            header_window: DEFAULT_HEADER_WINDOW,
            empty_run_threshold: DEFAULT_EMPTY_RUN_THRESHOLD,
            skip_sheet_patterns: DEFAULT_SKIP_SHEET_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            header_strategy: HeaderStrategy::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// インデックス作成設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSettings {
    /// 1回の埋め込み・書き込みで扱う行数
    pub batch_size: usize,
    /// 検索で取得する件数
    pub top_k: usize,
    /// アップロードされたワークブックの保存先
    pub source_dir: Option<PathBuf>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            top_k: DEFAULT_TOP_K,
            source_dir: None,
        }
    }
}

/// 設定ファイルの内容
///
/// # 使用例
///
/// ```rust
/// use sheetsense::Settings;
///
/// # fn main() -> Result<(), sheetsense::SheetSenseError> {
/// let settings = Settings::from_json_str(r#"{
///     "ingest": { "header_window": 20, "skip_sheet_patterns": ["summary"] },
///     "index": { "batch_size": 250 }
/// }"#)?;
/// assert_eq!(settings.ingest.header_window, 20);
/// assert_eq!(settings.index.top_k, 15);
///
/// let ingestor = settings.ingestor_builder().build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// 取り込み設定
    pub ingest: IngestSettings,
    /// インデックス作成設定
    pub index: IndexSettings,
}

impl Settings {
    /// JSON文字列から読み込む
    ///
    /// # 戻り値
    ///
    /// * `Err(SheetSenseError::Config)` - JSONとして不正、または未知の項目を含む場合
    pub fn from_json_str(json: &str) -> Result<Self, SheetSenseError> {
        serde_json::from_str(json)
            .map_err(|e| SheetSenseError::Config(format!("Invalid settings: {}", e)))
    }

    /// JSONファイルから読み込む
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SheetSenseError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// 取り込み設定を反映した`IngestorBuilder`
    pub fn ingestor_builder(&self) -> IngestorBuilder {
        IngestorBuilder::new()
            .with_header_window(self.ingest.header_window)
            .with_empty_run_threshold(self.ingest.empty_run_threshold)
            .with_skip_sheet_patterns(self.ingest.skip_sheet_patterns.iter().cloned())
            .with_header_strategy(self.ingest.header_strategy)
            .with_security_config(self.ingest.security.clone())
    }

    /// 取り込み設定とインデックス作成設定を`CoordinatorBuilder`に反映する
    ///
    /// # 戻り値
    ///
    /// * `Err(SheetSenseError::Config)` - 取り込み設定の検証に失敗した場合
    pub fn apply_to(
        &self,
        builder: CoordinatorBuilder,
    ) -> Result<CoordinatorBuilder, SheetSenseError> {
        let mut builder = builder
            .with_batch_size(self.index.batch_size)
            .with_top_k(self.index.top_k)
            .with_ingestor(self.ingestor_builder().build()?);
        if let Some(dir) = &self.index.source_dir {
            builder = builder.with_source_dir(dir.clone());
        }
        Ok(builder)
    }
}
