//! Public API Types
//!
//! 公開APIで使用する列挙型と既定値の定数を定義するモジュール。

use serde::{Deserialize, Serialize};

/// ヘッダー行探索の既定の先読み行数（空行を除く）
pub const DEFAULT_HEADER_WINDOW: usize = 15;

/// 早期終了とみなす連続空行数のしきい値（この値を超えた時点で終了）
pub const DEFAULT_EMPTY_RUN_THRESHOLD: usize = 50;

/// 行ラベルとして扱う列（A列）
pub const LABEL_COLUMN: usize = 0;

/// 既定でスキップするシート名の部分文字列（大文字小文字を区別しない）
pub const DEFAULT_SKIP_SHEET_PATTERNS: [&str; 3] = ["dashboard", "chart", "notes"];

/// ヘッダー行の探索方式
///
/// 先読みした行の中から、列名を含む行を1つ選ぶ方法を指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum HeaderStrategy {
    /// 先読みウィンドウ内で「2文字以上の文字列セル数」が最大の行を選ぶ（デフォルト）
    ///
    /// 同点の場合は先に現れた行を採用します。見出し行はデータ行よりも
    /// 説明的な文字列を多く含む、という経験則に基づきます。
    ///
    /// # 例
    ///
    /// ```text
    /// | Inventory Report |        |        |   <- スコア 1
    /// | Item             | Jan    | Feb    |   <- スコア 3（採用）
    /// | Widget           | 10     | 12     |   <- スコア 1
    /// ```
    #[default]
    ScoredWindow,

    /// 文字列セルを3つ以上含む最初の行を選ぶ
    ///
    /// 該当する行がない場合は先頭行を採用します。
    /// 文字列の長さは考慮しません。
    FirstTextualRow,
}
