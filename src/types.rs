//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use std::fmt;

/// 表計算セルの値
///
/// calamineの多様なセル型を、意味化パイプラインが必要とする4種類に正規化したものです。
/// 真偽値・日付・エラー値は読み込み時に`Formatted`へ変換され、文字列セルとは区別されます。
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 文字列
    Text(String),

    /// 数値（f64）
    Number(f64),

    /// 文字列以外の値を表示用に整形したもの（真偽値・日付・エラー値）
    ///
    /// 文書には`Text`と同じく現れますが、ヘッダー探索では文字列として数えません。
    Formatted(String),

    /// 空セル（セル自体が存在しない場合も含む）
    Empty,
}

impl CellValue {
    /// 値が「値なし」かどうかを判定
    ///
    /// `Empty`と、前後の空白を除去すると空になる`Text`の両方を値なしとみなします。
    /// 分類器と文書生成の双方がこの述語だけを使用します。
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) | CellValue::Formatted(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// 文字列型のセルかどうか
    pub fn is_text(&self) -> bool {
        matches!(self, CellValue::Text(_))
    }

    /// 表示用文字列を取得（文字列はそのまま、数値は`Display`、空は空文字列）
    pub fn render(&self) -> String {
        match self {
            CellValue::Text(s) | CellValue::Formatted(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) | CellValue::Formatted(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// シートから読み出された1行
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// シート内の物理行番号（1始まり、Excelの行番号と一致）
    pub number: u32,

    /// 列順のセル値（A列が先頭）
    pub cells: Vec<CellValue>,
}

impl RawRow {
    /// 新しい行を生成
    pub fn new(number: u32, cells: Vec<CellValue>) -> Self {
        Self { number, cells }
    }

    /// すべてのセルが値なしかどうか
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(CellValue::is_blank)
    }

    /// 行の幅（列数）
    pub fn width(&self) -> usize {
        self.cells.len()
    }
}
