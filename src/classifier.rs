//! Row Classifier Module
//!
//! 行を「ラベル付きデータ行」「空行」「ラベルなし行」に分類するモジュール。

use crate::api::LABEL_COLUMN;
use crate::types::CellValue;

/// 行の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClass {
    /// ラベル列が空でなく、データ列にも値がある行
    Usable,
    /// すべてのセルが値なしの行
    Empty,
    /// ラベル列が空、またはデータ列に値がない行（破棄される）
    Unlabeled,
}

/// 行を分類する
///
/// A列（`LABEL_COLUMN`）を行ラベルとみなします。
///
/// # 使用例
///
/// ```rust
/// use sheetsense::{classify, CellValue, RowClass};
///
/// let row = vec![CellValue::from("Widget"), CellValue::from(10.0), CellValue::Empty];
/// assert_eq!(classify(&row), RowClass::Usable);
///
/// let row = vec![CellValue::Empty, CellValue::from(10.0)];
/// assert_eq!(classify(&row), RowClass::Unlabeled);
/// ```
pub fn classify(cells: &[CellValue]) -> RowClass {
    if cells.iter().all(CellValue::is_blank) {
        return RowClass::Empty;
    }

    let has_label = cells
        .get(LABEL_COLUMN)
        .map_or(false, |label| !label.is_blank());
    let has_data = cells
        .iter()
        .enumerate()
        .any(|(column, cell)| column != LABEL_COLUMN && !cell.is_blank());

    if has_label && has_data {
        RowClass::Usable
    } else {
        RowClass::Unlabeled
    }
}
