//! Header Discovery Module
//!
//! シート先頭の限られた行から、列名を含むヘッダー行を1つ選ぶモジュール。

use crate::api::HeaderStrategy;
use crate::types::{CellValue, RawRow};

/// 発見されたヘッダー行
///
/// シートごとに一度だけ選ばれ、以降は変更されません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRow {
    /// 列名（選ばれた行と同じ幅。空セルは`Col_<0始まりの列番号>`）
    pub headers: Vec<String>,
    /// 先読みバッファ内の位置（0始まり）
    pub buffer_index: usize,
    /// シート内の物理行番号（1始まり）
    pub row_number: u32,
}

impl HeaderRow {
    /// ヘッダー行を含めて、ヘッダーまでに消費したバッファ行数
    ///
    /// バッファの再生はこの位置から始まります。
    pub fn header_offset(&self) -> usize {
        self.buffer_index + 1
    }

    /// 列数
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// 列番号に対応する列名（範囲外は`Col_<列番号>`）
    pub fn name_for(&self, column: usize) -> String {
        self.headers
            .get(column)
            .cloned()
            .unwrap_or_else(|| placeholder_name(column))
    }
}

/// 空の列名の代替名
pub(crate) fn placeholder_name(column: usize) -> String {
    format!("Col_{}", column)
}

/// 行のヘッダースコアを計算
///
/// 文字列セルのうち、前後の空白を除去して2文字以上のものの数です。
/// 日付や真偽値などの`CellValue::Formatted`は数えません。
pub fn header_score(cells: &[CellValue]) -> usize {
    cells
        .iter()
        .filter(|cell| match cell {
            CellValue::Text(s) => s.trim().chars().count() >= 2,
            _ => false,
        })
        .count()
}

/// 先読みした行からヘッダー行を選ぶ
///
/// # 引数
///
/// * `rows` - 先読みした空でない行（シート内の順序）
/// * `strategy` - 選択方式
///
/// # 戻り値
///
/// * `Some(HeaderRow)` - ヘッダー行が選ばれた場合
/// * `None` - `rows`が空の場合
pub fn discover_header(rows: &[RawRow], strategy: HeaderStrategy) -> Option<HeaderRow> {
    let index = match strategy {
        HeaderStrategy::ScoredWindow => scored_window(rows)?,
        HeaderStrategy::FirstTextualRow => first_textual_row(rows)?,
    };
    let row = &rows[index];

    Some(HeaderRow {
        headers: header_names(&row.cells),
        buffer_index: index,
        row_number: row.number,
    })
}

fn scored_window(rows: &[RawRow]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, row) in rows.iter().enumerate() {
        let score = header_score(&row.cells);
        // 同点は先に現れた行を優先（厳密な大なり比較）
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

fn first_textual_row(rows: &[RawRow]) -> Option<usize> {
    if rows.is_empty() {
        return None;
    }
    let index = rows
        .iter()
        .position(|row| {
            row.cells
                .iter()
                .filter(|cell| cell.is_text() && !cell.is_blank())
                .count()
                > 2
        })
        .unwrap_or(0);
    Some(index)
}

fn header_names(cells: &[CellValue]) -> Vec<String> {
    cells
        .iter()
        .enumerate()
        .map(|(column, cell)| {
            if cell.is_blank() {
                placeholder_name(column)
            } else {
                cell.render().trim().to_string()
            }
        })
        .collect()
}
