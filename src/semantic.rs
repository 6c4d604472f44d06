//! Semantic Row Module
//!
//! 分類済みのデータ行とヘッダーから、埋め込み用の文書テキストと
//! メタデータを持つ`SemanticRow`を生成するモジュール。

use serde::{Deserialize, Serialize};

use crate::api::LABEL_COLUMN;
use crate::header::HeaderRow;
use crate::types::CellValue;

/// ラベルが空の場合の代替値
pub const LABEL_PLACEHOLDER: &str = "Unknown";

const SHEET_PREFIX: &str = "Sheet: ";
const ITEM_SEPARATOR: &str = " | Row_Item: ";
const DATA_SEPARATOR: &str = " | Data: ";
const FIELD_SEPARATOR: &str = "; ";

/// 意味化された1行
///
/// 生成後は変更されません。`document_text()`と`metadata()`は
/// 他のフィールドだけから計算される純粋関数です。
///
/// # 使用例
///
/// ```rust
/// use sheetsense::SemanticRow;
///
/// let row = SemanticRow::new(
///     "S1",
///     2,
///     "Widget",
///     vec![("Jan".to_string(), "10".to_string())],
/// );
/// assert_eq!(row.document_text(), "Sheet: S1 | Row_Item: Widget | Data: Jan=10");
/// assert_eq!(row.store_id("stock.xlsx"), "stock.xlsx_S1_2");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticRow {
    sheet_name: String,
    row_index: u32,
    row_label: String,
    fields: Vec<(String, String)>,
}

/// ベクトルストアに保存するメタデータ
///
/// キー名（`sheet` / `row_idx` / `header`）は下流の利用者との契約です。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowMetadata {
    /// シート名
    pub sheet: String,
    /// シート内の物理行番号（1始まり）
    pub row_idx: u32,
    /// 行ラベル（A列の値）
    pub header: String,
}

impl SemanticRow {
    /// 新しい行を生成
    ///
    /// `row_label`が空白のみの場合は`LABEL_PLACEHOLDER`に置き換えます。
    pub fn new(
        sheet_name: impl Into<String>,
        row_index: u32,
        row_label: impl Into<String>,
        fields: Vec<(String, String)>,
    ) -> Self {
        let row_label = row_label.into();
        let row_label = if row_label.trim().is_empty() {
            LABEL_PLACEHOLDER.to_string()
        } else {
            row_label
        };

        Self {
            sheet_name: sheet_name.into(),
            row_index,
            row_label,
            fields,
        }
    }

    /// シート名
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// シート内の物理行番号（1始まり）
    pub fn row_index(&self) -> u32 {
        self.row_index
    }

    /// 行ラベル
    pub fn row_label(&self) -> &str {
        &self.row_label
    }

    /// `(列名, 値)`の並び（列順、空セルを除く）
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// 埋め込み用の文書テキスト
    ///
    /// `"Sheet: {sheet} | Row_Item: {label} | Data: {h1}={v1}; {h2}={v2}"`
    pub fn document_text(&self) -> String {
        let data = self
            .fields
            .iter()
            .map(|(header, value)| format!("{}={}", header, value))
            .collect::<Vec<_>>()
            .join(FIELD_SEPARATOR);

        format!(
            "{}{}{}{}{}{}",
            SHEET_PREFIX, self.sheet_name, ITEM_SEPARATOR, self.row_label, DATA_SEPARATOR, data
        )
    }

    /// ベクトルストア用のメタデータ
    pub fn metadata(&self) -> RowMetadata {
        RowMetadata {
            sheet: self.sheet_name.clone(),
            row_idx: self.row_index,
            header: self.row_label.clone(),
        }
    }

    /// ベクトルストア内の識別子
    pub fn store_id(&self, filename: &str) -> String {
        store_id(filename, &self.sheet_name, self.row_index)
    }
}

/// ベクトルストア内の識別子を生成
///
/// `"{filename}_{シート名の空白を_に置換}_{row_index}"`
/// (ファイル, シート, 行)ごとに一意になります。
pub fn store_id(filename: &str, sheet_name: &str, row_index: u32) -> String {
    format!("{}_{}_{}", filename, sheet_name.replace(' ', "_"), row_index)
}

/// 分類済みのデータ行から`SemanticRow`を生成
///
/// # 引数
///
/// * `sheet_name` - シート名
/// * `row_index` - 物理行番号（1始まり）
/// * `cells` - 行のセル値（A列がラベル）
/// * `header` - シートのヘッダー行
pub fn build_semantic_row(
    sheet_name: &str,
    row_index: u32,
    cells: &[CellValue],
    header: &HeaderRow,
) -> SemanticRow {
    let label = cells
        .get(LABEL_COLUMN)
        .map(|cell| cell.render().trim().to_string())
        .unwrap_or_default();

    let fields = cells
        .iter()
        .enumerate()
        .filter(|(column, cell)| *column != LABEL_COLUMN && !cell.is_blank())
        .map(|(column, cell)| (header.name_for(column), cell.render()))
        .collect();

    SemanticRow::new(sheet_name, row_index, label, fields)
}

/// 文書テキストの先頭部分からシート名と行ラベルを取り出す
///
/// # 戻り値
///
/// * `Some((sheet, label))` - `"Sheet: X | Row_Item: Y | Data: ..."`形式の場合
/// * `None` - 形式が異なる場合
pub fn parse_document_prefix(document: &str) -> Option<(String, String)> {
    let rest = document.strip_prefix(SHEET_PREFIX)?;
    let (sheet, rest) = rest.split_once(ITEM_SEPARATOR)?;
    let (label, _) = rest.split_once(DATA_SEPARATOR)?;
    Some((sheet.to_string(), label.to_string()))
}
