//! Workbook Accessor Module
//!
//! calamineのラッパーとして、シートを「行の並び」として公開するモジュール。
//! XLSX / XLSB はセル単位のストリーミングリーダーで読み込み、シート全体を
//! メモリに展開しません。XLS / ODS はcalamineがレンジ単位でしか読めないため、
//! レンジを取得してから行を順に渡します。

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, DataRef, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::error::SheetSenseError;
use crate::parser::metadata::{inspect_container, is_zip_container};
use crate::security::SecurityConfig;
use crate::types::{CellValue, RawRow};

/// セル単位リーダーから行を組み立てる
///
/// XLSX / XLSB のリーダー型はそれぞれ異なるため、マクロで共通化しています。
macro_rules! stream_cells {
    ($reader:ident, $assembler:ident, $is_1904:expr, $file:expr, $sheet:expr) => {{
        loop {
            let cell = match $reader.next_cell() {
                Ok(Some(cell)) => cell,
                Ok(None) => break,
                Err(e) => return Err(sheet_error($file, $sheet, e)),
            };
            let (row, col) = cell.get_position();
            let value = convert_data_ref(cell.get_value(), $is_1904);
            if $assembler.place(row, col, value).is_break() {
                break;
            }
        }
        $assembler.finish();
    }};
}

/// ワークブック入力
///
/// 1つのワークブックファイルを開き、シート名の列挙と行単位の走査を提供します。
/// ファイルの寿命は`WorkbookSource`が所有し、ドロップ時に閉じられます。
///
/// # 使用例
///
/// ```rust,no_run
/// use std::ops::ControlFlow;
/// use sheetsense::WorkbookSource;
///
/// # fn main() -> Result<(), sheetsense::SheetSenseError> {
/// let mut source = WorkbookSource::open("inventory.xlsx")?;
/// for sheet in source.sheet_names() {
///     source.visit_rows(&sheet, |row| {
///         println!("{}: {} cells", row.number, row.width());
///         ControlFlow::Continue(())
///     })?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct WorkbookSource<RS: Read + Seek> {
    /// ファイル名（エラーメッセージとID生成に使用）
    name: String,
    /// calamineのワークブック
    sheets: Sheets<RS>,
    /// 1904年エポックを使用するかどうか
    is_1904: bool,
}

impl WorkbookSource<BufReader<File>> {
    /// ファイルパスからワークブックを開く（デフォルトのセキュリティ設定）
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SheetSenseError> {
        Self::open_with_config(path, &SecurityConfig::default())
    }

    /// ファイルパスからワークブックを開く
    ///
    /// # 引数
    ///
    /// * `path` - ワークブックのパス（拡張子で形式を判定）
    /// * `config` - 適用するセキュリティ制限
    ///
    /// # 戻り値
    ///
    /// * `Ok(WorkbookSource)` - 読み込みに成功した場合
    /// * `Err(SheetSenseError::SourceUnreadable)` - ファイルが存在しない、または有効なワークブックでない場合
    /// * `Err(SheetSenseError::SecurityViolation)` - セキュリティ制限に違反した場合
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: &SecurityConfig,
    ) -> Result<Self, SheetSenseError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut file = File::open(path).map_err(|e| SheetSenseError::unreadable(&name, e))?;
        let size = file.metadata()?.len();
        config
            .check_input_size(size)
            .map_err(SheetSenseError::SecurityViolation)?;

        // ZIPベースの形式はcalamineに渡す前にコンテナを検査する
        let mut head = Vec::with_capacity(4);
        file.by_ref().take(4).read_to_end(&mut head)?;
        let mut is_1904 = false;
        if is_zip_container(&head) {
            file.seek(SeekFrom::Start(0))?;
            is_1904 = check_container(BufReader::new(file), &name, config)?;
        }

        let sheets = open_workbook_auto(path).map_err(|e| SheetSenseError::unreadable(&name, e))?;

        debug!(file = %name, size, is_1904, "Opened workbook");
        Ok(Self {
            name,
            sheets,
            is_1904,
        })
    }
}

impl WorkbookSource<Cursor<Vec<u8>>> {
    /// リーダーからワークブックを開く（デフォルトのセキュリティ設定）
    ///
    /// 形式はファイル内容から判定します。
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self, SheetSenseError> {
        Self::from_reader_with_config(name, reader, &SecurityConfig::default())
    }

    /// リーダーからワークブックを開く
    ///
    /// 入力全体をメモリに読み込みます（上限は`max_input_file_size`）。
    pub fn from_reader_with_config<R: Read>(
        name: impl Into<String>,
        reader: R,
        config: &SecurityConfig,
    ) -> Result<Self, SheetSenseError> {
        let name = name.into();

        // 上限 + 1バイトまで読み込み、超過を検出する
        let mut buffer = Vec::new();
        reader
            .take(config.max_input_file_size.saturating_add(1))
            .read_to_end(&mut buffer)?;
        config
            .check_input_size(buffer.len() as u64)
            .map_err(SheetSenseError::SecurityViolation)?;

        let is_1904 = if is_zip_container(&buffer) {
            check_container(Cursor::new(buffer.as_slice()), &name, config)?
        } else {
            false
        };

        let sheets = open_workbook_auto_from_rs(Cursor::new(buffer))
            .map_err(|e| SheetSenseError::unreadable(&name, e))?;

        debug!(file = %name, is_1904, "Opened workbook from reader");
        Ok(Self {
            name,
            sheets,
            is_1904,
        })
    }
}

impl<RS: Read + Seek> WorkbookSource<RS> {
    /// ファイル名を取得
    pub fn name(&self) -> &str {
        &self.name
    }

    /// すべてのシート名をワークブック内の順序で取得
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    /// 1904年エポックを使用するかどうか
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// シートの行を先頭から順に訪問する
    ///
    /// `visit`は物理行ごとに1回呼び出されます。ファイル上に存在しない行（空行）も
    /// セルを持たない`RawRow`として渡されるため、`RawRow::number`は常に連番です。
    /// `visit`が`ControlFlow::Break`を返すと、それ以降のセルは読み込まれません。
    ///
    /// # 引数
    ///
    /// * `sheet` - シート名
    /// * `visit` - 行ごとに呼び出されるコールバック
    ///
    /// # 戻り値
    ///
    /// * `Ok(())` - シートの終端まで読み込んだ場合、または`Break`で中断した場合
    /// * `Err(SheetSenseError::SourceUnreadable)` - シートが存在しない、または読み込みに失敗した場合
    pub fn visit_rows<F>(&mut self, sheet: &str, visit: F) -> Result<(), SheetSenseError>
    where
        F: FnMut(RawRow) -> ControlFlow<()>,
    {
        let file = self.name.as_str();
        let is_1904 = self.is_1904;
        let mut assembler = RowAssembler::new(visit);

        match &mut self.sheets {
            Sheets::Xlsx(xlsx) => {
                let mut reader = xlsx
                    .worksheet_cells_reader(sheet)
                    .map_err(|e| sheet_error(file, sheet, e))?;
                stream_cells!(reader, assembler, is_1904, file, sheet);
                return Ok(());
            }
            Sheets::Xlsb(xlsb) => {
                let mut reader = xlsb
                    .worksheet_cells_reader(sheet)
                    .map_err(|e| sheet_error(file, sheet, e))?;
                stream_cells!(reader, assembler, is_1904, file, sheet);
                return Ok(());
            }
            Sheets::Xls(_) | Sheets::Ods(_) => {}
        }

        let range = self
            .sheets
            .worksheet_range(sheet)
            .map_err(|e| sheet_error(file, sheet, e))?;
        replay_range(&range, assembler, is_1904);
        Ok(())
    }
}

/// コンテナを検査し、1904年エポックかどうかを返す
fn check_container<R: Read + Seek>(
    reader: R,
    name: &str,
    config: &SecurityConfig,
) -> Result<bool, SheetSenseError> {
    let container = inspect_container(reader, name, config)?;
    debug!(
        file = %name,
        entries = container.entry_count,
        uncompressed = container.total_uncompressed,
        "Container checks passed"
    );
    Ok(container.is_1904)
}

fn sheet_error(file: &str, sheet: &str, reason: impl ToString) -> SheetSenseError {
    SheetSenseError::unreadable(file, format!("sheet '{}': {}", sheet, reason.to_string()))
}

/// レンジの行を順に渡す（XLS / ODS）
///
/// calamineのレンジは使用範囲に切り詰められているため、`start()`の分だけ
/// 行番号と列位置をずらします。
fn replay_range<F>(range: &Range<Data>, mut assembler: RowAssembler<F>, is_1904: bool)
where
    F: FnMut(RawRow) -> ControlFlow<()>,
{
    let Some((start_row, start_col)) = range.start() else {
        return;
    };

    for (offset, row) in range.rows().enumerate() {
        let mut cells = vec![CellValue::Empty; start_col as usize];
        cells.extend(row.iter().map(|value| convert_data(value, is_1904)));
        if assembler.push_row(start_row + offset as u32, cells).is_break() {
            return;
        }
    }
}

/// セル（行, 列）の並びを行単位の`RawRow`へ組み立てる
///
/// 行の欠番は空行として補完します。`visit`が`Break`を返した後は何も渡しません。
struct RowAssembler<F> {
    visit: F,
    /// 次に渡すべき行（0始まり）
    next_row: u32,
    /// 組み立て中の行（0始まりの行番号とセル）
    pending: Option<(u32, Vec<CellValue>)>,
    stopped: bool,
}

impl<F> RowAssembler<F>
where
    F: FnMut(RawRow) -> ControlFlow<()>,
{
    fn new(visit: F) -> Self {
        Self {
            visit,
            next_row: 0,
            pending: None,
            stopped: false,
        }
    }

    /// 1セルを配置する（行優先順で呼び出されることが前提）
    fn place(&mut self, row: u32, col: u32, value: CellValue) -> ControlFlow<()> {
        if let Some((pending_row, cells)) = &mut self.pending {
            if *pending_row == row {
                put_cell(cells, col as usize, value);
                return ControlFlow::Continue(());
            }
        }

        if let Some((pending_row, cells)) = self.pending.take() {
            if self.push_row(pending_row, cells).is_break() {
                return ControlFlow::Break(());
            }
        }

        let mut cells = Vec::new();
        put_cell(&mut cells, col as usize, value);
        self.pending = Some((row, cells));
        ControlFlow::Continue(())
    }

    /// 完成した1行を渡す（欠番の行は空行として先に渡す）
    fn push_row(&mut self, row: u32, cells: Vec<CellValue>) -> ControlFlow<()> {
        if self.stopped {
            return ControlFlow::Break(());
        }

        while self.next_row < row {
            let gap = self.next_row;
            if self.emit(gap, Vec::new()).is_break() {
                return ControlFlow::Break(());
            }
        }
        self.emit(row, cells)
    }

    fn emit(&mut self, row: u32, cells: Vec<CellValue>) -> ControlFlow<()> {
        self.next_row = row.saturating_add(1);
        let flow = (self.visit)(RawRow::new(row.saturating_add(1), cells));
        if flow.is_break() {
            self.stopped = true;
        }
        flow
    }

    /// 組み立て中の最終行を渡す
    fn finish(mut self) {
        if let Some((row, cells)) = self.pending.take() {
            let _ = self.push_row(row, cells);
        }
    }
}

fn put_cell(cells: &mut Vec<CellValue>, col: usize, value: CellValue) {
    if cells.len() <= col {
        cells.resize(col + 1, CellValue::Empty);
    }
    cells[col] = value;
}

/// calamineのストリーミング値を`CellValue`へ変換
fn convert_data_ref(value: &DataRef<'_>, is_1904: bool) -> CellValue {
    match value {
        DataRef::Int(i) => CellValue::Number(*i as f64),
        DataRef::Float(f) => CellValue::Number(*f),
        DataRef::String(s) => CellValue::Text(s.clone()),
        DataRef::SharedString(s) => CellValue::Text(s.to_string()),
        DataRef::Bool(b) => bool_text(*b),
        DataRef::DateTime(dt) => date_text(dt.as_f64(), is_1904),
        DataRef::DateTimeIso(s) => CellValue::Formatted(s.clone()),
        DataRef::DurationIso(s) => CellValue::Formatted(s.clone()),
        DataRef::Error(e) => CellValue::Formatted(e.to_string()),
        DataRef::Empty => CellValue::Empty,
    }
}

/// calamineのレンジ値を`CellValue`へ変換
fn convert_data(value: &Data, is_1904: bool) -> CellValue {
    match value {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => bool_text(*b),
        Data::DateTime(dt) => date_text(dt.as_f64(), is_1904),
        Data::DateTimeIso(s) => CellValue::Formatted(s.clone()),
        Data::DurationIso(s) => CellValue::Formatted(s.clone()),
        Data::Error(e) => CellValue::Formatted(e.to_string()),
        Data::Empty => CellValue::Empty,
    }
}

fn bool_text(value: bool) -> CellValue {
    CellValue::Formatted(if value { "TRUE" } else { "FALSE" }.to_string())
}

/// Excelのシリアル値で表せる最大日（9999-12-31）
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// 日付セルをテキストへ変換
///
/// 変換できないシリアル値（負数や範囲外）は数値のまま返します。
fn date_text(serial: f64, is_1904: bool) -> CellValue {
    match serial_to_string(serial, is_1904) {
        Some(text) => CellValue::Formatted(text),
        None => CellValue::Number(serial),
    }
}

/// Excelのシリアル日付値を文字列に変換
///
/// # エポックシステム
///
/// - 1900年システム（デフォルト）: 1899年12月30日起算
///   - Excelは1900年を誤ってうるう年として扱うため、シリアル値60未満は1日ずれる
///   - シリアル値1 = 1900年1月1日、シリアル値61 = 1900年3月1日
/// - 1904年システム: 1904年1月1日起算（Mac版Excel）
///
/// 時刻部分が0の場合は`%Y-%m-%d`、それ以外は`%Y-%m-%d %H:%M:%S`で出力します。
pub(crate) fn serial_to_string(serial: f64, is_1904: bool) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }

    let epoch = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };

    let mut days = serial.floor() as i64;
    if !is_1904 && days < 60 {
        days += 1;
    }

    let mut seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    if seconds >= 86_400 {
        days += 1;
        seconds = 0;
    }

    let datetime = epoch
        .checked_add_signed(Duration::days(days))?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::seconds(seconds))?;

    if seconds == 0 {
        Some(datetime.format("%Y-%m-%d").to_string())
    } else {
        Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_assembled(cells: &[(u32, u32, CellValue)], stop_after: Option<usize>) -> Vec<RawRow> {
        let mut rows = Vec::new();
        let mut assembler = RowAssembler::new(|row: RawRow| {
            rows.push(row);
            match stop_after {
                Some(limit) if rows.len() >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        });
        for (row, col, value) in cells {
            if assembler.place(*row, *col, value.clone()).is_break() {
                break;
            }
        }
        assembler.finish();
        rows
    }

    #[test]
    fn test_assembler_fills_gaps() {
        let rows = collect_assembled(
            &[
                (1, 0, "Item".into()),
                (1, 2, "Feb".into()),
                (4, 0, "Widget".into()),
            ],
            None,
        );

        let numbers: Vec<u32> = rows.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(rows[0].is_empty());
        assert_eq!(
            rows[1].cells,
            vec![
                CellValue::Text("Item".to_string()),
                CellValue::Empty,
                CellValue::Text("Feb".to_string())
            ]
        );
        assert!(rows[2].is_empty());
        assert!(rows[3].is_empty());
        assert_eq!(rows[4].cells, vec![CellValue::Text("Widget".to_string())]);
    }

    #[test]
    fn test_assembler_stops_on_break() {
        let rows = collect_assembled(
            &[
                (0, 0, "a".into()),
                (1, 0, "b".into()),
                (2, 0, "c".into()),
                (3, 0, "d".into()),
            ],
            Some(2),
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].number, 2);
    }

    #[test]
    fn test_assembler_stops_inside_gap() {
        let rows = collect_assembled(&[(0, 0, "a".into()), (10, 0, "b".into())], Some(3));
        assert_eq!(rows.len(), 3);
        assert!(rows[2].is_empty());
    }

    #[test]
    fn test_serial_to_string_1900() {
        assert_eq!(serial_to_string(1.0, false).as_deref(), Some("1900-01-01"));
        assert_eq!(serial_to_string(61.0, false).as_deref(), Some("1900-03-01"));
        assert_eq!(serial_to_string(45292.0, false).as_deref(), Some("2024-01-01"));
        assert_eq!(
            serial_to_string(45292.5, false).as_deref(),
            Some("2024-01-01 12:00:00")
        );
    }

    #[test]
    fn test_serial_to_string_1904() {
        assert_eq!(serial_to_string(0.0, true).as_deref(), Some("1904-01-01"));
        assert_eq!(serial_to_string(1.0, true).as_deref(), Some("1904-01-02"));
        assert_eq!(serial_to_string(365.0, true).as_deref(), Some("1904-12-31"));
    }

    #[test]
    fn test_serial_to_string_out_of_range() {
        assert_eq!(serial_to_string(-1.0, false), None);
        assert_eq!(serial_to_string(f64::NAN, false), None);
        assert_eq!(serial_to_string(3_000_000.0, false), None);
        assert_eq!(date_text(-1.0, false), CellValue::Number(-1.0));
    }

    #[test]
    fn test_convert_data() {
        assert_eq!(convert_data(&Data::Int(3), false), CellValue::Number(3.0));
        assert_eq!(convert_data(&Data::Float(2.5), false), CellValue::Number(2.5));
        assert_eq!(
            convert_data(&Data::String("Jan".to_string()), false),
            CellValue::Text("Jan".to_string())
        );
        assert_eq!(
            convert_data(&Data::Bool(true), false),
            CellValue::Formatted("TRUE".to_string())
        );
        assert_eq!(
            convert_data(&Data::Error(calamine::CellErrorType::Div0), false),
            CellValue::Formatted("#DIV/0!".to_string())
        );
        assert_eq!(convert_data(&Data::Empty, false), CellValue::Empty);
        assert!(!convert_data(&Data::Bool(false), false).is_text());
    }

    #[test]
    fn test_date_text_is_not_text_cell() {
        let date = date_text(45292.0, false);
        assert_eq!(date, CellValue::Formatted("2024-01-01".to_string()));
        assert!(!date.is_text());
    }

    #[test]
    fn test_replay_range_offsets() {
        // B3:C4 のみが使用範囲
        let mut range = Range::<Data>::new((2, 1), (3, 2));
        range.set_value((2, 1), Data::String("Item".to_string()));
        range.set_value((2, 2), Data::String("Qty".to_string()));
        range.set_value((3, 1), Data::String("Widget".to_string()));
        range.set_value((3, 2), Data::Float(10.0));

        let mut rows = Vec::new();
        let assembler = RowAssembler::new(|row: RawRow| {
            rows.push(row);
            ControlFlow::Continue(())
        });
        replay_range(&range, assembler, false);

        let numbers: Vec<u32> = rows.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(rows[0].is_empty());
        assert!(rows[1].is_empty());
        assert_eq!(
            rows[2].cells,
            vec![
                CellValue::Empty,
                CellValue::Text("Item".to_string()),
                CellValue::Text("Qty".to_string())
            ]
        );
        assert_eq!(
            rows[3].cells,
            vec![
                CellValue::Empty,
                CellValue::Text("Widget".to_string()),
                CellValue::Number(10.0)
            ]
        );
    }

    #[test]
    fn test_replay_range_stops_on_break() {
        let mut range = Range::<Data>::new((0, 0), (4, 0));
        for row in 0..5 {
            range.set_value((row, 0), Data::Int(i64::from(row)));
        }

        let mut rows = Vec::new();
        let assembler = RowAssembler::new(|row: RawRow| {
            rows.push(row);
            if rows.len() >= 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        replay_range(&range, assembler, false);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cells, vec![CellValue::Number(1.0)]);
    }
}
