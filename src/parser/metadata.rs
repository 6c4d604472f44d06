//! Container Metadata Module
//!
//! ZIPベースのワークブック（XLSX / XLSB / ODS）をcalamineで開く前に、
//! コンテナを直接検査するモジュール。
//! セキュリティ制限の適用と、calamineでは取得できない1904年エポック判定を行います。

use std::io::{Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::SheetSenseError;
use crate::security::{validate_zip_path, SecurityConfig};

/// ZIPファイルのシグネチャ（`PK\x03\x04`）
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// コンテナ検査の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ContainerMetadata {
    /// 1904年エポックを使用するかどうか
    pub is_1904: bool,
    /// アーカイブ内のエントリ数
    pub entry_count: usize,
    /// 展開後サイズの合計（バイト）
    pub total_uncompressed: u64,
}

/// 先頭バイトがZIPシグネチャかどうかを判定
///
/// 旧形式のXLS（OLE複合文書）はZIPではないため、検査対象外になります。
pub(crate) fn is_zip_container(head: &[u8]) -> bool {
    head.len() >= ZIP_MAGIC.len() && head[..ZIP_MAGIC.len()] == ZIP_MAGIC
}

/// ZIPコンテナを検査する
///
/// # 引数
///
/// * `reader` - ZIPアーカイブを読み込むためのリーダー
/// * `config` - 適用するセキュリティ制限
///
/// # 戻り値
///
/// * `Ok(ContainerMetadata)` - 検査に合格した場合
/// * `Err(SheetSenseError::SecurityViolation)` - 制限に違反した場合
/// * `Err(SheetSenseError::SourceUnreadable)` - ZIPとして読み込めない場合
pub(crate) fn inspect_container<R: Read + Seek>(
    reader: R,
    file: &str,
    config: &SecurityConfig,
) -> Result<ContainerMetadata, SheetSenseError> {
    let mut archive = ZipArchive::new(reader).map_err(|e| SheetSenseError::unreadable(file, e))?;

    // セキュリティチェック: ファイル数の上限
    if archive.len() > config.max_file_count {
        return Err(SheetSenseError::SecurityViolation(format!(
            "ZIP archive contains too many files: {} (max: {})",
            archive.len(),
            config.max_file_count
        )));
    }

    let mut total_uncompressed = 0u64;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| SheetSenseError::unreadable(file, e))?;

        let entry_name = entry.name();
        validate_zip_path(entry_name).map_err(|e| {
            SheetSenseError::SecurityViolation(format!("Invalid ZIP path: {}", e))
        })?;

        let entry_size = entry.size();
        if entry_size > config.max_file_size {
            return Err(SheetSenseError::SecurityViolation(format!(
                "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                entry_name, entry_size, config.max_file_size
            )));
        }

        total_uncompressed = total_uncompressed.checked_add(entry_size).ok_or_else(|| {
            SheetSenseError::SecurityViolation(
                "Total decompressed size calculation overflow".to_string(),
            )
        })?;

        if total_uncompressed > config.max_decompressed_size {
            return Err(SheetSenseError::SecurityViolation(format!(
                "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                total_uncompressed, config.max_decompressed_size
            )));
        }
    }

    let is_1904 = read_date1904(&mut archive, file)?;

    Ok(ContainerMetadata {
        is_1904,
        entry_count: archive.len(),
        total_uncompressed,
    })
}

/// xl/workbook.xml から `workbookPr/@date1904` を読み取る
///
/// workbook.xmlが存在しない場合（ODSなど）は1900年エポックとみなします。
fn read_date1904<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    file: &str,
) -> Result<bool, SheetSenseError> {
    let mut workbook_file = match archive.by_name("xl/workbook.xml") {
        Ok(entry) => entry,
        Err(_) => return Ok(false),
    };

    let mut xml_content = Vec::new();
    workbook_file.read_to_end(&mut xml_content)?;

    parse_date1904(&xml_content).map_err(|reason| SheetSenseError::unreadable(file, reason))
}

/// workbook.xmlの内容から1904年エポック指定を判定
fn parse_date1904(xml_content: &[u8]) -> Result<bool, String> {
    let mut reader = Reader::from_reader(xml_content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            // <workbookPr date1904="1"/> は自己終了タグのことが多い
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"workbookPr" {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| format!("XML attribute error: {}", e))?;
                        if attr.key.as_ref() == b"date1904" {
                            let value = std::str::from_utf8(&attr.value)
                                .map_err(|e| format!("XML attribute error: {}", e))?;
                            return Ok(value == "1" || value.eq_ignore_ascii_case("true"));
                        }
                    }
                    return Ok(false);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(false)
}
