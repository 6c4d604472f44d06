//! Security Module
//!
//! セキュリティ対策を実装するモジュール。
//! ZIP bomb攻撃、パストラバーサル攻撃、巨大ファイルへの対策を提供します。

use serde::{Deserialize, Serialize};

/// セキュリティ設定
///
/// ファイル処理時のセキュリティ制限を定義します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 展開後の最大サイズ（バイト）
    /// デフォルト: 1GB (1_073_741_824 bytes)
    pub max_decompressed_size: u64,
    /// ZIPアーカイブ内の最大ファイル数
    /// デフォルト: 10000
    pub max_file_count: usize,
    /// 単一ファイルの最大サイズ（バイト）
    /// デフォルト: 100MB (104_857_600 bytes)
    pub max_file_size: u64,
    /// 入力ファイルの最大サイズ（バイト）
    /// デフォルト: 2GB (2_147_483_648 bytes)
    pub max_input_file_size: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: 1_073_741_824, // 1GB
            max_file_count: 10_000,
            max_file_size: 104_857_600,         // 100MB
            max_input_file_size: 2_147_483_648, // 2GB
        }
    }
}

impl SecurityConfig {
    /// 入力サイズが上限以内かを検証
    pub(crate) fn check_input_size(&self, size: u64) -> Result<(), String> {
        if size > self.max_input_file_size {
            return Err(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                size, self.max_input_file_size
            ));
        }
        Ok(())
    }
}

/// ZIPエントリパスの検証
///
/// パストラバーサル攻撃を防ぐため、アーカイブ内のパスを検証します。
///
/// # 戻り値
///
/// * `Ok(())` - パスが安全な場合
/// * `Err(String)` - パスが危険な場合（`..`や絶対パスを含む）
pub(crate) fn validate_zip_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Empty path is not allowed".to_string());
    }

    // 絶対パスを拒否（Windows形式の`C:\`やUnix形式の`/`で始まるパス）
    if path.starts_with('/') || path.starts_with("C:\\") || path.starts_with("c:\\") {
        return Err(format!("Absolute path is not allowed: {}", path));
    }

    if path.contains("..") {
        return Err(format!("Path traversal detected: {}", path));
    }

    if path.contains('\\') {
        return Err(format!("Backslash in path is not allowed: {}", path));
    }

    Ok(())
}

/// 保存用ファイル名の検証
///
/// ソースディレクトリに保存するファイル名は、ディレクトリ区切りを含まない
/// 単一のファイル名でなければなりません。
pub(crate) fn validate_file_name(name: &str) -> Result<(), String> {
    validate_zip_path(name)?;

    if name.contains('/') {
        return Err(format!("Directory separator is not allowed: {}", name));
    }

    if name.starts_with('.') {
        return Err(format!("Hidden file name is not allowed: {}", name));
    }

    if name.chars().any(char::is_control) {
        return Err(format!("Control character in file name: {:?}", name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_zip_path_valid() {
        assert!(validate_zip_path("xl/workbook.xml").is_ok());
        assert!(validate_zip_path("xl/worksheets/sheet1.xml").is_ok());
        assert!(validate_zip_path("xl/sharedStrings.xml").is_ok());
    }

    #[test]
    fn test_validate_zip_path_rejects_unsafe() {
        assert!(validate_zip_path("").is_err());
        assert!(validate_zip_path("/etc/passwd").is_err());
        assert!(validate_zip_path("C:\\Windows\\system32").is_err());
        assert!(validate_zip_path("xl/../../etc/passwd").is_err());
        assert!(validate_zip_path("xl\\workbook.xml").is_err());
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("inventory.xlsx").is_ok());
        assert!(validate_file_name("Anderson's Bar 2024.xlsx").is_ok());

        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("data/inventory.xlsx").is_err());
        assert!(validate_file_name("../inventory.xlsx").is_err());
        assert!(validate_file_name(".env").is_err());
        assert!(validate_file_name("a\nb.xlsx").is_err());
    }

    #[test]
    fn test_check_input_size() {
        let config = SecurityConfig {
            max_input_file_size: 100,
            ..Default::default()
        };
        assert!(config.check_input_size(100).is_ok());
        let err = config.check_input_size(101).unwrap_err();
        assert!(err.contains("exceeds maximum"));
    }
}
