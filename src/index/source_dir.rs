//! Source Directory Module
//!
//! アップロードされたワークブックを保存するデータディレクトリを管理するモジュール。

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::error::SheetSenseError;
use crate::security::validate_file_name;

/// 保存済みファイルの情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// ファイル名
    pub name: String,
    /// ファイルサイズ（バイト）
    pub size_bytes: u64,
}

/// ワークブックの保存先ディレクトリ
///
/// ディレクトリ直下のファイルだけを扱い、サブディレクトリには触れません。
#[derive(Debug, Clone)]
pub struct SourceDirectory {
    root: PathBuf,
}

impl SourceDirectory {
    /// ディレクトリを開く（存在しない場合は作成）
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SheetSenseError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// ディレクトリのパス
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, SheetSenseError> {
        validate_file_name(name).map_err(SheetSenseError::InvalidFileName)?;
        Ok(self.root.join(name))
    }

    /// ファイルを保存する（同名のファイルは上書き）
    ///
    /// # 戻り値
    ///
    /// * `Ok(PathBuf)` - 保存先のパス
    /// * `Err(SheetSenseError::InvalidFileName)` - ファイル名がディレクトリ区切りや`..`を含む場合
    pub fn store(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, SheetSenseError> {
        let path = self.resolve(name)?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// ファイルの内容を読み込む
    pub fn read(&self, name: &str) -> Result<Vec<u8>, SheetSenseError> {
        let path = self.resolve(name)?;
        Ok(fs::read(path)?)
    }

    /// 保存済みファイルの一覧（名前順）
    pub fn list(&self) -> Result<Vec<SourceFile>, SheetSenseError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            files.push(SourceFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: metadata.len(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// 保存済みファイルのパス一覧（名前順）
    pub fn paths(&self) -> Result<Vec<PathBuf>, SheetSenseError> {
        Ok(self
            .list()?
            .into_iter()
            .map(|file| self.root.join(file.name))
            .collect())
    }

    /// 保存済みファイルをすべて削除する
    ///
    /// 個々のファイルの削除失敗はログに記録して続行します。
    ///
    /// # 戻り値
    ///
    /// 削除できたファイル数
    pub fn clear(&self) -> Result<usize, SheetSenseError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove source file"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_list_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let sources = SourceDirectory::new(dir.path().join("data")).unwrap();

        sources.store("b.xlsx", b"12345").unwrap();
        sources.store("a.xlsx", b"12").unwrap();
        fs::create_dir(sources.root().join("nested")).unwrap();

        let files = sources.list().unwrap();
        assert_eq!(
            files,
            vec![
                SourceFile {
                    name: "a.xlsx".to_string(),
                    size_bytes: 2
                },
                SourceFile {
                    name: "b.xlsx".to_string(),
                    size_bytes: 5
                },
            ]
        );
        assert_eq!(sources.read("b.xlsx").unwrap(), b"12345");
        assert_eq!(sources.paths().unwrap()[0], sources.root().join("a.xlsx"));

        assert_eq!(sources.clear().unwrap(), 2);
        assert!(sources.list().unwrap().is_empty());
        assert!(sources.root().join("nested").is_dir());
    }

    #[test]
    fn test_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let sources = SourceDirectory::new(dir.path()).unwrap();

        for name in ["../escape.xlsx", "sub/dir.xlsx", "", ".hidden"] {
            let result = sources.store(name, b"x");
            assert!(
                matches!(result, Err(SheetSenseError::InvalidFileName(_))),
                "{:?} should be rejected",
                name
            );
        }
        assert!(!dir.path().parent().unwrap().join("escape.xlsx").exists());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sources = SourceDirectory::new(dir.path()).unwrap();
        assert!(matches!(
            sources.read("missing.xlsx"),
            Err(SheetSenseError::Io(_))
        ));
    }
}
