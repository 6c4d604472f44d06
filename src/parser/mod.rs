//! Parser Module
//!
//! calamineを使用したワークブック読み込みの基礎実装。
//! セル単位のストリーミング処理により、シートを行の並びとして公開します。

mod metadata;
mod workbook;

pub use workbook::WorkbookSource;
