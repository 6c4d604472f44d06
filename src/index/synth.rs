//! Answer Synthesis Module
//!
//! 検索結果から回答を組み立てるためのプロンプト生成と、
//! 生成モデルを使わない抽出型の`Synthesizer`を提供するモジュール。

use crate::error::SheetSenseError;
use crate::index::{ContextEntry, Synthesizer};

/// 生成モデルへのシステム指示
pub const SYSTEM_INSTRUCTION: &str = "You are a spreadsheet analysis expert. Answer the user query based ONLY on the provided snippets. If you cannot find the answer, say so. Group answers by sheet.";

/// 生成モデルに渡すプロンプト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// システム指示
    pub system: String,
    /// ユーザープロンプト
    pub user: String,
}

/// 質問と検索結果からプロンプトを生成
///
/// ユーザープロンプトは`"Query: {質問}\n\nContext Snippets:\n- {文書}\n- {文書}"`です。
/// 生成モデルを呼び出す`Synthesizer`の実装から使用します。
pub fn build_prompt(query: &str, context: &[ContextEntry]) -> Prompt {
    let snippets = context
        .iter()
        .map(|entry| format!("- {}", entry.document))
        .collect::<Vec<_>>()
        .join("\n");

    Prompt {
        system: SYSTEM_INSTRUCTION.to_string(),
        user: format!("Query: {}\n\nContext Snippets:\n{}", query, snippets),
    }
}

/// 抽出型の回答生成
///
/// 検索結果の文書をシートごとにまとめて列挙します。
/// 生成モデルを使用しないため、結果は決定的です。
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSynthesizer;

impl Synthesizer for ExtractiveSynthesizer {
    fn answer(&self, query: &str, context: &[ContextEntry]) -> Result<String, SheetSenseError> {
        if context.is_empty() {
            return Ok(format!(
                "No snippets in the index answer \"{}\".",
                query
            ));
        }

        // シートの初出順を保ったままグループ化
        let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
        for entry in context {
            let sheet = entry.metadata.sheet.as_str();
            match groups.iter_mut().find(|(name, _)| *name == sheet) {
                Some((_, documents)) => documents.push(entry.document.as_str()),
                None => groups.push((sheet, vec![entry.document.as_str()])),
            }
        }

        let mut answer = format!(
            "Found {} matching rows for \"{}\".",
            context.len(),
            query
        );
        for (sheet, documents) in groups {
            answer.push_str(&format!("\n\n{}:", sheet));
            for document in documents {
                answer.push_str(&format!("\n- {}", document));
            }
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::RowMetadata;

    fn entry(sheet: &str, header: &str, document: &str) -> ContextEntry {
        ContextEntry {
            document: document.to_string(),
            metadata: RowMetadata {
                sheet: sheet.to_string(),
                row_idx: 2,
                header: header.to_string(),
            },
        }
    }

    #[test]
    fn test_build_prompt() {
        let context = vec![
            entry("S1", "Widget", "Sheet: S1 | Row_Item: Widget | Data: Jan=10"),
            entry("S2", "Gadget", "Sheet: S2 | Row_Item: Gadget | Data: Jan=3"),
        ];
        let prompt = build_prompt("How many widgets in Jan?", &context);

        assert_eq!(prompt.system, SYSTEM_INSTRUCTION);
        assert_eq!(
            prompt.user,
            "Query: How many widgets in Jan?\n\nContext Snippets:\n\
             - Sheet: S1 | Row_Item: Widget | Data: Jan=10\n\
             - Sheet: S2 | Row_Item: Gadget | Data: Jan=3"
        );
    }

    #[test]
    fn test_extractive_groups_by_sheet() {
        let context = vec![
            entry("Sales", "Widget", "doc1"),
            entry("Stock", "Widget", "doc2"),
            entry("Sales", "Gadget", "doc3"),
        ];
        let answer = ExtractiveSynthesizer.answer("widgets", &context).unwrap();
        assert_eq!(
            answer,
            "Found 3 matching rows for \"widgets\".\n\nSales:\n- doc1\n- doc3\n\nStock:\n- doc2"
        );
    }

    #[test]
    fn test_extractive_without_context() {
        let answer = ExtractiveSynthesizer.answer("anything", &[]).unwrap();
        assert!(answer.contains("anything"));
    }
}
