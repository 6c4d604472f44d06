//! In-Memory Vector Store Module
//!
//! プロセス内で完結するベクトルストア。コサイン類似度の全件走査で検索します。

use std::collections::HashMap;

use crate::error::SheetSenseError;
use crate::index::{StoredHit, VectorStore};
use crate::semantic::RowMetadata;

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    document: String,
    metadata: RowMetadata,
    embedding: Vec<f32>,
}

/// メモリ上のベクトルストア
///
/// 同じIDで`add`すると既存のエントリを上書きします（挿入順は維持）。
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl InMemoryVectorStore {
    /// 空のストアを生成
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn add(
        &mut self,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<RowMetadata>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), SheetSenseError> {
        let n = ids.len();
        if documents.len() != n || metadatas.len() != n || embeddings.len() != n {
            return Err(SheetSenseError::Store(format!(
                "Mismatched batch lengths: ids={}, documents={}, metadatas={}, embeddings={}",
                n,
                documents.len(),
                metadatas.len(),
                embeddings.len()
            )));
        }

        let rows = ids.into_iter().zip(documents).zip(metadatas).zip(embeddings);
        for (((id, document), metadata), embedding) in rows {
            let entry = Entry {
                id: id.clone(),
                document,
                metadata,
                embedding,
            };
            match self.positions.get(&id) {
                Some(&position) => self.entries[position] = entry,
                None => {
                    self.positions.insert(id, self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
        Ok(())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<StoredHit>, SheetSenseError> {
        let mut scored: Vec<(f32, &Entry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(embedding, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| StoredHit {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    fn count(&self) -> Result<usize, SheetSenseError> {
        Ok(self.entries.len())
    }

    fn reset(&mut self) -> Result<(), SheetSenseError> {
        self.entries.clear();
        self.positions.clear();
        Ok(())
    }

    fn peek(&self, limit: usize) -> Result<Vec<RowMetadata>, SheetSenseError> {
        Ok(self
            .entries
            .iter()
            .take(limit)
            .map(|entry| entry.metadata.clone())
            .collect())
    }
}

/// コサイン類似度（どちらかがゼロベクトルなら0）
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
