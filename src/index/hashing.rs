//! Hashing Embedder Module
//!
//! 外部サービスを使わないローカルの埋め込みバックエンド。
//! 単語をFNV-1aでハッシュして固定次元のベクトルに加算し、L2正規化します。

use rayon::prelude::*;

use crate::error::SheetSenseError;
use crate::index::EmbeddingBackend;

/// 既定の次元数
pub const DEFAULT_DIMENSIONS: usize = 384;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 特徴ハッシングによる埋め込みバックエンド
///
/// 同じテキストには常に同じベクトルを返します。語彙の重なりが大きいほど
/// コサイン類似度が高くなるため、オフラインの検証やテストに使用できます。
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    /// 次元数を指定して生成
    ///
    /// # 戻り値
    ///
    /// * `Err(SheetSenseError::Config)` - 次元数が0の場合
    pub fn new(dimensions: usize) -> Result<Self, SheetSenseError> {
        if dimensions == 0 {
            return Err(SheetSenseError::Config(
                "Embedding dimensions must be at least 1".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    /// 次元数
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// 1つのテキストを埋め込む
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash % self.dimensions as u64) as usize;
            // 最上位ビットで符号を決め、衝突による偏りを打ち消す
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SheetSenseError> {
        Ok(texts.par_iter().map(|text| self.embed(text)).collect())
    }
}

/// 英数字の連続を小文字化した単語に分割
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_embed_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("Sheet: S1 | Row_Item: Widget | Data: Jan=10");
        let b = embedder.embed("Sheet: S1 | Row_Item: Widget | Data: Jan=10");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_embed_empty_text() {
        let embedder = HashingEmbedder::new(8).unwrap();
        assert_eq!(embedder.embed("  | ; "), vec![0.0; 8]);
    }

    #[test]
    fn test_similar_texts_score_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("widget january");
        let close = embedder.embed("Row_Item: Widget | Data: January=10");
        let far = embedder.embed("Row_Item: Payroll | Data: Salary=5000");
        assert!(cosine(&query, &close) > cosine(&query, &far));
    }

    #[test]
    fn test_embed_batch_preserves_order() {
        let embedder = HashingEmbedder::default();
        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(vector, &embedder.embed(text));
        }
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            HashingEmbedder::new(0),
            Err(SheetSenseError::Config(_))
        ));
    }
}
