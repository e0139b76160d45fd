use super::{EmbeddingProvider, preprocess};
use crate::error::EmbeddingError;
use async_trait::async_trait;

const MAX_INPUT_CHARS: usize = 8000;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Offline embedder: feature-hashed bag of lower-cased words, L2-normalized
///
/// Deterministic across runs and platforms. Texts sharing vocabulary score high
/// under cosine similarity, which is enough for tests and for running without
/// an embedding service.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous embedding used by the async trait method
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = preprocess(text, MAX_INPUT_CHARS);
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let lowered = text.to_lowercase();
        let mut tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            tokens.push(&lowered);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_text(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed_text("parse the config file").unwrap();
        let b = embedder.embed_text("parse the config file").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_text("quantum flux capacitor").unwrap();
        let related = embedder
            .embed_text("the quantum flux capacitor drives the engine")
            .unwrap();
        let unrelated = embedder
            .embed_text("render a table of invoices for the month")
            .unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_case_insensitive() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(
            embedder.embed_text("Hello World").unwrap(),
            embedder.embed_text("hello world").unwrap()
        );
    }

    #[test]
    fn test_punctuation_only_still_embeds() {
        let embedder = HashingEmbedder::new(32);
        let v = embedder.embed_text("{ } ;").unwrap();
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn test_empty_input_rejected() {
        let embedder = HashingEmbedder::new(32);
        assert!(matches!(
            embedder.embed_text("   "),
            Err(EmbeddingError::EmptyInput)
        ));
    }
}
