mod hashing;
mod http_client;

pub use hashing::HashingEmbedder;
pub use http_client::HttpEmbeddingClient;

use crate::config::EmbeddingConfig;
use crate::error::{ConfigError, EmbeddingError, RagError};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. The returned vector always has `dimension()` finite components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Build the provider selected by `config.provider`
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpEmbeddingClient::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        other => Err(ConfigError::InvalidValue {
            key: "embedding.provider".to_string(),
            reason: format!("unknown provider '{}'", other),
        }
        .into()),
    }
}

/// Normalize text before embedding.
///
/// Control characters are dropped, whitespace runs collapse to a single space, the result
/// is trimmed and cut to at most `max_chars` characters.
pub fn preprocess(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars * 4));
    let mut pending_space = false;
    let mut count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space {
            if count + 1 >= max_chars {
                break;
            }
            out.push(' ');
            count += 1;
            pending_space = false;
        }
        if count >= max_chars {
            break;
        }
        out.push(c);
        count += 1;
    }

    out
}

/// Reject vectors with the wrong length or non-finite components
pub fn validate_vector(vector: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::NonFiniteValue(pos));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_collapses_whitespace() {
        assert_eq!(
            preprocess("  fn  main()\n\n\t{ }  ", 100),
            "fn main() { }"
        );
    }

    #[test]
    fn test_preprocess_strips_control_characters() {
        assert_eq!(preprocess("a\u{0007}b\u{001b}c", 100), "abc");
    }

    #[test]
    fn test_preprocess_truncates_by_chars() {
        let text = "é".repeat(50);
        let out = preprocess(&text, 10);
        assert_eq!(out.chars().count(), 10);

        let out = preprocess("abc def ghi", 4);
        assert_eq!(out, "abc");
        assert!(preprocess("abc def ghi", 5).starts_with("abc d"));
    }

    #[test]
    fn test_preprocess_blank_is_empty() {
        assert!(preprocess(" \n\t ", 100).is_empty());
    }

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[0.1, 0.2, 0.3], 3).is_ok());
        assert!(matches!(
            validate_vector(&[0.1, 0.2], 3),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(
            validate_vector(&[0.1, f32::NAN, 0.3], 3),
            Err(EmbeddingError::NonFiniteValue(1))
        ));
        assert!(matches!(
            validate_vector(&[f32::INFINITY, 0.0, 0.0], 3),
            Err(EmbeddingError::NonFiniteValue(0))
        ));
    }

    #[test]
    fn test_create_provider_hashing() {
        let config = EmbeddingConfig {
            provider: "hashing".to_string(),
            dimension: 64,
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dimension(), 64);
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = EmbeddingConfig {
            provider: "nope".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
