//! Vectorizer trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::CacheError;

/// Trait for embedding providers (OpenAI, Cohere, HuggingFace, etc.)
#[async_trait]
pub trait Vectorizer: Send + Sync + Debug {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError>;

    /// Embed a batch of texts, preserving input order.
    ///
    /// Providers with native batch endpoints override this; the default
    /// falls back to sequential single embeds.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            embeddings.push(self.embed(text).await?);
        }

        Ok(embeddings)
    }

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Get the model this vectorizer embeds with
    fn model(&self) -> &str;

    /// Known embedding dimensions for the configured model, if any
    fn dimensions(&self) -> Option<usize>;
}

#[cfg(test)]
pub mod mock {
    use std::collections::HashMap;

    use super::*;

    /// Deterministic mock vectorizer for tests.
    ///
    /// Texts registered via `with_vector` return canned embeddings; anything
    /// else gets a normalized hash-derived vector, so distinct texts land far
    /// apart and repeated texts are identical.
    #[derive(Debug)]
    pub struct MockVectorizer {
        dimensions: usize,
        canned: HashMap<String, Vec<f32>>,
        error: Option<String>,
    }

    impl MockVectorizer {
        pub fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                canned: HashMap::new(),
                error: None,
            }
        }

        pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
            self.canned.insert(text.into(), vector);
            self
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }

        fn hash_embedding(&self, text: &str) -> Vec<f32> {
            let hash = text.bytes().fold(0u64, |acc, b| {
                acc.wrapping_mul(31).wrapping_add(b as u64)
            });
            let mut state = hash;
            let mut vector = Vec::with_capacity(self.dimensions);

            for _ in 0..self.dimensions {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                vector.push(((state >> 33) as f32) / (u32::MAX as f32) * 2.0 - 1.0);
            }

            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            }

            vector
        }
    }

    #[async_trait]
    impl Vectorizer for MockVectorizer {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
            if let Some(ref error) = self.error {
                return Err(CacheError::provider("mock", error));
            }

            Ok(self
                .canned
                .get(text)
                .cloned()
                .unwrap_or_else(|| self.hash_embedding(text)))
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }

        fn model(&self) -> &str {
            "mock-embedding"
        }

        fn dimensions(&self) -> Option<usize> {
            Some(self.dimensions)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_deterministic_embeddings() {
            let vectorizer = MockVectorizer::new(32);

            let a = vectorizer.embed("hello").await.unwrap();
            let b = vectorizer.embed("hello").await.unwrap();

            assert_eq!(a, b);
            assert_eq!(a.len(), 32);
        }

        #[tokio::test]
        async fn test_canned_vector_wins() {
            let vectorizer = MockVectorizer::new(3).with_vector("hello", vec![1.0, 0.0, 0.0]);

            let v = vectorizer.embed("hello").await.unwrap();

            assert_eq!(v, vec![1.0, 0.0, 0.0]);
        }

        #[tokio::test]
        async fn test_batch_preserves_order() {
            let vectorizer = MockVectorizer::new(8);
            let texts = vec!["a".to_string(), "b".to_string()];

            let batch = vectorizer.embed_batch(&texts).await.unwrap();

            assert_eq!(batch.len(), 2);
            assert_eq!(batch[0], vectorizer.embed("a").await.unwrap());
            assert_eq!(batch[1], vectorizer.embed("b").await.unwrap());
        }

        #[tokio::test]
        async fn test_error_propagates() {
            let vectorizer = MockVectorizer::new(8).with_error("API down");

            assert!(vectorizer.embed("hello").await.is_err());
        }
    }
}
