//! Reranker trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::CacheError;

/// A reranked document: its index into the input slice and its relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub index: usize,
    pub score: f32,
}

/// Trait for cross-encoder rerankers (Cohere, VoyageAI, HuggingFace)
#[async_trait]
pub trait Reranker: Send + Sync + Debug {
    /// Score `documents` against `query` and return them best-first.
    ///
    /// Implementations cap the result at their configured limit.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RankedDocument>, CacheError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// Mock reranker scoring by shared-word overlap with the query.
    #[derive(Debug)]
    pub struct MockReranker {
        limit: usize,
        error: Option<String>,
    }

    impl MockReranker {
        pub fn new(limit: usize) -> Self {
            Self { limit, error: None }
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }
    }

    #[async_trait]
    impl Reranker for MockReranker {
        async fn rerank(
            &self,
            query: &str,
            documents: &[String],
        ) -> Result<Vec<RankedDocument>, CacheError> {
            if let Some(ref error) = self.error {
                return Err(CacheError::provider("mock", error));
            }

            let query_words: Vec<&str> = query.split_whitespace().collect();
            let mut ranked: Vec<RankedDocument> = documents
                .iter()
                .enumerate()
                .map(|(index, doc)| {
                    let overlap = query_words
                        .iter()
                        .filter(|w| doc.split_whitespace().any(|d| d == **w))
                        .count();
                    RankedDocument {
                        index,
                        score: overlap as f32 / query_words.len().max(1) as f32,
                    }
                })
                .collect();

            ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(self.limit);

            Ok(ranked)
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_overlap_ordering() {
            let reranker = MockReranker::new(3);
            let docs = vec![
                "the weather today".to_string(),
                "what is rust programming".to_string(),
            ];

            let ranked = reranker.rerank("rust programming", &docs).await.unwrap();

            assert_eq!(ranked[0].index, 1);
            assert!(ranked[0].score > ranked[1].score);
        }

        #[tokio::test]
        async fn test_limit_applied() {
            let reranker = MockReranker::new(1);
            let docs = vec!["a".to_string(), "b".to_string(), "c".to_string()];

            let ranked = reranker.rerank("a", &docs).await.unwrap();

            assert_eq!(ranked.len(), 1);
        }
    }
}
