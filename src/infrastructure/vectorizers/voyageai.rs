//! VoyageAI embedding vectorizer

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{CacheError, Vectorizer};
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_VOYAGE_BASE_URL: &str = "https://api.voyageai.com";

const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("voyage-3", 1024),
    ("voyage-3-lite", 512),
    ("voyage-code-3", 1024),
];

/// VoyageAI embedding vectorizer
#[derive(Debug)]
pub struct VoyageAiVectorizer<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    dims: Option<usize>,
}

impl<C: HttpClientTrait> VoyageAiVectorizer<C> {
    pub fn new(client: C, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, model, DEFAULT_VOYAGE_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_header: format!("Bearer {}", api_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dims: None,
        }
    }

    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "input_type": "query",
        });

        let json = self
            .client
            .post_json(&self.embeddings_url(), self.headers(), &body)
            .await?;

        let response: VoyageEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            CacheError::provider("voyageai", format!("Failed to parse embedding response: {}", e))
        })?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> Vectorizer for VoyageAiVectorizer<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let input = [text.to_string()];
        let vectors = self.request(&input).await?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::provider("voyageai", "No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.request(texts).await
    }

    fn provider_name(&self) -> &'static str {
        "voyageai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.dims.or_else(|| {
            EMBEDDING_MODELS
                .iter()
                .find(|(name, _)| *name == self.model)
                .map(|(_, dims)| *dims)
        })
    }
}

#[derive(Debug, Deserialize)]
struct VoyageEmbeddingResponse {
    data: Vec<VoyageEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct VoyageEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;

    const TEST_URL: &str = "https://api.voyageai.com/v1/embeddings";

    #[tokio::test]
    async fn test_embed() {
        let client = MockHttpClient::new().with_response(
            TEST_URL,
            serde_json::json!({
                "data": [{ "index": 0, "embedding": [0.25, 0.75] }],
                "model": "voyage-3"
            }),
        );
        let vectorizer = VoyageAiVectorizer::new(client, "test-key", "voyage-3");

        let vector = vectorizer.embed("Hello").await.unwrap();

        assert_eq!(vector, vec![0.25, 0.75]);
    }

    #[tokio::test]
    async fn test_batch_sorted_by_index() {
        let client = MockHttpClient::new().with_response(
            TEST_URL,
            serde_json::json!({
                "data": [
                    { "index": 1, "embedding": [2.0] },
                    { "index": 0, "embedding": [1.0] }
                ],
                "model": "voyage-3"
            }),
        );
        let vectorizer = VoyageAiVectorizer::new(client, "test-key", "voyage-3");

        let vectors = vectorizer
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_provider_info() {
        let vectorizer = VoyageAiVectorizer::new(MockHttpClient::new(), "key", "voyage-3");

        assert_eq!(vectorizer.provider_name(), "voyageai");
        assert_eq!(vectorizer.dimensions(), Some(1024));
    }
}
