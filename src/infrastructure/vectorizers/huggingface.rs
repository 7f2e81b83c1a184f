//! HuggingFace Inference API vectorizer

use async_trait::async_trait;

use crate::domain::{CacheError, Vectorizer};
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_HF_BASE_URL: &str = "https://api-inference.huggingface.co";

const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("sentence-transformers/all-MiniLM-L6-v2", 384),
    ("sentence-transformers/all-mpnet-base-v2", 768),
    ("BAAI/bge-small-en-v1.5", 384),
];

/// Sentence-embedding vectorizer over the HuggingFace Inference API
/// feature-extraction pipeline.
#[derive(Debug)]
pub struct HuggingFaceVectorizer<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    dims: Option<usize>,
}

impl<C: HttpClientTrait> HuggingFaceVectorizer<C> {
    pub fn new(client: C, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, model, DEFAULT_HF_BASE_URL)
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

    fn pipeline_url(&self) -> String {
        format!(
            "{}/pipeline/feature-extraction/{}",
            self.base_url, self.model
        )
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });

        let json = self
            .client
            .post_json(&self.pipeline_url(), self.headers(), &body)
            .await?;

        serde_json::from_value(json).map_err(|e| {
            CacheError::provider(
                "huggingface",
                format!("Failed to parse feature-extraction response: {}", e),
            )
        })
    }
}

#[async_trait]
impl<C: HttpClientTrait> Vectorizer for HuggingFaceVectorizer<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let input = [text.to_string()];
        let vectors = self.request(&input).await?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::provider("huggingface", "No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.request(texts).await
    }

    fn provider_name(&self) -> &'static str {
        "huggingface"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;

    const TEST_URL: &str =
        "https://api-inference.huggingface.co/pipeline/feature-extraction/sentence-transformers/all-MiniLM-L6-v2";

    #[tokio::test]
    async fn test_embed() {
        let client = MockHttpClient::new()
            .with_response(TEST_URL, serde_json::json!([[0.5, 0.5, 0.0]]));
        let vectorizer = HuggingFaceVectorizer::new(
            client,
            "hf-key",
            "sentence-transformers/all-MiniLM-L6-v2",
        );

        let vector = vectorizer.embed("Hello").await.unwrap();

        assert_eq!(vector, vec![0.5, 0.5, 0.0]);
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let client = MockHttpClient::new()
            .with_response(TEST_URL, serde_json::json!({"error": "loading"}));
        let vectorizer = HuggingFaceVectorizer::new(
            client,
            "hf-key",
            "sentence-transformers/all-MiniLM-L6-v2",
        );

        assert!(vectorizer.embed("Hello").await.is_err());
    }

    #[test]
    fn test_provider_info() {
        let vectorizer = HuggingFaceVectorizer::new(
            MockHttpClient::new(),
            "key",
            "sentence-transformers/all-MiniLM-L6-v2",
        );

        assert_eq!(vectorizer.provider_name(), "huggingface");
        assert_eq!(vectorizer.dimensions(), Some(384));
    }
}
