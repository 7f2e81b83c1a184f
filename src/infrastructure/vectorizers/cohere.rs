//! Cohere embedding vectorizer

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{CacheError, Vectorizer};
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_COHERE_BASE_URL: &str = "https://api.cohere.com";

const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("embed-english-v3.0", 1024),
    ("embed-english-light-v3.0", 384),
    ("embed-multilingual-v3.0", 1024),
];

/// Cohere embedding vectorizer
#[derive(Debug)]
pub struct CohereVectorizer<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    dims: Option<usize>,
}

impl<C: HttpClientTrait> CohereVectorizer<C> {
    pub fn new(client: C, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, model, DEFAULT_COHERE_BASE_URL)
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

    fn embed_url(&self) -> String {
        format!("{}/v1/embed", self.base_url)
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
            "texts": texts,
            "input_type": "search_query",
        });

        let json = self
            .client
            .post_json(&self.embed_url(), self.headers(), &body)
            .await?;

        let response: CohereEmbedResponse = serde_json::from_value(json).map_err(|e| {
            CacheError::provider("cohere", format!("Failed to parse embed response: {}", e))
        })?;

        Ok(response.embeddings)
    }
}

#[async_trait]
impl<C: HttpClientTrait> Vectorizer for CohereVectorizer<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let input = [text.to_string()];
        let vectors = self.request(&input).await?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::provider("cohere", "No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.request(texts).await
    }

    fn provider_name(&self) -> &'static str {
        "cohere"
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
struct CohereEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
