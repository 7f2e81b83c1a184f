//! Google Vertex AI embedding vectorizer

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{CacheError, Vectorizer};
use crate::infrastructure::http_client::HttpClientTrait;

const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-004", 768),
    ("text-embedding-005", 768),
    ("textembedding-gecko@003", 768),
];

/// Vertex AI embedding vectorizer using the `:predict` endpoint.
///
/// Authentication uses a caller-supplied OAuth access token; token refresh
/// is the caller's concern.
#[derive(Debug)]
pub struct VertexAiVectorizer<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    project_id: String,
    location: String,
    model: String,
    dims: Option<usize>,
}

impl<C: HttpClientTrait> VertexAiVectorizer<C> {
    pub fn new(
        client: C,
        access_token: impl Into<String>,
        project_id: impl Into<String>,
        location: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_header: format!("Bearer {}", access_token.into()),
            project_id: project_id.into(),
            location: location.into(),
            model: model.into(),
            dims: None,
        }
    }

    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    fn predict_url(&self) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{proj}/locations/{loc}/publishers/google/models/{model}:predict",
            loc = self.location,
            proj = self.project_id,
            model = self.model,
        )
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        let instances: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| serde_json::json!({ "content": text }))
            .collect();
        let body = serde_json::json!({ "instances": instances });

        let json = self
            .client
            .post_json(&self.predict_url(), self.headers(), &body)
            .await?;

        let response: VertexPredictResponse = serde_json::from_value(json).map_err(|e| {
            CacheError::provider("vertexai", format!("Failed to parse predict response: {}", e))
        })?;

        Ok(response
            .predictions
            .into_iter()
            .map(|p| p.embeddings.values)
            .collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> Vectorizer for VertexAiVectorizer<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let input = [text.to_string()];
        let vectors = self.request(&input).await?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::provider("vertexai", "No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CacheError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.request(texts).await
    }

    fn provider_name(&self) -> &'static str {
        "vertexai"
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
struct VertexPredictResponse {
    predictions: Vec<VertexPrediction>,
}

#[derive(Debug, Deserialize)]
struct VertexPrediction {
    embeddings: VertexEmbeddings,
}

#[derive(Debug, Deserialize)]
struct VertexEmbeddings {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;

    const TEST_URL: &str = "https://us-central1-aiplatform.googleapis.com/v1/projects/test-proj/locations/us-central1/publishers/google/models/text-embedding-004:predict";

    #[tokio::test]
    async fn test_embed() {
        let client = MockHttpClient::new().with_response(
            TEST_URL,
            serde_json::json!({
                "predictions": [{ "embeddings": { "values": [0.1, 0.9] } }]
            }),
        );
        let vectorizer = VertexAiVectorizer::new(
            client,
            "token",
            "test-proj",
            "us-central1",
            "text-embedding-004",
        );

        let vector = vectorizer.embed("Hello").await.unwrap();

        assert_eq!(vector, vec![0.1, 0.9]);
    }

    #[test]
    fn test_provider_info() {
        let vectorizer = VertexAiVectorizer::new(
            MockHttpClient::new(),
            "token",
            "p",
            "us-central1",
            "text-embedding-004",
        );

        assert_eq!(vectorizer.provider_name(), "vertexai");
        assert_eq!(vectorizer.dimensions(), Some(768));
        assert!(vectorizer
            .predict_url()
            .starts_with("https://us-central1-aiplatform.googleapis.com/v1/projects/p/"));
    }
}
