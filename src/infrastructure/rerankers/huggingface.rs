//! HuggingFace cross-encoder reranker

use async_trait::async_trait;

use crate::domain::{CacheError, RankedDocument, Reranker};
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_HF_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Cross-encoder reranker over the HuggingFace Inference API
/// sentence-similarity pipeline. Scores come back in document order; this
/// sorts them best-first and truncates to the configured limit.
#[derive(Debug)]
pub struct HuggingFaceReranker<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    limit: usize,
}

impl<C: HttpClientTrait> HuggingFaceReranker<C> {
    pub fn new(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        limit: usize,
    ) -> Self {
        Self::with_base_url(client, api_key, model, limit, DEFAULT_HF_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        limit: usize,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_header: format!("Bearer {}", api_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            limit,
        }
    }

    fn model_url(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }
}

#[async_trait]
impl<C: HttpClientTrait> Reranker for HuggingFaceReranker<C> {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RankedDocument>, CacheError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "inputs": {
                "source_sentence": query,
                "sentences": documents,
            },
            "options": { "wait_for_model": true },
        });

        let json = self
            .client
            .post_json(&self.model_url(), self.headers(), &body)
            .await?;

        let scores: Vec<f32> = serde_json::from_value(json).map_err(|e| {
            CacheError::provider(
                "huggingface",
                format!("Failed to parse similarity response: {}", e),
            )
        })?;

        if scores.len() != documents.len() {
            return Err(CacheError::provider(
                "huggingface",
                format!(
                    "Expected {} scores, got {}",
                    documents.len(),
                    scores.len()
                ),
            ));
        }

        let mut ranked: Vec<RankedDocument> = scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| RankedDocument { index, score })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.limit);

        Ok(ranked)
    }

    fn provider_name(&self) -> &'static str {
        "huggingface"
    }
}
