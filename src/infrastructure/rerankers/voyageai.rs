//! VoyageAI reranker

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{CacheError, RankedDocument, Reranker};
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_VOYAGE_BASE_URL: &str = "https://api.voyageai.com";

/// Cross-encoder reranker over the VoyageAI `/v1/rerank` endpoint
#[derive(Debug)]
pub struct VoyageAiReranker<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    limit: usize,
}

impl<C: HttpClientTrait> VoyageAiReranker<C> {
    pub fn new(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        limit: usize,
    ) -> Self {
        Self::with_base_url(client, api_key, model, limit, DEFAULT_VOYAGE_BASE_URL)
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

    fn rerank_url(&self) -> String {
        format!("{}/v1/rerank", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }
}

#[async_trait]
impl<C: HttpClientTrait> Reranker for VoyageAiReranker<C> {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RankedDocument>, CacheError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_k": self.limit.min(documents.len()),
        });

        let json = self
            .client
            .post_json(&self.rerank_url(), self.headers(), &body)
            .await?;

        let response: VoyageRerankResponse = serde_json::from_value(json).map_err(|e| {
            CacheError::provider("voyageai", format!("Failed to parse rerank response: {}", e))
        })?;

        Ok(response
            .data
            .into_iter()
            .map(|r| RankedDocument {
                index: r.index,
                score: r.relevance_score,
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "voyageai"
    }
}

#[derive(Debug, Deserialize)]
struct VoyageRerankResponse {
    data: Vec<VoyageRerankResult>,
}

#[derive(Debug, Deserialize)]
struct VoyageRerankResult {
    index: usize,
    relevance_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;

    const TEST_URL: &str = "https://api.voyageai.com/v1/rerank";

    #[tokio::test]
    async fn test_rerank() {
        let client = MockHttpClient::new().with_response(
            TEST_URL,
            serde_json::json!({
                "data": [
                    { "index": 0, "relevance_score": 0.8 },
                    { "index": 2, "relevance_score": 0.6 }
                ]
            }),
        );
        let reranker = VoyageAiReranker::new(client, "test-key", "rerank-2", 2);

        let docs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ranked = reranker.rerank("query", &docs).await.unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[1].index, 2);
    }
}
