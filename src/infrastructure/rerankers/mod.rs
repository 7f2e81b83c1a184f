//! Reranker implementations and factory

mod cohere;
mod huggingface;
mod voyageai;

pub use cohere::CohereReranker;
pub use huggingface::HuggingFaceReranker;
pub use voyageai::VoyageAiReranker;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{RerankerConfig, RerankerProvider};
use crate::domain::{CacheError, Reranker};
use crate::infrastructure::http_client::HttpClient;

/// Factory for creating reranker instances
#[derive(Debug, Default)]
pub struct RerankerFactory;

impl RerankerFactory {
    /// Create a reranker from configuration, or `None` when disabled.
    pub fn create(
        config: &RerankerConfig,
        timeout: Duration,
    ) -> Result<Option<Arc<dyn Reranker>>, CacheError> {
        if !config.enabled {
            info!("Reranker is disabled");
            return Ok(None);
        }

        info!(
            provider = ?config.provider,
            model = %config.model,
            "Creating reranker"
        );

        let client = HttpClient::with_timeout(timeout);
        let api_key = config.api_config.get("api_key").ok_or_else(|| {
            CacheError::configuration(format!(
                "reranker.api_config.api_key is required for the {:?} provider",
                config.provider
            ))
        })?;

        let reranker: Arc<dyn Reranker> = match config.provider {
            RerankerProvider::Cohere => match config.api_config.get("base_url") {
                Some(base_url) => Arc::new(CohereReranker::with_base_url(
                    client,
                    api_key,
                    &config.model,
                    config.limit,
                    base_url,
                )),
                None => Arc::new(CohereReranker::new(
                    client,
                    api_key,
                    &config.model,
                    config.limit,
                )),
            },

            RerankerProvider::VoyageAi => match config.api_config.get("base_url") {
                Some(base_url) => Arc::new(VoyageAiReranker::with_base_url(
                    client,
                    api_key,
                    &config.model,
                    config.limit,
                    base_url,
                )),
                None => Arc::new(VoyageAiReranker::new(
                    client,
                    api_key,
                    &config.model,
                    config.limit,
                )),
            },

            RerankerProvider::HuggingFace => match config.api_config.get("base_url") {
                Some(base_url) => Arc::new(HuggingFaceReranker::with_base_url(
                    client,
                    api_key,
                    &config.model,
                    config.limit,
                    base_url,
                )),
                None => Arc::new(HuggingFaceReranker::new(
                    client,
                    api_key,
                    &config.model,
                    config.limit,
                )),
            },
        };

        Ok(Some(reranker))
    }
}
