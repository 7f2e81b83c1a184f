//! Embedding vectorizer implementations and factory

mod cohere;
mod huggingface;
mod openai;
mod vertexai;
mod voyageai;

pub use cohere::CohereVectorizer;
pub use huggingface::HuggingFaceVectorizer;
pub use openai::OpenAiVectorizer;
pub use vertexai::VertexAiVectorizer;
pub use voyageai::VoyageAiVectorizer;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{VectorizerConfig, VectorizerProvider};
use crate::domain::{CacheError, Vectorizer};
use crate::infrastructure::http_client::HttpClient;

/// Factory for creating vectorizer instances
#[derive(Debug, Default)]
pub struct VectorizerFactory;

impl VectorizerFactory {
    /// Create a vectorizer from configuration.
    ///
    /// Cloud providers read their credentials from `api_config`:
    /// `api_key` (plus `base_url` to override the endpoint), or for Vertex
    /// AI `access_token`, `project_id` and `location`.
    pub fn create(
        config: &VectorizerConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn Vectorizer>, CacheError> {
        info!(
            provider = ?config.provider,
            model = %config.model,
            "Creating vectorizer"
        );

        let client = HttpClient::with_timeout(timeout);

        let vectorizer: Arc<dyn Vectorizer> = match config.provider {
            VectorizerProvider::OpenAi => {
                let api_key = Self::required(config, "api_key")?;
                let mut vectorizer = match config.api_config.get("base_url") {
                    Some(base_url) => OpenAiVectorizer::with_base_url(
                        client,
                        api_key,
                        &config.model,
                        base_url,
                    ),
                    None => OpenAiVectorizer::new(client, api_key, &config.model),
                };
                if let Some(dims) = config.dims {
                    vectorizer = vectorizer.with_dims(dims);
                }
                Arc::new(vectorizer)
            }

            VectorizerProvider::HuggingFace => {
                let api_key = Self::required(config, "api_key")?;
                let mut vectorizer = match config.api_config.get("base_url") {
                    Some(base_url) => HuggingFaceVectorizer::with_base_url(
                        client,
                        api_key,
                        &config.model,
                        base_url,
                    ),
                    None => HuggingFaceVectorizer::new(client, api_key, &config.model),
                };
                if let Some(dims) = config.dims {
                    vectorizer = vectorizer.with_dims(dims);
                }
                Arc::new(vectorizer)
            }

            VectorizerProvider::Cohere => {
                let api_key = Self::required(config, "api_key")?;
                let mut vectorizer = match config.api_config.get("base_url") {
                    Some(base_url) => CohereVectorizer::with_base_url(
                        client,
                        api_key,
                        &config.model,
                        base_url,
                    ),
                    None => CohereVectorizer::new(client, api_key, &config.model),
                };
                if let Some(dims) = config.dims {
                    vectorizer = vectorizer.with_dims(dims);
                }
                Arc::new(vectorizer)
            }

            VectorizerProvider::VoyageAi => {
                let api_key = Self::required(config, "api_key")?;
                let mut vectorizer = match config.api_config.get("base_url") {
                    Some(base_url) => VoyageAiVectorizer::with_base_url(
                        client,
                        api_key,
                        &config.model,
                        base_url,
                    ),
                    None => VoyageAiVectorizer::new(client, api_key, &config.model),
                };
                if let Some(dims) = config.dims {
                    vectorizer = vectorizer.with_dims(dims);
                }
                Arc::new(vectorizer)
            }

            VectorizerProvider::VertexAi => {
                let access_token = Self::required(config, "access_token")?;
                let project_id = Self::required(config, "project_id")?;
                let location = Self::required(config, "location")?;
                let mut vectorizer = VertexAiVectorizer::new(
                    client,
                    access_token,
                    project_id,
                    location,
                    &config.model,
                );
                if let Some(dims) = config.dims {
                    vectorizer = vectorizer.with_dims(dims);
                }
                Arc::new(vectorizer)
            }
        };

        Ok(vectorizer)
    }

    fn required<'a>(config: &'a VectorizerConfig, key: &str) -> Result<&'a str, CacheError> {
        config
            .api_config
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                CacheError::configuration(format!(
                    "vectorizer.api_config.{} is required for the {:?} provider",
                    key, config.provider
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(provider: VectorizerProvider, pairs: &[(&str, &str)]) -> VectorizerConfig {
        let mut config = VectorizerConfig {
            provider,
            ..Default::default()
        };
        for (k, v) in pairs {
            config.api_config.insert(k.to_string(), v.to_string());
        }
        config
    }

    #[test]
    fn test_create_openai() {
        let config = config_with(VectorizerProvider::OpenAi, &[("api_key", "sk-test")]);
        let vectorizer = VectorizerFactory::create(&config, Duration::from_secs(5)).unwrap();

        assert_eq!(vectorizer.provider_name(), "openai");
    }

    #[test]
    fn test_create_missing_api_key() {
        let config = config_with(VectorizerProvider::OpenAi, &[]);
        let result = VectorizerFactory::create(&config, Duration::from_secs(5));

        assert!(result.is_err());
    }

    #[test]
    fn test_create_vertexai_requires_project() {
        let config = config_with(VectorizerProvider::VertexAi, &[("access_token", "tok")]);
        let result = VectorizerFactory::create(&config, Duration::from_secs(5));

        assert!(result.is_err());

        let config = config_with(
            VectorizerProvider::VertexAi,
            &[
                ("access_token", "tok"),
                ("project_id", "proj"),
                ("location", "us-central1"),
            ],
        );
        let vectorizer = VectorizerFactory::create(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(vectorizer.provider_name(), "vertexai");
    }

    #[test]
    fn test_create_each_api_key_provider() {
        for provider in [
            VectorizerProvider::HuggingFace,
            VectorizerProvider::Cohere,
            VectorizerProvider::VoyageAi,
        ] {
            let config = config_with(provider, &[("api_key", "key")]);
            let vectorizer =
                VectorizerFactory::create(&config, Duration::from_secs(5)).unwrap();
            assert!(!vectorizer.provider_name().is_empty());
        }
    }
}
