use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://api.cohere.ai/v1";
const MODEL: &str = "embed-english-v3.0";
const MODEL_SIZE: usize = 1024;

/// Cohere embedder configuration
#[derive(Debug, Clone)]
pub struct CohereConfig {
    pub api_key: String,
    pub base_url: String,
}

impl CohereConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("COHERE_API_KEY")
            .map_err(|_| ProviderError::Config("COHERE_API_KEY not set".to_string()))?;

        let base_url =
            std::env::var("COHERE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self { api_key, base_url })
    }
}

/// Cohere `embed-english-v3.0` embedder tuned for clustering
pub struct CohereEmbedder {
    client: Client,
    config: CohereConfig,
}

impl CohereEmbedder {
    pub fn new(config: CohereConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self::new(CohereConfig::from_env()?))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'static str,
    input_type: &'static str,
    truncate: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f64>>,
}

#[async_trait]
impl Embedder for CohereEmbedder {
    fn name(&self) -> &'static str {
        "Cohere"
    }

    fn size(&self) -> usize {
        MODEL_SIZE
    }

    async fn embed(&self, chunks: &[String]) -> ProviderResult<Vec<Vec<f64>>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbedRequest {
            texts: chunks,
            model: MODEL,
            input_type: "clustering",
            truncate: "NONE",
        };

        let response = self
            .client
            .post(format!("{}/embed", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Embedding(format!(
                "Cohere API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbedResponse = response.json().await?;
        if body.embeddings.len() != chunks.len() {
            return Err(ProviderError::Embedding(format!(
                "Cohere returned {} embeddings for {} chunks",
                body.embeddings.len(),
                chunks.len()
            )));
        }

        Ok(body.embeddings)
    }
}
