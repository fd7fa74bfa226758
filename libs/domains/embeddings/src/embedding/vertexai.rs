//! Vertex AI embedder
//!
//! Uses Google Cloud's Vertex AI `textembedding-gecko@002` model.
//! Authenticates with a token from `VERTEXAI_TOKEN`, falling back to the GCP
//! metadata server (Workload Identity in GKE).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::error::{ProviderError, ProviderResult};

const MODEL: &str = "textembedding-gecko@002";
const MODEL_SIZE: usize = 768;
const TASK_TYPE: &str = "RETRIEVAL_QUERY";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Vertex AI embedder configuration
#[derive(Debug, Clone)]
pub struct VertexAIConfig {
    /// GCP Project ID
    pub project_id: String,
    /// GCP Region (e.g., "us-central1")
    pub location: String,
    /// Access token; the metadata server is queried when absent
    pub access_token: Option<String>,
}

impl VertexAIConfig {
    pub fn new(project_id: String, location: String) -> Self {
        Self {
            project_id,
            location,
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: String) -> Self {
        self.access_token = Some(token);
        self
    }

    pub fn from_env() -> ProviderResult<Self> {
        let project_id = std::env::var("GOOGLE_PROJECT_ID")
            .map_err(|_| ProviderError::Config("GOOGLE_PROJECT_ID not set".to_string()))?;

        let location =
            std::env::var("VERTEX_AI_LOCATION").unwrap_or_else(|_| "us-central1".to_string());

        let access_token = std::env::var("VERTEXAI_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            project_id,
            location,
            access_token,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "https://{}-aiplatform.googleapis.com/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.location, self.project_id, self.location, MODEL
        )
    }
}

pub struct VertexAIEmbedder {
    client: Client,
    config: VertexAIConfig,
}

impl VertexAIEmbedder {
    pub fn new(config: VertexAIConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self::new(VertexAIConfig::from_env()?))
    }

    async fn access_token(&self) -> ProviderResult<String> {
        if let Some(ref token) = self.config.access_token {
            return Ok(token.clone());
        }

        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                ProviderError::Config(format!(
                    "Failed to get access token from metadata server: {}. \
                     Set VERTEXAI_TOKEN for local development.",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Config(format!(
                "Metadata server returned {}. Set VERTEXAI_TOKEN for local development.",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Config(format!("Failed to parse token response: {}", e)))?;

        Ok(token.access_token)
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<TextInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct TextInstance<'a> {
    content: &'a str,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    auto_truncate: bool,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    embeddings: PredictionValues,
}

#[derive(Debug, Deserialize)]
struct PredictionValues {
    values: Vec<f64>,
}

impl<'a> PredictRequest<'a> {
    fn new(chunks: &'a [String]) -> Self {
        Self {
            instances: chunks
                .iter()
                .map(|chunk| TextInstance {
                    content: chunk,
                    task_type: TASK_TYPE,
                })
                .collect(),
            parameters: PredictParameters {
                auto_truncate: false,
            },
        }
    }
}

#[async_trait]
impl Embedder for VertexAIEmbedder {
    fn name(&self) -> &'static str {
        "VertexAI"
    }

    fn size(&self) -> usize {
        MODEL_SIZE
    }

    async fn embed(&self, chunks: &[String]) -> ProviderResult<Vec<Vec<f64>>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let token = self.access_token().await?;

        let response = self
            .client
            .post(self.config.endpoint_url())
            .bearer_auth(token)
            .json(&PredictRequest::new(chunks))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Embedding(format!(
                "Vertex AI API error ({}): {}",
                status, error_text
            )));
        }

        let body: PredictResponse = response.json().await?;
        Ok(body
            .predictions
            .into_iter()
            .map(|p| p.embeddings.values)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let config = VertexAIConfig::new("my-project".into(), "europe-west1".into());
        assert_eq!(
            config.endpoint_url(),
            "https://europe-west1-aiplatform.googleapis.com/v1/projects/my-project/locations/europe-west1/publishers/google/models/textembedding-gecko@002:predict"
        );
    }

    #[test]
    fn test_request_body() {
        let chunks = vec!["one".to_string(), "two".to_string()];
        assert_eq!(
            serde_json::to_value(PredictRequest::new(&chunks)).unwrap(),
            serde_json::json!({
                "instances": [
                    { "content": "one", "task_type": "RETRIEVAL_QUERY" },
                    { "content": "two", "task_type": "RETRIEVAL_QUERY" }
                ],
                "parameters": { "autoTruncate": false }
            })
        );
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("GOOGLE_PROJECT_ID", Some("proj")),
                ("VERTEX_AI_LOCATION", None),
                ("VERTEXAI_TOKEN", Some("tok")),
            ],
            || {
                let config = VertexAIConfig::from_env().unwrap();
                assert_eq!(config.project_id, "proj");
                assert_eq!(config.location, "us-central1");
                assert_eq!(config.access_token.as_deref(), Some("tok"));
            },
        );
    }
}
