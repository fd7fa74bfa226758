use crate::error::{ProviderError, ProviderResult};

const DEFAULT_URL: &str = "http://localhost:6334";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Qdrant connection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl QdrantConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn from_env() -> ProviderResult<Self> {
        let url = std::env::var("QDRANT_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

        let api_key = std::env::var("QDRANT_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let timeout_secs = std::env::var("QDRANT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            url,
            api_key,
            timeout_secs,
        })
    }

    /// Parses `qdrant://[api-key@]host:port` (plaintext gRPC) or
    /// `qdrants://[api-key@]host:port` (TLS).
    pub fn from_dsn(dsn: &str) -> ProviderResult<Self> {
        let (scheme, rest) = dsn
            .split_once("://")
            .ok_or_else(|| ProviderError::Config(format!("invalid DSN: {}", dsn)))?;

        let http_scheme = match scheme {
            "qdrant" => "http",
            "qdrants" => "https",
            other => {
                return Err(ProviderError::Config(format!(
                    "unsupported DSN scheme: {}",
                    other
                )));
            }
        };

        let (api_key, host) = match rest.rsplit_once('@') {
            Some((key, host)) => (Some(key.to_string()).filter(|k| !k.is_empty()), host),
            None => (None, rest),
        };

        if host.is_empty() {
            return Err(ProviderError::Config(format!("missing host in DSN: {}", dsn)));
        }

        Ok(Self {
            url: format!("{}://{}", http_scheme, host.trim_end_matches('/')),
            api_key,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL.to_string())
    }
}
