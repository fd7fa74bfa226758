use domain_embeddings::QdrantConfig;
use std::env;
use std::net::Ipv4Addr;
use thiserror::Error;

const DEFAULT_PORT: &str = "5050";
const MEMORY_DSN: &str = ":memory:";

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },

    #[error("Unsupported store DSN '{0}': expected ':memory:', 'qdrant://' or 'qdrants://'")]
    UnsupportedDsn(String),

    #[error("Invalid store DSN: {0}")]
    InvalidDsn(String),
}

/// Application environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env_or_default("APP_ENV", "development");

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Helper to load environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// HTTP server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    /// Reads `HOST` (default `0.0.0.0`) and `PORT` (default `5050`)
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let port = env_or_default("PORT", DEFAULT_PORT)
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "PORT".to_string(),
                details: format!("{}", e),
            })?;

        Ok(Self { host, port })
    }
}

/// Store backend selected by DSN
#[derive(Clone, Debug)]
pub enum StoreConfig {
    Memory,
    Qdrant(QdrantConfig),
}

impl StoreConfig {
    /// `:memory:` selects the in-memory store; `qdrant://[key@]host:port`
    /// and `qdrants://...` select Qdrant.
    pub fn from_dsn(dsn: &str) -> Result<Self, ConfigError> {
        let dsn = dsn.trim();

        if dsn == MEMORY_DSN {
            return Ok(StoreConfig::Memory);
        }

        if dsn.starts_with("qdrant://") || dsn.starts_with("qdrants://") {
            return QdrantConfig::from_dsn(dsn)
                .map(StoreConfig::Qdrant)
                .map_err(|e| ConfigError::InvalidDsn(e.to_string()));
        }

        Err(ConfigError::UnsupportedDsn(dsn.to_string()))
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Builds configuration from the environment, with the command line
    /// address (`host:port`) taking precedence over `HOST`/`PORT`.
    pub fn load(addr: Option<&str>, dsn: &str) -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        let mut server = ServerConfig::from_env()?;

        if let Some(addr) = addr {
            let (host, port) = addr.rsplit_once(':').ok_or_else(|| ConfigError::ParseError {
                key: "addr".to_string(),
                details: format!("expected host:port, got '{}'", addr),
            })?;

            if !host.is_empty() {
                server.host = host.to_string();
            }
            server.port = port.parse().map_err(|e| ConfigError::ParseError {
                key: "addr".to_string(),
                details: format!("{}", e),
            })?;
        }

        Ok(Self {
            environment,
            server,
            store: StoreConfig::from_dsn(dsn)?,
        })
    }
}
