//! Embeviz
//!
//! HTTP API that stores embeddings per provider and serves their 2D/3D
//! projections for visualisation. Storage is in-memory or Qdrant, selected
//! by DSN.

use clap::Parser;
use domain_embeddings::{
    InMemoryProvidersRepository, ProvidersRepository, ProvidersService, QdrantProvidersRepository,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tracing::info;

mod config;
mod server;
mod telemetry;

use config::{Config, ServerConfig, StoreConfig};
use telemetry::{init_tracing, install_color_eyre};

#[derive(Parser)]
#[command(name = "embeviz")]
#[command(about = "Store embeddings and serve their 2D/3D projections")]
#[command(version)]
struct Cli {
    /// Listen address (host:port). Defaults to HOST/PORT or 0.0.0.0:5050.
    #[arg(short, long, env = "EMBEVIZ_ADDR")]
    addr: Option<String>,

    /// Store DSN: ":memory:", "qdrant://[api-key@]host:port" or "qdrants://..."
    #[arg(short, long, env = "EMBEVIZ_DSN", default_value = ":memory:")]
    dsn: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    let config = Config::load(cli.addr.as_deref(), &cli.dsn).wrap_err("Invalid configuration")?;

    init_tracing(&config.environment);

    match config.store {
        StoreConfig::Memory => {
            info!("Using in-memory store");
            run(InMemoryProvidersRepository::new(), &config.server).await
        }
        StoreConfig::Qdrant(qdrant) => {
            info!(url = %qdrant.url, "Using Qdrant store");
            let repository = QdrantProvidersRepository::new(qdrant)
                .await
                .wrap_err("Failed to create Qdrant client")?;
            run(repository, &config.server).await
        }
    }
}

async fn run<R: ProvidersRepository + 'static>(repository: R, server: &ServerConfig) -> Result<()> {
    let service = Arc::new(ProvidersService::new(repository));

    server::register_embedders(&service)
        .await
        .wrap_err("Failed to register embedders")?;

    server::serve(service, server)
        .await
        .wrap_err("Server error")?;

    info!("Embeviz shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults_to_memory() {
        temp_env::with_vars([("EMBEVIZ_DSN", None::<&str>), ("EMBEVIZ_ADDR", None)], || {
            let cli = Cli::try_parse_from(["embeviz"]).unwrap();
            assert_eq!(cli.dsn, ":memory:");
            assert!(cli.addr.is_none());
        });
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "embeviz",
            "--addr",
            "127.0.0.1:9000",
            "--dsn",
            "qdrant://localhost:6334",
        ])
        .unwrap();
        assert_eq!(cli.addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.dsn, "qdrant://localhost:6334");
    }
}
