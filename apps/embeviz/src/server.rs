use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use domain_embeddings::{
    ApiDoc, CohereEmbedder, Embedder, OpenAIEmbedder, ProviderError, ProvidersRepository,
    ProvidersService, VertexAIEmbedder, router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::config::ServerConfig;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// Builds the application: API routes under `/api/v1`, the OpenAPI document,
/// Scalar docs, `/health` and the cross-cutting layers.
pub fn create_app<R: ProvidersRepository + 'static>(service: Arc<ProvidersService<R>>) -> Router {
    let api = router(service).route("/openapi.json", get(openapi_json));

    Router::new()
        .merge(Scalar::with_url("/scalar", ApiDoc::openapi()))
        .nest("/api/v1", api)
        .route("/health", get(health))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // The visualisation UI is served from its own origin.
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
}

/// Registers a provider for every embedder whose credentials are present.
pub async fn register_embedders<R: ProvidersRepository>(
    service: &ProvidersService<R>,
) -> Result<(), ProviderError> {
    let embedders: [(&str, Result<Arc<dyn Embedder>, ProviderError>); 3] = [
        (
            "OpenAI",
            OpenAIEmbedder::from_env().map(|e| Arc::new(e) as Arc<dyn Embedder>),
        ),
        (
            "Cohere",
            CohereEmbedder::from_env().map(|e| Arc::new(e) as Arc<dyn Embedder>),
        ),
        (
            "VertexAI",
            VertexAIEmbedder::from_env().map(|e| Arc::new(e) as Arc<dyn Embedder>),
        ),
    ];

    for (name, embedder) in embedders {
        match embedder {
            Ok(embedder) => {
                service.register_embedder(embedder).await?;
            }
            Err(e) => tracing::debug!(embedder = name, error = %e, "Embedder not configured"),
        }
    }

    Ok(())
}

/// Serves `app` until SIGINT/SIGTERM, then closes the store.
pub async fn serve<R: ProvidersRepository + 'static>(
    service: Arc<ProvidersService<R>>,
    config: &ServerConfig,
) -> std::io::Result<()> {
    let app = create_app(service.clone());
    let listener = tokio::net::TcpListener::bind(config.address()).await?;

    info!("Server starting on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| tracing::error!("Server encountered an error: {:?}", e))?;

    info!("Shutting down: closing store");
    match service.close().await {
        Ok(()) => info!("Store closed successfully"),
        Err(e) => tracing::error!("Error closing store: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
