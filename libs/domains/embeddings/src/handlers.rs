use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::{ErrorKind, ProviderResult};
use crate::models::{
    Chunking, CreateProvider, Dim, Embedding, EmbeddingsResponse, EmbeddingsUpdate, ErrorResponse,
    Page, PageQuery, Projection, ProjectionsResponse, ProjectionsUpdate, Provider,
    ProvidersResponse,
};
use crate::repository::ProvidersRepository;
use crate::service::ProvidersService;

const TAG: &str = "providers";

/// OpenAPI documentation for the Providers API
#[derive(OpenApi)]
#[openapi(
    paths(
        list_providers,
        create_provider,
        get_provider,
        get_embeddings,
        update_embeddings,
        drop_embeddings,
        get_projections,
        compute_projections,
    ),
    components(schemas(
        Provider,
        CreateProvider,
        Embedding,
        EmbeddingsUpdate,
        Chunking,
        ProjectionsUpdate,
        ProvidersResponse,
        EmbeddingsResponse,
        ProjectionsResponse,
        ErrorResponse,
        Page,
        Dim,
        Projection,
    )),
    tags(
        (name = TAG, description = "Embeddings providers, embeddings and projections")
    ),
    servers(
        (url = "/api/v1", description = "Embeddings API")
    )
)]
pub struct ApiDoc;

/// Create the providers router with all HTTP endpoints
pub fn router<R: ProvidersRepository + 'static>(service: Arc<ProvidersService<R>>) -> Router {
    Router::new()
        .route("/providers", get(list_providers).post(create_provider))
        .route("/providers/{uid}", get(get_provider))
        .route(
            "/providers/{uid}/embeddings",
            get(get_embeddings)
                .put(update_embeddings)
                .delete(drop_embeddings),
        )
        .route(
            "/providers/{uid}/projections",
            get(get_projections).patch(compute_projections),
        )
        .with_state(service)
}

/// List registered providers
#[utoipa::path(
    get,
    path = "/providers",
    tag = TAG,
    params(PageQuery),
    responses(
        (status = 200, description = "Page of providers", body = ProvidersResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
async fn list_providers<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Query(query): Query<PageQuery>,
) -> ProviderResult<Json<ProvidersResponse>> {
    let filter = query.into_filter()?;
    let (providers, page) = service.get_providers(&filter).await?;
    Ok(Json(ProvidersResponse { providers, page }))
}

/// Register a provider
#[utoipa::path(
    post,
    path = "/providers",
    tag = TAG,
    request_body = CreateProvider,
    responses(
        (status = 201, description = "Provider registered (or the existing one with that name)", body = Provider),
        (status = 400, description = "Invalid provider", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
async fn create_provider<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Json(input): Json<CreateProvider>,
) -> ProviderResult<impl IntoResponse> {
    let provider = service.add_provider(&input.name, input.metadata).await?;
    Ok((StatusCode::CREATED, Json(provider)))
}

/// Get a provider by UID
#[utoipa::path(
    get,
    path = "/providers/{uid}",
    tag = TAG,
    params(
        ("uid" = Uuid, Path, description = "Provider UID")
    ),
    responses(
        (status = 200, description = "Provider found", body = Provider),
        (status = 404, description = "Provider not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
async fn get_provider<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Path(uid): Path<Uuid>,
) -> ProviderResult<Json<Provider>> {
    let provider = service.get_provider(uid).await?;
    Ok(Json(provider))
}

/// Page through a provider's embeddings
#[utoipa::path(
    get,
    path = "/providers/{uid}/embeddings",
    tag = TAG,
    params(
        ("uid" = Uuid, Path, description = "Provider UID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Page of embeddings", body = EmbeddingsResponse),
        (status = 404, description = "Provider not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
async fn get_embeddings<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Path(uid): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ProviderResult<Json<EmbeddingsResponse>> {
    let filter = query.into_filter()?;
    let (embeddings, page) = service.get_embeddings(uid, &filter).await?;
    Ok(Json(EmbeddingsResponse { embeddings, page }))
}

/// Add embeddings to a provider and recompute its projections
#[utoipa::path(
    put,
    path = "/providers/{uid}/embeddings",
    tag = TAG,
    params(
        ("uid" = Uuid, Path, description = "Provider UID")
    ),
    request_body = EmbeddingsUpdate,
    responses(
        (status = 200, description = "Embeddings added", body = Vec<Embedding>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Provider not found", body = ErrorResponse),
        (status = 500, description = "Store or embedder failure", body = ErrorResponse),
        (status = 501, description = "Provider has no embedder", body = ErrorResponse)
    )
)]
async fn update_embeddings<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Path(uid): Path<Uuid>,
    Json(req): Json<EmbeddingsUpdate>,
) -> ProviderResult<Json<Vec<Embedding>>> {
    let added = service.embed_text(uid, req).await?;
    Ok(Json(added))
}

/// Drop all embeddings and projections of a provider
#[utoipa::path(
    delete,
    path = "/providers/{uid}/embeddings",
    tag = TAG,
    params(
        ("uid" = Uuid, Path, description = "Provider UID")
    ),
    responses(
        (status = 204, description = "Embeddings dropped"),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
async fn drop_embeddings<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Path(uid): Path<Uuid>,
) -> ProviderResult<StatusCode> {
    match service.drop_embeddings(uid).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        // Deleting from an unknown provider is already done.
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(StatusCode::NO_CONTENT),
        Err(err) => Err(err),
    }
}

/// Page through a provider's projections
#[utoipa::path(
    get,
    path = "/providers/{uid}/projections",
    tag = TAG,
    params(
        ("uid" = Uuid, Path, description = "Provider UID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Page of projections keyed by dimension", body = ProjectionsResponse),
        (status = 400, description = "Invalid dimension", body = ErrorResponse),
        (status = 404, description = "Provider not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
async fn get_projections<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Path(uid): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ProviderResult<Json<ProjectionsResponse>> {
    let filter = query.into_filter()?;
    let (projections, page) = service.get_projections(uid, &filter).await?;
    Ok(Json(ProjectionsResponse { projections, page }))
}

/// Recompute a provider's projections
#[utoipa::path(
    patch,
    path = "/providers/{uid}/projections",
    tag = TAG,
    params(
        ("uid" = Uuid, Path, description = "Provider UID")
    ),
    request_body = ProjectionsUpdate,
    responses(
        (status = 202, description = "Projections recomputed"),
        (status = 400, description = "Invalid projection", body = ErrorResponse),
        (status = 404, description = "Provider not found", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
async fn compute_projections<R: ProvidersRepository>(
    State(service): State<Arc<ProvidersService<R>>>,
    Path(uid): Path<Uuid>,
    Json(req): Json<ProjectionsUpdate>,
) -> ProviderResult<StatusCode> {
    service.compute_projections(uid, req).await?;
    Ok(StatusCode::ACCEPTED)
}
