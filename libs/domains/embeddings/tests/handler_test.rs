//! Handler tests for the Embeddings domain
//!
//! These tests drive the providers router with in-memory storage and check:
//! - Request deserialization (JSON → Rust structs)
//! - Response envelopes (`providers`, `embeddings`, `page`)
//! - HTTP status codes
//! - Error responses

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain_embeddings::*;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For oneshot()
use uuid::Uuid;

// Helper to parse JSON response body
async fn json_body<T: serde::de::DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Embeds every chunk as `[1, 2, 3, 4]`
struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn size(&self) -> usize {
        4
    }

    async fn embed(&self, chunks: &[String]) -> ProviderResult<Vec<Vec<f64>>> {
        Ok(chunks.iter().map(|_| vec![1.0, 2.0, 3.0, 4.0]).collect())
    }
}

fn setup() -> (Arc<ProvidersService<InMemoryProvidersRepository>>, Router) {
    let service = Arc::new(ProvidersService::new(InMemoryProvidersRepository::new()));
    let app = router(service.clone());
    (service, app)
}

#[tokio::test]
async fn test_create_provider_returns_201() {
    let (_, app) = setup();

    let response = app
        .oneshot(json_request("POST", "/providers", json!({ "name": "OpenAI" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let provider: Provider = json_body(response.into_body()).await;
    assert_eq!(provider.name, "OpenAI");
}

#[tokio::test]
async fn test_create_provider_rejects_empty_name() {
    let (_, app) = setup();

    let response = app
        .oneshot(json_request("POST", "/providers", json!({ "name": "  " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = json_body(response.into_body()).await;
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_list_providers_with_offset() {
    let (service, app) = setup();

    for i in 0..5 {
        service
            .add_provider(&format!("provider-{}", i), Metadata::new())
            .await
            .unwrap();
    }

    let response = app
        .oneshot(get("/providers?offset=2&limit=2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body: ProvidersResponse = json_body(response.into_body()).await;
    assert_eq!(body.providers.len(), 2);
    assert_eq!(body.providers[0].name, "provider-2");
    assert_eq!(body.providers[1].name, "provider-3");
    assert_eq!(body.page.count, Some(5));
}

#[tokio::test]
async fn test_get_unknown_provider_returns_404() {
    let (_, app) = setup();

    let response = app
        .oneshot(get(&format!("/providers/{}", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_embed_text_and_read_projections() {
    let (service, app) = setup();
    let provider = service
        .register_embedder(Arc::new(FixedEmbedder))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/providers/{}/embeddings", provider.id),
            json!({ "text": "hello world", "label": "greeting", "projection": "pca" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let added: Vec<Embedding> = json_body(response.into_body()).await;
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].values, vec![1.0, 2.0, 3.0, 4.0]);
    assert!(added[0].uid.is_some());
    assert_eq!(
        added[0].metadata.get("projection").and_then(MetadataValue::as_str),
        Some("pca")
    );

    let response = app
        .oneshot(get(&format!(
            "/providers/{}/projections?dim=2D",
            provider.id
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = json_body(response.into_body()).await;
    let points = body["embeddings"]["2D"].as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["value"].as_array().unwrap().len(), 2);
    assert!(body["embeddings"].get("3D").is_none());
}

#[tokio::test]
async fn test_put_raw_embeddings_pages_through_get() {
    let (service, app) = setup();
    let provider = service.add_provider("raw", Metadata::new()).await.unwrap();

    let embeddings: Vec<Value> = (0..3)
        .map(|i| json!({ "value": [i as f64, 1.0, 2.0, 3.0, 4.0] }))
        .collect();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/providers/{}/embeddings", provider.id),
            json!({ "projection": "pca", "embeddings": embeddings }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!(
            "/providers/{}/embeddings?offset=1&limit=5",
            provider.id
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body: EmbeddingsResponse = json_body(response.into_body()).await;
    assert_eq!(body.embeddings.len(), 2);
    assert_eq!(body.embeddings[0].values[0], 1.0);
    assert_eq!(body.page.count, Some(3));
}

#[tokio::test]
async fn test_put_with_existing_uid_appends_new_embedding() {
    let (service, app) = setup();
    let provider = service.add_provider("raw", Metadata::new()).await.unwrap();
    let uri = format!("/providers/{}/embeddings", provider.id);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &uri,
            json!({ "projection": "pca", "embeddings": [{ "value": [1.0, 2.0, 3.0, 4.0] }] }),
        ))
        .await
        .unwrap();
    let first: Vec<Embedding> = json_body(response.into_body()).await;
    let existing = first[0].uid.unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &uri,
            json!({
                "projection": "pca",
                "embeddings": [{ "uid": existing, "value": [9.0, 9.0, 9.0, 9.0] }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second: Vec<Embedding> = json_body(response.into_body()).await;
    assert_ne!(second[0].uid, Some(existing));

    let response = app.oneshot(get(&uri)).await.unwrap();
    let body: EmbeddingsResponse = json_body(response.into_body()).await;
    assert_eq!(body.page.count, Some(2));
    assert_eq!(body.embeddings[0].uid, Some(existing));
    assert_eq!(body.embeddings[0].values, vec![1.0, 2.0, 3.0, 4.0]);
    assert_ne!(body.embeddings[0].uid, body.embeddings[1].uid);
}

#[tokio::test]
async fn test_put_text_with_chunking_embeds_each_chunk() {
    let (service, app) = setup();
    let provider = service
        .register_embedder(Arc::new(FixedEmbedder))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/providers/{}/embeddings", provider.id),
            json!({
                "text": "aaaa bbbb cccc",
                "projection": "pca",
                "chunking": { "size": 9, "overlap": 4, "trim": true, "sep": false }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let added: Vec<Embedding> = json_body(response.into_body()).await;
    let labels: Vec<_> = added
        .iter()
        .map(|e| e.metadata.get("label").and_then(MetadataValue::as_str))
        .collect();
    assert_eq!(labels, vec![Some("aaaa bbbb"), Some("bbbb cccc")]);
}

#[tokio::test]
async fn test_put_text_without_embedder_returns_501() {
    let (service, app) = setup();
    let provider = service.add_provider("plain", Metadata::new()).await.unwrap();

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/providers/{}/embeddings", provider.id),
            json!({ "text": "hello", "projection": "pca" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_put_with_unknown_projection_returns_400() {
    let (service, app) = setup();
    let provider = service.add_provider("plain", Metadata::new()).await.unwrap();

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/providers/{}/embeddings", provider.id),
            json!({ "projection": "umap", "embeddings": [{ "value": [1.0, 2.0, 3.0, 4.0] }] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_projections_with_bad_dim_returns_400() {
    let (service, app) = setup();
    let provider = service.add_provider("plain", Metadata::new()).await.unwrap();

    let response = app
        .oneshot(get(&format!(
            "/providers/{}/projections?dim=4D",
            provider.id
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_embeddings_returns_204() {
    let (service, app) = setup();
    let provider = service.add_provider("plain", Metadata::new()).await.unwrap();
    service
        .update_embeddings(
            provider.id,
            vec![Embedding::new(vec![1.0, 2.0, 3.0, 4.0])],
            Projection::Pca,
        )
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/providers/{}/embeddings", provider.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (embeddings, _) = service
        .get_embeddings(provider.id, &ProviderFilter::unbounded())
        .await
        .unwrap();
    assert!(embeddings.is_empty());
}

#[tokio::test]
async fn test_delete_unknown_provider_returns_204() {
    let (_, app) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/providers/{}/embeddings", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_patch_projections_returns_202() {
    let (service, app) = setup();
    let provider = service.add_provider("plain", Metadata::new()).await.unwrap();
    service
        .update_embeddings(
            provider.id,
            vec![
                Embedding::new(vec![1.0, 2.0, 3.0, 4.0]),
                Embedding::new(vec![4.0, 3.0, 2.0, 1.0]),
            ],
            Projection::Pca,
        )
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/providers/{}/projections", provider.id),
            json!({ "projection": "tsne" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let (projections, _) = service
        .get_projections(provider.id, &ProviderFilter::unbounded())
        .await
        .unwrap();
    for dim in Dim::ALL {
        let points = &projections[&dim];
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| {
            p.metadata.get("projection").and_then(MetadataValue::as_str) == Some("tsne")
        }));
    }
}

#[tokio::test]
async fn test_closed_store_returns_500() {
    let (service, app) = setup();
    service.close().await.unwrap();

    let response = app.oneshot(get("/providers")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
