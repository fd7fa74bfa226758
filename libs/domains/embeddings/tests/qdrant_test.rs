//! Qdrant repository tests
//!
//! These need a running Qdrant instance (`QDRANT_URL`, default
//! `http://localhost:6334`) and are ignored by default:
//!
//! ```sh
//! docker run -p 6334:6334 qdrant/qdrant
//! cargo test -p domain_embeddings --test qdrant_test -- --ignored
//! ```

use domain_embeddings::*;
use uuid::Uuid;

async fn repository() -> QdrantProvidersRepository {
    let config = QdrantConfig::from_env().unwrap();
    QdrantProvidersRepository::new(config).await.unwrap()
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

fn provider_metadata(size: u64) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("size".to_string(), size.into());
    metadata.insert("distance".to_string(), "Cosine".into());
    metadata
}

fn vectors(n: usize) -> Vec<Embedding> {
    (0..n)
        .map(|i| {
            let x = i as f64 + 1.0;
            Embedding::new(vec![x, x.sqrt(), x.ln_1p(), 1.0 / x, 0.5])
        })
        .collect()
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance"]
async fn test_provider_lifecycle() {
    let repo = repository().await;
    let name = unique_name("lifecycle");

    let provider = repo.add_provider(&name, provider_metadata(5)).await.unwrap();
    assert_eq!(provider.name, name);
    assert_eq!(
        provider.metadata.get("size").and_then(MetadataValue::as_f64),
        Some(5.0)
    );

    // Same name resolves to the same provider.
    let again = repo.add_provider(&name, provider_metadata(5)).await.unwrap();
    assert_eq!(again.id, provider.id);

    let fetched = repo.get_provider(provider.id).await.unwrap();
    assert_eq!(fetched.name, name);

    let added = repo
        .update_embeddings(provider.id, vectors(4), Projection::Pca)
        .await
        .unwrap();
    assert_eq!(added.len(), 4);
    assert!(added.iter().all(|e| e.uid.is_some()));

    let (embeddings, _) = repo
        .get_embeddings(provider.id, &ProviderFilter::unbounded())
        .await
        .unwrap();
    assert_eq!(embeddings.len(), 4);
    assert!(
        embeddings
            .iter()
            .all(|e| !e.metadata.contains_key("_projection"))
    );

    let (projections, _) = repo
        .get_projections(provider.id, &ProviderFilter::unbounded())
        .await
        .unwrap();
    for dim in Dim::ALL {
        let points = &projections[&dim];
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| p.values.len() == dim.size()));
    }

    repo.drop_embeddings(provider.id).await.unwrap();
    let (embeddings, _) = repo
        .get_embeddings(provider.id, &ProviderFilter::unbounded())
        .await
        .unwrap();
    assert!(embeddings.is_empty());

    // The alias survives a drop.
    assert_eq!(repo.get_provider(provider.id).await.unwrap().name, name);
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance"]
async fn test_cursor_paging() {
    let repo = repository().await;
    let provider = repo
        .add_provider(&unique_name("paging"), provider_metadata(5))
        .await
        .unwrap();

    repo.update_embeddings(provider.id, vectors(5), Projection::Pca)
        .await
        .unwrap();

    let (first, page) = repo
        .get_embeddings(provider.id, &ProviderFilter::default().with_limit(3))
        .await
        .unwrap();
    assert_eq!(first.len(), 3);
    let cursor = page.next.expect("a second page");

    let (rest, page) = repo
        .get_embeddings(
            provider.id,
            &ProviderFilter::default().with_limit(3).with_cursor(cursor),
        )
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
    assert!(page.next.is_none());

    repo.drop_embeddings(provider.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance"]
async fn test_rejects_invalid_embeddings() {
    let repo = repository().await;
    let provider = repo
        .add_provider(&unique_name("invalid"), provider_metadata(5))
        .await
        .unwrap();

    let err = repo
        .update_embeddings(
            provider.id,
            vec![Embedding::new(vec![1.0, 2.0, 3.0])],
            Projection::Pca,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let err = repo.add_provider(&unique_name("nosize"), Metadata::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance"]
async fn test_unknown_provider_is_not_found() {
    let repo = repository().await;
    let err = repo.get_provider(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance"]
async fn test_closed_repository_fails_internal() {
    let repo = repository().await;
    repo.close().await.unwrap();

    let err = repo
        .get_providers(&ProviderFilter::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
#[ignore = "requires a running Qdrant instance"]
async fn test_resent_uid_does_not_overwrite_point() {
    let repo = repository().await;
    let provider = repo
        .add_provider(&unique_name("resend"), provider_metadata(5))
        .await
        .unwrap();

    let first = repo
        .update_embeddings(
            provider.id,
            vec![Embedding::new(vec![1.0, 2.0, 3.0, 4.0, 5.0])],
            Projection::Pca,
        )
        .await
        .unwrap();
    let existing = first[0].uid.unwrap();

    let resent = Embedding::new(vec![9.0, 9.0, 9.0, 9.0, 9.0]).with_uid(existing);
    let second = repo
        .update_embeddings(provider.id, vec![resent], Projection::Pca)
        .await
        .unwrap();
    assert_ne!(second[0].uid, Some(existing));

    let (stored, _) = repo
        .get_embeddings(provider.id, &ProviderFilter::unbounded())
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].uid, Some(existing));
    assert_eq!(stored[0].values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(stored[1].uid, second[0].uid);
}
