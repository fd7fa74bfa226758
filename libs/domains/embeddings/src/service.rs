use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use crate::chunking::split_text;
use crate::embedding::{Embedder, chunk_label};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{
    Embedding, EmbeddingsUpdate, LABEL_META_KEY, Metadata, MetadataValue, PROJECTION_META_KEY,
    Page, Projection, Projections, ProjectionsUpdate, Provider, ProviderFilter,
};
use crate::repository::ProvidersRepository;

/// Providers service: the repository plus the embedders registered for
/// text-driven updates
pub struct ProvidersService<R: ProvidersRepository> {
    repository: Arc<R>,
    embedders: RwLock<HashMap<Uuid, Arc<dyn Embedder>>>,
}

impl<R: ProvidersRepository> ProvidersService<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository: Arc::new(repository),
            embedders: RwLock::new(HashMap::new()),
        }
    }

    #[instrument(skip(self, metadata))]
    pub async fn add_provider(&self, name: &str, metadata: Metadata) -> ProviderResult<Provider> {
        if name.trim().is_empty() {
            return Err(ProviderError::Validation(
                "provider name cannot be empty".to_string(),
            ));
        }
        self.repository.add_provider(name, metadata).await
    }

    /// Registers `embedder` as a provider named after it, so text can be
    /// embedded for that provider.
    #[instrument(skip(self, embedder), fields(name = embedder.name()))]
    pub async fn register_embedder(&self, embedder: Arc<dyn Embedder>) -> ProviderResult<Provider> {
        let mut metadata = Metadata::new();
        metadata.insert("size".to_string(), (embedder.size() as u64).into());

        let provider = self
            .repository
            .add_provider(embedder.name(), metadata)
            .await?;
        self.embedders.write().await.insert(provider.id, embedder);

        tracing::info!(provider_id = %provider.id, name = %provider.name, "Registered embedder");
        Ok(provider)
    }

    pub async fn get_providers(
        &self,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Vec<Provider>, Page)> {
        self.repository.get_providers(filter).await
    }

    pub async fn get_provider(&self, uid: Uuid) -> ProviderResult<Provider> {
        self.repository.get_provider(uid).await
    }

    pub async fn get_embeddings(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Vec<Embedding>, Page)> {
        self.repository.get_embeddings(uid, filter).await
    }

    pub async fn get_projections(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Projections, Page)> {
        self.repository.get_projections(uid, filter).await
    }

    #[instrument(skip(self, embeddings), fields(provider_id = %uid, count = embeddings.len()))]
    pub async fn update_embeddings(
        &self,
        uid: Uuid,
        embeddings: Vec<Embedding>,
        projection: Projection,
    ) -> ProviderResult<Vec<Embedding>> {
        self.repository
            .update_embeddings(uid, embeddings, projection)
            .await
    }

    /// Adds embeddings from a request, embedding its text when no raw
    /// vectors are supplied.
    #[instrument(skip(self, req), fields(provider_id = %uid))]
    pub async fn embed_text(
        &self,
        uid: Uuid,
        req: EmbeddingsUpdate,
    ) -> ProviderResult<Vec<Embedding>> {
        let projection = Projection::parse(&req.projection)?;
        self.repository.get_provider(uid).await?;

        let mut base = req.metadata;
        base.insert(PROJECTION_META_KEY.to_string(), projection.into());
        if !req.label.is_empty() {
            base.insert(LABEL_META_KEY.to_string(), req.label.into());
        }

        let embeddings = match req.embeddings.filter(|e| !e.is_empty()) {
            Some(raw) => raw
                .into_iter()
                .map(|mut emb| {
                    let mut metadata = base.clone();
                    metadata.append(&mut emb.metadata);
                    emb.metadata = metadata;
                    emb
                })
                .collect(),
            None => {
                let chunks = match (req.chunks, req.chunking) {
                    (Some(chunks), _) if !chunks.is_empty() => chunks,
                    _ if req.text.trim().is_empty() => {
                        return Err(ProviderError::Validation(
                            "either text or embeddings must be provided".to_string(),
                        ));
                    }
                    (_, Some(opts)) => split_text(&req.text, &opts)?,
                    _ => vec![req.text],
                };
                self.embed_chunks(uid, &chunks, &base).await?
            }
        };

        self.repository
            .update_embeddings(uid, embeddings, projection)
            .await
    }

    async fn embed_chunks(
        &self,
        uid: Uuid,
        chunks: &[String],
        base: &Metadata,
    ) -> ProviderResult<Vec<Embedding>> {
        let embedder = self
            .embedders
            .read()
            .await
            .get(&uid)
            .cloned()
            .ok_or_else(|| {
                ProviderError::NotImplemented(format!("no embedder registered for provider {}", uid))
            })?;

        let vectors = embedder.embed(chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(ProviderError::Embedding(format!(
                "{} returned {} vectors for {} chunks",
                embedder.name(),
                vectors.len(),
                chunks.len()
            )));
        }

        let label = base
            .get(LABEL_META_KEY)
            .and_then(MetadataValue::as_str)
            .unwrap_or_default();

        Ok(chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| {
                let mut metadata = base.clone();
                metadata.insert(LABEL_META_KEY.to_string(), chunk_label(label, chunk).into());
                Embedding::new(values).with_metadata(metadata)
            })
            .collect())
    }

    #[instrument(skip(self), fields(provider_id = %uid))]
    pub async fn drop_embeddings(&self, uid: Uuid) -> ProviderResult<()> {
        self.repository.drop_embeddings(uid).await
    }

    #[instrument(skip(self, req), fields(provider_id = %uid))]
    pub async fn compute_projections(
        &self,
        uid: Uuid,
        req: ProjectionsUpdate,
    ) -> ProviderResult<()> {
        let projection = Projection::parse(&req.projection)?;
        self.repository.compute_projections(uid, projection).await
    }

    pub async fn close(&self) -> ProviderResult<()> {
        self.repository.close().await
    }
}
