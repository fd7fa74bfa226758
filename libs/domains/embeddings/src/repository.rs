use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};
use crate::models::{
    Embedding, Metadata, Page, Projection, Projections, Provider, ProviderFilter,
};
use crate::paging::apply_offset_limit;
use crate::projection;

/// Provider registry and embedding store.
///
/// Every mutation of a provider's embedding set recomputes both projections
/// from the full current set before it becomes visible.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProvidersRepository: Send + Sync {
    /// Register a provider. A provider with the same name is returned as is.
    async fn add_provider(&self, name: &str, metadata: Metadata) -> ProviderResult<Provider>;

    /// List providers in store iteration order
    async fn get_providers(&self, filter: &ProviderFilter)
    -> ProviderResult<(Vec<Provider>, Page)>;

    /// Get a provider by its UID
    async fn get_provider(&self, uid: Uuid) -> ProviderResult<Provider>;

    /// Page through a provider's embeddings in insertion order
    async fn get_embeddings(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Vec<Embedding>, Page)>;

    /// Page through a provider's projections, optionally a single dimension
    async fn get_projections(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Projections, Page)>;

    /// Append embeddings and recompute projections. Returns the added embeddings.
    async fn update_embeddings(
        &self,
        uid: Uuid,
        embeddings: Vec<Embedding>,
        projection: Projection,
    ) -> ProviderResult<Vec<Embedding>>;

    /// Clear a provider's embeddings together with its projections
    async fn drop_embeddings(&self, uid: Uuid) -> ProviderResult<()>;

    /// Recompute projections over the current embedding set
    async fn compute_projections(&self, uid: Uuid, projection: Projection) -> ProviderResult<()>;

    /// Release the underlying store. Later calls fail.
    async fn close(&self) -> ProviderResult<()>;
}

#[derive(Debug, Clone)]
struct ProviderRecord {
    provider: Provider,
    embeddings: Vec<Embedding>,
    projections: Projections,
}

#[derive(Debug, Default)]
struct Store {
    closed: bool,
    order: Vec<Uuid>,
    providers: HashMap<Uuid, ProviderRecord>,
}

impl Store {
    fn ensure_open(&self) -> ProviderResult<()> {
        if self.closed {
            return Err(ProviderError::Closed);
        }
        Ok(())
    }

    fn record(&self, uid: Uuid) -> ProviderResult<&ProviderRecord> {
        self.ensure_open()?;
        self.providers
            .get(&uid)
            .ok_or(ProviderError::ProviderNotFound(uid))
    }

    fn record_mut(&mut self, uid: Uuid) -> ProviderResult<&mut ProviderRecord> {
        self.ensure_open()?;
        self.providers
            .get_mut(&uid)
            .ok_or(ProviderError::ProviderNotFound(uid))
    }
}

/// In-memory implementation of ProvidersRepository.
///
/// One lock guards the whole keyspace. Writers hold it while projections are
/// computed, so a slow t-SNE run blocks every provider in the store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProvidersRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryProvidersRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
        }
    }
}

#[async_trait]
impl ProvidersRepository for InMemoryProvidersRepository {
    async fn add_provider(&self, name: &str, metadata: Metadata) -> ProviderResult<Provider> {
        let mut store = self.store.write().await;
        store.ensure_open()?;

        let existing = store
            .order
            .iter()
            .filter_map(|id| store.providers.get(id))
            .find(|r| r.provider.name == name);

        if let Some(record) = existing {
            tracing::debug!(provider_id = %record.provider.id, name, "Provider already registered");
            return Ok(record.provider.clone());
        }

        let provider = Provider::new(name, metadata);
        let record = ProviderRecord {
            provider: provider.clone(),
            embeddings: Vec::new(),
            projections: projection::compute(&[], Projection::Pca)?,
        };
        store.order.push(provider.id);
        store.providers.insert(provider.id, record);

        tracing::info!(provider_id = %provider.id, name, "Created provider");
        Ok(provider)
    }

    async fn get_providers(
        &self,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Vec<Provider>, Page)> {
        let store = self.store.read().await;
        store.ensure_open()?;

        let providers: Vec<Provider> = store
            .order
            .iter()
            .filter_map(|id| store.providers.get(id))
            .map(|r| r.provider.clone())
            .collect();

        let page = Page::with_count(providers.len());
        Ok((
            apply_offset_limit(&providers, filter.offset, filter.limit),
            page,
        ))
    }

    async fn get_provider(&self, uid: Uuid) -> ProviderResult<Provider> {
        let store = self.store.read().await;
        Ok(store.record(uid)?.provider.clone())
    }

    async fn get_embeddings(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Vec<Embedding>, Page)> {
        let store = self.store.read().await;
        let record = store.record(uid)?;

        let page = Page::with_count(record.embeddings.len());
        Ok((
            apply_offset_limit(&record.embeddings, filter.offset, filter.limit),
            page,
        ))
    }

    async fn get_projections(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Projections, Page)> {
        let store = self.store.read().await;
        let record = store.record(uid)?;

        let mut result = Projections::new();
        let mut count = 0;
        for (dim, set) in &record.projections {
            if filter.dim.is_some_and(|d| d != *dim) {
                continue;
            }
            count = count.max(set.len());
            result.insert(*dim, apply_offset_limit(set, filter.offset, filter.limit));
        }

        Ok((result, Page::with_count(count)))
    }

    async fn update_embeddings(
        &self,
        uid: Uuid,
        mut embeddings: Vec<Embedding>,
        projection: Projection,
    ) -> ProviderResult<Vec<Embedding>> {
        let mut store = self.store.write().await;
        let record = store.record_mut(uid)?;

        for emb in &mut embeddings {
            emb.assign_uid();
        }

        let mut all = record.embeddings.clone();
        all.extend(embeddings.iter().cloned());

        // Nothing is committed unless the projections compute cleanly.
        let projections = projection::compute(&all, projection)?;
        record.embeddings = all;
        record.projections = projections;

        tracing::info!(
            provider_id = %uid,
            added = embeddings.len(),
            total = record.embeddings.len(),
            %projection,
            "Updated embeddings"
        );
        Ok(embeddings)
    }

    async fn drop_embeddings(&self, uid: Uuid) -> ProviderResult<()> {
        let mut store = self.store.write().await;
        let record = store.record_mut(uid)?;

        record.embeddings.clear();
        for set in record.projections.values_mut() {
            set.clear();
        }

        tracing::info!(provider_id = %uid, "Dropped embeddings");
        Ok(())
    }

    async fn compute_projections(&self, uid: Uuid, projection: Projection) -> ProviderResult<()> {
        let mut store = self.store.write().await;
        let record = store.record_mut(uid)?;

        record.projections = projection::compute(&record.embeddings, projection)?;

        tracing::info!(provider_id = %uid, %projection, "Recomputed projections");
        Ok(())
    }

    async fn close(&self) -> ProviderResult<()> {
        let mut store = self.store.write().await;
        store.ensure_open()?;

        store.closed = true;
        store.order.clear();
        store.providers.clear();

        tracing::info!("Closed in-memory store");
        Ok(())
    }
}
