use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    self, CreateAliasBuilder, CreateCollectionBuilder, Distance, NamedVectors,
    OptimizersConfigDiffBuilder, PointId, PointStruct, PointVectors, PointsIdsList,
    RetrievedPoint, ScrollPointsBuilder, SetPayloadPointsBuilder, UpdatePointVectorsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder, VectorsConfig,
    VectorsConfigBuilder,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::QdrantConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::models::{
    Dim, Embedding, Metadata, MetadataValue, PROJECTION_META_KEY, Page, Projection, Projections,
    Provider, ProviderFilter,
};
use crate::paging::apply_offset_limit;
use crate::projection;
use crate::repository::ProvidersRepository;

/// Named vector holding the source embedding
const EMBEDDING_VECTOR: &str = "embedding";
/// Payload key recording the algorithm behind the stored projections
const PROJECTION_PAYLOAD_KEY: &str = "_projection";
const SIZE_META_KEY: &str = "size";
const DISTANCE_META_KEY: &str = "distance";
const DEFAULT_DISTANCE: Distance = Distance::Dot;
const DEFAULT_SEGMENT_NUMBER: u64 = 2;
const SCROLL_BATCH: u32 = 256;

/// Qdrant-backed implementation of ProvidersRepository.
///
/// Each provider is a collection named by its UID with the provider name as
/// an alias. Points carry the source embedding plus `2D`/`3D` named vectors
/// for its projections. Reads page by point-id cursor.
pub struct QdrantProvidersRepository {
    client: RwLock<Option<Arc<Qdrant>>>,
}

impl QdrantProvidersRepository {
    pub async fn new(config: QdrantConfig) -> ProviderResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }

        builder = builder.timeout(Duration::from_secs(config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| ProviderError::Qdrant(format!("Failed to build client: {}", e)))?;

        tracing::info!(url = %config.url, "Connected Qdrant client");
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self {
            client: RwLock::new(Some(Arc::new(client))),
        }
    }

    async fn client(&self) -> ProviderResult<Arc<Qdrant>> {
        self.client.read().await.clone().ok_or(ProviderError::Closed)
    }

    async fn ensure_provider(client: &Qdrant, uid: Uuid) -> ProviderResult<()> {
        if client.collection_exists(uid.to_string()).await? {
            Ok(())
        } else {
            Err(ProviderError::ProviderNotFound(uid))
        }
    }

    async fn collection_vectors_config(
        client: &Qdrant,
        uid: Uuid,
    ) -> ProviderResult<Option<VectorsConfig>> {
        let info = client.collection_info(uid.to_string()).await?;
        Ok(info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config))
    }

    async fn provider_metadata(client: &Qdrant, uid: Uuid) -> ProviderResult<Metadata> {
        let config = Self::collection_vectors_config(client, uid).await?;
        let mut metadata = Metadata::new();

        if let Some((size, distance)) = Self::embedding_params(&config) {
            metadata.insert(SIZE_META_KEY.to_string(), size.into());
            metadata.insert(
                DISTANCE_META_KEY.to_string(),
                distance.as_str_name().into(),
            );
        }

        Ok(metadata)
    }

    async fn create_collection(
        client: &Qdrant,
        uid: Uuid,
        vectors_config: impl Into<VectorsConfig>,
    ) -> ProviderResult<()> {
        client
            .create_collection(
                CreateCollectionBuilder::new(uid.to_string())
                    .vectors_config(vectors_config)
                    .optimizers_config(
                        OptimizersConfigDiffBuilder::default()
                            .default_segment_number(DEFAULT_SEGMENT_NUMBER),
                    ),
            )
            .await?;
        Ok(())
    }

    /// Fetches one page of points ordered by point id.
    async fn scroll(
        client: &Qdrant,
        uid: Uuid,
        limit: i64,
        cursor: Option<&str>,
    ) -> ProviderResult<(Vec<RetrievedPoint>, Option<String>)> {
        let mut builder = ScrollPointsBuilder::new(uid.to_string())
            .with_payload(true)
            .with_vectors(true);

        if let Ok(limit) = u32::try_from(limit) {
            builder = builder.limit(limit);
        }

        if let Some(cursor) = cursor {
            builder = builder.offset(Self::cursor_to_point_id(cursor)?);
        }

        let response = client.scroll(builder).await?;
        let next = response
            .next_page_offset
            .as_ref()
            .map(Self::point_id_to_cursor)
            .transpose()?;

        tracing::debug!(
            provider_id = %uid,
            points = response.result.len(),
            next = ?next,
            "Fetched page"
        );
        Ok((response.result, next))
    }

    /// Fetches points from `cursor` on. A non-positive `limit` reads to the end.
    async fn scroll_page(
        client: &Qdrant,
        uid: Uuid,
        limit: i64,
        cursor: Option<&str>,
    ) -> ProviderResult<(Vec<RetrievedPoint>, Option<String>)> {
        if limit > 0 {
            return Self::scroll(client, uid, limit, cursor).await;
        }

        let mut points = Vec::new();
        let mut cursor = cursor.map(str::to_string);
        loop {
            let (batch, next) =
                Self::scroll(client, uid, SCROLL_BATCH as i64, cursor.as_deref()).await?;
            points.extend(batch);

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok((points, None))
    }

    async fn scroll_all(client: &Qdrant, uid: Uuid) -> ProviderResult<Vec<Embedding>> {
        let (points, _) = Self::scroll_page(client, uid, 0, None).await?;
        points.iter().map(Self::point_to_embedding).collect()
    }

    /// Recomputes projections over every stored embedding and writes them
    /// back as named vectors.
    async fn recompute(
        client: &Qdrant,
        uid: Uuid,
        projection: Projection,
    ) -> ProviderResult<usize> {
        let embeddings = Self::scroll_all(client, uid).await?;
        if embeddings.is_empty() {
            return Ok(0);
        }

        let projections = projection::compute(&embeddings, projection)?;

        let mut ids = Vec::with_capacity(embeddings.len());
        let mut points = Vec::with_capacity(embeddings.len());

        for (i, emb) in embeddings.iter().enumerate() {
            let Some(id) = emb.uid else {
                continue;
            };
            let vectors: HashMap<String, Vec<f32>> = projections
                .iter()
                .filter_map(|(dim, set)| set.get(i).map(|p| (dim.to_string(), to_f32(&p.values))))
                .collect();

            ids.push(Self::uuid_to_point_id(id));
            points.push(PointVectors {
                id: Some(Self::uuid_to_point_id(id)),
                vectors: Some(vectors.into()),
            });
        }

        let collection = uid.to_string();
        client
            .update_vectors(UpdatePointVectorsBuilder::new(&collection, points).wait(true))
            .await?;

        let tag: HashMap<String, QdrantValue> = HashMap::from([(
            PROJECTION_PAYLOAD_KEY.to_string(),
            QdrantValue::from(projection.to_string()),
        )]);
        client
            .set_payload(
                SetPayloadPointsBuilder::new(&collection, tag)
                    .points_selector(PointsIdsList { ids })
                    .wait(true),
            )
            .await?;

        Ok(embeddings.len())
    }

    fn vectors_config(size: u64, distance: Distance) -> VectorsConfigBuilder {
        let mut config = VectorsConfigBuilder::default();
        config.add_named_vector_params(
            EMBEDDING_VECTOR,
            VectorParamsBuilder::new(size, distance).build(),
        );
        for dim in Dim::ALL {
            config.add_named_vector_params(
                dim.to_string(),
                VectorParamsBuilder::new(dim.size() as u64, Distance::Euclid).build(),
            );
        }
        config
    }

    /// Reads the required `size` and optional `distance` from provider metadata
    fn vector_params(metadata: &Metadata) -> ProviderResult<(u64, Distance)> {
        let size = metadata
            .get(SIZE_META_KEY)
            .and_then(MetadataValue::as_f64)
            .ok_or_else(|| ProviderError::Validation("missing vector size".to_string()))?;

        if size.fract() != 0.0 || size <= Dim::D3.size() as f64 {
            return Err(ProviderError::Validation(format!(
                "invalid vector size: {}",
                size
            )));
        }

        let distance = match metadata.get(DISTANCE_META_KEY) {
            None | Some(MetadataValue::Null) => DEFAULT_DISTANCE,
            Some(MetadataValue::String(name)) => Self::parse_distance(name)?,
            Some(other) => {
                return Err(ProviderError::Validation(format!(
                    "invalid vector distance: {:?}",
                    other
                )));
            }
        };

        Ok((size as u64, distance))
    }

    fn parse_distance(name: &str) -> ProviderResult<Distance> {
        match name.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            "euclid" | "euclidean" => Ok(Distance::Euclid),
            "dot" => Ok(Distance::Dot),
            "manhattan" => Ok(Distance::Manhattan),
            _ => Err(ProviderError::Validation(format!(
                "invalid vector distance: {}",
                name
            ))),
        }
    }

    fn embedding_params(config: &Option<VectorsConfig>) -> Option<(u64, Distance)> {
        match config.as_ref().and_then(|c| c.config.as_ref()) {
            Some(qdrant::vectors_config::Config::Params(p)) => Some((p.size, p.distance())),
            Some(qdrant::vectors_config::Config::ParamsMap(map)) => map
                .map
                .get(EMBEDDING_VECTOR)
                .map(|p| (p.size, p.distance())),
            None => None,
        }
    }

    /// Rejects embeddings the collection cannot store or project.
    fn validate_embeddings(embeddings: &[Embedding], size: Option<u64>) -> ProviderResult<()> {
        for emb in embeddings {
            let len = emb.values.len();
            if len <= Dim::D3.size() {
                return Err(ProviderError::Validation(format!(
                    "embedding dimension {} too small to project",
                    len
                )));
            }
            if let Some(size) = size {
                if len as u64 != size {
                    return Err(ProviderError::Validation(format!(
                        "embedding dimension mismatch: expected {}, got {}",
                        size, len
                    )));
                }
            }
            if let Some((key, _)) = emb.metadata.iter().find(|(_, v)| !v.is_scalar()) {
                return Err(ProviderError::Validation(format!(
                    "nested metadata is not supported: {}",
                    key
                )));
            }
        }
        Ok(())
    }

    fn uuid_to_point_id(id: Uuid) -> PointId {
        PointId::from(id.to_string())
    }

    fn point_id_to_uuid(point_id: &PointId) -> ProviderResult<Uuid> {
        match &point_id.point_id_options {
            Some(qdrant::point_id::PointIdOptions::Uuid(uuid_str)) => Uuid::parse_str(uuid_str)
                .map_err(|e| ProviderError::Internal(format!("Invalid UUID: {}", e))),
            Some(qdrant::point_id::PointIdOptions::Num(num)) => Ok(Uuid::from_u128(*num as u128)),
            None => Err(ProviderError::Internal("Missing point ID".to_string())),
        }
    }

    fn point_id_to_cursor(point_id: &PointId) -> ProviderResult<String> {
        Self::point_id_to_uuid(point_id).map(|id| id.to_string())
    }

    fn cursor_to_point_id(cursor: &str) -> ProviderResult<PointId> {
        let id = Uuid::parse_str(cursor)
            .map_err(|_| ProviderError::Validation(format!("invalid page cursor: {}", cursor)))?;
        Ok(Self::uuid_to_point_id(id))
    }

    fn point_to_embedding(point: &RetrievedPoint) -> ProviderResult<Embedding> {
        let id = point
            .id
            .as_ref()
            .map(Self::point_id_to_uuid)
            .transpose()?
            .ok_or_else(|| ProviderError::Internal("Missing point ID".to_string()))?;

        Ok(Embedding {
            uid: Some(id),
            values: Self::named_vector(&point.vectors, EMBEDDING_VECTOR).unwrap_or_default(),
            metadata: Self::payload_to_metadata(&point.payload),
        })
    }

    /// Projection of a point for `dim`, if one has been computed
    fn point_to_projection(point: &RetrievedPoint, dim: Dim) -> ProviderResult<Option<Embedding>> {
        let Some(values) = Self::named_vector(&point.vectors, &dim.to_string()) else {
            return Ok(None);
        };

        let id = point
            .id
            .as_ref()
            .map(Self::point_id_to_uuid)
            .transpose()?;

        let mut metadata = Self::payload_to_metadata(&point.payload);
        if let Some(tag) = point
            .payload
            .get(PROJECTION_PAYLOAD_KEY)
            .and_then(qdrant_value_to_metadata)
        {
            metadata.insert(PROJECTION_META_KEY.to_string(), tag);
        }

        Ok(Some(Embedding {
            uid: id,
            values,
            metadata,
        }))
    }

    /// Note: Uses deprecated data field until the dense vector accessors settle
    #[allow(deprecated)]
    fn named_vector(vectors: &Option<qdrant::VectorsOutput>, name: &str) -> Option<Vec<f64>> {
        match vectors {
            Some(qdrant::VectorsOutput {
                vectors_options: Some(qdrant::vectors_output::VectorsOptions::Vectors(named)),
            }) => named
                .vectors
                .get(name)
                .map(|v| v.data.iter().map(|x| *x as f64).collect()),
            _ => None,
        }
    }

    fn metadata_to_payload(metadata: &Metadata) -> HashMap<String, QdrantValue> {
        metadata
            .iter()
            .filter_map(|(k, v)| metadata_to_qdrant_value(v).map(|v| (k.clone(), v)))
            .collect()
    }

    fn payload_to_metadata(payload: &HashMap<String, QdrantValue>) -> Metadata {
        payload
            .iter()
            .filter(|(k, _)| k.as_str() != PROJECTION_PAYLOAD_KEY)
            .filter_map(|(k, v)| qdrant_value_to_metadata(v).map(|v| (k.clone(), v)))
            .collect()
    }
}

fn metadata_to_qdrant_value(val: &MetadataValue) -> Option<QdrantValue> {
    match val {
        MetadataValue::Null => Some(QdrantValue {
            kind: Some(qdrant::value::Kind::NullValue(0)),
        }),
        MetadataValue::Bool(b) => Some(QdrantValue::from(*b)),
        MetadataValue::Number(n) => Some(QdrantValue::from(*n)),
        MetadataValue::String(s) => Some(QdrantValue::from(s.clone())),
        MetadataValue::Map(_) => None,
    }
}

fn qdrant_value_to_metadata(val: &QdrantValue) -> Option<MetadataValue> {
    use qdrant::value::Kind;

    match &val.kind {
        Some(Kind::NullValue(_)) => Some(MetadataValue::Null),
        Some(Kind::BoolValue(b)) => Some(MetadataValue::Bool(*b)),
        Some(Kind::IntegerValue(i)) => Some(MetadataValue::Number(*i as f64)),
        Some(Kind::DoubleValue(f)) => Some(MetadataValue::Number(*f)),
        Some(Kind::StringValue(s)) => Some(MetadataValue::String(s.clone())),
        _ => None,
    }
}

fn to_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|v| *v as f32).collect()
}

#[async_trait]
impl ProvidersRepository for QdrantProvidersRepository {
    async fn add_provider(&self, name: &str, metadata: Metadata) -> ProviderResult<Provider> {
        let client = self.client().await?;

        let aliases = client.list_aliases().await?;
        if let Some(alias) = aliases.aliases.iter().find(|a| a.alias_name == name) {
            let uid = Uuid::parse_str(&alias.collection_name).map_err(|e| {
                ProviderError::Internal(format!("alias {} targets non-provider: {}", name, e))
            })?;
            tracing::debug!(provider_id = %uid, name, "Provider already registered");
            return Ok(Provider {
                id: uid,
                name: name.to_string(),
                metadata: Self::provider_metadata(&client, uid).await?,
            });
        }

        let (size, distance) = Self::vector_params(&metadata)?;
        let uid = Uuid::new_v4();

        Self::create_collection(&client, uid, Self::vectors_config(size, distance)).await?;

        if let Err(err) = client
            .create_alias(CreateAliasBuilder::new(uid.to_string(), name))
            .await
        {
            // The collection is unreachable without its alias.
            if let Err(cleanup) = client.delete_collection(uid.to_string()).await {
                tracing::warn!(provider_id = %uid, error = %cleanup, "Failed to remove orphaned collection");
            }
            return Err(err.into());
        }

        let mut metadata = metadata;
        metadata.insert(SIZE_META_KEY.to_string(), size.into());
        metadata.insert(DISTANCE_META_KEY.to_string(), distance.as_str_name().into());

        tracing::info!(provider_id = %uid, name, size, "Created provider");
        Ok(Provider {
            id: uid,
            name: name.to_string(),
            metadata,
        })
    }

    async fn get_providers(
        &self,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Vec<Provider>, Page)> {
        let client = self.client().await?;
        let aliases = client.list_aliases().await?;

        let mut seen = HashSet::new();
        let mut providers = Vec::new();
        for alias in aliases.aliases {
            let Ok(uid) = Uuid::parse_str(&alias.collection_name) else {
                tracing::debug!(collection = %alias.collection_name, "Skipping foreign collection");
                continue;
            };
            if seen.insert(uid) {
                providers.push(Provider {
                    id: uid,
                    name: alias.alias_name,
                    metadata: Metadata::new(),
                });
            }
        }

        let page = Page::with_count(providers.len());
        let mut providers = apply_offset_limit(&providers, filter.offset, filter.limit);
        for provider in &mut providers {
            provider.metadata = Self::provider_metadata(&client, provider.id).await?;
        }

        Ok((providers, page))
    }

    async fn get_provider(&self, uid: Uuid) -> ProviderResult<Provider> {
        let client = self.client().await?;
        Self::ensure_provider(&client, uid).await?;

        let aliases = client.list_collection_aliases(uid.to_string()).await?;
        let alias = aliases
            .aliases
            .into_iter()
            .next()
            .ok_or(ProviderError::ProviderNotFound(uid))?;

        Ok(Provider {
            id: uid,
            name: alias.alias_name,
            metadata: Self::provider_metadata(&client, uid).await?,
        })
    }

    async fn get_embeddings(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Vec<Embedding>, Page)> {
        let client = self.client().await?;
        Self::ensure_provider(&client, uid).await?;

        let (points, next) =
            Self::scroll_page(&client, uid, filter.limit, filter.cursor.as_deref()).await?;
        let embeddings = points
            .iter()
            .map(Self::point_to_embedding)
            .collect::<ProviderResult<Vec<_>>>()?;

        Ok((embeddings, Page::with_next(next)))
    }

    async fn get_projections(
        &self,
        uid: Uuid,
        filter: &ProviderFilter,
    ) -> ProviderResult<(Projections, Page)> {
        let client = self.client().await?;
        Self::ensure_provider(&client, uid).await?;

        let (points, next) =
            Self::scroll_page(&client, uid, filter.limit, filter.cursor.as_deref()).await?;

        let dims: Vec<Dim> = match filter.dim {
            Some(dim) => vec![dim],
            None => Dim::ALL.to_vec(),
        };

        let mut projections = Projections::new();
        for dim in dims {
            let mut set = Vec::with_capacity(points.len());
            for point in &points {
                if let Some(proj) = Self::point_to_projection(point, dim)? {
                    set.push(proj);
                }
            }
            projections.insert(dim, set);
        }

        Ok((projections, Page::with_next(next)))
    }

    async fn update_embeddings(
        &self,
        uid: Uuid,
        mut embeddings: Vec<Embedding>,
        projection: Projection,
    ) -> ProviderResult<Vec<Embedding>> {
        let client = self.client().await?;
        Self::ensure_provider(&client, uid).await?;

        let config = Self::collection_vectors_config(&client, uid).await?;
        let size = Self::embedding_params(&config).map(|(size, _)| size);
        Self::validate_embeddings(&embeddings, size)?;

        if embeddings.is_empty() {
            return Ok(embeddings);
        }

        // Time-ordered ids keep scroll order equal to insertion order.
        let points: Vec<PointStruct> = embeddings
            .iter_mut()
            .map(|emb| {
                let id = emb.assign_uid();
                PointStruct::new(
                    Self::uuid_to_point_id(id),
                    NamedVectors::default().add_vector(EMBEDDING_VECTOR, to_f32(&emb.values)),
                    Self::metadata_to_payload(&emb.metadata),
                )
            })
            .collect();

        client
            .upsert_points(UpsertPointsBuilder::new(uid.to_string(), points).wait(true))
            .await?;

        match Self::recompute(&client, uid, projection).await {
            Ok(total) => {
                tracing::info!(
                    provider_id = %uid,
                    added = embeddings.len(),
                    total,
                    %projection,
                    "Updated embeddings"
                );
                Ok(embeddings)
            }
            Err(err) => {
                tracing::warn!(
                    provider_id = %uid,
                    error = %err,
                    "Embeddings stored but projections are stale until recomputed"
                );
                Err(err)
            }
        }
    }

    async fn drop_embeddings(&self, uid: Uuid) -> ProviderResult<()> {
        let client = self.client().await?;
        Self::ensure_provider(&client, uid).await?;

        let config = Self::collection_vectors_config(&client, uid)
            .await?
            .ok_or_else(|| {
                ProviderError::Internal(format!("collection {} has no vectors config", uid))
            })?;
        let aliases = client.list_collection_aliases(uid.to_string()).await?;

        for alias in &aliases.aliases {
            client.delete_alias(alias.alias_name.clone()).await?;
        }
        client.delete_collection(uid.to_string()).await?;
        Self::create_collection(&client, uid, config).await?;
        for alias in &aliases.aliases {
            client
                .create_alias(CreateAliasBuilder::new(uid.to_string(), &alias.alias_name))
                .await?;
        }

        tracing::info!(provider_id = %uid, "Dropped embeddings");
        Ok(())
    }

    async fn compute_projections(&self, uid: Uuid, projection: Projection) -> ProviderResult<()> {
        let client = self.client().await?;
        Self::ensure_provider(&client, uid).await?;

        let total = Self::recompute(&client, uid, projection).await?;

        tracing::info!(provider_id = %uid, total, %projection, "Recomputed projections");
        Ok(())
    }

    async fn close(&self) -> ProviderResult<()> {
        let mut client = self.client.write().await;
        if client.take().is_none() {
            return Err(ProviderError::Closed);
        }

        tracing::info!("Closed Qdrant client");
        Ok(())
    }
}
