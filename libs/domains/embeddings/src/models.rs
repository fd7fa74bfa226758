use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};

/// Default number of results returned by listing endpoints
pub const DEFAULT_LIMIT: i64 = 20;

/// Metadata key holding the projection algorithm tag
pub const PROJECTION_META_KEY: &str = "projection";

/// Metadata key holding the embedding label
pub const LABEL_META_KEY: &str = "label";

/// Open key/value map attached to providers and embeddings
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata value.
///
/// Arrays are not representable. Qdrant payloads only carry the scalar
/// variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Map(Metadata),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, MetadataValue::Map(_))
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

impl From<u64> for MetadataValue {
    fn from(n: u64) -> Self {
        MetadataValue::Number(n as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<Projection> for MetadataValue {
    fn from(p: Projection) -> Self {
        MetadataValue::String(p.to_string())
    }
}

/// Embeddings provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Provider {
    /// Unique provider identifier
    pub id: Uuid,
    /// Human readable provider name
    pub name: String,
    /// Backend specific metadata (e.g. vector size for Qdrant)
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

impl Provider {
    pub fn new(name: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            metadata,
        }
    }
}

/// Vector embedding, also used for 2D/3D projections
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Embedding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    /// Vector values. Serialized as `value` because chart widgets read it verbatim.
    #[serde(rename = "value", default)]
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

impl Embedding {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            uid: None,
            values,
            metadata: Metadata::new(),
        }
    }

    pub fn with_uid(mut self, uid: Uuid) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Gives the embedding a fresh time-ordered uid, replacing any it carried.
    /// Stored embeddings are never overwritten by a caller-chosen id.
    pub fn assign_uid(&mut self) -> Uuid {
        let uid = Uuid::now_v7();
        self.uid = Some(uid);
        uid
    }
}

/// Projection dimension
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[strum(ascii_case_insensitive)]
pub enum Dim {
    #[serde(rename = "2D")]
    #[strum(serialize = "2D")]
    D2,
    #[serde(rename = "3D")]
    #[strum(serialize = "3D")]
    D3,
}

impl Dim {
    pub const ALL: [Dim; 2] = [Dim::D2, Dim::D3];

    /// Number of components in this projection
    pub fn size(&self) -> usize {
        match self {
            Dim::D2 => 2,
            Dim::D3 => 3,
        }
    }

    pub fn parse(s: &str) -> ProviderResult<Self> {
        s.parse()
            .map_err(|_| ProviderError::Validation(format!("invalid dimension: {}", s)))
    }
}

/// Dimensionality reduction algorithm
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Projection {
    /// Principal Component Analysis
    Pca,
    /// t-distributed Stochastic Neighbor Embedding
    Tsne,
}

impl Projection {
    pub fn parse(s: &str) -> ProviderResult<Self> {
        s.parse()
            .map_err(|_| ProviderError::Validation(format!("invalid projection: {}", s)))
    }
}

/// Projections of a provider's embeddings keyed by dimension
pub type Projections = BTreeMap<Dim, Vec<Embedding>>;

/// Filter used for listing providers, embeddings and projections
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFilter {
    /// Restrict projections to a single dimension
    pub dim: Option<Dim>,
    /// Number of items to skip; ignored by cursor-paged stores
    pub offset: i64,
    /// Opaque continuation token; ignored by offset-paged stores
    pub cursor: Option<String>,
    /// Maximum number of items; non-positive means no limit
    pub limit: i64,
}

impl Default for ProviderFilter {
    fn default() -> Self {
        Self {
            dim: None,
            offset: 0,
            cursor: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ProviderFilter {
    pub fn unbounded() -> Self {
        Self {
            limit: 0,
            ..Default::default()
        }
    }

    pub fn with_dim(mut self, dim: Dim) -> Self {
        self.dim = Some(dim);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// Page information returned alongside listings.
///
/// Offset-paged stores report `count`; cursor-paged stores report `next`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl Page {
    pub fn with_count(count: usize) -> Self {
        Self {
            next: None,
            count: Some(count),
        }
    }

    pub fn with_next(next: Option<String>) -> Self {
        Self { next, count: None }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.next, self.count) {
            (Some(next), _) => write!(f, "next={}", next),
            (None, Some(count)) => write!(f, "count={}", count),
            (None, None) => write!(f, "end"),
        }
    }
}

/// Query parameters for paginated listings
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// Numeric offset, or a cursor returned in `page.next`
    pub offset: Option<String>,
    pub limit: Option<i64>,
    /// Projection dimension (`2D` or `3D`)
    pub dim: Option<String>,
}

impl PageQuery {
    /// Converts query parameters into a filter, rejecting unknown dimensions
    pub fn into_filter(self) -> ProviderResult<ProviderFilter> {
        let mut filter = ProviderFilter::default();

        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            filter.limit = limit;
        }

        match self.offset.as_deref().map(str::trim) {
            Some("") | None => {}
            Some(raw) => match raw.parse::<i64>() {
                Ok(offset) => filter.offset = offset.max(0),
                Err(_) => filter.cursor = Some(raw.to_string()),
            },
        }

        if let Some(dim) = self.dim.as_deref().filter(|d| !d.is_empty()) {
            filter.dim = Some(Dim::parse(dim)?);
        }

        Ok(filter)
    }
}

/// Request to register a new provider
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateProvider {
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

/// Options for splitting request text before it is embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Chunking {
    /// Maximum chunk length in characters
    pub size: usize,
    /// Characters shared by neighbouring chunks
    #[serde(default)]
    pub overlap: usize,
    #[serde(default)]
    pub trim: bool,
    /// Keep separators at the start of the chunk that follows them
    #[serde(default)]
    pub sep: bool,
}

/// Request to add embeddings to a provider.
///
/// Either `embeddings` carries raw vectors, or `text` is sent through the
/// provider's embedder. Text is embedded whole unless the caller pre-splits
/// it into `chunks` or asks for server-side `chunking`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EmbeddingsUpdate {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub label: String,
    /// Projection algorithm: `pca` or `tsne`
    pub projection: String,
    #[serde(default)]
    pub chunks: Option<Vec<String>>,
    #[serde(default)]
    pub chunking: Option<Chunking>,
    #[serde(default)]
    pub embeddings: Option<Vec<Embedding>>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

/// Request to recompute projections
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProjectionsUpdate {
    /// Projection algorithm: `pca` or `tsne`
    pub projection: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    pub providers: Vec<Provider>,
    pub page: Page,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmbeddingsResponse {
    pub embeddings: Vec<Embedding>,
    pub page: Page,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectionsResponse {
    #[serde(rename = "embeddings")]
    #[schema(value_type = Object)]
    pub projections: Projections,
    pub page: Page,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
