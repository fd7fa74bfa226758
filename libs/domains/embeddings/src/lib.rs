//! Embeddings Domain Library
//!
//! Stores named embeddings providers, the high-dimensional embeddings they
//! produce, and the 2D/3D projections derived from them. Every write keeps
//! the projections consistent with the stored embeddings.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ ProvidersService │  ← Validation, text embedding, metadata defaults
//! └────────┬─────────┘
//!          │
//! ┌────────▼────────────┐     ┌──────────────┐
//! │ ProvidersRepository │     │   Embedder   │
//! │      (trait)        │     │   (trait)    │
//! └───┬─────────────┬───┘     └──────┬───────┘
//!     │             │                │
//! ┌───▼──────┐ ┌────▼─────┐   ┌──────▼───────┐
//! │ InMemory │ │  Qdrant  │   │ OpenAI       │
//! └───┬──────┘ └────┬─────┘   │ Cohere       │
//!     │             │         │ VertexAI     │
//! ┌───▼─────────────▼───┐     └──────────────┘
//! │ projection (PCA,    │
//! │ t-SNE)              │
//! └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_embeddings::{
//!     Dim, Embedding, InMemoryProvidersRepository, Metadata, Projection, ProviderFilter,
//!     ProvidersService,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ProvidersService::new(InMemoryProvidersRepository::new());
//!
//! let provider = service.add_provider("demo", Metadata::new()).await?;
//! service
//!     .update_embeddings(
//!         provider.id,
//!         vec![
//!             Embedding::new(vec![1.0, 2.0, 3.0, 4.0]),
//!             Embedding::new(vec![4.0, 3.0, 2.0, 1.0]),
//!         ],
//!         Projection::Pca,
//!     )
//!     .await?;
//!
//! let (projections, page) = service
//!     .get_projections(provider.id, &ProviderFilter::default())
//!     .await?;
//! println!("{:?} 2D points, next page at {}", projections.get(&Dim::D2).map(Vec::len), page);
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod models;
pub mod paging;
pub mod projection;
pub mod qdrant;
pub mod repository;
pub mod service;

pub use embedding::{
    CohereConfig, CohereEmbedder, Embedder, OpenAIConfig, OpenAIEmbedder, VertexAIConfig,
    VertexAIEmbedder,
};
pub use error::{ErrorKind, ProviderError, ProviderResult};
pub use handlers::{ApiDoc, router};
pub use models::*;
pub use qdrant::{QdrantConfig, QdrantProvidersRepository};
pub use repository::{InMemoryProvidersRepository, ProvidersRepository};
pub use service::ProvidersService;
