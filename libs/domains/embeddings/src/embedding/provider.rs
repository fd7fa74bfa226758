use async_trait::async_trait;

use crate::error::ProviderResult;

/// Turns text chunks into embedding vectors.
///
/// Implementations wrap a remote embeddings API. The service depends only on
/// this trait, never on a concrete client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name the embedder is registered under
    fn name(&self) -> &'static str;

    /// Dimension of the vectors this embedder produces
    fn size(&self) -> usize;

    /// Embed each chunk, returning one vector per chunk in input order
    async fn embed(&self, chunks: &[String]) -> ProviderResult<Vec<Vec<f64>>>;
}
