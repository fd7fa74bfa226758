//! Dimensionality reduction of embeddings into 2D and 3D projections.
//!
//! Both algorithms map N source vectors to N target vectors; the output keeps
//! each source `uid` and metadata and adds a `projection` tag naming the
//! algorithm. Reduction is CPU-bound and synchronous.

mod pca;
mod tsne;

use ndarray::Array2;

use crate::error::{ProviderError, ProviderResult};
use crate::models::{Dim, Embedding, PROJECTION_META_KEY, Projection, Projections};

pub use pca::pca;
pub use tsne::{TsneParams, tsne};

/// Computes 2D and 3D projections of `embeddings` with the given algorithm.
///
/// Empty input yields two empty sets without running either algorithm.
pub fn compute(embeddings: &[Embedding], projection: Projection) -> ProviderResult<Projections> {
    let mut projections = Projections::new();

    for dim in Dim::ALL {
        let reduced = if embeddings.is_empty() {
            Vec::new()
        } else {
            reduce(embeddings, projection, dim)?
        };
        projections.insert(dim, reduced);
    }

    Ok(projections)
}

/// Reduces `embeddings` to a single target dimension.
pub fn reduce(
    embeddings: &[Embedding],
    projection: Projection,
    dim: Dim,
) -> ProviderResult<Vec<Embedding>> {
    let data = match projection {
        Projection::Pca => pca(embeddings, dim.size())?,
        Projection::Tsne => tsne(embeddings, &TsneParams::for_dim(dim))?,
    };

    Ok(embeddings
        .iter()
        .zip(data.rows())
        .map(|(source, row)| {
            let mut metadata = source.metadata.clone();
            metadata.insert(PROJECTION_META_KEY.to_string(), projection.into());
            Embedding {
                uid: source.uid,
                values: row.to_vec(),
                metadata,
            }
        })
        .collect())
}

/// Stacks embedding values into an N x D matrix, enforcing a uniform source
/// dimension strictly larger than `target`.
pub(crate) fn to_matrix(embeddings: &[Embedding], target: usize) -> ProviderResult<Array2<f64>> {
    let dim = embeddings.first().map(|e| e.values.len()).unwrap_or(0);

    if dim <= target {
        return Err(ProviderError::Validation(format!(
            "cannot project {}-dimensional embeddings to {} dimensions",
            dim, target
        )));
    }

    if let Some(bad) = embeddings.iter().find(|e| e.values.len() != dim) {
        return Err(ProviderError::Validation(format!(
            "embedding dimension mismatch: expected {}, got {}",
            dim,
            bad.values.len()
        )));
    }

    let flat: Vec<f64> = embeddings
        .iter()
        .flat_map(|e| e.values.iter().copied())
        .collect();

    Array2::from_shape_vec((embeddings.len(), dim), flat)
        .map_err(|e| ProviderError::Internal(format!("matrix shape error: {}", e)))
}
