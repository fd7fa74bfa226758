use ndarray::{Array1, Array2, Axis, s};

use super::to_matrix;
use crate::error::{ProviderError, ProviderResult};
use crate::models::Embedding;

const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-10;
const EPSILON: f64 = 1e-12;

/// Principal Component Analysis.
///
/// Returns an N x `target` matrix holding each embedding projected onto the
/// top `target` principal components. When fewer than `target` samples are
/// given the matrix is padded with copies of the first sample so enough
/// components exist; padded rows are not part of the output.
pub fn pca(embeddings: &[Embedding], target: usize) -> ProviderResult<Array2<f64>> {
    let samples = embeddings.len();
    let mut data = to_matrix(embeddings, target)?;

    if samples < target {
        let first = data.row(0).to_owned();
        while data.nrows() < target {
            data.push_row(first.view())
                .map_err(|e| ProviderError::Internal(format!("matrix shape error: {}", e)))?;
        }
    }

    let mean = data
        .mean_axis(Axis(0))
        .ok_or_else(|| ProviderError::Internal("cannot center empty matrix".to_string()))?;
    let centered = &data - &mean;

    let components = principal_components(&centered, target);
    let projected = centered.slice(s![..samples, ..]).dot(&components);

    Ok(projected)
}

/// Returns a D x k matrix whose columns are the top k principal axes of the
/// centered N x D matrix.
///
/// Uses the D x D covariance when D <= N and the N x N Gram matrix otherwise,
/// mapping Gram eigenvectors back to feature space.
fn principal_components(centered: &Array2<f64>, k: usize) -> Array2<f64> {
    let (n, d) = centered.dim();
    let mut components = Array2::<f64>::zeros((d, k));

    if d <= n {
        let covariance = centered.t().dot(centered);
        for (i, axis) in top_eigenvectors(&covariance, k).into_iter().enumerate() {
            components.column_mut(i).assign(&axis);
        }
    } else {
        let gram = centered.dot(&centered.t());
        for (i, u) in top_eigenvectors(&gram, k).into_iter().enumerate() {
            let axis = centered.t().dot(&u);
            let norm = axis.dot(&axis).sqrt();
            if norm > EPSILON {
                components.column_mut(i).assign(&(axis / norm));
            }
        }
    }

    components
}

/// Power iteration with deflation by orthogonalization against previously
/// found eigenvectors of the symmetric matrix `m`.
fn top_eigenvectors(m: &Array2<f64>, k: usize) -> Vec<Array1<f64>> {
    let size = m.nrows();
    let mut found: Vec<Array1<f64>> = Vec::with_capacity(k);

    for _ in 0..k.min(size) {
        let Some(mut v) = starting_vector(size, &found) else {
            break;
        };

        for _ in 0..MAX_ITERATIONS {
            let mut w = m.dot(&v);
            orthogonalize(&mut w, &found);

            let norm = w.dot(&w).sqrt();
            if norm < EPSILON {
                // Remaining spectrum is zero; any orthonormal v will do.
                break;
            }
            w /= norm;

            let delta = (&w - &v).mapv(f64::abs).sum();
            v = w;
            if delta < TOLERANCE {
                break;
            }
        }

        found.push(v);
    }

    found
}

/// Deterministic unit vector orthogonal to every vector in `found`.
fn starting_vector(size: usize, found: &[Array1<f64>]) -> Option<Array1<f64>> {
    let seed = Array1::from_iter((0..size).map(|j| 1.0 + j as f64 / size as f64));
    let candidates =
        std::iter::once(seed).chain((0..size).map(|j| Array1::from_shape_fn(size, |i| {
            if i == j { 1.0 } else { 0.0 }
        })));

    for mut v in candidates {
        orthogonalize(&mut v, found);
        let norm = v.dot(&v).sqrt();
        if norm > 1e-6 {
            return Some(v / norm);
        }
    }

    None
}

fn orthogonalize(v: &mut Array1<f64>, basis: &[Array1<f64>]) {
    for b in basis {
        let proj = v.dot(b);
        v.scaled_add(-proj, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f64]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_pca_recovers_dominant_axis() {
        // Points spread along (1, 1, 0, 0) with tiny noise on other axes
        let embs: Vec<Embedding> = (0..10)
            .map(|i| {
                let t = i as f64 - 4.5;
                emb(&[t, t, 0.01 * (i % 2) as f64, -0.01 * (i % 3) as f64])
            })
            .collect();

        let projected = pca(&embs, 2).unwrap();
        assert_eq!(projected.dim(), (10, 2));

        // First component variance dominates second
        let var = |col: usize| projected.column(col).mapv(|x| x * x).sum();
        assert!(var(0) > 100.0 * var(1));

        // Distances along first component match the spread of t * sqrt(2)
        let span = projected[[9, 0]] - projected[[0, 0]];
        assert!((span.abs() - 9.0 * 2f64.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_pca_output_is_centered() {
        let embs: Vec<Embedding> = (0..6)
            .map(|i| emb(&[i as f64, (i * i) as f64, 3.0, 1.0 - i as f64, 2.0]))
            .collect();

        let projected = pca(&embs, 3).unwrap();
        for col in projected.columns() {
            assert!(col.sum().abs() < 1e-8);
        }
    }

    #[test]
    fn test_pca_pads_when_fewer_samples_than_target() {
        let embs = vec![emb(&[1.0, 2.0, 3.0, 4.0]), emb(&[4.0, 3.0, 2.0, 1.0])];
        let projected = pca(&embs, 3).unwrap();
        assert_eq!(projected.dim(), (2, 3));
        assert!(projected.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_pca_more_features_than_samples() {
        let embs: Vec<Embedding> = (0..4)
            .map(|i| emb(&(0..32).map(|j| ((i + 1) * j) as f64 % 7.0).collect::<Vec<_>>()))
            .collect();
        let projected = pca(&embs, 2).unwrap();
        assert_eq!(projected.dim(), (4, 2));
        assert!(projected.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_pca_identical_samples_project_to_origin() {
        let embs = vec![emb(&[1.0, 2.0, 3.0, 4.0]); 3];
        let projected = pca(&embs, 2).unwrap();
        assert!(projected.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_pca_dimension_guard() {
        let embs = vec![emb(&[1.0, 2.0])];
        assert!(matches!(
            pca(&embs, 2),
            Err(ProviderError::Validation(_))
        ));
    }
}
