use ndarray::{Array2, Axis};
use rand_distr::{Distribution, Normal};

use super::to_matrix;
use crate::error::{ProviderError, ProviderResult};
use crate::models::{Dim, Embedding};

const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_TRIES: usize = 50;
const EARLY_EXAGGERATION: f64 = 4.0;
const EXAGGERATION_ITERATIONS: usize = 100;
const MOMENTUM_SWITCH_ITERATION: usize = 20;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const MIN_PROBABILITY: f64 = 1e-12;

/// t-SNE hyperparameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsneParams {
    pub target: usize,
    pub perplexity: f64,
    pub learning_rate: f64,
    pub iterations: usize,
}

impl TsneParams {
    /// Fixed hyperparameters used for each projection dimension
    pub fn for_dim(dim: Dim) -> Self {
        match dim {
            Dim::D2 => Self {
                target: 2,
                perplexity: 300.0,
                learning_rate: 300.0,
                iterations: 300,
            },
            Dim::D3 => Self {
                target: 3,
                perplexity: 500.0,
                learning_rate: 500.0,
                iterations: 300,
            },
        }
    }
}

/// Exact t-SNE with early exaggeration, momentum and adaptive gains.
///
/// Initialization is random, so repeated runs on the same input differ.
pub fn tsne(embeddings: &[Embedding], params: &TsneParams) -> ProviderResult<Array2<f64>> {
    let data = to_matrix(embeddings, params.target)?;
    let n = data.nrows();

    if n <= 1 {
        return Ok(Array2::zeros((n, params.target)));
    }

    let mut p = joint_probabilities(&data, params.perplexity);
    p *= EARLY_EXAGGERATION;

    let normal = Normal::new(0.0, 1e-4)
        .map_err(|e| ProviderError::Internal(format!("t-SNE initialization failed: {}", e)))?;
    let mut rng = rand::rng();
    let mut y = Array2::from_shape_fn((n, params.target), |_| normal.sample(&mut rng));

    let mut update = Array2::<f64>::zeros((n, params.target));
    let mut gains = Array2::<f64>::ones((n, params.target));

    for iter in 0..params.iterations {
        let num = student_kernel(&y);
        let sum_num = num.sum().max(MIN_PROBABILITY);
        let q = num.mapv(|v| (v / sum_num).max(MIN_PROBABILITY));

        let mut grad = Array2::<f64>::zeros((n, params.target));
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let w = (p[[i, j]] - q[[i, j]]) * num[[i, j]];
                for k in 0..params.target {
                    grad[[i, k]] += w * (y[[i, k]] - y[[j, k]]);
                }
            }
        }

        let momentum = if iter < MOMENTUM_SWITCH_ITERATION {
            INITIAL_MOMENTUM
        } else {
            FINAL_MOMENTUM
        };

        ndarray::Zip::from(&mut gains)
            .and(&grad)
            .and(&update)
            .for_each(|g, &dy, &iy| {
                *g = if (dy > 0.0) != (iy > 0.0) {
                    *g + 0.2
                } else {
                    *g * 0.8
                };
                if *g < MIN_GAIN {
                    *g = MIN_GAIN;
                }
            });

        update = &update * momentum - &(&gains * &grad) * params.learning_rate;
        y += &update;

        if let Some(mean) = y.mean_axis(Axis(0)) {
            y -= &mean;
        }

        if iter + 1 == EXAGGERATION_ITERATIONS {
            p /= EARLY_EXAGGERATION;
        }
    }

    Ok(y)
}

/// Symmetric affinities P, each row calibrated to the requested perplexity.
fn joint_probabilities(data: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let n = data.nrows();
    let distances = squared_distances(data);
    let log_u = perplexity.ln();

    let mut p = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        let row: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| distances[[i, j]]).collect();
        let min = row.iter().copied().fold(f64::INFINITY, f64::min);
        let shifted: Vec<f64> = row.iter().map(|d| d - min).collect();

        let mut beta = 1.0;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;

        let (mut entropy, mut probs) = row_entropy(&shifted, beta);
        let mut tries = 0;

        while (entropy - log_u).abs() > PERPLEXITY_TOLERANCE && tries < PERPLEXITY_TRIES {
            if entropy > log_u {
                beta_min = beta;
                beta = if beta_max.is_infinite() {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_infinite() {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
            (entropy, probs) = row_entropy(&shifted, beta);
            tries += 1;
        }

        let others = (0..n).filter(|&j| j != i);
        for (j, prob) in others.zip(probs) {
            p[[i, j]] = prob;
        }
    }

    let mut joint = &p + &p.t();
    let total = joint.sum().max(MIN_PROBABILITY);
    joint.mapv_inplace(|v| (v / total).max(MIN_PROBABILITY));
    joint
}

/// Conditional probabilities for one row and their Shannon entropy.
///
/// Distances are shifted by the row minimum so the kernel never underflows.
fn row_entropy(distances: &[f64], beta: f64) -> (f64, Vec<f64>) {
    let weights: Vec<f64> = distances.iter().map(|d| (-d * beta).exp()).collect();
    let sum: f64 = weights.iter().sum();
    let weighted: f64 = distances.iter().zip(&weights).map(|(d, w)| d * w).sum();

    let entropy = sum.ln() + beta * weighted / sum;
    let probs = weights.into_iter().map(|w| w / sum).collect();

    (entropy, probs)
}

fn squared_distances(data: &Array2<f64>) -> Array2<f64> {
    let n = data.nrows();
    let mut distances = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in (i + 1)..n {
            let diff = &data.row(i) - &data.row(j);
            let d = diff.dot(&diff);
            distances[[i, j]] = d;
            distances[[j, i]] = d;
        }
    }

    distances
}

/// Student-t kernel (1 + |yi - yj|^2)^-1 with a zero diagonal.
fn student_kernel(y: &Array2<f64>) -> Array2<f64> {
    let mut num = squared_distances(y);
    num.mapv_inplace(|d| 1.0 / (1.0 + d));
    num.diag_mut().fill(0.0);
    num
}
