//! Principal component projection
//!
//! Fits an orthogonal basis ranked by captured variance and keeps the
//! smallest prefix of components whose cumulative explained-variance ratio
//! reaches the configured target.
//!
//! Algorithm:
//! 1. Center the standardized rows and scale by `1/sqrt(n - 1)`: X
//! 2. Covariance: C = X^T * X
//! 3. Eigendecompose C (self-adjoint), rank eigenvectors by eigenvalue
//! 4. Retain the shortest prefix reaching the variance target

use faer::{Mat, Side};
use serde::{Deserialize, Serialize};

use super::error::{Result, ScoringError};

/// Slack on the cumulative-variance comparison so a target of exactly 1.0
/// is reachable despite rounding.
const VARIANCE_SLACK: f64 = 1e-12;

/// Fitted projection basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectorParams {
    /// Width of the standardized input vectors.
    pub input_dim: usize,
    /// Per-feature mean of the fit batch, subtracted before projecting.
    pub mean: Vec<f64>,
    /// Retained basis vectors, highest variance first.
    pub components: Vec<Vec<f64>>,
    /// Variance captured by each retained component.
    pub explained_variance: Vec<f64>,
    /// Fraction of total variance captured by each retained component.
    pub explained_variance_ratio: Vec<f64>,
    /// Configured cumulative variance target.
    pub variance_target: f64,
}

impl ProjectorParams {
    pub fn fit(rows: &[Vec<f64>], variance_target: f64) -> Result<Self> {
        let n = rows.len();
        let d = rows.first().map(Vec::len).unwrap_or(0);

        if d == 0 {
            return Err(ScoringError::InsufficientData {
                stage: "projector",
                detail: "no standardized rows to fit on".to_string(),
            });
        }
        if n < d || n < 2 {
            return Err(ScoringError::InsufficientData {
                stage: "projector",
                detail: format!(
                    "{} sample(s) for {} feature(s); at least {} required",
                    n,
                    d,
                    d.max(2)
                ),
            });
        }
        if let Some(row) = rows.iter().find(|row| row.len() != d) {
            return Err(ScoringError::DimensionMismatch {
                stage: "projector",
                expected: d,
                actual: row.len(),
            });
        }

        let mean: Vec<f64> = (0..d)
            .map(|j| rows.iter().map(|row| row[j]).sum::<f64>() / n as f64)
            .collect();

        let norm = 1.0 / ((n - 1) as f64).sqrt();
        let mut x = Mat::<f64>::zeros(n, d);
        for (i, row) in rows.iter().enumerate() {
            for j in 0..d {
                x[(i, j)] = (row[j] - mean[j]) * norm;
            }
        }
        let covariance = x.transpose() * &x;

        let decomposition = covariance.selfadjoint_eigendecomposition(Side::Lower);
        let basis = decomposition.u().to_owned();

        // Eigenvalues via the Rayleigh quotient of each eigenvector.
        let mut ranked: Vec<(f64, Vec<f64>)> = (0..d)
            .map(|k| {
                let vector: Vec<f64> = (0..d).map(|i| basis[(i, k)]).collect();
                let variance = rayleigh_quotient(&covariance, &vector).max(0.0);
                (variance, orient(vector))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let total: f64 = ranked.iter().map(|(variance, _)| variance).sum();
        if total <= 0.0 {
            return Err(ScoringError::InsufficientData {
                stage: "projector",
                detail: "standardized features carry no variance".to_string(),
            });
        }

        let mut components = Vec::new();
        let mut explained_variance = Vec::new();
        let mut explained_variance_ratio = Vec::new();
        let mut cumulative = 0.0;

        for (variance, vector) in ranked {
            let ratio = variance / total;
            cumulative += ratio;
            components.push(vector);
            explained_variance.push(variance);
            explained_variance_ratio.push(ratio);
            if cumulative + VARIANCE_SLACK >= variance_target {
                break;
            }
        }

        log::debug!(
            "projector retained {} of {} components ({:.4} of variance)",
            components.len(),
            d,
            cumulative
        );

        Ok(Self {
            input_dim: d,
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
            variance_target,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Cumulative variance fraction captured by the retained components.
    pub fn retained_variance(&self) -> f64 {
        self.explained_variance_ratio.iter().sum()
    }

    /// Project one standardized vector onto the retained basis.
    pub fn project_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.input_dim {
            return Err(ScoringError::DimensionMismatch {
                stage: "projector",
                expected: self.input_dim,
                actual: row.len(),
            });
        }
        Ok(self
            .components
            .iter()
            .map(|component| {
                row.iter()
                    .zip(&self.mean)
                    .zip(component)
                    .map(|((x, mean), weight)| (x - mean) * weight)
                    .sum()
            })
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.project_row(row)).collect()
    }
}

fn rayleigh_quotient(matrix: &Mat<f64>, vector: &[f64]) -> f64 {
    let d = vector.len();
    let mut numerator = 0.0;
    for i in 0..d {
        let mut row_dot = 0.0;
        for j in 0..d {
            row_dot += matrix[(i, j)] * vector[j];
        }
        numerator += vector[i] * row_dot;
    }
    let denominator: f64 = vector.iter().map(|v| v * v).sum();
    numerator / denominator
}

/// Fix the sign of an eigenvector so its largest-magnitude loading is positive.
fn orient(mut vector: Vec<f64>) -> Vec<f64> {
    let pivot = vector
        .iter()
        .copied()
        .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        vector.iter_mut().for_each(|v| *v = -*v);
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rows lying almost on the line y = 2x, with small independent noise.
    fn line_rows() -> Vec<Vec<f64>> {
        (0..20)
            .map(|i| {
                let t = i as f64 - 9.5;
                let wobble = if i % 2 == 0 { 0.01 } else { -0.01 };
                let jitter = if i % 3 == 0 { 0.02 } else { -0.01 };
                vec![t, 2.0 * t + wobble, jitter]
            })
            .collect()
    }

    #[test]
    fn test_dominant_direction_is_first_component() {
        let params = ProjectorParams::fit(&line_rows(), 0.95).unwrap();
        assert_eq!(params.n_components(), 1);
        assert!(params.retained_variance() >= 0.95);

        let first = &params.components[0];
        let norm = 5.0f64.sqrt();
        assert!((first[0] - 1.0 / norm).abs() < 1e-3);
        assert!((first[1] - 2.0 / norm).abs() < 1e-3);
    }

    #[test]
    fn test_full_variance_keeps_every_component() {
        let params = ProjectorParams::fit(&line_rows(), 1.0).unwrap();
        assert_eq!(params.n_components(), 3);
        assert!((params.retained_variance() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_components_are_orthonormal() {
        let params = ProjectorParams::fit(&line_rows(), 1.0).unwrap();
        for (a, u) in params.components.iter().enumerate() {
            for (b, v) in params.components.iter().enumerate() {
                let dot: f64 = u.iter().zip(v).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_fewer_samples_than_features_is_insufficient() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![2.0, 1.0, 0.0]];
        let err = ProjectorParams::fit(&rows, 0.95).unwrap_err();
        assert!(matches!(err, ScoringError::InsufficientData { .. }));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let params = ProjectorParams::fit(&line_rows(), 0.95).unwrap();
        let row = [0.3, -1.2, 0.05];
        assert_eq!(params.project_row(&row).unwrap(), params.project_row(&row).unwrap());
        assert!(params.project_row(&[1.0, 2.0]).is_err());
    }
}
