//! Zero-mean, unit-variance scaling over an ordered feature list
//!
//! The fitted parameters carry the feature names they were fitted on, and
//! every apply call checks the incoming matrix against them.

use serde::{Deserialize, Serialize};

use super::error::{FitWarning, Result, ScoringError};
use super::features::FeatureMatrix;

/// Scale used for a zero-variance feature.
///
/// A constant feature standardizes to 0 on its own fit data; any other value
/// is divided by this epsilon instead of by zero.
pub const SCALE_EPSILON: f64 = 1e-8;

/// Fitted per-feature mean and scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizerParams {
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardizerParams {
    /// Fit means and population standard deviations.
    ///
    /// Zero-variance features are clamped to [`SCALE_EPSILON`] and reported as
    /// warnings rather than failing the fit.
    pub fn fit(matrix: &FeatureMatrix) -> Result<(Self, Vec<FitWarning>)> {
        let n = matrix.n_rows();
        if n == 0 {
            return Err(ScoringError::InsufficientData {
                stage: "standardizer",
                detail: "no rows to fit on".to_string(),
            });
        }

        let width = matrix.names().len();
        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        let mut warnings = Vec::new();

        for (index, name) in matrix.names().iter().enumerate() {
            let mean = matrix.column(index).sum::<f64>() / n as f64;
            let variance = matrix
                .column(index)
                .map(|x| {
                    let d = x - mean;
                    d * d
                })
                .sum::<f64>()
                / n as f64;
            let std = variance.sqrt();

            let scale = if std < SCALE_EPSILON {
                log::warn!(
                    "feature '{}' has zero variance; clamping scale to {:e}",
                    name,
                    SCALE_EPSILON
                );
                warnings.push(FitWarning::DegenerateFeature {
                    feature: name.clone(),
                    epsilon: SCALE_EPSILON,
                });
                SCALE_EPSILON
            } else {
                std
            };

            means.push(mean);
            scales.push(scale);
        }

        let params = Self {
            feature_names: matrix.names().to_vec(),
            means,
            scales,
        };
        Ok((params, warnings))
    }

    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    /// Fail unless `names` is exactly the fitted feature list, in order.
    pub fn check_schema(&self, names: &[String]) -> Result<()> {
        if names != self.feature_names.as_slice() {
            return Err(ScoringError::FeatureSchemaMismatch {
                expected: self.feature_names.clone(),
                actual: names.to_vec(),
            });
        }
        Ok(())
    }

    /// Standardize every row of `matrix`.
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<Vec<Vec<f64>>> {
        self.check_schema(matrix.names())?;
        Ok(matrix
            .rows()
            .iter()
            .map(|row| self.transform_row(row))
            .collect())
    }

    /// Standardize one row already known to follow the fitted order.
    pub(crate) fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fit_mean_and_population_std() {
        let matrix = FeatureMatrix::new(
            names(&["a", "b"]),
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0], vec![4.0, 40.0]],
        )
        .unwrap();

        let (params, warnings) = StandardizerParams::fit(&matrix).unwrap();
        assert!(warnings.is_empty());
        assert!((params.means[0] - 2.5).abs() < 1e-12);
        assert!((params.means[1] - 25.0).abs() < 1e-12);
        assert!((params.scales[0] - 1.25f64.sqrt()).abs() < 1e-12);

        let scaled = params.transform(&matrix).unwrap();
        let column_mean: f64 = scaled.iter().map(|r| r[0]).sum::<f64>() / 4.0;
        let column_var: f64 = scaled.iter().map(|r| r[0] * r[0]).sum::<f64>() / 4.0;
        assert!(column_mean.abs() < 1e-12);
        assert!((column_var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_is_clamped_not_fatal() {
        let matrix = FeatureMatrix::new(
            names(&["varying", "constant"]),
            vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0]],
        )
        .unwrap();

        let (params, warnings) = StandardizerParams::fit(&matrix).unwrap();
        assert_eq!(params.scales[1], SCALE_EPSILON);
        assert_eq!(
            warnings,
            vec![FitWarning::DegenerateFeature {
                feature: "constant".to_string(),
                epsilon: SCALE_EPSILON,
            }]
        );

        let scaled = params.transform(&matrix).unwrap();
        assert!(scaled.iter().all(|row| row[1] == 0.0 && row[0].is_finite()));
    }

    #[test]
    fn test_permuted_columns_are_rejected() {
        let matrix = FeatureMatrix::new(
            names(&["a", "b"]),
            vec![vec![1.0, 10.0], vec![2.0, 30.0]],
        )
        .unwrap();
        let (params, _) = StandardizerParams::fit(&matrix).unwrap();

        let permuted = FeatureMatrix::new(
            names(&["b", "a"]),
            vec![vec![10.0, 1.0]],
        )
        .unwrap();
        let err = params.transform(&permuted).unwrap_err();
        assert!(matches!(err, ScoringError::FeatureSchemaMismatch { .. }));
    }

    #[test]
    fn test_empty_fit_is_insufficient() {
        let matrix = FeatureMatrix::new(names(&["a"]), Vec::new()).unwrap();
        assert!(matches!(
            StandardizerParams::fit(&matrix),
            Err(ScoringError::InsufficientData { .. })
        ));
    }
}
