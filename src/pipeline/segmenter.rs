//! K-Means segmentation in projected space
//!
//! Fitting runs linfa's k-means++ seeded Lloyd iterations over several runs
//! from one seeded generator and keeps the lowest-inertia result. Segment
//! names travel inside the fitted parameters so the index-to-name binding
//! cannot drift from the centroids it was made for.

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::config::KMeansConfig;
use super::error::{Result, ScoringError};

/// Fitted centroids plus their segment labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterParams {
    pub centroids: Vec<Vec<f64>>,
    /// Label for each centroid index.
    pub segment_names: Vec<String>,
    /// Sum of squared distances of the fit rows to their centroid.
    pub inertia: f64,
    pub restarts: usize,
}

impl SegmenterParams {
    /// Partition `rows` into `segment_names.len()` groups.
    ///
    /// Returns the fitted parameters and the segment of every fit row.
    pub fn fit(
        rows: &[Vec<f64>],
        segment_names: &[String],
        config: &KMeansConfig,
        seed: u64,
    ) -> Result<(Self, Vec<usize>)> {
        let k = segment_names.len();
        if k == 0 {
            return Err(ScoringError::InvalidConfig(
                "segmenter needs at least one segment".to_string(),
            ));
        }
        if rows.len() < k {
            return Err(ScoringError::InsufficientData {
                stage: "segmenter",
                detail: format!("{} sample(s) for {} cluster(s)", rows.len(), k),
            });
        }
        let dim = rows[0].len();
        if let Some(row) = rows.iter().find(|row| row.len() != dim) {
            return Err(ScoringError::DimensionMismatch {
                stage: "segmenter",
                expected: dim,
                actual: row.len(),
            });
        }

        let records = Array2::from_shape_vec(
            (rows.len(), dim),
            rows.iter().flatten().copied().collect(),
        )
        .map_err(|e| ScoringError::InsufficientData {
            stage: "segmenter",
            detail: e.to_string(),
        })?;
        let dataset = Dataset::new(records, Array1::<usize>::zeros(rows.len()));

        let restarts = config.restarts.max(1);
        let rng = StdRng::seed_from_u64(seed);
        let model = KMeans::params_with(k, rng, L2Dist)
            .n_runs(restarts)
            .max_n_iterations(config.max_iterations as u64)
            .tolerance(config.tolerance)
            .fit(&dataset)
            .map_err(|e| ScoringError::InsufficientData {
                stage: "segmenter",
                detail: format!("k-means did not fit: {}", e),
            })?;

        let centroids: Vec<Vec<f64>> = model
            .centroids()
            .outer_iter()
            .map(|centroid| centroid.to_vec())
            .collect();

        // Labels come from the same nearest-centroid rule used at scoring time.
        let mut labels = Vec::with_capacity(rows.len());
        let mut inertia = 0.0;
        for row in rows {
            let (index, distance) = nearest(&centroids, row);
            labels.push(index);
            inertia += distance;
        }

        log::debug!(
            "segmenter kept inertia {:.4} from {} run(s)",
            inertia,
            restarts
        );

        let params = Self {
            centroids,
            segment_names: segment_names.to_vec(),
            inertia,
            restarts,
        };
        Ok((params, labels))
    }

    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn dim(&self) -> usize {
        self.centroids.first().map(Vec::len).unwrap_or(0)
    }

    /// Index of the nearest centroid; ties go to the lowest index.
    pub fn assign(&self, row: &[f64]) -> Result<usize> {
        if row.len() != self.dim() {
            return Err(ScoringError::DimensionMismatch {
                stage: "segmenter",
                expected: self.dim(),
                actual: row.len(),
            });
        }
        Ok(nearest(&self.centroids, row).0)
    }

    pub fn segment_name(&self, segment: usize) -> Option<&str> {
        self.segment_names.get(segment).map(String::as_str)
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Nearest centroid index and its squared distance.
fn nearest(centroids: &[Vec<f64>], row: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(centroid, row);
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(k: usize) -> Vec<String> {
        (0..k).map(|i| format!("segment-{}", i)).collect()
    }

    fn blobs() -> Vec<Vec<f64>> {
        let mut rows = Vec::new();
        for i in 0..10 {
            let jitter = i as f64 * 0.01;
            rows.push(vec![0.0 + jitter, 0.0 - jitter]);
            rows.push(vec![10.0 + jitter, 10.0 - jitter]);
        }
        rows
    }

    #[test]
    fn test_separates_two_blobs() {
        let rows = blobs();
        let (params, labels) =
            SegmenterParams::fit(&rows, &names(2), &KMeansConfig::default(), 7).unwrap();

        assert_eq!(params.k(), 2);
        assert_eq!(params.dim(), 2);
        assert_ne!(labels[0], labels[1]);
        for pair in labels.chunks(2) {
            assert_eq!(pair[0], labels[0]);
            assert_eq!(pair[1], labels[1]);
        }
        assert!(params.inertia < 1.0);
    }

    #[test]
    fn test_fit_is_seed_deterministic() {
        let rows = blobs();
        let config = KMeansConfig::default();
        let (a, _) = SegmenterParams::fit(&rows, &names(3), &config, 11).unwrap();
        let (b, _) = SegmenterParams::fit(&rows, &names(3), &config, 11).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_assign_breaks_ties_by_lowest_index() {
        let params = SegmenterParams {
            centroids: vec![vec![-1.0, 0.0], vec![1.0, 0.0]],
            segment_names: names(2),
            inertia: 0.0,
            restarts: 1,
        };
        assert_eq!(params.assign(&[0.0, 5.0]).unwrap(), 0);
        assert_eq!(params.assign(&[0.9, 0.0]).unwrap(), 1);
        assert_eq!(params.segment_name(1), Some("segment-1"));
        assert_eq!(params.segment_name(2), None);
    }

    #[test]
    fn test_fewer_rows_than_clusters_is_insufficient() {
        let rows = vec![vec![0.0], vec![1.0]];
        let err = SegmenterParams::fit(&rows, &names(4), &KMeansConfig::default(), 1).unwrap_err();
        assert!(matches!(err, ScoringError::InsufficientData { .. }));
    }

    #[test]
    fn test_fit_labels_follow_the_persisted_centroids() {
        let rows = blobs();
        let mut config = KMeansConfig::default();
        config.restarts = 4;
        let (params, labels) = SegmenterParams::fit(&rows, &names(3), &config, 5).unwrap();

        assert_eq!(params.restarts, 4);
        assert_eq!(params.k(), 3);
        for (row, label) in rows.iter().zip(&labels) {
            assert_eq!(params.assign(row).unwrap(), *label);
        }

        let json = serde_json::to_string(&params).unwrap();
        let restored: SegmenterParams = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.centroids, params.centroids);
    }

    #[test]
    fn test_assign_rejects_wrong_width() {
        let (params, _) =
            SegmenterParams::fit(&blobs(), &names(2), &KMeansConfig::default(), 3).unwrap();
        assert!(params.assign(&[1.0, 2.0, 3.0]).is_err());
    }
}
