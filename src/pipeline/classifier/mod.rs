//! Risk classifier
//!
//! A feed-forward network scoring `[projected vector, segment id]` against
//! the proxy default label. Training lives in [`network`]; held-out metrics
//! in [`evaluation`]. Inference is a plain row-by-row forward pass so one row
//! scores identically alone or inside a batch.

pub mod evaluation;
pub mod network;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use evaluation::{evaluate, stratified_split, ConfusionMatrix, EvaluationMetrics};
pub use network::{StopReason, TrainingReport};

use super::config::ClassifierConfig;
use super::error::{Result, ScoringError};
use super::record::RawFinancials;

/// Proxy label condition: OD utilisation strictly above this.
pub const OD_UTILIZATION_LIMIT: f64 = 0.70;
/// Proxy label condition: debt-to-revenue strictly above this.
pub const DEBT_RATIO_LIMIT: f64 = 0.15;
/// Proxy label condition: credit score strictly below this.
pub const CREDIT_SCORE_FLOOR: f64 = 600.0;

/// 1 ("high risk") when at least two of the three stress conditions hold.
pub fn proxy_label(raw: &RawFinancials) -> u8 {
    let conditions = [
        raw.od_utilization > OD_UTILIZATION_LIMIT,
        raw.debt_to_revenue_ratio > DEBT_RATIO_LIMIT,
        raw.credit_score < CREDIT_SCORE_FLOOR,
    ];
    (conditions.iter().filter(|hit| **hit).count() >= 2) as u8
}

/// Classifier input: the projected vector followed by the segment id.
pub fn classifier_input(projected: &[f64], segment: usize) -> Vec<f64> {
    let mut input = Vec::with_capacity(projected.len() + 1);
    input.extend_from_slice(projected);
    input.push(segment as f64);
    input
}

/// Numerically stable logistic function.
pub(crate) fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// One fully connected layer; `weights` is row-major `inputs x outputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn apply(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|j| {
                let mut total = self.bias[j];
                for (i, x) in input.iter().enumerate() {
                    total += x * self.weights[i * self.outputs + j];
                }
                total
            })
            .collect()
    }
}

/// Fitted classifier weights and the history of the fit that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierParams {
    /// Projected dimensions + 1.
    pub input_dim: usize,
    pub layers: Vec<DenseLayer>,
    pub training: TrainingReport,
}

impl ClassifierParams {
    /// Split off a stratified test set, train on the remainder and evaluate.
    ///
    /// An empty test split (tiny batches) falls back to evaluating on the
    /// training rows.
    pub fn fit(
        inputs: &[Vec<f64>],
        labels: &[u8],
        config: &ClassifierConfig,
        seed: u64,
    ) -> Result<(Self, EvaluationMetrics)> {
        if inputs.len() != labels.len() {
            return Err(ScoringError::DimensionMismatch {
                stage: "classifier labels",
                expected: inputs.len(),
                actual: labels.len(),
            });
        }
        let Some(input_dim) = inputs.first().map(Vec::len) else {
            return Err(ScoringError::InsufficientData {
                stage: "classifier",
                detail: "no labelled rows".to_string(),
            });
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let (train_rows, test_rows) = stratified_split(labels, config.test_fraction, &mut rng);

        let train_inputs: Vec<Vec<f64>> = train_rows.iter().map(|i| inputs[*i].clone()).collect();
        let train_labels: Vec<u8> = train_rows.iter().map(|i| labels[*i]).collect();
        let (layers, training) =
            network::train(&train_inputs, &train_labels, config, seed.wrapping_add(1))?;

        if !training.converged() {
            log::warn!(
                "classifier stopped at the {}-epoch limit (validation loss {:.4})",
                training.epochs,
                training.final_validation_loss
            );
        }

        let params = Self {
            input_dim,
            layers,
            training,
        };

        let eval_rows = if test_rows.is_empty() { &train_rows } else { &test_rows };
        let eval_inputs: Vec<Vec<f64>> = eval_rows.iter().map(|i| inputs[*i].clone()).collect();
        let eval_labels: Vec<u8> = eval_rows.iter().map(|i| labels[*i]).collect();
        let metrics = evaluate(&params.predict(&eval_inputs)?, &eval_labels);

        Ok((params, metrics))
    }

    /// Probability of the positive class for one input row.
    pub fn predict_row(&self, input: &[f64]) -> Result<f64> {
        if input.len() != self.input_dim {
            return Err(ScoringError::DimensionMismatch {
                stage: "classifier",
                expected: self.input_dim,
                actual: input.len(),
            });
        }

        let last = self.layers.len().saturating_sub(1);
        let mut activation = input.to_vec();
        for (index, layer) in self.layers.iter().enumerate() {
            activation = layer.apply(&activation);
            if index < last {
                activation.iter_mut().for_each(|a| *a = a.max(0.0));
            }
        }

        let z = activation.first().copied().unwrap_or(0.0);
        Ok(logistic(z).clamp(0.0, 1.0))
    }

    pub fn predict(&self, inputs: &[Vec<f64>]) -> Result<Vec<f64>> {
        inputs.par_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Check the stored layers chain from `input_dim` to a single output.
    pub fn check_shape(&self) -> Result<()> {
        let mut width = self.input_dim;
        for layer in &self.layers {
            if layer.inputs != width
                || layer.weights.len() != layer.inputs * layer.outputs
                || layer.bias.len() != layer.outputs
            {
                return Err(ScoringError::ArtifactVersionMismatch(format!(
                    "classifier layer expects {} input(s) but receives {}",
                    layer.inputs, width
                )));
            }
            width = layer.outputs;
        }
        if self.layers.is_empty() || width != 1 {
            return Err(ScoringError::ArtifactVersionMismatch(
                "classifier must end in a single output".to_string(),
            ));
        }
        Ok(())
    }
}
