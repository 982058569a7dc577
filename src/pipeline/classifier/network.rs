//! Multi-layer perceptron training
//!
//! Mini-batch Adam over a ReLU network with a single logistic output,
//! L2-regularised log-loss, and early stopping on a held-out validation
//! split. Batch forward/backward passes use faer matrix products; the fitted
//! weights are exported as plain [`DenseLayer`]s for inference.

use faer::Mat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::evaluation::stratified_split;
use super::{logistic, DenseLayer};
use crate::pipeline::config::ClassifierConfig;
use crate::pipeline::error::{Result, ScoringError};

const BETA_1: f64 = 0.9;
const BETA_2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
/// Probability clip used inside the log-loss.
const LOSS_EPSILON: f64 = 1e-15;

/// Why training stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Validation loss stopped improving for `patience` epochs.
    Converged,
    /// The epoch limit was reached first.
    MaxIterationsReached,
}

/// Training history recorded alongside the fitted weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub stop_reason: StopReason,
    pub best_validation_loss: f64,
    pub final_validation_loss: f64,
    /// Mean penalised training loss per epoch.
    pub loss_curve: Vec<f64>,
    pub validation_curve: Vec<f64>,
    pub training_samples: usize,
    pub validation_samples: usize,
}

impl TrainingReport {
    pub fn converged(&self) -> bool {
        self.stop_reason == StopReason::Converged
    }
}

struct Network {
    weights: Vec<Mat<f64>>,
    biases: Vec<Vec<f64>>,
}

struct Gradients {
    weights: Vec<Mat<f64>>,
    biases: Vec<Vec<f64>>,
}

struct Adam {
    learning_rate: f64,
    step: i32,
    m_weights: Vec<Mat<f64>>,
    v_weights: Vec<Mat<f64>>,
    m_biases: Vec<Vec<f64>>,
    v_biases: Vec<Vec<f64>>,
}

impl Network {
    /// Glorot-uniform initialisation; the logistic output layer uses factor 2.
    fn glorot(widths: &[usize], rng: &mut StdRng) -> Self {
        let mut weights = Vec::with_capacity(widths.len() - 1);
        let mut biases = Vec::with_capacity(widths.len() - 1);

        for (layer, pair) in widths.windows(2).enumerate() {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let factor = if layer + 2 == widths.len() { 2.0 } else { 6.0 };
            let bound = (factor / (fan_in + fan_out) as f64).sqrt();

            let mut w = Mat::<f64>::zeros(fan_in, fan_out);
            for i in 0..fan_in {
                for j in 0..fan_out {
                    w[(i, j)] = rng.gen_range(-bound..bound);
                }
            }
            weights.push(w);
            biases.push((0..fan_out).map(|_| rng.gen_range(-bound..bound)).collect());
        }

        Self { weights, biases }
    }

    fn depth(&self) -> usize {
        self.weights.len()
    }

    /// Activations of every layer, the input first and the probabilities last.
    fn forward(&self, input: Mat<f64>) -> Vec<Mat<f64>> {
        let depth = self.depth();
        let mut activations = Vec::with_capacity(depth + 1);
        activations.push(input);

        for layer in 0..depth {
            let mut z = activations[layer].as_ref() * self.weights[layer].as_ref();
            let bias = &self.biases[layer];
            let output = layer + 1 == depth;
            for j in 0..z.ncols() {
                for i in 0..z.nrows() {
                    let value = z[(i, j)] + bias[j];
                    z[(i, j)] = if output { logistic(value) } else { value.max(0.0) };
                }
            }
            activations.push(z);
        }
        activations
    }

    fn backward(&self, activations: &[Mat<f64>], targets: &[f64], l2_penalty: f64) -> Gradients {
        let depth = self.depth();
        let n = targets.len() as f64;
        let output = &activations[depth];

        let mut delta = Mat::from_fn(targets.len(), 1, |i, _| output[(i, 0)] - targets[i]);
        let mut weights = Vec::with_capacity(depth);
        let mut biases = Vec::with_capacity(depth);

        for layer in (0..depth).rev() {
            let w = &self.weights[layer];
            let mut grad_w = activations[layer].transpose() * delta.as_ref();
            for j in 0..grad_w.ncols() {
                for i in 0..grad_w.nrows() {
                    grad_w[(i, j)] = (grad_w[(i, j)] + l2_penalty * w[(i, j)]) / n;
                }
            }
            let grad_b: Vec<f64> = (0..delta.ncols())
                .map(|j| (0..delta.nrows()).map(|i| delta[(i, j)]).sum::<f64>() / n)
                .collect();

            if layer > 0 {
                let mut next = delta.as_ref() * w.transpose();
                let hidden = &activations[layer];
                for j in 0..next.ncols() {
                    for i in 0..next.nrows() {
                        if hidden[(i, j)] <= 0.0 {
                            next[(i, j)] = 0.0;
                        }
                    }
                }
                delta = next;
            }

            weights.push(grad_w);
            biases.push(grad_b);
        }

        weights.reverse();
        biases.reverse();
        Gradients { weights, biases }
    }

    fn squared_weight_norm(&self) -> f64 {
        self.weights
            .iter()
            .map(|w| {
                let mut total = 0.0;
                for j in 0..w.ncols() {
                    for i in 0..w.nrows() {
                        total += w[(i, j)] * w[(i, j)];
                    }
                }
                total
            })
            .sum()
    }

    fn snapshot(&self) -> Self {
        Self {
            weights: self.weights.clone(),
            biases: self.biases.clone(),
        }
    }

    fn into_layers(self) -> Vec<DenseLayer> {
        self.weights
            .into_iter()
            .zip(self.biases)
            .map(|(w, bias)| {
                let (inputs, outputs) = (w.nrows(), w.ncols());
                let mut weights = Vec::with_capacity(inputs * outputs);
                for i in 0..inputs {
                    for j in 0..outputs {
                        weights.push(w[(i, j)]);
                    }
                }
                DenseLayer {
                    inputs,
                    outputs,
                    weights,
                    bias,
                }
            })
            .collect()
    }
}

impl Adam {
    fn new(network: &Network, learning_rate: f64) -> Self {
        let zeros_like = |w: &Mat<f64>| Mat::<f64>::zeros(w.nrows(), w.ncols());
        Self {
            learning_rate,
            step: 0,
            m_weights: network.weights.iter().map(zeros_like).collect(),
            v_weights: network.weights.iter().map(zeros_like).collect(),
            m_biases: network.biases.iter().map(|b| vec![0.0; b.len()]).collect(),
            v_biases: network.biases.iter().map(|b| vec![0.0; b.len()]).collect(),
        }
    }

    fn update(&mut self, network: &mut Network, gradients: &Gradients) {
        self.step += 1;
        let rate = self.learning_rate * (1.0 - BETA_2.powi(self.step)).sqrt()
            / (1.0 - BETA_1.powi(self.step));

        for layer in 0..network.depth() {
            let w = &mut network.weights[layer];
            let g = &gradients.weights[layer];
            let m = &mut self.m_weights[layer];
            let v = &mut self.v_weights[layer];
            for j in 0..w.ncols() {
                for i in 0..w.nrows() {
                    let grad = g[(i, j)];
                    m[(i, j)] = BETA_1 * m[(i, j)] + (1.0 - BETA_1) * grad;
                    v[(i, j)] = BETA_2 * v[(i, j)] + (1.0 - BETA_2) * grad * grad;
                    w[(i, j)] -= rate * m[(i, j)] / (v[(i, j)].sqrt() + ADAM_EPSILON);
                }
            }

            let b = &mut network.biases[layer];
            let g = &gradients.biases[layer];
            let m = &mut self.m_biases[layer];
            let v = &mut self.v_biases[layer];
            for k in 0..b.len() {
                m[k] = BETA_1 * m[k] + (1.0 - BETA_1) * g[k];
                v[k] = BETA_2 * v[k] + (1.0 - BETA_2) * g[k] * g[k];
                b[k] -= rate * m[k] / (v[k].sqrt() + ADAM_EPSILON);
            }
        }
    }
}

fn gather(inputs: &[Vec<f64>], indices: &[usize]) -> Mat<f64> {
    let width = inputs[indices[0]].len();
    Mat::from_fn(indices.len(), width, |i, j| inputs[indices[i]][j])
}

fn log_loss(probabilities: &Mat<f64>, targets: &[f64]) -> f64 {
    let total: f64 = targets
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let p = probabilities[(i, 0)].clamp(LOSS_EPSILON, 1.0 - LOSS_EPSILON);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / targets.len() as f64
}

/// Train a network on `inputs` against binary `labels`.
///
/// Returns the best-validation layers and the training history.
pub fn train(
    inputs: &[Vec<f64>],
    labels: &[u8],
    config: &ClassifierConfig,
    seed: u64,
) -> Result<(Vec<DenseLayer>, TrainingReport)> {
    if inputs.is_empty() {
        return Err(ScoringError::InsufficientData {
            stage: "classifier",
            detail: "no training rows".to_string(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let input_dim = inputs[0].len();
    let mut widths = Vec::with_capacity(config.hidden_layers.len() + 2);
    widths.push(input_dim);
    widths.extend_from_slice(&config.hidden_layers);
    widths.push(1);

    let (mut train_rows, validation_rows) =
        stratified_split(labels, config.validation_fraction, &mut rng);
    if train_rows.is_empty() {
        return Err(ScoringError::InsufficientData {
            stage: "classifier",
            detail: "validation split left no training rows".to_string(),
        });
    }
    // Without a validation split, early stopping watches the training loss.
    let monitor_rows = if validation_rows.is_empty() {
        train_rows.clone()
    } else {
        validation_rows.clone()
    };
    let monitor_input = gather(inputs, &monitor_rows);
    let monitor_targets: Vec<f64> = monitor_rows.iter().map(|i| labels[*i] as f64).collect();

    let mut network = Network::glorot(&widths, &mut rng);
    let mut adam = Adam::new(&network, config.learning_rate);
    let batch_size = config.batch_size.min(train_rows.len()).max(1);

    let mut best_loss = f64::INFINITY;
    let mut best = network.snapshot();
    let mut stalled = 0;
    let mut loss_curve = Vec::with_capacity(config.max_epochs);
    let mut validation_curve = Vec::with_capacity(config.max_epochs);
    let mut stop_reason = StopReason::MaxIterationsReached;

    for epoch in 0..config.max_epochs {
        train_rows.shuffle(&mut rng);
        let mut epoch_loss = 0.0;

        for batch in train_rows.chunks(batch_size) {
            let targets: Vec<f64> = batch.iter().map(|i| labels[*i] as f64).collect();
            let activations = network.forward(gather(inputs, batch));
            let penalty =
                0.5 * config.l2_penalty * network.squared_weight_norm() / batch.len() as f64;
            epoch_loss += (log_loss(&activations[network.depth()], &targets) + penalty)
                * batch.len() as f64;

            let gradients = network.backward(&activations, &targets, config.l2_penalty);
            adam.update(&mut network, &gradients);
        }
        loss_curve.push(epoch_loss / train_rows.len() as f64);

        let monitored = network.forward(monitor_input.clone());
        let validation_loss = log_loss(&monitored[network.depth()], &monitor_targets);
        validation_curve.push(validation_loss);

        if validation_loss > best_loss - config.tolerance {
            stalled += 1;
        } else {
            stalled = 0;
        }
        if validation_loss < best_loss {
            best_loss = validation_loss;
            best = network.snapshot();
        }

        log::debug!(
            "epoch {}: train loss {:.5}, validation loss {:.5}",
            epoch + 1,
            loss_curve[epoch],
            validation_loss
        );

        if stalled >= config.patience {
            stop_reason = StopReason::Converged;
            break;
        }
    }

    let report = TrainingReport {
        epochs: loss_curve.len(),
        stop_reason,
        best_validation_loss: best_loss,
        final_validation_loss: validation_curve.last().copied().unwrap_or(best_loss),
        loss_curve,
        validation_curve,
        training_samples: train_rows.len(),
        validation_samples: validation_rows.len(),
    };
    Ok((best.into_layers(), report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            hidden_layers: vec![8, 4],
            max_epochs: 60,
            batch_size: 16,
            learning_rate: 1e-2,
            ..ClassifierConfig::default()
        }
    }

    /// Label is 1 when the first coordinate is positive.
    fn separable(n: usize) -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut rng = StdRng::seed_from_u64(5);
        let inputs: Vec<Vec<f64>> = (0..n)
            .map(|_| vec![rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
            .collect();
        let labels = inputs.iter().map(|x| (x[0] > 0.0) as u8).collect();
        (inputs, labels)
    }

    #[test]
    fn test_training_reduces_loss() {
        let (inputs, labels) = separable(200);
        let (layers, report) = train(&inputs, &labels, &small_config(), 42).unwrap();

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].inputs, 2);
        assert_eq!(layers[2].outputs, 1);
        assert!(report.epochs >= 1);
        assert_eq!(report.loss_curve.len(), report.epochs);
        assert!(report.loss_curve.last().unwrap() < report.loss_curve.first().unwrap());
        assert!(report.best_validation_loss <= report.final_validation_loss);
        assert_eq!(report.training_samples + report.validation_samples, 200);
    }

    #[test]
    fn test_training_is_seed_deterministic() {
        let (inputs, labels) = separable(80);
        let (a, report_a) = train(&inputs, &labels, &small_config(), 9).unwrap();
        let (b, report_b) = train(&inputs, &labels, &small_config(), 9).unwrap();
        assert_eq!(a, b);
        assert_eq!(report_a, report_b);
    }

    #[test]
    fn test_epoch_limit_is_reported() {
        let (inputs, labels) = separable(50);
        let config = ClassifierConfig {
            max_epochs: 2,
            ..small_config()
        };
        let (_, report) = train(&inputs, &labels, &config, 1).unwrap();
        assert_eq!(report.epochs, 2);
        assert_eq!(report.stop_reason, StopReason::MaxIterationsReached);
        assert!(!report.converged());
    }

    #[test]
    fn test_empty_training_set_is_insufficient() {
        let err = train(&[], &[], &small_config(), 1).unwrap_err();
        assert!(matches!(err, ScoringError::InsufficientData { .. }));
    }
}
