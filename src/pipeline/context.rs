//! Immutable scoring context
//!
//! A [`ScoringContext`] bundles one coherent set of fitted parameters with the
//! configuration they were fitted under. It is never mutated after
//! construction, so any number of threads can score through a shared
//! `Arc<ScoringContext>`. Batch scoring and the simulator both go through
//! [`ScoringContext::score_features`]; a single record is just a batch of one.

use std::collections::HashMap;
use std::slice;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::classifier::{classifier_input, ClassifierParams};
use super::config::PipelineConfig;
use super::error::{Result, ScoringError};
use super::features::{engineer, EngineeredRecord, FeatureMatrix, FeatureSchema, FeatureVector};
use super::projector::ProjectorParams;
use super::record::Record;
use super::scorer::{interest_eligible, od_score, DisplayBand, RiskLevel};
use super::segmenter::SegmenterParams;
use super::standardizer::StandardizerParams;

/// Identifier and sector given to simulator records.
pub const SIMULATED_ID: &str = "SIMULATED";
pub const SIMULATED_TYPE: &str = "Simulated";

/// Model outputs for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    pub probability_of_default: f64,
    pub segment_id: usize,
}

/// An engineered record with its model outputs and derived scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub engineered: EngineeredRecord,
    pub probability_of_default: f64,
    pub segment_id: usize,
    pub segment_name: String,
    pub od_score: f64,
    pub interest_eligible: bool,
}

impl ScoredRecord {
    pub fn business_id(&self) -> &str {
        &self.engineered.record.business_id
    }

    pub fn business_type(&self) -> &str {
        &self.engineered.record.business_type
    }
}

/// What the simulator reports for one hypothetical business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub probability_of_default: f64,
    pub segment_id: usize,
    pub segment_name: String,
    pub od_score: f64,
    pub interest_eligible: bool,
    pub risk_level: RiskLevel,
    pub display_band: DisplayBand,
    pub profit: f64,
    pub profit_margin: f64,
    pub cash_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct ScoringContext {
    fit_id: String,
    config: PipelineConfig,
    schema: FeatureSchema,
    standardizer: StandardizerParams,
    projector: ProjectorParams,
    segmenter: SegmenterParams,
    classifier: ClassifierParams,
}

impl ScoringContext {
    /// Assemble a context, rejecting any parameter set whose stages do not
    /// chain together.
    pub fn new(
        fit_id: impl Into<String>,
        config: PipelineConfig,
        standardizer: StandardizerParams,
        projector: ProjectorParams,
        segmenter: SegmenterParams,
        classifier: ClassifierParams,
    ) -> Result<Self> {
        let schema = FeatureSchema::new(&config.features)?;

        if standardizer.feature_names != config.features {
            return mismatch(format!(
                "standardizer was fitted on {:?} but the configuration lists {:?}",
                standardizer.feature_names, config.features
            ));
        }
        let width = standardizer.width();
        if standardizer.means.len() != width || standardizer.scales.len() != width {
            return mismatch(format!(
                "standardizer carries {} mean(s) and {} scale(s) for {} feature(s)",
                standardizer.means.len(),
                standardizer.scales.len(),
                width
            ));
        }
        if projector.input_dim != width || projector.mean.len() != width {
            return mismatch(format!(
                "projector expects width {} but the standardizer produces {}",
                projector.input_dim, width
            ));
        }
        if projector.n_components() == 0
            || projector.components.iter().any(|c| c.len() != width)
        {
            return mismatch("projector basis vectors do not match its input width".to_string());
        }
        if segmenter.dim() != projector.n_components() {
            return mismatch(format!(
                "segmenter centroids have {} dimension(s) but the projector emits {}",
                segmenter.dim(),
                projector.n_components()
            ));
        }
        if segmenter.k() != segmenter.segment_names.len() || segmenter.k() != config.clusters {
            return mismatch(format!(
                "segmenter has {} centroid(s) and {} name(s); configuration asks for {}",
                segmenter.k(),
                segmenter.segment_names.len(),
                config.clusters
            ));
        }
        if segmenter.centroids.iter().any(|c| c.len() != segmenter.dim()) {
            return mismatch("segmenter centroids have uneven widths".to_string());
        }
        if classifier.input_dim != projector.n_components() + 1 {
            return mismatch(format!(
                "classifier expects {} input(s) but projection + segment gives {}",
                classifier.input_dim,
                projector.n_components() + 1
            ));
        }
        classifier.check_shape()?;

        Ok(Self {
            fit_id: fit_id.into(),
            config,
            schema,
            standardizer,
            projector,
            segmenter,
            classifier,
        })
    }

    pub fn fit_id(&self) -> &str {
        &self.fit_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn standardizer(&self) -> &StandardizerParams {
        &self.standardizer
    }

    pub fn projector(&self) -> &ProjectorParams {
        &self.projector
    }

    pub fn segmenter(&self) -> &SegmenterParams {
        &self.segmenter
    }

    pub fn classifier(&self) -> &ClassifierParams {
        &self.classifier
    }

    /// Run standardize, project, segment and classify over every row.
    ///
    /// The matrix column names must equal the fitted feature list exactly.
    pub fn score_features(&self, matrix: &FeatureMatrix) -> Result<Vec<ModelOutput>> {
        self.standardizer.check_schema(matrix.names())?;

        matrix
            .rows()
            .par_iter()
            .map(|row| {
                let standardized = self.standardizer.transform_row(row);
                let projected = self.projector.project_row(&standardized)?;
                let segment_id = self.segmenter.assign(&projected)?;
                let probability_of_default = self
                    .classifier
                    .predict_row(&classifier_input(&projected, segment_id))?;
                Ok(ModelOutput {
                    probability_of_default,
                    segment_id,
                })
            })
            .collect()
    }

    pub fn score_vector(&self, vector: FeatureVector) -> Result<ModelOutput> {
        let outputs = self.score_features(&FeatureMatrix::from(vector))?;
        single(outputs)
    }

    /// Engineer, score and derive the OD score and eligibility for a batch.
    pub fn score_records(&self, records: &[Record]) -> Result<Vec<ScoredRecord>> {
        let engineered: Vec<EngineeredRecord> =
            records.par_iter().map(engineer).collect::<Result<_>>()?;
        let matrix = self.schema.matrix(&engineered);
        let outputs = self.score_features(&matrix)?;

        Ok(engineered
            .into_iter()
            .zip(outputs)
            .map(|(engineered, output)| self.derive(engineered, output))
            .collect())
    }

    pub fn score_record(&self, record: &Record) -> Result<ScoredRecord> {
        single(self.score_records(slice::from_ref(record))?)
    }

    /// Score one hypothetical business given as `column name -> value`.
    pub fn simulate(&self, values: &HashMap<String, f64>) -> Result<SimulationResult> {
        let record = Record::from_map(SIMULATED_ID, SIMULATED_TYPE, values)?;
        let scored = self.score_record(&record)?;
        let pd = scored.probability_of_default;

        Ok(SimulationResult {
            probability_of_default: pd,
            segment_id: scored.segment_id,
            segment_name: scored.segment_name,
            od_score: scored.od_score,
            interest_eligible: scored.interest_eligible,
            risk_level: RiskLevel::classify(pd, &self.config.risk_bands),
            display_band: DisplayBand::classify(pd, &self.config.display_bands),
            profit: scored.engineered.profit,
            profit_margin: scored.engineered.profit_margin,
            cash_ratio: scored.engineered.cash_ratio,
        })
    }

    fn derive(&self, engineered: EngineeredRecord, output: ModelOutput) -> ScoredRecord {
        let pd = output.probability_of_default;
        let od_utilization = engineered.record.raw.od_utilization;
        ScoredRecord {
            od_score: od_score(pd, engineered.cash_ratio),
            interest_eligible: interest_eligible(
                pd,
                od_utilization,
                self.config.pd_threshold,
                self.config.od_util_threshold,
            ),
            segment_name: self
                .segmenter
                .segment_name(output.segment_id)
                .unwrap_or_default()
                .to_string(),
            segment_id: output.segment_id,
            probability_of_default: pd,
            engineered,
        }
    }
}

fn mismatch<T>(message: String) -> Result<T> {
    Err(ScoringError::ArtifactVersionMismatch(message))
}

fn single<T>(mut items: Vec<T>) -> Result<T> {
    match (items.pop(), items.is_empty()) {
        (Some(item), true) => Ok(item),
        _ => Err(ScoringError::InvalidState(
            "expected exactly one scored row".to_string(),
        )),
    }
}
