//! Fit orchestration and the pipeline state machine
//!
//! `Unfitted -> Fitting -> Fitted -> (Persisted | FitFailed)`. A pipeline
//! instance fits at most once; persisted artifacts load straight into
//! `Fitted` in any later process. Scoring borrows the immutable context and
//! never changes state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::artifacts::{new_fit_id, ArtifactStore, ContextCache, FitLock};
use super::classifier::{classifier_input, proxy_label, ClassifierParams, EvaluationMetrics, TrainingReport};
use super::config::PipelineConfig;
use super::context::{ScoredRecord, ScoringContext, SimulationResult};
use super::error::{AtStage, FitError, FitStage, FitWarning, Result, ScoringError};
use super::features::{engineer_all, FeatureSchema};
use super::projector::ProjectorParams;
use super::record::Record;
use super::segmenter::SegmenterParams;
use super::standardizer::StandardizerParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unfitted,
    Fitting,
    Fitted,
    Persisted,
    FitFailed(FitStage),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Unfitted => f.write_str("unfitted"),
            PipelineState::Fitting => f.write_str("fitting"),
            PipelineState::Fitted => f.write_str("fitted"),
            PipelineState::Persisted => f.write_str("persisted"),
            PipelineState::FitFailed(stage) => write!(f, "fit failed at {}", stage),
        }
    }
}

/// Summary of one completed fit, persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub fit_id: String,
    pub records: usize,
    pub features: Vec<String>,
    pub projected_dims: usize,
    pub retained_variance: f64,
    pub segment_names: Vec<String>,
    /// Fit rows assigned to each segment, by centroid index.
    pub segment_sizes: Vec<usize>,
    pub inertia: f64,
    /// Share of fit rows carrying the positive proxy label.
    pub positive_rate: f64,
    pub training: TrainingReport,
    pub evaluation: EvaluationMetrics,
    pub warnings: Vec<FitWarning>,
}

/// Receives stage notifications during a fit.
pub trait FitObserver {
    fn stage_started(&self, _stage: FitStage) {}
    fn stage_finished(&self, _stage: FitStage) {}
    fn warning(&self, _warning: &FitWarning) {}
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl FitObserver for SilentObserver {}

pub struct Pipeline {
    config: PipelineConfig,
    state: PipelineState,
    context: Option<Arc<ScoringContext>>,
    report: Option<FitReport>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Unfitted,
            context: None,
            report: None,
        }
    }

    /// Load persisted artifacts directly into the `Fitted` state.
    pub fn load(store: &ArtifactStore, config: PipelineConfig) -> Result<Self> {
        let context = ContextCache::global().get_or_load(store, &config)?;
        Ok(Self::from_context(context))
    }

    /// Wrap an already loaded context.
    pub fn from_context(context: Arc<ScoringContext>) -> Self {
        Self {
            config: context.config().clone(),
            state: PipelineState::Fitted,
            context: Some(context),
            report: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn report(&self) -> Option<&FitReport> {
        self.report.as_ref()
    }

    /// Fit every stage on `records`.
    pub fn fit(
        &mut self,
        records: &[Record],
        observer: &dyn FitObserver,
    ) -> std::result::Result<&FitReport, FitError> {
        if self.state != PipelineState::Unfitted {
            return Err(FitError::new(
                FitStage::Validate,
                ScoringError::InvalidState(format!(
                    "cannot fit a pipeline that is {}; start a new pipeline",
                    self.state
                )),
            ));
        }

        self.state = PipelineState::Fitting;
        match fit_stages(&self.config, records, observer) {
            Ok((context, report)) => {
                self.context = Some(Arc::new(context));
                self.state = PipelineState::Fitted;
                Ok(self.report.insert(report))
            }
            Err(e) => {
                log::warn!("{}", e);
                self.state = PipelineState::FitFailed(e.stage);
                Err(e)
            }
        }
    }

    /// Write the fitted artifacts to `store`; the caller holds its lock.
    pub fn persist(
        &mut self,
        store: &ArtifactStore,
        lock: &FitLock,
    ) -> std::result::Result<(), FitError> {
        let (context, report) = match (&self.context, &self.report, self.state) {
            (Some(context), Some(report), PipelineState::Fitted) => (context, report),
            _ => {
                return Err(FitError::new(
                    FitStage::Persist,
                    ScoringError::InvalidState(format!(
                        "only a freshly fitted pipeline can be persisted (state: {})",
                        self.state
                    )),
                ))
            }
        };

        match store.save(lock, context, report) {
            Ok(()) => {
                ContextCache::global().invalidate(store.root());
                self.state = PipelineState::Persisted;
                Ok(())
            }
            Err(e) => {
                self.state = PipelineState::FitFailed(FitStage::Persist);
                Err(FitError::new(FitStage::Persist, e))
            }
        }
    }

    /// Lock the store, fit, and persist.
    pub fn train(
        &mut self,
        records: &[Record],
        store: &ArtifactStore,
        observer: &dyn FitObserver,
    ) -> std::result::Result<FitReport, FitError> {
        let lock = store.lock().at_stage(FitStage::Validate)?;
        let report = self.fit(records, observer)?.clone();

        observer.stage_started(FitStage::Persist);
        self.persist(store, &lock)?;
        observer.stage_finished(FitStage::Persist);
        Ok(report)
    }

    /// Shared handle on the fitted context.
    pub fn context(&self) -> Result<Arc<ScoringContext>> {
        match (&self.context, self.state) {
            (Some(context), PipelineState::Fitted | PipelineState::Persisted) => {
                Ok(Arc::clone(context))
            }
            _ => Err(ScoringError::InvalidState(format!(
                "cannot score with a pipeline that is {}",
                self.state
            ))),
        }
    }

    pub fn score(&self, records: &[Record]) -> Result<Vec<ScoredRecord>> {
        self.context()?.score_records(records)
    }

    pub fn simulate(&self, values: &HashMap<String, f64>) -> Result<SimulationResult> {
        self.context()?.simulate(values)
    }
}

fn run_stage<T>(
    observer: &dyn FitObserver,
    stage: FitStage,
    body: impl FnOnce() -> Result<T>,
) -> std::result::Result<T, FitError> {
    observer.stage_started(stage);
    let value = body().at_stage(stage)?;
    observer.stage_finished(stage);
    Ok(value)
}

fn fit_stages(
    config: &PipelineConfig,
    records: &[Record],
    observer: &dyn FitObserver,
) -> std::result::Result<(ScoringContext, FitReport), FitError> {
    let schema = run_stage(observer, FitStage::Validate, || {
        config.validate()?;
        if records.is_empty() {
            return Err(ScoringError::InsufficientData {
                stage: "fit",
                detail: "the fit batch is empty".to_string(),
            });
        }
        FeatureSchema::new(&config.features)
    })?;

    let (engineered, matrix) = run_stage(observer, FitStage::Engineer, || {
        let engineered = engineer_all(records)?;
        let matrix = schema.matrix(&engineered);
        Ok((engineered, matrix))
    })?;

    let mut warnings = Vec::new();
    let (standardizer, standardized) = run_stage(observer, FitStage::Standardize, || {
        let (params, degenerate) = StandardizerParams::fit(&matrix)?;
        let standardized = params.transform(&matrix)?;
        warnings.extend(degenerate);
        Ok((params, standardized))
    })?;

    let (projector, projected) = run_stage(observer, FitStage::Project, || {
        let params = ProjectorParams::fit(&standardized, config.pca_variance_threshold)?;
        let projected = params.transform(&standardized)?;
        Ok((params, projected))
    })?;

    let (segmenter, segments) = run_stage(observer, FitStage::Segment, || {
        SegmenterParams::fit(&projected, &config.segment_names, &config.kmeans, config.seed)
    })?;

    let labels: Vec<u8> = engineered.iter().map(|e| proxy_label(&e.record.raw)).collect();
    let (classifier, evaluation) = run_stage(observer, FitStage::Classify, || {
        let inputs: Vec<Vec<f64>> = projected
            .iter()
            .zip(&segments)
            .map(|(row, segment)| classifier_input(row, *segment))
            .collect();
        ClassifierParams::fit(&inputs, &labels, &config.classifier, config.seed)
    })?;

    if !classifier.training.converged() {
        warnings.push(FitWarning::NotConverged {
            epochs: classifier.training.epochs,
            validation_loss: classifier.training.final_validation_loss,
        });
    }
    for warning in &warnings {
        observer.warning(warning);
    }

    let mut segment_sizes = vec![0; segmenter.k()];
    for segment in &segments {
        segment_sizes[*segment] += 1;
    }
    let positives = labels.iter().filter(|l| **l == 1).count();

    let report = FitReport {
        fit_id: new_fit_id(),
        records: records.len(),
        features: config.features.clone(),
        projected_dims: projector.n_components(),
        retained_variance: projector.retained_variance(),
        segment_names: segmenter.segment_names.clone(),
        segment_sizes,
        inertia: segmenter.inertia,
        positive_rate: positives as f64 / records.len() as f64,
        training: classifier.training.clone(),
        evaluation,
        warnings,
    };

    let context = ScoringContext::new(
        report.fit_id.clone(),
        config.clone(),
        standardizer,
        projector,
        segmenter,
        classifier,
    )
    .at_stage(FitStage::Classify)?;

    log::info!(
        "fit {} complete: {} records, {} component(s), {} segment(s)",
        report.fit_id,
        report.records,
        report.projected_dims,
        report.segment_names.len()
    );
    Ok((context, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pipeline_cannot_score() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        assert_eq!(pipeline.state(), PipelineState::Unfitted);
        assert!(matches!(
            pipeline.score(&[]),
            Err(ScoringError::InvalidState(_))
        ));
    }

    #[test]
    fn test_empty_batch_fails_at_validation() {
        let mut pipeline = Pipeline::new(PipelineConfig::default());
        let err = pipeline.fit(&[], &SilentObserver).unwrap_err();
        assert_eq!(err.stage, FitStage::Validate);
        assert_eq!(pipeline.state(), PipelineState::FitFailed(FitStage::Validate));

        // A failed pipeline stays failed.
        let again = pipeline.fit(&[], &SilentObserver).unwrap_err();
        assert!(matches!(again.source, ScoringError::InvalidState(_)));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            PipelineState::FitFailed(FitStage::Project).to_string(),
            "fit failed at project"
        );
    }
}
