//! Error taxonomy for the scoring pipeline.
//!
//! Every fallible operation in the library returns [`ScoringError`]. Fit-time
//! failures are additionally wrapped in [`FitError`] so callers can report the
//! stage that aborted the fit.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the pipeline.
pub type Result<T, E = ScoringError> = std::result::Result<T, E>;

/// Errors raised by the scoring pipeline.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// A required raw field is absent or not a finite number.
    #[error("record '{record}' is missing required field '{field}'")]
    MissingField { record: String, field: String },

    /// Feature names/order differ from the ones the artifacts were fitted with.
    #[error("feature schema mismatch: fitted with {expected:?}, got {actual:?}")]
    FeatureSchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A vector handed to a fitted stage has the wrong width.
    #[error("{stage} expects vectors of width {expected}, got {actual}")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The fit batch cannot support the requested stage.
    #[error("insufficient data for {stage}: {detail}")]
    InsufficientData { stage: &'static str, detail: String },

    /// The loaded artifacts do not belong to one coherent fit.
    #[error("incoherent artifact set: {0}")]
    ArtifactVersionMismatch(String),

    /// Another fit holds the single-writer lock on the artifact directory.
    #[error("a fit is already in progress for {}", .0.display())]
    FitInProgress(PathBuf),

    /// An operation was attempted in a pipeline state that does not allow it.
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("artifact I/O failed for {}: {source}", path.display())]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} could not be decoded: {source}", path.display())]
    ArtifactFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The record source could not be read.
    #[error("failed to read records: {0}")]
    Source(#[from] polars::prelude::PolarsError),
}

impl ScoringError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::ArtifactFormat {
            path: path.into(),
            source,
        }
    }
}

/// Non-fatal conditions observed while fitting.
///
/// These never abort a fit; they are logged and recorded in the fit report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitWarning {
    /// A feature had zero variance; its scale was clamped to `epsilon`.
    DegenerateFeature { feature: String, epsilon: f64 },
    /// The classifier hit its epoch limit before early stopping triggered.
    NotConverged {
        epochs: usize,
        validation_loss: f64,
    },
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWarning::DegenerateFeature { feature, epsilon } => write!(
                f,
                "feature '{}' has zero variance, scale clamped to {:e}",
                feature, epsilon
            ),
            FitWarning::NotConverged {
                epochs,
                validation_loss,
            } => write!(
                f,
                "classifier reached the {}-epoch limit without early stopping (validation loss {:.4})",
                epochs, validation_loss
            ),
        }
    }
}

/// Pipeline stage a fit attempt can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitStage {
    Validate,
    Engineer,
    Standardize,
    Project,
    Segment,
    Classify,
    Persist,
}

impl FitStage {
    /// Stages in execution order.
    pub const ALL: [FitStage; 7] = [
        FitStage::Validate,
        FitStage::Engineer,
        FitStage::Standardize,
        FitStage::Project,
        FitStage::Segment,
        FitStage::Classify,
        FitStage::Persist,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            FitStage::Validate => "Input Validation",
            FitStage::Engineer => "Feature Engineering",
            FitStage::Standardize => "Standardization",
            FitStage::Project => "Principal Component Projection",
            FitStage::Segment => "K-Means Segmentation",
            FitStage::Classify => "Risk Classifier Training",
            FitStage::Persist => "Artifact Persistence",
        }
    }
}

impl fmt::Display for FitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FitStage::Validate => "validate",
            FitStage::Engineer => "engineer",
            FitStage::Standardize => "standardize",
            FitStage::Project => "project",
            FitStage::Segment => "segment",
            FitStage::Classify => "classify",
            FitStage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// A fit attempt that was abandoned, tagged with the failing stage.
#[derive(Debug, Error)]
#[error("fit failed at stage '{stage}': {source}")]
pub struct FitError {
    pub stage: FitStage,
    #[source]
    pub source: ScoringError,
}

impl FitError {
    pub fn new(stage: FitStage, source: ScoringError) -> Self {
        Self { stage, source }
    }
}

/// Attach a fit stage to a stage-level result.
pub(crate) trait AtStage<T> {
    fn at_stage(self, stage: FitStage) -> std::result::Result<T, FitError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at_stage(self, stage: FitStage) -> std::result::Result<T, FitError> {
        self.map_err(|source| FitError::new(stage, source))
    }
}
