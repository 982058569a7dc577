//! Pipeline module - feature engineering through scoring, plus the artifact lifecycle

pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod loader;
pub mod orchestrator;
pub mod projector;
pub mod record;
pub mod scorer;
pub mod segmenter;
pub mod standardizer;

pub use artifacts::{ArtifactStore, ContextCache, FitLock};
pub use classifier::{proxy_label, ClassifierParams, EvaluationMetrics, StopReason, TrainingReport};
pub use config::PipelineConfig;
pub use context::{ScoredRecord, ScoringContext, SimulationResult};
pub use error::{FitError, FitStage, FitWarning, Result, ScoringError};
pub use features::{engineer, EngineeredRecord, FeatureMatrix, FeatureSchema, FeatureVector};
pub use loader::{CsvRecordSource, MemoryRecordSource, RecordSource};
pub use orchestrator::{FitObserver, FitReport, Pipeline, PipelineState, SilentObserver};
pub use projector::ProjectorParams;
pub use record::{RawField, RawFinancials, Record};
pub use scorer::{DisplayBand, RiskLevel};
pub use segmenter::SegmenterParams;
pub use standardizer::StandardizerParams;
