//! odrisk: Overdraft Risk Scoring Library
//!
//! Scores business overdraft risk by chaining feature engineering,
//! standardization, PCA, K-Means segmentation and a neural
//! probability-of-default model, then aggregates the results by sector.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
