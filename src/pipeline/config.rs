//! Pipeline configuration
//!
//! Defaults reproduce the reference configuration. Values can be overridden by
//! a JSON file and then by `ODRISK_*` environment variables. Any change to the
//! effective configuration invalidates previously persisted artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{Result, ScoringError};
use super::features::{reference_features, FeatureSchema};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "ODRISK_CONFIG";

/// K-Means fitting controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    /// Independent k-means++ runs; the lowest-inertia run is kept.
    pub restarts: usize,
    pub max_iterations: usize,
    /// Convergence tolerance on centroid shift.
    pub tolerance: f64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

/// Risk classifier architecture and training controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub l2_penalty: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Share of the training split held out for early stopping.
    pub validation_fraction: f64,
    /// Epochs without validation improvement before stopping.
    pub patience: usize,
    pub tolerance: f64,
    /// Share of the labelled batch held out for evaluation.
    pub test_fraction: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![256, 128, 64],
            learning_rate: 1e-3,
            l2_penalty: 1e-4,
            batch_size: 256,
            max_epochs: 30,
            validation_fraction: 0.2,
            patience: 10,
            tolerance: 1e-4,
            test_fraction: 0.2,
        }
    }
}

/// Simulator risk level cut points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    pub medium_from: f64,
    pub high_from: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            medium_from: 0.10,
            high_from: 0.30,
        }
    }
}

/// Dashboard four-band display cut points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayBands {
    pub low_from: f64,
    pub medium_from: f64,
    pub high_from: f64,
}

impl Default for DisplayBands {
    fn default() -> Self {
        Self {
            low_from: 0.05,
            medium_from: 0.10,
            high_from: 0.15,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ordered feature list fed to the standardizer.
    pub features: Vec<String>,
    /// Cumulative explained-variance fraction the projection must retain.
    pub pca_variance_threshold: f64,
    /// Number of segments (K).
    pub clusters: usize,
    /// Segment label for each centroid index.
    pub segment_names: Vec<String>,
    pub kmeans: KMeansConfig,
    pub classifier: ClassifierConfig,
    /// PD must be strictly below this for interest reduction.
    pub pd_threshold: f64,
    /// OD utilisation must be strictly above this for interest reduction.
    pub od_util_threshold: f64,
    pub risk_bands: RiskBands,
    pub display_bands: DisplayBands,
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: reference_features(),
            pca_variance_threshold: 0.95,
            clusters: 4,
            segment_names: vec![
                "Stable".to_string(),
                "Growing".to_string(),
                "Liquidity Stressed".to_string(),
                "High Risk".to_string(),
            ],
            kmeans: KMeansConfig::default(),
            classifier: ClassifierConfig::default(),
            pd_threshold: 0.15,
            od_util_threshold: 0.70,
            risk_bands: RiskBands::default(),
            display_bands: DisplayBands::default(),
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Resolve the effective configuration from defaults, an optional JSON
    /// file and the process environment.
    ///
    /// Without an explicit path, the file named by `ODRISK_CONFIG` is used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = path.or(from_env.as_deref());
        Self::resolve(path, |key| std::env::var(key).ok())
    }

    /// Like [`PipelineConfig::load`] with an explicit variable lookup.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ScoringError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| ScoringError::format(path, e))
    }

    /// Apply `ODRISK_*` overrides found through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ODRISK_FEATURES") {
            self.features = parse_list(&value);
        }
        if let Some(value) = lookup("ODRISK_PCA_VARIANCE") {
            self.pca_variance_threshold = parse_value("ODRISK_PCA_VARIANCE", &value)?;
        }
        if let Some(value) = lookup("ODRISK_CLUSTERS") {
            self.clusters = parse_value("ODRISK_CLUSTERS", &value)?;
        }
        if let Some(value) = lookup("ODRISK_SEGMENT_NAMES") {
            self.segment_names = parse_list(&value);
        }
        if let Some(value) = lookup("ODRISK_HIDDEN_LAYERS") {
            self.classifier.hidden_layers = parse_list(&value)
                .iter()
                .map(|width| parse_value("ODRISK_HIDDEN_LAYERS", width))
                .collect::<Result<Vec<usize>>>()?;
        }
        if let Some(value) = lookup("ODRISK_MAX_EPOCHS") {
            self.classifier.max_epochs = parse_value("ODRISK_MAX_EPOCHS", &value)?;
        }
        if let Some(value) = lookup("ODRISK_PD_THRESHOLD") {
            self.pd_threshold = parse_value("ODRISK_PD_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("ODRISK_OD_UTIL_THRESHOLD") {
            self.od_util_threshold = parse_value("ODRISK_OD_UTIL_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("ODRISK_SEED") {
            self.seed = parse_value("ODRISK_SEED", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        FeatureSchema::new(&self.features)?;

        if !(self.pca_variance_threshold > 0.0 && self.pca_variance_threshold <= 1.0) {
            return invalid(format!(
                "pca_variance_threshold must be in (0, 1], got {}",
                self.pca_variance_threshold
            ));
        }
        if self.clusters == 0 {
            return invalid("clusters must be at least 1".to_string());
        }
        if self.segment_names.len() != self.clusters {
            return invalid(format!(
                "{} segment name(s) given for {} cluster(s)",
                self.segment_names.len(),
                self.clusters
            ));
        }
        if self.kmeans.restarts == 0 || self.kmeans.max_iterations == 0 {
            return invalid("k-means restarts and max_iterations must be positive".to_string());
        }
        if !(self.kmeans.tolerance > 0.0) {
            return invalid(format!(
                "k-means tolerance must be positive, got {}",
                self.kmeans.tolerance
            ));
        }

        let classifier = &self.classifier;
        if classifier.hidden_layers.is_empty() || classifier.hidden_layers.contains(&0) {
            return invalid("hidden_layers must list at least one positive width".to_string());
        }
        if classifier.batch_size == 0 || classifier.max_epochs == 0 {
            return invalid("batch_size and max_epochs must be positive".to_string());
        }
        if !(classifier.learning_rate > 0.0) || classifier.l2_penalty < 0.0 {
            return invalid("learning_rate must be positive and l2_penalty non-negative".to_string());
        }
        for (name, fraction) in [
            ("validation_fraction", classifier.validation_fraction),
            ("test_fraction", classifier.test_fraction),
        ] {
            if !(0.0..1.0).contains(&fraction) {
                return invalid(format!("{} must be in [0, 1), got {}", name, fraction));
            }
        }

        for (name, threshold) in [
            ("pd_threshold", self.pd_threshold),
            ("od_util_threshold", self.od_util_threshold),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return invalid(format!("{} must be in [0, 1], got {}", name, threshold));
            }
        }

        if self.risk_bands.medium_from > self.risk_bands.high_from {
            return invalid("risk_bands must be ascending".to_string());
        }
        let display = &self.display_bands;
        if display.low_from > display.medium_from || display.medium_from > display.high_from {
            return invalid("display_bands must be ascending".to_string());
        }

        Ok(())
    }
}

fn invalid(message: String) -> Result<()> {
    Err(ScoringError::InvalidConfig(message))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ScoringError::InvalidConfig(format!("{}='{}' is not a valid value", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_is_reference_configuration() {
        let config = PipelineConfig::default();
        assert_eq!(config.features.len(), 18);
        assert_eq!(config.pca_variance_threshold, 0.95);
        assert_eq!(config.clusters, 4);
        assert_eq!(config.segment_names[2], "Liquidity Stressed");
        assert_eq!(config.classifier.hidden_layers, vec![256, 128, 64]);
        assert_eq!(config.pd_threshold, 0.15);
        assert_eq!(config.od_util_threshold, 0.70);
        assert_eq!(config.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides() {
        let lookup = lookup_from(&[
            ("ODRISK_PCA_VARIANCE", "0.9"),
            ("ODRISK_CLUSTERS", "3"),
            ("ODRISK_SEGMENT_NAMES", "Low, Mid, High"),
            ("ODRISK_HIDDEN_LAYERS", "32,16"),
            ("ODRISK_PD_THRESHOLD", "0.2"),
        ]);
        let config = PipelineConfig::resolve(None, lookup).unwrap();

        assert_eq!(config.pca_variance_threshold, 0.9);
        assert_eq!(config.clusters, 3);
        assert_eq!(config.segment_names, vec!["Low", "Mid", "High"]);
        assert_eq!(config.classifier.hidden_layers, vec![32, 16]);
        assert_eq!(config.pd_threshold, 0.2);
    }

    #[test]
    fn test_unparseable_override_is_rejected() {
        let lookup = lookup_from(&[("ODRISK_CLUSTERS", "four")]);
        let err = PipelineConfig::resolve(None, lookup).unwrap_err();
        assert!(err.to_string().contains("ODRISK_CLUSTERS"));
    }

    #[test]
    fn test_segment_names_must_match_cluster_count() {
        let lookup = lookup_from(&[("ODRISK_CLUSTERS", "5")]);
        assert!(PipelineConfig::resolve(None, lookup).is_err());
    }

    #[test]
    fn test_variance_threshold_bounds() {
        let mut config = PipelineConfig::default();
        config.pca_variance_threshold = 0.0;
        assert!(config.validate().is_err());
        config.pca_variance_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"clusters": 2, "segment_names": ["A", "B"]}"#).unwrap();
        assert_eq!(config.clusters, 2);
        assert_eq!(config.features.len(), 18);
        assert_eq!(config.classifier.max_epochs, 30);
        assert!(config.validate().is_ok());
    }
}
