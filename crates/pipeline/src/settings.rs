//! Pipeline Configuration

use config::{Config, ConfigError, Environment, File};
use feature_engine::FeatureConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tabular::PgSettings;
use tracing::debug;

/// Regressor used by `evaluate` and `submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Training mean per target
    Mean,
    /// Ridge regression on numeric features
    Ridge,
}

/// Evaluation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Number of cross-validation folds
    pub folds: usize,
    pub model: ModelKind,
    /// Ridge regularisation strength
    pub alpha: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            model: ModelKind::Ridge,
            alpha: 1.0,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for feature tables, schema and submissions
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/output"),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: PgSettings,
    pub features: FeatureConfig,
    pub evaluation: EvaluationConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load from an optional TOML file, then `MELT__*` environment
    /// variables, then `POSTGRES_USER` / `POSTGRES_PASSWORD`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        }
        let mut config: PipelineConfig = builder
            .add_source(
                Environment::with_prefix("MELT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_credentials(
            std::env::var("POSTGRES_USER").ok(),
            std::env::var("POSTGRES_PASSWORD").ok(),
        );
        Ok(config)
    }

    /// Override database credentials when given
    pub fn apply_credentials(&mut self, user: Option<String>, password: Option<String>) {
        if let Some(user) = user {
            self.database.user = user;
        }
        if let Some(password) = password {
            self.database.password = password;
        }
    }
}
