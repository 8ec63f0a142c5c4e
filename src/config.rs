use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::anomaly::AnomalyConfig;
use crate::correlation::CorrelationConfig;
use crate::flare::FlareRiskConfig;
use crate::forecast::ForecastConfig;
use crate::trend::ModelSelectionConfig;

/// Analysis configuration
///
/// Injected into every analysis run; the engine keeps no process-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Condition the logs describe (e.g. "ankylosing spondylitis"), informational
    pub condition: Option<String>,

    /// Fan per-metric work out over the rayon thread pool
    pub parallel: bool,

    /// Trend model selection and status thresholds
    pub model_selection: ModelSelectionConfig,

    /// Forecast horizon and interval settings
    pub forecast: ForecastConfig,

    /// Correlation matrix and clustering settings
    pub correlation: CorrelationConfig,

    /// Flare-up risk scoring settings
    pub flare_risk: FlareRiskConfig,

    /// Anomaly rule thresholds
    pub anomaly: AnomalyConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            condition: None,
            parallel: true,
            model_selection: ModelSelectionConfig::default(),
            forecast: ForecastConfig::default(),
            correlation: CorrelationConfig::default(),
            flare_risk: FlareRiskConfig::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Check every section's thresholds
    pub fn validate(&self) -> crate::Result<()> {
        self.model_selection.validate()?;
        self.forecast.validate()?;
        self.correlation.validate()?;
        self.flare_risk.validate()?;
        self.anomaly.validate()?;
        Ok(())
    }

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AnalysisConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".healthtrend")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(path = %config_path.display(), error = %e, "Using default configuration");
                Self::default()
            }
        }
    }
}
