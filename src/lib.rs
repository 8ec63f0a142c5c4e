// Library interface for HealthTrend modules
// This allows integration tests and the CLI to access the engine

pub mod analysis;
pub mod anomaly;
pub mod config;
pub mod correlation;
pub mod error;
pub mod export;
pub mod flare;
pub mod forecast;
pub mod import;
pub mod logging;
pub mod models;
pub mod series;
pub mod stats;
pub mod trend;

// Re-export commonly used types for convenience
pub use models::*;
pub use analysis::{
    AnalysisOrchestrator, AnalysisProvider, AnalysisResult, HealthAnalyzer, MetricForecast,
};
pub use anomaly::{AnomalyDetector, AnomalyFinding, AnomalyKind};
pub use config::AnalysisConfig;
pub use correlation::{CorrelationCluster, CorrelationEngine, CorrelationMatrix};
pub use flare::{FlareRiskAssessment, FlareRiskScorer, RiskLevel};
pub use forecast::{Forecaster, MetricContext, Prediction};
pub use series::{MetricSeries, MetricSeriesExtractor};
pub use trend::{ModelType, TrendModel, TrendModelFitter};
pub use error::{HealthTrendError, ImportError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat};
