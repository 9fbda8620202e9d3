//! Analytics configuration
//!
//! Everything the pipeline treats as a tunable constant lives here: anomaly
//! thresholds, forecast horizon and interval parameters, risk weights and
//! status bands, and the reporting window.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a layered resolution:
//! 1. An explicit path, when one is given
//! 2. Override in data dir (~/.local/share/finsight/config.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! Validation runs on every load, so an invalid file fails before any
//! ingestion happens.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Risk factor keys that may carry a weight
pub const RISK_FACTOR_KEYS: [&str; 6] = [
    "savings_rate",
    "stability",
    "housing_cost",
    "emergency_fund",
    "debt_load",
    "income_diversity",
];

/// Allowed drift when checking that weights sum to 1.0
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Longest supported forecast horizon, in months
pub const MAX_FORECAST_HORIZON: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub anomaly: AnomalyConfig,
    pub forecast: ForecastConfig,
    pub risk: RiskConfig,
    pub metrics: MetricsConfig,
}

/// Anomaly detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Absolute amount above which a transaction is surfaced for alerting
    pub amount_threshold: f64,
    /// Score below which a transaction is an anomaly (more negative = more unusual)
    pub score_threshold: f64,
    /// Minimum transactions for a category-local baseline
    pub min_category_samples: usize,
    /// Standard deviations above the mean where the score crosses zero
    pub deviation_cutoff: f64,
    /// Number of flags surfaced as alerts
    pub top_n: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            amount_threshold: 500.0,
            score_threshold: -0.04,
            min_category_samples: 2,
            deviation_cutoff: 2.0,
            top_n: 5,
        }
    }
}

/// Expense forecast parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Periods to project past the last observed month
    pub horizon: u32,
    /// Relative half-width of the interval when residuals are unusable
    pub fallback_margin: f64,
    /// Multiplier applied to the residual standard error
    pub z_multiplier: f64,
    /// Confidence reported for residual-based intervals
    pub confidence_level: f64,
    /// Slope (per month) below which the trend is "stable"
    pub trend_tolerance: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 1,
            fallback_margin: 0.15,
            z_multiplier: 1.96,
            confidence_level: 0.95,
            trend_tolerance: 20.0,
        }
    }
}

/// Composite risk scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: BTreeMap<String, f64>,
    pub bands: StatusBands,
    pub levels: RiskLevels,
    /// Savings ratio (percent) that earns a GOOD savings factor
    pub savings_target_pct: f64,
    /// Housing share of expenses (percent) considered healthy
    pub housing_guideline_pct: f64,
    /// Debt share of expenses (percent) considered healthy
    pub debt_guideline_pct: f64,
    /// Months of expenses a full emergency fund covers
    pub emergency_target_months: f64,
    pub housing_categories: Vec<String>,
    pub debt_categories: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let weights = [
            ("savings_rate", 0.25),
            ("stability", 0.2),
            ("housing_cost", 0.2),
            ("emergency_fund", 0.2),
            ("debt_load", 0.1),
            ("income_diversity", 0.05),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            weights,
            bands: StatusBands::default(),
            levels: RiskLevels::default(),
            savings_target_pct: 20.0,
            housing_guideline_pct: 30.0,
            debt_guideline_pct: 15.0,
            emergency_target_months: 6.0,
            housing_categories: vec!["Housing".to_string()],
            debt_categories: vec![
                "Debt".to_string(),
                "Loan".to_string(),
                "Credit Card".to_string(),
                "Interest".to_string(),
            ],
        }
    }
}

impl RiskConfig {
    pub fn weight(&self, key: &str) -> f64 {
        self.weights.get(key).copied().unwrap_or(0.0)
    }
}

/// Lower bounds of the factor status bands (score >= bound)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBands {
    pub good: u8,
    pub ok: u8,
    pub warn: u8,
}

impl Default for StatusBands {
    fn default() -> Self {
        Self {
            good: 70,
            ok: 55,
            warn: 40,
        }
    }
}

/// Lower bounds of the composite risk levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLevels {
    pub moderate: u8,
    pub high: u8,
}

impl Default for RiskLevels {
    fn default() -> Self {
        Self {
            moderate: 35,
            high: 60,
        }
    }
}

/// Derived metric parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// A month above mean + k * stddev counts as high variance
    pub variance_k: f64,
    /// Restrict metrics and breakdowns to the last N observed months
    pub window_months: Option<u32>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            variance_k: 1.0,
            window_months: None,
        }
    }
}

impl AnalyticsConfig {
    /// Load the effective configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            info!("Loading analytics config from {}", path.display());
            let content = fs::read_to_string(path)?;
            return Self::from_toml(&content);
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading analytics config override from {}", path.display());
                let content = fs::read_to_string(&path)?;
                return Self::from_toml(&content);
            }
        }

        debug!("Using embedded analytics config");
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AnalyticsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every constraint; the first violation wins
    pub fn validate(&self) -> Result<()> {
        let a = &self.anomaly;
        if !(a.amount_threshold.is_finite() && a.amount_threshold > 0.0) {
            return Err(config_error(format!(
                "anomaly.amount_threshold must be positive, got {}",
                a.amount_threshold
            )));
        }
        if !(a.score_threshold > -0.5 && a.score_threshold < 0.5) {
            return Err(config_error(format!(
                "anomaly.score_threshold must be within (-0.5, 0.5), got {}",
                a.score_threshold
            )));
        }
        if a.min_category_samples < 2 {
            return Err(config_error(format!(
                "anomaly.min_category_samples must be at least 2, got {}",
                a.min_category_samples
            )));
        }
        if !(a.deviation_cutoff.is_finite() && a.deviation_cutoff > 0.0) {
            return Err(config_error(format!(
                "anomaly.deviation_cutoff must be positive, got {}",
                a.deviation_cutoff
            )));
        }
        if a.top_n == 0 {
            return Err(config_error("anomaly.top_n must be at least 1"));
        }

        let f = &self.forecast;
        if f.horizon == 0 || f.horizon > MAX_FORECAST_HORIZON {
            return Err(config_error(format!(
                "forecast.horizon must be between 1 and {}, got {}",
                MAX_FORECAST_HORIZON, f.horizon
            )));
        }
        if !(f.fallback_margin > 0.0 && f.fallback_margin < 1.0) {
            return Err(config_error(format!(
                "forecast.fallback_margin must be within (0, 1), got {}",
                f.fallback_margin
            )));
        }
        if !(f.z_multiplier.is_finite() && f.z_multiplier > 0.0) {
            return Err(config_error(format!(
                "forecast.z_multiplier must be positive, got {}",
                f.z_multiplier
            )));
        }
        if !(f.confidence_level > 0.0 && f.confidence_level < 1.0) {
            return Err(config_error(format!(
                "forecast.confidence_level must be within (0, 1), got {}",
                f.confidence_level
            )));
        }
        if !(f.trend_tolerance.is_finite() && f.trend_tolerance >= 0.0) {
            return Err(config_error(format!(
                "forecast.trend_tolerance must be non-negative, got {}",
                f.trend_tolerance
            )));
        }

        self.validate_risk()?;

        let m = &self.metrics;
        if !(m.variance_k.is_finite() && m.variance_k > 0.0) {
            return Err(config_error(format!(
                "metrics.variance_k must be positive, got {}",
                m.variance_k
            )));
        }
        if m.window_months == Some(0) {
            return Err(config_error("metrics.window_months must be at least 1"));
        }

        Ok(())
    }

    fn validate_risk(&self) -> Result<()> {
        let r = &self.risk;

        for (key, weight) in &r.weights {
            if !RISK_FACTOR_KEYS.contains(&key.as_str()) {
                return Err(config_error(format!(
                    "risk.weights has unknown factor '{}' (expected one of: {})",
                    key,
                    RISK_FACTOR_KEYS.join(", ")
                )));
            }
            if !(0.0..=1.0).contains(weight) {
                return Err(config_error(format!(
                    "risk.weights.{} must be within [0, 1], got {}",
                    key, weight
                )));
            }
        }
        let sum: f64 = r.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(config_error(format!(
                "risk.weights must sum to 1.0, got {:.6}",
                sum
            )));
        }

        let b = r.bands;
        if !(b.good <= 100 && b.good > b.ok && b.ok > b.warn) {
            return Err(config_error(format!(
                "risk.bands must satisfy 100 >= good > ok > warn, got good={} ok={} warn={}",
                b.good, b.ok, b.warn
            )));
        }

        let l = r.levels;
        if !(l.high <= 100 && l.high > l.moderate) {
            return Err(config_error(format!(
                "risk.levels must satisfy 100 >= high > moderate, got high={} moderate={}",
                l.high, l.moderate
            )));
        }

        for (name, value) in [
            ("savings_target_pct", r.savings_target_pct),
            ("housing_guideline_pct", r.housing_guideline_pct),
            ("debt_guideline_pct", r.debt_guideline_pct),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(config_error(format!(
                    "risk.{} must be within (0, 100], got {}",
                    name, value
                )));
            }
        }
        if !(r.emergency_target_months.is_finite() && r.emergency_target_months > 0.0) {
            return Err(config_error(format!(
                "risk.emergency_target_months must be positive, got {}",
                r.emergency_target_months
            )));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Configuration(message.into())
}

/// Get the default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("finsight").join("config.toml"))
}
