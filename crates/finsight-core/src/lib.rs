//! Finsight Core Library
//!
//! The transaction analytics pipeline behind the Finsight dashboard:
//! - CSV ingestion into typed transactions, with per-row diagnostics
//! - Keyword categorization for rows without a category
//! - Monthly cash-flow aggregation and category breakdowns
//! - Savings, trend and stability metrics with a composite risk score
//! - Pluggable anomaly scoring and linear expense forecasting
//! - Advisory items derived from the computed figures
//! - A facade that turns raw text into an immutable snapshot

pub mod advice;
pub mod aggregate;
pub mod anomaly;
pub mod categorize;
pub mod config;
pub mod error;
pub mod facade;
pub mod forecast;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod risk;
pub mod seed;
pub mod stats;

pub use advice::{Advice, AdviceLevel};
pub use anomaly::{AnomalyFlag, AnomalyReport, AnomalyScorer, Baseline, BaselineScope, DeviationScorer};
pub use config::AnalyticsConfig;
pub use error::{Degraded, Error, Result};
pub use facade::{compute_snapshot, AnalyticsFacade, AnalyticsSnapshot, FacadeState, SnapshotSource};
pub use forecast::{ExpenseForecast, ForecastPoint, TrendDirection};
pub use ingest::{ingest_csv, IngestReport};
pub use metrics::Metrics;
pub use models::*;
pub use risk::{FactorStatus, RiskAssessment, RiskContext, RiskFactor, RiskLevel, RiskRule};
