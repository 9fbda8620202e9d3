//! Analytics facade - one recomputation pass from raw text to snapshot
//!
//! `compute_snapshot` is the pure pipeline. `AnalyticsFacade` owns the
//! configuration, the injected scoring strategies and the current snapshot,
//! and only replaces that snapshot when an ingestion succeeds.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::advice::{advise, Advice, SnapshotParts};
use crate::aggregate::{aggregate, category_breakdown, category_series, income_sources, IncomeSource};
use crate::anomaly::{AnomalyDetector, AnomalyReport, AnomalyScorer, DeviationScorer};
use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::forecast::{category_trends, CategoryForecast, CategoryTrend, ExpenseForecast, Forecaster};
use crate::ingest::ingest_csv;
use crate::metrics::{Metrics, MetricsEngine};
use crate::models::{CategoryBreakdown, MonthlySummary, PeriodRange, RowError};
use crate::risk::{assess, default_rules, RiskAssessment, RiskContext, RiskRule};
use crate::seed::SEED_CSV;

/// Where a snapshot's transactions came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Seed,
    Ingested,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Seed => "seed",
            SnapshotSource::Ingested => "ingested",
        }
    }
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stale until the first successful ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacadeState {
    Stale,
    Ready,
}

/// Whole-history cash-flow totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub income: Decimal,
    pub expenses: Decimal,
    pub savings: Decimal,
}

/// Everything the presentation layer renders, computed in one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub source: SnapshotSource,
    /// SHA-256 hex of the raw input text
    pub source_digest: String,
    pub transaction_count: usize,
    pub skipped_row_count: usize,
    pub row_errors: Vec<RowError>,
    /// Periods the windowed figures cover; None means the full history
    pub window: Option<PeriodRange>,
    /// Every observed month, chronological
    pub months: Vec<MonthlySummary>,
    pub totals: Totals,
    pub categories: Vec<CategoryBreakdown>,
    pub income_sources: Vec<IncomeSource>,
    pub metrics: Metrics,
    pub risk: RiskAssessment,
    pub anomalies: AnomalyReport,
    pub forecast: Option<ExpenseForecast>,
    pub category_forecasts: Vec<CategoryForecast>,
    pub category_trends: Vec<CategoryTrend>,
    pub advice: Vec<Advice>,
    /// Reasons for any value that could not be computed
    pub warnings: Vec<String>,
}

/// Run the full pipeline over `raw`
///
/// Identical inputs always produce identical snapshots. Fails only when the
/// text holds no usable rows.
pub fn compute_snapshot(
    config: &AnalyticsConfig,
    scorer: &dyn AnomalyScorer,
    rules: &[Box<dyn RiskRule>],
    raw: &str,
    source: SnapshotSource,
) -> Result<AnalyticsSnapshot> {
    let started = Instant::now();

    let report = ingest_csv(raw)?;
    let transactions = &report.transactions;

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let source_digest = hex::encode(hasher.finalize());

    let mut warnings = Vec::new();
    if report.skipped_row_count > 0 {
        warnings.push(format!(
            "{} malformed row(s) skipped",
            report.skipped_row_count
        ));
    }

    let aggregation = aggregate(transactions);
    let window = aggregation.window(config.metrics.window_months);
    let windowed = aggregation.within(window);

    let categories = category_breakdown(transactions, window);
    let sources = income_sources(transactions, window);

    let (metrics, metric_warnings) =
        MetricsEngine::new(&config.metrics).compute(windowed, &categories, &sources);
    warnings.extend(metric_warnings);

    let risk = assess(
        rules,
        &RiskContext {
            months: windowed,
            metrics: &metrics,
            categories: &categories,
            income_sources: &sources,
            config: &config.risk,
        },
    );

    for factor in risk.unrated() {
        warnings.push(format!(
            "{} not scored ({}); risk score uses the remaining factors",
            factor.name, factor.detail
        ));
    }

    let anomalies = AnomalyDetector::new(&config.anomaly, scorer).detect(transactions, window);

    // Forecasts always see the full history
    let forecaster = Forecaster::new(config.forecast.clone());
    let forecast = match forecaster.forecast(&aggregation.months) {
        Ok((forecast, forecast_warnings)) => {
            warnings.extend(forecast_warnings);
            Some(forecast)
        }
        Err(reason) => {
            warnings.push(reason.to_string());
            None
        }
    };

    let periods = aggregation.periods();
    let series = category_series(transactions, &periods);
    let category_forecasts = forecaster
        .category_forecasts(&series, periods.len())
        .unwrap_or_else(|reason| {
            warnings.push(reason.to_string());
            Vec::new()
        });
    let category_trends = category_trends(&series);

    let advice = advise(&SnapshotParts {
        metrics: &metrics,
        categories: &categories,
        risk: &risk,
        anomalies: &anomalies,
        forecast: forecast.as_ref(),
    });

    info!(
        source = %source,
        transactions = transactions.len(),
        skipped = report.skipped_row_count,
        months = aggregation.months.len(),
        risk = risk.score,
        anomalies = anomalies.anomaly_count,
        warnings = warnings.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Computed analytics snapshot"
    );

    Ok(AnalyticsSnapshot {
        source,
        source_digest,
        transaction_count: transactions.len(),
        skipped_row_count: report.skipped_row_count,
        row_errors: report.errors,
        window,
        totals: Totals {
            income: aggregation.total_income(),
            expenses: aggregation.total_expenses(),
            savings: aggregation.total_savings(),
        },
        months: aggregation.months,
        categories,
        income_sources: sources,
        metrics,
        risk,
        anomalies,
        forecast,
        category_forecasts,
        category_trends,
        advice,
        warnings,
    })
}

/// Owns configuration and strategies, and hands out the current snapshot
pub struct AnalyticsFacade {
    config: AnalyticsConfig,
    scorer: Box<dyn AnomalyScorer>,
    rules: Vec<Box<dyn RiskRule>>,
    /// Raw text behind the current snapshot, kept so strategy changes recompute it
    input: String,
    snapshot: Arc<AnalyticsSnapshot>,
    state: FacadeState,
}

impl AnalyticsFacade {
    /// Validate `config` and compute the built-in seed snapshot
    pub fn new(config: AnalyticsConfig) -> Result<Self> {
        Self::with_seed(config, SEED_CSV)
    }

    /// Like `new`, with a caller-supplied seed dataset
    pub fn with_seed(config: AnalyticsConfig, seed_csv: impl Into<String>) -> Result<Self> {
        config.validate()?;

        let input = seed_csv.into();
        let scorer: Box<dyn AnomalyScorer> =
            Box::new(DeviationScorer::new(config.anomaly.deviation_cutoff));
        let rules = default_rules();
        let snapshot = compute_snapshot(&config, scorer.as_ref(), &rules, &input, SnapshotSource::Seed)?;

        Ok(Self {
            config,
            scorer,
            rules,
            input,
            snapshot: Arc::new(snapshot),
            state: FacadeState::Stale,
        })
    }

    /// Swap the anomaly scoring strategy and recompute the current snapshot
    pub fn with_scorer(mut self, scorer: Box<dyn AnomalyScorer>) -> Result<Self> {
        self.scorer = scorer;
        self.recompute()?;
        Ok(self)
    }

    /// Swap the risk rule set and recompute the current snapshot
    pub fn with_rules(mut self, rules: Vec<Box<dyn RiskRule>>) -> Result<Self> {
        self.rules = rules;
        self.recompute()?;
        Ok(self)
    }

    /// Replace the snapshot with one computed from `raw`
    ///
    /// On error the current snapshot and state are left untouched.
    pub fn ingest(&mut self, raw: &str) -> Result<Arc<AnalyticsSnapshot>> {
        let snapshot = compute_snapshot(
            &self.config,
            self.scorer.as_ref(),
            &self.rules,
            raw,
            SnapshotSource::Ingested,
        )
        .inspect_err(|e| warn!(error = %e, "Ingestion rejected, keeping current snapshot"))?;

        self.input = raw.to_string();
        self.snapshot = Arc::new(snapshot);
        self.state = FacadeState::Ready;
        Ok(Arc::clone(&self.snapshot))
    }

    pub fn current_snapshot(&self) -> Arc<AnalyticsSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn state(&self) -> FacadeState {
        self.state
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    fn recompute(&mut self) -> Result<()> {
        let source = match self.state {
            FacadeState::Stale => SnapshotSource::Seed,
            FacadeState::Ready => SnapshotSource::Ingested,
        };
        let snapshot = compute_snapshot(
            &self.config,
            self.scorer.as_ref(),
            &self.rules,
            &self.input,
            source,
        )?;
        self.snapshot = Arc::new(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::Baseline;
    use crate::error::Error;
    use crate::risk::{RiskFactor, SavingsRateRule};
    use rust_decimal_macros::dec;

    const SMALL: &str = "date,description,amount,category\n\
        2024-01-03,Salary,4000,Income\n\
        2024-01-05,Rent,-1500,Housing\n\
        2024-02-03,Salary,4000,Income\n\
        2024-02-05,Rent,-1500,Housing\n\
        2024-02-09,Groceries,-300,Groceries\n";

    struct NeverAnomalous;

    impl AnomalyScorer for NeverAnomalous {
        fn name(&self) -> &'static str {
            "never"
        }

        fn score(&self, _magnitude: f64, _baseline: &Baseline) -> f64 {
            0.5
        }
    }

    struct Perfect;

    impl RiskRule for Perfect {
        fn key(&self) -> &'static str {
            "savings_rate"
        }

        fn name(&self) -> &'static str {
            "Perfect"
        }

        fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor {
            ctx.factor(self, 100, "always healthy".to_string())
        }
    }

    #[test]
    fn test_new_starts_stale_with_seed_snapshot() {
        let facade = AnalyticsFacade::new(AnalyticsConfig::default()).unwrap();
        assert_eq!(facade.state(), FacadeState::Stale);

        let snapshot = facade.current_snapshot();
        assert_eq!(snapshot.source, SnapshotSource::Seed);
        assert_eq!(snapshot.months.len(), 5);
        assert_eq!(snapshot.skipped_row_count, 0);
        assert_eq!(snapshot.source_digest.len(), 64);
        assert!(snapshot.forecast.is_some());
        assert!(!snapshot.advice.is_empty());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = AnalyticsConfig::default();
        config.forecast.horizon = 0;
        let err = AnalyticsFacade::new(config).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_ingest_moves_to_ready() {
        let mut facade = AnalyticsFacade::new(AnalyticsConfig::default()).unwrap();
        let snapshot = facade.ingest(SMALL).unwrap();

        assert_eq!(facade.state(), FacadeState::Ready);
        assert_eq!(snapshot.source, SnapshotSource::Ingested);
        assert_eq!(snapshot.transaction_count, 5);
        assert_eq!(snapshot.totals.savings, dec!(4700));
        assert!(Arc::ptr_eq(&snapshot, &facade.current_snapshot()));
    }

    #[test]
    fn test_failed_ingest_keeps_snapshot() {
        let mut facade = AnalyticsFacade::new(AnalyticsConfig::default()).unwrap();
        let before = facade.current_snapshot();

        assert!(facade.ingest("").is_err());
        assert!(facade.ingest("date,description,amount\n").is_err());

        assert_eq!(facade.state(), FacadeState::Stale);
        assert!(Arc::ptr_eq(&before, &facade.current_snapshot()));
    }

    #[test]
    fn test_short_history_degrades_to_warnings() {
        let raw = "date,description,amount\n2024-01-03,Salary,4000\n2024-01-05,Rent,-1500\n";
        let config = AnalyticsConfig::default();
        let snapshot =
            compute_snapshot(&config, &DeviationScorer::default(), &default_rules(), raw, SnapshotSource::Ingested)
                .unwrap();

        assert!(snapshot.forecast.is_none());
        assert!(snapshot.category_forecasts.is_empty());
        assert_eq!(snapshot.metrics.increasing, None);
        assert!(snapshot
            .warnings
            .iter()
            .any(|w| w.contains("need at least 2 months")));
    }

    #[test]
    fn test_window_limits_reporting_but_not_forecast() {
        let mut config = AnalyticsConfig::default();
        config.metrics.window_months = Some(2);
        let snapshot = compute_snapshot(
            &config,
            &DeviationScorer::default(),
            &default_rules(),
            SEED_CSV,
            SnapshotSource::Seed,
        )
        .unwrap();

        assert_eq!(snapshot.metrics.period_count, 2);
        assert_eq!(snapshot.months.len(), 5);
        assert_eq!(snapshot.forecast.as_ref().unwrap().observations, 5);
        let window = snapshot.window.unwrap();
        assert_eq!(window.start.to_string(), "2024-04");
        assert_eq!(window.end.to_string(), "2024-05");
    }

    #[test]
    fn test_with_scorer_recomputes() {
        let facade = AnalyticsFacade::new(AnalyticsConfig::default())
            .unwrap()
            .with_scorer(Box::new(NeverAnomalous))
            .unwrap();
        let snapshot = facade.current_snapshot();
        assert_eq!(snapshot.anomalies.scorer, "never");
        assert_eq!(snapshot.anomalies.anomaly_count, 0);
        assert_eq!(snapshot.source, SnapshotSource::Seed);
    }

    #[test]
    fn test_with_rules_recomputes() {
        let mut facade = AnalyticsFacade::new(AnalyticsConfig::default())
            .unwrap()
            .with_rules(vec![Box::new(Perfect), Box::new(SavingsRateRule)])
            .unwrap();
        facade.ingest(SMALL).unwrap();

        let risk = &facade.current_snapshot().risk;
        assert_eq!(risk.factors.len(), 2);
        assert_eq!(risk.factors[0].detail, "always healthy");
    }
}
