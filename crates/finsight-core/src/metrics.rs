//! Derived cash-flow metrics
//!
//! Savings ratio, the directional expense trend, spending stability and the
//! category headline. Anything that cannot be computed from the data comes
//! back as `None` with a warning instead of an error or a fake zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::IncomeSource;
use crate::config::MetricsConfig;
use crate::error::Degraded;
use crate::forecast::LinearFit;
use crate::models::{CategoryBreakdown, MonthlySummary, Period};
use crate::stats::{mean, round2, sample_std_dev, to_f64};

/// A month whose spending is well above the typical month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighVarianceMonth {
    pub period: Period,
    pub expenses: Decimal,
    pub threshold: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stability {
    /// Sample stddev / mean of monthly expenses
    pub coefficient_of_variation: Option<f64>,
    pub std_dev: Option<f64>,
    pub high_variance_months: Vec<HighVarianceMonth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub period_count: usize,
    pub average_income: f64,
    pub average_expenses: f64,
    pub average_savings: f64,
    /// Percent of income kept; None when no income was recorded
    pub savings_ratio: Option<f64>,
    /// Whether the latest month beat the trend of the months before it
    pub increasing: Option<bool>,
    pub stability: Stability,
    pub top_category: Option<String>,
    pub top_category_share: Option<f64>,
    pub income_source_count: usize,
}

pub struct MetricsEngine<'a> {
    config: &'a MetricsConfig,
}

impl<'a> MetricsEngine<'a> {
    pub fn new(config: &'a MetricsConfig) -> Self {
        Self { config }
    }

    /// Compute metrics over the reporting window
    pub fn compute(
        &self,
        months: &[MonthlySummary],
        categories: &[CategoryBreakdown],
        income_sources: &[IncomeSource],
    ) -> (Metrics, Vec<String>) {
        let mut warnings = Vec::new();

        let savings_ratio = savings_ratio(months)
            .map_err(|e| warnings.push(e.to_string()))
            .ok();
        let increasing = expense_trend(months)
            .map_err(|e| warnings.push(e.to_string()))
            .ok();

        let income: Vec<f64> = months.iter().map(|m| to_f64(m.income)).collect();
        let expenses: Vec<f64> = months.iter().map(|m| to_f64(m.expenses)).collect();
        let savings: Vec<f64> = months.iter().map(|m| to_f64(m.savings())).collect();

        let top = categories.first();

        let metrics = Metrics {
            period_count: months.len(),
            average_income: round2(mean(&income).unwrap_or(0.0)),
            average_expenses: round2(mean(&expenses).unwrap_or(0.0)),
            average_savings: round2(mean(&savings).unwrap_or(0.0)),
            savings_ratio,
            increasing,
            stability: stability(months, self.config.variance_k),
            top_category: top.map(|c| c.category.clone()),
            top_category_share: top.map(|c| c.percent_of_total),
            income_source_count: income_sources.len(),
        };
        (metrics, warnings)
    }
}

/// `avg(savings) / avg(income) * 100`
pub fn savings_ratio(months: &[MonthlySummary]) -> Result<f64, Degraded> {
    let income: Decimal = months.iter().map(|m| m.income).sum();
    if income.is_zero() {
        return Err(Degraded::DivisionUndefined(
            "savings ratio undefined: no income recorded".to_string(),
        ));
    }
    let savings: Decimal = months.iter().map(|m| m.savings()).sum();
    // Both averages share the same month count
    Ok(round2(to_f64(savings / income * Decimal::ONE_HUNDRED)))
}

/// Fit the months before the latest one and compare the latest against the
/// projected value
pub fn expense_trend(months: &[MonthlySummary]) -> Result<bool, Degraded> {
    let short_history =
        || Degraded::InsufficientHistory("expense trend needs at least 3 months of history".to_string());

    let (latest, prior) = months.split_last().ok_or_else(short_history)?;
    if prior.len() < 2 {
        return Err(short_history());
    }
    let values: Vec<f64> = prior.iter().map(|m| to_f64(m.expenses)).collect();
    let fit = LinearFit::fit(&values).ok_or_else(short_history)?;
    let projected = fit.predict(values.len() as f64);
    Ok(to_f64(latest.expenses) > projected)
}

/// Coefficient of variation and months above `mean + k * stddev`
pub fn stability(months: &[MonthlySummary], variance_k: f64) -> Stability {
    let expenses: Vec<f64> = months.iter().map(|m| to_f64(m.expenses)).collect();
    let avg = mean(&expenses);
    let std_dev = sample_std_dev(&expenses);

    let coefficient_of_variation = match (avg, std_dev) {
        (Some(m), Some(sd)) if m > 0.0 => Some(sd / m),
        _ => None,
    };

    let high_variance_months = match (avg, std_dev) {
        (Some(m), Some(sd)) if sd > 0.0 => {
            let threshold = m + variance_k * sd;
            months
                .iter()
                .filter(|month| to_f64(month.expenses) > threshold)
                .map(|month| {
                    let spent = to_f64(month.expenses);
                    HighVarianceMonth {
                        period: month.period,
                        expenses: month.expenses,
                        threshold: round2(threshold),
                        explanation: format!(
                            "{} spending of ${:.2} is {:.0}% above the ${:.2} monthly average",
                            month.period.long_label(),
                            spent,
                            (spent - m) / m * 100.0,
                            m
                        ),
                    }
                })
                .collect()
        }
        _ => Vec::new(),
    };

    Stability {
        coefficient_of_variation: coefficient_of_variation.map(|cv| (cv * 10_000.0).round() / 10_000.0),
        std_dev: std_dev.map(round2),
        high_variance_months,
    }
}
