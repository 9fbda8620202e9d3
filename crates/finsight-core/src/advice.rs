//! Advisory report derived from the computed metrics
//!
//! Each rule reads finished analytics and emits at most one item. Items are
//! ordered by urgency, critical first; rule order breaks ties.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyReport;
use crate::forecast::{ExpenseForecast, TrendDirection};
use crate::metrics::Metrics;
use crate::models::CategoryBreakdown;
use crate::risk::{RiskAssessment, RiskLevel};
use crate::stats::to_f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceLevel {
    /// Requires immediate attention
    Critical,
    /// Worth addressing soon
    Warning,
    /// Healthy, keep going
    Good,
    /// General guidance
    Tip,
}

impl AdviceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceLevel::Critical => "critical",
            AdviceLevel::Warning => "warning",
            AdviceLevel::Good => "good",
            AdviceLevel::Tip => "tip",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            AdviceLevel::Critical => 4,
            AdviceLevel::Warning => 3,
            AdviceLevel::Good => 2,
            AdviceLevel::Tip => 1,
        }
    }
}

impl fmt::Display for AdviceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub level: AdviceLevel,
    pub topic: String,
    pub message: String,
    pub action: String,
}

impl Advice {
    fn new(level: AdviceLevel, topic: &str, message: String, action: &str) -> Self {
        Self {
            level,
            topic: topic.to_string(),
            message,
            action: action.to_string(),
        }
    }
}

/// The computed analytics the advisor reads
pub struct SnapshotParts<'a> {
    pub metrics: &'a Metrics,
    pub categories: &'a [CategoryBreakdown],
    pub risk: &'a RiskAssessment,
    pub anomalies: &'a AnomalyReport,
    pub forecast: Option<&'a ExpenseForecast>,
}

/// Build the prioritized advice list
pub fn advise(parts: &SnapshotParts<'_>) -> Vec<Advice> {
    let mut advice = vec![savings_advice(parts.metrics), risk_advice(parts.risk)];
    advice.extend(category_advice(parts.categories));
    advice.extend(anomaly_advice(parts.anomalies));
    advice.extend(parts.forecast.and_then(forecast_advice));
    advice.push(emergency_fund_advice(parts.metrics));

    // Stable sort keeps rule order within a level
    advice.sort_by(|a, b| b.level.priority().cmp(&a.level.priority()));
    advice
}

fn savings_advice(metrics: &Metrics) -> Advice {
    let Some(ratio) = metrics.savings_ratio else {
        return Advice::new(
            AdviceLevel::Warning,
            "Savings",
            "No income recorded, so a savings rate cannot be computed.".to_string(),
            "Include income transactions (positive amounts) in the file to track savings.",
        );
    };

    if ratio < 0.0 {
        Advice::new(
            AdviceLevel::Critical,
            "Savings",
            format!(
                "You are spending more than you earn. Average deficit: {}/month.",
                format_money(metrics.average_savings.abs())
            ),
            "Cut non-essential expenses now. Review subscriptions, dining and entertainment.",
        )
    } else if ratio < 10.0 {
        Advice::new(
            AdviceLevel::Warning,
            "Savings",
            format!(
                "Low savings rate of {:.1}%. Aim to save at least 20% of income.",
                ratio
            ),
            "Automate a transfer to savings on payday. Try the 50/30/20 rule.",
        )
    } else if ratio < 20.0 {
        Advice::new(
            AdviceLevel::Warning,
            "Savings",
            format!("Savings rate of {:.1}% is below the recommended 20%.", ratio),
            "Look for quick wins: cancel unused subscriptions and cook more often.",
        )
    } else {
        Advice::new(
            AdviceLevel::Good,
            "Savings",
            format!(
                "Excellent savings rate of {:.1}%. You save about {}/month on average.",
                ratio,
                format_money(metrics.average_savings)
            ),
            "Consider investing the surplus or raising retirement contributions.",
        )
    }
}

fn risk_advice(risk: &RiskAssessment) -> Advice {
    match risk.level {
        RiskLevel::High => Advice::new(
            AdviceLevel::Critical,
            "Risk",
            format!(
                "High financial risk score: {}/100. Your finances show signs of instability.",
                risk.score
            ),
            "Build a 3-6 month emergency fund and reduce discretionary spending.",
        ),
        RiskLevel::Moderate => Advice::new(
            AdviceLevel::Warning,
            "Risk",
            format!(
                "Moderate risk score: {}/100. Some factors need attention.",
                risk.score
            ),
            "Create a budget and track spending weekly to reduce volatility.",
        ),
        RiskLevel::Low => Advice::new(
            AdviceLevel::Good,
            "Risk",
            format!(
                "Low risk score: {}/100. Your spending is consistent and manageable.",
                risk.score
            ),
            "Maintain your discipline and review investments periodically.",
        ),
    }
}

fn category_advice(categories: &[CategoryBreakdown]) -> Option<Advice> {
    let top = categories.first()?;
    let pct = top.percent_of_total;

    let advice = match top.category.as_str() {
        "Housing" if pct > 35.0 => Advice::new(
            AdviceLevel::Warning,
            "Housing",
            format!(
                "Housing takes {:.1}% of your spending, above the recommended 30%.",
                pct
            ),
            "Explore refinancing, a roommate, or a smaller place.",
        ),
        "Dining" if pct > 15.0 => Advice::new(
            AdviceLevel::Warning,
            "Dining",
            format!("Dining out accounts for {:.1}% of your expenses.", pct),
            "Meal prep a few days per week and keep restaurant visits for weekends.",
        ),
        "Shopping" if pct > 20.0 => Advice::new(
            AdviceLevel::Warning,
            "Shopping",
            format!("Discretionary shopping is {:.1}% of spending.", pct),
            "Wait 48 hours before any non-essential purchase.",
        ),
        other => Advice {
            level: AdviceLevel::Tip,
            topic: other.to_string(),
            message: format!(
                "Your largest expense category is '{}' at {:.1}% of total spending.",
                other, pct
            ),
            action: format!(
                "Review {} spending regularly to make sure it matches your goals.",
                other
            ),
        },
    };
    Some(advice)
}

fn anomaly_advice(report: &AnomalyReport) -> Option<Advice> {
    if report.anomaly_count == 0 {
        return None;
    }
    let largest = report.largest_anomaly()?;
    Some(Advice::new(
        AdviceLevel::Warning,
        "Anomalies",
        format!(
            "Detected {} unusual transaction(s) totaling {}. Largest: '{}' ({}).",
            report.anomaly_count,
            format_money(to_f64(report.anomaly_total)),
            largest.transaction.description,
            format_money(to_f64(largest.transaction.amount.abs()))
        ),
        "Review these for errors, fraud or one-time costs, and set up bank alerts.",
    ))
}

fn forecast_advice(forecast: &ExpenseForecast) -> Option<Advice> {
    let next = forecast.next()?;
    let range = format!(
        "Predicted next month: {} (range {} to {}).",
        format_money(next.predicted),
        format_money(next.lower_bound),
        format_money(next.upper_bound)
    );

    let advice = match forecast.trend {
        TrendDirection::Increasing => Advice::new(
            AdviceLevel::Warning,
            "Forecast",
            format!("Spending trend is increasing. {}", range),
            "Set a monthly budget cap and find the categories driving the increase.",
        ),
        TrendDirection::Decreasing => Advice::new(
            AdviceLevel::Good,
            "Forecast",
            format!("Spending trend is decreasing. {}", range),
            "Redirect the difference to investments or faster debt repayment.",
        ),
        TrendDirection::Stable => Advice::new(
            AdviceLevel::Tip,
            "Forecast",
            format!("Spending is stable. {}", range),
            "Look for ways to actively reduce expenses and grow savings.",
        ),
    };
    Some(advice)
}

fn emergency_fund_advice(metrics: &Metrics) -> Advice {
    let avg = metrics.average_expenses;
    Advice {
        level: AdviceLevel::Tip,
        topic: "Emergency Fund".to_string(),
        message: "Keep 3-6 months of expenses in a liquid emergency fund.".to_string(),
        action: format!(
            "Target emergency fund size: {} to {} based on your average monthly expenses.",
            format_money(avg * 3.0),
            format_money(avg * 6.0)
        ),
    }
}

/// Format as dollars with thousands separators, e.g. "$1,234.56"
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Stability;
    use rust_decimal::Decimal;

    fn metrics(savings_ratio: Option<f64>) -> Metrics {
        Metrics {
            period_count: 3,
            average_income: 5000.0,
            average_expenses: 4000.0,
            average_savings: 1000.0,
            savings_ratio,
            increasing: None,
            stability: Stability {
                coefficient_of_variation: None,
                std_dev: None,
                high_variance_months: Vec::new(),
            },
            top_category: None,
            top_category_share: None,
            income_source_count: 1,
        }
    }

    fn risk(score: u8, level: RiskLevel) -> RiskAssessment {
        RiskAssessment {
            score,
            level,
            factors: Vec::new(),
        }
    }

    fn no_anomalies() -> AnomalyReport {
        AnomalyReport {
            scorer: "deviation".to_string(),
            flags: Vec::new(),
            alerts: Vec::new(),
            anomaly_count: 0,
            anomaly_total: Decimal::ZERO,
        }
    }

    fn category(name: &str, pct: f64) -> CategoryBreakdown {
        CategoryBreakdown {
            category: name.to_string(),
            total: Decimal::from(100),
            percent_of_total: pct,
            transaction_count: 1,
        }
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "$0.00");
        assert_eq!(format_money(1234.5), "$1,234.50");
        assert_eq!(format_money(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_money(-42.0), "-$42.00");
        assert_eq!(format_money(999.999), "$1,000.00");
    }

    #[test]
    fn test_savings_bands() {
        assert_eq!(savings_advice(&metrics(Some(-5.0))).level, AdviceLevel::Critical);
        assert_eq!(savings_advice(&metrics(Some(5.0))).level, AdviceLevel::Warning);
        assert_eq!(savings_advice(&metrics(Some(15.0))).level, AdviceLevel::Warning);
        assert_eq!(savings_advice(&metrics(Some(25.0))).level, AdviceLevel::Good);

        let undefined = savings_advice(&metrics(None));
        assert_eq!(undefined.level, AdviceLevel::Warning);
        assert!(undefined.message.contains("No income"));
    }

    #[test]
    fn test_category_rules() {
        let housing = category_advice(&[category("Housing", 40.0)]).unwrap();
        assert_eq!(housing.level, AdviceLevel::Warning);

        let modest_housing = category_advice(&[category("Housing", 30.0)]).unwrap();
        assert_eq!(modest_housing.level, AdviceLevel::Tip);
        assert_eq!(modest_housing.topic, "Housing");

        assert_eq!(
            category_advice(&[category("Dining", 16.0)]).unwrap().level,
            AdviceLevel::Warning
        );
        assert_eq!(
            category_advice(&[category("Shopping", 20.0)]).unwrap().level,
            AdviceLevel::Tip
        );
        assert!(category_advice(&[]).is_none());
    }

    #[test]
    fn test_advice_sorted_by_level() {
        let metrics = metrics(Some(-10.0));
        let risk = risk(20, RiskLevel::Low);
        let anomalies = no_anomalies();
        let categories = vec![category("Dining", 50.0)];
        let parts = SnapshotParts {
            metrics: &metrics,
            categories: &categories,
            risk: &risk,
            anomalies: &anomalies,
            forecast: None,
        };

        let advice = advise(&parts);
        let levels: Vec<_> = advice.iter().map(|a| a.level).collect();
        assert_eq!(
            levels,
            vec![
                AdviceLevel::Critical,
                AdviceLevel::Warning,
                AdviceLevel::Good,
                AdviceLevel::Tip,
            ]
        );
        // No forecast, no anomalies: those rules stay silent
        assert!(advice.iter().all(|a| a.topic != "Forecast"));
        assert!(advice.iter().all(|a| a.topic != "Anomalies"));

        let emergency = advice.last().unwrap();
        assert_eq!(emergency.topic, "Emergency Fund");
        assert!(emergency.action.contains("$12,000.00 to $24,000.00"));
    }

    #[test]
    fn test_level_priority_orders_critical_first() {
        let levels = [
            AdviceLevel::Critical,
            AdviceLevel::Warning,
            AdviceLevel::Good,
            AdviceLevel::Tip,
        ];
        assert!(levels.windows(2).all(|w| w[0].priority() > w[1].priority()));
        assert_eq!(AdviceLevel::Warning.to_string(), "warning");
    }
}
