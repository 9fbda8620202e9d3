//! Transaction anomaly scoring
//!
//! Only debits are scored. Each one is compared against the other debits in
//! its category (leave-one-out, so a single outlier cannot hide by inflating
//! its own baseline). A category with only two debits has a single "other"
//! value, so both are scored against the pair instead. Categories that are
//! too small or have no spread fall back to the baseline of all other debits.
//!
//! Scores follow the isolation-forest convention: they live in (-0.5, 0.5)
//! and lower means more unusual.

use std::cmp::Ordering;
use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnomalyConfig;
use crate::models::{PeriodRange, Transaction};
use crate::stats::{logistic, to_f64};

/// Relative tolerance for treating a magnitude as equal to a flat baseline
const SAME_VALUE_EPSILON: f64 = 1e-9;

/// Reference distribution a transaction is scored against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineScope {
    Category,
    Global,
}

/// Scoring strategy for a single transaction magnitude
pub trait AnomalyScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower = more unusual; anomalies fall below the configured threshold
    fn score(&self, magnitude: f64, baseline: &Baseline) -> f64;
}

/// Logistic-squashed deviation from the baseline mean
///
/// `score = 0.5 - sigmoid(z - cutoff)`, so the score crosses zero at
/// `cutoff` standard deviations above the mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationScorer {
    cutoff: f64,
}

impl DeviationScorer {
    pub fn new(cutoff: f64) -> Self {
        Self { cutoff }
    }

    /// Standard deviations above the baseline mean
    ///
    /// With no spread, a value at the mean is 0 and any other value is an
    /// unbounded deviation in its direction.
    pub fn z_score(magnitude: f64, baseline: &Baseline) -> f64 {
        let deviation = magnitude - baseline.mean;
        if baseline.std_dev > 0.0 {
            deviation / baseline.std_dev
        } else if deviation.abs() <= SAME_VALUE_EPSILON * baseline.mean.abs().max(1.0) {
            0.0
        } else {
            f64::INFINITY.copysign(deviation)
        }
    }
}

impl Default for DeviationScorer {
    fn default() -> Self {
        Self::new(AnomalyConfig::default().deviation_cutoff)
    }
}

impl AnomalyScorer for DeviationScorer {
    fn name(&self) -> &'static str {
        "deviation"
    }

    fn score(&self, magnitude: f64, baseline: &Baseline) -> f64 {
        let z = Self::z_score(magnitude, baseline);
        0.5 - logistic(z - self.cutoff)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub transaction: Transaction,
    pub score: f64,
    pub is_anomaly: bool,
    pub exceeds_amount_threshold: bool,
    pub baseline: BaselineScope,
    /// Typical magnitude for this transaction's baseline
    pub expected: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub scorer: String,
    /// Every scored debit, most unusual first
    pub flags: Vec<AnomalyFlag>,
    /// The first flags that are anomalous or over the amount threshold
    pub alerts: Vec<AnomalyFlag>,
    pub anomaly_count: usize,
    /// Sum of magnitudes of anomalous transactions
    pub anomaly_total: Decimal,
}

impl AnomalyReport {
    /// Largest anomalous transaction by magnitude
    pub fn largest_anomaly(&self) -> Option<&AnomalyFlag> {
        self.flags
            .iter()
            .filter(|f| f.is_anomaly)
            .max_by(|a, b| a.transaction.amount.abs().cmp(&b.transaction.amount.abs()))
    }
}

/// Running sums for leave-one-out mean and variance
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn add(&mut self, x: f64) {
        self.count += 1;
        self.sum += x;
        self.sum_sq += x * x;
    }

    /// Baseline of every value
    fn all(&self) -> Baseline {
        Self::baseline(self.count, self.sum, self.sum_sq, 0.0)
    }

    /// Baseline of every value except `x`
    fn excluding(&self, x: f64) -> Baseline {
        let count = self.count.saturating_sub(1);
        Self::baseline(count, self.sum - x, self.sum_sq - x * x, x)
    }

    /// Leave-one-out while at least two other values remain, else all values
    fn local(&self, x: f64) -> Baseline {
        if self.count > 2 {
            self.excluding(x)
        } else {
            self.all()
        }
    }

    /// `empty_mean` stands in when there is nothing to average
    fn baseline(count: usize, sum: f64, sum_sq: f64, empty_mean: f64) -> Baseline {
        if count == 0 {
            return Baseline {
                mean: empty_mean,
                std_dev: 0.0,
                count,
            };
        }
        let n = count as f64;
        let mean = sum / n;
        let std_dev = if count >= 2 {
            let var = (sum_sq - n * mean * mean) / (n - 1.0);
            // Guard against tiny negative values from cancellation
            if var > 1e-9 {
                var.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };
        Baseline {
            mean,
            std_dev,
            count,
        }
    }
}

pub struct AnomalyDetector<'a> {
    config: &'a AnomalyConfig,
    scorer: &'a dyn AnomalyScorer,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(config: &'a AnomalyConfig, scorer: &'a dyn AnomalyScorer) -> Self {
        Self { config, scorer }
    }

    pub fn detect(&self, transactions: &[Transaction], window: Option<PeriodRange>) -> AnomalyReport {
        let debits: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.is_expense() && window.map_or(true, |w| w.contains(tx.period())))
            .collect();

        let mut global = Moments::default();
        let mut by_category: HashMap<&str, Moments> = HashMap::new();
        for tx in &debits {
            let magnitude = to_f64(tx.amount.abs());
            global.add(magnitude);
            by_category
                .entry(tx.category.as_str())
                .or_default()
                .add(magnitude);
        }

        let mut flags: Vec<AnomalyFlag> = debits
            .iter()
            .map(|tx| {
                let magnitude = to_f64(tx.amount.abs());
                let local = by_category
                    .get(tx.category.as_str())
                    .filter(|m| m.count >= self.config.min_category_samples)
                    .map(|m| m.local(magnitude));

                let (baseline, scope) = match local {
                    Some(b) if b.std_dev > 0.0 => (b, BaselineScope::Category),
                    _ => (global.excluding(magnitude), BaselineScope::Global),
                };

                let score = self.scorer.score(magnitude, &baseline);
                AnomalyFlag {
                    transaction: (*tx).clone(),
                    score,
                    is_anomaly: score < self.config.score_threshold,
                    exceeds_amount_threshold: magnitude > self.config.amount_threshold,
                    baseline: scope,
                    expected: baseline.mean,
                }
            })
            .collect();

        flags.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.transaction.date.cmp(&b.transaction.date))
                .then_with(|| a.transaction.description.cmp(&b.transaction.description))
        });

        let alerts: Vec<AnomalyFlag> = flags
            .iter()
            .filter(|f| f.is_anomaly || f.exceeds_amount_threshold)
            .take(self.config.top_n)
            .cloned()
            .collect();

        let anomalous = flags.iter().filter(|f| f.is_anomaly);
        let anomaly_count = anomalous.clone().count();
        let anomaly_total = anomalous.map(|f| f.transaction.amount.abs()).sum();

        debug!(
            scorer = self.scorer.name(),
            scored = flags.len(),
            anomalies = anomaly_count,
            alerts = alerts.len(),
            "Scored transactions"
        );

        AnomalyReport {
            scorer: self.scorer.name().to_string(),
            flags,
            alerts,
            anomaly_count,
            anomaly_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn tx(day: u32, category: &str, description: &str, amount: Decimal) -> Transaction {
        Transaction {
            row: day as usize,
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            description: description.to_string(),
            category: category.to_string(),
            amount,
        }
    }

    fn detect(transactions: &[Transaction]) -> AnomalyReport {
        let config = AnomalyConfig::default();
        let scorer = DeviationScorer::new(config.deviation_cutoff);
        AnomalyDetector::new(&config, &scorer).detect(transactions, None)
    }

    fn flag_for<'r>(report: &'r AnomalyReport, description: &str) -> &'r AnomalyFlag {
        report
            .flags
            .iter()
            .find(|f| f.transaction.description == description)
            .unwrap()
    }

    #[test]
    fn test_score_at_mean_is_never_anomalous() {
        let scorer = DeviationScorer::default();
        let baseline = Baseline {
            mean: 100.0,
            std_dev: 10.0,
            count: 5,
        };
        let score = scorer.score(100.0, &baseline);
        assert!((score - 0.3808).abs() < 1e-3);
        assert!(score >= AnomalyConfig::default().score_threshold);

        // Exactly at the cutoff the score is zero
        assert!(scorer.score(120.0, &baseline).abs() < 1e-12);
        assert!(scorer.score(200.0, &baseline) < -0.4);
    }

    #[test]
    fn test_zero_spread_scores_by_direction() {
        let scorer = DeviationScorer::default();
        let threshold = AnomalyConfig::default().score_threshold;
        let baseline = Baseline {
            mean: 50.0,
            std_dev: 0.0,
            count: 3,
        };

        assert_eq!(DeviationScorer::z_score(50.0, &baseline), 0.0);
        assert!(scorer.score(50.0, &baseline) > 0.3);

        assert_eq!(DeviationScorer::z_score(500.0, &baseline), f64::INFINITY);
        assert_eq!(scorer.score(500.0, &baseline), -0.5);
        assert!(scorer.score(500.0, &baseline) < threshold);

        // Below a flat baseline is as ordinary as it gets
        assert_eq!(DeviationScorer::z_score(5.0, &baseline), f64::NEG_INFINITY);
        assert_eq!(scorer.score(5.0, &baseline), 0.5);
    }

    #[test]
    fn test_outlier_against_flat_history_is_flagged() {
        let mut txs: Vec<Transaction> = (1..=5)
            .map(|d| tx(d, "Dining", &format!("Lunch {}", d), dec!(-20)))
            .collect();
        txs.push(tx(6, "Dining", "Banquet", dec!(-400)));
        let report = detect(&txs);

        // The other debits are identical, so both baselines are flat
        let outlier = flag_for(&report, "Banquet");
        assert_eq!(outlier.baseline, BaselineScope::Global);
        assert_eq!(outlier.expected, 20.0);
        assert!(outlier.is_anomaly);
        assert_eq!(report.flags[0].transaction.description, "Banquet");

        for d in 1..=5 {
            assert!(!flag_for(&report, &format!("Lunch {}", d)).is_anomaly);
        }
        assert_eq!(report.anomaly_count, 1);
        assert_eq!(report.anomaly_total, dec!(400));
    }

    #[test]
    fn test_identical_debits_are_not_flagged() {
        let txs: Vec<Transaction> = (1..=4)
            .map(|d| tx(d, "Housing", &format!("Rent {}", d), dec!(-1080)))
            .collect();
        let report = detect(&txs);
        assert_eq!(report.anomaly_count, 0);
        assert!(report.flags.iter().all(|f| f.score > 0.3));
    }

    #[test]
    fn test_far_above_category_mean_is_flagged() {
        let txs = vec![
            tx(1, "Dining", "Lunch A", dec!(-20)),
            tx(2, "Dining", "Lunch B", dec!(-25)),
            tx(3, "Dining", "Lunch C", dec!(-30)),
            tx(4, "Dining", "Lunch D", dec!(-22)),
            tx(5, "Dining", "Lunch E", dec!(-28)),
            tx(6, "Dining", "Tasting menu", dec!(-400)),
        ];
        let report = detect(&txs);

        let outlier = flag_for(&report, "Tasting menu");
        assert!(outlier.is_anomaly);
        assert_eq!(outlier.baseline, BaselineScope::Category);
        assert_eq!(report.flags[0].transaction.description, "Tasting menu");
        assert_eq!(report.anomaly_count, 1);
        assert_eq!(report.anomaly_total, dec!(400));

        for name in ["Lunch A", "Lunch B", "Lunch C", "Lunch D", "Lunch E"] {
            assert!(!flag_for(&report, name).is_anomaly, "{} flagged", name);
        }
    }

    #[test]
    fn test_transaction_at_category_mean_not_flagged() {
        let txs = vec![
            tx(1, "Groceries", "Shop 1", dec!(-80)),
            tx(2, "Groceries", "Shop 2", dec!(-100)),
            tx(3, "Groceries", "Shop 3", dec!(-120)),
        ];
        let report = detect(&txs);
        let at_mean = flag_for(&report, "Shop 2");
        assert!(!at_mean.is_anomaly);
        assert_eq!(at_mean.expected, 100.0);
    }

    #[test]
    fn test_small_category_uses_global_baseline() {
        let txs = vec![
            tx(1, "Dining", "Lunch", dec!(-20)),
            tx(2, "Dining", "Dinner", dec!(-35)),
            tx(3, "Dining", "Brunch", dec!(-30)),
            tx(4, "Travel", "Flight", dec!(-25)),
        ];
        let report = detect(&txs);
        // Travel has no other rows to compare against, it is scored globally
        let flight = flag_for(&report, "Flight");
        assert_eq!(flight.baseline, BaselineScope::Global);
        assert!(!flight.is_anomaly);
    }

    #[test]
    fn test_category_at_minimum_size_uses_category_baseline() {
        let txs = vec![
            tx(1, "Dining", "Lunch", dec!(-20)),
            tx(2, "Dining", "Dinner", dec!(-35)),
            tx(3, "Dining", "Brunch", dec!(-30)),
            tx(4, "Travel", "Train", dec!(-30)),
            tx(5, "Travel", "Flight", dec!(-400)),
        ];
        let config = AnomalyConfig::default();
        assert_eq!(config.min_category_samples, 2);
        let report = detect(&txs);

        let flight = flag_for(&report, "Flight");
        let train = flag_for(&report, "Train");
        assert_eq!(flight.baseline, BaselineScope::Category);
        assert_eq!(train.baseline, BaselineScope::Category);
        // Both rows of the pair share one baseline
        assert_eq!(flight.expected, 215.0);
        assert_eq!(train.expected, 215.0);
    }

    #[test]
    fn test_category_below_configured_minimum_uses_global_baseline() {
        let txs = vec![
            tx(1, "Dining", "Lunch", dec!(-20)),
            tx(2, "Dining", "Dinner", dec!(-35)),
            tx(3, "Dining", "Brunch", dec!(-30)),
            tx(4, "Travel", "Train", dec!(-30)),
            tx(5, "Travel", "Flight", dec!(-400)),
        ];
        let config = AnomalyConfig {
            min_category_samples: 3,
            ..AnomalyConfig::default()
        };
        let scorer = DeviationScorer::default();
        let report = AnomalyDetector::new(&config, &scorer).detect(&txs, None);

        assert_eq!(flag_for(&report, "Flight").baseline, BaselineScope::Global);
        assert_eq!(flag_for(&report, "Lunch").baseline, BaselineScope::Category);
    }

    #[test]
    fn test_zero_spread_category_uses_global_baseline() {
        let txs = vec![
            tx(1, "Entertainment", "Netflix", dec!(-15.99)),
            tx(2, "Entertainment", "Netflix", dec!(-15.99)),
            tx(3, "Entertainment", "Netflix", dec!(-15.99)),
            tx(4, "Dining", "Lunch", dec!(-20)),
        ];
        let report = detect(&txs);
        assert!(report
            .flags
            .iter()
            .filter(|f| f.transaction.category == "Entertainment")
            .all(|f| f.baseline == BaselineScope::Global));
    }

    #[test]
    fn test_credits_are_never_scored() {
        let txs = vec![
            tx(1, "Income", "Salary", dec!(5000)),
            tx(2, "Income", "Bonus", dec!(50000)),
            tx(3, "Dining", "Lunch", dec!(-20)),
            tx(4, "Refund", "Zero", dec!(0)),
        ];
        let report = detect(&txs);
        assert_eq!(report.flags.len(), 1);
        assert!(report.flags.iter().all(|f| f.transaction.is_expense()));
    }

    #[test]
    fn test_alerts_include_large_amounts_and_cap_at_top_n() {
        let mut txs: Vec<Transaction> = (1..=8)
            .map(|d| tx(d, "Housing", &format!("Payment {}", d), Decimal::from(-(600 + d as i64))))
            .collect();
        txs.push(tx(20, "Dining", "Coffee", dec!(-4)));
        txs.push(tx(21, "Dining", "Coffee", dec!(-5)));

        let report = detect(&txs);
        assert_eq!(report.alerts.len(), 5);
        assert!(report
            .alerts
            .iter()
            .all(|f| f.is_anomaly || f.exceeds_amount_threshold));
        assert!(report.alerts.iter().all(|f| f.exceeds_amount_threshold));
    }

    #[test]
    fn test_flags_sorted_by_score_then_date() {
        let txs = vec![
            tx(9, "Misc", "B", dec!(-10)),
            tx(3, "Misc", "A", dec!(-10)),
            tx(3, "Misc", "C", dec!(-10)),
        ];
        let report = detect(&txs);
        let order: Vec<_> = report
            .flags
            .iter()
            .map(|f| f.transaction.description.as_str())
            .collect();
        assert_eq!(order, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_window_limits_scored_rows() {
        let mut txs = vec![tx(1, "Dining", "March lunch", dec!(-20))];
        txs.push(Transaction {
            row: 99,
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            description: "January lunch".to_string(),
            category: "Dining".to_string(),
            amount: dec!(-25),
        });
        let config = AnomalyConfig::default();
        let scorer = DeviationScorer::default();
        let march = crate::models::Period::new(2024, 3).unwrap();
        let window = PeriodRange {
            start: march,
            end: march,
        };
        let report = AnomalyDetector::new(&config, &scorer).detect(&txs, Some(window));
        assert_eq!(report.flags.len(), 1);
        assert_eq!(report.flags[0].transaction.description, "March lunch");
    }

    struct AlwaysAnomalous;

    impl AnomalyScorer for AlwaysAnomalous {
        fn name(&self) -> &'static str {
            "always"
        }

        fn score(&self, _magnitude: f64, _baseline: &Baseline) -> f64 {
            -0.5
        }
    }

    #[test]
    fn test_custom_scorer_is_used() {
        let config = AnomalyConfig::default();
        let txs = vec![tx(1, "Dining", "Lunch", dec!(-20))];
        let report = AnomalyDetector::new(&config, &AlwaysAnomalous).detect(&txs, None);
        assert_eq!(report.scorer, "always");
        assert!(report.flags[0].is_anomaly);
        assert_eq!(report.largest_anomaly().unwrap().transaction.description, "Lunch");
    }
}
