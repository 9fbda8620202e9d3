//! Composite financial risk scoring
//!
//! Each [`RiskRule`] produces a goodness score in 0..=100 for one aspect of
//! the user's finances (higher = healthier). The composite flips that scale:
//! `round(sum(weight * (100 - score)))`, so a composite of 0 means no risk and
//! 100 means every weighted factor scored zero. A factor that cannot be rated
//! has no score; its weight is shared out over the rated factors.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::IncomeSource;
use crate::config::{RiskConfig, RiskLevels, StatusBands};
use crate::metrics::Metrics;
use crate::models::{CategoryBreakdown, MonthlySummary};
use crate::stats::{clamp_score, round2, to_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FactorStatus {
    Good,
    Ok,
    Warn,
    Risk,
    /// Not enough data to score
    #[serde(rename = "N/A")]
    Unrated,
}

impl FactorStatus {
    pub fn from_score(score: u8, bands: &StatusBands) -> Self {
        if score >= bands.good {
            Self::Good
        } else if score >= bands.ok {
            Self::Ok
        } else if score >= bands.warn {
            Self::Warn
        } else {
            Self::Risk
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Risk => "RISK",
            Self::Unrated => "N/A",
        }
    }
}

impl std::fmt::Display for FactorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8, levels: &RiskLevels) -> Self {
        if score < levels.moderate {
            Self::Low
        } else if score < levels.high {
            Self::Moderate
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scored aspect of financial health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub key: String,
    pub name: String,
    /// Goodness score: higher = healthier. `None` when the factor is unrated.
    pub score: Option<u8>,
    pub weight: f64,
    pub status: FactorStatus,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Higher = riskier
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    /// Factors left out of the composite
    pub fn unrated(&self) -> impl Iterator<Item = &RiskFactor> + '_ {
        self.factors.iter().filter(|f| f.score.is_none())
    }
}

/// Everything a rule may look at
pub struct RiskContext<'a> {
    pub months: &'a [MonthlySummary],
    pub metrics: &'a Metrics,
    pub categories: &'a [CategoryBreakdown],
    pub income_sources: &'a [IncomeSource],
    pub config: &'a RiskConfig,
}

impl<'a> RiskContext<'a> {
    /// Build a factor with the configured weight and status band
    pub fn factor(&self, rule: &dyn RiskRule, score: u8, detail: String) -> RiskFactor {
        RiskFactor {
            key: rule.key().to_string(),
            name: rule.name().to_string(),
            score: Some(score),
            weight: self.config.weight(rule.key()),
            status: FactorStatus::from_score(score, &self.config.bands),
            detail,
        }
    }

    /// A factor without enough data to score; left out of the composite
    pub fn unrated(&self, rule: &dyn RiskRule, detail: String) -> RiskFactor {
        RiskFactor {
            key: rule.key().to_string(),
            name: rule.name().to_string(),
            score: None,
            weight: self.config.weight(rule.key()),
            status: FactorStatus::Unrated,
            detail,
        }
    }

    /// Percent of windowed spending that falls in `categories`
    pub fn expense_share(&self, categories: &[String]) -> f64 {
        self.categories
            .iter()
            .filter(|c| categories.iter().any(|name| name.eq_ignore_ascii_case(&c.category)))
            .map(|c| c.percent_of_total)
            .sum()
    }
}

/// Scores one aspect of financial health
pub trait RiskRule: Send + Sync {
    /// Weight key in the `[risk.weights]` table
    fn key(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor;
}

/// The built-in rule set, in display order
pub fn default_rules() -> Vec<Box<dyn RiskRule>> {
    vec![
        Box::new(SavingsRateRule),
        Box::new(StabilityRule),
        Box::new(HousingCostRule),
        Box::new(EmergencyFundRule),
        Box::new(DebtLoadRule),
        Box::new(IncomeDiversityRule),
    ]
}

/// Evaluate every rule and combine them into the composite
pub fn assess(rules: &[Box<dyn RiskRule>], ctx: &RiskContext<'_>) -> RiskAssessment {
    let factors: Vec<RiskFactor> = rules.iter().map(|rule| rule.evaluate(ctx)).collect();
    let score = composite_score(&factors);
    let level = RiskLevel::from_score(score, &ctx.config.levels);

    debug!(score, level = %level, factors = factors.len(), "Assessed risk");

    RiskAssessment {
        score,
        level,
        factors,
    }
}

/// `round(sum(weight * (100 - score)))` over rated factors
///
/// Unrated weight is spread over the rated factors in proportion to their
/// own weights. With nothing rated there is no evidence of risk.
pub fn composite_score(factors: &[RiskFactor]) -> u8 {
    let total_weight: f64 = factors.iter().map(|f| f.weight).sum();
    let rated: Vec<(f64, u8)> = factors
        .iter()
        .filter_map(|f| f.score.map(|score| (f.weight, score)))
        .collect();
    let rated_weight: f64 = rated.iter().map(|(weight, _)| weight).sum();
    if rated_weight <= 0.0 {
        return 0;
    }

    let risk: f64 = rated
        .iter()
        .map(|(weight, score)| weight * (100.0 - *score as f64))
        .sum();
    clamp_score(risk * total_weight / rated_weight)
}

/// 100 at zero share, 70 at the guideline, falling to 0 at twice the guideline
pub fn share_score(share: f64, guideline: f64) -> u8 {
    let score = if share <= guideline {
        100.0 - 30.0 * share / guideline
    } else {
        (70.0 - 70.0 * (share - guideline) / guideline).max(0.0)
    };
    clamp_score(score)
}

pub struct SavingsRateRule;

impl RiskRule for SavingsRateRule {
    fn key(&self) -> &'static str {
        "savings_rate"
    }

    fn name(&self) -> &'static str {
        "Savings Rate"
    }

    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor {
        let target = ctx.config.savings_target_pct;
        match ctx.metrics.savings_ratio {
            Some(ratio) => ctx.factor(
                self,
                clamp_score(ratio / target * 70.0),
                format!("Saving {:.1}% of income (target {:.0}%)", ratio, target),
            ),
            None => ctx.factor(self, 0, "no income recorded".to_string()),
        }
    }
}

pub struct StabilityRule;

impl RiskRule for StabilityRule {
    fn key(&self) -> &'static str {
        "stability"
    }

    fn name(&self) -> &'static str {
        "Spending Stability"
    }

    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor {
        let stability = &ctx.metrics.stability;
        let Some(cv) = stability.coefficient_of_variation else {
            return ctx.unrated(self, "not enough history".to_string());
        };

        let mut detail = format!("Monthly spending varies by {:.0}%", cv * 100.0);
        if !stability.high_variance_months.is_empty() {
            let spikes: Vec<String> = stability
                .high_variance_months
                .iter()
                .map(|m| m.period.long_label())
                .collect();
            detail.push_str(&format!("; spikes in {}", spikes.join(", ")));
        }
        ctx.factor(self, clamp_score((1.0 - cv.min(1.0)) * 100.0), detail)
    }
}

pub struct HousingCostRule;

impl RiskRule for HousingCostRule {
    fn key(&self) -> &'static str {
        "housing_cost"
    }

    fn name(&self) -> &'static str {
        "Housing Cost"
    }

    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor {
        let guideline = ctx.config.housing_guideline_pct;
        let share = ctx.expense_share(&ctx.config.housing_categories);
        ctx.factor(
            self,
            share_score(share, guideline),
            format!(
                "Housing is {:.1}% of spending (guideline {:.0}%)",
                share, guideline
            ),
        )
    }
}

pub struct EmergencyFundRule;

impl RiskRule for EmergencyFundRule {
    fn key(&self) -> &'static str {
        "emergency_fund"
    }

    fn name(&self) -> &'static str {
        "Emergency Fund"
    }

    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor {
        let target = ctx.config.emergency_target_months;
        let avg_expenses = ctx.metrics.average_expenses;
        if avg_expenses <= 0.0 {
            return ctx.factor(self, 100, "no recorded expenses".to_string());
        }

        let reserve: f64 = ctx.months.iter().map(|m| to_f64(m.savings())).sum::<f64>().max(0.0);
        let months_covered = reserve / avg_expenses;
        ctx.factor(
            self,
            clamp_score(months_covered / target * 100.0),
            format!(
                "Accumulated savings cover {:.1} months of expenses (target {:.0})",
                round2(months_covered),
                target
            ),
        )
    }
}

pub struct DebtLoadRule;

impl RiskRule for DebtLoadRule {
    fn key(&self) -> &'static str {
        "debt_load"
    }

    fn name(&self) -> &'static str {
        "Debt Load"
    }

    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor {
        let guideline = ctx.config.debt_guideline_pct;
        let share = ctx.expense_share(&ctx.config.debt_categories);
        ctx.factor(
            self,
            share_score(share, guideline),
            format!(
                "Debt payments are {:.1}% of spending (guideline {:.0}%)",
                share, guideline
            ),
        )
    }
}

pub struct IncomeDiversityRule;

impl RiskRule for IncomeDiversityRule {
    fn key(&self) -> &'static str {
        "income_diversity"
    }

    fn name(&self) -> &'static str {
        "Income Diversity"
    }

    fn evaluate(&self, ctx: &RiskContext<'_>) -> RiskFactor {
        let n = ctx.income_sources.len();
        let score = if n == 0 {
            0
        } else {
            clamp_score((20.0 + 20.0 * n as f64).min(100.0))
        };
        let detail = match n {
            0 => "no income recorded".to_string(),
            1 => "1 income source".to_string(),
            n => format!("{} income sources", n),
        };
        ctx.factor(self, score, detail)
    }
}
