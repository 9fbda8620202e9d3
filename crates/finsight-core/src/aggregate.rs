//! Monthly aggregation and category totals
//!
//! Everything here is a single pass over the typed transactions keyed by
//! [`Period`], so months from different years never collide.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{CategoryBreakdown, MonthlySummary, Period, PeriodRange, Transaction};

/// Chronological monthly summaries (sparse: months without rows are absent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub months: Vec<MonthlySummary>,
}

impl Aggregation {
    pub fn periods(&self) -> Vec<Period> {
        self.months.iter().map(|m| m.period).collect()
    }

    pub fn total_income(&self) -> Decimal {
        self.months.iter().map(|m| m.income).sum()
    }

    pub fn total_expenses(&self) -> Decimal {
        self.months.iter().map(|m| m.expenses).sum()
    }

    pub fn total_savings(&self) -> Decimal {
        self.months.iter().map(|m| m.savings()).sum()
    }

    /// Range covering the last `months` observed periods, or all of them
    pub fn window(&self, months: Option<u32>) -> Option<PeriodRange> {
        let last = self.months.last()?.period;
        let len = self.months.len();
        let take = months.map_or(len, |n| (n as usize).min(len));
        let start = self.months[len - take].period;
        Some(PeriodRange { start, end: last })
    }

    /// Summaries that fall inside `range`
    pub fn within(&self, range: Option<PeriodRange>) -> &[MonthlySummary] {
        match range {
            None => &self.months,
            Some(range) => {
                let start = self
                    .months
                    .iter()
                    .position(|m| range.contains(m.period))
                    .unwrap_or(self.months.len());
                let end = self
                    .months
                    .iter()
                    .rposition(|m| range.contains(m.period))
                    .map_or(start, |i| i + 1);
                &self.months[start..end]
            }
        }
    }
}

#[derive(Default)]
struct MonthAccumulator {
    income: Decimal,
    expenses: Decimal,
    count: usize,
}

/// Group transactions into per-month income and expense totals
pub fn aggregate(transactions: &[Transaction]) -> Aggregation {
    let mut by_period: BTreeMap<Period, MonthAccumulator> = BTreeMap::new();

    for tx in transactions {
        let acc = by_period.entry(tx.period()).or_default();
        acc.count += 1;
        if tx.is_income() {
            acc.income += tx.amount;
        } else if tx.is_expense() {
            acc.expenses += tx.amount.abs();
        }
    }

    let months = by_period
        .into_iter()
        .map(|(period, acc)| MonthlySummary::new(period, acc.income, acc.expenses, acc.count))
        .collect();

    Aggregation { months }
}

fn in_window(tx: &Transaction, window: Option<PeriodRange>) -> bool {
    window.map_or(true, |w| w.contains(tx.period()))
}

/// Share of spending per category, largest first
pub fn category_breakdown(
    transactions: &[Transaction],
    window: Option<PeriodRange>,
) -> Vec<CategoryBreakdown> {
    let mut totals: HashMap<&str, (Decimal, usize)> = HashMap::new();

    for tx in transactions
        .iter()
        .filter(|tx| tx.is_expense() && in_window(tx, window))
    {
        let entry = totals.entry(tx.category.as_str()).or_default();
        entry.0 += tx.amount.abs();
        entry.1 += 1;
    }

    let grand_total: Decimal = totals.values().map(|(total, _)| *total).sum();

    let mut breakdown: Vec<CategoryBreakdown> = totals
        .into_iter()
        .map(|(category, (total, count))| CategoryBreakdown {
            category: category.to_string(),
            total,
            percent_of_total: 0.0,
            transaction_count: count,
        })
        .collect();

    breakdown.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.category.cmp(&b.category))
    });
    assign_percentages(&mut breakdown, grand_total);
    breakdown
}

/// Hundredths of a percent in a whole
const BASIS_POINTS: i64 = 10_000;

/// Two-decimal shares that add up to exactly 100.00
///
/// Largest-remainder rounding: every share is floored to a basis point, then
/// the leftover points go to the largest remainders. Ties keep the sort order.
fn assign_percentages(breakdown: &mut [CategoryBreakdown], grand_total: Decimal) {
    if grand_total.is_zero() {
        return;
    }

    let exact: Vec<Decimal> = breakdown
        .iter()
        .map(|c| c.total / grand_total * Decimal::from(BASIS_POINTS))
        .collect();
    let mut points: Vec<i64> = exact
        .iter()
        .map(|x| x.round_dp_with_strategy(0, RoundingStrategy::ToZero).to_i64().unwrap_or(0))
        .collect();

    let mut by_remainder: Vec<usize> = (0..exact.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = exact[a] - Decimal::from(points[a]);
        let rb = exact[b] - Decimal::from(points[b]);
        rb.cmp(&ra).then_with(|| a.cmp(&b))
    });

    let leftover = (BASIS_POINTS - points.iter().sum::<i64>()).max(0) as usize;
    for &i in by_remainder.iter().take(leftover) {
        points[i] += 1;
    }

    for (category, points) in breakdown.iter_mut().zip(points) {
        category.percent_of_total = points as f64 / 100.0;
    }
}

/// One distinct source of income
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    pub source: String,
    pub total: Decimal,
    pub transaction_count: usize,
}

/// Credits grouped by normalized description, largest first
pub fn income_sources(
    transactions: &[Transaction],
    window: Option<PeriodRange>,
) -> Vec<IncomeSource> {
    let mut totals: BTreeMap<String, (Decimal, usize)> = BTreeMap::new();

    for tx in transactions
        .iter()
        .filter(|tx| tx.is_income() && in_window(tx, window))
    {
        let key = normalize_source(&tx.description, &tx.category);
        let entry = totals.entry(key).or_default();
        entry.0 += tx.amount;
        entry.1 += 1;
    }

    let mut sources: Vec<IncomeSource> = totals
        .into_iter()
        .map(|(source, (total, count))| IncomeSource {
            source,
            total,
            transaction_count: count,
        })
        .collect();
    sources.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.source.cmp(&b.source)));
    sources
}

/// Lowercase, collapse whitespace, drop digits so "Payroll 0315" and
/// "PAYROLL 0401" count as one source
fn normalize_source(description: &str, category: &str) -> String {
    let text = if description.trim().is_empty() {
        category
    } else {
        description
    };
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Expense totals for one category over a fixed list of periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySeries {
    pub category: String,
    /// One entry per requested period, zero where nothing was spent
    pub values: Vec<Decimal>,
}

/// Per-category expense series aligned to `periods`, sorted by category
pub fn category_series(transactions: &[Transaction], periods: &[Period]) -> Vec<CategorySeries> {
    let index: HashMap<Period, usize> = periods.iter().enumerate().map(|(i, p)| (*p, i)).collect();
    let mut series: BTreeMap<&str, Vec<Decimal>> = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| tx.is_expense()) {
        if let Some(&i) = index.get(&tx.period()) {
            let values = series
                .entry(tx.category.as_str())
                .or_insert_with(|| vec![Decimal::ZERO; periods.len()]);
            values[i] += tx.amount.abs();
        }
    }

    series
        .into_iter()
        .map(|(category, values)| CategorySeries {
            category: category.to_string(),
            values,
        })
        .collect()
}
