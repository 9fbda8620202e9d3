//! Domain models for Finsight

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A single typed transaction, built once at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// 1-based data row number in the source text
    pub row: usize,
    pub date: NaiveDate,
    pub description: String,
    pub category: String,
    /// Negative = expense, positive = income
    pub amount: Decimal,
}

impl Transaction {
    pub fn is_income(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_expense(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn period(&self) -> Period {
        Period::from_date(self.date)
    }
}

/// Year-month aggregation key
///
/// Ordering is chronological. Display uses the unambiguous `YYYY-MM` form;
/// the month abbreviation is only a label. Fields are private so the month
/// is always in 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The period `n` months after this one
    pub fn plus_months(&self, n: u32) -> Self {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) + n as i64;
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Month abbreviation, e.g. "Mar"
    pub fn label(&self) -> &'static str {
        MONTH_ABBREVIATIONS[(self.month - 1) as usize]
    }

    /// Month abbreviation with year, e.g. "Mar 2024"
    pub fn long_label(&self) -> String {
        format!("{} {}", self.label(), self.year)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid period: {}", s))?;
        let year: i32 = year.parse().map_err(|_| format!("Invalid period: {}", s))?;
        let month: u32 = month.parse().map_err(|_| format!("Invalid period: {}", s))?;
        Period::new(year, month).ok_or_else(|| format!("Invalid period: {}", s))
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Inclusive range of periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: Period,
    pub end: Period,
}

impl PeriodRange {
    pub fn contains(&self, period: Period) -> bool {
        period >= self.start && period <= self.end
    }
}

/// Per-month cash-flow totals
///
/// Savings is not a field: it is always derived from income and expenses so
/// the identity holds exactly. It is still written out for consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MonthlySummaryRepr", from = "MonthlySummaryRepr")]
pub struct MonthlySummary {
    pub period: Period,
    pub income: Decimal,
    pub expenses: Decimal,
    pub transaction_count: usize,
}

impl MonthlySummary {
    pub fn new(period: Period, income: Decimal, expenses: Decimal, transaction_count: usize) -> Self {
        Self {
            period,
            income,
            expenses,
            transaction_count,
        }
    }

    pub fn savings(&self) -> Decimal {
        self.income - self.expenses
    }

    /// Month abbreviation for display
    pub fn label(&self) -> &'static str {
        self.period.label()
    }
}

#[derive(Serialize, Deserialize)]
struct MonthlySummaryRepr {
    period: Period,
    label: String,
    income: Decimal,
    expenses: Decimal,
    #[serde(default)]
    savings: Decimal,
    transaction_count: usize,
}

impl From<MonthlySummary> for MonthlySummaryRepr {
    fn from(summary: MonthlySummary) -> Self {
        Self {
            period: summary.period,
            label: summary.label().to_string(),
            income: summary.income,
            expenses: summary.expenses,
            savings: summary.savings(),
            transaction_count: summary.transaction_count,
        }
    }
}

impl From<MonthlySummaryRepr> for MonthlySummary {
    fn from(repr: MonthlySummaryRepr) -> Self {
        MonthlySummary::new(repr.period, repr.income, repr.expenses, repr.transaction_count)
    }
}

/// Spending total and share for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub total: Decimal,
    pub percent_of_total: f64,
    pub transaction_count: usize,
}

/// Why a data row was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    MissingDate,
    UnparseableDate,
    MissingAmount,
    NonNumericAmount,
    Malformed,
}

impl RowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingDate => "missing_date",
            Self::UnparseableDate => "unparseable_date",
            Self::MissingAmount => "missing_amount",
            Self::NonNumericAmount => "non_numeric_amount",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-fatal, per-row parse failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row number (the header is row 0)
    pub row: usize,
    pub kind: RowErrorKind,
    pub message: String,
}
