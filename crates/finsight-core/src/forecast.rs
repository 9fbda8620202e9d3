//! Linear-trend expense forecasting
//!
//! An ordinary least squares line is fitted to monthly expense totals against
//! the period index (0, 1, 2, ...) and extended past the last observed month.
//! With at least three points and non-zero residuals the interval is a
//! prediction interval from the residual standard error; otherwise a fixed
//! percentage band is used and a warning is reported.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::CategorySeries;
use crate::config::ForecastConfig;
use crate::error::Degraded;
use crate::models::{MonthlySummary, Period};
use crate::stats::{round2, to_f64};

/// Confidence reported for the percentage fallback band
pub const FALLBACK_CONFIDENCE: f64 = 0.85;

pub const INSUFFICIENT_HISTORY: &str = "insufficient data: need at least 2 months of history";

/// Residual sum of squares treated as an exact fit
const PERFECT_FIT_EPSILON: f64 = 1e-9;

/// Ordinary least squares fit of values against their index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub n: usize,
    /// None with fewer than two points; 1.0 for an exact fit (including flat)
    pub r_squared: Option<f64>,
    /// Mean absolute error of the fitted values
    pub mae: f64,
    /// sqrt(SSE / (n - 2)); needs three points
    pub residual_std_error: Option<f64>,
    x_mean: f64,
    sxx: f64,
}

impl LinearFit {
    pub fn fit(values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n == 0 {
            return None;
        }

        let nf = n as f64;
        let x_mean = (nf - 1.0) / 2.0;
        let y_mean = values.iter().sum::<f64>() / nf;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxx += dx * dx;
            sxy += dx * (y - y_mean);
        }

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = y_mean - slope * x_mean;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_err = 0.0;
        for (i, y) in values.iter().enumerate() {
            let residual = y - (intercept + slope * i as f64);
            ss_res += residual * residual;
            abs_err += residual.abs();
            ss_tot += (y - y_mean).powi(2);
        }

        let r_squared = if n < 2 {
            None
        } else if ss_res <= PERFECT_FIT_EPSILON * ss_tot.max(1.0) {
            Some(1.0)
        } else {
            Some(1.0 - ss_res / ss_tot)
        };

        let residual_std_error = (n >= 3).then(|| (ss_res / (nf - 2.0)).sqrt());

        Some(Self {
            slope,
            intercept,
            n,
            r_squared,
            mae: abs_err / nf,
            residual_std_error,
            x_mean,
            sxx,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Half-width of the prediction interval at `x`, before the z multiplier
    fn prediction_spread(&self, x: f64) -> Option<f64> {
        let s = self.residual_std_error.filter(|s| *s > 0.0)?;
        if self.sxx <= 0.0 {
            return None;
        }
        let n = self.n as f64;
        Some(s * (1.0 + 1.0 / n + (x - self.x_mean).powi(2) / self.sxx).sqrt())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn from_slope(slope: f64, tolerance: f64) -> Self {
        if slope > tolerance {
            Self::Increasing
        } else if slope < -tolerance {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the interval around a forecast point was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    Residual,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: Period,
    pub predicted: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseForecast {
    pub points: Vec<ForecastPoint>,
    pub trend: TrendDirection,
    pub slope: f64,
    pub r_squared: Option<f64>,
    pub mae: f64,
    pub interval_method: IntervalMethod,
    /// Months of history the fit used
    pub observations: usize,
}

impl ExpenseForecast {
    /// The first projected month
    pub fn next(&self) -> Option<&ForecastPoint> {
        self.points.first()
    }
}

/// Projected spending for one category next month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryForecast {
    pub category: String,
    pub current: f64,
    pub forecast: f64,
    /// None when nothing was spent in the latest month
    pub percent_change: Option<f64>,
}

/// First-to-last change in a category's monthly spending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTrend {
    pub category: String,
    pub first: f64,
    pub last: f64,
    pub percent_change: Option<f64>,
}

pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Project monthly expenses `horizon` periods past the last month
    ///
    /// Returns the forecast plus any warnings about how it was produced.
    pub fn forecast(
        &self,
        months: &[MonthlySummary],
    ) -> Result<(ExpenseForecast, Vec<String>), Degraded> {
        if months.len() < 2 {
            return Err(Degraded::DegenerateForecast(INSUFFICIENT_HISTORY.to_string()));
        }

        let values: Vec<f64> = months.iter().map(|m| to_f64(m.expenses)).collect();
        let fit = LinearFit::fit(&values)
            .ok_or_else(|| Degraded::DegenerateForecast(INSUFFICIENT_HISTORY.to_string()))?;

        let last_period = months[months.len() - 1].period;
        let last_x = (values.len() - 1) as f64;

        let mut warnings = Vec::new();
        let mut interval_method = IntervalMethod::Residual;
        let mut points = Vec::with_capacity(self.config.horizon as usize);

        for h in 1..=self.config.horizon {
            let x = last_x + h as f64;
            let predicted = fit.predict(x).max(0.0);

            let (half_width, confidence) = match fit.prediction_spread(x) {
                Some(spread) => (self.config.z_multiplier * spread, self.config.confidence_level),
                None => {
                    interval_method = IntervalMethod::Fallback;
                    (predicted * self.config.fallback_margin, FALLBACK_CONFIDENCE)
                }
            };

            points.push(ForecastPoint {
                period: last_period.plus_months(h),
                predicted: round2(predicted),
                lower_bound: round2((predicted - half_width).max(0.0)),
                upper_bound: round2(predicted + half_width),
                confidence,
            });
        }

        if interval_method == IntervalMethod::Fallback {
            let reason = if fit.n < 3 {
                "fewer than 3 months of history"
            } else {
                "residuals are zero"
            };
            warnings.push(format!(
                "forecast interval uses a ±{:.0}% band ({})",
                self.config.fallback_margin * 100.0,
                reason
            ));
        }

        debug!(
            observations = fit.n,
            slope = fit.slope,
            method = ?interval_method,
            "Fitted expense trend"
        );

        let forecast = ExpenseForecast {
            points,
            trend: TrendDirection::from_slope(fit.slope, self.config.trend_tolerance),
            slope: round2(fit.slope),
            r_squared: fit.r_squared,
            mae: round2(fit.mae),
            interval_method,
            observations: fit.n,
        };
        Ok((forecast, warnings))
    }

    /// Next-month projection per category over the full history
    pub fn category_forecasts(
        &self,
        series: &[CategorySeries],
        period_count: usize,
    ) -> Result<Vec<CategoryForecast>, Degraded> {
        if period_count < 2 {
            return Err(Degraded::DegenerateForecast(format!(
                "category forecasts skipped: {}",
                INSUFFICIENT_HISTORY
            )));
        }

        let forecasts = series
            .iter()
            .filter_map(|s| {
                let values: Vec<f64> = s.values.iter().map(|v| to_f64(*v)).collect();
                let fit = LinearFit::fit(&values)?;
                let current = round2(*values.last()?);
                let forecast = round2(fit.predict(values.len() as f64).max(0.0));
                Some(CategoryForecast {
                    category: s.category.clone(),
                    current,
                    forecast,
                    percent_change: percent_change(current, forecast),
                })
            })
            .collect();
        Ok(forecasts)
    }
}

/// First-to-last percentage change per category
pub fn category_trends(series: &[CategorySeries]) -> Vec<CategoryTrend> {
    series
        .iter()
        .filter_map(|s| {
            let first = to_f64(*s.values.first()?);
            let last = to_f64(*s.values.last()?);
            Some(CategoryTrend {
                category: s.category.clone(),
                first: round2(first),
                last: round2(last),
                percent_change: percent_change(first, last),
            })
        })
        .collect()
}

/// Smallest change that survives two-decimal rounding
const MIN_REPORTED_CHANGE: f64 = 0.01;

/// Rounded to two decimals; zero only when the values are equal
fn percent_change(from: f64, to: f64) -> Option<f64> {
    if from == to {
        return Some(0.0);
    }
    if from == 0.0 {
        return None;
    }
    let change = (to - from) / from * 100.0;
    let rounded = round2(change);
    if rounded == 0.0 {
        Some(MIN_REPORTED_CHANGE.copysign(change))
    } else {
        Some(rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn months(expenses: &[Decimal]) -> Vec<MonthlySummary> {
        let start = Period::new(2024, 1).unwrap();
        expenses
            .iter()
            .enumerate()
            .map(|(i, e)| MonthlySummary::new(start.plus_months(i as u32), dec!(5000), *e, 1))
            .collect()
    }

    fn forecaster() -> Forecaster {
        Forecaster::new(ForecastConfig::default())
    }

    #[test]
    fn test_linear_series_fits_exactly() {
        let fit = LinearFit::fit(&[1000.0, 1100.0, 1200.0, 1300.0, 1400.0]).unwrap();
        assert_eq!(fit.slope, 100.0);
        assert_eq!(fit.intercept, 1000.0);
        assert_eq!(fit.r_squared, Some(1.0));
        assert_eq!(fit.mae, 0.0);
        assert_eq!(fit.predict(5.0), 1500.0);
    }

    #[test]
    fn test_fit_small_inputs() {
        assert!(LinearFit::fit(&[]).is_none());

        let one = LinearFit::fit(&[42.0]).unwrap();
        assert_eq!(one.r_squared, None);
        assert_eq!(one.predict(1.0), 42.0);
        assert_eq!(one.residual_std_error, None);

        let flat = LinearFit::fit(&[10.0, 10.0, 10.0]).unwrap();
        assert_eq!(flat.slope, 0.0);
        assert_eq!(flat.r_squared, Some(1.0));
    }

    #[test]
    fn test_noisy_fit_reports_r_squared_and_mae() {
        let fit = LinearFit::fit(&[3.0, 5.0, 4.0, 6.0]).unwrap();
        // slope = 0.8, intercept = 3.3
        assert!((fit.slope - 0.8).abs() < 1e-9);
        assert!((fit.intercept - 3.3).abs() < 1e-9);
        let r2 = fit.r_squared.unwrap();
        assert!(r2 > 0.0 && r2 < 1.0);
        assert!((fit.mae - 0.6).abs() < 1e-9);
        assert!(fit.residual_std_error.unwrap() > 0.0);
    }

    #[test]
    fn test_forecast_linear_series_uses_fallback_band() {
        let history = months(&[dec!(1000), dec!(1100), dec!(1200), dec!(1300), dec!(1400)]);
        let (forecast, warnings) = forecaster().forecast(&history).unwrap();

        let next = forecast.next().unwrap();
        assert_eq!(next.period, Period::new(2024, 6).unwrap());
        assert_eq!(next.predicted, 1500.0);
        // Zero residuals: ±15% band
        assert_eq!(forecast.interval_method, IntervalMethod::Fallback);
        assert_eq!(next.lower_bound, 1275.0);
        assert_eq!(next.upper_bound, 1725.0);
        assert_eq!(next.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(forecast.r_squared, Some(1.0));
        assert_eq!(forecast.trend, TrendDirection::Increasing);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_forecast_residual_interval() {
        let history = months(&[dec!(3000), dec!(3400), dec!(3100), dec!(3600), dec!(3300)]);
        let (forecast, warnings) = forecaster().forecast(&history).unwrap();
        let next = forecast.next().unwrap();

        assert_eq!(forecast.interval_method, IntervalMethod::Residual);
        assert!(warnings.is_empty());
        assert_eq!(next.confidence, 0.95);
        assert!(next.lower_bound < next.predicted && next.predicted < next.upper_bound);
        // Interval is symmetric unless the floor kicks in
        let below = next.predicted - next.lower_bound;
        let above = next.upper_bound - next.predicted;
        assert!((below - above).abs() < 0.02);
    }

    #[test]
    fn test_forecast_needs_two_months() {
        let err = forecaster().forecast(&months(&[dec!(900)])).unwrap_err();
        assert_eq!(
            err,
            Degraded::DegenerateForecast(INSUFFICIENT_HISTORY.to_string())
        );
        assert_eq!(err.to_string(), INSUFFICIENT_HISTORY);
        assert!(forecaster().forecast(&[]).is_err());
    }

    #[test]
    fn test_forecast_lower_bound_floors_at_zero() {
        let history = months(&[dec!(900), dec!(500), dec!(100)]);
        let (forecast, _) = forecaster().forecast(&history).unwrap();
        let next = forecast.next().unwrap();
        assert_eq!(next.predicted, 0.0);
        assert_eq!(next.lower_bound, 0.0);
        assert!(next.upper_bound >= 0.0);
        assert_eq!(forecast.trend, TrendDirection::Decreasing);
    }

    #[test]
    fn test_forecast_horizon_periods() {
        let config = ForecastConfig {
            horizon: 3,
            ..ForecastConfig::default()
        };
        let history = months(&[dec!(1000), dec!(1010), dec!(1005)]);
        let (forecast, _) = Forecaster::new(config).forecast(&history).unwrap();
        let periods: Vec<String> = forecast.points.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(periods, vec!["2024-04", "2024-05", "2024-06"]);
        assert_eq!(forecast.trend, TrendDirection::Stable);
    }

    #[test]
    fn test_interval_widens_with_horizon() {
        let config = ForecastConfig {
            horizon: 3,
            ..ForecastConfig::default()
        };
        let history = months(&[dec!(3000), dec!(3400), dec!(3100), dec!(3600), dec!(3300)]);
        let (forecast, _) = Forecaster::new(config).forecast(&history).unwrap();
        let widths: Vec<f64> = forecast
            .points
            .iter()
            .map(|p| p.upper_bound - p.lower_bound)
            .collect();
        assert!(widths[0] < widths[1] && widths[1] < widths[2]);
    }

    #[test]
    fn test_trend_direction_tolerance() {
        assert_eq!(TrendDirection::from_slope(25.0, 20.0), TrendDirection::Increasing);
        assert_eq!(TrendDirection::from_slope(20.0, 20.0), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_slope(-20.5, 20.0), TrendDirection::Decreasing);
    }

    fn series(category: &str, values: &[Decimal]) -> CategorySeries {
        CategorySeries {
            category: category.to_string(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_category_forecasts() {
        let all = vec![
            series("Dining", &[dec!(100), dec!(200), dec!(300)]),
            series("Flat", &[dec!(50), dec!(50), dec!(50)]),
            series("New", &[dec!(0), dec!(0), dec!(0)]),
            series("Gone", &[dec!(300), dec!(100), dec!(0)]),
        ];
        let forecasts = forecaster().category_forecasts(&all, 3).unwrap();

        assert_eq!(forecasts[0].current, 300.0);
        assert_eq!(forecasts[0].forecast, 400.0);
        assert_eq!(forecasts[0].percent_change, Some(33.33));

        assert_eq!(forecasts[1].percent_change, Some(0.0));
        // Both zero: unchanged
        assert_eq!(forecasts[2].percent_change, Some(0.0));
        // Declining to zero stays floored at zero
        assert_eq!(forecasts[3].forecast, 0.0);
        assert_eq!(forecasts[3].percent_change, Some(0.0));
    }

    #[test]
    fn test_category_forecast_from_zero_is_undefined() {
        let all = vec![series("Travel", &[dec!(600), dec!(0)])];
        let forecasts = forecaster().category_forecasts(&all, 2).unwrap();
        // Fitted line keeps falling, floored at 0, equal to current
        assert_eq!(forecasts[0].forecast, 0.0);
        assert_eq!(forecasts[0].percent_change, Some(0.0));

        let spiky = vec![series("Gym", &[dec!(0), dec!(40), dec!(0)])];
        let forecasts = forecaster().category_forecasts(&spiky, 3).unwrap();
        assert_eq!(forecasts[0].current, 0.0);
        assert!(forecasts[0].forecast > 0.0);
        assert_eq!(forecasts[0].percent_change, None);
    }

    #[test]
    fn test_tiny_category_change_is_not_reported_as_zero() {
        let rising = vec![series("Rent", &[dec!(99999.99), dec!(100000.00)])];
        let forecasts = forecaster().category_forecasts(&rising, 2).unwrap();
        assert_eq!(forecasts[0].current, 100000.0);
        assert_eq!(forecasts[0].forecast, 100000.01);
        assert_eq!(forecasts[0].percent_change, Some(0.01));

        let falling = vec![series("Rent", &[dec!(100000.00), dec!(99999.99)])];
        let forecasts = forecaster().category_forecasts(&falling, 2).unwrap();
        assert_eq!(forecasts[0].forecast, 99999.98);
        assert_eq!(forecasts[0].percent_change, Some(-0.01));
    }

    #[test]
    fn test_percent_change_zero_only_when_equal() {
        assert_eq!(percent_change(250.0, 250.0), Some(0.0));
        assert_eq!(percent_change(0.0, 0.0), Some(0.0));
        assert_eq!(percent_change(0.0, 5.0), None);
        assert_eq!(percent_change(200.0, 250.0), Some(25.0));
        assert_eq!(percent_change(1_000_000.0, 1_000_000.01), Some(0.01));
        assert_eq!(percent_change(1_000_000.0, 999_999.99), Some(-0.01));
    }

    #[test]
    fn test_category_forecasts_need_two_periods() {
        let all = vec![series("Dining", &[dec!(100)])];
        assert!(forecaster().category_forecasts(&all, 1).is_err());
    }

    #[test]
    fn test_category_trends() {
        let all = vec![
            series("Dining", &[dec!(200), dec!(250), dec!(300)]),
            series("Gym", &[dec!(0), dec!(40), dec!(40)]),
        ];
        let trends = category_trends(&all);
        assert_eq!(trends[0].percent_change, Some(50.0));
        assert_eq!(trends[1].percent_change, None);
        assert_eq!(trends[1].last, 40.0);
    }
}
