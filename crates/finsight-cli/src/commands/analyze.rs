//! Analyze and seed commands

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use finsight_core::advice::format_money;
use finsight_core::stats::to_f64;
use finsight_core::AnalyticsSnapshot;
use tracing::info;

use super::{open_facade, truncate};

const MAX_LISTED_ROW_ERRORS: usize = 5;
const MAX_LISTED_CATEGORIES: usize = 6;

/// Ingest a CSV file and return the resulting snapshot
pub fn analyze_file(config_path: Option<&Path>, file: &Path) -> Result<Arc<AnalyticsSnapshot>> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut facade = open_facade(config_path)?;
    let snapshot = facade
        .ingest(&raw)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;

    info!(file = %file.display(), transactions = snapshot.transaction_count, "Analyzed file");
    Ok(snapshot)
}

pub fn cmd_analyze(config_path: Option<&Path>, file: &Path, json: bool) -> Result<()> {
    let snapshot = analyze_file(config_path, file)?;
    print_snapshot(&snapshot, json)
}

pub fn cmd_seed(config_path: Option<&Path>, json: bool) -> Result<()> {
    let facade = open_facade(config_path)?;
    print_snapshot(&facade.current_snapshot(), json)
}

fn print_snapshot(snapshot: &AnalyticsSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        print!("{}", render_report(snapshot));
    }
    Ok(())
}

/// Human-readable report for a snapshot
pub fn render_report(snapshot: &AnalyticsSnapshot) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, snapshot);
    out
}

fn write_report(out: &mut String, s: &AnalyticsSnapshot) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "╭─────────────────────────────────────────╮")?;
    writeln!(out, "│          📊 Finsight Report             │")?;
    writeln!(out, "╰─────────────────────────────────────────╯")?;
    writeln!(out)?;
    writeln!(out, "  Source:          {}", s.source)?;
    writeln!(out, "  Transactions:    {}", s.transaction_count)?;
    if s.skipped_row_count > 0 {
        writeln!(out, "  ⚠️  Skipped rows:  {}", s.skipped_row_count)?;
        for e in s.row_errors.iter().take(MAX_LISTED_ROW_ERRORS) {
            writeln!(out, "     row {}: {}", e.row, e.message)?;
        }
    }
    if let Some(window) = s.window {
        writeln!(out, "  Window:          {} to {}", window.start, window.end)?;
    }

    writeln!(out)?;
    writeln!(out, "📅 Monthly Cash Flow")?;
    writeln!(out, "   ─────────────────────────────────────────────────")?;
    writeln!(
        out,
        "   {:<10} {:>12} {:>12} {:>12}",
        "Month", "Income", "Expenses", "Savings"
    )?;
    for m in &s.months {
        writeln!(
            out,
            "   {:<10} {:>12} {:>12} {:>12}",
            m.period.long_label(),
            format_money(to_f64(m.income)),
            format_money(to_f64(m.expenses)),
            format_money(to_f64(m.savings()))
        )?;
    }
    writeln!(
        out,
        "   {:<10} {:>12} {:>12} {:>12}",
        "Total",
        format_money(to_f64(s.totals.income)),
        format_money(to_f64(s.totals.expenses)),
        format_money(to_f64(s.totals.savings))
    )?;

    let m = &s.metrics;
    writeln!(out)?;
    writeln!(out, "📈 Metrics")?;
    match m.savings_ratio {
        Some(ratio) => writeln!(out, "   Savings rate:    {:.1}%", ratio)?,
        None => writeln!(out, "   Savings rate:    n/a")?,
    }
    let trend = match m.increasing {
        Some(true) => "rising",
        Some(false) => "not rising",
        None => "n/a",
    };
    writeln!(out, "   Expense trend:   {}", trend)?;
    if let Some(cv) = m.stability.coefficient_of_variation {
        writeln!(out, "   Variability:     {:.1}%", cv * 100.0)?;
    }
    for month in &m.stability.high_variance_months {
        writeln!(out, "   ⚡ {}", month.explanation)?;
    }

    writeln!(out)?;
    writeln!(out, "🛡️  Risk: {}/100 ({})", s.risk.score, s.risk.level)?;
    for f in &s.risk.factors {
        let score = f.score.map_or_else(|| "-".to_string(), |score| score.to_string());
        writeln!(
            out,
            "   {:<18} {:>3}  {:<4}  {}",
            f.name,
            score,
            f.status.as_str(),
            f.detail
        )?;
    }

    if !s.categories.is_empty() {
        writeln!(out)?;
        writeln!(out, "🏷️  Top Categories")?;
        for c in s.categories.iter().take(MAX_LISTED_CATEGORIES) {
            writeln!(
                out,
                "   {:<20} {:>12} {:>6.1}%",
                truncate(&c.category, 20),
                format_money(to_f64(c.total)),
                c.percent_of_total
            )?;
        }
    }

    writeln!(out)?;
    if s.anomalies.alerts.is_empty() {
        writeln!(out, "✅ No unusual transactions")?;
    } else {
        writeln!(
            out,
            "🔍 Unusual Transactions ({} anomalies, {})",
            s.anomalies.anomaly_count,
            format_money(to_f64(s.anomalies.anomaly_total))
        )?;
        for flag in &s.anomalies.alerts {
            let tx = &flag.transaction;
            writeln!(
                out,
                "   {}  {:<28} {:>12}  score {:+.2}",
                tx.date,
                truncate(&tx.description, 28),
                format_money(to_f64(tx.amount)),
                flag.score
            )?;
        }
    }

    if let Some((forecast, point)) = s.forecast.as_ref().and_then(|f| f.next().map(|p| (f, p))) {
        writeln!(out)?;
        writeln!(out, "🔮 Forecast for {}", point.period.long_label())?;
        writeln!(
            out,
            "   {} ({} to {}, {:.0}% confidence), trend {}",
            format_money(point.predicted),
            format_money(point.lower_bound),
            format_money(point.upper_bound),
            point.confidence * 100.0,
            forecast.trend
        )?;
    }

    if !s.advice.is_empty() {
        writeln!(out)?;
        writeln!(out, "💡 Advice")?;
        for a in &s.advice {
            writeln!(out, "   [{}] {}: {}", a.level, a.topic, a.message)?;
            writeln!(out, "      → {}", a.action)?;
        }
    }

    if !s.warnings.is_empty() {
        writeln!(out)?;
        writeln!(out, "ℹ️  Notes")?;
        for w in &s.warnings {
            writeln!(out, "   - {}", w)?;
        }
    }
    writeln!(out)?;
    Ok(())
}
