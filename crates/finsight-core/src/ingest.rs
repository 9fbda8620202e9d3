//! CSV ingestion into typed transactions
//!
//! Columns are located by header name (trimmed, case-insensitive), never by
//! position. `date` and `amount` are required; `description` and `category`
//! are optional. Rows that fail to parse are skipped and reported, and the
//! call only fails when nothing usable remains.

use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::categorize::categorize;
use crate::error::{Error, Result};
use crate::models::{RowError, RowErrorKind, Transaction};

const DATE_HEADERS: &[&str] = &["date", "transaction date"];
const AMOUNT_HEADERS: &[&str] = &["amount"];
const DESCRIPTION_HEADERS: &[&str] = &["description", "memo", "name"];
const CATEGORY_HEADERS: &[&str] = &["category"];

/// Outcome of parsing one input text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub transactions: Vec<Transaction>,
    pub skipped_row_count: usize,
    pub errors: Vec<RowError>,
}

/// Resolved column positions for one input
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    amount: usize,
    description: Option<usize>,
    category: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| normalized.iter().position(|h| h == name))
        };

        let date = find(DATE_HEADERS).ok_or_else(|| {
            Error::EmptyOrInvalidInput("header row has no 'date' column".to_string())
        })?;
        let amount = find(AMOUNT_HEADERS).ok_or_else(|| {
            Error::EmptyOrInvalidInput("header row has no 'amount' column".to_string())
        })?;

        Ok(Self {
            date,
            amount,
            description: find(DESCRIPTION_HEADERS),
            category: find(CATEGORY_HEADERS),
        })
    }
}

/// Parse raw CSV text into transactions
pub fn ingest_csv(raw: &str) -> Result<IngestReport> {
    let raw = raw.trim_start_matches('\u{feff}');
    if raw.trim().is_empty() {
        return Err(Error::EmptyOrInvalidInput("input is empty".to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(raw.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut transactions = Vec::new();
    let mut errors = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let fallback_row = index + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let row = e
                    .position()
                    .map(|p| p.line().saturating_sub(1) as usize)
                    .unwrap_or(fallback_row);
                errors.push(RowError {
                    row,
                    kind: RowErrorKind::Malformed,
                    message: e.to_string(),
                });
                continue;
            }
        };

        // Whitespace-only lines come through as a record of empty fields
        if record.iter().all(str::is_empty) {
            continue;
        }

        // The header sits on line 1, so data rows count from 1
        let row = record
            .position()
            .map(|p| p.line().saturating_sub(1) as usize)
            .unwrap_or(fallback_row);

        match parse_row(&record, columns, row) {
            Ok(tx) => transactions.push(tx),
            Err(error) => {
                debug!(row = error.row, kind = %error.kind, "Skipping row: {}", error.message);
                errors.push(error);
            }
        }
    }

    let skipped_row_count = errors.len();
    info!(
        parsed = transactions.len(),
        skipped = skipped_row_count,
        "Parsed transaction CSV"
    );

    if transactions.is_empty() {
        let reason = if skipped_row_count == 0 {
            "no data rows".to_string()
        } else {
            format!("all {} data rows were malformed", skipped_row_count)
        };
        return Err(Error::EmptyOrInvalidInput(reason));
    }

    Ok(IngestReport {
        transactions,
        skipped_row_count,
        errors,
    })
}

fn parse_row(
    record: &StringRecord,
    columns: ColumnMap,
    row: usize,
) -> std::result::Result<Transaction, RowError> {
    let row_error = |kind: RowErrorKind, message: String| RowError { row, kind, message };

    let date_str = field(record, Some(columns.date));
    if date_str.is_empty() {
        return Err(row_error(RowErrorKind::MissingDate, "date is empty".to_string()));
    }
    let date = parse_date(date_str).ok_or_else(|| {
        row_error(
            RowErrorKind::UnparseableDate,
            format!("Unable to parse date: {}", date_str),
        )
    })?;

    let amount_str = field(record, Some(columns.amount));
    if amount_str.is_empty() {
        return Err(row_error(RowErrorKind::MissingAmount, "amount is empty".to_string()));
    }
    let amount = parse_amount(amount_str).ok_or_else(|| {
        row_error(
            RowErrorKind::NonNumericAmount,
            format!("Unable to parse amount: {}", amount_str),
        )
    })?;

    let description = field(record, columns.description).to_string();
    let category = match field(record, columns.category) {
        "" => categorize(&description).to_string(),
        given => given.to_string(),
    };

    Ok(Transaction {
        row,
        date,
        description,
        category,
        amount,
    })
}

fn field(record: &StringRecord, index: Option<usize>) -> &str {
    index.and_then(|i| record.get(i)).unwrap_or("").trim()
}

/// Parse a date string trying common formats
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    // First match wins
    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%m-%d-%Y", // 01-15-2024
        "%d/%m/%Y", // 15/01/2024 (European)
    ];

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse an amount string, handling currency symbols and commas
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}
