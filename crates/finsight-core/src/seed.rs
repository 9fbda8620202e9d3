//! Built-in sample dataset
//!
//! Five months of transactions (January to May 2024) used before any real
//! data has been ingested. Everything shown for it is computed by the same
//! pipeline as ingested data.

/// Seed transactions as CSV (compiled into binary)
pub const SEED_CSV: &str = include_str!("../data/seed.csv");
