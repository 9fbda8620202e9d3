//! Error types for Finsight

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No usable transaction rows, or a header without the required columns
    #[error("Empty or invalid input: {0}")]
    EmptyOrInvalidInput(String),

    /// Invalid analytics configuration (raised at load, before any ingestion)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Short machine-readable kind, used by API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EmptyOrInvalidInput(_) => "empty_or_invalid_input",
            Error::Configuration(_) => "configuration",
            Error::Csv(_) => "csv",
            Error::Io(_) => "io",
            Error::TomlParse(_) | Error::TomlSerialize(_) => "config_format",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A computation that could not produce a value
///
/// These never fail a call: the value becomes `None` and the message is
/// added to the snapshot's warnings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Degraded {
    #[error("{0}")]
    DivisionUndefined(String),

    #[error("{0}")]
    DegenerateForecast(String),

    #[error("{0}")]
    InsufficientHistory(String),
}
