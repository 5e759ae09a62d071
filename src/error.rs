use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StockLedgerError {
    #[error("Unknown report kind '{0}'")]
    UnknownReportKind(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ledger imbalance for {key}: opening {opening_bags} + deltas {delta_bags} != closing {closing_bags} bags (quintals {opening_qtls:.2} + {delta_qtls:.2} != {closing_qtls:.2})")]
    LedgerImbalance {
        key: String,
        opening_bags: i64,
        delta_bags: i64,
        closing_bags: i64,
        opening_qtls: f64,
        delta_qtls: f64,
        closing_qtls: f64,
    },

    #[error("Report run cancelled after {processed} records")]
    Cancelled { processed: usize },

    #[error("Could not deliver '{filename}': all export methods failed ({}). Please try again or use a different environment.", summarize_failures(.failures))]
    DeliveryFailed {
        filename: String,
        failures: Vec<TierFailure>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// One delivery mechanism that raised while exporting a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierFailure {
    pub tier: &'static str,
    pub reason: String,
}

impl std::fmt::Display for TierFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.tier, self.reason)
    }
}

fn summarize_failures(failures: &[TierFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, StockLedgerError>;
