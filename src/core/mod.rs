//! Core domain types, configuration, and library-wide error/warning structures.

pub mod serialization;
pub mod types;

pub use serialization::{from_json, to_json, to_json_pretty};
pub use types::*;

/// Minimum number of monthly price points required for statistical estimation.
pub const MIN_HISTORY_MONTHS: usize = 24;

/// Fatal engine errors. Every variant is raised before any simulation work
/// begins; a returned result is always fully valid.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// An instrument's historical series is shorter than the minimum
    /// estimation window.
    InsufficientHistory {
        instrument_id: String,
        points: usize,
        required: usize,
    },
    /// Instrument series are not aligned to a common monthly grid.
    MismatchedHistory(String),
    /// The estimated covariance matrix is not positive semi-definite and
    /// repair was disabled by the caller.
    NonPositiveDefiniteCovariance {
        /// Most negative eigenvalue found in the estimate.
        min_eigenvalue: f64,
    },
    /// Non-positive iteration count, malformed balances, or similar.
    InvalidConfiguration(String),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientHistory {
                instrument_id,
                points,
                required,
            } => write!(
                f,
                "insufficient history for instrument '{instrument_id}': {points} monthly points, {required} required"
            ),
            Self::MismatchedHistory(msg) => write!(f, "mismatched history: {msg}"),
            Self::NonPositiveDefiniteCovariance { min_eigenvalue } => write!(
                f,
                "covariance matrix is not positive semi-definite (min eigenvalue {min_eigenvalue:e}) and repair is disabled"
            ),
            Self::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Recoverable conditions recorded on the result for audit. Warnings never
/// abort a run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SimulationWarning {
    /// A cashflow referenced an unknown instrument and was rerouted to the
    /// un-invested cash pool.
    #[serde(rename_all = "camelCase")]
    UnresolvedCashflowTarget {
        month_index: usize,
        amount: f64,
        target: String,
    },
    /// The covariance estimate was projected to the nearest positive
    /// semi-definite matrix before factorization.
    #[serde(rename_all = "camelCase")]
    CovarianceRepaired { min_eigenvalue: f64 },
}
