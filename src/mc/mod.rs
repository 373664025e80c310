//! Monte Carlo wealth simulation.
//!
//! The pipeline runs in five stages: deterministic per-iteration shock
//! streams ([`shocks`]), correlated geometric-Brownian path evolution with
//! cashflow and exit accounting ([`path`]), cross-sectional percentile
//! aggregation ([`aggregate`]), result assembly ([`result`]), and the
//! orchestrating [`engine`] that wires them together. Iterations are
//! independent and fan out across threads when the `parallel` feature is on;
//! determinism is preserved because every shock is a pure function of
//! `(seed, iteration, month)`.

pub mod aggregate;
pub mod engine;
pub mod path;
pub mod result;
pub mod shocks;

pub use aggregate::{aggregate, nearest_rank_index, AggregateOutput, PercentileBands};
pub use engine::SimulationEngine;
pub use path::{IterationOutcome, PathSimulator};
pub use result::{CashflowLogEntry, MonthlyLedgerRow, SimulationResult, SimulationSettings};
pub use shocks::{stream_seed, ShockGenerator, ShockSampler};
