//! Instrument, cashflow, and configuration types consumed at the engine boundary.
//!
//! All inputs are validated externally for monthly spacing and price positivity
//! before reaching the engine; the engine re-checks only what its own invariants
//! depend on (alignment, window length, configuration sanity).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::SimulationError;

/// One observation of an instrument's monthly price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    /// Quoted price; must be > 0.
    pub price: f64,
}

/// A catalog instrument with its aligned monthly price history. Immutable
/// during a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: String,
    pub asset_class: String,
    pub quotation_currency: String,
    /// Strictly increasing, gap-free monthly dates; all prices > 0.
    pub series: Vec<PricePoint>,
}

impl Instrument {
    pub fn new(
        id: impl Into<String>,
        asset_class: impl Into<String>,
        quotation_currency: impl Into<String>,
        series: Vec<PricePoint>,
    ) -> Self {
        Self {
            id: id.into(),
            asset_class: asset_class.into(),
            quotation_currency: quotation_currency.into(),
            series,
        }
    }
}

/// A scheduled cash movement. Positive amounts are contributions, negative
/// amounts are withdrawals. `target = None` addresses the un-invested cash
/// pool directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowEvent {
    /// Month index within the horizon; the flow takes effect at this wealth
    /// index (month 0 flows adjust the initial state).
    pub month_index: usize,
    pub amount: f64,
    /// Instrument id, or `None` for the cash pool. An unresolvable id
    /// degrades to a cash-pool flow with a recorded warning.
    pub target: Option<String>,
}

/// Distribution of the independent per-factor shocks.
///
/// Student-t with low degrees of freedom is the default: empirical market
/// crashes occur far more often than a Normal model predicts, and the raw
/// (non-standardized) draws keep the deliberately conservative tails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShockDistribution {
    Normal,
    #[serde(rename_all = "camelCase")]
    StudentT { degrees_of_freedom: f64 },
}

impl Default for ShockDistribution {
    fn default() -> Self {
        Self::StudentT {
            degrees_of_freedom: 5.0,
        }
    }
}

/// Full configuration of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Number of independent paths; must be >= 1.
    pub iterations: usize,
    /// Horizon length in months; output series have `horizon_months + 1` entries.
    pub horizon_months: usize,
    /// Master seed; per-iteration streams derive from `(seed, iteration)`.
    pub seed: u64,
    /// Un-invested cash balance at month 0.
    pub initial_cash: f64,
    /// Starting market value per instrument id. Every key must name a
    /// supplied instrument.
    pub initial_balances: BTreeMap<String, f64>,
    /// Month at which an instrument is liquidated into the realized bucket.
    pub exit_months: BTreeMap<String, usize>,
    /// Rebalancing period in months (annual by default). 0 disables it.
    pub rebalance_frequency_months: usize,
    /// Percentile levels reported per month, in percent.
    pub percentile_levels: Vec<u8>,
    /// Band level the monthly ledger is decomposed at.
    pub ledger_percentile: u8,
    /// Absolute net-flow magnitude above which a month enters the
    /// injection/withdrawal log.
    pub materiality_threshold: f64,
    pub shock_distribution: ShockDistribution,
    /// Project a non-PSD covariance estimate to the nearest PSD matrix
    /// instead of aborting.
    pub repair_covariance: bool,
}

impl SimulationConfig {
    /// Standard percentile levels reported by the planning UI.
    pub const DEFAULT_PERCENTILES: [u8; 7] = [5, 10, 25, 50, 75, 90, 95];

    pub fn new(iterations: usize, horizon_months: usize, seed: u64) -> Self {
        Self {
            iterations,
            horizon_months,
            seed,
            initial_cash: 0.0,
            initial_balances: BTreeMap::new(),
            exit_months: BTreeMap::new(),
            rebalance_frequency_months: 12,
            percentile_levels: Self::DEFAULT_PERCENTILES.to_vec(),
            ledger_percentile: 50,
            materiality_threshold: 1.0,
            shock_distribution: ShockDistribution::default(),
            repair_covariance: true,
        }
    }

    /// Validates invariants that must hold before any computation starts.
    pub fn validate(&self, instruments: &[Instrument]) -> Result<(), SimulationError> {
        if self.iterations == 0 {
            return Err(SimulationError::InvalidConfiguration(
                "iteration count must be >= 1".to_string(),
            ));
        }
        if !self.initial_cash.is_finite() {
            return Err(SimulationError::InvalidConfiguration(
                "initial cash must be finite".to_string(),
            ));
        }
        if !self.materiality_threshold.is_finite() || self.materiality_threshold < 0.0 {
            return Err(SimulationError::InvalidConfiguration(
                "materiality threshold must be finite and >= 0".to_string(),
            ));
        }
        if self.percentile_levels.is_empty() {
            return Err(SimulationError::InvalidConfiguration(
                "at least one percentile level is required".to_string(),
            ));
        }
        if self.percentile_levels.iter().any(|&p| p == 0 || p >= 100) {
            return Err(SimulationError::InvalidConfiguration(
                "percentile levels must lie in 1..=99".to_string(),
            ));
        }
        if !self.percentile_levels.contains(&self.ledger_percentile) {
            return Err(SimulationError::InvalidConfiguration(format!(
                "ledger percentile p{} is not among the configured levels",
                self.ledger_percentile
            )));
        }
        if let ShockDistribution::StudentT { degrees_of_freedom } = self.shock_distribution
            && (!degrees_of_freedom.is_finite() || degrees_of_freedom <= 2.0)
        {
            return Err(SimulationError::InvalidConfiguration(
                "Student-t degrees of freedom must be finite and > 2".to_string(),
            ));
        }

        for (id, balance) in &self.initial_balances {
            if !balance.is_finite() || *balance < 0.0 {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "initial balance for '{id}' must be finite and >= 0"
                )));
            }
            if !instruments.iter().any(|inst| inst.id == *id) {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "initial balance references unknown instrument '{id}'"
                )));
            }
        }
        for id in self.exit_months.keys() {
            if !instruments.iter().any(|inst| inst.id == *id) {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "exit month references unknown instrument '{id}'"
                )));
            }
        }

        Ok(())
    }
}
