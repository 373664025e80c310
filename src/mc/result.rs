//! Result assembly: the read-only payload handed to reporting collaborators.
//!
//! Pure transformation of upstream outputs; nothing is recomputed here. The
//! monthly ledger is decomposed from the same path-simulator state as the
//! percentile bands, so its rows stay internally consistent
//! (`total = cash + invested + realized`, `yield = delta − net flow`).

use serde::{Deserialize, Serialize};

use crate::core::{ShockDistribution, SimulationConfig, SimulationWarning};
use crate::mc::aggregate::{AggregateOutput, PercentileBands};
use crate::stats::{HistoryWindow, InstrumentDiagnostics, PortfolioStatistics};

/// One materially-sized net cash movement, for the injection/withdrawal log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowLogEntry {
    pub month_index: usize,
    pub amount: f64,
}

/// One row of the derived monthly ledger consumed by the tabular UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyLedgerRow {
    pub month_index: usize,
    /// Total wealth at the ledger percentile.
    pub total_wealth: f64,
    /// Wealth change versus the prior month (0 at month 0).
    pub wealth_delta: f64,
    /// Net scheduled income-minus-expense flow this month.
    pub net_flow: f64,
    /// Un-invested cash pool balance.
    pub cash_balance: f64,
    /// Invested market value.
    pub invested_value: f64,
    /// Cumulative realized (exited) capital.
    pub realized_value: f64,
    /// Market-driven part of the wealth change: delta minus net flow.
    pub investment_yield: f64,
}

/// Echo of the effective run settings, for audit display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSettings {
    pub iterations: usize,
    pub horizon_months: usize,
    pub seed: u64,
    pub rebalance_frequency_months: usize,
    pub ledger_percentile: u8,
    pub materiality_threshold: f64,
    pub shock_distribution: ShockDistribution,
}

/// Full output of a simulation run. Either fully valid or never returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Total-wealth percentile band series keyed by level.
    pub percentiles: PercentileBands,
    /// Nominal invested principal per month, no market performance.
    pub principal_path: Vec<f64>,
    /// Deterministic cash-pool balance per month.
    pub cash_path: Vec<f64>,
    /// Months whose net flow magnitude met the materiality threshold.
    pub injections: Vec<CashflowLogEntry>,
    /// Derived monthly ledger at the configured percentile.
    pub ledger: Vec<MonthlyLedgerRow>,
    /// Per-instrument historical diagnostics, in matrix order.
    pub instrument_diagnostics: Vec<InstrumentDiagnostics>,
    /// Sample correlation matrix, instrument-id order.
    pub correlation: Vec<Vec<f64>>,
    /// Annualized covariance matrix, instrument-id order.
    pub covariance_annual: Vec<Vec<f64>>,
    /// Common historical window used for estimation.
    pub window: HistoryWindow,
    /// Recoverable conditions recorded during the run.
    pub warnings: Vec<SimulationWarning>,
    pub settings: SimulationSettings,
}

/// Packages the upstream outputs into the caller-facing result.
pub(crate) fn assemble(
    config: &SimulationConfig,
    stats: PortfolioStatistics,
    aggregated: AggregateOutput,
    principal_path: Vec<f64>,
    cash_path: Vec<f64>,
    net_flow: &[f64],
    warnings: Vec<SimulationWarning>,
) -> SimulationResult {
    let injections = net_flow
        .iter()
        .enumerate()
        .filter(|(_, flow)| flow.abs() >= config.materiality_threshold && **flow != 0.0)
        .map(|(month_index, &amount)| CashflowLogEntry {
            month_index,
            amount,
        })
        .collect();

    let ledger = (0..aggregated.ledger_total.len())
        .map(|t| {
            let total_wealth = aggregated.ledger_total[t];
            let wealth_delta = if t == 0 {
                0.0
            } else {
                total_wealth - aggregated.ledger_total[t - 1]
            };
            let flow = if t == 0 { 0.0 } else { net_flow[t] };
            MonthlyLedgerRow {
                month_index: t,
                total_wealth,
                wealth_delta,
                net_flow: net_flow[t],
                cash_balance: cash_path[t],
                invested_value: aggregated.ledger_invested[t],
                realized_value: aggregated.ledger_realized[t],
                investment_yield: wealth_delta - flow,
            }
        })
        .collect();

    SimulationResult {
        percentiles: aggregated.bands,
        principal_path,
        cash_path,
        injections,
        ledger,
        instrument_diagnostics: stats.diagnostics,
        correlation: stats.correlation,
        covariance_annual: stats.covariance_annual,
        window: stats.window,
        warnings,
        settings: SimulationSettings {
            iterations: config.iterations,
            horizon_months: config.horizon_months,
            seed: config.seed,
            rebalance_frequency_months: config.rebalance_frequency_months,
            ledger_percentile: config.ledger_percentile,
            materiality_threshold: config.materiality_threshold,
            shock_distribution: config.shock_distribution,
        },
    }
}
