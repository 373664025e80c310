//! Month-by-month path simulation with cashflow accounting.
//!
//! One [`PathSimulator`] is built per run from the read-only estimation and
//! factorization outputs; every iteration then advances its own private state
//! through the horizon in strict month order:
//!
//! 1. discretized GBM update per instrument,
//!    `v ← v · exp((μ − ½σ²)·Δt + shock·√Δt)` with Δt = 1/12,
//! 2. scheduled cashflows (instrument-targeted or cash-pool),
//! 3. exit realization for instruments leaving the portfolio this month,
//! 4. rebalancing back to target weights on period boundaries,
//! 5. wealth recording: cash + invested market value + realized capital.
//!
//! The principal path and the cash-pool path carry no market performance, so
//! they are computed once, deterministically, outside the iteration loop.

use crate::core::{CashflowEvent, SimulationConfig, SimulationWarning};
use crate::math::CholeskyFactor;
use crate::mc::shocks::{ShockGenerator, ShockSampler};
use crate::stats::PortfolioStatistics;

const MONTHS_PER_YEAR: f64 = 12.0;

/// One iteration's full per-month series. Discarded after aggregation.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    /// Total wealth per month: cash + invested + realized.
    pub totals: Vec<f64>,
    /// Invested market value per month.
    pub invested: Vec<f64>,
    /// Cumulative realized (exited) capital per month.
    pub realized: Vec<f64>,
}

/// A cashflow resolved against the instrument order, `None` meaning the
/// un-invested cash pool.
#[derive(Debug, Clone, Copy)]
struct ResolvedFlow {
    instrument: Option<usize>,
    amount: f64,
}

/// Immutable per-run simulation context shared by all iterations.
#[derive(Debug)]
pub struct PathSimulator<'a> {
    factor: &'a CholeskyFactor,
    sampler: ShockSampler,
    seed: u64,
    horizon_months: usize,
    rebalance_frequency: usize,
    sqrt_dt: f64,
    /// `(μ − ½σ²)·Δt` per instrument, annualized inputs.
    drift_monthly: Vec<f64>,
    initial_values: Vec<f64>,
    initial_cash: f64,
    exit_month: Vec<Option<usize>>,
    /// Normalized target allocation; `None` when all initial balances are zero.
    target_weights: Option<Vec<f64>>,
    /// Scheduled flows per month index, 0..=horizon.
    buckets: Vec<Vec<ResolvedFlow>>,
    /// Net flow per month across all targets (principal increments).
    net_flow: Vec<f64>,
    /// Net cash-pool flow per month.
    cash_flow: Vec<f64>,
}

impl<'a> PathSimulator<'a> {
    /// Resolves cashflows and portfolio settings against the estimated
    /// statistics. Unresolvable cashflow targets degrade to cash-pool flows
    /// and are reported as warnings, never dropped.
    pub fn new(
        stats: &PortfolioStatistics,
        factor: &'a CholeskyFactor,
        config: &'a SimulationConfig,
        sampler: ShockSampler,
        cashflows: &[CashflowEvent],
    ) -> (Self, Vec<SimulationWarning>) {
        let n = stats.instrument_ids.len();
        let horizon = config.horizon_months;
        let dt = 1.0 / MONTHS_PER_YEAR;

        let drift_monthly: Vec<f64> = stats
            .mean_returns_annual
            .iter()
            .zip(stats.volatilities_annual.iter())
            .map(|(mu, sigma)| (mu - 0.5 * sigma * sigma) * dt)
            .collect();

        let initial_values: Vec<f64> = stats
            .instrument_ids
            .iter()
            .map(|id| config.initial_balances.get(id).copied().unwrap_or(0.0))
            .collect();

        let exit_month = stats
            .instrument_ids
            .iter()
            .map(|id| config.exit_months.get(id).copied())
            .collect();

        let weight_sum: f64 = initial_values.iter().sum();
        let target_weights = if weight_sum > 0.0 {
            Some(initial_values.iter().map(|v| v / weight_sum).collect())
        } else {
            None
        };

        let mut buckets = vec![Vec::new(); horizon + 1];
        let mut net_flow = vec![0.0; horizon + 1];
        let mut cash_flow = vec![0.0; horizon + 1];
        let mut warnings = Vec::new();

        for flow in cashflows {
            if flow.month_index > horizon {
                continue;
            }
            let instrument = match &flow.target {
                None => None,
                Some(id) => {
                    let index = stats.instrument_ids.iter().position(|known| known == id);
                    if index.is_none() {
                        warnings.push(SimulationWarning::UnresolvedCashflowTarget {
                            month_index: flow.month_index,
                            amount: flow.amount,
                            target: id.clone(),
                        });
                    }
                    index
                }
            };
            net_flow[flow.month_index] += flow.amount;
            if instrument.is_none() {
                cash_flow[flow.month_index] += flow.amount;
            }
            buckets[flow.month_index].push(ResolvedFlow {
                instrument,
                amount: flow.amount,
            });
        }

        debug_assert_eq!(drift_monthly.len(), n);

        (
            Self {
                factor,
                sampler,
                seed: config.seed,
                horizon_months: horizon,
                rebalance_frequency: config.rebalance_frequency_months,
                sqrt_dt: dt.sqrt(),
                drift_monthly,
                initial_values,
                initial_cash: config.initial_cash,
                exit_month,
                target_weights,
                buckets,
                net_flow,
                cash_flow,
            },
            warnings,
        )
    }

    /// Net scheduled flow per month, all targets combined.
    pub fn net_flow_by_month(&self) -> &[f64] {
        &self.net_flow
    }

    /// Cumulative nominal principal: initial invested balances plus net
    /// cashflows, with no market performance.
    pub fn principal_path(&self) -> Vec<f64> {
        let mut path = vec![0.0; self.horizon_months + 1];
        let mut principal: f64 = self.initial_values.iter().sum();
        for (t, flow) in self.net_flow.iter().enumerate() {
            principal += flow;
            path[t] = principal;
        }
        path
    }

    /// Deterministic cash-pool balance per month. The cash pool earns no
    /// market return, so this path is identical across iterations.
    pub fn cash_path(&self) -> Vec<f64> {
        let mut path = vec![0.0; self.horizon_months + 1];
        let mut cash = self.initial_cash;
        for (t, flow) in self.cash_flow.iter().enumerate() {
            cash += flow;
            path[t] = cash;
        }
        path
    }

    /// Runs one independent path. Depends only on shared read-only state and
    /// the iteration's private shock stream, so callers may fan iterations
    /// out across threads freely.
    pub fn simulate_iteration(&self, iteration: usize) -> IterationOutcome {
        let n = self.drift_monthly.len();
        let horizon = self.horizon_months;
        let mut generator = ShockGenerator::for_iteration(self.seed, iteration, self.sampler.clone());

        let mut indep = vec![0.0; n];
        let mut shocks = vec![0.0; n];
        let mut values = self.initial_values.clone();
        let mut cash = self.initial_cash;
        let mut realized_total = 0.0;

        let mut totals = vec![0.0; horizon + 1];
        let mut invested = vec![0.0; horizon + 1];
        let mut realized = vec![0.0; horizon + 1];

        self.apply_flows(0, &mut values, &mut cash);
        self.apply_exits(0, &mut values, &mut realized_total);
        record(0, &values, cash, realized_total, &mut totals, &mut invested, &mut realized);

        for t in 1..=horizon {
            generator.fill_independent(&mut indep);
            self.factor.correlate(&indep, &mut shocks);
            for (value, (drift, shock)) in values
                .iter_mut()
                .zip(self.drift_monthly.iter().zip(shocks.iter()))
            {
                *value *= (drift + shock * self.sqrt_dt).exp();
            }

            self.apply_flows(t, &mut values, &mut cash);
            self.apply_exits(t, &mut values, &mut realized_total);

            if self.rebalance_frequency > 0 && t % self.rebalance_frequency == 0 {
                self.rebalance(t, &mut values);
            }

            record(t, &values, cash, realized_total, &mut totals, &mut invested, &mut realized);
        }

        IterationOutcome {
            totals,
            invested,
            realized,
        }
    }

    fn apply_flows(&self, month: usize, values: &mut [f64], cash: &mut f64) {
        for flow in &self.buckets[month] {
            match flow.instrument {
                Some(i) => values[i] += flow.amount,
                None => *cash += flow.amount,
            }
        }
    }

    fn apply_exits(&self, month: usize, values: &mut [f64], realized: &mut f64) {
        for (value, exit) in values.iter_mut().zip(self.exit_month.iter()) {
            if *exit == Some(month) {
                *realized += *value;
                *value = 0.0;
            }
        }
    }

    /// Redistributes the invested value across non-exited instruments in
    /// proportion to their target weights. No transaction cost is modeled.
    fn rebalance(&self, month: usize, values: &mut [f64]) {
        let Some(weights) = &self.target_weights else {
            return;
        };

        let mut active_weight = 0.0;
        let mut total = 0.0;
        for i in 0..values.len() {
            if self.exited_by(i, month) {
                continue;
            }
            active_weight += weights[i];
            total += values[i];
        }
        if active_weight <= 0.0 {
            return;
        }

        for i in 0..values.len() {
            if self.exited_by(i, month) {
                continue;
            }
            values[i] = total * weights[i] / active_weight;
        }
    }

    fn exited_by(&self, instrument: usize, month: usize) -> bool {
        self.exit_month[instrument].is_some_and(|m| m <= month)
    }
}

#[allow(clippy::too_many_arguments)]
fn record(
    month: usize,
    values: &[f64],
    cash: f64,
    realized_total: f64,
    totals: &mut [f64],
    invested: &mut [f64],
    realized: &mut [f64],
) {
    let market: f64 = values.iter().sum();
    invested[month] = market;
    realized[month] = realized_total;
    totals[month] = cash + market + realized_total;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Instrument, PricePoint, SimulationConfig};
    use crate::math::factorize_covariance;
    use crate::stats;
    use chrono::NaiveDate;

    fn month(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018 + i as i32 / 12, 1 + (i % 12) as u32, 1).unwrap()
    }

    fn flat_instrument(id: &str) -> Instrument {
        let series = (0..30)
            .map(|i| PricePoint {
                date: month(i),
                price: 100.0,
            })
            .collect();
        Instrument::new(id, "Equity", "CHF", series)
    }

    fn run_single(
        instruments: &[Instrument],
        config: &SimulationConfig,
        cashflows: &[CashflowEvent],
    ) -> (IterationOutcome, Vec<f64>, Vec<f64>, Vec<SimulationWarning>) {
        let stats = stats::estimate(instruments).unwrap();
        let (factor, _) = factorize_covariance(&stats.covariance_annual, true).unwrap();
        let sampler = ShockSampler::resolve(config.shock_distribution).unwrap();
        let (simulator, warnings) = PathSimulator::new(&stats, &factor, config, sampler, cashflows);
        let outcome = simulator.simulate_iteration(0);
        let principal = simulator.principal_path();
        let cash = simulator.cash_path();
        (outcome, principal, cash, warnings)
    }

    #[test]
    fn degenerate_path_equals_principal_exactly() {
        let instruments = vec![flat_instrument("flat")];
        let mut config = SimulationConfig::new(1, 36, 42);
        config.initial_balances.insert("flat".to_string(), 0.0);
        let cashflows = vec![CashflowEvent {
            month_index: 12,
            amount: 45_000.0,
            target: Some("flat".to_string()),
        }];

        let (outcome, principal, _, warnings) = run_single(&instruments, &config, &cashflows);
        assert!(warnings.is_empty());
        assert_eq!(outcome.totals, principal);
        assert_eq!(principal[11], 0.0);
        assert_eq!(principal[12], 45_000.0);
        assert_eq!(principal[36], 45_000.0);
    }

    #[test]
    fn principal_increment_equals_scheduled_flows() {
        let instruments = vec![flat_instrument("a")];
        let mut config = SimulationConfig::new(1, 24, 7);
        config.initial_balances.insert("a".to_string(), 10_000.0);
        let cashflows = vec![
            CashflowEvent {
                month_index: 3,
                amount: 1_200.0,
                target: Some("a".to_string()),
            },
            CashflowEvent {
                month_index: 3,
                amount: -200.0,
                target: None,
            },
            CashflowEvent {
                month_index: 9,
                amount: -3_000.0,
                target: Some("a".to_string()),
            },
        ];

        let (_, principal, _, _) = run_single(&instruments, &config, &cashflows);
        assert_eq!(principal[0], 10_000.0);
        assert_eq!(principal[3] - principal[2], 1_000.0);
        assert_eq!(principal[9] - principal[8], -3_000.0);
        assert_eq!(principal[24], 8_000.0);
    }

    #[test]
    fn unresolved_target_degrades_to_cash_with_warning() {
        let instruments = vec![flat_instrument("known")];
        let mut config = SimulationConfig::new(1, 12, 5);
        config.initial_cash = 1_000.0;
        let cashflows = vec![CashflowEvent {
            month_index: 4,
            amount: 500.0,
            target: Some("unknown".to_string()),
        }];

        let (outcome, _, cash, warnings) = run_single(&instruments, &config, &cashflows);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            SimulationWarning::UnresolvedCashflowTarget { month_index: 4, .. }
        ));
        assert_eq!(cash[3], 1_000.0);
        assert_eq!(cash[4], 1_500.0);
        assert_eq!(outcome.totals[12], 1_500.0);
    }

    #[test]
    fn exit_moves_value_into_realized_bucket() {
        let instruments = vec![flat_instrument("leaver"), flat_instrument("stayer")];
        let mut config = SimulationConfig::new(1, 24, 11);
        config.initial_balances.insert("leaver".to_string(), 4_000.0);
        config.initial_balances.insert("stayer".to_string(), 6_000.0);
        config.exit_months.insert("leaver".to_string(), 10);
        // Keep the exited instrument out of the annual rebalance entirely.
        let (outcome, _, _, _) = run_single(&instruments, &config, &[]);

        assert_eq!(outcome.realized[9], 0.0);
        assert_eq!(outcome.realized[10], 4_000.0);
        assert_eq!(outcome.invested[10], 6_000.0);
        assert_eq!(outcome.totals[24], 10_000.0);
        assert_eq!(outcome.realized[24], 4_000.0);
    }

    #[test]
    fn month_zero_flows_adjust_the_initial_state() {
        let instruments = vec![flat_instrument("a")];
        let mut config = SimulationConfig::new(1, 6, 3);
        config.initial_cash = 100.0;
        let cashflows = vec![
            CashflowEvent {
                month_index: 0,
                amount: 2_000.0,
                target: Some("a".to_string()),
            },
            CashflowEvent {
                month_index: 0,
                amount: 50.0,
                target: None,
            },
        ];

        let (outcome, principal, cash, _) = run_single(&instruments, &config, &cashflows);
        assert_eq!(principal[0], 2_050.0);
        assert_eq!(cash[0], 150.0);
        assert_eq!(outcome.totals[0], 2_150.0);
    }

    #[test]
    fn flows_beyond_the_horizon_are_ignored() {
        let instruments = vec![flat_instrument("a")];
        let config = SimulationConfig::new(1, 6, 3);
        let cashflows = vec![CashflowEvent {
            month_index: 7,
            amount: 1.0e9,
            target: None,
        }];
        let (outcome, principal, _, warnings) = run_single(&instruments, &config, &cashflows);
        assert!(warnings.is_empty());
        assert_eq!(principal[6], 0.0);
        assert_eq!(outcome.totals[6], 0.0);
    }
}
