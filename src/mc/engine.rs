//! The orchestrating simulation engine.
//!
//! `SimulationEngine::run` wires the pipeline end to end: configuration
//! validation, historical estimation, covariance factorization (with optional
//! nearest-PSD repair), the embarrassingly-parallel iteration fan-out, the
//! aggregation barrier, and result assembly. Estimation and factorization
//! failures abort before any path is simulated; the returned result is always
//! fully valid.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{CashflowEvent, Instrument, SimulationConfig, SimulationError, SimulationWarning};
use crate::math::factorize_covariance;
use crate::mc::aggregate::aggregate;
use crate::mc::path::{IterationOutcome, PathSimulator};
use crate::mc::result::{self, SimulationResult};
use crate::mc::shocks::ShockSampler;
use crate::stats;

/// Stochastic multi-asset wealth simulation engine.
///
/// Holds the run configuration; instruments and cashflows are passed per run
/// and treated as immutable inputs.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: SimulationConfig,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Runs the full simulation and returns the assembled result.
    ///
    /// Matrices and diagnostics are ordered by instrument id regardless of the
    /// order instruments are supplied in.
    pub fn run(
        &self,
        instruments: &[Instrument],
        cashflows: &[CashflowEvent],
    ) -> Result<SimulationResult, SimulationError> {
        self.config.validate(instruments)?;

        let mut ordered: Vec<Instrument> = instruments.to_vec();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        for pair in ordered.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "duplicate instrument id '{}'",
                    pair[0].id
                )));
            }
        }

        let statistics = stats::estimate(&ordered)?;

        let mut warnings: Vec<SimulationWarning> = Vec::new();
        let (factor, repaired) =
            factorize_covariance(&statistics.covariance_annual, self.config.repair_covariance)?;
        if let Some(min_eigenvalue) = repaired {
            warnings.push(SimulationWarning::CovarianceRepaired { min_eigenvalue });
        }

        let sampler = ShockSampler::resolve(self.config.shock_distribution)?;
        let (simulator, flow_warnings) =
            PathSimulator::new(&statistics, &factor, &self.config, sampler, cashflows);
        warnings.extend(flow_warnings);

        let outcomes = self.run_iterations(&simulator);
        let aggregated = aggregate(
            &outcomes,
            &self.config.percentile_levels,
            self.config.ledger_percentile,
        );

        Ok(result::assemble(
            &self.config,
            statistics,
            aggregated,
            simulator.principal_path(),
            simulator.cash_path(),
            simulator.net_flow_by_month(),
            warnings,
        ))
    }

    /// Fans iterations out across the thread pool. Each iteration derives its
    /// shock stream from `(seed, iteration)`, so scheduling order cannot
    /// change the result.
    #[cfg(feature = "parallel")]
    fn run_iterations(&self, simulator: &PathSimulator<'_>) -> Vec<IterationOutcome> {
        (0..self.config.iterations)
            .into_par_iter()
            .map(|iteration| simulator.simulate_iteration(iteration))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn run_iterations(&self, simulator: &PathSimulator<'_>) -> Vec<IterationOutcome> {
        (0..self.config.iterations)
            .map(|iteration| simulator.simulate_iteration(iteration))
            .collect()
    }
}
