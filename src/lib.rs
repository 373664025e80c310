//! Wealthsim is a stochastic multi-asset wealth simulation engine for long-horizon
//! financial planning: given instruments with historical monthly price series and a
//! schedule of future cash movements, it produces the distribution of possible wealth
//! trajectories under correlated Geometric Brownian Motion with fat-tailed shocks.
//!
//! The pipeline, leaves first:
//! - [`stats`] estimates annualized drift, volatility, and the covariance/correlation
//!   matrices from aligned historical log-returns.
//! - [`math::correlation`] factorizes the covariance matrix into a lower-triangular
//!   Cholesky factor, repairing non-PSD estimates by eigenvalue clipping when allowed.
//! - [`mc`] drives the simulation: per-iteration deterministic shock streams
//!   (Student-t by default, df = 5), the month-by-month path simulator with cashflow
//!   accounting, annual rebalancing and exit realization, the percentile aggregator,
//!   and the result assembler consumed by reporting collaborators.
//!
//! References used across modules:
//! - Glasserman (2004), *Monte Carlo Methods in Financial Engineering*, for
//!   correlated-path simulation and estimator design.
//! - Higham (2002) for nearest-PSD correlation repair.
//! - Hull, *Options, Futures, and Other Derivatives* (11th ed.), Ch. 14 for the
//!   discretized GBM update.
//!
//! Numerical considerations:
//! - Percentile bands are sampling-driven; iteration count controls their stability.
//! - Student-t shocks are deliberately heavier-tailed than the Normal model because
//!   empirical market crashes occur far more often than a Normal model predicts.
//! - Zero-volatility instruments degenerate to exact deterministic compounding, which
//!   the test suite exploits as a fixed-point verification.
//!
//! # Feature Flags
//! - `parallel` (default): enables Rayon-powered parallel iteration execution. Results
//!   are bitwise identical with or without it.
//!
//! # Quick Start
//! ```rust
//! use chrono::NaiveDate;
//! use wealthsim::core::{CashflowEvent, Instrument, PricePoint, SimulationConfig};
//! use wealthsim::mc::SimulationEngine;
//!
//! // A constant-price instrument: zero drift, zero volatility.
//! let series: Vec<PricePoint> = (0..36)
//!     .map(|m| PricePoint {
//!         date: NaiveDate::from_ymd_opt(2020 + m / 12, 1 + (m % 12) as u32, 1).unwrap(),
//!         price: 100.0,
//!     })
//!     .collect();
//! let instrument = Instrument::new("cash-fund", "MoneyMarket", "CHF", series);
//!
//! let mut config = SimulationConfig::new(1, 36, 42);
//! config.initial_balances.insert("cash-fund".to_string(), 0.0);
//!
//! let cashflows = vec![CashflowEvent {
//!     month_index: 12,
//!     amount: 45_000.0,
//!     target: Some("cash-fund".to_string()),
//! }];
//!
//! let result = SimulationEngine::new(config)
//!     .run(&[instrument], &cashflows)
//!     .expect("simulation succeeds");
//! assert_eq!(result.principal_path[12], 45_000.0);
//! ```

pub mod core;
pub mod math;
pub mod mc;
pub mod stats;

pub use crate::core::{
    CashflowEvent, Instrument, PricePoint, ShockDistribution, SimulationConfig, SimulationError,
    SimulationWarning,
};
pub use crate::mc::{SimulationEngine, SimulationResult};
