//! Historical statistics estimation from aligned monthly price series.
//!
//! This is the first stage of the pipeline: per-instrument annualized mean
//! log-return and volatility, the pairwise covariance/correlation matrices,
//! and the per-instrument diagnostics table (history window, maximum drawdown
//! and its period) surfaced to reporting collaborators.
//!
//! Series arrive already aligned to a common monthly grid; truncating to the
//! shortest overlapping window is the catalog collaborator's responsibility.
//! The estimator verifies alignment and window length, nothing more.
//!
//! All moments are computed over the return count n (population form) and
//! annualized as mean ×12, volatility ×√12, covariance ×12.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::{Instrument, MIN_HISTORY_MONTHS, SimulationError};

/// Common historical window shared by every aligned series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Number of monthly price points (returns are one fewer).
    pub points: usize,
}

/// Per-instrument diagnostic statistics for the reporting table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentDiagnostics {
    pub id: String,
    pub asset_class: String,
    pub quotation_currency: String,
    /// Annualized mean log-return, as a fraction.
    pub mean_return_annual: f64,
    /// Annualized volatility of log-returns, as a fraction.
    pub volatility_annual: f64,
    /// Worst peak-to-trough decline over the window, as a non-positive fraction.
    pub max_drawdown: f64,
    /// Peak date of the maximum drawdown, when one occurred.
    pub drawdown_peak: Option<NaiveDate>,
    /// Trough date of the maximum drawdown, when one occurred.
    pub drawdown_trough: Option<NaiveDate>,
    pub history_points: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Estimation output consumed by the factorizer and the path simulator.
/// Computed once per run; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioStatistics {
    /// Instrument ids in matrix row/column order.
    pub instrument_ids: Vec<String>,
    /// Annualized mean log-returns per instrument.
    pub mean_returns_annual: Vec<f64>,
    /// Annualized volatilities per instrument.
    pub volatilities_annual: Vec<f64>,
    /// Annualized covariance matrix of monthly log-returns.
    pub covariance_annual: Vec<Vec<f64>>,
    /// Sample correlation matrix, unit diagonal.
    pub correlation: Vec<Vec<f64>>,
    pub window: HistoryWindow,
    pub diagnostics: Vec<InstrumentDiagnostics>,
}

/// Log-returns between consecutive monthly prices.
///
/// Non-positive or non-finite prices contribute a zero return; the catalog
/// validates positivity upstream and this guard only keeps estimation total.
pub fn log_returns(series: &[f64]) -> Vec<f64> {
    series
        .windows(2)
        .map(|w| {
            let (p0, p1) = (w[0], w[1]);
            if p0 > 0.0 && p1 > 0.0 && p0.is_finite() && p1.is_finite() {
                (p1 / p0).ln()
            } else {
                0.0
            }
        })
        .collect()
}

/// Maximum drawdown over a price series with the peak/trough dates of the
/// worst decline. Returns `(0.0, None, None)` for monotonically rising series.
pub fn max_drawdown(series: &[(NaiveDate, f64)]) -> (f64, Option<NaiveDate>, Option<NaiveDate>) {
    let Some(&(first_date, first_price)) = series.first() else {
        return (0.0, None, None);
    };

    let mut worst = 0.0_f64;
    let mut peak = first_price;
    let mut peak_date = first_date;
    let mut worst_peak = None;
    let mut worst_trough = None;

    for &(date, price) in series {
        if price > peak {
            peak = price;
            peak_date = date;
        } else if peak > 0.0 {
            let dd = (price - peak) / peak;
            if dd < worst {
                worst = dd;
                worst_peak = Some(peak_date);
                worst_trough = Some(date);
            }
        }
    }

    (worst, worst_peak, worst_trough)
}

/// Estimates drift, volatility, and the covariance/correlation matrices from
/// aligned monthly histories. Pure; fails fast on short or misaligned series.
pub fn estimate(instruments: &[Instrument]) -> Result<PortfolioStatistics, SimulationError> {
    if instruments.is_empty() {
        return Err(SimulationError::InvalidConfiguration(
            "at least one instrument is required".to_string(),
        ));
    }

    for inst in instruments {
        if inst.series.len() < MIN_HISTORY_MONTHS {
            return Err(SimulationError::InsufficientHistory {
                instrument_id: inst.id.clone(),
                points: inst.series.len(),
                required: MIN_HISTORY_MONTHS,
            });
        }
    }

    let reference = &instruments[0];
    for inst in &instruments[1..] {
        if inst.series.len() != reference.series.len() {
            return Err(SimulationError::MismatchedHistory(format!(
                "instrument '{}' has {} points, '{}' has {}",
                inst.id,
                inst.series.len(),
                reference.id,
                reference.series.len()
            )));
        }
        if let Some((pos, _)) = inst
            .series
            .iter()
            .zip(reference.series.iter())
            .enumerate()
            .find(|(_, (a, b))| a.date != b.date)
        {
            return Err(SimulationError::MismatchedHistory(format!(
                "instrument '{}' diverges from the common date grid at point {pos}",
                inst.id
            )));
        }
    }

    let n = instruments.len();
    let sample_size = reference.series.len() - 1;

    let returns: Vec<Vec<f64>> = instruments
        .iter()
        .map(|inst| {
            let prices: Vec<f64> = inst.series.iter().map(|p| p.price).collect();
            log_returns(&prices)
        })
        .collect();

    let means_monthly: Vec<f64> = returns
        .iter()
        .map(|r| r.iter().sum::<f64>() / sample_size as f64)
        .collect();

    let mut covariance_monthly = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let cov = returns[i]
                .iter()
                .zip(returns[j].iter())
                .map(|(a, b)| (a - means_monthly[i]) * (b - means_monthly[j]))
                .sum::<f64>()
                / sample_size as f64;
            covariance_monthly[i][j] = cov;
            covariance_monthly[j][i] = cov;
        }
    }

    let stdevs_monthly: Vec<f64> = (0..n).map(|i| covariance_monthly[i][i].sqrt()).collect();

    let mut correlation = vec![vec![0.0; n]; n];
    for i in 0..n {
        correlation[i][i] = 1.0;
        for j in 0..i {
            let denom = stdevs_monthly[i] * stdevs_monthly[j];
            let rho = if denom > 0.0 {
                (covariance_monthly[i][j] / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            correlation[i][j] = rho;
            correlation[j][i] = rho;
        }
    }

    let covariance_annual: Vec<Vec<f64>> = covariance_monthly
        .iter()
        .map(|row| row.iter().map(|c| c * 12.0).collect())
        .collect();
    let mean_returns_annual: Vec<f64> = means_monthly.iter().map(|m| m * 12.0).collect();
    let volatilities_annual: Vec<f64> = stdevs_monthly.iter().map(|s| s * 12.0_f64.sqrt()).collect();

    let window = HistoryWindow {
        start: reference.series[0].date,
        end: reference.series[reference.series.len() - 1].date,
        points: reference.series.len(),
    };

    let diagnostics = instruments
        .iter()
        .enumerate()
        .map(|(i, inst)| {
            let dated: Vec<(NaiveDate, f64)> =
                inst.series.iter().map(|p| (p.date, p.price)).collect();
            let (dd, dd_peak, dd_trough) = max_drawdown(&dated);
            InstrumentDiagnostics {
                id: inst.id.clone(),
                asset_class: inst.asset_class.clone(),
                quotation_currency: inst.quotation_currency.clone(),
                mean_return_annual: mean_returns_annual[i],
                volatility_annual: volatilities_annual[i],
                max_drawdown: dd,
                drawdown_peak: dd_peak,
                drawdown_trough: dd_trough,
                history_points: inst.series.len(),
                start_date: window.start,
                end_date: window.end,
            }
        })
        .collect();

    Ok(PortfolioStatistics {
        instrument_ids: instruments.iter().map(|i| i.id.clone()).collect(),
        mean_returns_annual,
        volatilities_annual,
        covariance_annual,
        correlation,
        window,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PricePoint;

    fn month(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018 + i as i32 / 12, 1 + (i % 12) as u32, 1).unwrap()
    }

    fn instrument_from_prices(id: &str, prices: &[f64]) -> Instrument {
        let series = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                date: month(i),
                price,
            })
            .collect();
        Instrument::new(id, "Equity", "CHF", series)
    }

    #[test]
    fn constant_prices_give_zero_drift_and_volatility() {
        let prices = vec![100.0; 30];
        let stats = estimate(&[instrument_from_prices("flat", &prices)]).unwrap();
        assert_eq!(stats.mean_returns_annual[0], 0.0);
        assert_eq!(stats.volatilities_annual[0], 0.0);
        assert_eq!(stats.covariance_annual[0][0], 0.0);
        assert_eq!(stats.correlation[0][0], 1.0);
    }

    #[test]
    fn constant_growth_gives_exact_drift_and_zero_volatility() {
        // 1% log-return per month.
        let r = 0.01_f64;
        let prices: Vec<f64> = (0..30).map(|i| 100.0 * (r * i as f64).exp()).collect();
        let stats = estimate(&[instrument_from_prices("steady", &prices)]).unwrap();
        assert!((stats.mean_returns_annual[0] - 0.12).abs() < 1.0e-10);
        assert!(stats.volatilities_annual[0] < 1.0e-9);
    }

    #[test]
    fn identical_series_are_perfectly_correlated() {
        let prices: Vec<f64> = (0..30)
            .map(|i| 100.0 + 10.0 * ((i % 5) as f64 - 2.0))
            .collect();
        let a = instrument_from_prices("a", &prices);
        let b = instrument_from_prices("b", &prices);
        let stats = estimate(&[a, b]).unwrap();
        assert!((stats.correlation[0][1] - 1.0).abs() < 1.0e-10);
        assert!(
            (stats.covariance_annual[0][1] - stats.covariance_annual[0][0]).abs() < 1.0e-12
        );
    }

    #[test]
    fn short_history_is_fatal() {
        let prices = vec![100.0; MIN_HISTORY_MONTHS - 1];
        let err = estimate(&[instrument_from_prices("short", &prices)]).unwrap_err();
        assert!(matches!(err, SimulationError::InsufficientHistory { .. }));
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let a = instrument_from_prices("a", &vec![100.0; 30]);
        let b = instrument_from_prices("b", &vec![100.0; 29]);
        let err = estimate(&[a, b]).unwrap_err();
        assert!(matches!(err, SimulationError::MismatchedHistory(_)));
    }

    #[test]
    fn date_grid_mismatch_is_fatal() {
        let a = instrument_from_prices("a", &vec![100.0; 30]);
        let mut b = instrument_from_prices("b", &vec![100.0; 30]);
        b.series[7].date = month(40);
        let err = estimate(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("point 7"));
    }

    #[test]
    fn volatility_annualization_is_sqrt_twelve() {
        // Alternating +/- 2% monthly log-returns around a flat mean.
        let mut price = 100.0_f64;
        let mut prices = vec![price];
        for i in 0..29 {
            let r: f64 = if i % 2 == 0 { 0.02 } else { -0.02 };
            price *= r.exp();
            prices.push(price);
        }
        let stats = estimate(&[instrument_from_prices("swing", &prices)]).unwrap();
        let monthly_std = (stats.covariance_annual[0][0] / 12.0).sqrt();
        assert!((stats.volatilities_annual[0] - monthly_std * 12.0_f64.sqrt()).abs() < 1.0e-12);
    }

    #[test]
    fn drawdown_tracks_worst_peak_to_trough() {
        let mut prices = vec![100.0; 10];
        prices.extend([120.0, 90.0, 95.0, 130.0, 70.0]);
        prices.extend(vec![140.0; 15]);
        let stats = estimate(&[instrument_from_prices("dd", &prices)]).unwrap();
        let diag = &stats.diagnostics[0];
        // Worst decline is 130 -> 70.
        assert!((diag.max_drawdown - (70.0 - 130.0) / 130.0).abs() < 1.0e-12);
        assert_eq!(diag.drawdown_peak, Some(month(13)));
        assert_eq!(diag.drawdown_trough, Some(month(14)));
    }
}
