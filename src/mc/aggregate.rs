//! Cross-sectional percentile aggregation.
//!
//! Percentiles are computed independently per month over the full population
//! of iteration totals, after every iteration has finished: this is a hard
//! barrier, not a streaming reduction, because rank selection needs the whole
//! cross-section. Selection uses nearest-rank indexing `⌊p·(n−1)⌋` on the
//! sorted totals, so within a month the bands are non-decreasing in `p` by
//! construction rather than by post-hoc clamping.

use std::collections::BTreeMap;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::mc::path::IterationOutcome;

/// Percentile band series keyed by level, each of horizon+1 entries.
///
/// Serializes as `{"p5": [...], ..., "p95": [...]}` for reporting consumers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PercentileBands {
    by_level: BTreeMap<u8, Vec<f64>>,
}

impl PercentileBands {
    /// Configured levels in ascending order.
    pub fn levels(&self) -> impl Iterator<Item = u8> + '_ {
        self.by_level.keys().copied()
    }

    /// The band series for one level, if configured.
    pub fn band(&self, level: u8) -> Option<&[f64]> {
        self.by_level.get(&level).map(Vec::as_slice)
    }
}

impl Serialize for PercentileBands {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.by_level.len()))?;
        for (level, series) in &self.by_level {
            map.serialize_entry(&format!("p{level}"), series)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PercentileBands {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BandsVisitor;

        impl<'de> Visitor<'de> for BandsVisitor {
            type Value = PercentileBands;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of pNN keys to number arrays")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut by_level = BTreeMap::new();
                while let Some((key, series)) = access.next_entry::<String, Vec<f64>>()? {
                    let level = key
                        .strip_prefix('p')
                        .and_then(|digits| digits.parse::<u8>().ok())
                        .ok_or_else(|| {
                            serde::de::Error::custom(format!("invalid percentile key '{key}'"))
                        })?;
                    by_level.insert(level, series);
                }
                Ok(PercentileBands { by_level })
            }
        }

        deserializer.deserialize_map(BandsVisitor)
    }
}

/// Aggregation output: total-wealth bands plus the rank-consistent ledger
/// decomposition at the configured ledger level.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutput {
    pub bands: PercentileBands,
    /// Total wealth at the ledger percentile (equals that band).
    pub ledger_total: Vec<f64>,
    /// Invested market value of the rank-selected iteration per month.
    pub ledger_invested: Vec<f64>,
    /// Realized capital of the rank-selected iteration per month.
    pub ledger_realized: Vec<f64>,
}

/// Nearest-rank index for level `p` (percent) over `n` sorted samples.
#[inline]
pub fn nearest_rank_index(level: u8, n: usize) -> usize {
    debug_assert!(n > 0);
    ((level as f64 / 100.0) * (n - 1) as f64).floor() as usize
}

/// Computes per-month percentile bands over the iteration population.
///
/// For each month the iterations are ranked by total wealth; band values are
/// rank selections from that order, and the ledger decomposition reuses the
/// single iteration sitting at the ledger rank so that
/// `total = cash + invested + realized` holds row by row.
pub fn aggregate(
    outcomes: &[IterationOutcome],
    levels: &[u8],
    ledger_level: u8,
) -> AggregateOutput {
    assert!(!outcomes.is_empty(), "aggregation requires iterations");
    let months = outcomes[0].totals.len();
    let n = outcomes.len();

    let mut by_level: BTreeMap<u8, Vec<f64>> = levels
        .iter()
        .map(|&level| (level, vec![0.0; months]))
        .collect();
    let mut ledger_total = vec![0.0; months];
    let mut ledger_invested = vec![0.0; months];
    let mut ledger_realized = vec![0.0; months];

    // (total, iteration) pairs; the index breaks ties deterministically.
    let mut ranked: Vec<(f64, usize)> = vec![(0.0, 0); n];

    for month in 0..months {
        for (k, outcome) in outcomes.iter().enumerate() {
            ranked[k] = (outcome.totals[month], k);
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (&level, series) in by_level.iter_mut() {
            series[month] = ranked[nearest_rank_index(level, n)].0;
        }

        let (total, iteration) = ranked[nearest_rank_index(ledger_level, n)];
        ledger_total[month] = total;
        ledger_invested[month] = outcomes[iteration].invested[month];
        ledger_realized[month] = outcomes[iteration].realized[month];
    }

    AggregateOutput {
        bands: PercentileBands { by_level },
        ledger_total,
        ledger_invested,
        ledger_realized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(totals: Vec<f64>) -> IterationOutcome {
        let months = totals.len();
        IterationOutcome {
            invested: totals.clone(),
            realized: vec![0.0; months],
            totals,
        }
    }

    #[test]
    fn nearest_rank_uses_floor_indexing() {
        assert_eq!(nearest_rank_index(50, 4), 1);
        assert_eq!(nearest_rank_index(50, 5), 2);
        assert_eq!(nearest_rank_index(5, 100), 4);
        assert_eq!(nearest_rank_index(95, 100), 94);
        assert_eq!(nearest_rank_index(95, 1), 0);
    }

    #[test]
    fn bands_are_monotone_in_level() {
        let outcomes: Vec<IterationOutcome> = (0..101)
            .map(|k| outcome(vec![(101 - k) as f64, k as f64 * k as f64]))
            .collect();
        let out = aggregate(&outcomes, &[5, 10, 25, 50, 75, 90, 95], 50);

        for month in 0..2 {
            let series: Vec<f64> = out
                .bands
                .levels()
                .map(|level| out.bands.band(level).unwrap()[month])
                .collect();
            assert!(series.windows(2).all(|w| w[0] <= w[1]), "month {month}: {series:?}");
        }
    }

    #[test]
    fn single_iteration_collapses_every_band() {
        let outcomes = vec![outcome(vec![1.0, 2.0, 3.0])];
        let out = aggregate(&outcomes, &[5, 50, 95], 50);
        for level in [5, 50, 95] {
            assert_eq!(out.bands.band(level).unwrap(), &[1.0, 2.0, 3.0]);
        }
        assert_eq!(out.ledger_total, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn ledger_decomposition_comes_from_the_rank_selected_iteration() {
        let low = IterationOutcome {
            totals: vec![10.0],
            invested: vec![4.0],
            realized: vec![6.0],
        };
        let high = IterationOutcome {
            totals: vec![20.0],
            invested: vec![15.0],
            realized: vec![5.0],
        };
        // With two samples the floor rule lands every level below p100 on
        // index 0; the decomposition must come from that same iteration.
        assert_eq!(nearest_rank_index(95, 2), 0);
        let out = aggregate(&[low, high], &[5, 95], 95);
        assert_eq!(out.ledger_total, vec![10.0]);
        assert_eq!(out.ledger_invested, vec![4.0]);
        assert_eq!(out.ledger_realized, vec![6.0]);
    }

    #[test]
    fn ledger_follows_the_selected_iteration_across_ranks() {
        let outcomes: Vec<IterationOutcome> = (0..20)
            .map(|k| IterationOutcome {
                totals: vec![10.0 * k as f64],
                invested: vec![7.0 * k as f64],
                realized: vec![3.0 * k as f64],
            })
            .collect();

        // ⌊0.95·19⌋ = 18: the second-highest iteration carries the ledger.
        let out = aggregate(&outcomes, &[50, 95], 95);
        assert_eq!(out.ledger_total, vec![180.0]);
        assert_eq!(out.ledger_invested, vec![126.0]);
        assert_eq!(out.ledger_realized, vec![54.0]);
    }

    #[test]
    fn bands_serialize_with_pnn_keys() {
        let outcomes = vec![outcome(vec![1.0])];
        let out = aggregate(&outcomes, &[5, 50], 50);
        let json = serde_json::to_string(&out.bands).unwrap();
        assert_eq!(json, r#"{"p5":[1.0],"p50":[1.0]}"#);
        let decoded: PercentileBands = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, out.bands);
    }
}
