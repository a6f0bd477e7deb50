//! Minute rounding, 30-minute thinning and differencing of cumulative usage
//! counters.
//!
//! The `normalUsage` channel defines the output grid:
//!
//! 1. records are coerced and stable-sorted by `generatedTime`;
//! 2. each record is rounded to a civil minute and the first record of a
//!    minute opens that bucket (later ones are ignored);
//! 3. bucket keys are walked in ascending order and a key is kept when it is
//!    the first or lies at least 30 minutes after the last kept key, so the
//!    grid is anchored at the earliest sample rather than at wall-clock
//!    half hours;
//! 4. each kept sample's difference is taken against the previous kept
//!    sample, whatever the actual gap.
//!
//! `reverseUsage` never adds samples. Its records are rounded the same way
//! with the last record of a minute winning, then looked up by exact
//! `roundTime` for each kept sample.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, info};
use usage_core::models::{coerce_records, RoundedSample, UsageRecord};
use usage_core::time_utils::CivilClock;
use usage_core::{Result, UsageError};

/// Minimum spacing between kept samples.
pub const SAMPLE_INTERVAL_MS: i64 = 30 * 60 * 1_000;

// ── NormalizedSeries ──────────────────────────────────────────────────────────

/// Output of one normalisation run.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub samples: Vec<RoundedSample>,
    pub stats: NormalizeStats,
}

impl NormalizedSeries {
    /// True when at least one sample carries a reverse-usage value.
    pub fn has_reverse_usage(&self) -> bool {
        self.samples.iter().any(|s| s.reverse_cumulative.is_some())
    }
}

/// Counters describing what a run kept and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub normal_dropped: usize,
    pub reverse_dropped: usize,
    /// Distinct minute buckets from `normalUsage` before thinning.
    pub normal_buckets: usize,
    /// Distinct minute buckets from `reverseUsage`.
    pub reverse_buckets: usize,
    pub kept: usize,
}

// ── Thinning ──────────────────────────────────────────────────────────────────

/// Greedy thinning of ascending keys: keep the first key and every key at
/// least [`SAMPLE_INTERVAL_MS`] after the last kept one.
pub fn thin_keys<I>(sorted_keys: I) -> Vec<i64>
where
    I: IntoIterator<Item = i64>,
{
    let mut kept: Vec<i64> = Vec::new();
    for key in sorted_keys {
        match kept.last() {
            Some(&last) if key - last < SAMPLE_INTERVAL_MS => {}
            _ => kept.push(key),
        }
    }
    kept
}

// ── UsageNormalizer ───────────────────────────────────────────────────────────

/// Turns merged raw channel arrays into a thinned [`RoundedSample`] series.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageNormalizer {
    clock: CivilClock,
}

impl UsageNormalizer {
    pub fn new(clock: CivilClock) -> Self {
        Self { clock }
    }

    /// Normalise `normal_usage`, filling reverse-usage columns from
    /// `reverse_usage` (which may be empty).
    ///
    /// Records with a `generatedTime` outside the calendar range are dropped
    /// during coercion like any other malformed record. Fails with
    /// [`UsageError::EmptyNormalUsage`] when no `normal_usage` record
    /// survives.
    pub fn normalize(
        &self,
        normal_usage: &[Value],
        reverse_usage: &[Value],
    ) -> Result<NormalizedSeries> {
        let mut stats = NormalizeStats::default();

        let (normal, dropped) = sorted_records(normal_usage);
        stats.normal_dropped = dropped;
        if normal.is_empty() {
            return Err(UsageError::EmptyNormalUsage);
        }

        // First record per minute wins.
        let mut buckets: BTreeMap<i64, UsageRecord> = BTreeMap::new();
        for record in &normal {
            let round_time = self.clock.round_to_minute(record.generated_time)?;
            buckets.entry(round_time).or_insert(*record);
        }
        stats.normal_buckets = buckets.len();
        debug!(
            "normalUsage: {} records, {} dropped, {} distinct minutes",
            normal.len(),
            stats.normal_dropped,
            stats.normal_buckets
        );

        let mut samples = Vec::new();
        for round_time in thin_keys(buckets.keys().copied()) {
            let record = &buckets[&round_time];
            samples.push(RoundedSample::new(
                &self.clock,
                record.generated_time,
                round_time,
                record.value,
            )?);
        }
        stats.kept = samples.len();

        for i in 1..samples.len() {
            samples[i].normal_difference =
                samples[i].normal_cumulative - samples[i - 1].normal_cumulative;
        }

        if !reverse_usage.is_empty() {
            let (reverse, dropped) = sorted_records(reverse_usage);
            stats.reverse_dropped = dropped;

            // Last record per minute wins.
            let mut by_minute: HashMap<i64, f64> = HashMap::with_capacity(reverse.len());
            for record in &reverse {
                let round_time = self.clock.round_to_minute(record.generated_time)?;
                by_minute.insert(round_time, record.value);
            }
            stats.reverse_buckets = by_minute.len();

            for sample in samples.iter_mut() {
                sample.reverse_cumulative = by_minute.get(&sample.round_time).copied();
            }
            fill_reverse_differences(&mut samples);
        }

        info!(
            "Normalised {} samples from {} minute buckets ({} reverse buckets)",
            stats.kept, stats.normal_buckets, stats.reverse_buckets
        );

        Ok(NormalizedSeries { samples, stats })
    }
}

/// Coerce `raw` and stable-sort the usable records by `generatedTime`.
fn sorted_records(raw: &[Value]) -> (Vec<UsageRecord>, usize) {
    let (mut records, dropped) = coerce_records(raw);
    records.sort_by_key(|r| r.generated_time);
    (records, dropped)
}

/// Difference against the immediately preceding sample; `0` where the chain
/// starts or restarts after a gap, `None` where there is no value.
fn fill_reverse_differences(samples: &mut [RoundedSample]) {
    let mut previous: Option<f64> = None;
    for sample in samples.iter_mut() {
        sample.reverse_difference = match (sample.reverse_cumulative, previous) {
            (None, _) => None,
            (Some(_), None) => Some(0.0),
            (Some(current), Some(prev)) => Some(current - prev),
        };
        previous = sample.reverse_cumulative;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 2024-05-01 03:00:00 Asia/Tokyo.
    const T0: i64 = 1_714_500_000_000;
    const MIN: i64 = 60_000;

    fn rec(t: i64, v: f64) -> Value {
        json!({"generatedTime": t, "value": v})
    }

    fn normalizer() -> UsageNormalizer {
        UsageNormalizer::new(CivilClock::from_name("Asia/Tokyo"))
    }

    // ── thin_keys ─────────────────────────────────────────────────────────────

    #[test]
    fn test_thin_keys_anchors_at_first_key() {
        let keys = [0, 10 * MIN, 29 * MIN, 30 * MIN, 45 * MIN, 61 * MIN, 90 * MIN];
        assert_eq!(thin_keys(keys), vec![0, 30 * MIN, 61 * MIN]);
    }

    #[test]
    fn test_thin_keys_empty() {
        assert!(thin_keys(Vec::<i64>::new()).is_empty());
    }

    // ── normalize: normalUsage ────────────────────────────────────────────────

    #[test]
    fn test_collapses_same_minute_and_keeps_half_hour_gap() {
        let normal = vec![
            rec(1_714_500_000_000, 10.0),
            rec(1_714_500_029_000, 10.0),
            rec(1_714_501_830_000, 25.0),
        ];
        let series = normalizer().normalize(&normal, &[]).unwrap();

        let cumulative: Vec<f64> = series.samples.iter().map(|s| s.normal_cumulative).collect();
        let difference: Vec<f64> = series.samples.iter().map(|s| s.normal_difference).collect();
        assert_eq!(cumulative, [10.0, 25.0]);
        assert_eq!(difference, [0.0, 15.0]);
        assert_eq!(series.samples[0].round_time, T0);
        assert_eq!(series.samples[1].round_time, 1_714_501_860_000);
        assert_eq!(series.samples[0].formatted_time(), "2024/05/01 03:00:00");
        assert_eq!(series.stats.normal_buckets, 2);
        assert!(!series.has_reverse_usage());
    }

    #[test]
    fn test_first_record_in_minute_wins_after_sorting() {
        // Input order is reversed; the earliest generatedTime still wins.
        let normal = vec![rec(T0 + 20_000, 7.0), rec(T0 + 5_000, 3.0)];
        let series = normalizer().normalize(&normal, &[]).unwrap();
        assert_eq!(series.samples.len(), 1);
        assert_eq!(series.samples[0].generated_time, T0 + 5_000);
        assert_eq!(series.samples[0].normal_cumulative, 3.0);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let normal = vec![rec(T0, 1.0), rec(T0, 2.0)];
        let series = normalizer().normalize(&normal, &[]).unwrap();
        assert_eq!(series.samples[0].normal_cumulative, 1.0);
    }

    #[test]
    fn test_thinning_and_spacing_invariant() {
        let normal: Vec<Value> = (0..240).map(|i| rec(T0 + i * 7 * MIN, i as f64)).collect();
        let series = normalizer().normalize(&normal, &[]).unwrap();

        assert!(series.samples.len() > 1);
        for pair in series.samples.windows(2) {
            assert!(pair[1].round_time > pair[0].round_time);
            assert!(pair[1].round_time - pair[0].round_time >= SAMPLE_INTERVAL_MS);
        }
        assert_eq!(series.samples[0].normal_difference, 0.0);
        for i in 1..series.samples.len() {
            let s = &series.samples;
            assert_eq!(
                s[i].normal_difference,
                s[i].normal_cumulative - s[i - 1].normal_cumulative
            );
        }
    }

    #[test]
    fn test_difference_spans_irregular_gap() {
        let normal = vec![rec(T0, 100.0), rec(T0 + 95 * MIN, 130.0)];
        let series = normalizer().normalize(&normal, &[]).unwrap();
        assert_eq!(series.samples[1].normal_difference, 30.0);
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        let normal = vec![
            json!({"generatedTime": T0}),
            json!({"generatedTime": "garbage", "value": 1}),
            json!({"generatedTime": T0.to_string(), "value": "4.5"}),
        ];
        let series = normalizer().normalize(&normal, &[]).unwrap();
        assert_eq!(series.samples.len(), 1);
        assert_eq!(series.samples[0].normal_cumulative, 4.5);
        assert_eq!(series.stats.normal_dropped, 2);
    }

    #[test]
    fn test_empty_normal_usage_is_an_error() {
        let err = normalizer().normalize(&[], &[rec(T0, 1.0)]).unwrap_err();
        assert!(matches!(err, UsageError::EmptyNormalUsage));

        let err = normalizer()
            .normalize(&[json!({"value": 1})], &[])
            .unwrap_err();
        assert!(matches!(err, UsageError::EmptyNormalUsage));
    }

    #[test]
    fn test_out_of_range_normal_record_is_dropped() {
        let normal = vec![
            rec(T0, 10.0),
            json!({"generatedTime": 1e16, "value": 11}),
            rec(T0 + 30 * MIN, 12.0),
        ];
        let series = normalizer().normalize(&normal, &[]).unwrap();

        let kept: Vec<f64> = series.samples.iter().map(|s| s.normal_cumulative).collect();
        assert_eq!(kept, [10.0, 12.0]);
        assert_eq!(series.samples[1].normal_difference, 2.0);
        assert_eq!(series.stats.normal_dropped, 1);
    }

    #[test]
    fn test_only_out_of_range_normal_records_is_empty() {
        let err = normalizer()
            .normalize(&[json!({"generatedTime": i64::MAX, "value": 1})], &[])
            .unwrap_err();
        assert!(matches!(err, UsageError::EmptyNormalUsage));
    }

    // ── normalize: reverseUsage ───────────────────────────────────────────────

    #[test]
    fn test_reverse_usage_last_record_in_minute_wins() {
        let normal = vec![rec(T0, 1.0)];
        let reverse = vec![rec(T0 + 10_000, 5.0), rec(T0 - 20_000, 4.0)];
        let series = normalizer().normalize(&normal, &reverse).unwrap();
        // Sorted: T0-20s (4.0) then T0+10s (5.0); both round to T0.
        assert_eq!(series.samples[0].reverse_cumulative, Some(5.0));
        assert_eq!(series.samples[0].reverse_difference, Some(0.0));
        assert_eq!(series.stats.reverse_buckets, 1);
    }

    #[test]
    fn test_reverse_usage_exact_match_only() {
        let normal = vec![rec(T0, 1.0), rec(T0 + 30 * MIN, 2.0)];
        // One minute off the second sample; never surfaces.
        let reverse = vec![rec(T0, 8.0), rec(T0 + 31 * MIN, 9.0), rec(T0 + 200 * MIN, 10.0)];
        let series = normalizer().normalize(&normal, &reverse).unwrap();

        assert_eq!(series.samples.len(), 2);
        assert_eq!(series.samples[0].reverse_cumulative, Some(8.0));
        assert_eq!(series.samples[1].reverse_cumulative, None);
        assert_eq!(series.samples[1].reverse_difference, None);
        assert!(series.has_reverse_usage());
    }

    #[test]
    fn test_reverse_differences_restart_after_gap() {
        let normal: Vec<Value> = (0..5).map(|i| rec(T0 + i * 30 * MIN, i as f64)).collect();
        let reverse = vec![
            rec(T0, 10.0),
            rec(T0 + 30 * MIN, 12.0),
            // T0 + 60 min missing
            rec(T0 + 90 * MIN, 20.0),
            rec(T0 + 120 * MIN, 23.5),
        ];
        let series = normalizer().normalize(&normal, &reverse).unwrap();
        let diffs: Vec<Option<f64>> = series.samples.iter().map(|s| s.reverse_difference).collect();
        assert_eq!(
            diffs,
            [Some(0.0), Some(2.0), None, Some(0.0), Some(3.5)]
        );
    }

    #[test]
    fn test_reverse_first_value_mid_series_is_zero() {
        let normal: Vec<Value> = (0..3).map(|i| rec(T0 + i * 30 * MIN, 0.0)).collect();
        let reverse = vec![rec(T0 + 30 * MIN, 7.0), rec(T0 + 60 * MIN, 9.0)];
        let series = normalizer().normalize(&normal, &reverse).unwrap();
        let diffs: Vec<Option<f64>> = series.samples.iter().map(|s| s.reverse_difference).collect();
        assert_eq!(diffs, [None, Some(0.0), Some(2.0)]);
    }

    #[test]
    fn test_out_of_range_reverse_record_is_dropped() {
        let reverse = vec![json!({"generatedTime": -1e16, "value": 1}), rec(T0, 3.0)];
        let series = normalizer().normalize(&[rec(T0, 10.0)], &reverse).unwrap();

        assert_eq!(series.samples.len(), 1);
        assert_eq!(series.samples[0].normal_cumulative, 10.0);
        assert_eq!(series.samples[0].reverse_cumulative, Some(3.0));
        assert_eq!(series.stats.reverse_dropped, 1);
    }

    #[test]
    fn test_no_reverse_usage_leaves_columns_empty() {
        let series = normalizer().normalize(&[rec(T0, 1.0)], &[]).unwrap();
        assert!(series.samples[0].reverse_cumulative.is_none());
        assert!(series.samples[0].reverse_difference.is_none());
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let normal: Vec<Value> = (0..50)
            .map(|i| rec(T0 + (i * 37_123) % (90 * MIN), i as f64))
            .collect();
        let reverse: Vec<Value> = (0..50).map(|i| rec(T0 + i * 41_000, i as f64)).collect();
        let a = normalizer().normalize(&normal, &reverse).unwrap();
        let b = normalizer().normalize(&normal, &reverse).unwrap();
        assert_eq!(a, b);
    }
}
