//! CSV rendering of normalised series, and the single-file conversion flow.
//!
//! Null values are written as empty fields. Fields are quoted only when they
//! would otherwise be ambiguous, so numeric and timestamp columns come out
//! bare.

use serde_json::Value;
use tracing::debug;
use usage_core::models::{RoundedSample, UsageRecord};
use usage_core::time_utils::{CivilClock, TimestampStyle};
use usage_core::{Result, UsageError};

use crate::normalizer::SAMPLE_INTERVAL_MS;

const BASE_HEADER: [&str; 5] = [
    "generatedTime",
    "roundTime",
    "formatedTime",
    "normalUsage_cumulative",
    "normalUsage_difference",
];
const REVERSE_HEADER: [&str; 2] = ["reverseUsage_cumulative", "reverseUsage_difference"];
const CONVERTED_HEADER: [&str; 5] = [
    "generatedTime",
    "roundTime",
    "formatedTime",
    "cumulative",
    "difference",
];

fn writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| UsageError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| UsageError::Other(e.into()))
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ── Normalised series ─────────────────────────────────────────────────────────

/// Render samples as CSV.
///
/// The reverse-usage columns are present only when at least one sample has a
/// reverse cumulative value.
pub fn serialize_samples(samples: &[RoundedSample]) -> Result<String> {
    if samples.is_empty() {
        return Err(UsageError::NoData);
    }
    let with_reverse = samples.iter().any(|s| s.reverse_cumulative.is_some());

    let mut wtr = writer();
    let mut header: Vec<&str> = BASE_HEADER.to_vec();
    if with_reverse {
        header.extend(REVERSE_HEADER);
    }
    wtr.write_record(&header)?;

    for sample in samples {
        let mut row = vec![
            sample.generated_time.to_string(),
            sample.round_time.to_string(),
            sample.formatted_time().to_string(),
            sample.normal_cumulative.to_string(),
            sample.normal_difference.to_string(),
        ];
        if with_reverse {
            row.push(optional(sample.reverse_cumulative));
            row.push(optional(sample.reverse_difference));
        }
        wtr.write_record(&row)?;
    }

    debug!("Serialised {} rows (reverse columns: {})", samples.len(), with_reverse);
    finish(wtr)
}

// ── Single-file conversion ────────────────────────────────────────────────────

/// One row of a single-file conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRow {
    pub generated_time: i64,
    pub round_time: i64,
    pub formatted_time: String,
    pub cumulative: f64,
    pub difference: f64,
}

/// Convert a JSON array of `{generatedTime, value}` records.
///
/// Unlike the batch flow there is no per-minute bucketing: rows are
/// stable-sorted by `roundTime` and thinned directly, so of several records
/// in the same minute the earliest in input order survives.
pub fn convert_records(
    name: &str,
    document: &Value,
    clock: &CivilClock,
) -> Result<Vec<ConvertedRow>> {
    let items = document
        .as_array()
        .ok_or_else(|| UsageError::NotAnArray(name.to_string()))?;

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let record = match UsageRecord::from_raw(item) {
            Ok(record) => record,
            Err(reason) => {
                debug!("{}: skipping record {}: {}", name, index, reason);
                continue;
            }
        };
        let round_time = clock.round_to_minute(record.generated_time)?;
        rows.push(ConvertedRow {
            generated_time: record.generated_time,
            round_time,
            formatted_time: clock.format(round_time, TimestampStyle::Csv)?,
            cumulative: record.value,
            difference: 0.0,
        });
    }
    debug!("{}: {} of {} records usable", name, rows.len(), items.len());

    rows.sort_by_key(|r| r.round_time);

    let mut kept: Vec<ConvertedRow> = Vec::new();
    for row in rows {
        match kept.last() {
            Some(last) if row.round_time - last.round_time < SAMPLE_INTERVAL_MS => {}
            _ => kept.push(row),
        }
    }
    for i in 1..kept.len() {
        kept[i].difference = kept[i].cumulative - kept[i - 1].cumulative;
    }

    Ok(kept)
}

/// Render converted rows as `generatedTime,roundTime,formatedTime,cumulative,difference`.
pub fn serialize_converted(rows: &[ConvertedRow]) -> Result<String> {
    if rows.is_empty() {
        return Err(UsageError::NoData);
    }

    let mut wtr = writer();
    wtr.write_record(CONVERTED_HEADER)?;
    for row in rows {
        wtr.write_record([
            row.generated_time.to_string(),
            row.round_time.to_string(),
            row.formatted_time.clone(),
            row.cumulative.to_string(),
            row.difference.to_string(),
        ])?;
    }
    finish(wtr)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
