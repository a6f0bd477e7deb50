use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Result;
use crate::time_utils::{CivilClock, TimestampStyle};

// ── Channel ───────────────────────────────────────────────────────────────────

/// One of the named usage arrays found under a document's `data` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "normalUsage")]
    NormalUsage,
    #[serde(rename = "reverseUsage")]
    ReverseUsage,
    /// Merged and exported, never normalised.
    #[serde(rename = "instanceElectricity")]
    InstanceElectricity,
}

impl Channel {
    pub const ALL: [Channel; 3] = [
        Channel::NormalUsage,
        Channel::ReverseUsage,
        Channel::InstanceElectricity,
    ];

    /// The JSON key the channel is stored under.
    pub fn key(self) -> &'static str {
        match self {
            Channel::NormalUsage => "normalUsage",
            Channel::ReverseUsage => "reverseUsage",
            Channel::InstanceElectricity => "instanceElectricity",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ── ParsedDocument ────────────────────────────────────────────────────────────

/// A JSON export together with the file name it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub name: String,
    pub content: Value,
}

impl ParsedDocument {
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

// ── Field coercion ────────────────────────────────────────────────────────────

/// Why a raw `{generatedTime, value}` record was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The record is not an object or lacks the field.
    Missing(&'static str),
    /// The field is present but is not a number or a numeric string.
    NotNumeric(&'static str),
    /// The timestamp is numeric but cannot be placed on the calendar.
    OutOfRange(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Missing(field) => write!(f, "missing {field}"),
            SkipReason::NotNumeric(field) => write!(f, "non-numeric {field}"),
            SkipReason::OutOfRange(field) => write!(f, "{field} out of range"),
        }
    }
}

/// A raw record with both fields coerced to numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageRecord {
    /// Device-reported epoch milliseconds.
    pub generated_time: i64,
    pub value: f64,
}

impl UsageRecord {
    /// Coerce one raw record.
    ///
    /// `generatedTime` accepts a JSON integer, a finite JSON float (truncated)
    /// or a string holding an integer. `value` accepts any finite JSON number
    /// or a string holding one. A `generatedTime` that cannot be rounded to
    /// a calendar minute is [`SkipReason::OutOfRange`].
    pub fn from_raw(raw: &Value) -> std::result::Result<Self, SkipReason> {
        let generated_time = raw
            .get("generatedTime")
            .ok_or(SkipReason::Missing("generatedTime"))?;
        let value = raw.get("value").ok_or(SkipReason::Missing("value"))?;

        let generated_time =
            coerce_epoch_ms(generated_time).ok_or(SkipReason::NotNumeric("generatedTime"))?;
        if !is_roundable(generated_time) {
            return Err(SkipReason::OutOfRange("generatedTime"));
        }

        Ok(Self {
            generated_time,
            value: coerce_number(value).ok_or(SkipReason::NotNumeric("value"))?,
        })
    }
}

/// Rounding moves a timestamp by less than a minute either way, so both
/// neighbours must be representable.
fn is_roundable(timestamp_ms: i64) -> bool {
    const MINUTE_MS: i64 = 60_000;
    [timestamp_ms.checked_sub(MINUTE_MS), timestamp_ms.checked_add(MINUTE_MS)]
        .into_iter()
        .all(|t| t.and_then(DateTime::from_timestamp_millis).is_some())
}

fn coerce_epoch_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|f| f.is_finite())
}

/// Coerce every record in `raw`, returning the usable ones in input order and
/// the number that were dropped.
pub fn coerce_records(raw: &[Value]) -> (Vec<UsageRecord>, usize) {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;
    for (index, item) in raw.iter().enumerate() {
        match UsageRecord::from_raw(item) {
            Ok(record) => records.push(record),
            Err(reason) => {
                tracing::debug!("dropping record {}: {}", index, reason);
                dropped += 1;
            }
        }
    }
    (records, dropped)
}

// ── RoundedSample ─────────────────────────────────────────────────────────────

/// One thinned, minute-aligned output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundedSample {
    /// Source timestamp of the record that opened this bucket.
    #[serde(rename = "generatedTime")]
    pub generated_time: i64,
    /// Bucket key, a whole civil minute.
    #[serde(rename = "roundTime")]
    pub round_time: i64,
    #[serde(rename = "formatedTime")]
    formatted_time: String,
    #[serde(rename = "normalUsage_cumulative")]
    pub normal_cumulative: f64,
    #[serde(rename = "normalUsage_difference")]
    pub normal_difference: f64,
    #[serde(rename = "reverseUsage_cumulative")]
    pub reverse_cumulative: Option<f64>,
    #[serde(rename = "reverseUsage_difference")]
    pub reverse_difference: Option<f64>,
}

impl RoundedSample {
    /// Build a sample; the display time is derived from `round_time`.
    pub fn new(
        clock: &CivilClock,
        generated_time: i64,
        round_time: i64,
        normal_cumulative: f64,
    ) -> Result<Self> {
        Ok(Self {
            generated_time,
            round_time,
            formatted_time: clock.format(round_time, TimestampStyle::Csv)?,
            normal_cumulative,
            normal_difference: 0.0,
            reverse_cumulative: None,
            reverse_difference: None,
        })
    }

    /// `yyyy/MM/dd HH:mm:ss` rendering of [`Self::round_time`].
    pub fn formatted_time(&self) -> &str {
        &self.formatted_time
    }
}
