//! Concatenation of channel arrays across several exports.
//!
//! Exports are merged in the order given (callers sort them with
//! [`crate::reader::sort_documents`] first). Documents without a `data`
//! object and channels that are missing or not arrays are skipped and noted
//! in the [`MergeLog`]; nothing here fails.

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};
use usage_core::models::{Channel, ParsedDocument};

use crate::naming::extract_sequence;

// ── MergeLog ──────────────────────────────────────────────────────────────────

/// One line of the processing log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeNote {
    /// Position of a document in the merge order (1-based).
    Order {
        position: usize,
        name: String,
        sequence: u64,
    },
    MissingData {
        name: String,
    },
    Appended {
        name: String,
        channel: Channel,
        count: usize,
    },
    NoChannelData {
        name: String,
        channel: Channel,
    },
    Total {
        channel: Channel,
        count: usize,
    },
}

impl fmt::Display for MergeNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeNote::Order {
                position,
                name,
                sequence: 0,
            } => write!(f, "{position}. {name} (sequence: none)"),
            MergeNote::Order {
                position,
                name,
                sequence,
            } => write!(f, "{position}. {name} (sequence: {sequence})"),
            MergeNote::MissingData { name } => write!(f, "{name}: no data key, skipped"),
            MergeNote::Appended {
                name,
                channel,
                count,
            } => write!(f, "{name}: {channel}: appended {count} records"),
            MergeNote::NoChannelData { name, channel } => write!(f, "{name}: {channel}: no data"),
            MergeNote::Total { channel, count } => write!(f, "total {channel}: {count} records"),
        }
    }
}

/// Ordered diagnostic notes produced while merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeLog {
    notes: Vec<MergeNote>,
}

impl MergeLog {
    fn push(&mut self, note: MergeNote) {
        match &note {
            MergeNote::MissingData { .. } => warn!("{}", note),
            _ => debug!("{}", note),
        }
        self.notes.push(note);
    }

    pub fn notes(&self) -> &[MergeNote] {
        &self.notes
    }
}

impl fmt::Display for MergeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for note in &self.notes {
            writeln!(f, "{note}")?;
        }
        Ok(())
    }
}

// ── MergedChannels ────────────────────────────────────────────────────────────

/// The three channel arrays concatenated across documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedChannels {
    pub normal_usage: Vec<Value>,
    pub reverse_usage: Vec<Value>,
    pub instance_electricity: Vec<Value>,
    pub log: MergeLog,
}

impl MergedChannels {
    pub fn channel(&self, channel: Channel) -> &[Value] {
        match channel {
            Channel::NormalUsage => &self.normal_usage,
            Channel::ReverseUsage => &self.reverse_usage,
            Channel::InstanceElectricity => &self.instance_electricity,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut Vec<Value> {
        match channel {
            Channel::NormalUsage => &mut self.normal_usage,
            Channel::ReverseUsage => &mut self.reverse_usage,
            Channel::InstanceElectricity => &mut self.instance_electricity,
        }
    }

    /// Record count over all channels.
    pub fn total_records(&self) -> usize {
        Channel::ALL.iter().map(|c| self.channel(*c).len()).sum()
    }
}

/// `null`, `false`, `0` and `""` all mean the document carries no data.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Merge the channel arrays of `documents`, in the given order.
pub fn merge_documents(documents: &[ParsedDocument]) -> MergedChannels {
    let mut merged = MergedChannels::default();

    for (index, doc) in documents.iter().enumerate() {
        merged.log.push(MergeNote::Order {
            position: index + 1,
            name: doc.name.clone(),
            sequence: extract_sequence(&doc.name),
        });
    }

    for doc in documents {
        let data = match doc.content.get("data") {
            Some(data) if !is_falsy(data) => data,
            _ => {
                merged.log.push(MergeNote::MissingData {
                    name: doc.name.clone(),
                });
                continue;
            }
        };

        for channel in Channel::ALL {
            match data.get(channel.key()).and_then(Value::as_array) {
                Some(items) => {
                    merged.channel_mut(channel).extend(items.iter().cloned());
                    merged.log.push(MergeNote::Appended {
                        name: doc.name.clone(),
                        channel,
                        count: items.len(),
                    });
                }
                None => merged.log.push(MergeNote::NoChannelData {
                    name: doc.name.clone(),
                    channel,
                }),
            }
        }
    }

    for channel in Channel::ALL {
        let count = merged.channel(channel).len();
        merged.log.push(MergeNote::Total { channel, count });
    }

    merged
}

// ── Tests ─────────────────────────────────────────────────────────────────────
