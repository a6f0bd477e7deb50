//! End-to-end conversion flows built from the reader, merger, normaliser and
//! CSV stages.

use tracing::info;
use usage_core::models::{Channel, ParsedDocument};
use usage_core::time_utils::CivilClock;
use usage_core::{Result, UsageError};

use crate::csv_export::{convert_records, serialize_converted, serialize_samples};
use crate::merger::{merge_documents, MergedChannels};
use crate::naming::{channel_file_name, converted_csv_file_name, merged_csv_file_name};
use crate::normalizer::{NormalizedSeries, UsageNormalizer};
use crate::reader::sort_documents;

// ── Public types ──────────────────────────────────────────────────────────────

/// A rendered file ready to be written or printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub file_name: String,
    pub contents: String,
}

/// Everything the batch flow produces.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub merged: MergedChannels,
    pub series: NormalizedSeries,
    pub csv: OutputFile,
}

// ── Flows ─────────────────────────────────────────────────────────────────────

/// Merge, normalise and render a batch of exports.
///
/// `documents` are in selection order: the first one names the output file,
/// then the batch is sorted by sequence number before merging.
pub fn run_batch(mut documents: Vec<ParsedDocument>, clock: CivilClock) -> Result<BatchResult> {
    let file_name = merged_csv_file_name(documents.first().map(|d| d.name.as_str()));

    sort_documents(&mut documents);
    let merged = merge_documents(&documents);
    info!(
        "Merged {} documents: {} normalUsage, {} reverseUsage, {} instanceElectricity",
        documents.len(),
        merged.normal_usage.len(),
        merged.reverse_usage.len(),
        merged.instance_electricity.len()
    );

    let series =
        UsageNormalizer::new(clock).normalize(&merged.normal_usage, &merged.reverse_usage)?;
    let contents = serialize_samples(&series.samples)?;

    Ok(BatchResult {
        merged,
        series,
        csv: OutputFile {
            file_name,
            contents,
        },
    })
}

/// Convert one JSON array export to CSV.
pub fn run_convert(document: &ParsedDocument, clock: CivilClock) -> Result<OutputFile> {
    let rows = convert_records(&document.name, &document.content, &clock)?;
    info!("{}: {} rows after thinning", document.name, rows.len());
    Ok(OutputFile {
        file_name: converted_csv_file_name(&document.name),
        contents: serialize_converted(&rows)?,
    })
}

/// Pretty-printed `merged_<channel>.json` for every non-empty channel.
pub fn export_channels(merged: &MergedChannels) -> Result<Vec<OutputFile>> {
    let mut files = Vec::new();
    for channel in Channel::ALL {
        let items = merged.channel(channel);
        if items.is_empty() {
            continue;
        }
        files.push(OutputFile {
            file_name: channel_file_name(channel),
            contents: serde_json::to_string_pretty(items)?,
        });
    }
    if files.is_empty() {
        return Err(UsageError::NoData);
    }
    Ok(files)
}

/// Sort and merge a batch, then render its channels as JSON.
pub fn run_merge(mut documents: Vec<ParsedDocument>) -> Result<(MergedChannels, Vec<OutputFile>)> {
    sort_documents(&mut documents);
    let merged = merge_documents(&documents);
    info!(
        "Merged {} records from {} documents",
        merged.total_records(),
        documents.len()
    );
    let files = export_channels(&merged)?;
    Ok((merged, files))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
