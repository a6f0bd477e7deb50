//! File-name conventions of the vendor exports and the files derived from
//! them.
//!
//! Exports are saved as `<deviceUuid>___<seq>.json`; the sequence number is
//! what orders a batch before its channels are concatenated.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use usage_core::models::Channel;

/// Separator between the device part and the sequence part of an export name.
const DEVICE_SEPARATOR: &str = "___";

/// Used when no base name can be derived for a batch CSV.
pub const FALLBACK_BATCH_CSV: &str = "merged_solar_data.csv";

fn sequence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"__(\d+)(?:\.\w+)?$").expect("valid sequence regex"))
}

/// Sequence number placed after a double underscore right before the
/// extension, e.g. `device___007.json` → `7`.
///
/// Returns `0` (sorted first) when the name carries no sequence or the digits
/// do not fit in a `u64`.
pub fn extract_sequence(name: &str) -> u64 {
    sequence_regex()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(0)
}

/// File name with its last extension removed.
///
/// An extension is a final `.` followed by at least one character that is
/// neither `.` nor `/`; a bare dotfile such as `.json` strips to `""`.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() && !name[idx + 1..].contains('/') => &name[..idx],
        _ => name,
    }
}

/// Base name for a batch: the device part before `___` when present,
/// otherwise the whole name without its extension.
pub fn batch_base_name(first_file_name: &str) -> String {
    match first_file_name.find(DEVICE_SEPARATOR) {
        Some(idx) if idx > 0 => first_file_name[..idx].to_string(),
        _ => strip_extension(first_file_name).to_string(),
    }
}

/// `<base>_mergedcsv.csv` for the first file of a batch.
pub fn merged_csv_file_name(first_file_name: Option<&str>) -> String {
    let base = first_file_name.map(batch_base_name).unwrap_or_default();
    if base.is_empty() {
        FALLBACK_BATCH_CSV.to_string()
    } else {
        format!("{base}_mergedcsv.csv")
    }
}

/// `<stem>_converted.csv` for a single-file conversion.
pub fn converted_csv_file_name(input_name: &str) -> String {
    let stem = strip_extension(input_name);
    if stem.is_empty() {
        "converted_data.csv".to_string()
    } else {
        format!("{stem}_converted.csv")
    }
}

/// `merged_<channel>.json`.
pub fn channel_file_name(channel: Channel) -> String {
    format!("merged_{}.json", channel.key())
}

/// `<device>___<seq:03>.json`, the name a retrieved response is saved under.
pub fn response_file_name(device_uuid: &str, sequence: u32) -> String {
    format!("{device_uuid}{DEVICE_SEPARATOR}{sequence:03}.json")
}

/// The final path component as a string, or the whole path when it has none.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
