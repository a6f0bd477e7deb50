//! JSON export discovery and loading.
//!
//! Every selected file must read and parse; a single failure aborts the
//! whole batch before anything is merged.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use usage_core::models::ParsedDocument;
use usage_core::{Result, UsageError};

use crate::naming::{display_name, extract_sequence};

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find all `.json` files recursively under `dir`, sorted by path.
pub fn find_json_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Input path does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("json"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Expand directories in `inputs` to the JSON files they contain.
///
/// Plain file paths are kept as given, in order, whatever their extension.
pub fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = find_json_files(input);
            debug!("{}: {} JSON files", input.display(), found.len());
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    files
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parse `content` as the JSON document called `name`.
pub fn parse_document(name: &str, content: &str) -> Result<ParsedDocument> {
    let value = serde_json::from_str(content).map_err(|source| UsageError::DocumentParse {
        name: name.to_string(),
        source,
    })?;
    Ok(ParsedDocument::new(name, value))
}

/// Read and parse one export.
pub fn read_document(path: &Path) -> Result<ParsedDocument> {
    let content = std::fs::read_to_string(path).map_err(|source| UsageError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&display_name(path), &content)
}

/// Read every path, failing on the first file that cannot be read or parsed.
pub fn read_documents(paths: &[PathBuf]) -> Result<Vec<ParsedDocument>> {
    paths.iter().map(|p| read_document(p)).collect()
}

/// Stable sort by the sequence number in each document's name; documents
/// without one keep their relative order at the front.
pub fn sort_documents(documents: &mut [ParsedDocument]) {
    documents.sort_by_key(|doc| extract_sequence(&doc.name));
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_find_json_files_recursive_and_sorted() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        write(tmp.path(), "b.json", "{}");
        write(tmp.path(), "a.json", "{}");
        write(tmp.path(), "notes.txt", "x");
        write(&nested, "c.JSON", "{}");

        let files = find_json_files(tmp.path());
        let names: Vec<String> = files.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, ["a.json", "b.json", "c.JSON"]);
    }

    #[test]
    fn test_find_json_files_missing_dir() {
        assert!(find_json_files(Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn test_expand_inputs_keeps_files_and_expands_dirs() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("batch");
        std::fs::create_dir_all(&dir).unwrap();
        write(&dir, "x___002.json", "{}");
        write(&dir, "x___001.json", "{}");
        let single = write(tmp.path(), "single.data", "[]");

        let files = expand_inputs(&[single.clone(), dir]);
        assert_eq!(files.len(), 3);
        assert_eq!(files[0], single);
        assert_eq!(display_name(&files[1]), "x___001.json");
    }

    #[test]
    fn test_read_document() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "dev___001.json", r#"{"data": {"normalUsage": []}}"#);
        let doc = read_document(&path).unwrap();
        assert_eq!(doc.name, "dev___001.json");
        assert_eq!(doc.content, json!({"data": {"normalUsage": []}}));
    }

    #[test]
    fn test_read_document_missing_file() {
        let err = read_document(Path::new("/no/such/file.json")).unwrap_err();
        assert!(matches!(err, UsageError::FileRead { .. }));
    }

    #[test]
    fn test_read_documents_aborts_on_parse_failure() {
        let tmp = TempDir::new().unwrap();
        let good = write(tmp.path(), "a___001.json", "{}");
        let bad = write(tmp.path(), "a___002.json", "{oops");
        let err = read_documents(&[good, bad]).unwrap_err();
        match err {
            UsageError::DocumentParse { name, .. } => assert_eq!(name, "a___002.json"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sort_documents_by_sequence_is_stable() {
        let mut docs = vec![
            ParsedDocument::new("d___010.json", json!(1)),
            ParsedDocument::new("plain-b.json", json!(2)),
            ParsedDocument::new("d___002.json", json!(3)),
            ParsedDocument::new("plain-a.json", json!(4)),
        ];
        sort_documents(&mut docs);
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            ["plain-b.json", "plain-a.json", "d___002.json", "d___010.json"]
        );
    }
}
