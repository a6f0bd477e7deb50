//! Concurrent loading of a batch of JSON exports.
//!
//! Every file is read on its own tokio task. The batch succeeds only if all
//! of them read and parse; the first failure aborts the remaining reads.

use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::debug;
use usage_core::models::ParsedDocument;
use usage_core::{Result, UsageError};
use usage_data::naming::display_name;
use usage_data::reader::parse_document;

async fn read_one(path: &Path) -> Result<ParsedDocument> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| UsageError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
    parse_document(&display_name(path), &content)
}

/// Read and parse every path, returning documents in the order given.
pub async fn load_documents(paths: &[PathBuf]) -> Result<Vec<ParsedDocument>> {
    let mut tasks = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        tasks.spawn(async move { (index, read_one(&path).await) });
    }

    let mut slots: Vec<Option<ParsedDocument>> = vec![None; paths.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| UsageError::Other(e.into()))?;
        // Returning early drops the JoinSet, which aborts the other reads.
        slots[index] = Some(result?);
    }

    debug!("Loaded {} documents", paths.len());
    Ok(slots.into_iter().flatten().collect())
}
