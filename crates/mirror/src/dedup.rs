//! Skips segments already present in a manifest's local directory.
//!
//! The files on disk are the only record of earlier runs, so a re-run only
//! downloads what is missing.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::MirrorError;
use crate::path::resource_filename;

/// Names of the files in `dir` whose name contains `segment_marker`, sorted.
///
/// A directory that does not exist yet has no segments.
pub async fn list_segment_files(dir: &Path, segment_marker: &str) -> Result<Vec<String>, MirrorError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MirrorError::filesystem(dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| MirrorError::filesystem(dir, e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| MirrorError::filesystem(entry.path(), e))?
            .is_file();
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str()
            && name.contains(segment_marker)
        {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}

/// Drop every candidate whose filename already exists in `dir`, keeping order.
pub async fn filter_new(
    candidates: Vec<String>,
    dir: &Path,
    segment_marker: &str,
) -> Result<Vec<String>, MirrorError> {
    let existing: HashSet<String> = list_segment_files(dir, segment_marker)
        .await?
        .into_iter()
        .collect();

    debug!(
        dir = %dir.display(),
        existing = existing.len(),
        "Found existing segment files"
    );

    if existing.is_empty() {
        return Ok(candidates);
    }

    Ok(candidates
        .into_iter()
        .filter(|candidate| !existing.contains(resource_filename(candidate)))
        .collect())
}
