use std::path::Path;

use flacdl_core::core::existence::{ExistenceChecker, ExistenceQuery, ExistenceResult};

use crate::AppState;

/// Looks up the given ISRCs under `dir`. With no ISRCs, lists every
/// tagged FLAC file found instead.
pub async fn scan_library(
    state: &AppState,
    dir: &Path,
    isrcs: &[String],
    follow_links: bool,
) -> Result<Vec<ExistenceResult>, String> {
    if !dir.is_dir() {
        return Err(format!("Not a directory: {}", dir.display()));
    }
    let scanner = state.scanner.clone().follow_links(follow_links);

    if isrcs.is_empty() {
        let root = dir.to_path_buf();
        let index = tokio::task::spawn_blocking(move || scanner.isrc_index(&root))
            .await
            .map_err(|e| e.to_string())?;
        let mut found: Vec<ExistenceResult> = index
            .into_iter()
            .map(|(isrc, path)| ExistenceResult {
                identity: isrc,
                exists: true,
                file_path: Some(path.to_string_lossy().into_owned()),
            })
            .collect();
        found.sort_by(|a, b| a.identity.cmp(&b.identity));
        return Ok(found);
    }

    let queries: Vec<ExistenceQuery> = isrcs
        .iter()
        .map(|isrc| ExistenceQuery {
            identity: isrc.trim().to_uppercase(),
            track_name: String::new(),
            artist_name: String::new(),
        })
        .collect();
    scanner
        .check(dir, &queries)
        .await
        .map_err(|e| e.to_string())
}
