use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lofty::{ItemKey, TaggedFileExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistenceQuery {
    pub identity: String,
    pub track_name: String,
    pub artist_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistenceResult {
    pub identity: String,
    pub exists: bool,
    pub file_path: Option<String>,
}

/// Bulk pre-flight lookup. Answers once per query, in query order.
#[async_trait]
pub trait ExistenceChecker: Send + Sync {
    async fn check(
        &self,
        output_dir: &Path,
        queries: &[ExistenceQuery],
    ) -> anyhow::Result<Vec<ExistenceResult>>;
}

/// Matches queries against the ISRC tags of the FLAC files under a directory.
#[derive(Debug, Clone, Default)]
pub struct LibraryScanner {
    follow_links: bool,
}

impl LibraryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Upper-cased ISRC to file path for every tagged `.flac` below `dir`.
    pub fn isrc_index(&self, dir: &Path) -> HashMap<String, PathBuf> {
        let mut index = HashMap::new();
        if !dir.is_dir() {
            return index;
        }

        for entry in walkdir::WalkDir::new(dir)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || !is_flac(path) {
                continue;
            }
            match read_isrc(path) {
                Ok(Some(isrc)) => {
                    index.entry(isrc).or_insert_with(|| path.to_path_buf());
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("[scan] unreadable '{}': {}", path.display(), e);
                }
            }
        }
        index
    }
}

fn is_flac(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("flac"))
}

fn read_isrc(path: &Path) -> anyhow::Result<Option<String>> {
    let tagged_file = lofty::read_from_path(path)?;
    let tag = match tagged_file.primary_tag() {
        Some(tag) => tag,
        None => match tagged_file.tags().first() {
            Some(tag) => tag,
            None => return Ok(None),
        },
    };
    Ok(tag
        .get_string(&ItemKey::Isrc)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty()))
}

pub fn match_queries(
    index: &HashMap<String, PathBuf>,
    queries: &[ExistenceQuery],
) -> Vec<ExistenceResult> {
    queries
        .iter()
        .map(|q| {
            let found = index.get(&q.identity.trim().to_uppercase());
            ExistenceResult {
                identity: q.identity.clone(),
                exists: found.is_some(),
                file_path: found.map(|p| p.to_string_lossy().to_string()),
            }
        })
        .collect()
}

#[async_trait]
impl ExistenceChecker for LibraryScanner {
    async fn check(
        &self,
        output_dir: &Path,
        queries: &[ExistenceQuery],
    ) -> anyhow::Result<Vec<ExistenceResult>> {
        let scanner = self.clone();
        let dir = output_dir.to_path_buf();
        let index = tokio::task::spawn_blocking(move || scanner.isrc_index(&dir)).await?;
        tracing::debug!(
            "[scan] {} tagged files under '{}'",
            index.len(),
            output_dir.display()
        );
        Ok(match_queries(&index, queries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn query(identity: &str) -> ExistenceQuery {
        ExistenceQuery {
            identity: identity.into(),
            track_name: "Song".into(),
            artist_name: "Artist".into(),
        }
    }

    /// Minimal FLAC: STREAMINFO plus a Vorbis comment block holding `ISRC=`.
    fn tagged_flac(isrc: &str) -> Vec<u8> {
        let mut out = b"fLaC".to_vec();
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x22]);
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&4096u16.to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        let packed: u64 = (44_100u64 << 44) | (1 << 41) | (15 << 36);
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0; 16]);

        let vendor = b"flacdl";
        let comment = format!("ISRC={}", isrc);
        let mut block = Vec::new();
        block.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        block.extend_from_slice(vendor);
        block.extend_from_slice(&1u32.to_le_bytes());
        block.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        block.extend_from_slice(comment.as_bytes());
        out.push(0x84);
        out.extend_from_slice(&(block.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&block);
        out
    }

    #[test]
    fn match_is_case_insensitive_and_ordered() {
        let mut index = HashMap::new();
        index.insert("USRC1".to_string(), PathBuf::from("/m/one.flac"));
        let results = match_queries(&index, &[query("gbxx2"), query("usrc1")]);
        assert_eq!(results.len(), 2);
        assert!(!results[0].exists);
        assert_eq!(results[0].identity, "gbxx2");
        assert!(results[1].exists);
        assert_eq!(results[1].file_path.as_deref(), Some("/m/one.flac"));
    }

    #[test]
    fn flac_extension_check() {
        assert!(is_flac(Path::new("a/b.FLAC")));
        assert!(!is_flac(Path::new("a/b.mp3")));
        assert!(!is_flac(Path::new("a/flac")));
    }

    #[tokio::test]
    async fn missing_directory_means_nothing_exists() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let results = LibraryScanner::new()
            .check(&missing, &[query("USRC1")])
            .await
            .unwrap();
        assert_eq!(results, vec![ExistenceResult {
            identity: "USRC1".into(),
            exists: false,
            file_path: None,
        }]);
    }

    #[tokio::test]
    async fn unreadable_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("Artist").join("Album");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("broken.flac"), b"not really flac").unwrap();
        std::fs::write(nested.join("cover.jpg"), b"jpeg").unwrap();

        let scanner = LibraryScanner::new();
        assert!(scanner.isrc_index(tmp.path()).is_empty());
        let results = scanner.check(tmp.path(), &[query("USRC1")]).await.unwrap();
        assert!(!results[0].exists);
    }

    #[tokio::test]
    async fn tagged_flac_is_found_by_isrc() {
        let tmp = TempDir::new().unwrap();
        let album = tmp.path().join("Band X").join("Debut");
        std::fs::create_dir_all(&album).unwrap();
        let song = album.join("03. Breathe.flac");
        std::fs::write(&song, tagged_flac("usat21300959")).unwrap();
        std::fs::write(album.join("04. Untagged.flac"), tagged_flac("")).unwrap();

        let index = LibraryScanner::new().isrc_index(tmp.path());
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("USAT21300959"), Some(&song));

        let results = LibraryScanner::new()
            .check(tmp.path(), &[query("UsAt21300959"), query("GBAYE0601498")])
            .await
            .unwrap();
        assert!(results[0].exists);
        assert_eq!(
            results[0].file_path.as_deref(),
            Some(song.to_string_lossy().as_ref())
        );
        assert!(!results[1].exists);
    }
}
