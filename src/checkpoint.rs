//! Progress checkpoint: the durable snapshot that makes a run resumable.
//!
//! A checkpoint records how far a run got and every chapter accumulated so
//! far. It is only meaningful for the exact `(input, output, mode)` triple
//! that wrote it; anything else is treated as if no checkpoint existed.
//!
//! ## Files
//!
//! Both live next to the final book so re-running the same command finds them:
//!
//! ```text
//! <output_dir>/<input_stem>_progress.json   this checkpoint
//! <output_dir>/<input_stem>_temp.epub       partial book, regenerated from it
//! ```
//!
//! Writes go to a sibling `.tmp` file first and are renamed into place, so a
//! crash mid-write leaves the previous checkpoint intact.
//!
//! Concurrent runs against the same output are not guarded against; the last
//! writer wins.

use crate::document::{Chapter, ExtractionMode};
use crate::error::Pdf2EpubError;
use crate::pipeline::input::input_stem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Persisted run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCheckpoint {
    pub input_id: String,
    pub output_id: String,
    /// Last fully processed page (1-indexed); 0 when nothing was processed.
    pub processed_page_count: usize,
    /// Last page of the selection.
    pub total_page_count: usize,
    pub mode: ExtractionMode,
    pub accumulated_chapters: Vec<Chapter>,
    pub title: String,
}

impl ProgressCheckpoint {
    /// True when this checkpoint was written by the same kind of run.
    pub fn matches(&self, input_id: &str, output_id: &str, mode: ExtractionMode) -> bool {
        self.input_id == input_id && self.output_id == output_id && self.mode == mode
    }

    /// First page not yet processed.
    pub fn next_page(&self) -> usize {
        self.processed_page_count + 1
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The file exists but cannot be read or does not match the schema.
    #[error("checkpoint '{path}' is unreadable: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

/// Result of looking for a checkpoint to resume from.
#[derive(Debug)]
pub enum LoadOutcome {
    Resumable(ProgressCheckpoint),
    /// No checkpoint file.
    Absent,
    /// A checkpoint from a different input, output or mode.
    Mismatch,
    /// Unreadable; already deleted.
    Corrupt(CheckpointError),
}

/// Locations of the checkpoint and temporary book for one run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    checkpoint_path: PathBuf,
    temp_output_path: PathBuf,
}

impl CheckpointStore {
    /// Derive both paths from the input and final output paths.
    pub fn for_run(input: &Path, output: &Path) -> Self {
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let stem = input_stem(input);
        Self {
            checkpoint_path: dir.join(format!("{stem}_progress.json")),
            temp_output_path: dir.join(format!("{stem}_temp.epub")),
        }
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    pub fn temp_output_path(&self) -> &Path {
        &self.temp_output_path
    }

    /// Read the checkpoint file, if any.
    pub async fn read(&self) -> Result<Option<ProgressCheckpoint>, CheckpointError> {
        let bytes = match tokio::fs::read(&self.checkpoint_path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::Corrupt {
                    path: self.checkpoint_path.clone(),
                    detail: e.to_string(),
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CheckpointError::Corrupt {
                path: self.checkpoint_path.clone(),
                detail: e.to_string(),
            })
    }

    /// Find a checkpoint usable for `(input_id, output_id, mode)`.
    ///
    /// A corrupt checkpoint is logged and deleted; it never fails the run.
    pub async fn load(&self, input_id: &str, output_id: &str, mode: ExtractionMode) -> LoadOutcome {
        match self.read().await {
            Ok(None) => LoadOutcome::Absent,
            Ok(Some(cp)) if cp.matches(input_id, output_id, mode) => LoadOutcome::Resumable(cp),
            Ok(Some(cp)) => {
                debug!(
                    "Checkpoint belongs to {} → {} ({}), not this run",
                    cp.input_id, cp.output_id, cp.mode
                );
                LoadOutcome::Mismatch
            }
            Err(e) => {
                warn!("{}; discarding it", e);
                remove_if_present(&self.checkpoint_path).await;
                LoadOutcome::Corrupt(e)
            }
        }
    }

    /// Persist `checkpoint` atomically.
    pub async fn save(&self, checkpoint: &ProgressCheckpoint) -> Result<(), Pdf2EpubError> {
        let fail = |detail: String| Pdf2EpubError::CheckpointWriteFailed {
            path: self.checkpoint_path.clone(),
            detail,
        };

        let json = serde_json::to_vec_pretty(checkpoint).map_err(|e| fail(e.to_string()))?;

        if let Some(parent) = self
            .checkpoint_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fail(e.to_string()))?;
        }

        let tmp_path = self.checkpoint_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| fail(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.checkpoint_path)
            .await
            .map_err(|e| fail(e.to_string()))?;

        debug!(
            "Checkpoint saved: page {}/{}",
            checkpoint.processed_page_count, checkpoint.total_page_count
        );
        Ok(())
    }

    /// Delete the checkpoint and the temporary book, for a fresh start.
    pub async fn discard(&self) {
        remove_if_present(&self.checkpoint_path).await;
        remove_if_present(&self.temp_output_path).await;
    }

    /// Move the temporary book to `final_path` and delete the checkpoint.
    pub async fn promote(&self, final_path: &Path) -> Result<(), Pdf2EpubError> {
        let io_err = |e| Pdf2EpubError::OutputWriteFailed {
            path: final_path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::rename(&self.temp_output_path, final_path)
            .await
            .map_err(io_err)?;
        remove_if_present(&self.checkpoint_path).await;

        info!("Saved {}", final_path.display());
        Ok(())
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ContentBlock;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::for_run(Path::new("/books/a.pdf"), &dir.path().join("a.epub"))
    }

    fn checkpoint(mode: ExtractionMode) -> ProgressCheckpoint {
        ProgressCheckpoint {
            input_id: "a.pdf".into(),
            output_id: "a.epub".into(),
            processed_page_count: 4,
            total_page_count: 10,
            mode,
            accumulated_chapters: vec![Chapter {
                title: "第一章".into(),
                blocks: vec![ContentBlock::paragraph("正文")],
            }],
            title: "A".into(),
        }
    }

    #[test]
    fn paths_sit_next_to_output() {
        let s = CheckpointStore::for_run(Path::new("in/book.pdf"), Path::new("out/book.epub"));
        assert_eq!(s.checkpoint_path(), Path::new("out/book_progress.json"));
        assert_eq!(s.temp_output_path(), Path::new("out/book_temp.epub"));

        let bare = CheckpointStore::for_run(Path::new("book.pdf"), Path::new("book.epub"));
        assert_eq!(bare.checkpoint_path(), Path::new("./book_progress.json"));
    }

    #[test]
    fn wire_format_has_exactly_the_documented_fields() {
        let value = serde_json::to_value(checkpoint(ExtractionMode::Rich)).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "accumulated_chapters",
                "input_id",
                "mode",
                "output_id",
                "processed_page_count",
                "title",
                "total_page_count"
            ]
        );
        assert_eq!(value["mode"], "rich");
    }

    #[tokio::test]
    async fn saved_checkpoint_is_resumable() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(&checkpoint(ExtractionMode::Rich)).await.unwrap();

        match s.load("a.pdf", "a.epub", ExtractionMode::Rich).await {
            LoadOutcome::Resumable(cp) => {
                assert_eq!(cp, checkpoint(ExtractionMode::Rich));
                assert_eq!(cp.next_page(), 5);
            }
            other => panic!("expected resumable, got {other:?}"),
        }
        assert!(!s.checkpoint_path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn rich_checkpoint_is_not_used_for_simple_run() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(&checkpoint(ExtractionMode::Rich)).await.unwrap();

        assert!(matches!(
            s.load("a.pdf", "a.epub", ExtractionMode::Simple).await,
            LoadOutcome::Mismatch
        ));
        assert!(matches!(
            s.load("a.pdf", "b.epub", ExtractionMode::Rich).await,
            LoadOutcome::Mismatch
        ));
    }

    #[tokio::test]
    async fn missing_checkpoint_is_absent() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).load("a.pdf", "a.epub", ExtractionMode::Rich).await,
            LoadOutcome::Absent
        ));
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_deleted() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        std::fs::write(s.checkpoint_path(), b"{\"input_id\": \"a.pdf\", ").unwrap();

        assert!(matches!(
            s.load("a.pdf", "a.epub", ExtractionMode::Rich).await,
            LoadOutcome::Corrupt(CheckpointError::Corrupt { .. })
        ));
        assert!(!s.checkpoint_path().exists());
    }

    #[tokio::test]
    async fn promote_moves_book_and_drops_checkpoint() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(&checkpoint(ExtractionMode::Rich)).await.unwrap();
        std::fs::write(s.temp_output_path(), b"epub bytes").unwrap();

        let final_path = dir.path().join("a.epub");
        s.promote(&final_path).await.unwrap();

        assert_eq!(std::fs::read(&final_path).unwrap(), b"epub bytes");
        assert!(!s.temp_output_path().exists());
        assert!(!s.checkpoint_path().exists());
    }

    #[tokio::test]
    async fn discard_removes_both_files() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(&checkpoint(ExtractionMode::Simple)).await.unwrap();
        std::fs::write(s.temp_output_path(), b"partial").unwrap();

        s.discard().await;
        assert!(!s.checkpoint_path().exists());
        assert!(!s.temp_output_path().exists());
    }
}
