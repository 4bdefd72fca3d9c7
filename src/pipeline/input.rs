//! Input resolution: validate a user-supplied path before pdfium sees it.
//!
//! pdfium reports a missing file and a text file renamed to `.pdf` with the
//! same opaque error. Checking existence, permissions and the `%PDF` magic
//! bytes up front gives the user a meaningful message and a distinct exit
//! status instead.

use crate::error::Pdf2EpubError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` names a readable PDF and return it.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<PathBuf, Pdf2EpubError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(Pdf2EpubError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(Pdf2EpubError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2EpubError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2EpubError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// File stem used to name the checkpoint and temporary book.
pub fn input_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "book".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, Pdf2EpubError::FileNotFound { .. }));
    }

    #[test]
    fn text_file_is_not_a_pdf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let err = resolve_input(&path).unwrap_err();
        match err {
            Pdf2EpubError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_file_is_not_a_pdf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.pdf");
        std::fs::write(&path, b"%P").unwrap();
        assert!(matches!(
            resolve_input(&path).unwrap_err(),
            Pdf2EpubError::NotAPdf { .. }
        ));
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_input(&path).unwrap(), path);
    }

    #[test]
    fn stem_falls_back_for_bare_paths() {
        assert_eq!(input_stem(Path::new("/books/红楼梦.pdf")), "红楼梦");
        assert_eq!(input_stem(Path::new("/")), "book");
    }
}
