//! Input validation: make sure a path names a readable PDF before pdfium
//! touches it.
//!
//! pdfium reports a missing file and a JPEG renamed to `.pdf` with the same
//! opaque load error. Checking existence, permissions and the `%PDF` magic
//! bytes first lets callers tell those cases apart.

use crate::error::GraderError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf_path(path: &Path) -> Result<(), GraderError> {
    if !path.exists() {
        return Err(GraderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(GraderError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(GraderError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut head = Vec::with_capacity(4);
    file.take(4)
        .read_to_end(&mut head)
        .map_err(|e| GraderError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("unreadable: {e}"),
        })?;

    if head != b"%PDF" {
        let mut magic = [0u8; 4];
        magic[..head.len()].copy_from_slice(&head);
        return Err(GraderError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Validated PDF input: {}", path.display());
    Ok(())
}
