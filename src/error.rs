//! Error types for the sheetgrade library.
//!
//! Failures fall into two groups:
//!
//! * [`GraderError`] — **Fatal**: the document cannot be transcribed at all
//!   (missing or corrupt PDF, a page that will not rasterise, an OCR failure
//!   under [`crate::config::OcrFailurePolicy::FailFast`]). Returned as
//!   `Err(GraderError)` from the top-level `transcribe*` functions and from
//!   the grading / storage collaborators.
//!
//! * [`PageDegradation`] — **Non-fatal**: one page lost some or all of its
//!   text (OCR call failed, nothing recognised, no section markers found) but
//!   the document run continues. Recorded on
//!   [`crate::output::PageTranscript`] and reported to the
//!   [`crate::progress::PipelineObserver`].
//!
//! [`OcrError`], [`FeedbackError`] and [`StoreError`] are the error types of
//! the three external collaborators (OCR engine, feedback model, result
//! store).

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`GraderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The PDF could not be opened (missing, unreadable, not a PDF, corrupt, locked).
    DocumentOpen,
    /// A specific page could not be rasterised.
    PageRender,
    /// The OCR backend failed and the run was configured to fail fast.
    OcrService,
    /// The feedback model failed.
    Feedback,
    /// The result store failed.
    Storage,
    /// Invalid configuration or missing runtime dependency.
    Config,
    /// Writing the transcript sink failed.
    Output,
    /// Unexpected internal error.
    Internal,
}

/// All fatal errors returned by the sheetgrade library.
#[derive(Debug, Error)]
pub enum GraderError {
    // ── Document open errors ─────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    // ── Page errors ──────────────────────────────────────────────────────
    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    PageRender { page: usize, detail: String },

    /// OCR failed for a page while running with the fail-fast policy.
    #[error("OCR failed for page {page}: {source}")]
    OcrService {
        page: usize,
        #[source]
        source: OcrError,
    },

    // ── Collaborator errors ──────────────────────────────────────────────
    /// Feedback generation failed.
    #[error("Feedback generation failed: {0}")]
    Feedback(#[from] FeedbackError),

    /// Persisting or reading graded results failed.
    #[error("Result store error: {0}")]
    Storage(#[from] StoreError),

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Could not create or write the transcript sink file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No LLM provider could be constructed for OCR or grading.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or its directory), place the library\n\
in the working directory, or install it system-wide.\n"
    )]
    PdfiumBinding(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GraderError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraderError::FileNotFound { .. }
            | GraderError::PermissionDenied { .. }
            | GraderError::NotAPdf { .. }
            | GraderError::CorruptPdf { .. }
            | GraderError::PasswordRequired { .. }
            | GraderError::WrongPassword { .. } => ErrorKind::DocumentOpen,
            GraderError::PageRender { .. } => ErrorKind::PageRender,
            GraderError::OcrService { .. } => ErrorKind::OcrService,
            GraderError::Feedback(_) => ErrorKind::Feedback,
            GraderError::Storage(_) => ErrorKind::Storage,
            GraderError::OutputWriteFailed { .. } => ErrorKind::Output,
            GraderError::InvalidConfig(_)
            | GraderError::ProviderNotConfigured { .. }
            | GraderError::PdfiumBinding(_) => ErrorKind::Config,
            GraderError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The 1-indexed page this error is tied to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            GraderError::PageRender { page, .. } | GraderError::OcrService { page, .. } => {
                Some(*page)
            }
            _ => None,
        }
    }
}

/// Failure of a single OCR call.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// Credentials missing, invalid or lacking permission (HTTP 401/403).
    #[error("OCR backend '{backend}' rejected credentials: {detail}")]
    Unauthorized { backend: String, detail: String },

    /// Rate limit or quota exhausted (HTTP 429).
    #[error("OCR backend '{backend}' quota exceeded: {detail}")]
    QuotaExceeded { backend: String, detail: String },

    /// Network-level failure before a response was received.
    #[error("OCR transport error: {0}")]
    Transport(String),

    /// The backend answered with an error status or error payload.
    #[error("OCR service error (status {status}): {message}")]
    Service { status: u16, message: String },

    /// The backend answered but the payload could not be understood.
    #[error("OCR response could not be parsed: {0}")]
    InvalidResponse(String),

    /// The page image could not be encoded for upload.
    #[error("Page image encoding failed: {0}")]
    Encode(String),

    /// The caller-imposed deadline expired.
    #[error("OCR call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A non-fatal loss of text on one page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageDegradation {
    /// OCR failed; the page contributes an empty transcript.
    #[error("Page {page}: OCR failed, page left empty: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// OCR succeeded but no usable text remained after cleaning.
    #[error("Page {page}: no text recognised")]
    EmptyText { page: usize },

    /// Text was recognised but contained no section markers; all of it was dropped.
    #[error("Page {page}: no section markers found, {dropped_chars} chars dropped")]
    NoMarkers { page: usize, dropped_chars: usize },

    /// Text before the first marker was discarded by the leading-fragment policy.
    #[error("Page {page}: {chars} chars before the first marker discarded")]
    LeadingFragmentDropped { page: usize, chars: usize },
}

impl PageDegradation {
    /// The 1-indexed page this degradation belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageDegradation::OcrFailed { page, .. }
            | PageDegradation::EmptyText { page }
            | PageDegradation::NoMarkers { page, .. }
            | PageDegradation::LeadingFragmentDropped { page, .. } => *page,
        }
    }
}

/// Failure of the feedback (grading) model.
#[derive(Debug, Clone, Error)]
pub enum FeedbackError {
    /// The model call failed after all retries.
    #[error("LLM call failed after {retries} retries: {detail}")]
    ModelFailed { retries: u32, detail: String },

    /// The submission transcript was empty; there is nothing to grade.
    #[error("Submission '{what}' contains no text to grade")]
    EmptySubmission { what: String },
}

/// Failure of the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required record field was empty.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// Underlying file I/O failed.
    #[error("Store I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be serialised.
    #[error("Failed to serialise record: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_open_errors_share_a_kind() {
        let errors = [
            GraderError::FileNotFound {
                path: "a.pdf".into(),
            },
            GraderError::NotAPdf {
                path: "a.pdf".into(),
                magic: *b"GIF8",
            },
            GraderError::CorruptPdf {
                path: "a.pdf".into(),
                detail: "bad xref".into(),
            },
            GraderError::PasswordRequired {
                path: "a.pdf".into(),
            },
        ];
        for e in errors {
            assert_eq!(e.kind(), ErrorKind::DocumentOpen, "{e}");
            assert_eq!(e.page(), None);
        }
    }

    #[test]
    fn page_render_display_carries_page() {
        let e = GraderError::PageRender {
            page: 4,
            detail: "corrupt content stream".into(),
        };
        assert_eq!(e.kind(), ErrorKind::PageRender);
        assert_eq!(e.page(), Some(4));
        assert!(e.to_string().contains("page 4"));
    }

    #[test]
    fn ocr_service_error_wraps_source() {
        let e = GraderError::OcrService {
            page: 2,
            source: OcrError::QuotaExceeded {
                backend: "vision".into(),
                detail: "daily limit".into(),
            },
        };
        assert_eq!(e.kind(), ErrorKind::OcrService);
        assert!(e.to_string().contains("page 2"));
        assert!(e.to_string().contains("quota"));
    }

    #[test]
    fn degradation_reports_page() {
        let d = PageDegradation::NoMarkers {
            page: 7,
            dropped_chars: 120,
        };
        assert_eq!(d.page(), 7);
        assert!(d.to_string().contains("120 chars"));
    }

    #[test]
    fn collaborator_errors_convert() {
        let e: GraderError = StoreError::MissingField("name").into();
        assert_eq!(e.kind(), ErrorKind::Storage);
        let e: GraderError = FeedbackError::EmptySubmission {
            what: "answer".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Feedback);
    }
}
