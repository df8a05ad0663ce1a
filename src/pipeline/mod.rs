//! Pipeline stages for answer-sheet transcription.
//!
//! Each submodule implements one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr (encode) ──▶ structure
//! (%PDF)    (pdfium)   (backend)        (sections)
//! ```
//!
//! 1. [`input`]     — check the path exists and carries the `%PDF` magic
//! 2. [`render`]    — rasterise pages on a blocking thread into a bounded
//!    channel
//! 3. [`ocr`]       — the [`ocr::OcrEngine`] seam; backends use [`encode`] to
//!    serialise rasters for upload
//! 4. [`structure`] — clean the OCR text and split it at question markers

pub mod encode;
pub mod input;
pub mod ocr;
pub mod render;
pub mod structure;
