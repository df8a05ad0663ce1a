//! # sheetgrade
//!
//! Turn scanned PDF answer sheets into structured question/answer transcripts
//! and grade them with a language model.
//!
//! ## Why this crate?
//!
//! Handwritten exam scans carry no text layer. This crate rasterises each
//! page, runs it through an OCR backend and re-segments the noisy result at
//! the sheet's own question markers (`Q.`, `Question`, `UNIT TEST`,
//! `PART-A`…), so a grader model sees one block per question instead of a
//! wall of text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      check the file exists and starts with %PDF
//!  ├─ 2. Render     rasterise pages via pdfium (spawn_blocking, bounded channel)
//!  ├─ 3. OCR        concurrent calls to Cloud Vision or a vision LLM
//!  ├─ 4. Structure  clean text, split at markers, render === label === blocks
//!  └─ 5. Output     "Page N:" blocks in page order + per-page stats
//! ```
//!
//! Grading ([`feedback`]) and result persistence ([`store`]) sit downstream
//! of the transcript and are optional.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheetgrade::backends::{VisionOcr, VisionOcrConfig};
//! use sheetgrade::{transcribe, OcrEngine, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = std::env::var("GOOGLE_VISION_API_KEY")?;
//!     let ocr: Arc<dyn OcrEngine> = Arc::new(VisionOcr::new(VisionOcrConfig::new(key))?);
//!     let output = transcribe("answers.pdf", &ocr, &PipelineConfig::default()).await?;
//!     print!("{}", output.text);
//!     eprintln!("{} sections, {} degraded pages",
//!         output.stats.total_sections,
//!         output.stats.degraded_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sheetgrade` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! sheetgrade = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backends;
pub mod config;
pub mod error;
pub mod feedback;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod store;
pub mod stream;
pub mod transcribe;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LeadingFragment, OcrFailurePolicy, PipelineConfig, PipelineConfigBuilder};
pub use error::{ErrorKind, FeedbackError, GraderError, OcrError, PageDegradation, StoreError};
pub use feedback::{extract_grade, Feedback, FeedbackConfig, FeedbackModel, Grader, LlmFeedbackModel};
pub use output::{DocumentInfo, DocumentTranscript, PageTranscript, TranscriptStats};
pub use pipeline::ocr::OcrEngine;
pub use pipeline::render::RasterImage;
pub use pipeline::structure::{clean_text, structure_page, structure_text, Section, StructuredPage};
pub use progress::{NoopObserver, PipelineObserver};
pub use provider::resolve_provider;
pub use store::{GradedResult, JsonlStore, MemoryStore, RecordId, ResultStore, StudentIdentity};
pub use stream::{transcribe_stream, PageStream};
pub use transcribe::{inspect, transcribe, transcribe_bytes, transcribe_sync, transcribe_to_file};
