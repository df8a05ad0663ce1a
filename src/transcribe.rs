//! Eager (full-document) transcription entry points.
//!
//! [`transcribe`] waits for every page and returns the assembled
//! [`DocumentTranscript`]. Use [`crate::stream::transcribe_stream`] to receive
//! pages as they finish instead.
//!
//! Pages are rendered one at a time into a bounded channel and recognised
//! concurrently (up to `config.concurrency` calls in flight). Results are
//! re-sorted by page number, so output never depends on completion order.

use crate::config::{OcrFailurePolicy, PipelineConfig};
use crate::error::{GraderError, PageDegradation};
use crate::output::{DocumentInfo, DocumentTranscript, PageTranscript, TranscriptStats};
use crate::pipeline::ocr::{self, OcrEngine};
use crate::pipeline::render::{self, RasterImage};
use crate::pipeline::{input, structure};
use futures::stream::{Stream, StreamExt, TryStreamExt};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Transcribe a PDF answer sheet.
///
/// # Returns
/// `Ok(DocumentTranscript)` with exactly one page block per PDF page, even if
/// OCR failed for some pages under [`OcrFailurePolicy::DegradeToEmpty`]
/// (check `output.stats.degraded_pages`).
///
/// # Errors
/// Fatal errors only:
/// - file missing, unreadable, not a PDF, corrupt or locked
/// - a page that cannot be rasterised
/// - an OCR failure under [`OcrFailurePolicy::FailFast`]
///
/// # Example
/// ```rust,no_run
/// use sheetgrade::backends::{VisionOcr, VisionOcrConfig};
/// use sheetgrade::{transcribe, OcrEngine, PipelineConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ocr: Arc<dyn OcrEngine> = Arc::new(VisionOcr::new(VisionOcrConfig::new("api-key"))?);
/// let output = transcribe("answers.pdf", &ocr, &PipelineConfig::default()).await?;
/// print!("{}", output.text);
/// # Ok(())
/// # }
/// ```
pub async fn transcribe(
    pdf_path: impl AsRef<Path>,
    ocr: &Arc<dyn OcrEngine>,
    config: &PipelineConfig,
) -> Result<DocumentTranscript, GraderError> {
    config.validate()?;
    let total_start = Instant::now();
    let path = pdf_path.as_ref();
    info!("Starting transcription: {} (OCR: {})", path.display(), ocr.name());

    // ── Step 1: Validate and open ────────────────────────────────────────
    let info = inspect(path, config.password.as_deref()).await?;
    let total_pages = info.page_count;
    info!("PDF has {} pages", total_pages);

    if let Some(ref obs) = config.observer {
        obs.on_document_start(total_pages);
    }

    // ── Step 2: Render → OCR → structure ─────────────────────────────────
    let (rasters, producer) = render::spawn_rasterizer(
        path,
        config.dpi,
        config.password.clone(),
        config.concurrency,
    );
    let pages = run_pages(rasters, total_pages, ocr.as_ref(), config).await?;
    producer
        .await
        .map_err(|e| GraderError::Internal(format!("Render task panicked: {}", e)))?;

    // ── Step 3: Assemble ─────────────────────────────────────────────────
    let output = DocumentTranscript::assemble(
        pages,
        info,
        total_start.elapsed().as_millis() as u64,
    );

    info!(
        "Transcription complete: {} pages, {} sections, {} degraded, {}ms",
        output.stats.total_pages,
        output.stats.total_sections,
        output.stats.degraded_pages,
        output.stats.total_duration_ms
    );

    if let Some(ref obs) = config.observer {
        obs.on_document_complete(output.stats.total_pages, output.stats.degraded_pages);
    }

    Ok(output)
}

/// Transcribe a PDF and write the Document Transcript to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed run never leaves a
/// partial transcript behind.
pub async fn transcribe_to_file(
    pdf_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    ocr: &Arc<dyn OcrEngine>,
    config: &PipelineConfig,
) -> Result<TranscriptStats, GraderError> {
    let output = transcribe(pdf_path, ocr, config).await?;
    write_transcript(output_path.as_ref(), &output.text).await?;
    Ok(output.stats)
}

/// Write `text` to `path` atomically, creating parent directories.
pub async fn write_transcript(path: &Path, text: &str) -> Result<(), GraderError> {
    let write_err = |e: std::io::Error| GraderError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, text).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

/// Synchronous wrapper around [`transcribe`].
///
/// Creates a temporary tokio runtime internally; do not call from inside an
/// async context.
pub fn transcribe_sync(
    pdf_path: impl AsRef<Path>,
    ocr: &Arc<dyn OcrEngine>,
    config: &PipelineConfig,
) -> Result<DocumentTranscript, GraderError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| GraderError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(transcribe(pdf_path, ocr, config))
}

/// Transcribe PDF bytes held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed on return.
pub async fn transcribe_bytes(
    bytes: &[u8],
    ocr: &Arc<dyn OcrEngine>,
    config: &PipelineConfig,
) -> Result<DocumentTranscript, GraderError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| GraderError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| GraderError::Internal(format!("tempfile write: {e}")))?;
    // `tmp` is dropped (and the file deleted) when `transcribe` returns
    transcribe(tmp.path(), ocr, config).await
}

/// Read page count and metadata without rendering or OCR.
pub async fn inspect(
    pdf_path: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentInfo, GraderError> {
    let path = pdf_path.as_ref();
    input::validate_pdf_path(path)?;
    render::inspect_document(path, password).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Drive rendered pages through OCR and structuring, then sort by page.
///
/// Stops at the first error; dropping `rasters` closes the channel and halts
/// the renderer.
pub(crate) async fn run_pages<S>(
    rasters: S,
    total_pages: usize,
    ocr: &dyn OcrEngine,
    config: &PipelineConfig,
) -> Result<Vec<PageTranscript>, GraderError>
where
    S: Stream<Item = Result<RasterImage, GraderError>>,
{
    let mut pages: Vec<PageTranscript> = rasters
        .map(move |raster| async move { process_page(ocr, raster?, total_pages, config).await })
        .buffer_unordered(config.concurrency.max(1))
        .try_collect()
        .await?;

    pages.sort_by_key(|p| p.page_num);

    if pages.len() != total_pages {
        return Err(GraderError::Internal(format!(
            "renderer produced {} of {} pages",
            pages.len(),
            total_pages
        )));
    }
    Ok(pages)
}

/// OCR and structure one page.
pub(crate) async fn process_page(
    ocr: &dyn OcrEngine,
    raster: RasterImage,
    total_pages: usize,
    config: &PipelineConfig,
) -> Result<PageTranscript, GraderError> {
    let page_num = raster.page_num();
    let start = Instant::now();

    if let Some(ref obs) = config.observer {
        obs.on_page_start(page_num, total_pages);
    }
    debug!(
        "OCR page {}/{} ({}x{} px) via {}",
        page_num,
        total_pages,
        raster.width(),
        raster.height(),
        ocr.name()
    );

    let outcome = ocr::recognize_with_deadline(ocr, &raster, config.ocr_timeout_secs).await;
    drop(raster);

    let mut degradations = Vec::new();
    let raw = match outcome {
        Ok(text) => text,
        Err(e) => match config.ocr_failure {
            OcrFailurePolicy::FailFast => {
                return Err(GraderError::OcrService {
                    page: page_num,
                    source: e,
                })
            }
            OcrFailurePolicy::DegradeToEmpty => {
                degradations.push(PageDegradation::OcrFailed {
                    page: page_num,
                    detail: e.to_string(),
                });
                String::new()
            }
        },
    };

    let structured = structure::structure_text(&raw, config.leading_fragment);

    if degradations.is_empty() {
        if structured.cleaned_len == 0 {
            degradations.push(PageDegradation::EmptyText { page: page_num });
        } else if let Some(ref fragment) = structured.discarded_fragment {
            degradations.push(if structured.markers == 0 {
                PageDegradation::NoMarkers {
                    page: page_num,
                    dropped_chars: structured.cleaned_len,
                }
            } else {
                PageDegradation::LeadingFragmentDropped {
                    page: page_num,
                    chars: fragment.len(),
                }
            });
        }
    }

    for d in &degradations {
        warn!("{}", d);
        if let Some(ref obs) = config.observer {
            obs.on_page_degraded(page_num, total_pages, d);
        }
    }

    let page = PageTranscript {
        page_num,
        raw_chars: raw.chars().count(),
        cleaned_chars: structured.cleaned_len,
        structured: structured.render(),
        sections: structured.sections,
        degradations,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    if let Some(ref obs) = config.observer {
        obs.on_page_complete(page_num, total_pages, page.sections.len());
    }
    debug!(
        "Page {} structured: {} sections in {}ms",
        page_num,
        page.sections.len(),
        page.duration_ms
    );

    Ok(page)
}
