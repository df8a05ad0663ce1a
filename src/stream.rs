//! Streaming transcription API: emit pages as they complete.
//!
//! Large exam bundles take minutes. [`transcribe_stream`] yields each
//! [`PageTranscript`] as soon as its OCR call returns, so callers can show
//! partial results or persist pages incrementally. Pages arrive in
//! completion order; sort by `page_num` if order matters, or use
//! [`crate::output::assemble_text`] after sorting to rebuild the Document
//! Transcript.

use crate::config::PipelineConfig;
use crate::error::GraderError;
use crate::output::PageTranscript;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render;
use crate::transcribe::{inspect, process_page};
use crate::progress::ObserverHandle;
use futures::stream::{self, Stream, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

/// A boxed stream of page transcripts.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageTranscript, GraderError>> + Send>>;

/// Transcribe a PDF, streaming pages as they are ready.
///
/// Returns `Err` up front if the document cannot be opened. After that, a
/// fatal page error (render failure, OCR failure under fail-fast) is yielded
/// as an `Err` item and is always the last item of the stream. Dropping the
/// stream early stops rendering. The observer's `on_document_complete` fires
/// once the stream is drained without an error.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use sheetgrade::backends::{VisionOcr, VisionOcrConfig};
/// use sheetgrade::{transcribe_stream, OcrEngine, PipelineConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ocr: Arc<dyn OcrEngine> = Arc::new(VisionOcr::new(VisionOcrConfig::new("api-key"))?);
/// let mut pages = transcribe_stream("answers.pdf", ocr, PipelineConfig::default()).await?;
/// while let Some(page) = pages.next().await {
///     let page = page?;
///     println!("page {}: {} sections", page.page_num, page.sections.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn transcribe_stream(
    pdf_path: impl AsRef<Path>,
    ocr: Arc<dyn OcrEngine>,
    config: PipelineConfig,
) -> Result<PageStream, GraderError> {
    config.validate()?;
    let path = pdf_path.as_ref();
    info!("Starting streaming transcription: {}", path.display());

    let info = inspect(path, config.password.as_deref()).await?;
    let total_pages = info.page_count;
    if let Some(ref obs) = config.observer {
        obs.on_document_start(total_pages);
    }

    let (rasters, _producer) = render::spawn_rasterizer(
        path,
        config.dpi,
        config.password.clone(),
        config.concurrency,
    );

    let concurrency = config.concurrency.max(1);
    let observer = config.observer.clone();
    let s = rasters
        .map(move |raster| {
            let ocr = Arc::clone(&ocr);
            let cfg = config.clone();
            async move { process_page(ocr.as_ref(), raster?, total_pages, &cfg).await }
        })
        .buffer_unordered(concurrency);

    Ok(Box::pin(finish_document(s, total_pages, observer)))
}

/// End `s` right after its first `Err` item. If `s` runs out without an
/// error, report `on_document_complete` to `observer`.
fn finish_document<S>(
    s: S,
    total_pages: usize,
    observer: Option<ObserverHandle>,
) -> impl Stream<Item = Result<PageTranscript, GraderError>>
where
    S: Stream<Item = Result<PageTranscript, GraderError>>,
{
    stream::unfold(
        (Box::pin(s), 0usize, false),
        move |(mut s, degraded, failed)| {
            let observer = observer.clone();
            async move {
                if failed {
                    return None;
                }
                match s.next().await {
                    Some(Ok(page)) => {
                        let degraded = degraded + usize::from(page.is_degraded());
                        Some((Ok(page), (s, degraded, false)))
                    }
                    Some(Err(e)) => Some((Err(e), (s, degraded, true))),
                    None => {
                        info!(
                            "Streaming transcription complete: {} pages, {} degraded",
                            total_pages, degraded
                        );
                        if let Some(obs) = observer {
                            obs.on_document_complete(total_pages, degraded);
                        }
                        None
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OcrError, PageDegradation};
    use crate::pipeline::render::RasterImage;
    use crate::progress::PipelineObserver;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Blank;

    #[async_trait]
    impl OcrEngine for Blank {
        fn name(&self) -> &str {
            "blank"
        }

        async fn recognize(&self, _image: &RasterImage) -> Result<String, OcrError> {
            Ok(String::new())
        }
    }

    #[derive(Default)]
    struct Completions(Mutex<Vec<(usize, usize)>>);

    impl PipelineObserver for Completions {
        fn on_document_complete(&self, total_pages: usize, degraded_pages: usize) {
            self.0.lock().unwrap().push((total_pages, degraded_pages));
        }
    }

    fn page(page_num: usize, degraded: bool) -> PageTranscript {
        PageTranscript {
            page_num,
            raw_chars: 0,
            cleaned_chars: 0,
            sections: Vec::new(),
            structured: String::new(),
            degradations: if degraded {
                vec![PageDegradation::EmptyText { page: page_num }]
            } else {
                Vec::new()
            },
            duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn error_is_last_item() {
        let items = vec![
            Ok(page(1, false)),
            Err(GraderError::PageRender {
                page: 2,
                detail: "x".into(),
            }),
            Ok(page(3, false)),
        ];
        let obs = Arc::new(Completions::default());
        let handle: ObserverHandle = obs.clone();
        let out: Vec<_> = finish_document(stream::iter(items), 3, Some(handle))
            .collect()
            .await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert!(obs.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_reported_when_exhausted() {
        let items = vec![Ok(page(2, true)), Ok(page(1, false)), Ok(page(3, true))];
        let obs = Arc::new(Completions::default());
        let handle: ObserverHandle = obs.clone();
        let out: Vec<_> = finish_document(stream::iter(items), 3, Some(handle))
            .collect()
            .await;
        assert_eq!(out.len(), 3);
        assert_eq!(*obs.0.lock().unwrap(), vec![(3, 2)]);
    }

    #[tokio::test]
    async fn missing_file_fails_up_front() {
        let ocr: Arc<dyn OcrEngine> = Arc::new(Blank);
        let res = transcribe_stream("/no/such/sheet.pdf", ocr, PipelineConfig::default()).await;
        assert!(matches!(res, Err(GraderError::FileNotFound { .. })));
    }
}
