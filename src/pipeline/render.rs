//! PDF rasterisation: render every page to an RGB raster via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! All pdfium work runs on tokio's blocking pool so async worker threads
//! never stall.
//!
//! ## Bounded producer
//!
//! [`spawn_rasterizer`] renders pages one at a time on a blocking thread and
//! hands them to the async side through a bounded channel. At most
//! `capacity` rasters wait in the channel, so a 300-page exam at 300 DPI
//! never sits in memory all at once. Dropping the receiving stream stops the
//! producer after its current page.

use crate::error::GraderError;
use crate::output::DocumentInfo;
use image::RgbImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Environment variable naming a pdfium shared library or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// One rendered page.
#[derive(Debug, Clone)]
pub struct RasterImage {
    page_num: usize,
    dpi: u32,
    pixels: RgbImage,
}

impl RasterImage {
    pub fn new(page_num: usize, dpi: u32, pixels: RgbImage) -> Self {
        Self {
            page_num,
            dpi,
            pixels,
        }
    }

    /// 1-indexed page number.
    pub fn page_num(&self) -> usize {
        self.page_num
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Packed RGB8 bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

/// Pixel dimensions of a page `width_pt` × `height_pt` points at `dpi`.
pub fn pixel_size(width_pt: f32, height_pt: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let px = |pt: f32| ((pt * scale).round() as u32).max(1);
    (px(width_pt), px(height_pt))
}

// ── Binding ──────────────────────────────────────────────────────────────

/// Bind to a pdfium library.
///
/// Search order: `PDFIUM_LIB_PATH` (a library file or the directory holding
/// it), the working directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, GraderError> {
    if let Ok(value) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        let path = PathBuf::from(value);
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| GraderError::PdfiumBinding(format!("{}: {}", lib.display(), e)));
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(local_err) => Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|_| GraderError::PdfiumBinding(local_err.to_string())),
    }
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, GraderError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                GraderError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                GraderError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            GraderError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

// ── Inspection ───────────────────────────────────────────────────────────

/// Open a PDF and read its page count and metadata without rendering.
pub async fn inspect_document(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, GraderError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || inspect_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| GraderError::Internal(format!("Inspect task panicked: {}", e)))?
}

fn inspect_blocking(pdf_path: &Path, password: Option<&str>) -> Result<DocumentInfo, GraderError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Stream of rendered pages in ascending page order.
pub type RasterStream = ReceiverStream<Result<RasterImage, GraderError>>;

/// Start rendering every page of `pdf_path` at `dpi` on a blocking thread.
///
/// Pages arrive in order. The first failure is sent as an `Err` and ends the
/// stream. `capacity` bounds how many rendered pages may wait unconsumed.
pub fn spawn_rasterizer(
    pdf_path: &Path,
    dpi: u32,
    password: Option<String>,
    capacity: usize,
) -> (RasterStream, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let path = pdf_path.to_path_buf();

    let handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = rasterize_blocking(&path, dpi, password.as_deref(), &tx) {
            // Receiver may already be gone; nothing else to report to.
            let _ = tx.blocking_send(Err(e));
        }
    });

    (ReceiverStream::new(rx), handle)
}

fn rasterize_blocking(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
    tx: &mpsc::Sender<Result<RasterImage, GraderError>>,
) -> Result<(), GraderError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;
    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages, rendering at {} DPI", total, dpi);

    for idx in 0..total {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| GraderError::PageRender {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let (width, height) = pixel_size(page.width().value, page.height().value, dpi);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| GraderError::PageRender {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let pixels = bitmap.as_image().into_rgb8();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            pixels.width(),
            pixels.height()
        );

        if tx
            .blocking_send(Ok(RasterImage::new(page_num, dpi, pixels)))
            .is_err()
        {
            debug!("Raster consumer dropped after page {}; stopping", page_num);
            return Ok(());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size_letter_at_300_dpi() {
        assert_eq!(pixel_size(612.0, 792.0, 300), (2550, 3300));
    }

    #[test]
    fn test_pixel_size_a4_at_150_dpi() {
        assert_eq!(pixel_size(595.0, 842.0, 150), (1240, 1754));
    }

    #[test]
    fn test_pixel_size_never_zero() {
        assert_eq!(pixel_size(0.1, 0.0, 72), (1, 1));
    }

    #[test]
    fn test_raster_accessors() {
        let img = RasterImage::new(3, 300, RgbImage::new(4, 2));
        assert_eq!(img.page_num(), 3);
        assert_eq!(img.dpi(), 300);
        assert_eq!((img.width(), img.height()), (4, 2));
        assert_eq!(img.as_raw().len(), 4 * 2 * 3);
    }
}
