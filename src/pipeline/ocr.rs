//! The OCR seam: anything that turns a page raster into raw text.
//!
//! Backends live in [`crate::backends`]. Tests and callers with their own
//! OCR service implement [`OcrEngine`] directly.

use crate::error::OcrError;
use crate::pipeline::render::RasterImage;
use async_trait::async_trait;
use std::time::Duration;

/// Recognises text in a page image.
///
/// Implementations must be `Send + Sync`; the pipeline calls `recognize`
/// concurrently for different pages through a shared `Arc<dyn OcrEngine>`.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Return the full recognised text of `image`, or an empty string if the
    /// page has no text.
    async fn recognize(&self, image: &RasterImage) -> Result<String, OcrError>;
}

/// Run `engine.recognize`, failing with [`OcrError::Timeout`] after `secs`.
pub async fn recognize_with_deadline(
    engine: &dyn OcrEngine,
    image: &RasterImage,
    secs: Option<u64>,
) -> Result<String, OcrError> {
    match secs {
        None => engine.recognize(image).await,
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), engine.recognize(image))
            .await
            .map_err(|_| OcrError::Timeout { secs })?,
    }
}
