//! Image encoding for upload to an OCR backend.
//!
//! Cloud Vision takes base64 JPEG in the JSON body; quality 90 keeps pen
//! strokes legible at a fraction of the PNG size. Vision LLMs get lossless
//! PNG wrapped in [`ImageData`] with `detail: "high"` so handwriting is not
//! downsampled into a single overview tile.

use crate::error::OcrError;
use crate::pipeline::render::RasterImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;

/// Encode a page as base64 JPEG at `quality` (1–100).
pub fn encode_jpeg_base64(img: &RasterImage, quality: u8) -> Result<String, OcrError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(img.pixels())
        .map_err(|e| OcrError::Encode(format!("page {}: {}", img.page_num(), e)))?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded page {} as JPEG → {} bytes base64",
        img.page_num(),
        b64.len()
    );
    Ok(b64)
}

/// Encode a page as a base64 PNG [`ImageData`] for a vision LLM.
pub fn encode_png_image_data(img: &RasterImage) -> Result<ImageData, OcrError> {
    let mut buf = Vec::new();
    img.pixels()
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| OcrError::Encode(format!("page {}: {}", img.page_num(), e)))?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded page {} as PNG → {} bytes base64",
        img.page_num(),
        b64.len()
    );
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn red_page() -> RasterImage {
        RasterImage::new(1, 300, RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])))
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let b64 = encode_jpeg_base64(&red_page(), 90).expect("encode should succeed");
        let decoded = STANDARD.decode(b64).expect("valid base64");
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn png_image_data() {
        let data = encode_png_image_data(&red_page()).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }
}
