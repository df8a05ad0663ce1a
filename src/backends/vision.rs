//! Google Cloud Vision OCR backend (`images:annotate`, `TEXT_DETECTION`).
//!
//! Each page is JPEG-encoded, base64-embedded in the JSON request and sent
//! with an API key. The first text annotation holds the full page text.

use crate::error::{GraderError, OcrError};
use crate::pipeline::encode;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::RasterImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

const BACKEND: &str = "vision";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for [`VisionOcr`].
#[derive(Clone)]
pub struct VisionOcrConfig {
    /// Cloud Vision API key.
    pub api_key: String,
    /// Annotate endpoint. Override to point at a proxy or emulator.
    pub endpoint: String,
    /// HTTP timeout per request. Default: 60.
    pub timeout_secs: u64,
    /// JPEG quality for uploaded pages. Default: 90.
    pub jpeg_quality: u8,
    /// BCP-47 language hints. Default: `["en"]`.
    pub language_hints: Vec<String>,
}

impl VisionOcrConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            timeout_secs: 60,
            jpeg_quality: 90,
            language_hints: vec!["en".to_string()],
        }
    }
}

impl fmt::Debug for VisionOcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionOcrConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("language_hints", &self.language_hints)
            .finish()
    }
}

/// Cloud Vision text detection.
pub struct VisionOcr {
    client: reqwest::Client,
    config: VisionOcrConfig,
}

impl VisionOcr {
    pub fn new(config: VisionOcrConfig) -> Result<Self, GraderError> {
        if config.api_key.trim().is_empty() {
            return Err(GraderError::InvalidConfig(
                "Cloud Vision API key is empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraderError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn recognize(&self, image: &RasterImage) -> Result<String, OcrError> {
        let content = encode::encode_jpeg_base64(image, self.config.jpeg_quality)?;
        let body = build_request(content, &self.config.language_hints);

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Timeout {
                        secs: self.config.timeout_secs,
                    }
                } else {
                    OcrError::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::InvalidResponse(e.without_url().to_string()))?;

        let text = extract_text(parsed)?;
        debug!(
            "Vision OCR page {}: {} chars",
            image.page_num(),
            text.chars().count()
        );
        Ok(text)
    }
}

fn classify_status(status: u16, message: String) -> OcrError {
    match status {
        401 | 403 => OcrError::Unauthorized {
            backend: BACKEND.into(),
            detail: message,
        },
        429 => OcrError::QuotaExceeded {
            backend: BACKEND.into(),
            detail: message,
        },
        _ => OcrError::Service { status, message },
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_context: Option<ImageContext>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<String>,
}

fn build_request(content: String, language_hints: &[String]) -> AnnotateRequest {
    AnnotateRequest {
        requests: vec![ImageRequest {
            image: ImageContent { content },
            features: vec![Feature {
                kind: "TEXT_DETECTION",
            }],
            image_context: (!language_hints.is_empty()).then(|| ImageContext {
                language_hints: language_hints.to_vec(),
            }),
        }],
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<RpcStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Pull the page text out of an annotate response.
///
/// A page with no detected text yields `""`. A per-image `error` object is
/// mapped from its gRPC code.
fn extract_text(resp: AnnotateResponse) -> Result<String, OcrError> {
    let first = resp
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| OcrError::InvalidResponse("empty responses array".into()))?;

    if let Some(err) = first.error {
        return Err(match err.code {
            // UNAUTHENTICATED, PERMISSION_DENIED
            16 | 7 => OcrError::Unauthorized {
                backend: BACKEND.into(),
                detail: err.message,
            },
            // RESOURCE_EXHAUSTED
            8 => OcrError::QuotaExceeded {
                backend: BACKEND.into(),
                detail: err.message,
            },
            code => OcrError::Service {
                status: code.max(0) as u16,
                message: err.message,
            },
        });
    }

    if let Some(annotation) = first.text_annotations.into_iter().next() {
        return Ok(annotation.description);
    }
    Ok(first
        .full_text_annotation
        .map(|f| f.text)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_error_does_not_leak_key() {
        let mut config = VisionOcrConfig::new("SECRET-KEY-123");
        config.endpoint = "http://127.0.0.1:1/v1/images:annotate".into();
        let ocr = VisionOcr::new(config).unwrap();
        let image = RasterImage::new(1, 72, image::RgbImage::new(8, 8));

        let err = ocr.recognize(&image).await.unwrap_err();
        assert!(matches!(err, OcrError::Transport(_) | OcrError::Timeout { .. }));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        assert!(!format!("{err:?}").contains("SECRET-KEY-123"));
    }

    fn parse(json: &str) -> Result<String, OcrError> {
        extract_text(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn first_annotation_is_the_page_text() {
        let text = parse(
            r#"{"responses":[{"textAnnotations":[
                {"description":"Q. What is 2+2?\nA: 4"},
                {"description":"Q."}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(text, "Q. What is 2+2?\nA: 4");
    }

    #[test]
    fn blank_page_is_empty_text() {
        assert_eq!(parse(r#"{"responses":[{}]}"#).unwrap(), "");
    }

    #[test]
    fn full_text_fallback() {
        let text = parse(r#"{"responses":[{"fullTextAnnotation":{"text":"PART-A x"}}]}"#).unwrap();
        assert_eq!(text, "PART-A x");
    }

    #[test]
    fn missing_responses_is_invalid() {
        assert!(matches!(parse("{}"), Err(OcrError::InvalidResponse(_))));
    }

    #[test]
    fn per_image_errors_are_classified() {
        let quota = parse(r#"{"responses":[{"error":{"code":8,"message":"quota"}}]}"#);
        assert!(matches!(quota, Err(OcrError::QuotaExceeded { .. })));

        let auth = parse(r#"{"responses":[{"error":{"code":7,"message":"denied"}}]}"#);
        assert!(matches!(auth, Err(OcrError::Unauthorized { .. })));

        let other = parse(r#"{"responses":[{"error":{"code":3,"message":"bad image"}}]}"#);
        match other {
            Err(OcrError::Service { status, message }) => {
                assert_eq!(status, 3);
                assert_eq!(message, "bad image");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn http_status_classification() {
        assert!(matches!(
            classify_status(401, String::new()),
            OcrError::Unauthorized { .. }
        ));
        assert!(matches!(
            classify_status(403, String::new()),
            OcrError::Unauthorized { .. }
        ));
        assert!(matches!(
            classify_status(429, String::new()),
            OcrError::QuotaExceeded { .. }
        ));
        assert!(matches!(
            classify_status(500, "boom".into()),
            OcrError::Service { status: 500, .. }
        ));
    }

    #[test]
    fn request_shape() {
        let body = build_request("AAAA".into(), &["en".to_string()]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["requests"][0]["image"]["content"], "AAAA");
        assert_eq!(json["requests"][0]["features"][0]["type"], "TEXT_DETECTION");
        assert_eq!(json["requests"][0]["imageContext"]["languageHints"][0], "en");

        let bare = serde_json::to_value(build_request("A".into(), &[])).unwrap();
        assert!(bare["requests"][0].get("imageContext").is_none());
    }

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(
            VisionOcr::new(VisionOcrConfig::new("  ")),
            Err(GraderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let dbg = format!("{:?}", VisionOcrConfig::new("secret-key"));
        assert!(!dbg.contains("secret-key"));
    }
}
