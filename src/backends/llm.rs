//! Vision-LLM OCR backend.
//!
//! Sends each page as a lossless PNG with a plain-text transcription prompt
//! through any `edgequake-llm` provider that accepts images. Slower and
//! costlier than Cloud Vision but copes better with messy handwriting.

use crate::error::OcrError;
use crate::pipeline::encode;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::RasterImage;
use crate::prompts::OCR_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "llm";

/// Settings for [`LlmOcr`].
#[derive(Debug, Clone)]
pub struct LlmOcrConfig {
    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,
    /// Maximum output tokens per page. Default: 4096.
    pub max_tokens: usize,
    /// Overrides [`OCR_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for LlmOcrConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
            system_prompt: None,
        }
    }
}

/// OCR through a vision language model.
pub struct LlmOcr {
    provider: Arc<dyn LLMProvider>,
    config: LlmOcrConfig,
}

impl LlmOcr {
    pub fn new(provider: Arc<dyn LLMProvider>, config: LlmOcrConfig) -> Self {
        Self { provider, config }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl OcrEngine for LlmOcr {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn recognize(&self, image: &RasterImage) -> Result<String, OcrError> {
        let image_data = encode::encode_png_image_data(image)?;
        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(OCR_SYSTEM_PROMPT);

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images("", vec![image_data]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        debug!(
            "LLM OCR page {}: {} input tokens, {} output tokens",
            image.page_num(),
            response.prompt_tokens,
            response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Map a provider error message onto an [`OcrError`] kind.
///
/// Providers surface HTTP failures as formatted strings, so the status is
/// recovered by inspection.
fn classify_provider_error(msg: &str) -> OcrError {
    let lower = msg.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota") {
        OcrError::QuotaExceeded {
            backend: BACKEND.into(),
            detail: msg.to_string(),
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("api key")
    {
        OcrError::Unauthorized {
            backend: BACKEND.into(),
            detail: msg.to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        OcrError::Transport(msg.to_string())
    } else {
        OcrError::Service {
            status: 0,
            message: msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_deterministic() {
        let cfg = LlmOcrConfig::default();
        assert_eq!(cfg.temperature, 0.0);
        assert_eq!(cfg.max_tokens, 4096);
        assert!(cfg.system_prompt.is_none());
    }

    #[test]
    fn provider_errors_are_classified() {
        assert!(matches!(
            classify_provider_error("HTTP 429 Too Many Requests"),
            OcrError::QuotaExceeded { .. }
        ));
        assert!(matches!(
            classify_provider_error("Invalid API key provided"),
            OcrError::Unauthorized { .. }
        ));
        assert!(matches!(
            classify_provider_error("request timed out"),
            OcrError::Transport(_)
        ));
        assert!(matches!(
            classify_provider_error("model overloaded"),
            OcrError::Service { .. }
        ));
    }
}
