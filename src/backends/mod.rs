//! Concrete [`crate::OcrEngine`] backends.
//!
//! | Backend       | Service                         | Upload format |
//! |---------------|---------------------------------|---------------|
//! | [`VisionOcr`] | Google Cloud Vision, API key    | JPEG          |
//! | [`LlmOcr`]    | any `edgequake-llm` vision model | PNG           |
//!
//! Both are built from an explicit config object; nothing reads process-wide
//! credentials behind the caller's back.

pub mod llm;
pub mod vision;

pub use llm::{LlmOcr, LlmOcrConfig};
pub use vision::{VisionOcr, VisionOcrConfig, DEFAULT_VISION_ENDPOINT};
