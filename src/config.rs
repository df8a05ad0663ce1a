//! Configuration types for answer-sheet transcription.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The OCR engine itself is not part of the
//! config: it is constructed from its own config object
//! ([`crate::backends::VisionOcrConfig`], [`crate::backends::LlmOcrConfig`])
//! and handed to [`crate::transcribe::transcribe`] alongside this struct, so
//! credentials and clients live exactly as long as the run that uses them.

use crate::error::GraderError;
use crate::progress::{ObserverHandle, PipelineObserver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default rasterisation resolution.
pub const DEFAULT_DPI: u32 = 300;

/// Configuration for one document transcription run.
///
/// # Example
/// ```rust
/// use sheetgrade::{LeadingFragment, OcrFailurePolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .concurrency(2)
///     .leading_fragment(LeadingFragment::Keep)
///     .ocr_failure(OcrFailurePolicy::FailFast)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rasterisation DPI. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Maximum number of pages in flight (rendered but not yet OCR'd). Default: 4.
    ///
    /// `1` reproduces strictly sequential processing. Output order does not
    /// depend on this value.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// What to do with text found before the first section marker on a page.
    pub leading_fragment: LeadingFragment,

    /// What to do when the OCR backend fails for a page.
    pub ocr_failure: OcrFailurePolicy,

    /// Per-page OCR deadline in seconds. `None` leaves timing to the backend.
    pub ocr_timeout_secs: Option<u64>,

    /// Receives page-level events, including every degradation.
    pub observer: Option<ObserverHandle>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            concurrency: 4,
            password: None,
            leading_fragment: LeadingFragment::default(),
            ocr_failure: OcrFailurePolicy::default(),
            ocr_timeout_secs: None,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("leading_fragment", &self.leading_fragment)
            .field("ocr_failure", &self.ocr_failure)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the constraints [`PipelineConfigBuilder::build`] enforces.
    ///
    /// Entry points call this again, since the fields are public and a
    /// struct literal bypasses the builder.
    pub fn validate(&self) -> Result<(), GraderError> {
        if !(72..=600).contains(&self.dpi) {
            return Err(GraderError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                self.dpi
            )));
        }
        if self.concurrency == 0 {
            return Err(GraderError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if self.ocr_timeout_secs == Some(0) {
            return Err(GraderError::InvalidConfig(
                "OCR timeout must be at least 1 second".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Values outside 72–600 are rejected by [`Self::build`].
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn leading_fragment(mut self, policy: LeadingFragment) -> Self {
        self.config.leading_fragment = policy;
        self
    }

    pub fn ocr_failure(mut self, policy: OcrFailurePolicy) -> Self {
        self.config.ocr_failure = policy;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = Some(secs);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, GraderError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Policy for page text that precedes the first section marker.
///
/// Typical content there is a sheet header (student name, roll number, exam
/// title) or OCR noise from the page margin. Whitespace-only fragments are
/// dropped under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeadingFragment {
    /// Drop the fragment and record a
    /// [`crate::error::PageDegradation::LeadingFragmentDropped`]. (default)
    #[default]
    Discard,
    /// Emit the fragment as an unlabeled first section.
    Keep,
}

/// Policy for a failed OCR call on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrFailurePolicy {
    /// The page contributes an empty structured transcript and the run
    /// continues. (default)
    #[default]
    DegradeToEmpty,
    /// Abort the document with [`GraderError::OcrService`].
    FailFast,
}
