//! Observer trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! each page is rasterised, recognised and structured. Every
//! [`PageDegradation`] (failed OCR call, empty page, page without section
//! markers, discarded header text) is reported through
//! [`PipelineObserver::on_page_degraded`] in addition to being logged with
//! `tracing::warn!` and stored on the page transcript.
//!
//! # Example
//!
//! ```rust
//! use sheetgrade::{PageDegradation, PipelineConfig, PipelineObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct LossCounter(AtomicUsize);
//!
//! impl PipelineObserver for LossCounter {
//!     fn on_page_degraded(&self, _page: usize, _total: usize, _d: &PageDegradation) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(LossCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::PageDegradation;
use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the page
/// methods are called concurrently from different tasks. All methods default
/// to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// Called once after the document is opened, before any page is rendered.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the OCR request is sent for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's structured transcript is ready.
    ///
    /// `sections` is the number of sections emitted (may be zero).
    fn on_page_complete(&self, page_num: usize, total_pages: usize, sections: usize) {
        let _ = (page_num, total_pages, sections);
    }

    /// Called for every non-fatal loss of text on a page.
    fn on_page_degraded(&self, page_num: usize, total_pages: usize, degradation: &PageDegradation) {
        let _ = (page_num, total_pages, degradation);
    }

    /// Called once after every page has been processed successfully.
    ///
    /// `degraded_pages` counts pages with at least one degradation.
    fn on_document_complete(&self, total_pages: usize, degraded_pages: usize) {
        let _ = (total_pages, degraded_pages);
    }
}

/// A no-op observer.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Shared observer handle as stored in [`crate::config::PipelineConfig`].
pub type ObserverHandle = Arc<dyn PipelineObserver>;
