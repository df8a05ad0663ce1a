//! Output types: per-page transcripts, the assembled document transcript and
//! run statistics.
//!
//! Everything here is `Serialize + Deserialize` so a run can be dumped as
//! JSON (`sheetgrade --json`) and reloaded later.

use crate::error::PageDegradation;
use crate::pipeline::structure::Section;
use serde::{Deserialize, Serialize};

/// Basic document facts read when the PDF is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Transcript of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTranscript {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Characters returned by the OCR backend (0 if it failed).
    pub raw_chars: usize,
    /// Bytes left after cleaning.
    pub cleaned_chars: usize,
    /// Sections in marker order.
    pub sections: Vec<Section>,
    /// The page's Structured Transcript.
    pub structured: String,
    /// Every non-fatal text loss on this page.
    pub degradations: Vec<PageDegradation>,
    /// Wall-clock time spent on OCR and structuring.
    pub duration_ms: u64,
}

impl PageTranscript {
    /// `"Page {n}:\n{structured}\n"`.
    pub fn render_block(&self) -> String {
        format!("Page {}:\n{}\n", self.page_num, self.structured)
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn ocr_failed(&self) -> bool {
        self.degradations
            .iter()
            .any(|d| matches!(d, PageDegradation::OcrFailed { .. }))
    }
}

/// Aggregate counters for a document run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptStats {
    pub total_pages: usize,
    /// Pages that produced at least one section.
    pub pages_with_sections: usize,
    /// Pages with at least one degradation.
    pub degraded_pages: usize,
    /// Pages whose OCR call failed.
    pub ocr_failures: usize,
    pub total_sections: usize,
    pub total_duration_ms: u64,
}

/// The full result of transcribing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTranscript {
    /// The Document Transcript: page blocks in ascending page order.
    pub text: String,
    /// One entry per page, ascending.
    pub pages: Vec<PageTranscript>,
    pub info: DocumentInfo,
    pub stats: TranscriptStats,
}

impl DocumentTranscript {
    /// Assemble from page transcripts. `pages` must already be sorted.
    pub fn assemble(pages: Vec<PageTranscript>, info: DocumentInfo, total_duration_ms: u64) -> Self {
        let text = assemble_text(&pages);
        let stats = TranscriptStats {
            total_pages: pages.len(),
            pages_with_sections: pages.iter().filter(|p| !p.sections.is_empty()).count(),
            degraded_pages: pages.iter().filter(|p| p.is_degraded()).count(),
            ocr_failures: pages.iter().filter(|p| p.ocr_failed()).count(),
            total_sections: pages.iter().map(|p| p.sections.len()).sum(),
            total_duration_ms,
        };
        Self {
            text,
            pages,
            info,
            stats,
        }
    }

    /// `true` when no page produced a section; there is nothing to grade.
    pub fn is_blank(&self) -> bool {
        self.stats.total_sections == 0
    }
}

/// Concatenate page blocks in the given order.
pub fn assemble_text(pages: &[PageTranscript]) -> String {
    pages.iter().map(PageTranscript::render_block).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page_num: usize, structured: &str, sections: Vec<Section>) -> PageTranscript {
        PageTranscript {
            page_num,
            raw_chars: structured.len(),
            cleaned_chars: structured.len(),
            sections,
            structured: structured.to_string(),
            degradations: vec![],
            duration_ms: 0,
        }
    }

    #[test]
    fn empty_page_block_keeps_header() {
        assert_eq!(page(3, "", vec![]).render_block(), "Page 3:\n\n");
    }

    #[test]
    fn assemble_concatenates_in_order() {
        let s = Section {
            label: Some("Q.".into()),
            content: "one".into(),
        };
        let pages = vec![
            page(1, "\n\n=== Q. ===\none\n", vec![s]),
            page(2, "", vec![]),
        ];
        let doc = DocumentTranscript::assemble(pages, DocumentInfo::default(), 5);
        assert_eq!(doc.text, "Page 1:\n\n\n=== Q. ===\none\n\nPage 2:\n\n");
        assert_eq!(doc.stats.total_pages, 2);
        assert_eq!(doc.stats.pages_with_sections, 1);
        assert_eq!(doc.stats.total_sections, 1);
        assert!(!doc.is_blank());
    }

    #[test]
    fn stats_count_degradations() {
        let mut p1 = page(1, "", vec![]);
        p1.degradations.push(PageDegradation::OcrFailed {
            page: 1,
            detail: "503".into(),
        });
        let mut p2 = page(2, "", vec![]);
        p2.degradations.push(PageDegradation::EmptyText { page: 2 });
        let doc = DocumentTranscript::assemble(vec![p1, p2], DocumentInfo::default(), 0);
        assert_eq!(doc.stats.degraded_pages, 2);
        assert_eq!(doc.stats.ocr_failures, 1);
        assert!(doc.is_blank());
    }

    #[test]
    fn transcript_json_round_trips() {
        let doc = DocumentTranscript::assemble(vec![page(1, "", vec![])], DocumentInfo::default(), 0);
        let json = serde_json::to_string(&doc).unwrap();
        let back: DocumentTranscript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
