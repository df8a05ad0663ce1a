//! Structuring: noisy OCR text → labeled question/answer sections.
//!
//! Answer sheets are written in blocks introduced by a small family of
//! keywords: `Q.`, `Question`, `UNIT TEST` and `PART-<letter>`. The
//! structurer re-segments a page's OCR output at those keywords so that the
//! downstream grader sees one block per question instead of a wall of text.
//!
//! ## Steps
//!
//! 1. [`clean_text`] — replace everything outside printable ASCII with a
//!    space, collapse whitespace runs, trim.
//! 2. Marker detection — case-insensitive, leftmost-first, non-overlapping
//!    matches of [`MARKER_PATTERN`].
//! 3. Section assembly — a two-state scanner (preamble / in-section) walks the
//!    matches. Each marker opens a section that runs up to the next marker or
//!    the end of the page. Markers never nest; the first marker wins.
//! 4. [`render_sections`] — `"\n\n=== {label} ===\n{content}\n"` per section.
//!
//! The heuristic is best-effort. A page with no markers yields no sections
//! and its text is dropped; callers see that as a
//! [`crate::error::PageDegradation::NoMarkers`].

use crate::config::LeadingFragment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Boundary markers, matched case-insensitively.
pub const MARKER_PATTERN: &str = r"(?i)Q\.|Question|UNIT TEST|PART-[A-Z]";

/// Heading rendered for a kept leading fragment.
pub const UNLABELED_HEADING: &str = "Unlabeled";

static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(MARKER_PATTERN).expect("marker pattern is valid"));

/// One labeled block of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Marker text exactly as it appeared in the cleaned page text, or `None`
    /// for a kept leading fragment.
    pub label: Option<String>,
    /// Cleaned, trimmed text following the marker. May be empty.
    pub content: String,
}

impl Section {
    /// Heading used when rendering this section.
    pub fn heading(&self) -> &str {
        self.label.as_deref().unwrap_or(UNLABELED_HEADING)
    }
}

/// Result of structuring one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredPage {
    /// Length in bytes of the cleaned text.
    pub cleaned_len: usize,
    /// Number of markers found.
    pub markers: usize,
    /// Sections in the order their markers appear.
    pub sections: Vec<Section>,
    /// Non-empty text before the first marker that the policy discarded.
    pub discarded_fragment: Option<String>,
}

impl StructuredPage {
    /// The page's Structured Transcript.
    pub fn render(&self) -> String {
        render_sections(&self.sections)
    }
}

/// Strip non-printable-ASCII noise and normalise whitespace.
///
/// Non-ASCII characters become spaces rather than vanishing, so a stray glyph
/// between two words never glues them together. Idempotent.
pub fn clean_text(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| if is_printable_ascii(c) { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_printable_ascii(c: char) -> bool {
    c == ' ' || c.is_ascii_graphic()
}

/// Clean `raw` and split it into sections.
pub fn structure_text(raw: &str, policy: LeadingFragment) -> StructuredPage {
    let cleaned = clean_text(raw);
    let mut scanner = Scanner::new(&cleaned, policy);
    for m in RE_MARKER.find_iter(&cleaned) {
        scanner.marker(m.start(), m.end());
    }
    scanner.finish()
}

/// Clean, split and render `raw` in one call.
pub fn structure_page(raw: &str, policy: LeadingFragment) -> String {
    structure_text(raw, policy).render()
}

/// Render sections with the fixed block template.
pub fn render_sections(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str("\n\n=== ");
        out.push_str(section.heading());
        out.push_str(" ===\n");
        out.push_str(&section.content);
        out.push('\n');
    }
    out
}

// ── Scanner ──────────────────────────────────────────────────────────────

enum ScanState<'t> {
    /// Before the first marker; text here is the leading fragment.
    Preamble,
    /// Inside the section opened by `label`.
    InSection { label: &'t str },
}

struct Scanner<'t> {
    text: &'t str,
    policy: LeadingFragment,
    state: ScanState<'t>,
    /// Byte offset where the current segment's body starts.
    body_start: usize,
    page: StructuredPage,
}

impl<'t> Scanner<'t> {
    fn new(text: &'t str, policy: LeadingFragment) -> Self {
        Self {
            text,
            policy,
            state: ScanState::Preamble,
            body_start: 0,
            page: StructuredPage {
                cleaned_len: text.len(),
                ..StructuredPage::default()
            },
        }
    }

    /// A marker spans `text[start..end]`: close the open segment, open a new section.
    fn marker(&mut self, start: usize, end: usize) {
        let text = self.text;
        self.close(start);
        self.page.markers += 1;
        self.state = ScanState::InSection {
            label: &text[start..end],
        };
        self.body_start = end;
    }

    fn finish(mut self) -> StructuredPage {
        self.close(self.text.len());
        self.page
    }

    fn close(&mut self, end: usize) {
        let text = self.text;
        let body = text[self.body_start..end].trim();
        match self.state {
            ScanState::Preamble => {
                if body.is_empty() {
                    return;
                }
                match self.policy {
                    LeadingFragment::Discard => {
                        self.page.discarded_fragment = Some(body.to_string());
                    }
                    LeadingFragment::Keep => self.page.sections.push(Section {
                        label: None,
                        content: body.to_string(),
                    }),
                }
            }
            ScanState::InSection { label } => self.page.sections.push(Section {
                label: Some(label.to_string()),
                content: body.to_string(),
            }),
        }
    }
}
