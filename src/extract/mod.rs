//! Document text extraction
//!
//! Turns an uploaded document (PDF or Markdown) into an ordered list of text
//! units with positional metadata. PDF extraction prefers the structured
//! analysis backend when one is configured and falls back to local text
//! stripping otherwise; the chosen backend is recorded in each unit's
//! metadata. Markdown files become a single unit with their headings parsed
//! so the chunker can prefer heading boundaries.

mod analysis;
mod markdown;
mod pdf;

pub use analysis::*;
pub use markdown::*;
pub use pdf::*;

use crate::error::{Error, Result};
use std::path::Path;

/// Document kinds accepted for ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Markdown,
}

impl DocumentKind {
    /// Detect document kind from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some("md") | Some("markdown") | Some("mdx") => Ok(DocumentKind::Markdown),
            other => Err(Error::UnsupportedDocumentType(format!(
                "{} ({})",
                path.display(),
                other.unwrap_or("no extension")
            ))),
        }
    }
}

/// Which extractor produced a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionBackend {
    /// High-fidelity structured layout analysis
    LayoutAnalysis,
    /// Baseline local text stripping
    LocalText,
}

impl std::fmt::Display for ExtractionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionBackend::LayoutAnalysis => write!(f, "layout_analysis"),
            ExtractionBackend::LocalText => write!(f, "local_text"),
        }
    }
}

/// Logical unit kinds emitted by extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// One page of a paginated document
    Page,
    /// A whole, unpaginated document
    Document,
    /// Synthetic unit carrying extracted key/value pairs
    KeyValuePairs,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Page => write!(f, "page"),
            UnitKind::Document => write!(f, "document"),
            UnitKind::KeyValuePairs => write!(f, "key_value_pairs"),
        }
    }
}

/// Positional metadata carried by every extracted unit
#[derive(Debug, Clone)]
pub struct UnitMetadata {
    pub filename: String,
    pub page_number: Option<u32>,
    pub unit_kind: UnitKind,
    pub backend: ExtractionBackend,
    pub has_tables: bool,
    pub table_count: usize,
}

impl UnitMetadata {
    pub fn new(filename: &str, unit_kind: UnitKind, backend: ExtractionBackend) -> Self {
        Self {
            filename: filename.to_string(),
            page_number: None,
            unit_kind,
            backend,
            has_tables: false,
            table_count: 0,
        }
    }
}

/// A heading in a unit, used by the chunker for boundary preference
#[derive(Debug, Clone)]
pub struct Heading {
    /// Heading level (1-6)
    pub level: u8,

    /// Heading text
    pub text: String,

    /// Character position in the unit content
    pub position: usize,
}

/// One logical unit of extracted text
#[derive(Debug, Clone)]
pub struct ExtractedUnit {
    pub content: String,
    pub headings: Vec<Heading>,
    pub metadata: UnitMetadata,
}

/// Extract all units from a document on disk.
///
/// PDF files use the analyzer when one is supplied; the backend choice is
/// made once per document, never per page.
pub async fn extract_document(
    path: &Path,
    kind: DocumentKind,
    analyzer: Option<&dyn DocumentAnalyzer>,
) -> Result<Vec<ExtractedUnit>> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();

    match kind {
        DocumentKind::Markdown => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::Extraction(format!("Failed to read {}: {}", filename, e)))?;
            Ok(vec![extract_markdown(&content, &filename)?])
        }
        DocumentKind::Pdf => match analyzer {
            Some(analyzer) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    Error::Extraction(format!("Failed to read {}: {}", filename, e))
                })?;
                let result = analyzer.analyze(&bytes, &filename).await?;
                Ok(units_from_analysis(&result, &filename))
            }
            None => extract_local_pdf(path, &filename),
        },
    }
}

/// Normalize whitespace in text: collapse runs, keep paragraph breaks
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_whitespace = true;
    let mut newline_count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newline_count += 1;
            }
            last_was_whitespace = true;
        } else {
            if last_was_whitespace && !result.is_empty() {
                if newline_count >= 2 {
                    result.push_str("\n\n");
                } else if newline_count == 1 {
                    result.push('\n');
                } else {
                    result.push(' ');
                }
            }
            newline_count = 0;
            result.push(c);
            last_was_whitespace = false;
        }
    }

    result.trim().to_string()
}
