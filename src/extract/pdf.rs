//! Baseline local PDF text extraction
//!
//! Strips text with `pdf-extract`. When page markers (form feeds) survive
//! extraction, each page becomes its own unit; otherwise the whole document
//! is one unit.

use super::{normalize_whitespace, ExtractedUnit, ExtractionBackend, UnitKind, UnitMetadata};
use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Extract text from a PDF with the local stripper
pub fn extract_local_pdf(path: &Path, filename: &str) -> Result<Vec<ExtractedUnit>> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| Error::Extraction(format!("Failed to extract text from {}: {}", filename, e)))?;

    Ok(units_from_stripped_text(&text, filename))
}

/// Split stripped text into page units on form feeds
pub fn units_from_stripped_text(text: &str, filename: &str) -> Vec<ExtractedUnit> {
    let pages: Vec<&str> = text.split('\u{000C}').collect();

    if pages.len() <= 1 {
        let content = normalize_whitespace(text);
        debug!("Extracted {} as a single unit ({} chars)", filename, content.len());
        return vec![ExtractedUnit {
            content,
            headings: Vec::new(),
            metadata: UnitMetadata::new(filename, UnitKind::Document, ExtractionBackend::LocalText),
        }];
    }

    let mut units = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        let content = normalize_whitespace(page);
        if content.is_empty() {
            continue;
        }

        let mut metadata =
            UnitMetadata::new(filename, UnitKind::Page, ExtractionBackend::LocalText);
        metadata.page_number = Some((i + 1) as u32);

        units.push(ExtractedUnit {
            content,
            headings: Vec::new(),
            metadata,
        });
    }

    debug!("Extracted {} pages from {}", units.len(), filename);
    units
}
