//! Structured document analysis backend
//!
//! Optional high-fidelity extractor behind the `DocumentAnalyzer` trait:
//! per-page text with layout preserved, tables rendered as pipe-delimited
//! pseudo-markdown, and key/value pairs surfaced as a synthetic unit. The
//! HTTP implementation talks to a layout-analysis endpoint configured in
//! `analysis.endpoint`.

use super::{ExtractedUnit, ExtractionBackend, UnitKind, UnitMetadata};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// One analyzed page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPage {
    pub page_number: u32,
    #[serde(default)]
    pub lines: Vec<String>,
}

/// One cell of an analyzed table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCell {
    pub row_index: usize,
    pub column_index: usize,
    pub content: String,
}

/// One analyzed table, anchored to a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTable {
    pub page_number: u32,
    pub row_count: usize,
    pub column_count: usize,
    #[serde(default)]
    pub cells: Vec<AnalysisCell>,
}

/// An extracted key/value pair (forms, invoices)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisKeyValuePair {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Full result of a layout analysis call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub pages: Vec<AnalysisPage>,
    #[serde(default)]
    pub tables: Vec<AnalysisTable>,
    #[serde(default)]
    pub key_value_pairs: Vec<AnalysisKeyValuePair>,
}

/// Capability trait for structured document analysis
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyze a raw document and return its structured content
    async fn analyze(&self, bytes: &[u8], filename: &str) -> Result<AnalysisResult>;
}

/// HTTP layout-analysis client
pub struct HttpAnalyzer {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    retries: usize,
}

impl HttpAnalyzer {
    pub fn new(config: &AnalysisConfig, api_key: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?
            .join("/v1/analyze")
            .map_err(|e| Error::Config(format!("Invalid analysis endpoint: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            retries: 2,
        })
    }
}

#[async_trait]
impl DocumentAnalyzer for HttpAnalyzer {
    async fn analyze(&self, bytes: &[u8], filename: &str) -> Result<AnalysisResult> {
        info!("Analyzing {} with layout analysis backend", filename);

        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let mut request = self
                .client
                .post(self.endpoint.clone())
                .header("content-type", "application/octet-stream")
                .body(bytes.to_vec());
            if let Some(ref key) = self.api_key {
                request = request.header("x-api-key", key);
            }

            match request.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        let result = ok
                            .json::<AnalysisResult>()
                            .await
                            .map_err(|e| Error::Extraction(e.to_string()))?;
                        debug!(
                            "Analysis of {} returned {} pages, {} tables, {} key/value pairs",
                            filename,
                            result.pages.len(),
                            result.tables.len(),
                            result.key_value_pairs.len()
                        );
                        return Ok(result);
                    }
                    Err(e) => last_err = Some(Error::Extraction(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Extraction(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Extraction("Analysis backend request failed".to_string())))
    }
}

/// Convert an analysis result into extracted units, one per page plus an
/// optional key/value unit.
pub fn units_from_analysis(result: &AnalysisResult, filename: &str) -> Vec<ExtractedUnit> {
    let mut units = Vec::new();

    for page in &result.pages {
        let mut content = page.lines.join("\n");

        let page_tables: Vec<&AnalysisTable> = result
            .tables
            .iter()
            .filter(|t| t.page_number == page.page_number)
            .collect();

        if !page_tables.is_empty() {
            content.push_str("\n\n=== TABLEAUX ===\n");
            for table in &page_tables {
                content.push_str(&format_table(table));
                content.push_str("\n\n");
            }
        }

        let mut metadata =
            UnitMetadata::new(filename, UnitKind::Page, ExtractionBackend::LayoutAnalysis);
        metadata.page_number = Some(page.page_number);
        metadata.has_tables = !page_tables.is_empty();
        metadata.table_count = page_tables.len();

        units.push(ExtractedUnit {
            content,
            headings: Vec::new(),
            metadata,
        });
    }

    if !result.key_value_pairs.is_empty() {
        let mut content = String::from("=== INFORMATIONS EXTRAITES ===\n");
        for pair in &result.key_value_pairs {
            if pair.key.is_empty() {
                continue;
            }
            content.push_str(&format!("{}: {}\n", pair.key, pair.value));
        }

        units.push(ExtractedUnit {
            content,
            headings: Vec::new(),
            metadata: UnitMetadata::new(
                filename,
                UnitKind::KeyValuePairs,
                ExtractionBackend::LayoutAnalysis,
            ),
        });
    }

    units
}

/// Format a table as pipe-delimited pseudo-markdown. A table whose cell
/// indices do not fit its declared dimensions is rendered as flat text
/// instead of being dropped.
fn format_table(table: &AnalysisTable) -> String {
    let rows = table.row_count;
    let cols = table.column_count;

    let well_formed = rows > 0
        && cols > 0
        && table
            .cells
            .iter()
            .all(|c| c.row_index < rows && c.column_index < cols);

    if !well_formed {
        let flat: Vec<&str> = table
            .cells
            .iter()
            .map(|c| c.content.as_str())
            .filter(|c| !c.is_empty())
            .collect();
        return flat.join("; ");
    }

    let mut grid = vec![vec![String::new(); cols]; rows];
    for cell in &table.cells {
        grid[cell.row_index][cell.column_index] = cell.content.clone();
    }

    let mut out = format!("Tableau ({} lignes, {} colonnes):\n", rows, cols);
    for (i, row) in grid.iter().enumerate() {
        out.push_str("| ");
        for cell in row {
            out.push_str(cell);
            out.push_str(" | ");
        }
        out.push('\n');

        if i == 0 {
            out.push('|');
            for _ in 0..cols {
                out.push_str("---|");
            }
            out.push('\n');
        }
    }

    out
}
