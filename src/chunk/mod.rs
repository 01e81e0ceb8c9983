//! Text chunking with structure awareness
//!
//! Splits extracted units into token-bounded, overlapping windows while:
//! - Respecting heading/paragraph/sentence boundaries when possible
//! - Providing stable, deterministic chunk boundaries
//! - Computing content hashes for idempotent re-ingestion checks
//!
//! Window arithmetic happens in characters with a fixed chars-per-token
//! factor; reported token counts use the word-based estimator the rest of
//! the system shares.

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use crate::error::Result;
use crate::extract::{ExtractedUnit, UnitMetadata};
use blake3::Hasher;

/// Approximate characters per token for window sizing
const CHARS_PER_TOKEN: usize = 4;

/// A text chunk with metadata
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// The actual text content
    pub text: String,

    /// Chunk index (0-based, sequential per document)
    pub chunk_index: usize,

    /// Estimated token count
    pub token_estimate: usize,

    /// Blake3 hash of the chunk, salted with the document hash
    pub hash: String,

    /// Metadata inherited from the source unit
    pub metadata: UnitMetadata,
}

impl TextChunk {
    /// Compute the hash for a chunk
    pub fn compute_hash(text: &str, doc_hash: &str) -> String {
        let mut hasher = Hasher::new();
        hasher.update(doc_hash.as_bytes());
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Estimate the token count of a text (rough approximation)
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f32 * 1.3).ceil() as usize
}

/// Compute a stable hash for document content
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// Chunk a sequence of extracted units into one document-wide chunk list.
///
/// Chunk indexes run sequentially across units. Identical input and config
/// always produce the identical chunk sequence.
pub fn chunk_units(
    units: &[ExtractedUnit],
    doc_hash: &str,
    config: &ChunkConfig,
) -> Result<Vec<TextChunk>> {
    let mut chunks = Vec::new();
    let mut next_index = 0;

    for unit in units {
        chunk_unit(unit, doc_hash, config, &mut next_index, &mut chunks);
    }

    Ok(chunks)
}

fn chunk_unit(
    unit: &ExtractedUnit,
    doc_hash: &str,
    config: &ChunkConfig,
    next_index: &mut usize,
    out: &mut Vec<TextChunk>,
) {
    let text = &unit.content;
    if text.is_empty() {
        return;
    }

    let max_chars = config.chunk_size.min(config.max_chunk_size) * CHARS_PER_TOKEN;
    let overlap_chars = config.chunk_overlap * CHARS_PER_TOKEN;
    let min_chars = config.min_chunk_size * CHARS_PER_TOKEN;

    let break_points = find_break_points(text, &unit.headings, config);

    let mut current_start = 0;

    while current_start < text.len() {
        current_start = ensure_char_boundary(text, current_start);
        if current_start >= text.len() {
            break;
        }

        let target_end = current_start + max_chars;

        let chunk_end = if target_end >= text.len() {
            text.len()
        } else {
            find_best_break(text, current_start, target_end, max_chars, &break_points)
        };

        let chunk_end = ensure_char_boundary(text, chunk_end);
        if chunk_end <= current_start {
            current_start = chunk_end + 1;
            continue;
        }

        let chunk_text = text[current_start..chunk_end].trim().to_string();

        // Skip undersized fragments unless this is the document tail
        if chunk_text.len() < min_chars && chunk_end < text.len() {
            current_start = chunk_end;
            continue;
        }

        if !chunk_text.is_empty() {
            let hash = TextChunk::compute_hash(&chunk_text, doc_hash);
            let token_estimate = estimate_tokens(&chunk_text);

            out.push(TextChunk {
                text: chunk_text,
                chunk_index: *next_index,
                token_estimate,
                hash,
                metadata: unit.metadata.clone(),
            });

            *next_index += 1;
        }

        if chunk_end >= text.len() {
            break;
        }

        // Step back by the overlap, but always move forward overall
        let next_start = if chunk_end > overlap_chars {
            ensure_char_boundary(text, chunk_end - overlap_chars)
        } else {
            chunk_end
        };
        current_start = if next_start > current_start {
            next_start
        } else {
            chunk_end
        };
    }
}

/// Ensure a position is on a valid UTF-8 character boundary
fn ensure_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    if text.is_char_boundary(pos) {
        return pos;
    }
    let mut adjusted = pos;
    while adjusted > 0 && !text.is_char_boundary(adjusted) {
        adjusted -= 1;
    }
    adjusted
}

/// Find the best break point near the target position
fn find_best_break(
    text: &str,
    start: usize,
    target: usize,
    max_chars: usize,
    break_points: &[BreakPoint],
) -> usize {
    // Search window: 80% to 120% of the target chunk size
    let min_pos = ensure_char_boundary(text, start + (max_chars * 4 / 5));
    let max_pos = ensure_char_boundary(text, std::cmp::min(start + (max_chars * 6 / 5), text.len()));

    let candidates: Vec<&BreakPoint> = break_points
        .iter()
        .filter(|p| {
            p.position >= min_pos && p.position <= max_pos && text.is_char_boundary(p.position)
        })
        .collect();

    if let Some(best) = candidates.iter().max_by_key(|p| p.priority as u8) {
        return best.position;
    }

    // Fall back to a word boundary near the target
    if target < text.len() {
        let search_start = ensure_char_boundary(text, if target > 50 { target - 50 } else { start });
        let search_end = ensure_char_boundary(text, std::cmp::min(target + 50, text.len()));

        if search_start < search_end {
            let search_text = &text[search_start..search_end];

            for (i, _) in search_text.rmatch_indices(' ') {
                let pos = search_start + i + 1;
                if pos >= min_pos && pos <= max_pos && text.is_char_boundary(pos) {
                    return pos;
                }
            }
        }
    }

    ensure_char_boundary(text, std::cmp::min(target, text.len()))
}
