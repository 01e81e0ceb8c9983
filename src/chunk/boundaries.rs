//! Break point detection for chunking

use crate::config::ChunkConfig;
use crate::extract::Heading;

/// Priority levels for break points
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BreakPriority {
    /// Word boundary (lowest)
    Word = 1,
    /// Sentence boundary
    Sentence = 2,
    /// Paragraph boundary
    Paragraph = 3,
    /// Heading boundary (highest)
    Heading = 4,
}

/// A potential break point in text
#[derive(Debug, Clone)]
pub struct BreakPoint {
    /// Character position
    pub position: usize,
    /// Priority of this break point
    pub priority: BreakPriority,
}

/// Find potential break points in the text, sorted and deduplicated by
/// position.
pub fn find_break_points(text: &str, headings: &[Heading], config: &ChunkConfig) -> Vec<BreakPoint> {
    let mut points = Vec::new();

    if config.prefer_heading_boundaries {
        for heading in headings {
            if heading.position < text.len() && text.is_char_boundary(heading.position) {
                points.push(BreakPoint {
                    position: heading.position,
                    priority: BreakPriority::Heading,
                });
            }
        }
    }

    // Paragraph breaks (double newlines)
    for (i, c) in text.char_indices() {
        if c == '\n' && text[i..].starts_with("\n\n") {
            let pos = i + 2;
            if text.is_char_boundary(pos) {
                points.push(BreakPoint {
                    position: pos,
                    priority: BreakPriority::Paragraph,
                });
            }
        }
    }

    // Sentence boundaries
    for pattern in [". ", ".\n", "? ", "! "] {
        for (i, _) in text.match_indices(pattern) {
            let pos = i + 2;
            if pos <= text.len() && text.is_char_boundary(pos) {
                points.push(BreakPoint {
                    position: pos,
                    priority: BreakPriority::Sentence,
                });
            }
        }
    }

    points.sort_by_key(|p| p.position);
    points.dedup_by_key(|p| p.position);

    points
}
