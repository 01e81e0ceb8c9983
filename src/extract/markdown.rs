//! Markdown text extraction
//!
//! A Markdown file is one logical unit; headings are collected with their
//! positions so chunking can prefer heading boundaries. Pipe tables pass
//! through verbatim, which already is the delimited form downstream
//! consumers expect.

use super::{ExtractedUnit, ExtractionBackend, Heading, UnitKind, UnitMetadata};
use crate::error::Result;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// Extract a Markdown document into a single unit
pub fn extract_markdown(content: &str, filename: &str) -> Result<ExtractedUnit> {
    let parser = Parser::new(content);

    let mut text_parts: Vec<String> = Vec::new();
    let mut headings: Vec<Heading> = Vec::new();
    let mut current_heading: Option<(u8, Vec<String>)> = None;
    let mut in_code_block = false;
    let mut current_code: Vec<String> = Vec::new();
    let mut char_position = 0;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current_heading = Some((heading_level_to_u8(level), Vec::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, parts)) = current_heading.take() {
                    let heading_text = parts.join("").trim().to_string();
                    if !heading_text.is_empty() {
                        headings.push(Heading {
                            level,
                            text: heading_text.clone(),
                            position: char_position,
                        });

                        text_parts.push(format!("\n{}\n", heading_text));
                        char_position += heading_text.len() + 2;
                    }
                }
            }
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                if in_code_block {
                    let code_content = current_code.join("");
                    text_parts.push(format!("\n```\n{}\n```\n", code_content));
                    char_position += code_content.len() + 10;
                    current_code.clear();
                    in_code_block = false;
                }
            }
            Event::Text(text) => {
                let text_str = text.to_string();

                if let Some((_, ref mut parts)) = current_heading {
                    parts.push(text_str);
                } else if in_code_block {
                    current_code.push(text_str);
                } else {
                    char_position += text_str.len();
                    text_parts.push(text_str);
                }
            }
            Event::Code(code) => {
                if let Some((_, ref mut parts)) = current_heading {
                    parts.push(code.to_string());
                } else {
                    let code_str = format!("`{}`", code);
                    char_position += code_str.len();
                    text_parts.push(code_str);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                text_parts.push(" ".to_string());
                char_position += 1;
            }
            Event::End(TagEnd::Paragraph) => {
                text_parts.push("\n\n".to_string());
                char_position += 2;
            }
            Event::End(TagEnd::List(_)) => {
                text_parts.push("\n".to_string());
                char_position += 1;
            }
            Event::Start(Tag::Item) => {
                text_parts.push("• ".to_string());
                char_position += 2;
            }
            Event::End(TagEnd::Item) => {
                text_parts.push("\n".to_string());
                char_position += 1;
            }
            _ => {}
        }
    }

    let content = text_parts.join("").trim().to_string();

    Ok(ExtractedUnit {
        content,
        headings,
        metadata: UnitMetadata::new(filename, UnitKind::Document, ExtractionBackend::LocalText),
    })
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic() {
        let markdown = r#"
# Frais bancaires

Les frais de virement SEPA sont de 0,50€.

## Virements internationaux

Comptez 15€ par opération.

- Délai: 2 jours
- Plafond: 10 000€
"#;

        let unit = extract_markdown(markdown, "frais.md").unwrap();

        assert!(unit.content.contains("0,50€"));
        assert_eq!(unit.headings.len(), 2);
        assert_eq!(unit.headings[0].level, 1);
        assert_eq!(unit.headings[0].text, "Frais bancaires");
        assert_eq!(unit.metadata.filename, "frais.md");
    }

    #[test]
    fn test_heading_positions_are_ordered() {
        let markdown = "# A\n\ntext one\n\n## B\n\ntext two\n\n### C\n\ntext three";
        let unit = extract_markdown(markdown, "doc.md").unwrap();

        assert_eq!(unit.headings.len(), 3);
        let positions: Vec<usize> = unit.headings.iter().map(|h| h.position).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_pipe_table_passes_through() {
        let markdown = "| Type | Frais |\n|---|---|\n| SEPA | 0,50€ |\n";
        let unit = extract_markdown(markdown, "doc.md").unwrap();

        assert!(unit.content.contains("SEPA"));
        assert!(unit.content.contains("0,50€"));
    }
}
