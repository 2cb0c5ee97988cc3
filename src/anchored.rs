//! Structured objects embedded in node text at placeholder positions, and
//! pattern matching inside their payloads.

use crate::offsets;
use crate::pattern::CompiledPattern;

/// Tag identifying the variant of an anchored object, carried on reported
/// hits so the caller can restore focus appropriately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    None,
    CodeBox,
    TableLight,
    TableHeavy,
    ImageAnchor,
    ImageEmbFile,
    ImageLatex,
    ImagePng,
}

impl AnchorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorKind::None => "none",
            AnchorKind::CodeBox => "codebox",
            AnchorKind::TableLight => "table-light",
            AnchorKind::TableHeavy => "table-heavy",
            AnchorKind::ImageAnchor => "anchor",
            AnchorKind::ImageEmbFile => "embedded-file",
            AnchorKind::ImageLatex => "latex",
            AnchorKind::ImagePng => "image",
        }
    }
}

/// A structured payload occupying one placeholder codepoint in a node buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchoredObject {
    CodeBox { text: String, language: String },
    TableLight { rows: Vec<Vec<String>> },
    TableHeavy { rows: Vec<Vec<String>> },
    ImageAnchor { name: String },
    ImageEmbFile { filename: String },
    ImageLatex { source: String },
    ImagePng,
}

impl AnchoredObject {
    pub fn kind(&self) -> AnchorKind {
        match self {
            AnchoredObject::CodeBox { .. } => AnchorKind::CodeBox,
            AnchoredObject::TableLight { .. } => AnchorKind::TableLight,
            AnchoredObject::TableHeavy { .. } => AnchorKind::TableHeavy,
            AnchoredObject::ImageAnchor { .. } => AnchorKind::ImageAnchor,
            AnchoredObject::ImageEmbFile { .. } => AnchorKind::ImageEmbFile,
            AnchoredObject::ImageLatex { .. } => AnchorKind::ImageLatex,
            AnchoredObject::ImagePng => AnchorKind::ImagePng,
        }
    }

    fn table_rows(&self) -> Option<&Vec<Vec<String>>> {
        match self {
            AnchoredObject::TableLight { rows } | AnchoredObject::TableHeavy { rows } => Some(rows),
            _ => None,
        }
    }

    pub fn column_count(&self) -> usize {
        self.table_rows()
            .and_then(|rows| rows.first())
            .map(|row| row.len())
            .unwrap_or(0)
    }

    /// Enumerate hits of `pattern` inside this object's payload. `offset` is
    /// the object's placeholder position in the owning node buffer; hits in
    /// backward direction come out in reversed order, mirroring how forward
    /// hits are consumed.
    pub fn find_hits(
        &self,
        offset: usize,
        pattern: &CompiledPattern,
        forward: bool,
    ) -> Vec<AnchorHit> {
        let mut hits = match self {
            AnchoredObject::CodeBox { text, .. } => hits_in_text(self.kind(), offset, text, pattern, 0),
            AnchoredObject::TableLight { rows } | AnchoredObject::TableHeavy { rows } => {
                let columns = self.column_count();
                let mut hits = Vec::new();
                for (row_idx, row) in rows.iter().enumerate() {
                    for (col_idx, cell) in row.iter().enumerate() {
                        let cell_idx = row_idx * columns + col_idx;
                        hits.extend(hits_in_text(self.kind(), offset, cell, pattern, cell_idx));
                    }
                }
                hits
            }
            AnchoredObject::ImageAnchor { name } => single_hit(self.kind(), offset, name, pattern),
            AnchoredObject::ImageEmbFile { filename } => {
                single_hit(self.kind(), offset, filename, pattern)
            }
            AnchoredObject::ImageLatex { source } => single_hit(self.kind(), offset, source, pattern),
            AnchoredObject::ImagePng => Vec::new(),
        };
        if !forward {
            hits.reverse();
        }
        hits
    }

    /// Substitute one occurrence of `pattern` in the payload, the first in
    /// the given direction. Returns false when nothing matched.
    pub fn replace_first(
        &mut self,
        pattern: &CompiledPattern,
        replacement: &str,
        forward: bool,
    ) -> bool {
        match self {
            AnchoredObject::CodeBox { text, .. } => {
                replace_one_in_text(text, pattern, replacement, forward)
            }
            AnchoredObject::TableLight { rows } | AnchoredObject::TableHeavy { rows } => {
                let mut cells: Vec<&mut String> = rows.iter_mut().flatten().collect();
                if !forward {
                    cells.reverse();
                }
                for cell in cells {
                    if replace_one_in_text(cell, pattern, replacement, forward) {
                        return true;
                    }
                }
                false
            }
            AnchoredObject::ImageAnchor { name } => {
                replace_one_in_text(name, pattern, replacement, true)
            }
            AnchoredObject::ImageEmbFile { filename } => {
                replace_one_in_text(filename, pattern, replacement, true)
            }
            AnchoredObject::ImageLatex { source } => {
                replace_one_in_text(source, pattern, replacement, true)
            }
            AnchoredObject::ImagePng => false,
        }
    }
}

/// One hit inside an anchored object. The reported span in the owning node
/// is the single placeholder codepoint; `sub_start`/`sub_end` locate the hit
/// inside the object's own text, in codepoints.
#[derive(Debug, Clone)]
pub struct AnchorHit {
    pub offset: usize,
    pub kind: AnchorKind,
    pub line_content: String,
    pub cell_index: usize,
    pub sub_start: usize,
    pub sub_end: usize,
}

fn hits_in_text(
    kind: AnchorKind,
    offset: usize,
    text: &str,
    pattern: &CompiledPattern,
    cell_index: usize,
) -> Vec<AnchorHit> {
    let normalized = pattern.normalize(text);
    pattern
        .regex()
        .find_iter(&normalized)
        .map(|m| {
            let sub_start = offsets::byte_to_codepoint(&normalized, m.start());
            let sub_end = offsets::byte_to_codepoint(&normalized, m.end());
            AnchorHit {
                offset,
                kind,
                line_content: line_containing(text, sub_end),
                cell_index,
                sub_start,
                sub_end,
            }
        })
        .collect()
}

/// Name-like payloads report at most one hit for the whole string.
fn single_hit(
    kind: AnchorKind,
    offset: usize,
    text: &str,
    pattern: &CompiledPattern,
) -> Vec<AnchorHit> {
    if pattern.is_match(text) {
        vec![AnchorHit {
            offset,
            kind,
            line_content: text.to_string(),
            cell_index: 0,
            sub_start: 0,
            sub_end: 0,
        }]
    } else {
        Vec::new()
    }
}

/// The full line containing codepoint `cp` of `text`.
pub fn line_containing(text: &str, cp: usize) -> String {
    let mut count = 0usize;
    for line in text.split('\n') {
        let line_len = line.chars().count();
        if cp <= count + line_len {
            return line.to_string();
        }
        count += line_len + 1; // the newline itself
    }
    text.split('\n').next_back().unwrap_or("").to_string()
}

pub(crate) fn replace_one_in_text(
    text: &mut String,
    pattern: &CompiledPattern,
    replacement: &str,
    forward: bool,
) -> bool {
    let normalized = pattern.normalize(text);
    let found = if forward {
        pattern.regex().find_iter(&normalized).next()
    } else {
        pattern.regex().find_iter(&normalized).last()
    };
    let Some(m) = found else {
        return false;
    };
    // map the span through codepoints back onto the unnormalized text
    let start_cp = offsets::byte_to_codepoint(&normalized, m.start());
    let end_cp = offsets::byte_to_codepoint(&normalized, m.end());
    let start_byte = offsets::codepoint_to_byte(text, start_cp);
    let end_byte = offsets::codepoint_to_byte(text, end_cp);
    let origin = text[start_byte..end_byte].to_string();
    let expanded = pattern.expand(&origin, replacement);
    text.replace_range(start_byte..end_byte, &expanded);
    true
}
