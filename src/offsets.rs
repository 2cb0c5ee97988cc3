//! Translation between the two coordinate spaces of a node buffer.
//!
//! Callers address node text in Unicode codepoints, where an anchored-object
//! placeholder occupies one codepoint slot. The regex matcher addresses the
//! same text as UTF-8 bytes of a flattened snapshot, where each placeholder
//! contributes exactly one stand-in byte.

/// Codepoint a node buffer stores at every anchored-object position.
pub const PLACEHOLDER_CHAR: char = '\u{FFFC}';

/// Single-byte stand-in the matcher sees at every placeholder position.
/// A control character so that no user pattern matches it as plain text.
pub const PLACEHOLDER_STAND_IN: char = '\u{7}';

/// Produce the matcher-facing snapshot of a node buffer: every placeholder
/// collapses to one stand-in byte, everything else stays as-is.
pub fn flatten(buffer: &str) -> String {
    buffer
        .chars()
        .map(|c| {
            if c == PLACEHOLDER_CHAR {
                PLACEHOLDER_STAND_IN
            } else {
                c
            }
        })
        .collect()
}

/// Byte offset of the codepoint at `cp_offset` in `text`.
/// Offsets past the end clamp to the text length.
pub fn codepoint_to_byte(text: &str, cp_offset: usize) -> usize {
    text.char_indices()
        .nth(cp_offset)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

/// Codepoint offset of the char starting at `byte_offset` in `text`.
/// Offsets past the end clamp to the codepoint count.
pub fn byte_to_codepoint(text: &str, byte_offset: usize) -> usize {
    text.char_indices()
        .take_while(|(byte, _)| *byte < byte_offset)
        .count()
}

/// Count placeholders that sit before `limit_cp`, where `limit_cp` is a
/// position counted in user-visible characters (placeholder slots excluded).
///
/// Every placeholder found below the boundary shifts the boundary right by
/// one, because the slot it occupies must itself be stepped over; the scan
/// keeps extending the boundary until no new placeholder falls inside it.
/// Adding the result to a user-visible position yields the buffer position.
pub fn count_placeholders_before(buffer: &str, limit_cp: usize) -> usize {
    let mut count = 0usize;
    let mut limit = limit_cp;
    for (idx, c) in buffer.chars().enumerate() {
        if idx > limit {
            break;
        }
        if c == PLACEHOLDER_CHAR {
            count += 1;
            limit += 1;
        }
    }
    count
}
