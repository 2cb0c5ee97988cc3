use crate::error::SearchError;
use regex::Regex;
use std::borrow::Cow;
use std::iter::once;
use std::time::{SystemTime, UNIX_EPOCH};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Forward,
    Backward,
}

impl SearchDirection {
    pub fn is_forward(&self) -> bool {
        matches!(self, SearchDirection::Forward)
    }

    pub fn reversed(&self) -> SearchDirection {
        match self {
            SearchDirection::Forward => SearchDirection::Backward,
            SearchDirection::Backward => SearchDirection::Forward,
        }
    }
}

/// How many hits a single invocation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Collect every hit in the traversed scope.
    AllMatches,
    /// First hit at or after the current selection/cursor.
    FirstFromSelection,
    /// First hit from the natural start of the scope.
    FirstOverall,
}

/// A timestamp bound that only applies while switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBound {
    pub time: i64,
    pub on: bool,
}

impl TimeBound {
    pub fn off(time: i64) -> Self {
        Self { time, on: false }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub pattern: String,
    pub replacement: String,
    pub is_regex: bool,
    pub match_case: bool,
    pub whole_word: bool,
    pub start_word: bool,
    pub accent_insensitive: bool,
    pub node_content: bool,
    pub node_name_and_tags: bool,
    pub direction: SearchDirection,
    pub match_mode: MatchMode,
    pub override_exclusions: bool,
    pub ts_created_after: TimeBound,
    pub ts_created_before: TimeBound,
    pub ts_modified_after: TimeBound,
    pub ts_modified_before: TimeBound,
}

impl SearchOptions {
    pub fn new(pattern: &str) -> Self {
        let now = now_secs();
        let yesterday = now - 86400; // 24*60*60
        Self {
            pattern: pattern.to_string(),
            replacement: String::new(),
            is_regex: false,
            match_case: false,
            whole_word: false,
            start_word: false,
            accent_insensitive: false,
            node_content: true,
            node_name_and_tags: false,
            direction: SearchDirection::Forward,
            match_mode: MatchMode::FirstFromSelection,
            override_exclusions: false,
            ts_created_after: TimeBound::off(yesterday),
            ts_created_before: TimeBound::off(now),
            ts_modified_after: TimeBound::off(yesterday),
            ts_modified_before: TimeBound::off(now),
        }
    }
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Strip diacritical marks, one char in, one char out, so that codepoint
/// offsets into the stripped text match offsets into the original.
/// Chars whose decomposition is not a single base char are left alone.
pub fn strip_diacritics(text: &str) -> String {
    text.chars().map(strip_char).collect()
}

fn strip_char(c: char) -> char {
    let mut base = None;
    for d in once(c).nfd() {
        if is_combining_mark(d) {
            continue;
        }
        if base.is_some() {
            // expands to more than one base char (e.g. a ligature),
            // stripping it would shift offsets
            return c;
        }
        base = Some(d);
    }
    base.unwrap_or(c)
}

/// A pattern compiled against a fixed set of search options.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    pub is_regex: bool,
    pub accent_insensitive: bool,
}

impl CompiledPattern {
    pub fn compile(options: &SearchOptions) -> Result<CompiledPattern, SearchError> {
        let mut pattern = if options.accent_insensitive {
            strip_diacritics(&options.pattern)
        } else {
            options.pattern.clone()
        };
        if !options.is_regex {
            pattern = regex::escape(&pattern);
            if options.whole_word {
                pattern = format!("\\b{pattern}\\b");
            } else if options.start_word {
                pattern = format!("\\b{pattern}");
            }
        }
        let flags = if options.match_case { "m" } else { "mi" };
        let regex = Regex::new(&format!("(?{flags}){pattern}"))
            .map_err(|e| SearchError::InvalidPattern(format!("invalid regex: {e}")))?;
        Ok(CompiledPattern {
            regex,
            is_regex: options.is_regex,
            accent_insensitive: options.accent_insensitive,
        })
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Apply the same accent stripping to a haystack that was applied to the
    /// pattern at compile time. Codepoint offsets are preserved.
    pub fn normalize<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.accent_insensitive {
            Cow::Owned(strip_diacritics(text))
        } else {
            Cow::Borrowed(text)
        }
    }

    /// First match starting at or after `start_byte`, as byte offsets.
    pub fn first_match_at(&self, text: &str, start_byte: usize) -> Option<(usize, usize)> {
        if start_byte > text.len() {
            return None;
        }
        self.regex
            .find_at(text, start_byte)
            .map(|m| (m.start(), m.end()))
    }

    /// Last match ending at or before `end_byte`, as byte offsets.
    /// There is no reverse-search primitive, so this enumerates every match
    /// in the prefix and keeps the final one.
    pub fn last_match_in_prefix(&self, text: &str, end_byte: usize) -> Option<(usize, usize)> {
        let end = end_byte.min(text.len());
        self.regex
            .find_iter(&text[..end])
            .last()
            .map(|m| (m.start(), m.end()))
    }

    /// Whether the pattern occurs anywhere in `text` (after normalization).
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(&self.normalize(text))
    }

    /// The text to substitute for a matched span whose original text is
    /// `origin`: the literal replacement, or, for a true regex, `origin` with
    /// the first occurrence rewritten so `$1`-style back-references expand.
    pub fn expand(&self, origin: &str, replacement: &str) -> String {
        if self.is_regex {
            self.regex.replace(origin, replacement).into_owned()
        } else {
            replacement.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(pattern: &str, adjust: impl FnOnce(&mut SearchOptions)) -> CompiledPattern {
        let mut options = SearchOptions::new(pattern);
        adjust(&mut options);
        CompiledPattern::compile(&options).unwrap()
    }

    #[test]
    fn test_literal_finds_exact_substrings() {
        let p = compile("a.b", |o| o.match_case = true);
        // metacharacters are escaped in literal mode
        assert!(p.is_match("xx a.b yy"));
        assert!(!p.is_match("xx aXb yy"));
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let p = compile("needle", |_| {});
        assert!(p.is_match("NEEDLE in a haystack"));
        let p = compile("needle", |o| o.match_case = true);
        assert!(!p.is_match("NEEDLE in a haystack"));
    }

    #[test]
    fn test_whole_word_boundaries() {
        let p = compile("cat", |o| o.whole_word = true);
        assert!(p.is_match("a cat sat"));
        assert!(!p.is_match("concatenate"));
    }

    #[test]
    fn test_start_word_boundary_only() {
        let p = compile("cat", |o| o.start_word = true);
        assert!(p.is_match("category"));
        assert!(!p.is_match("bobcat"));
    }

    #[test]
    fn test_word_wraps_do_not_apply_in_regex_mode() {
        let p = compile("cat", |o| {
            o.is_regex = true;
            o.whole_word = true;
        });
        assert!(p.is_match("concatenate"));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let mut options = SearchOptions::new("(unclosed");
        options.is_regex = true;
        match CompiledPattern::compile(&options) {
            Err(SearchError::InvalidPattern(msg)) => assert!(msg.contains("invalid regex")),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_accent_insensitive_both_sides() {
        let p = compile("café", |o| o.accent_insensitive = true);
        assert!(p.is_match("CAFE du coin"));
        let p = compile("cafe", |o| o.accent_insensitive = true);
        assert!(p.is_match("au café"));
    }

    #[test]
    fn test_strip_diacritics_preserves_length() {
        let s = "àé îõ ü漢";
        assert_eq!(strip_diacritics(s).chars().count(), s.chars().count());
        assert_eq!(strip_diacritics(s), "ae io u漢");
    }

    #[test]
    fn test_forward_match_from_offset() {
        let p = compile("foo", |o| o.match_case = true);
        assert_eq!(p.first_match_at("foo foo", 0), Some((0, 3)));
        assert_eq!(p.first_match_at("foo foo", 1), Some((4, 7)));
        assert_eq!(p.first_match_at("foo foo", 5), None);
    }

    #[test]
    fn test_backward_match_keeps_last_before_limit() {
        let p = compile("foo", |o| o.match_case = true);
        // greatest end <= limit
        assert_eq!(p.last_match_in_prefix("foo foo foo", 11), Some((8, 11)));
        assert_eq!(p.last_match_in_prefix("foo foo foo", 10), Some((4, 7)));
        assert_eq!(p.last_match_in_prefix("foo foo foo", 3), Some((0, 3)));
        assert_eq!(p.last_match_in_prefix("foo foo foo", 2), None);
    }

    #[test]
    fn test_multiline_anchor() {
        let p = compile("^bar", |o| {
            o.is_regex = true;
            o.match_case = true;
        });
        assert!(p.is_match("foo\nbar"));
    }
}
