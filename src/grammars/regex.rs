use std::fmt;
use std::ops::Range;

use onig::{Region, RegexOptions, SearchOptions, Syntax};

use crate::error::{Error, OcraResult};
use crate::grammars::offsets::IndexedText;

/// Where a pattern matched, in character offsets relative to the searched line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Start of the whole match
    pub start: usize,
    /// End of the whole match (exclusive)
    pub end: usize,
    /// Every capture group, index 0 being the whole match.
    /// Optional groups that did not participate are `None`.
    pub capture_pos: Vec<Option<(usize, usize)>>,
}

impl MatchResult {
    /// Builds a match from Oniguruma byte positions. The first position is the whole match.
    pub(crate) fn from_byte_positions(
        text: &IndexedText,
        positions: impl Iterator<Item = Option<(usize, usize)>>,
    ) -> Option<Self> {
        let capture_pos: Vec<_> = positions
            .map(|pos| pos.map(|(s, e)| (text.to_char(s), text.to_char(e))))
            .collect();
        let (start, end) = capture_pos.first().copied().flatten()?;

        Some(Self {
            start,
            end,
            capture_pos,
        })
    }

    /// The span of capture group `index`, if it participated in the match
    pub fn capture(&self, index: usize) -> Option<Range<usize>> {
        self.capture_pos
            .get(index)
            .copied()
            .flatten()
            .map(|(s, e)| s..e)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Compile-time flags of a pattern. Grammars always use the defaults.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PatternOptions {
    pub(crate) ignore_case: bool,
    pub(crate) multiline: bool,
    pub(crate) singleline: bool,
    pub(crate) find_longest: bool,
}

impl PatternOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_case(mut self, value: bool) -> Self {
        self.ignore_case = value;
        self
    }

    /// `.` also matches a newline (Oniguruma's meaning of multiline)
    pub fn multiline(mut self, value: bool) -> Self {
        self.multiline = value;
        self
    }

    /// `$` only matches at the end of the text, or before a final newline
    pub fn singleline(mut self, value: bool) -> Self {
        self.singleline = value;
        self
    }

    /// Return the longest match among those starting at the leftmost position
    pub fn find_longest(mut self, value: bool) -> Self {
        self.find_longest = value;
        self
    }

    pub(crate) fn to_regex_options(self) -> RegexOptions {
        let mut options = RegexOptions::REGEX_OPTION_CAPTURE_GROUP;
        if self.ignore_case {
            options |= RegexOptions::REGEX_OPTION_IGNORECASE;
        }
        if self.multiline {
            options |= RegexOptions::REGEX_OPTION_MULTILINE;
        }
        if self.singleline {
            options |= RegexOptions::REGEX_OPTION_SINGLELINE;
        }
        if self.find_longest {
            options |= RegexOptions::REGEX_OPTION_FIND_LONGEST;
        }
        options
    }
}

/// A single compiled regular expression.
pub struct Pattern {
    source: String,
    regex: onig::Regex,
}

impl Pattern {
    /// Compiles a pattern. Nothing usable is returned if Oniguruma rejects it.
    pub fn compile(source: &str) -> OcraResult<Self> {
        Self::compile_with_options(source, PatternOptions::default())
    }

    pub fn compile_with_options(source: &str, options: PatternOptions) -> OcraResult<Self> {
        let regex =
            onig::Regex::with_options(source, options.to_regex_options(), Syntax::default())
                .map_err(|e| Error::pattern_syntax(source, e))?;

        Ok(Self {
            source: source.to_owned(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of capture groups declared in the pattern, not counting the whole match
    pub fn capture_count(&self) -> usize {
        self.regex.captures_len()
    }

    /// Index of the capture group called `name`. If several groups share that name, the
    /// last one is returned, like `\k<name>` does.
    pub fn capture_index(&self, name: &str) -> Option<usize> {
        let mut index = None;
        self.regex.foreach_name(|group, indices| {
            if group == name {
                index = indices.last().map(|&i| i as usize);
                false
            } else {
                true
            }
        });
        index
    }

    /// The span of the group called `name` in a match of this pattern
    pub fn named_capture(&self, m: &MatchResult, name: &str) -> Option<Range<usize>> {
        m.capture(self.capture_index(name)?)
    }

    /// Finds the leftmost match starting at or after the char offset `start`.
    /// A `start` at or past the end of `text` never matches.
    pub fn search(&self, text: &str, start: usize) -> Option<MatchResult> {
        self.search_indexed(&IndexedText::new(text), start)
    }

    pub(crate) fn search_indexed(&self, text: &IndexedText, start: usize) -> Option<MatchResult> {
        if start >= text.len() {
            return None;
        }
        let from = text.to_byte(start)?;
        let haystack = text.as_str();

        let mut region = Region::new();
        // Searching the full text and not a slice so look-behinds see what comes before `from`
        self.regex.search_with_options(
            haystack,
            from,
            haystack.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;

        MatchResult::from_byte_positions(text, (0..region.len()).map(|i| region.pos(i)))
    }

    /// Matches only if the pattern matches starting exactly at the char offset `at`.
    /// An `at` at or past the end of `text` never matches.
    pub fn match_at(&self, text: &str, at: usize) -> Option<MatchResult> {
        self.match_at_indexed(&IndexedText::new(text), at)
    }

    pub(crate) fn match_at_indexed(&self, text: &IndexedText, at: usize) -> Option<MatchResult> {
        if at >= text.len() {
            return None;
        }
        let from = text.to_byte(at)?;

        let mut region = Region::new();
        self.regex.match_with_options(
            text.as_str(),
            from,
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;

        MatchResult::from_byte_positions(text, (0..region.len()).map(|i| region.pos(i)))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pattern({})", self.source)
    }
}

/// Whether an `end`/`while` source refers to the `begin` captures with `\1`..`\9`
pub(crate) fn has_backreferences(source: &str) -> bool {
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('1'..='9') => return true,
                _ => continue,
            }
        }
    }
    false
}

/// Replaces `\1`..`\9` with the escaped text captured by the `begin` pattern.
/// A reference to a group that didn't capture anything becomes the empty string.
pub(crate) fn resolve_backreferences(source: &str, captures: &[Option<String>]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d @ '1'..='9') => {
                let index = d as usize - '0' as usize;
                if let Some(Some(text)) = captures.get(index) {
                    out.push_str(&escape_regex(text));
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Escapes all the regex metacharacters in `text`, same set as vscode-textmate
fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '-' | '\\'
                | '{'
                | '}'
                | '*'
                | '+'
                | '?'
                | '|'
                | '^'
                | '$'
                | '.'
                | ','
                | '['
                | ']'
                | '('
                | ')'
                | '#'
        ) || c.is_whitespace()
        {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_search_with_char_offsets() {
        let pattern = Pattern::compile("world").unwrap();
        let m = pattern.search("こんにちは world", 0).unwrap();
        assert_eq!((m.start, m.end), (6, 11));

        let m = pattern.search("こんにちは world", 6).unwrap();
        assert_eq!((m.start, m.end), (6, 11));
        assert!(pattern.search("こんにちは world", 7).is_none());
    }

    #[test]
    fn reports_captures() {
        let pattern = Pattern::compile(r"(\w+)@(\w+)(!)?").unwrap();
        assert_eq!(pattern.capture_count(), 3);
        let m = pattern.search("email@example.com", 0).unwrap();
        assert_eq!(m.capture(0), Some(0..13));
        assert_eq!(m.capture(1), Some(0..5));
        assert_eq!(m.capture(2), Some(6..13));
        assert_eq!(m.capture(3), None);
        assert_eq!(m.capture(5), None);
    }

    #[test]
    fn empty_pattern_matches_zero_width() {
        let pattern = Pattern::compile("").unwrap();
        let m = pattern.search("hello", 0).unwrap();
        assert_eq!((m.start, m.end), (0, 0));
        assert!(m.is_empty());
    }

    #[test]
    fn never_searches_from_the_end_of_text() {
        let pattern = Pattern::compile(r"\d+").unwrap();
        assert!(pattern.search("123", 3).is_none());
        assert!(pattern.search("123", 10).is_none());
        assert!(pattern.search("", 0).is_none());
    }

    #[test]
    fn look_behind_sees_text_before_start() {
        let pattern = Pattern::compile(r"(?<=a)b").unwrap();
        let m = pattern.search("ab", 1).unwrap();
        assert_eq!((m.start, m.end), (1, 2));
    }

    #[test]
    fn matches_only_at_the_given_position() {
        let pattern = Pattern::compile("world").unwrap();
        assert!(pattern.match_at("hello world", 0).is_none());
        assert!(pattern.match_at("hello world", 5).is_none());
        let m = pattern.match_at("こんにちは world", 6).unwrap();
        assert_eq!((m.start, m.end), (6, 11));
        assert!(pattern.match_at("world", 5).is_none());

        let pattern = Pattern::compile(r"(?<=a)b").unwrap();
        assert!(pattern.match_at("ab", 1).is_some());
        assert!(pattern.match_at("cb", 1).is_none());

        let pattern = Pattern::compile("x*").unwrap();
        let m = pattern.match_at("abc", 1).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.start, 1);
    }

    #[test]
    fn compile_options_change_matching() {
        let default = PatternOptions::new();
        assert!(Pattern::compile("hello").unwrap().search("HELLO", 0).is_none());
        let m = Pattern::compile_with_options("hello", default.ignore_case(true))
            .unwrap()
            .search("HELLO", 0)
            .unwrap();
        assert_eq!((m.start, m.end), (0, 5));

        assert!(Pattern::compile("a.b").unwrap().search("a\nb", 0).is_none());
        assert!(
            Pattern::compile_with_options("a.b", default.multiline(true))
                .unwrap()
                .search("a\nb", 0)
                .is_some()
        );

        assert!(Pattern::compile("a$").unwrap().search("a\nb", 0).is_some());
        assert!(
            Pattern::compile_with_options("a$", default.singleline(true))
                .unwrap()
                .search("a\nb", 0)
                .is_none()
        );

        let m = Pattern::compile("a|ab").unwrap().search("ab", 0).unwrap();
        assert_eq!(m.end, 1);
        let m = Pattern::compile_with_options("a|ab", default.find_longest(true))
            .unwrap()
            .search("ab", 0)
            .unwrap();
        assert_eq!(m.end, 2);
    }

    #[test]
    fn finds_named_captures() {
        let pattern = Pattern::compile(r"(?<user>\w+)@(?<host>\w+)(\.com)?").unwrap();
        assert_eq!(pattern.capture_index("user"), Some(1));
        assert_eq!(pattern.capture_index("host"), Some(2));
        assert_eq!(pattern.capture_index("nope"), None);

        let m = pattern.search("mail: me@example.com", 0).unwrap();
        assert_eq!(pattern.named_capture(&m, "host"), Some(9..16));
        assert_eq!(pattern.named_capture(&m, "nope"), None);
        // unnamed groups still capture
        assert_eq!(m.capture(3), Some(16..20));

        assert_eq!(Pattern::compile(r"(\w+)").unwrap().capture_index("user"), None);
    }

    #[test]
    fn rejects_invalid_patterns() {
        let err = Pattern::compile("[invalid").unwrap_err();
        assert!(matches!(err, Error::PatternSyntax { ref pattern, .. } if pattern == "[invalid"));
    }

    #[test]
    fn detects_backreferences() {
        assert!(has_backreferences(r"\1"));
        assert!(has_backreferences(r"^\s*\2\b"));
        assert!(!has_backreferences(r"\\1"));
        assert!(!has_backreferences(r"\d+"));
        assert!(!has_backreferences(r"\0"));
    }

    #[test]
    fn resolves_backreferences_with_escaping() {
        let captures = vec![
            Some("<<EOF".to_owned()),
            Some("EOF".to_owned()),
            None,
            Some("a.b".to_owned()),
        ];
        assert_eq!(resolve_backreferences(r"^\1$", &captures), "^EOF$");
        assert_eq!(resolve_backreferences(r"\3(\2)", &captures), r"a\.b()");
        assert_eq!(resolve_backreferences(r"\\1\d", &captures), r"\\1\d");
        assert_eq!(resolve_backreferences(r"x\9", &captures), "x");

        let quote = vec![None, Some("'".to_owned())];
        let pattern = Pattern::compile(&resolve_backreferences(r"\1", &quote)).unwrap();
        assert!(pattern.search("abc'", 0).is_some());
        assert!(pattern.search("abc\"", 0).is_none());
    }
}
