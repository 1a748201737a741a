use std::fmt::{Debug, Formatter};

use onig::{RegSet, SearchOptions};

use crate::error::{Error, OcraResult};
use crate::grammars::offsets::IndexedText;
use crate::grammars::regex::{MatchResult, Pattern, PatternOptions};

/// An ordered group of patterns searched as a single unit with an Oniguruma `RegSet`.
///
/// The `RegSet` compiles and owns every pattern of the group and frees them when it is
/// dropped, nothing else holds on to them.
/// When several patterns match at the same leftmost position, the one added first wins.
pub struct PatternGroup {
    len: usize,
    regset: Option<RegSet>,
}

impl PatternGroup {
    /// A group that never matches anything
    pub fn empty() -> Self {
        Self {
            len: 0,
            regset: None,
        }
    }

    /// Compiles all the patterns in order. If any of them is invalid, the error points at
    /// the first offending one and no group is built.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> OcraResult<Self> {
        Self::compile_with_options(patterns, PatternOptions::default())
    }

    /// Same as [`PatternGroup::compile`], every pattern getting the same options
    pub fn compile_with_options<S: AsRef<str>>(
        patterns: &[S],
        options: PatternOptions,
    ) -> OcraResult<Self> {
        if patterns.is_empty() {
            return Ok(Self::empty());
        }

        let pattern_strs: Vec<&str> = patterns.iter().map(|s| s.as_ref()).collect();

        let regset = RegSet::with_options(&pattern_strs, options.to_regex_options())
            .map_err(|e| {
                // The regset error doesn't say which pattern is wrong so we find it ourselves
                pattern_strs
                    .iter()
                    .find_map(|p| Pattern::compile_with_options(p, options).err())
                    .unwrap_or_else(|| Error::pattern_syntax(&pattern_strs.join("|"), e))
            })?;

        Ok(Self {
            len: patterns.len(),
            regset: Some(regset),
        })
    }

    /// How many patterns are in the group. An empty group is valid and never matches.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finds the leftmost match of any pattern starting at or after the char offset `start`,
    /// returning the index of the pattern that matched along with the match.
    /// A `start` at or past the end of `text` never matches.
    pub fn search(&self, text: &str, start: usize) -> Option<(usize, MatchResult)> {
        self.search_indexed(&IndexedText::new(text), start)
    }

    pub(crate) fn search_indexed(
        &self,
        text: &IndexedText,
        start: usize,
    ) -> Option<(usize, MatchResult)> {
        let regset = self.regset.as_ref()?;
        if start >= text.len() {
            return None;
        }
        let from = text.to_byte(start)?;
        let haystack = text.as_str();

        // We need to specify pos/text.len() because some regex might do lookbehind
        let (pattern_index, captures) = regset.captures_with_options(
            haystack,
            from,
            haystack.len(),
            onig::RegSetLead::Position,
            SearchOptions::SEARCH_OPTION_NONE,
        )?;

        let m = MatchResult::from_byte_positions(text, (0..captures.len()).map(|i| captures.pos(i)))?;
        Some((pattern_index, m))
    }
}

impl Debug for PatternGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatternGroup({} patterns)", self.len)
    }
}
