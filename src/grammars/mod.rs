mod compiled;
mod context;
mod offsets;
mod pattern_set;
mod raw;
mod regex;

pub use compiled::*;
pub(crate) use context::ContextCache;
pub use context::{Candidate, CompiledContext, ContentRef, ContextId, ContextPath, FrameEnd};
pub(crate) use offsets::IndexedText;
pub use pattern_set::PatternGroup;
pub use raw::{RawCaptures, RawGrammar, RawRule};
pub(crate) use regex::resolve_backreferences;
pub use regex::{MatchResult, Pattern, PatternOptions};

use crate::error::OcraResult;

/// Parses and compiles a TextMate grammar in its JSON form.
pub fn load_grammar(json: &str) -> OcraResult<CompiledGrammar> {
    RawGrammar::from_json(json)?.compile()
}
