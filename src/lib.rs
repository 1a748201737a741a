//! Incremental, line by line tokenization with TextMate grammars.
//!
//! Grammars are added to a [`Registry`], which is then shared by every [`Tokenizer`] created
//! from it. Each line is tokenized with the [`StateStack`] returned for the previous one, so
//! re-tokenizing a document after an edit can start from any line whose state was kept.
//!
//! ```no_run
//! use ocra::{Registry, StateStack};
//!
//! let mut registry = Registry::new();
//! registry.add_grammar_from_path("grammars/rust.json").unwrap();
//!
//! let mut tokenizer = registry.tokenizer("source.rust").unwrap();
//! let mut state = StateStack::new();
//! for line in ["fn main() {", "}"] {
//!     let result = tokenizer.tokenize_line(line, &state);
//!     println!("{:?}", result.tokens);
//!     state = result.state;
//! }
//! ```

mod error;
mod grammars;
mod options;
mod registry;
mod scope;
mod tokenizer;

#[cfg(test)]
mod test_utils;

pub use error::{Error, OcraResult};
pub use grammars::{
    Candidate, CompiledContext, CompiledGrammar, ContentRef, ContextId, ContextPath, FrameEnd,
    GlobalRuleRef, GrammarId, MatchResult, Pattern, PatternGroup, PatternOptions, RawCaptures,
    RawGrammar, RawRule, SkippedRule, load_grammar,
};
pub use options::TokenizerOptions;
pub use registry::Registry;
pub use scope::Scope;
pub use tokenizer::{LineTokens, StateStack, Token, Tokenizer};
