use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::OcraResult;
use crate::grammars::compiled::CompiledGrammar;

/// Capture groups keyed by their group number as a string ("0", "1", ...).
/// Each value is a rule: usually only a `name`, sometimes with nested `patterns`.
///
/// # Examples
/// ```json
/// {
///   "1": { "name": "storage.type.function.js" },
///   "2": {
///     "name": "meta.parameters.js",
///     "patterns": [{ "include": "#parameter" }]
///   }
/// }
/// ```
pub type RawCaptures = BTreeMap<String, RawRule>;

/// A single rule of a TextMate grammar, as found in the JSON.
///
/// Which keys are set decides what the rule is:
/// - `include`: a reference to other rules, every other key is ignored
/// - `match`: a single line regex
/// - `begin` + `end`: a span closed by `end`
/// - `begin` + `while`: a span that continues for as long as each new line matches `while`
/// - only `patterns`: a plain container of rules
///
/// # Examples
/// ```json
/// {
///   "match": "\\b(function)\\s+(\\w+)",
///   "name": "meta.function.declaration.js",
///   "captures": {
///     "1": { "name": "storage.type.function.js" },
///     "2": { "name": "entity.name.function.js" }
///   }
/// }
/// ```
///
/// ```json
/// {
///   "name": "string.quoted.other.js",
///   "begin": "(['\"])",
///   "end": "\\1",
///   "patterns": [{ "match": "\\\\.", "name": "constant.character.escape.js" }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct RawRule {
    /// Scope name(s) for the whole match or span, space separated if several
    #[serde(default)]
    pub name: Option<String>,
    /// Scope name(s) for the text between `begin` and `end`/`while`
    #[serde(default)]
    pub content_name: Option<String>,
    #[serde(default, rename(deserialize = "match"))]
    pub match_: Option<String>,
    #[serde(default)]
    pub begin: Option<String>,
    /// Can reference captures from `begin` using \\1, \\2, etc.
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, rename(deserialize = "while"))]
    pub while_: Option<String>,
    /// Used for `match` rules, and as a fallback for `begin`/`end`/`while` when their specific
    /// captures are not set
    #[serde(default)]
    pub captures: RawCaptures,
    #[serde(default)]
    pub begin_captures: RawCaptures,
    #[serde(default)]
    pub end_captures: RawCaptures,
    #[serde(default)]
    pub while_captures: RawCaptures,
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    /// - "#name" - reference to a repository entry
    /// - "$self" - the root patterns of the grammar containing the include
    /// - "$base" - the root patterns of the grammar we started tokenizing with
    /// - "source.lang" - the root patterns of another grammar
    /// - "source.lang#name" - a repository entry of another grammar
    #[serde(default)]
    pub include: Option<String>,
    /// Rules can have their own repository, visible to their patterns only
    #[serde(default)]
    pub repository: HashMap<String, RawRule>,
    /// Set to true (or 1) to try the `end` pattern after the nested patterns
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub apply_end_pattern_last: bool,
    /// A disabled rule is skipped entirely
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub disabled: bool,
}

/// Grammars use both `true` and `1` for flags
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

/// Top-level structure representing a complete TextMate grammar
///
/// # Examples
/// ```json
/// {
///   "name": "JSON",
///   "scopeName": "source.json",
///   "fileTypes": ["json"],
///   "patterns": [{ "include": "#value" }],
///   "repository": {
///     "value": {
///       "patterns": [{ "include": "#string" }, { "include": "#number" }]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct RawGrammar {
    /// Human-readable name of the language
    #[serde(default)]
    pub name: String,
    /// Unique identifier for this grammar, used as the root scope of every token
    /// and by other grammars to include this one.
    /// Example: "source.js", "text.html.markdown"
    #[serde(default)]
    pub scope_name: String,
    #[serde(default)]
    pub file_types: Vec<String>,
    /// Root patterns
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    #[serde(default)]
    pub repository: HashMap<String, RawRule>,
}

impl RawGrammar {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> OcraResult<Self> {
        let file = File::open(&path)?;
        let raw_grammar = serde_json::from_reader(BufReader::new(file))?;
        Ok(raw_grammar)
    }

    pub fn from_json(json: &str) -> OcraResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compile this raw grammar into a compiled grammar ready to be added to a registry
    pub fn compile(self) -> OcraResult<CompiledGrammar> {
        CompiledGrammar::from_raw_grammar(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_parse_all_rule_kinds() {
        let raw = RawGrammar::from_json(
            r##"{
            "name": "Test",
            "scopeName": "source.test",
            "patterns": [
                { "include": "#strings" },
                { "match": "\\d+", "name": "constant.numeric" },
                { "begin": "^>", "while": "^>", "name": "markup.quote" }
            ],
            "repository": {
                "strings": {
                    "begin": "\"",
                    "end": "\"",
                    "applyEndPatternLast": 1,
                    "beginCaptures": { "0": { "name": "punctuation" } },
                    "patterns": [{ "match": "\\\\.", "disabled": true }]
                }
            }
        }"##,
        )
        .unwrap();

        assert_eq!(raw.scope_name, "source.test");
        assert_eq!(raw.patterns.len(), 3);
        assert_eq!(raw.patterns[0].include.as_deref(), Some("#strings"));
        assert_eq!(raw.patterns[1].match_.as_deref(), Some(r"\d+"));
        assert_eq!(raw.patterns[2].while_.as_deref(), Some("^>"));

        let strings = &raw.repository["strings"];
        assert!(strings.apply_end_pattern_last);
        assert_eq!(strings.begin_captures["0"].name.as_deref(), Some("punctuation"));
        assert!(strings.patterns[0].disabled);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(RawGrammar::from_json("{ \"scopeName\": ").is_err());
        assert!(RawGrammar::from_json(r#"{ "patterns": {} }"#).is_err());
    }
}
