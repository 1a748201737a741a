use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use crate::error::{Error, OcraResult};
use crate::grammars::raw::{RawCaptures, RawGrammar, RawRule};
use crate::grammars::regex::{Pattern, has_backreferences};
use crate::scope::Scope;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct GrammarId(pub(crate) u16);

impl GrammarId {
    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

impl RuleId {
    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// An ordered list of pattern references: the root patterns, a repository entry, the nested
/// patterns of a span or of a capture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ListId(u32);

impl ListId {
    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CaptureId(u32);

impl CaptureId {
    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RegexId(u32);

impl RegexId {
    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct RepositoryId(u16);

/// A rule of a specific grammar in a registry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct GlobalRuleRef {
    pub grammar: GrammarId,
    pub rule: RuleId,
}

const MAX_REPOSITORY_DEPTH: usize = 8;

/// The repositories visible from a rule, outermost (the grammar's) first.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct RepositoryStack {
    stack: [RepositoryId; MAX_REPOSITORY_DEPTH],
    len: u8,
}

impl RepositoryStack {
    fn push(mut self, id: RepositoryId) -> Option<Self> {
        if self.len as usize == MAX_REPOSITORY_DEPTH {
            return None;
        }
        self.stack[self.len as usize] = id;
        self.len += 1;
        Some(self)
    }

    fn innermost_first(&self) -> impl Iterator<Item = RepositoryId> + '_ {
        self.stack[..self.len as usize].iter().rev().copied()
    }
}

/// What an `include` points to.
///
/// per vscode-textmate:
///  Allowed values:
///  * Scope Name, e.g. `source.ts`
///  * Top level scope reference, e.g. `source.ts#entity.name.class`
///  * Relative scope reference, e.g. `#entity.name.class`
///  * self, e.g. `$self`
///  * base, e.g. `$base`
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Reference {
    SelfRoot,
    Base,
    Local(String),
    Foreign {
        scope_name: String,
        entry: Option<String>,
    },
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        match value.trim() {
            "$self" => Self::SelfRoot,
            "$base" => Self::Base,
            s if s.starts_with('#') => Self::Local(s[1..].to_string()),
            s => match s.split_once('#') {
                Some((scope, entry)) => Self::Foreign {
                    scope_name: scope.to_string(),
                    entry: Some(entry.to_string()),
                },
                None => Self::Foreign {
                    scope_name: s.to_string(),
                    entry: None,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub reference: Reference,
    /// Repositories to look into for `Reference::Local`
    pub(crate) repositories: RepositoryStack,
}

/// An element of a rule list. Includes only exist at this level: they are expanded away
/// when building a context and never reach the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternRef {
    Rule(RuleId),
    /// A rule that only groups other patterns
    List(ListId),
    Include(Include),
}

/// Scopes applied to a capture group, with optional patterns to tokenize the captured text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub scopes: Vec<Scope>,
    pub patterns: Option<ListId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub scopes: Vec<Scope>,
    pub pattern: RegexId,
    /// Indexed by capture group number
    pub captures: Vec<Option<CaptureId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanClose {
    End {
        pattern: RegexId,
        captures: Vec<Option<CaptureId>>,
        apply_last: bool,
    },
    While {
        pattern: RegexId,
        captures: Vec<Option<CaptureId>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRule {
    /// `name`: applies to begin, content and end
    pub scopes: Vec<Scope>,
    /// `contentName`: applies to the content only
    pub content_scopes: Vec<Scope>,
    pub begin: RegexId,
    pub begin_captures: Vec<Option<CaptureId>>,
    pub close: SpanClose,
    /// Whether the end/while pattern needs `\1`-style references filled from `begin`
    pub close_has_backrefs: bool,
    pub patterns: ListId,
}

impl SpanRule {
    pub fn close_pattern(&self) -> RegexId {
        match &self.close {
            SpanClose::End { pattern, .. } | SpanClose::While { pattern, .. } => *pattern,
        }
    }

    pub fn close_captures(&self) -> &[Option<CaptureId>] {
        match &self.close {
            SpanClose::End { captures, .. } | SpanClose::While { captures, .. } => captures,
        }
    }

    pub fn is_while(&self) -> bool {
        matches!(self.close, SpanClose::While { .. })
    }

    pub fn apply_end_last(&self) -> bool {
        matches!(self.close, SpanClose::End { apply_last: true, .. })
    }
}

/// A compiled rule: either a single line match or a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Match(MatchRule),
    Span(SpanRule),
}

/// A rule that was left out of the grammar because one of its patterns doesn't compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRule {
    /// Where the rule is in the grammar, eg `repository.string.patterns[1]`
    pub path: String,
    pub pattern: String,
    pub message: String,
}

/// A grammar with all its rules stored in arenas and referring to each other by id.
///
/// Immutable once built: the context cache and tokenizers only ever read from it.
#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    pub name: String,
    pub scope_name: String,
    pub scope: Scope,
    pub file_types: Vec<String>,
    pub(crate) regexes: Vec<Arc<str>>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) lists: Vec<Vec<PatternRef>>,
    pub(crate) captures: Vec<Capture>,
    pub(crate) repositories: Vec<HashMap<String, ListId>>,
    pub(crate) root: ListId,
    skipped: Vec<SkippedRule>,
}

impl CompiledGrammar {
    pub fn from_raw_grammar(raw: RawGrammar) -> OcraResult<Self> {
        let scope_name = raw.scope_name.trim().to_owned();
        if scope_name.is_empty() {
            return Err(Error::grammar_format("scopeName", "a grammar needs a scope name"));
        }

        let mut compiler = GrammarCompiler {
            grammar: Self {
                name: raw.name,
                scope: Scope::new(&scope_name),
                scope_name,
                file_types: raw.file_types,
                regexes: Vec::new(),
                rules: Vec::new(),
                lists: Vec::new(),
                captures: Vec::new(),
                repositories: Vec::new(),
                root: ListId(0),
                skipped: Vec::new(),
            },
            local_includes: Vec::new(),
        };

        // The grammar repository is always RepositoryId(0), even when empty
        let stack =
            compiler.compile_repository(raw.repository, RepositoryStack::default(), "repository")?;
        compiler.grammar.root = compiler.compile_list(raw.patterns, stack, "patterns")?;
        compiler.check_local_includes()?;

        Ok(compiler.grammar)
    }

    /// Rules that were ignored because of invalid regexes
    pub fn skipped_rules(&self) -> &[SkippedRule] {
        &self.skipped
    }

    pub(crate) fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.as_index())
    }

    pub(crate) fn span_rule(&self, id: RuleId) -> Option<&SpanRule> {
        match self.rule(id)? {
            Rule::Span(span) => Some(span),
            Rule::Match(_) => None,
        }
    }

    pub(crate) fn list(&self, id: ListId) -> &[PatternRef] {
        self.lists.get(id.as_index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn regex(&self, id: RegexId) -> &Arc<str> {
        &self.regexes[id.as_index()]
    }

    pub(crate) fn capture(&self, id: CaptureId) -> Option<&Capture> {
        self.captures.get(id.as_index())
    }

    /// Looks for `name` in the repositories visible from an include, innermost first
    pub(crate) fn lookup_local(&self, name: &str, repositories: RepositoryStack) -> Option<ListId> {
        repositories
            .innermost_first()
            .find_map(|repo| self.repositories.get(repo.0 as usize)?.get(name).copied())
    }

    /// Looks for `name` in the grammar top-level repository, used by `source.lang#name` includes
    pub(crate) fn repository_entry(&self, name: &str) -> Option<ListId> {
        self.repositories.first()?.get(name).copied()
    }
}

enum RuleShape {
    Match(String),
    Span {
        begin: String,
        close: String,
        is_while: bool,
    },
    Container,
}

struct GrammarCompiler {
    grammar: CompiledGrammar,
    /// (path, name, repositories) of every `#name` include, checked once everything is compiled
    local_includes: Vec<(String, String, RepositoryStack)>,
}

impl GrammarCompiler {
    fn compile_repository(
        &mut self,
        raw_repository: HashMap<String, RawRule>,
        repository_stack: RepositoryStack,
        path: &str,
    ) -> OcraResult<RepositoryStack> {
        let repo_id = RepositoryId(self.grammar.repositories.len() as u16);
        self.grammar.repositories.push(HashMap::new());
        let stack = repository_stack
            .push(repo_id)
            .ok_or_else(|| Error::grammar_format(path, "repositories are nested too deeply"))?;

        let mut entries = HashMap::with_capacity(raw_repository.len());
        for (name, raw_rule) in raw_repository {
            let entry_path = format!("{path}.{name}");
            let list = match self.compile_rule(raw_rule, stack, &entry_path)? {
                Some(PatternRef::List(id)) => id,
                Some(pattern_ref) => self.push_list(vec![pattern_ref]),
                None => self.push_list(Vec::new()),
            };
            entries.insert(name, list);
        }

        self.grammar.repositories[repo_id.0 as usize] = entries;
        Ok(stack)
    }

    fn compile_list(
        &mut self,
        rules: Vec<RawRule>,
        repository_stack: RepositoryStack,
        path: &str,
    ) -> OcraResult<ListId> {
        let mut out = Vec::with_capacity(rules.len());

        for (i, r) in rules.into_iter().enumerate() {
            if let Some(pattern_ref) = self.compile_rule(r, repository_stack, &format!("{path}[{i}]"))?
            {
                out.push(pattern_ref);
            }
        }

        Ok(self.push_list(out))
    }

    /// Returns `None` for rules that end up contributing nothing: disabled, empty or with an
    /// invalid regex.
    fn compile_rule(
        &mut self,
        mut raw_rule: RawRule,
        repository_stack: RepositoryStack,
        path: &str,
    ) -> OcraResult<Option<PatternRef>> {
        if raw_rule.disabled {
            return Ok(None);
        }

        // vscode ignores other rule contents if there's an include
        // https://github.com/microsoft/vscode-textmate/blob/f03a6a8790af81372d0e81facae75554ec5e97ef/src/rule.ts#L495
        if let Some(include) = raw_rule.include {
            let reference = Reference::from(include.as_str());
            if let Reference::Local(name) = &reference {
                self.local_includes
                    .push((path.to_owned(), name.clone(), repository_stack));
            }
            return Ok(Some(PatternRef::Include(Include {
                reference,
                repositories: repository_stack,
            })));
        }

        let shape = match (
            raw_rule.match_.take(),
            raw_rule.begin.take(),
            raw_rule.end.take(),
            raw_rule.while_.take(),
        ) {
            (Some(_), Some(_), _, _) => Err("a rule cannot have both `match` and `begin`"),
            (_, Some(_), Some(_), Some(_)) => Err("a rule cannot have both `end` and `while`"),
            (_, None, Some(_), _) => Err("`end` without `begin`"),
            (_, None, _, Some(_)) => Err("`while` without `begin`"),
            (None, Some(_), None, None) => Err("`begin` without `end` or `while`"),
            (Some(m), None, None, None) => Ok(RuleShape::Match(m)),
            (None, Some(begin), Some(close), None) => Ok(RuleShape::Span {
                begin,
                close,
                is_while: false,
            }),
            (None, Some(begin), None, Some(close)) => Ok(RuleShape::Span {
                begin,
                close,
                is_while: true,
            }),
            (None, None, None, None) => Ok(RuleShape::Container),
        }
        .map_err(|message| Error::grammar_format(path, message))?;

        let repository_stack = if raw_rule.repository.is_empty() {
            repository_stack
        } else {
            self.compile_repository(
                mem::take(&mut raw_rule.repository),
                repository_stack,
                &format!("{path}.repository"),
            )?
        };
        let scopes = raw_rule
            .name
            .as_deref()
            .map(Scope::parse_many)
            .unwrap_or_default();

        let rule = match shape {
            RuleShape::Match(source) => {
                if !self.validate(&source, path) {
                    return Ok(None);
                }
                let pattern = self.push_regex(source);
                let captures = self.compile_captures(
                    raw_rule.captures,
                    repository_stack,
                    &format!("{path}.captures"),
                )?;
                Rule::Match(MatchRule {
                    scopes,
                    pattern,
                    captures,
                })
            }
            RuleShape::Span {
                begin,
                close,
                is_while,
            } => {
                // Patterns with backreferences can only be compiled once `begin` has matched
                let close_has_backrefs = has_backreferences(&close);
                if !self.validate(&begin, path)
                    || (!close_has_backrefs && !self.validate(&close, path))
                {
                    return Ok(None);
                }

                let begin_id = self.push_regex(begin);
                let close_id = self.push_regex(close);
                let (begin_captures, close_captures, close_key) = if is_while {
                    (raw_rule.begin_captures, raw_rule.while_captures, "whileCaptures")
                } else {
                    (raw_rule.begin_captures, raw_rule.end_captures, "endCaptures")
                };
                let begin_captures = self.compile_captures(
                    fallback_captures(begin_captures, &raw_rule.captures),
                    repository_stack,
                    &format!("{path}.beginCaptures"),
                )?;
                let close_captures = self.compile_captures(
                    fallback_captures(close_captures, &raw_rule.captures),
                    repository_stack,
                    &format!("{path}.{close_key}"),
                )?;
                let patterns = self.compile_list(
                    raw_rule.patterns,
                    repository_stack,
                    &format!("{path}.patterns"),
                )?;
                let close = if is_while {
                    SpanClose::While {
                        pattern: close_id,
                        captures: close_captures,
                    }
                } else {
                    SpanClose::End {
                        pattern: close_id,
                        captures: close_captures,
                        apply_last: raw_rule.apply_end_pattern_last,
                    }
                };

                Rule::Span(SpanRule {
                    scopes,
                    content_scopes: raw_rule
                        .content_name
                        .as_deref()
                        .map(Scope::parse_many)
                        .unwrap_or_default(),
                    begin: begin_id,
                    begin_captures,
                    close,
                    close_has_backrefs,
                    patterns,
                })
            }
            RuleShape::Container => {
                if raw_rule.patterns.is_empty() {
                    return Ok(None);
                }
                let list = self.compile_list(
                    raw_rule.patterns,
                    repository_stack,
                    &format!("{path}.patterns"),
                )?;
                return Ok(Some(PatternRef::List(list)));
            }
        };

        let id = RuleId(self.grammar.rules.len() as u32);
        self.grammar.rules.push(rule);
        Ok(Some(PatternRef::Rule(id)))
    }

    fn compile_captures(
        &mut self,
        captures: RawCaptures,
        repository_stack: RepositoryStack,
        path: &str,
    ) -> OcraResult<Vec<Option<CaptureId>>> {
        if captures.is_empty() {
            return Ok(Vec::new());
        }

        let mut parsed = Vec::with_capacity(captures.len());
        for (key, rule) in captures {
            let index: usize = key.trim().parse().map_err(|_| {
                Error::grammar_format(format!("{path}.{key}"), "capture keys must be group numbers")
            })?;
            parsed.push((index, key, rule));
        }

        // some grammars have captures with very high numbers so the vec can be a bit sparse
        let max_capture = parsed.iter().map(|(i, _, _)| *i).max().unwrap_or_default();
        let mut out = vec![None; max_capture + 1];

        for (index, key, rule) in parsed {
            let scopes = rule
                .name
                .as_deref()
                .map(Scope::parse_many)
                .unwrap_or_default();
            let patterns = if rule.patterns.is_empty() {
                None
            } else {
                Some(self.compile_list(
                    rule.patterns,
                    repository_stack,
                    &format!("{path}.{key}.patterns"),
                )?)
            };
            if scopes.is_empty() && patterns.is_none() {
                continue;
            }

            let id = CaptureId(self.grammar.captures.len() as u32);
            self.grammar.captures.push(Capture { scopes, patterns });
            out[index] = Some(id);
        }

        Ok(out)
    }

    /// An invalid regex doesn't fail the grammar, the rule using it is left out
    fn validate(&mut self, source: &str, path: &str) -> bool {
        match Pattern::compile(source) {
            Ok(_) => true,
            Err(err) => {
                log::warn!(
                    "[{}] skipping rule at {path}: {err}",
                    self.grammar.scope_name
                );
                let message = match err {
                    Error::PatternSyntax { message, .. } => message,
                    other => other.to_string(),
                };
                self.grammar.skipped.push(SkippedRule {
                    path: path.to_owned(),
                    pattern: source.to_owned(),
                    message,
                });
                false
            }
        }
    }

    fn push_regex(&mut self, source: String) -> RegexId {
        let id = RegexId(self.grammar.regexes.len() as u32);
        self.grammar.regexes.push(Arc::from(source));
        id
    }

    fn push_list(&mut self, list: Vec<PatternRef>) -> ListId {
        let id = ListId(self.grammar.lists.len() as u32);
        self.grammar.lists.push(list);
        id
    }

    fn check_local_includes(&self) -> OcraResult<()> {
        for (path, name, repositories) in &self.local_includes {
            if self.grammar.lookup_local(name, *repositories).is_none() {
                return Err(Error::grammar_format(
                    path.clone(),
                    format!("include '#{name}' does not match any repository entry"),
                ));
            }
        }
        Ok(())
    }
}

/// `captures` applies to begin/end/while when they don't have their own
fn fallback_captures(specific: RawCaptures, shared: &RawCaptures) -> RawCaptures {
    if specific.is_empty() {
        shared.clone()
    } else {
        specific
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(json: &str) -> OcraResult<CompiledGrammar> {
        RawGrammar::from_json(json)?.compile()
    }

    fn format_error(json: &str) -> (String, String) {
        match compile(json) {
            Err(Error::GrammarFormat { path, message }) => (path, message),
            other => panic!("expected a grammar format error, got {other:?}"),
        }
    }

    #[test]
    fn can_compile_rules() {
        let grammar = compile(
            r##"{
            "scopeName": "source.test",
            "patterns": [
                { "match": "\\d+", "name": "constant.numeric" },
                { "begin": "\"", "end": "\"", "name": "string", "contentName": "string.content",
                  "captures": { "0": { "name": "punctuation" } },
                  "patterns": [{ "match": "\\\\." }] },
                { "begin": "^>", "while": "^>", "whileCaptures": { "0": { "name": "quote" } } },
                { "patterns": [{ "include": "#kw" }] }
            ],
            "repository": { "kw": { "match": "\\bif\\b" } }
        }"##,
        )
        .unwrap();

        assert_eq!(grammar.scope, Scope::new("source.test"));
        let root = grammar.list(grammar.root);
        assert_eq!(root.len(), 4);
        assert!(matches!(root[3], PatternRef::List(_)));

        let PatternRef::Rule(id) = root[1] else {
            panic!("expected a rule");
        };
        let span = grammar.span_rule(id).unwrap();
        assert!(!span.is_while());
        assert_eq!(span.scopes, vec![Scope::new("string")]);
        assert_eq!(span.content_scopes, vec![Scope::new("string.content")]);
        // `captures` is used for both begin and end
        assert_eq!(span.begin_captures.len(), 1);
        assert_eq!(span.close_captures().len(), 1);
        assert_eq!(grammar.list(span.patterns).len(), 1);

        let PatternRef::Rule(id) = root[2] else {
            panic!("expected a rule");
        };
        let span = grammar.span_rule(id).unwrap();
        assert!(span.is_while());
        assert!(span.begin_captures.is_empty());
        assert_eq!(span.close_captures().len(), 1);

        assert!(grammar.repository_entry("kw").is_some());
        assert!(grammar.skipped_rules().is_empty());
    }

    #[test]
    fn detects_backreferences_in_end() {
        let grammar = compile(
            r#"{
            "scopeName": "source.test",
            "patterns": [{ "begin": "(['\"])", "end": "\\1" }]
        }"#,
        )
        .unwrap();
        let PatternRef::Rule(id) = grammar.list(grammar.root)[0] else {
            panic!("expected a rule");
        };
        assert!(grammar.span_rule(id).unwrap().close_has_backrefs);
    }

    #[test]
    fn skips_rules_with_invalid_regex() {
        let grammar = compile(
            r#"{
            "scopeName": "source.test",
            "patterns": [
                { "match": "[oops", "name": "broken" },
                { "begin": "a", "end": "(b" },
                { "match": "ok" }
            ]
        }"#,
        )
        .unwrap();

        assert_eq!(grammar.list(grammar.root).len(), 1);
        let skipped = grammar.skipped_rules();
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].path, "patterns[0]");
        assert_eq!(skipped[0].pattern, "[oops");
        assert_eq!(skipped[1].path, "patterns[1]");
        assert_eq!(skipped[1].pattern, "(b");
    }

    #[test]
    fn disabled_and_empty_rules_are_ignored() {
        let grammar = compile(
            r#"{
            "scopeName": "source.test",
            "patterns": [
                { "match": "a", "disabled": 1 },
                { "name": "only.a.name" },
                { "match": "b" }
            ]
        }"#,
        )
        .unwrap();
        assert_eq!(grammar.list(grammar.root).len(), 1);
    }

    #[test]
    fn rejects_structurally_invalid_grammars() {
        let (path, _) = format_error(r#"{ "patterns": [] }"#);
        assert_eq!(path, "scopeName");

        let (path, message) = format_error(
            r#"{ "scopeName": "source.test", "patterns": [{ "match": "a" }, { "begin": "a" }] }"#,
        );
        assert_eq!(path, "patterns[1]");
        assert!(message.contains("without `end`"));

        let (path, _) = format_error(
            r#"{ "scopeName": "source.test", "repository": { "str": { "end": "a" } } }"#,
        );
        assert_eq!(path, "repository.str");

        let (_, message) = format_error(
            r#"{ "scopeName": "source.test", "patterns": [{ "begin": "a", "end": "b", "while": "c" }] }"#,
        );
        assert!(message.contains("both `end` and `while`"));

        let (_, message) = format_error(
            r#"{ "scopeName": "source.test", "patterns": [{ "match": "a", "begin": "b", "end": "c" }] }"#,
        );
        assert!(message.contains("both `match` and `begin`"));

        let (path, _) = format_error(
            r#"{ "scopeName": "source.test", "patterns": [{ "match": "a", "captures": { "one": { "name": "x" } } }] }"#,
        );
        assert_eq!(path, "patterns[0].captures.one");
    }

    #[test]
    fn rejects_unknown_local_includes() {
        let (path, message) = format_error(
            r##"{
            "scopeName": "source.test",
            "patterns": [{ "begin": "a", "end": "b", "patterns": [{ "include": "#nope" }] }]
        }"##,
        );
        assert_eq!(path, "patterns[0].patterns[0]");
        assert!(message.contains("#nope"));
    }

    #[test]
    fn nested_repositories_shadow_outer_ones() {
        let grammar = compile(
            r##"{
            "scopeName": "source.test",
            "patterns": [{
                "begin": "a", "end": "b",
                "repository": { "inner": { "match": "x" }, "shared": { "match": "y" } },
                "patterns": [{ "include": "#inner" }, { "include": "#shared" }, { "include": "#outer" }]
            }],
            "repository": { "outer": { "match": "z" }, "shared": { "match": "w" } }
        }"##,
        )
        .unwrap();

        let PatternRef::Rule(id) = grammar.list(grammar.root)[0] else {
            panic!("expected a rule");
        };
        let span = grammar.span_rule(id).unwrap();
        let includes: Vec<_> = grammar
            .list(span.patterns)
            .iter()
            .map(|p| match p {
                PatternRef::Include(inc) => inc.clone(),
                _ => panic!("expected an include"),
            })
            .collect();

        let find = |inc: &Include| {
            let Reference::Local(name) = &inc.reference else {
                panic!("expected a local include");
            };
            grammar.lookup_local(name, inc.repositories).unwrap()
        };
        let shared = find(&includes[1]);
        assert_ne!(Some(shared), grammar.repository_entry("shared"));
        assert_eq!(Some(find(&includes[2])), grammar.repository_entry("outer"));
        assert!(grammar.repository_entry("inner").is_none());
    }

    #[test]
    fn can_parse_references() {
        assert_eq!(Reference::from("$self"), Reference::SelfRoot);
        assert_eq!(Reference::from("$base"), Reference::Base);
        assert_eq!(Reference::from("#value"), Reference::Local("value".to_owned()));
        assert_eq!(
            Reference::from("source.js"),
            Reference::Foreign {
                scope_name: "source.js".to_owned(),
                entry: None
            }
        );
        assert_eq!(
            Reference::from("source.js#expression"),
            Reference::Foreign {
                scope_name: "source.js".to_owned(),
                entry: Some("expression".to_owned())
            }
        );
    }
}
