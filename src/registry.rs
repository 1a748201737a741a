use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, OcraResult};
use crate::grammars::{
    Candidate, CompiledContext, CompiledGrammar, ContentRef, ContextCache, ContextId, ContextPath,
    GlobalRuleRef, GrammarId, Include, ListId, PatternRef, RawGrammar, Reference, Rule,
};
use crate::options::TokenizerOptions;
use crate::tokenizer::{Token, Tokenizer};

#[inline]
pub(crate) fn normalize_string(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Lists and rules already seen while expanding the includes of a context
#[derive(Default)]
struct Expansion {
    visited: HashSet<(GrammarId, ListId)>,
    seen: HashSet<GlobalRuleRef>,
    rules: Vec<GlobalRuleRef>,
}

/// The main struct in ocra.
///
/// Holds all the grammars, keyed by scope name, and the contexts resolved from them so far.
/// A registry is shared by reference between tokenizers, including across threads.
#[derive(Default)]
pub struct Registry {
    pub(crate) grammars: Vec<CompiledGrammar>,
    grammar_id_by_scope_name: HashMap<String, GrammarId>,
    contexts: ContextCache,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled grammar to the registry.
    ///
    /// A grammar with the same scope name as an existing one replaces it and keeps its id.
    pub fn add_grammar(&mut self, grammar: CompiledGrammar) -> GrammarId {
        // Contexts might point to rules of the grammar being replaced
        self.contexts.clear();

        if let Some(&grammar_id) = self.grammar_id_by_scope_name.get(&grammar.scope_name) {
            self.grammars[grammar_id.as_index()] = grammar;
            return grammar_id;
        }

        let grammar_id = GrammarId(self.grammars.len() as u16);
        self.grammar_id_by_scope_name
            .insert(grammar.scope_name.clone(), grammar_id);
        self.grammars.push(grammar);
        grammar_id
    }

    /// Reads the file and add it as a grammar.
    pub fn add_grammar_from_path(&mut self, path: impl AsRef<Path>) -> OcraResult<GrammarId> {
        let raw_grammar = RawGrammar::load_from_file(path)?;
        Ok(self.add_grammar(raw_grammar.compile()?))
    }

    /// Parses the JSON grammar and add it.
    pub fn add_grammar_from_str(&mut self, json: &str) -> OcraResult<GrammarId> {
        let raw_grammar = RawGrammar::from_json(json)?;
        Ok(self.add_grammar(raw_grammar.compile()?))
    }

    /// Checks whether a grammar with that scope name is available in the registry
    pub fn contains_grammar(&self, scope_name: &str) -> bool {
        self.grammar_id_by_scope_name.contains_key(scope_name)
    }

    pub fn grammar_id(&self, scope_name: &str) -> Option<GrammarId> {
        self.grammar_id_by_scope_name.get(scope_name).copied()
    }

    pub fn grammar(&self, grammar_id: GrammarId) -> Option<&CompiledGrammar> {
        self.grammars.get(grammar_id.as_index())
    }

    /// Starts a tokenization session for the grammar with that scope name.
    pub fn tokenizer(&self, scope_name: &str) -> OcraResult<Tokenizer<'_>> {
        self.tokenizer_with_options(scope_name, TokenizerOptions::default())
    }

    pub fn tokenizer_with_options(
        &self,
        scope_name: &str,
        options: TokenizerOptions,
    ) -> OcraResult<Tokenizer<'_>> {
        let grammar_id = self
            .grammar_id(scope_name)
            .ok_or_else(|| Error::GrammarNotFound(scope_name.to_string()))?;
        Ok(Tokenizer::new(self, grammar_id, options))
    }

    /// Tokenizes a whole text with a one-off session, one `Vec<Token>` per line.
    pub fn tokenize(&self, scope_name: &str, text: &str) -> OcraResult<Vec<Vec<Token>>> {
        let mut tokenizer = self.tokenizer(scope_name)?;
        Ok(tokenizer.tokenize_text(text))
    }

    /// Returns the candidates valid for the given path, computing them on first use.
    ///
    /// Paths whose ends were built from begin captures are compiled every time and never
    /// cached, see [`ContextPath::is_shareable`].
    pub fn resolve_context(&self, path: &ContextPath) -> Arc<CompiledContext> {
        if !path.is_shareable() {
            return Arc::new(self.compile_context(path, self.contexts.next_id()));
        }
        self.contexts
            .get_or_compile(path, |id| self.compile_context(path, id))
    }

    /// Number of contexts in the shared cache
    pub fn cached_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn compile_context(&self, path: &ContextPath, id: ContextId) -> CompiledContext {
        let mut entries = Vec::new();
        let end = path
            .end
            .as_ref()
            .map(|e| (Candidate::End { distance: e.distance }, e.source.clone()));

        if !path.end_last {
            entries.extend(end.clone());
        }

        let (grammar_id, list) = match path.content {
            ContentRef::Root(grammar_id) => (grammar_id, self.grammar(grammar_id).map(|g| g.root)),
            ContentRef::Span(rule_ref) => (
                rule_ref.grammar,
                self.grammar(rule_ref.grammar)
                    .and_then(|g| g.span_rule(rule_ref.rule))
                    .map(|span| span.patterns),
            ),
            ContentRef::Capture { grammar, capture } => (
                grammar,
                self.grammar(grammar)
                    .and_then(|g| g.capture(capture))
                    .and_then(|c| c.patterns),
            ),
        };

        if let Some(list) = list {
            let mut expansion = Expansion::default();
            self.expand_list(path.base, grammar_id, list, &mut expansion);

            for rule_ref in expansion.rules {
                let grammar = &self.grammars[rule_ref.grammar.as_index()];
                let source = match grammar.rule(rule_ref.rule) {
                    Some(Rule::Match(m)) => grammar.regex(m.pattern),
                    Some(Rule::Span(s)) => grammar.regex(s.begin),
                    None => continue,
                };
                entries.push((Candidate::Rule(rule_ref), source.clone()));
            }
        }

        if path.end_last {
            entries.extend(end);
        }
        entries.extend(
            path.outer_ends
                .iter()
                .map(|e| (Candidate::End { distance: e.distance }, e.source.clone())),
        );

        let context = CompiledContext::new(id, entries);
        #[cfg(feature = "debug")]
        log::debug!("[compile_context] {path:?}\n{context:?}");
        context
    }

    /// Adds the rules of a list in order, going through includes depth first.
    /// Spans are added as is: their own patterns are only looked at once they are entered.
    fn expand_list(
        &self,
        base_grammar_id: GrammarId,
        grammar_id: GrammarId,
        list: ListId,
        expansion: &mut Expansion,
    ) {
        if !expansion.visited.insert((grammar_id, list)) {
            return;
        }
        let Some(grammar) = self.grammar(grammar_id) else {
            return;
        };

        for pattern in grammar.list(list) {
            match pattern {
                PatternRef::Rule(rule) => {
                    let rule_ref = GlobalRuleRef {
                        grammar: grammar_id,
                        rule: *rule,
                    };
                    if expansion.seen.insert(rule_ref) {
                        expansion.rules.push(rule_ref);
                    }
                }
                PatternRef::List(inner) => {
                    self.expand_list(base_grammar_id, grammar_id, *inner, expansion)
                }
                PatternRef::Include(include) => {
                    if let Some((target_grammar, target_list)) =
                        self.resolve_include(base_grammar_id, grammar_id, include)
                    {
                        self.expand_list(base_grammar_id, target_grammar, target_list, expansion);
                    }
                }
            }
        }
    }

    fn resolve_include(
        &self,
        base_grammar_id: GrammarId,
        grammar_id: GrammarId,
        include: &Include,
    ) -> Option<(GrammarId, ListId)> {
        let grammar = self.grammar(grammar_id)?;

        match &include.reference {
            Reference::SelfRoot => Some((grammar_id, grammar.root)),
            Reference::Base => self
                .grammar(base_grammar_id)
                .map(|base| (base_grammar_id, base.root)),
            Reference::Local(name) => grammar
                .lookup_local(name, include.repositories)
                .map(|list| (grammar_id, list)),
            Reference::Foreign { scope_name, entry } => {
                let Some(foreign_id) = self.grammar_id(scope_name) else {
                    log::debug!(
                        "[{}] grammar '{scope_name}' is not in the registry, include ignored",
                        grammar.scope_name
                    );
                    return None;
                };
                let foreign = &self.grammars[foreign_id.as_index()];
                match entry {
                    None => Some((foreign_id, foreign.root)),
                    Some(entry) => {
                        let list = foreign.repository_entry(entry);
                        if list.is_none() {
                            log::debug!(
                                "[{}] '{scope_name}#{entry}' does not exist, include ignored",
                                grammar.scope_name
                            );
                        }
                        list.map(|list| (foreign_id, list))
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field(
                "grammars",
                &self
                    .grammars
                    .iter()
                    .map(|g| g.scope_name.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("contexts", &self.contexts)
            .finish()
    }
}
