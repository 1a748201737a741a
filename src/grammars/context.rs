use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::OcraResult;
use crate::grammars::compiled::{CaptureId, GlobalRuleRef, GrammarId};
use crate::grammars::pattern_set::PatternGroup;

/// Unique id of a context within a registry, used to key the pattern groups built from it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

/// Which rule list provides the content patterns of a context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ContentRef {
    /// Top-level patterns of a grammar
    Root(GrammarId),
    /// Nested patterns of a begin/end or begin/while rule
    Span(GlobalRuleRef),
    /// Patterns re-tokenizing the text of a capture group
    Capture {
        grammar: GrammarId,
        capture: CaptureId,
    },
}

/// The `end` pattern of an open frame, after back-references were filled in.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FrameEnd {
    /// How many frames sit above the one this end closes: 0 for the innermost frame
    pub distance: usize,
    pub source: Arc<str>,
    /// `source` was built from the text matched by `begin`
    pub from_backreferences: bool,
}

/// Everything that decides the candidates valid at some point of the tokenization.
///
/// Two paths that compare equal always resolve to the same context.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ContextPath {
    /// The grammar tokenization started with, what `$base` points to
    pub base: GrammarId,
    pub content: ContentRef,
    /// The `end` of the innermost frame, if it's a begin/end span
    pub end: Option<FrameEnd>,
    /// Try `end` after the content patterns rather than before (`applyEndPatternLast`)
    pub end_last: bool,
    /// The `end` of the enclosing spans, innermost first
    pub outer_ends: Vec<FrameEnd>,
}

impl ContextPath {
    pub fn root(grammar: GrammarId) -> Self {
        Self {
            base: grammar,
            content: ContentRef::Root(grammar),
            end: None,
            end_last: false,
            outer_ends: Vec::new(),
        }
    }

    /// Paths holding ends built from begin captures only apply to the span that captured that
    /// text and are not worth caching.
    pub fn is_shareable(&self) -> bool {
        !self
            .end
            .iter()
            .chain(&self.outer_ends)
            .any(|e| e.from_backreferences)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Candidate {
    /// A match rule or the begin of a span
    Rule(GlobalRuleRef),
    /// Closes the frame that many frames below the innermost one, along with every frame above it
    End { distance: usize },
}

/// The ordered, include-free list of candidates for a context along with the regex source of
/// each of them.
///
/// This is plain data: the native pattern group is built from `sources` by whoever searches it.
#[derive(Clone)]
pub struct CompiledContext {
    pub(crate) id: ContextId,
    pub candidates: Vec<Candidate>,
    pub sources: Vec<Arc<str>>,
    /// Whether any source uses `\A` or `\G`
    pub(crate) has_anchors: bool,
}

impl CompiledContext {
    pub(crate) fn new(id: ContextId, entries: Vec<(Candidate, Arc<str>)>) -> Self {
        let (candidates, sources): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        let has_anchors = sources
            .iter()
            .any(|s: &Arc<str>| s.contains("\\A") || s.contains("\\G"));
        Self {
            id,
            candidates,
            sources,
            has_anchors,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Compiles all the sources as a single group, with `\A` and `\G` left as is.
    pub fn pattern_group(&self) -> OcraResult<PatternGroup> {
        PatternGroup::compile(&self.sources)
    }
}

impl fmt::Debug for CompiledContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CompiledContext #{}:", self.id.0)?;
        for (candidate, source) in self.candidates.iter().zip(&self.sources) {
            match candidate {
                Candidate::Rule(r) => writeln!(
                    f,
                    "  grammar={} rule={}: {source}",
                    r.grammar.0,
                    r.rule.as_index()
                )?,
                Candidate::End { distance } => {
                    writeln!(f, "  end, {distance} frames down: {source}")?
                }
            }
        }
        Ok(())
    }
}

/// Contexts already resolved, shared by every tokenizer of a registry.
///
/// Entries are never modified once inserted. Two threads resolving the same path at the same
/// time may both compute it but only one version is kept.
#[derive(Default)]
pub(crate) struct ContextCache {
    contexts: papaya::HashMap<ContextPath, Arc<CompiledContext>>,
    next_id: AtomicU32,
}

impl ContextCache {
    pub(crate) fn get_or_compile(
        &self,
        path: &ContextPath,
        compile: impl FnOnce(ContextId) -> CompiledContext,
    ) -> Arc<CompiledContext> {
        let contexts = self.contexts.pin();
        if let Some(context) = contexts.get(path) {
            return context.clone();
        }

        let id = self.next_id();
        contexts
            .get_or_insert_with(path.clone(), || Arc::new(compile(id)))
            .clone()
    }

    /// An id no other context of this registry has, cached or not
    pub(crate) fn next_id(&self) -> ContextId {
        ContextId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn len(&self) -> usize {
        self.contexts.pin().len()
    }

    pub(crate) fn clear(&self) {
        self.contexts.pin().clear();
    }
}

impl fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextCache({} contexts)", self.len())
    }
}
