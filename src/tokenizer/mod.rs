//! This file follows the logic of <https://github.com/microsoft/vscode-textmate>, with a
//! persistent state stack and the `end` of outer spans being searched as well.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::grammars::{
    Candidate, CaptureId, CompiledContext, ContentRef, ContextId, ContextPath, FrameEnd,
    GlobalRuleRef, GrammarId, IndexedText, MatchResult, Pattern, PatternGroup, Rule, SpanRule,
    resolve_backreferences,
};
use crate::options::TokenizerOptions;
use crate::registry::{Registry, normalize_string};
use crate::scope::Scope;
use crate::tokenizer::anchors::AnchorMode;
use crate::tokenizer::stack::FrameKind;

pub use crate::tokenizer::stack::StateStack;

mod anchors;
mod stack;

/// How many captures with patterns can be nested in each other
const MAX_CAPTURE_NESTING: usize = 32;

/// How many native pattern groups, and separately how many single patterns, a session keeps
/// before dropping them all. Ends built from begin captures give a new context to every span
/// using them.
const MAX_SESSION_PATTERNS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Char span within the line (start inclusive, end exclusive, 0-based)
    pub span: Range<usize>,
    /// Hierarchical scope names, ordered from outermost to innermost
    /// (e.g., source.js -> string.quoted.double -> punctuation.definition.string).
    pub scopes: Vec<Scope>,
}

/// The result of tokenizing a single line
#[derive(Debug, Clone)]
pub struct LineTokens {
    /// Contiguous tokens covering the whole line. Empty for an empty line.
    pub tokens: Vec<Token>,
    /// The state to tokenize the next line with
    pub state: StateStack,
}

/// Small wrapper so we make we only produce valid tokens.
#[derive(Debug, Clone, Default)]
struct TokenAccumulator {
    tokens: Vec<Token>,
    /// Position up to which tokens have been generated
    /// (start of next token to be produced)
    last_end_pos: usize,
}

impl TokenAccumulator {
    fn starting_at(pos: usize) -> Self {
        Self {
            tokens: Vec::new(),
            last_end_pos: pos,
        }
    }

    fn produce(&mut self, end_pos: usize, scopes: &[Scope]) {
        // Skip empty tokens (can happen with zero-width matches)
        if self.last_end_pos >= end_pos {
            return;
        }

        #[cfg(feature = "debug")]
        log::debug!(
            "[produce]: [{}..{end_pos}]\n{}",
            self.last_end_pos,
            scopes
                .iter()
                .map(|s| format!(" * {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        self.tokens.push(Token {
            span: self.last_end_pos..end_pos,
            scopes: scopes.to_vec(),
        });

        self.last_end_pos = end_pos;
    }

    /// Lines are scanned with a newline added at the end: drop the token for it if there is
    /// one and clip the last token to the line.
    fn finalize(&mut self, line_len: usize) {
        self.tokens.retain(|t| t.span.start < line_len);
        if let Some(t) = self.tokens.last_mut()
            && t.span.end > line_len
        {
            t.span.end = line_len;
        }
    }
}

/// A native pattern group built from a context by a session
#[derive(Debug)]
struct SessionGroup {
    group: PatternGroup,
    /// For each pattern of the group, its index in the context candidates.
    /// Patterns that don't compile are not in the group.
    candidates: Vec<usize>,
}

impl SessionGroup {
    fn build(context: &CompiledContext, anchors: AnchorMode) -> Self {
        let sources: Vec<_> = context
            .sources
            .iter()
            .map(|s| anchors.replace_anchors(s))
            .collect();

        match PatternGroup::compile(&sources) {
            Ok(group) => Self {
                group,
                candidates: (0..sources.len()).collect(),
            },
            Err(err) => {
                // Only back-references filled in at runtime can get us there
                log::warn!("{err}, the pattern will never match");
                let (candidates, valid): (Vec<usize>, Vec<&str>) = sources
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| Pattern::compile(s).is_ok())
                    .map(|(i, s)| (i, &**s))
                    .unzip();
                Self {
                    group: PatternGroup::compile(&valid).unwrap_or_else(|_| PatternGroup::empty()),
                    candidates,
                }
            }
        }
    }

    fn search(&self, text: &IndexedText, pos: usize) -> Option<(usize, MatchResult)> {
        let (index, m) = self.group.search_indexed(text, pos)?;
        Some((*self.candidates.get(index)?, m))
    }
}

/// Where we are in the line being scanned
#[derive(Debug)]
struct LineScan {
    pos: usize,
    /// Where `\G` can match
    anchor: Option<usize>,
    is_first_line: bool,
    /// The last begin/end match didn't move forward
    stalled: bool,
    /// The anchor before each frame opened on this line was pushed, by frame depth
    anchors_before: Vec<(usize, Option<usize>)>,
    /// Candidates applied so far
    steps: usize,
}

impl LineScan {
    /// Moves after a begin or end match. A span can be entered or exited without advancing
    /// once, the second time in a row we move forward by one char.
    fn advance(&mut self, end: usize) {
        if end > self.pos {
            self.pos = end;
            self.stalled = false;
            self.is_first_line = false;
        } else if self.stalled {
            self.pos += 1;
            self.stalled = false;
            self.is_first_line = false;
        } else {
            self.stalled = true;
        }
    }

    /// Moves after a match rule, always by at least one char
    fn advance_past_match(&mut self, end: usize) {
        self.pos = if end > self.pos { end } else { self.pos + 1 };
        self.stalled = false;
        self.is_first_line = false;
    }

    /// Frames at `depth` and above were closed: go back to the anchor we had before they opened.
    /// Frames opened on a previous line don't have an anchor anymore.
    fn restore_anchor(&mut self, depth: usize) {
        self.anchor = None;
        while let Some(&(d, anchor)) = self.anchors_before.last()
            && d >= depth
        {
            self.anchors_before.pop();
            if d == depth {
                self.anchor = anchor;
            }
        }
    }
}

fn content_scopes<'a>(stack: &'a StateStack, root_scopes: &'a [Scope]) -> &'a [Scope] {
    stack
        .top()
        .map(|f| f.content_scopes.as_slice())
        .unwrap_or(root_scopes)
}

/// A tokenization session for one grammar.
///
/// It only borrows the registry: several tokenizers can run at the same time on different
/// threads with the same registry. A tokenizer keeps the native regexes it compiles so it's
/// better to reuse it for all the lines of a document.
#[derive(Debug)]
pub struct Tokenizer<'r> {
    registry: &'r Registry,
    /// The grammar we started with, what `$base` points to
    base_grammar_id: GrammarId,
    /// Scopes of anything outside of a span: only the grammar scope
    root_scopes: Vec<Scope>,
    options: TokenizerOptions,
    root_context: Arc<CompiledContext>,
    groups: HashMap<(ContextId, AnchorMode), SessionGroup>,
    /// `while` patterns, keyed by their source after anchors were replaced.
    /// `None` if it doesn't compile.
    single_patterns: HashMap<String, Option<Pattern>>,
    capture_nesting: usize,
}

impl<'r> Tokenizer<'r> {
    pub(crate) fn new(
        registry: &'r Registry,
        base_grammar_id: GrammarId,
        options: TokenizerOptions,
    ) -> Self {
        let root_scopes = registry
            .grammar(base_grammar_id)
            .map(|g| vec![g.scope.clone()])
            .unwrap_or_default();
        let root_context = registry.resolve_context(&ContextPath::root(base_grammar_id));

        Self {
            registry,
            base_grammar_id,
            root_scopes,
            options,
            root_context,
            groups: HashMap::new(),
            single_patterns: HashMap::new(),
            capture_nesting: 0,
        }
    }

    pub fn grammar_id(&self) -> GrammarId {
        self.base_grammar_id
    }

    /// Tokenizes one line, without its line terminator, starting from the state returned for
    /// the previous line or `StateStack::new()` for the first one.
    ///
    /// This never fails: if something is wrong with the state, the rest of the line gets
    /// the grammar scope only.
    pub fn tokenize_line(&mut self, line: &str, state: &StateStack) -> LineTokens {
        let line_len = line.chars().count();

        if let Some(max) = self.options.max_line_length
            && line_len > max
        {
            let scopes = content_scopes(state, &self.root_scopes).to_vec();
            return LineTokens {
                tokens: vec![Token {
                    span: 0..line_len,
                    scopes,
                }],
                state: state.clone().started(),
            };
        }

        // Always add a new line, some regex expect it
        let line_with_newline = format!("{line}\n");
        let text = IndexedText::new(&line_with_newline);
        let mut acc = TokenAccumulator::default();
        let stack = self.scan_line(
            &text,
            state.clone(),
            0,
            state.is_first_line(),
            true,
            &mut acc,
        );
        acc.finalize(line_len);

        LineTokens {
            tokens: acc.tokens,
            state: stack.started(),
        }
    }

    /// Tokenizes a whole document, one `Vec<Token>` per line.
    /// `\r\n` and `\r` line endings are handled as `\n`.
    pub fn tokenize_text(&mut self, text: &str) -> Vec<Vec<Token>> {
        if text.is_empty() {
            return Vec::new();
        }

        let text = normalize_string(text);
        let mut state = StateStack::new();
        let mut lines_tokens = Vec::new();

        for line in text.split('\n') {
            let LineTokens { tokens, state: next } = self.tokenize_line(line, &state);
            lines_tokens.push(tokens);
            state = next;
        }

        lines_tokens
    }

    fn context_of(&self, stack: &StateStack) -> Arc<CompiledContext> {
        stack
            .top()
            .map(|f| f.context.clone())
            .unwrap_or_else(|| self.root_context.clone())
    }

    fn search(
        &mut self,
        context: &CompiledContext,
        anchors: AnchorMode,
        text: &IndexedText,
        pos: usize,
    ) -> Option<(usize, MatchResult)> {
        // No need to build several variants if nothing uses anchors
        let anchors = if context.has_anchors {
            anchors
        } else {
            AnchorMode::ALL
        };

        let key = (context.id(), anchors);
        if self.groups.len() >= MAX_SESSION_PATTERNS && !self.groups.contains_key(&key) {
            #[cfg(feature = "debug")]
            log::debug!("[search] dropping {} pattern groups", self.groups.len());
            self.groups.clear();
        }

        self.groups
            .entry(key)
            .or_insert_with(|| SessionGroup::build(context, anchors))
            .search(text, pos)
    }

    /// Matches a single pattern exactly at `pos`
    fn match_single(
        &mut self,
        source: &str,
        anchors: AnchorMode,
        text: &IndexedText,
        pos: usize,
    ) -> Option<MatchResult> {
        let source = anchors.replace_anchors(source);
        if !self.single_patterns.contains_key(&*source) {
            if self.single_patterns.len() >= MAX_SESSION_PATTERNS {
                self.single_patterns.clear();
            }
            let pattern = match Pattern::compile(&source) {
                Ok(p) => Some(p),
                Err(err) => {
                    log::warn!("{err}, the pattern will never match");
                    None
                }
            };
            self.single_patterns.insert(source.to_string(), pattern);
        }

        self.single_patterns
            .get(&*source)?
            .as_ref()?
            .match_at_indexed(text, pos)
    }

    /// The while patterns are checked at the start of each line, from the outermost span to
    /// the innermost. The first one failing closes its span and everything inside it.
    fn check_while_conditions(
        &mut self,
        stack: StateStack,
        text: &IndexedText,
        scan: &mut LineScan,
        acc: &mut TokenAccumulator,
    ) -> StateStack {
        let mut frames: Vec<_> = stack.frames().cloned().collect();
        if !frames
            .iter()
            .any(|f| matches!(f.kind, FrameKind::While { .. }))
        {
            return stack;
        }
        frames.reverse();

        let registry = self.registry;
        for frame in frames {
            let FrameKind::While { rule, source } = &frame.kind else {
                continue;
            };
            let anchors = AnchorMode::new(scan.is_first_line, scan.anchor, scan.pos);
            let Some(m) = self.match_single(source, anchors, text, scan.pos) else {
                #[cfg(feature = "debug")]
                log::debug!(
                    "[check_while_conditions] `{source}` didn't match, closing frame {}",
                    frame.depth
                );
                return stack.with_top(frame.parent.clone());
            };

            acc.produce(m.start, &frame.content_scopes);
            if let Some(span) = registry
                .grammar(rule.grammar)
                .and_then(|g| g.span_rule(rule.rule))
            {
                self.resolve_captures(
                    &stack.with_top(Some(frame.clone())),
                    &frame.content_scopes,
                    rule.grammar,
                    span.close_captures(),
                    &m,
                    text,
                    scan.is_first_line,
                    acc,
                );
            }
            acc.produce(m.end, &frame.content_scopes);

            if m.end > scan.pos {
                scan.pos = m.end;
                scan.anchor = Some(scan.pos);
                scan.is_first_line = false;
            }
        }

        stack
    }

    fn scan_line(
        &mut self,
        text: &IndexedText,
        stack: StateStack,
        start: usize,
        is_first_line: bool,
        check_while_conditions: bool,
        acc: &mut TokenAccumulator,
    ) -> StateStack {
        let captured_eol = stack.top().is_some_and(|f| f.captured_eol);
        let mut scan = LineScan {
            pos: start,
            anchor: (check_while_conditions && captured_eol).then_some(0),
            is_first_line,
            stalled: false,
            anchors_before: Vec::new(),
            steps: 0,
        };
        let mut stack = stack;

        if check_while_conditions {
            stack = self.check_while_conditions(stack, text, &mut scan, acc);
        }
        // Every step moves forward or stalls, and two stalls never follow each other
        let max_steps = 2 * text.len().saturating_sub(scan.pos);

        loop {
            #[cfg(feature = "debug")]
            log::trace!(
                "[scan_line] Scanning {}: |{:?}|",
                scan.pos,
                text.slice(scan.pos, text.len())
            );

            let context = self.context_of(&stack);
            let anchors = AnchorMode::new(scan.is_first_line, scan.anchor, scan.pos);
            let Some((candidate_index, m)) = self.search(&context, anchors, text, scan.pos) else {
                acc.produce(text.len(), content_scopes(&stack, &self.root_scopes));
                break;
            };

            #[cfg(feature = "debug")]
            log::debug!(
                "[scan_line] Matched candidate {candidate_index} from {} to {} => {:?}",
                m.start,
                m.end,
                text.slice(m.start, m.end)
            );

            scan.steps += 1;
            debug_assert!(
                scan.steps <= max_steps,
                "{} steps on {} chars",
                scan.steps,
                text.len()
            );

            let applied = match context.candidates.get(candidate_index) {
                Some(Candidate::End { distance }) => {
                    self.close_span(*distance, &m, text, &mut stack, &mut scan, acc)
                }
                Some(Candidate::Rule(rule_ref)) => {
                    self.apply_rule(*rule_ref, &m, text, &mut stack, &mut scan, acc)
                }
                None => None,
            };

            if applied.is_none() {
                log::warn!(
                    "inconsistent tokenizer state at {}, the rest of the line is left unscoped",
                    scan.pos
                );
                acc.produce(text.len(), &self.root_scopes);
                break;
            }
        }

        stack
    }

    /// An `end` matched: closes the frame `distance` frames below the innermost one and every
    /// frame inside it.
    fn close_span(
        &mut self,
        distance: usize,
        m: &MatchResult,
        text: &IndexedText,
        stack: &mut StateStack,
        scan: &mut LineScan,
        acc: &mut TokenAccumulator,
    ) -> Option<()> {
        let registry = self.registry;
        let target = stack.frames().nth(distance)?.clone();
        let FrameKind::End { rule, .. } = &target.kind else {
            return None;
        };
        let span = registry.grammar(rule.grammar)?.span_rule(rule.rule)?;

        #[cfg(feature = "debug")]
        log::debug!(
            "[close_span] closing frame {} from depth {}",
            target.depth,
            stack.depth()
        );

        acc.produce(m.start, content_scopes(stack, &self.root_scopes));
        self.resolve_captures(
            &stack.with_top(Some(target.clone())),
            &target.name_scopes,
            rule.grammar,
            span.close_captures(),
            m,
            text,
            scan.is_first_line,
            acc,
        );
        acc.produce(m.end, &target.name_scopes);

        *stack = stack.with_top(target.parent.clone());
        scan.restore_anchor(target.depth);
        scan.advance(m.end);
        Some(())
    }

    /// A match rule or the begin of a span matched
    fn apply_rule(
        &mut self,
        rule_ref: GlobalRuleRef,
        m: &MatchResult,
        text: &IndexedText,
        stack: &mut StateStack,
        scan: &mut LineScan,
        acc: &mut TokenAccumulator,
    ) -> Option<()> {
        let registry = self.registry;
        let grammar = registry.grammar(rule_ref.grammar)?;
        let rule = grammar.rule(rule_ref.rule)?;

        let outer_scopes = content_scopes(stack, &self.root_scopes).to_vec();
        acc.produce(m.start, &outer_scopes);

        match rule {
            Rule::Match(r) => {
                let mut scopes = outer_scopes;
                scopes.extend(r.scopes.iter().cloned());
                self.resolve_captures(
                    stack,
                    &scopes,
                    rule_ref.grammar,
                    &r.captures,
                    m,
                    text,
                    scan.is_first_line,
                    acc,
                );
                acc.produce(m.end, &scopes);
                scan.advance_past_match(m.end);
            }
            Rule::Span(span) => {
                let mut name_scopes = outer_scopes;
                name_scopes.extend(span.scopes.iter().cloned());
                self.resolve_captures(
                    stack,
                    &name_scopes,
                    rule_ref.grammar,
                    &span.begin_captures,
                    m,
                    text,
                    scan.is_first_line,
                    acc,
                );
                acc.produce(m.end, &name_scopes);

                let mut content = name_scopes.clone();
                content.extend(span.content_scopes.iter().cloned());

                let close = grammar.regex(span.close_pattern());
                let from_backreferences = span.close_has_backrefs;
                let source: Arc<str> = if from_backreferences {
                    let captured: Vec<Option<String>> = (0..m.capture_pos.len())
                        .map(|i| m.capture(i).map(|r| text.slice(r.start, r.end).to_owned()))
                        .collect();
                    Arc::from(resolve_backreferences(close, &captured))
                } else {
                    close.clone()
                };

                let depth = stack.depth().checked_add(1)?;
                let path =
                    self.span_context_path(rule_ref, span, &source, from_backreferences, stack);
                let context = registry.resolve_context(&path);
                let ends = path.end.into_iter().chain(path.outer_ends).collect();
                let kind = if span.is_while() {
                    FrameKind::While {
                        rule: rule_ref,
                        source,
                    }
                } else {
                    FrameKind::End {
                        rule: rule_ref,
                        source,
                    }
                };

                #[cfg(feature = "debug")]
                log::debug!("[apply_rule] Pushing frame {depth}:\n{context:?}");

                *stack = stack.push(
                    kind,
                    name_scopes,
                    content,
                    m.end == text.len(),
                    context,
                    ends,
                );
                scan.anchors_before.push((depth, scan.anchor));
                scan.anchor = Some(m.end);
                scan.advance(m.end);
            }
        }

        Some(())
    }

    /// The candidates of a span: its `end` (while patterns are only checked at line start),
    /// its patterns and the `end` of the enclosing spans.
    ///
    /// Outer ends come from the parent frame, one frame further away. An end with the same
    /// pattern as one before it in the list can never win a search and is left out, so nesting
    /// the same span again and again keeps resolving to the same path.
    fn span_context_path(
        &self,
        rule_ref: GlobalRuleRef,
        span: &SpanRule,
        close_source: &Arc<str>,
        from_backreferences: bool,
        parent: &StateStack,
    ) -> ContextPath {
        let end = (!span.is_while()).then(|| FrameEnd {
            distance: 0,
            source: close_source.clone(),
            from_backreferences,
        });

        let mut outer_ends: Vec<FrameEnd> = Vec::new();
        if self.options.close_outer_spans
            && let Some(parent) = parent.top()
        {
            for outer in &parent.ends {
                let shadowed = end.iter().chain(&outer_ends).any(|e| e.source == outer.source);
                if !shadowed {
                    outer_ends.push(FrameEnd {
                        distance: outer.distance + 1,
                        ..outer.clone()
                    });
                }
            }
        }

        ContextPath {
            base: self.base_grammar_id,
            content: ContentRef::Span(rule_ref),
            end,
            end_last: span.apply_end_last(),
            outer_ends,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_captures(
        &mut self,
        stack: &StateStack,
        base_scopes: &[Scope],
        grammar_id: GrammarId,
        rule_captures: &[Option<CaptureId>],
        m: &MatchResult,
        text: &IndexedText,
        is_first_line: bool,
        accumulator: &mut TokenAccumulator,
    ) {
        if rule_captures.is_empty() {
            return;
        }
        let registry = self.registry;
        let Some(grammar) = registry.grammar(grammar_id) else {
            return;
        };

        // (scopes, end_pos)[]
        let mut local_stack: Vec<(Vec<Scope>, usize)> = Vec::with_capacity(2);

        for (i, capture_id) in rule_captures.iter().enumerate() {
            let Some(capture_id) = *capture_id else {
                continue;
            };
            let Some(range) = m.capture(i) else {
                continue;
            };
            // Nothing captured
            if range.is_empty() {
                continue;
            }
            let Some(capture) = grammar.capture(capture_id) else {
                continue;
            };

            // pop captures while needed
            while let Some((scopes, end_pos)) = local_stack.last()
                && *end_pos <= range.start
            {
                accumulator.produce(*end_pos, scopes);
                local_stack.pop();
            }

            let outer = local_stack
                .last()
                .map(|(s, _)| s.as_slice())
                .unwrap_or(base_scopes);
            accumulator.produce(range.start, outer);
            let mut scopes = outer.to_vec();
            scopes.extend(capture.scopes.iter().cloned());

            if capture.patterns.is_some() && self.capture_nesting < MAX_CAPTURE_NESTING {
                self.tokenize_capture(
                    stack,
                    scopes,
                    grammar_id,
                    capture_id,
                    range,
                    text,
                    is_first_line,
                    accumulator,
                );
                continue;
            }

            local_stack.push((scopes, range.end));
        }

        while let Some((scopes, end_pos)) = local_stack.pop() {
            accumulator.produce(end_pos, &scopes);
        }
    }

    /// Tokenizes the text of a capture with the capture patterns. The line is cut at the end
    /// of the capture so nothing can match past it.
    #[allow(clippy::too_many_arguments)]
    fn tokenize_capture(
        &mut self,
        stack: &StateStack,
        scopes: Vec<Scope>,
        grammar_id: GrammarId,
        capture_id: CaptureId,
        range: Range<usize>,
        text: &IndexedText,
        is_first_line: bool,
        accumulator: &mut TokenAccumulator,
    ) {
        let path = ContextPath {
            base: self.base_grammar_id,
            content: ContentRef::Capture {
                grammar: grammar_id,
                capture: capture_id,
            },
            end: None,
            end_last: false,
            outer_ends: Vec::new(),
        };
        let context = self.registry.resolve_context(&path);
        let capture_stack = stack.push(
            FrameKind::Capture,
            scopes.clone(),
            scopes,
            false,
            context,
            Vec::new(),
        );

        #[cfg(feature = "debug")]
        log::debug!(
            "[tokenize_capture] Retokenizing capture at [{}..{}]: {:?}",
            range.start,
            range.end,
            text.slice(range.start, range.end)
        );

        let prefix = IndexedText::new(text.slice(0, range.end));
        let mut capture_acc = TokenAccumulator::starting_at(range.start);
        self.capture_nesting += 1;
        self.scan_line(
            &prefix,
            capture_stack,
            range.start,
            is_first_line && range.start == 0,
            false,
            &mut capture_acc,
        );
        self.capture_nesting -= 1;

        for token in capture_acc.tokens {
            accumulator.produce(token.span.end, &token.scopes);
        }
    }
}
