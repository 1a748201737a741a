use std::fmt;
use std::sync::Arc;

use crate::grammars::{CompiledContext, FrameEnd, GlobalRuleRef};
use crate::scope::Scope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// Opened by a begin/end rule. `source` is the end pattern with back-references filled in.
    End {
        rule: GlobalRuleRef,
        source: Arc<str>,
    },
    /// Opened by a begin/while rule. `source` is the while pattern with back-references filled in.
    While {
        rule: GlobalRuleRef,
        source: Arc<str>,
    },
    /// Only lives while the text of a capture is tokenized with the capture patterns
    Capture,
}

pub(crate) struct Frame {
    pub(crate) parent: Option<Arc<Frame>>,
    /// 1 for the outermost frame
    pub(crate) depth: usize,
    pub(crate) kind: FrameKind,
    /// "name" scopes, from the grammar scope down to this frame: applied to begin/end
    pub(crate) name_scopes: Vec<Scope>,
    /// "name" + "contentName" scopes: applied to everything between begin and end
    pub(crate) content_scopes: Vec<Scope>,
    /// The begin match ran until the end of its line, including the newline.
    /// `\G` can then match at the start of the next line.
    pub(crate) captured_eol: bool,
    /// Candidates to search while this frame is the innermost one
    pub(crate) context: Arc<CompiledContext>,
    /// Every end searched in `context`, with distances relative to this frame
    pub(crate) ends: Vec<FrameEnd>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth
            && self.kind == other.kind
            && self.captured_eol == other.captured_eol
            && self.context.id() == other.context.id()
            && self.name_scopes == other.name_scopes
            && self.content_scopes == other.content_scopes
            && same_frames(&self.parent, &other.parent)
    }
}

fn same_frames(a: &Option<Arc<Frame>>, b: &Option<Arc<Frame>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b) || **a == **b,
        _ => false,
    }
}

/// The spans still open at the end of a line.
///
/// This is a persistent stack: frames are shared between all the states derived from each
/// other so cloning a state is O(1) and saving the state of every line of a document is cheap.
/// Tokenizing a line that doesn't open or close anything returns a state sharing all its
/// frames with the input one.
#[derive(Clone, Default)]
pub struct StateStack {
    top: Option<Arc<Frame>>,
    /// At least one line was tokenized, so `\A` can't match anymore
    started: bool,
}

impl StateStack {
    /// The state to tokenize the first line of a document with
    pub fn new() -> Self {
        Self::default()
    }

    /// How many spans are open
    pub fn depth(&self) -> usize {
        self.top.as_ref().map(|f| f.depth).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    /// Scopes applied to the content of the innermost open span, starting with the grammar scope.
    /// Empty if no span is open.
    pub fn content_scopes(&self) -> &[Scope] {
        self.top
            .as_ref()
            .map(|f| f.content_scopes.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn is_first_line(&self) -> bool {
        !self.started
    }

    pub(crate) fn started(self) -> Self {
        Self {
            top: self.top,
            started: true,
        }
    }

    pub(crate) fn top(&self) -> Option<&Arc<Frame>> {
        self.top.as_ref()
    }

    /// A state with the same line information but different frames
    pub(crate) fn with_top(&self, top: Option<Arc<Frame>>) -> Self {
        Self {
            top,
            started: self.started,
        }
    }

    pub(crate) fn push(
        &self,
        kind: FrameKind,
        name_scopes: Vec<Scope>,
        content_scopes: Vec<Scope>,
        captured_eol: bool,
        context: Arc<CompiledContext>,
        ends: Vec<FrameEnd>,
    ) -> Self {
        self.with_top(Some(Arc::new(Frame {
            parent: self.top.clone(),
            depth: self.depth().saturating_add(1),
            kind,
            name_scopes,
            content_scopes,
            captured_eol,
            context,
            ends,
        })))
    }

    /// Frames from the innermost to the outermost
    pub(crate) fn frames(&self) -> impl Iterator<Item = &Arc<Frame>> {
        std::iter::successors(self.top.as_ref(), |f| f.parent.as_ref())
    }
}

impl PartialEq for StateStack {
    fn eq(&self, other: &Self) -> bool {
        self.started == other.started && same_frames(&self.top, &other.top)
    }
}

impl fmt::Debug for StateStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StateStack (started={}):", self.started)?;

        let frames: Vec<_> = self.frames().collect();
        for frame in frames.into_iter().rev() {
            let indent = "  ".repeat(frame.depth);
            match &frame.kind {
                FrameKind::End { rule, source } => write!(
                    f,
                    "{indent}grammar={}, rule={}, end=\"{source}\"",
                    rule.grammar.as_index(),
                    rule.rule.as_index()
                )?,
                FrameKind::While { rule, source } => write!(
                    f,
                    "{indent}grammar={}, rule={}, while=\"{source}\"",
                    rule.grammar.as_index(),
                    rule.rule.as_index()
                )?,
                FrameKind::Capture => write!(f, "{indent}capture")?,
            }

            let content: Vec<&str> = frame.content_scopes.iter().map(|s| s.as_str()).collect();
            write!(f, ", content=[{}]", content.join(", "))?;
            if frame.captured_eol {
                write!(f, ", captured_eol")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
