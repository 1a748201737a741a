/// Options for a tokenization session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TokenizerOptions {
    pub(crate) close_outer_spans: bool,
    pub(crate) max_line_length: Option<usize>,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            close_outer_spans: true,
            max_line_length: None,
        }
    }
}

impl TokenizerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `end` of every open span is searched, not only the innermost one.
    ///
    /// When an outer `end` matches, all the spans inside it are closed along with it.
    /// Turning it off gives the vscode-textmate behaviour where only the innermost span
    /// can close.
    pub fn close_outer_spans(mut self, value: bool) -> Self {
        self.close_outer_spans = value;
        self
    }

    /// Lines with more chars than that are not scanned at all: they get a single token with
    /// the current scopes and leave the open spans as they were.
    pub fn max_line_length(mut self, value: Option<usize>) -> Self {
        self.max_line_length = value;
        self
    }
}
