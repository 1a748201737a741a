use std::borrow::Cow;

/// Which of `\A` and `\G` can match at the current position.
///
/// `\A` is only possible on the first line of a document and `\G` only where the last
/// begin or while match ended. The patterns of a context are compiled once per combination.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AnchorMode {
    allow_a: bool,
    allow_g: bool,
}

impl AnchorMode {
    /// Both anchors left as is
    pub(crate) const ALL: AnchorMode = AnchorMode {
        allow_a: true,
        allow_g: true,
    };

    pub(crate) fn new(is_first_line: bool, anchor_position: Option<usize>, current_pos: usize) -> Self {
        Self {
            allow_a: is_first_line,
            allow_g: anchor_position == Some(current_pos),
        }
    }

    /// Like vscode-textmate, disabled anchors are replaced with `\x{FFFF}`, which can't be
    /// found in normal text.
    pub(crate) fn replace_anchors<'a>(&self, pattern: &'a str) -> Cow<'a, str> {
        if self.allow_a && self.allow_g {
            return Cow::Borrowed(pattern);
        }

        let mut out: Option<String> = None;
        let mut chars = pattern.char_indices();
        while let Some((i, c)) = chars.next() {
            if c != '\\' {
                if let Some(out) = out.as_mut() {
                    out.push(c);
                }
                continue;
            }

            // escapes come in pairs, `\\A` is a backslash followed by `A`
            let next = chars.next().map(|(_, n)| n);
            let disabled = match next {
                Some('A') => !self.allow_a,
                Some('G') => !self.allow_g,
                _ => false,
            };
            if disabled {
                out.get_or_insert_with(|| pattern[..i].to_string())
                    .push('\u{FFFF}');
            } else if let Some(out) = out.as_mut() {
                out.push('\\');
                out.extend(next);
            }
        }

        match out {
            Some(s) => Cow::Owned(s),
            None => Cow::Borrowed(pattern),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_mode_from_position() {
        assert_eq!(AnchorMode::new(true, Some(3), 3), AnchorMode::ALL);
        let mode = AnchorMode::new(false, Some(3), 4);
        assert!(!mode.allow_a);
        assert!(!mode.allow_g);
        assert!(AnchorMode::new(false, Some(0), 0).allow_g);
        assert!(!AnchorMode::new(true, None, 0).allow_g);
    }

    #[test]
    fn replaces_only_disabled_anchors() {
        let none = AnchorMode::new(false, None, 0);
        assert_eq!(none.replace_anchors(r"\G\s*(\w+)"), "\u{FFFF}\\s*(\\w+)");
        assert_eq!(none.replace_anchors(r"\A#!"), "\u{FFFF}#!");
        assert!(matches!(none.replace_anchors(r"\d+"), Cow::Borrowed(_)));
        // an escaped backslash followed by the letter is not an anchor
        assert_eq!(none.replace_anchors(r"\\G"), r"\\G");

        let only_g = AnchorMode::new(false, Some(2), 2);
        assert_eq!(only_g.replace_anchors(r"\A|\G"), "\u{FFFF}|\\G");

        assert!(matches!(AnchorMode::ALL.replace_anchors(r"\A\G"), Cow::Borrowed(_)));
    }
}
