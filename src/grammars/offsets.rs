//! Callers speak in character offsets, Oniguruma in UTF-8 byte offsets.
//! `IndexedText` does the translation both ways for one piece of text.

/// A text along with the byte offset of each of its char boundaries.
#[derive(Debug, Clone)]
pub(crate) struct IndexedText<'a> {
    text: &'a str,
    /// Byte offset of every char plus the end of the text.
    /// Left empty for ASCII text, where chars and bytes are the same thing.
    boundaries: Vec<usize>,
}

impl<'a> IndexedText<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let boundaries = if text.is_ascii() {
            Vec::new()
        } else {
            text.char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()))
                .collect()
        };
        Self { text, boundaries }
    }

    pub(crate) fn as_str(&self) -> &'a str {
        self.text
    }

    /// Length in chars
    pub(crate) fn len(&self) -> usize {
        if self.boundaries.is_empty() {
            self.text.len()
        } else {
            self.boundaries.len() - 1
        }
    }

    /// Byte offset of the char at `char_offset`, `None` if it's past the end of the text.
    /// `len()` itself maps to the byte length.
    pub(crate) fn to_byte(&self, char_offset: usize) -> Option<usize> {
        if self.boundaries.is_empty() {
            (char_offset <= self.text.len()).then_some(char_offset)
        } else {
            self.boundaries.get(char_offset).copied()
        }
    }

    /// Char offset of a byte offset. Oniguruma only reports positions on char boundaries for
    /// valid UTF-8 so a miss can only round up to the next char.
    pub(crate) fn to_char(&self, byte_offset: usize) -> usize {
        if self.boundaries.is_empty() {
            byte_offset
        } else {
            match self.boundaries.binary_search(&byte_offset) {
                Ok(i) | Err(i) => i,
            }
        }
    }

    /// The text between two char offsets
    pub(crate) fn slice(&self, start: usize, end: usize) -> &'a str {
        let len = self.len();
        let start = self.to_byte(start.min(len)).unwrap_or(self.text.len());
        let end = self.to_byte(end.min(len)).unwrap_or(self.text.len());
        &self.text[start..end.max(start)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_are_identity() {
        let text = IndexedText::new("hello");
        assert_eq!(text.len(), 5);
        assert_eq!(text.to_byte(3), Some(3));
        assert_eq!(text.to_byte(5), Some(5));
        assert_eq!(text.to_byte(6), None);
        assert_eq!(text.to_char(4), 4);
    }

    #[test]
    fn multibyte_offsets() {
        // each kana is 3 bytes
        let text = IndexedText::new("こんにちは world");
        assert_eq!(text.len(), 11);
        assert_eq!(text.to_byte(1), Some(3));
        assert_eq!(text.to_byte(5), Some(15));
        assert_eq!(text.to_byte(11), Some(21));
        assert_eq!(text.to_byte(12), None);
        assert_eq!(text.to_char(15), 5);
        assert_eq!(text.to_char(21), 11);
        assert_eq!(text.slice(1, 3), "んに");
        assert_eq!(text.slice(6, 50), "world");
    }

    #[test]
    fn empty_text() {
        let text = IndexedText::new("");
        assert_eq!(text.len(), 0);
        assert_eq!(text.to_byte(0), Some(0));
        assert_eq!(text.slice(0, 1), "");
    }
}
