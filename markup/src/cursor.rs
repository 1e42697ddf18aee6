/// Number of characters shown on each side of a position in a snippet.
const SNIPPET_RADIUS: usize = 24;

/// A scan position over raw document text.
///
/// None of the primitives fail: running out of input or not finding a
/// pattern yields an empty (or remainder) result and leaves the caller to
/// decide whether that makes the document malformed.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Cursor { source, pos: 0 }
    }

    /// Byte offset of the cursor within the source.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    /// The character under the cursor, without advancing.
    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn starts_with(&self, pattern: &str) -> bool {
        self.rest().starts_with(pattern)
    }

    /// Advance past `n` characters and return them.
    pub fn consume(&mut self, n: usize) -> &'a str {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .nth(n)
            .map(|(offset, _)| offset)
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    /// Return everything up to (not including) the first occurrence of
    /// `pattern`, leaving the cursor in front of the match. Without a match
    /// the remainder of the input is returned.
    pub fn scan_until(&mut self, pattern: &str) -> &'a str {
        let rest = self.rest();
        let len = rest.find(pattern).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    pub fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    /// The maximal run of characters that are neither whitespace nor one of
    /// `>`, `/`, `=`.
    pub fn scan_word(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '>' | '/' | '='))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    /// A bounded excerpt of the source around byte offset `at`, with line
    /// breaks flattened so it fits on one diagnostic line.
    pub fn snippet(&self, at: usize) -> String {
        let at = floor_boundary(self.source, at.min(self.source.len()));
        let start = self.source[..at]
            .char_indices()
            .rev()
            .nth(SNIPPET_RADIUS - 1)
            .map(|(offset, _)| offset)
            .unwrap_or(0);
        let end = self.source[at..]
            .char_indices()
            .nth(SNIPPET_RADIUS)
            .map(|(offset, _)| at + offset)
            .unwrap_or(self.source.len());
        self.source[start..end]
            .chars()
            .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
            .collect()
    }
}

fn floor_boundary(source: &str, mut at: usize) -> usize {
    while !source.is_char_boundary(at) {
        at -= 1;
    }
    at
}
