pub mod error;

pub use error::ParseError;

use crate::cursor::Cursor;
use crate::escape::unescape;
use crate::node::{Element, Node};

/// Parser entry point.
pub struct Parser<'a> {
    source: &'a str,
    file_id: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse the whole source into its root element.
    pub fn parse(&self) -> Result<Element, ParseError> {
        let mut state = ParseState {
            cursor: Cursor::new(self.source),
            file_id: self.file_id,
        };
        state.parse_document()
    }
}

/// Parse a document that does not belong to a codespan file database.
pub fn parse(source: &str) -> Result<Element, ParseError> {
    Parser::new(source, 0).parse()
}

/// What `parse_node` found: a tree node, or the closing tag of the element
/// currently being filled.
enum Parsed {
    Node(Node),
    Close,
}

struct ParseState<'a> {
    cursor: Cursor<'a>,
    file_id: usize,
}

impl<'a> ParseState<'a> {
    fn parse_document(&mut self) -> Result<Element, ParseError> {
        self.cursor.skip_whitespace();
        while self.cursor.starts_with("<?") {
            self.cursor.scan_until("?>");
            self.cursor.consume(2);
            self.cursor.skip_whitespace();
        }
        if self.cursor.at_end() {
            return Err(self.error("document has no root element", None));
        }

        let start = self.cursor.position();
        match self.parse_node()? {
            Parsed::Node(Node::Element(root)) => {
                log::trace!("parsed <{}> root", root.name);
                Ok(root)
            }
            Parsed::Node(Node::Text(_)) => Err(self.error_at(
                "expected a root element, found text",
                start,
                None,
            )),
            Parsed::Close => Err(self.error_at("unexpected closing tag", start, None)),
        }
    }

    fn parse_node(&mut self) -> Result<Parsed, ParseError> {
        if self.cursor.peek() != Some('<') {
            let text = self.cursor.scan_until("<");
            return Ok(Parsed::Node(Node::Text(unescape(text))));
        }

        let start = self.cursor.position();
        self.cursor.consume(1);
        if self.cursor.peek() == Some('/') {
            self.cursor.scan_until(">");
            self.cursor.consume(1);
            return Ok(Parsed::Close);
        }

        let name = self.cursor.scan_word();
        if name.is_empty() {
            return Err(self.error_at("expected a tag name after '<'", start, None));
        }
        let mut element = Element::new(name);
        self.cursor.skip_whitespace();

        loop {
            match self.cursor.peek() {
                None => {
                    return Err(self.error("unterminated tag", Some(name)));
                }
                Some('>') | Some('/') => break,
                Some(_) => self.parse_attribute(&mut element)?,
            }
        }

        if self.cursor.peek() == Some('/') {
            self.cursor.consume(1);
            if self.cursor.peek() != Some('>') {
                return Err(self
                    .error("expected '>' after '/' in self-closing tag", Some(name)));
            }
            self.cursor.consume(1);
            element.span = start..self.cursor.position();
            return Ok(Parsed::Node(Node::Element(element)));
        }

        self.cursor.consume(1);
        element.span = start..self.cursor.position();

        loop {
            if self.cursor.at_end() {
                return Err(self
                    .error_at("end of input inside an open element", start, Some(name))
                    .with_note(format!("<{}> is never closed", name)));
            }
            match self.parse_node()? {
                Parsed::Close => break,
                Parsed::Node(child) => element.children.push(child),
            }
        }

        Ok(Parsed::Node(Node::Element(element)))
    }

    fn parse_attribute(&mut self, element: &mut Element) -> Result<(), ParseError> {
        let key = self.cursor.scan_word();
        if key.is_empty() {
            return Err(self.error("expected an attribute name", Some(&element.name)));
        }
        self.cursor.skip_whitespace();
        if self.cursor.peek() != Some('=') {
            return Err(self
                .error(format!("expected '=' after attribute `{}`", key), Some(&element.name)));
        }
        self.cursor.consume(1);
        self.cursor.skip_whitespace();

        let quote = match self.cursor.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                return Err(self.error(
                    format!("expected a single- or double-quoted value for attribute `{}`", key),
                    Some(&element.name),
                ));
            }
        };
        let value_start = self.cursor.position();
        self.cursor.consume(1);
        let value = self.cursor.scan_until(if quote == '"' { "\"" } else { "'" });
        if self.cursor.at_end() {
            return Err(self
                .error_at(
                    format!("unterminated value for attribute `{}`", key),
                    value_start,
                    Some(&element.name),
                )
                .with_note(format!("missing closing {}", quote)));
        }
        self.cursor.consume(1);
        self.cursor.skip_whitespace();

        element.set_attribute(key, unescape(value));
        Ok(())
    }

    fn error(&self, message: impl Into<String>, tag: Option<&str>) -> ParseError {
        self.error_at(message, self.cursor.position(), tag)
    }

    fn error_at(&self, message: impl Into<String>, at: usize, tag: Option<&str>) -> ParseError {
        let end = (at + 1).min(self.cursor.source_len()).max(at);
        let err = ParseError::error(message, at..end, self.file_id)
            .with_snippet(self.cursor.snippet(at));
        match tag {
            Some(tag) => err.in_tag(tag),
            None => err,
        }
    }
}
