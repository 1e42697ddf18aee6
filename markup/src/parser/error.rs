use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};

/// A malformed-markup error with source location information.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
    pub file_id: usize,
    /// The tag being parsed when the error occurred, if any.
    pub tag: Option<String>,
    /// Input around the failure point.
    pub snippet: String,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn error(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        ParseError {
            message: message.into(),
            span,
            file_id,
            tag: None,
            snippet: String::new(),
            notes: Vec::new(),
        }
    }

    pub fn in_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let mut notes = self.notes.clone();
        if !self.snippet.is_empty() {
            notes.push(format!("near: {}", self.snippet));
        }
        let label = match &self.tag {
            Some(tag) => Label::primary(self.file_id, self.span.clone())
                .with_message(format!("while reading <{}>", tag)),
            None => Label::primary(self.file_id, self.span.clone()),
        };
        Diagnostic::error()
            .with_message(&self.message)
            .with_labels(vec![label])
            .with_notes(notes)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(tag) = &self.tag {
            write!(f, " in <{}>", tag)?;
        }
        if !self.snippet.is_empty() {
            write!(f, " near `{}`", self.snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
