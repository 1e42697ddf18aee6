use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use markup::ParseError;

/// A failure that aborts a whole load.
///
/// Unresolvable blocks are not errors: the loader replaces them with
/// placeholders and records them in the load report instead.
#[derive(Debug)]
pub enum LoadError {
    /// The text is not well-formed markup.
    Parse(ParseError),
    /// The outermost element is not `project`.
    UnexpectedRoot { found: String, span: Range<usize> },
    /// The document was written by a newer format version.
    UnsupportedVersion {
        found: String,
        supported: u32,
        span: Range<usize>,
    },
    /// A required element is absent.
    MissingElement {
        tag: String,
        parent: String,
        span: Range<usize>,
    },
    /// A `ref` names an id that has not been defined yet.
    UnresolvedReference { id: String, span: Range<usize> },
}

impl LoadError {
    pub fn span(&self) -> Range<usize> {
        match self {
            LoadError::Parse(err) => err.span.clone(),
            LoadError::UnexpectedRoot { span, .. }
            | LoadError::UnsupportedVersion { span, .. }
            | LoadError::MissingElement { span, .. }
            | LoadError::UnresolvedReference { span, .. } => span.clone(),
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        match self {
            LoadError::Parse(err) => err.to_diagnostic(),
            LoadError::UnsupportedVersion { supported, .. } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![Label::primary(file_id, self.span())])
                .with_notes(vec![format!(
                    "this engine reads format versions up to {}",
                    supported
                )]),
            LoadError::UnresolvedReference { .. } => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![Label::primary(file_id, self.span())])
                .with_notes(vec![
                    "objects must be defined before they are referenced".to_string(),
                ]),
            _ => Diagnostic::error()
                .with_message(self.to_string())
                .with_labels(vec![Label::primary(file_id, self.span())]),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Parse(err) => write!(f, "malformed document: {}", err),
            LoadError::UnexpectedRoot { found, .. } => {
                write!(f, "expected a <project> document, found <{}>", found)
            }
            LoadError::UnsupportedVersion { found, supported, .. } => write!(
                f,
                "document format version {} is newer than supported version {}",
                found, supported
            ),
            LoadError::MissingElement { tag, parent, .. } => {
                write!(f, "missing required <{}> in <{}>", tag, parent)
            }
            LoadError::UnresolvedReference { id, .. } if id.is_empty() => {
                write!(f, "reference without an id")
            }
            LoadError::UnresolvedReference { id, .. } => {
                write!(f, "unresolved reference to object id {}", id)
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for LoadError {
    fn from(err: ParseError) -> Self {
        LoadError::Parse(err)
    }
}
