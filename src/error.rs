//! Input and error plumbing shared by every parser in the crate.
//!
//! Parsers run over a [`LocatedSpan`] so that any sub-slice of the input
//! still knows its original line and column. Failures come in the two nom
//! tiers: `Err::Error` means "this alternative does not match here" and is
//! free to backtrack, while `Err::Failure` means the construct was
//! recognized but is invalid, aborting the whole parse of the current file.

use nom::error::{ContextError, ErrorKind, FromExternalError, ParseError as NomParseError};
use nom::IResult;
use nom_locate::LocatedSpan;

/// Parser input: a string slice that remembers where in the file it lives.
pub type Input<'a> = LocatedSpan<&'a str>;

/// The result type used by all parsers in this crate.
pub type ParseResult<'a, T> = IResult<Input<'a>, T, SyntaxError<'a>>;

/// An in-flight parse error, pointing into the original input.
///
/// `message` is set for fatal errors carrying their own wording; plain
/// backtracking failures only record the position, the failing `kind` and
/// optionally the label of the construct being attempted.
#[derive(Debug, Clone)]
pub struct SyntaxError<'a> {
    pub at: Input<'a>,
    pub kind: ErrorKind,
    pub label: Option<&'static str>,
    pub message: Option<String>,
}

impl<'a> SyntaxError<'a> {
    fn new(at: Input<'a>, kind: ErrorKind) -> Self {
        SyntaxError {
            at,
            kind,
            label: None,
            message: None,
        }
    }
}

impl<'a> NomParseError<Input<'a>> for SyntaxError<'a> {
    fn from_error_kind(input: Input<'a>, kind: ErrorKind) -> Self {
        SyntaxError::new(input, kind)
    }

    fn append(_input: Input<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    fn or(self, other: Self) -> Self {
        // keep the most informative branch: an explicit message wins,
        // otherwise whichever got furthest into the input
        match (self.message.is_some(), other.message.is_some()) {
            (true, false) => self,
            (false, true) => other,
            _ => {
                if other.at.location_offset() >= self.at.location_offset() {
                    other
                } else {
                    self
                }
            }
        }
    }
}

impl<'a> ContextError<Input<'a>> for SyntaxError<'a> {
    fn add_context(_input: Input<'a>, ctx: &'static str, mut other: Self) -> Self {
        if other.label.is_none() {
            other.label = Some(ctx);
        }
        other
    }
}

impl<'a, E> FromExternalError<Input<'a>, E> for SyntaxError<'a> {
    fn from_external_error(input: Input<'a>, kind: ErrorKind, _e: E) -> Self {
        SyntaxError::new(input, kind)
    }
}

/// Build a fatal error at `at`: the construct was recognized but cannot be
/// completed validly, so no enclosing alternative may reinterpret it.
pub(crate) fn fatal<'a>(at: Input<'a>, message: impl Into<String>) -> nom::Err<SyntaxError<'a>> {
    nom::Err::Failure(SyntaxError {
        at,
        kind: ErrorKind::Fail,
        label: None,
        message: Some(message.into()),
    })
}

/// A finished, user-facing parse error with its file position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{file}:{line}:{column}:\n{message}")]
pub struct ParseError {
    pub file: String,
    pub line: u32,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    /// Convert a nom error into the rendered form, naming `file` as the
    /// source. Backtracking failures get a generic unexpected/expecting
    /// message at the furthest position reached.
    pub(crate) fn from_nom(file: &str, err: nom::Err<SyntaxError<'_>>) -> ParseError {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                let message = match e.message {
                    Some(m) => m,
                    None => {
                        let found = match e.at.fragment().chars().next() {
                            Some('\n') => "newline".to_string(),
                            Some(c) => format!("'{c}'"),
                            None => "end of input".to_string(),
                        };
                        let expected = e.label.unwrap_or_else(|| e.kind.description());
                        format!("unexpected {found}\nexpecting {expected}")
                    }
                };
                ParseError {
                    file: file.to_string(),
                    line: e.at.location_line(),
                    column: e.at.get_utf8_column(),
                    message,
                }
            }
            nom::Err::Incomplete(_) => ParseError {
                file: file.to_string(),
                line: 0,
                column: 0,
                message: "unexpected end of input".to_string(),
            },
        }
    }
}
