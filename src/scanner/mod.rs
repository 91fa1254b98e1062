//! Placeholder scanner for job script templates
//!
//! Templates embed placeholders as `$${name}`. The scanner walks the text
//! once, lazily, and yields either the placeholder tokens alone ([`tokens`])
//! or every segment of the text ([`segments`]) for the renderer.

pub mod lexer;

use std::collections::HashSet;

use crate::error::ScanError;
use lexer::{Lexeme, Span};

/// A placeholder occurrence in template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub name: String,
    /// Byte span of the whole `$${name}` including delimiters
    pub span: Span,
}

/// A piece of template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Placeholder(Token),
    /// The `$${` sentinel of a malformed placeholder; the text after it
    /// follows as ordinary segments
    Malformed { text: &'a str, error: ScanError },
}

/// Lazy sequence of template segments
pub struct Segments<'a> {
    source: &'a str,
    lexer: logos::SpannedIter<'a, Lexeme>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (lexeme, span) = self.lexer.next()?;
        Some(match lexeme {
            Ok(Lexeme::Placeholder(name)) => Segment::Placeholder(Token { name, span }),
            Ok(_) => Segment::Text(&self.source[span]),
            Err(()) => Segment::Malformed {
                text: &self.source[span.clone()],
                error: ScanError::malformed(self.source, span.start),
            },
        })
    }
}

/// Lazy sequence of placeholder tokens; malformed sentinels are reported
/// in position
pub struct Tokens<'a> {
    segments: Segments<'a>,
}

impl Iterator for Tokens<'_> {
    type Item = Result<Token, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.segments.next()? {
                Segment::Text(_) => continue,
                Segment::Placeholder(token) => return Some(Ok(token)),
                Segment::Malformed { error, .. } => return Some(Err(error)),
            }
        }
    }
}

/// Split template text into segments
pub fn segments(source: &str) -> Segments<'_> {
    use logos::Logos;
    Segments {
        source,
        lexer: Lexeme::lexer(source).spanned(),
    }
}

/// Iterate the placeholder tokens of template text. Call again to restart.
pub fn tokens(source: &str) -> Tokens<'_> {
    Tokens {
        segments: segments(source),
    }
}

/// Collect all placeholder tokens, failing on the first malformed one
pub fn scan(source: &str) -> Result<Vec<Token>, ScanError> {
    tokens(source).collect()
}

/// Distinct placeholder names in order of first occurrence
pub fn names<'t>(tokens: impl IntoIterator<Item = &'t Token>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|t| seen.insert(t.name.as_str()))
        .map(|t| t.name.clone())
        .collect()
}
