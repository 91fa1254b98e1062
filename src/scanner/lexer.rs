//! Lexer for job script templates using logos

use logos::{Lexer, Logos};

/// Byte range in template text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Lexeme {
    // Sentinel followed by a braced name; the callback reads the name and the
    // closing brace, and fails the token when either is missing
    #[token("$${", placeholder)]
    Placeholder(String),

    // Dollar signs that do not open a placeholder (order matters - `$$` must
    // be accepted on its own so `$$x` is not an error)
    #[token("$$")]
    DoubleDollar,
    #[token("$")]
    Dollar,

    // Everything else is literal text
    #[regex(r"[^$]+")]
    Text,
}

/// Length in bytes of the identifier at the start of `s` (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn identifier_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return 0,
    }
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count()
}

fn placeholder(lex: &mut Lexer<Lexeme>) -> Option<String> {
    let rest = lex.remainder();
    let len = identifier_len(rest);
    if len == 0 || rest.as_bytes().get(len) != Some(&b'}') {
        return None;
    }
    let name = rest[..len].to_string();
    lex.bump(len + 1);
    Some(name)
}

/// Lex template text into lexemes with spans; malformed placeholders come
/// back as `Err(())` spanning their `$${` sentinel
pub fn lex(input: &str) -> impl Iterator<Item = (Result<Lexeme, ()>, Span)> + '_ {
    Lexeme::lexer(input).spanned()
}
