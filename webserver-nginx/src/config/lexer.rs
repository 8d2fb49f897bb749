//! Lexer for Nginx configuration
//!
//! Key features:
//! - `;` terminates a directive, `{` / `}` delimit blocks
//! - `#` starts a comment that runs to the end of the line
//! - Quoted strings keep their quotes verbatim so a dump reproduces them
//! - Every token carries its line and column

use logos::{Logos, Span};
use std::fmt;

/// Token types of the Nginx grammar
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    /// Comment text including the leading `#`
    #[regex(r"#[^\n]*", |lex| lex.slice().trim_end().to_string())]
    Comment(String),

    #[token("{")]
    BlockOpen,

    #[token("}")]
    BlockClose,

    #[token(";")]
    Semicolon,

    /// Quoted parameter, quotes kept. Text glued to the closing quote
    /// (`"x")` in an `if` condition) belongs to the same parameter.
    #[regex(r#""([^"\\]|\\.)*"[^ \t\r\n\f{};]*"#, |lex| lex.slice().to_string())]
    #[regex(r#"'([^'\\]|\\.)*'[^ \t\r\n\f{};]*"#, |lex| lex.slice().to_string())]
    Quoted(String),

    /// Bare word: directive names, paths, variables, regexes
    #[regex(r#"[^ \t\r\n\f{};#"'][^ \t\r\n\f{};]*"#, |lex| lex.slice().to_string())]
    Word(String),
}

impl Token {
    /// Text usable as a directive name or parameter
    pub fn text(&self) -> Option<&str> {
        match self {
            Token::Word(s) | Token::Quoted(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Comment(s) | Token::Quoted(s) | Token::Word(s) => write!(f, "{}", s),
            Token::BlockOpen => write!(f, "{{"),
            Token::BlockClose => write!(f, "}}"),
            Token::Semicolon => write!(f, ";"),
        }
    }
}

/// A token with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

/// Lexer error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected character at line {line}, column {column}")]
pub struct LexError {
    pub line: usize,
    pub column: usize,
}

/// Byte offsets of line starts, for offset -> (line, column)
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&start| start <= offset);
        let column = offset - self.starts[line - 1] + 1;
        (line, column)
    }
}

/// Tokenize Nginx source text
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, LexError> {
    let index = LineIndex::new(source);
    let mut tokens = Vec::new();

    for (result, span) in Token::lexer(source).spanned() {
        let (line, column) = index.position(span.start);
        match result {
            Ok(token) => tokens.push(Spanned {
                token,
                span,
                line,
                column,
            }),
            Err(()) => return Err(LexError { line, column }),
        }
    }

    Ok(tokens)
}
