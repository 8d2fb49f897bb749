//! Nginx configuration parser
//!
//! Recursive descent over the token stream. Comment lines are attached to
//! the directive that follows them; a comment on the line where a directive
//! ends becomes its inline comment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::ast::{Block, Directive};
use crate::config::lexer::{tokenize, LexError, Spanned, Token};

/// Parser error types
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected '{value}' at line {line}, column {column}")]
    UnexpectedToken {
        value: String,
        line: usize,
        column: usize,
    },

    #[error("unexpected end of input in directive starting at line {line}")]
    UnexpectedEof { line: usize },
}

impl ParseError {
    /// Line and column the error points at
    pub fn position(&self) -> (usize, usize) {
        match self {
            ParseError::Lex(e) => (e.line, e.column),
            ParseError::UnexpectedToken { line, column, .. } => (*line, *column),
            ParseError::UnexpectedEof { line } => (*line, 1),
        }
    }
}

impl From<ParseError> for webserver_core::Error {
    fn from(err: ParseError) -> Self {
        let (line, column) = err.position();
        webserver_core::Error::Syntax {
            line,
            column,
            message: err.to_string(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse Nginx source text into its top-level block
pub fn parse_str(source: &str) -> ParseResult<Block> {
    let mut parser = ConfigParser {
        tokens: tokenize(source)?,
        pos: 0,
    };
    parser.parse_block(None)
}

/// Read and parse a file
pub fn parse_file(path: &Path) -> webserver_core::Result<Block> {
    let content = fs::read_to_string(path)?;
    Ok(parse_str(&content)?)
}

struct ConfigParser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl ConfigParser {
    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse directives until `}` (when `opened_at` is set) or end of input
    fn parse_block(&mut self, opened_at: Option<usize>) -> ParseResult<Block> {
        let mut block = Block::default();
        let mut pending: Vec<String> = Vec::new();
        let mut last_end: Option<usize> = None;

        loop {
            let Some(Spanned { token, line, column, .. }) = self.next() else {
                if let Some(line) = opened_at {
                    return Err(ParseError::UnexpectedEof { line });
                }
                block.trailing_comments = pending;
                return Ok(block);
            };

            match token {
                Token::Comment(text) => {
                    if pending.is_empty() && last_end == Some(line) {
                        if let Some(directive) = block.directives.last_mut() {
                            directive.inline_comment = Some(text);
                            last_end = None;
                            continue;
                        }
                    }
                    pending.push(text);
                }
                Token::BlockClose if opened_at.is_some() => {
                    block.trailing_comments = pending;
                    return Ok(block);
                }
                Token::Word(name) => {
                    let mut directive = Directive {
                        name,
                        line,
                        comment: std::mem::take(&mut pending),
                        ..Directive::default()
                    };
                    last_end = Some(self.parse_rest(&mut directive)?);
                    block.directives.push(directive);
                }
                other => return Err(unexpected(&other, line, column)),
            }
        }
    }

    /// Parameters and terminator of a directive; returns the line it ends on
    fn parse_rest(&mut self, directive: &mut Directive) -> ParseResult<usize> {
        loop {
            let Spanned { token, line, column, .. } = self
                .next()
                .ok_or(ParseError::UnexpectedEof { line: directive.line })?;
            match token {
                Token::Word(arg) | Token::Quoted(arg) => directive.args.push(arg),
                Token::Semicolon => return Ok(line),
                Token::BlockOpen => {
                    directive.block = Some(self.parse_block(Some(directive.line))?);
                    let close_line = self.tokens.get(self.pos - 1).map_or(line, |t| t.line);
                    return Ok(close_line);
                }
                other => return Err(unexpected(&other, line, column)),
            }
        }
    }
}

fn unexpected(token: &Token, line: usize, column: usize) -> ParseError {
    ParseError::UnexpectedToken {
        value: token.to_string(),
        line,
        column,
    }
}
