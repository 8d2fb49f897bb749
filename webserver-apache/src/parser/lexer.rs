//! Lexer for Apache httpd configuration
//!
//! Tokenizes the line-oriented directive language.
//!
//! Key features:
//! - Newlines terminate directives and are emitted as tokens
//! - `#` starts a comment only at the beginning of a line
//! - `<Tag args>` / `</Tag>` are read as one token with their arguments.
//!   Every tag other than VirtualHost is a `BlockDirective`, not only the
//!   common containers (Directory, Location, Files, IfModule, Proxy, ...),
//!   so `<If>`, `<Macro>` or `<ElseIf>` nest like any other block.
//! - Quoted strings keep their quotes and escapes verbatim
//! - A trailing `\` continues a directive on the next line

use std::fmt;

/// Token kinds produced by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Illegal,
    Eof,
    Newline,
    Comment,
    /// Directive name at the start of a line
    Directive,
    /// Argument word or quoted string
    String,
    /// Stray `>`
    RBrace,
    /// `<VirtualHost ...>` or `</VirtualHost>`
    VirtualHost,
    /// Any other container tag: `<Directory ...>`, `</IfModule>`, and also
    /// tags outside the usual set such as `<If ...>` or `<Macro ...>`
    BlockDirective,
}

/// A lexical token with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Text of the token. Closing tags carry a leading `/`.
    pub value: String,
    /// Arguments of an opening tag
    pub args: Vec<String>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            args: Vec::new(),
            line,
            column,
        }
    }

    /// Whether this is a closing tag such as `</Directory>`
    pub fn is_closing(&self) -> bool {
        matches!(self.kind, TokenKind::VirtualHost | TokenKind::BlockDirective) && self.value.starts_with('/')
    }

    /// Tag name without the closing slash
    pub fn tag_name(&self) -> &str {
        self.value.strip_prefix('/').unwrap_or(&self.value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::Newline => write!(f, "\\n"),
            TokenKind::Comment => write!(f, "#{}", self.value),
            TokenKind::VirtualHost | TokenKind::BlockDirective => {
                write!(f, "<{}", self.value)?;
                for arg in &self.args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ">")
            }
            _ => write!(f, "{}", self.value),
        }
    }
}

/// Saved lexer position, restored after a peek
#[derive(Debug, Clone, Copy)]
struct Cursor {
    pos: usize,
    line: usize,
    column: usize,
    line_start: bool,
}

/// Hand-written lexer over the source characters
pub struct Lexer {
    chars: Vec<char>,
    cursor: Cursor,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            cursor: Cursor {
                pos: 0,
                line: 1,
                column: 1,
                line_start: true,
            },
        }
    }

    /// Next token, advancing the lexer
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let line = self.cursor.line;
        let column = self.cursor.column;
        let line_start = self.cursor.line_start;

        let token = match self.current() {
            None => Token::new(TokenKind::Eof, "", line, column),
            Some('\n') => {
                self.read_char();
                Token::new(TokenKind::Newline, "\n", line, column)
            }
            Some('#') if line_start => Token::new(TokenKind::Comment, self.read_comment(), line, column),
            Some('<') if line_start => self.read_tag(line, column),
            Some('>') if line_start => {
                self.read_char();
                Token::new(TokenKind::RBrace, ">", line, column)
            }
            Some(quote @ ('"' | '\'')) => Token::new(TokenKind::String, self.read_quoted(quote), line, column),
            Some(c) if line_start && c.is_alphabetic() => {
                Token::new(TokenKind::Directive, self.read_identifier(), line, column)
            }
            Some(c) => {
                let word = self.read_word(false);
                if word.is_empty() {
                    self.read_char();
                    Token::new(TokenKind::Illegal, c.to_string(), line, column)
                } else {
                    Token::new(TokenKind::String, word, line, column)
                }
            }
        };

        self.cursor.line_start = token.kind == TokenKind::Newline;
        token
    }

    /// Next token without advancing the lexer
    pub fn peek_token(&mut self) -> Token {
        let saved = self.cursor;
        let token = self.next_token();
        self.cursor = saved;
        token
    }

    // ========================================
    // Character handling
    // ========================================

    fn current(&self) -> Option<char> {
        self.chars.get(self.cursor.pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.cursor.pos + 1).copied()
    }

    fn read_char(&mut self) {
        if let Some(c) = self.current() {
            self.cursor.pos += 1;
            if c == '\n' {
                self.cursor.line += 1;
                self.cursor.column = 1;
            } else {
                self.cursor.column += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.current() {
                Some(' ' | '\t' | '\r') => self.read_char(),
                // line continuation
                Some('\\') if matches!(self.peek_char(), Some('\n')) => {
                    self.read_char();
                    self.read_char();
                }
                Some('\\') if matches!(self.peek_char(), Some('\r')) && self.chars.get(self.cursor.pos + 2) == Some(&'\n') => {
                    self.read_char();
                    self.read_char();
                    self.read_char();
                }
                _ => break,
            }
        }
    }

    // ========================================
    // Readers
    // ========================================

    /// Quoted string including its delimiters; escapes are kept raw.
    /// An unterminated string runs to the end of input.
    fn read_quoted(&mut self, delimiter: char) -> String {
        let mut result = String::new();
        result.push(delimiter);
        self.read_char();

        while let Some(c) = self.current() {
            if c == delimiter {
                result.push(delimiter);
                self.read_char();
                break;
            }
            if c == '\\' {
                self.read_char();
                if let Some(escaped) = self.current() {
                    result.push('\\');
                    result.push(escaped);
                    self.read_char();
                }
                continue;
            }
            result.push(c);
            self.read_char();
        }

        result
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || "_-.:/$@%{}?&=+".contains(c) {
                result.push(c);
                self.read_char();
            } else {
                break;
            }
        }
        result
    }

    /// Unquoted argument. Inside a tag the word also stops at `>`.
    fn read_word(&mut self, in_tag: bool) -> String {
        let mut result = String::new();
        while let Some(c) = self.current() {
            if c.is_whitespace() || (in_tag && c == '>') {
                break;
            }
            result.push(c);
            self.read_char();
        }
        result
    }

    fn read_comment(&mut self) -> String {
        self.read_char(); // '#'
        if self.current() == Some(' ') {
            self.read_char();
        }

        let mut result = String::new();
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            result.push(c);
            self.read_char();
        }
        result.trim_end_matches('\r').to_string()
    }

    fn read_tag(&mut self, line: usize, column: usize) -> Token {
        self.read_char(); // '<'

        let closing = self.current() == Some('/');
        if closing {
            self.read_char();
        }

        let identifier = self.read_identifier();
        if identifier.is_empty() {
            return Token::new(TokenKind::Illegal, "<", line, column);
        }

        self.skip_whitespace();
        let mut args = Vec::new();
        while let Some(c) = self.current() {
            if c == '>' || c == '\n' {
                break;
            }
            let before = self.cursor.pos;

            if c == '"' || c == '\'' {
                args.push(self.read_quoted(c));
            } else {
                let word = self.read_word(true);
                if !word.is_empty() {
                    args.push(word);
                }
            }
            self.skip_whitespace();

            // no progress: skip the offending character and stop
            if self.cursor.pos == before {
                self.read_char();
                break;
            }
        }

        if self.current() == Some('>') {
            self.read_char();
        }

        let kind = if identifier.eq_ignore_ascii_case("VirtualHost") {
            TokenKind::VirtualHost
        } else {
            TokenKind::BlockDirective
        };

        let mut token = if closing {
            Token::new(kind, format!("/{identifier}"), line, column)
        } else {
            Token::new(kind, identifier, line, column)
        };
        if !closing {
            token.args = args;
        }
        token
    }
}
