//! Apache configuration parser
//!
//! Recursive descent parser that converts tokens into the AST, optionally
//! splicing `Include` / `IncludeOptional` files in place.

use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::parser::ast::{Comment, Config, Directive, Include, VirtualHost};
use crate::parser::lexer::{Lexer, Token, TokenKind};

/// Parser error types
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid syntax: '{value}' at line {line}, column {column}")]
    Illegal {
        value: String,
        line: usize,
        column: usize,
    },

    #[error("unexpected token '{value}' at line {line}, column {column}")]
    UnexpectedToken {
        value: String,
        line: usize,
        column: usize,
    },

    #[error("unexpected end of {context} opened at line {line}")]
    UnexpectedEof { context: &'static str, line: usize },

    #[error("include directive missing file path argument at line {line}, column {column}")]
    IncludeMissingPath { line: usize, column: usize },

    #[error("include nesting depth exceeds limit {limit}")]
    IncludeDepth { limit: usize },

    #[error("circular include detected: {}", path.display())]
    CircularInclude { path: PathBuf },

    #[error("include files inside a virtual host cannot contain virtual hosts: {}", path.display())]
    VirtualHostInInclude { path: PathBuf },

    #[error("include file not found: {}", path.display())]
    IncludeNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Line and column, when the error points into source text
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::Illegal { line, column, .. }
            | ParseError::UnexpectedToken { line, column, .. }
            | ParseError::IncludeMissingPath { line, column } => Some((*line, *column)),
            ParseError::UnexpectedEof { line, .. } => Some((*line, 1)),
            _ => None,
        }
    }
}

impl From<ParseError> for webserver_core::Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io { source, .. } => webserver_core::Error::Io(source),
            ParseError::IncludeMissingPath { .. }
            | ParseError::IncludeDepth { .. }
            | ParseError::CircularInclude { .. }
            | ParseError::VirtualHostInInclude { .. }
            | ParseError::IncludeNotFound { .. } => webserver_core::Error::Include(err.to_string()),
            other => {
                let (line, column) = other.position().unwrap_or((0, 0));
                webserver_core::Error::Syntax {
                    line,
                    column,
                    message: other.to_string(),
                }
            }
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parser options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Recursively load `Include` / `IncludeOptional` targets
    pub process_includes: bool,
    /// Directory relative include paths are resolved against
    pub base_dir: PathBuf,
    /// Maximum include nesting
    pub max_include_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            process_includes: false,
            base_dir: std::env::current_dir().unwrap_or_default(),
            max_include_depth: 10,
        }
    }
}

/// Directives that splice other files in
fn is_include(name: &str) -> bool {
    name.eq_ignore_ascii_case("Include") || name.eq_ignore_ascii_case("IncludeOptional")
}

/// Statements collected inside a `<VirtualHost>` or block
#[derive(Default)]
struct Body {
    directives: Vec<Directive>,
    comments: Vec<Comment>,
}

/// Parser state
pub struct Parser<'a> {
    lexer: Lexer,
    options: &'a ParseOptions,
    base_dir: PathBuf,
    depth: usize,
    /// Canonical paths of the files currently being included
    visited: HashSet<PathBuf>,
    includes: Vec<Include>,
}

impl<'a> Parser<'a> {
    /// Create a new parser from source text
    pub fn new(source: &str, options: &'a ParseOptions) -> Self {
        Self {
            lexer: Lexer::new(source),
            options,
            base_dir: options.base_dir.clone(),
            depth: 0,
            visited: HashSet::new(),
            includes: Vec::new(),
        }
    }

    /// Parse the whole input
    pub fn parse(&mut self) -> ParseResult<Config> {
        let mut config = Config::default();

        loop {
            let token = self.lexer.next_token();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Newline => continue,
                TokenKind::Comment => config.comments.push(Comment::from_token(&token)),
                TokenKind::Directive => {
                    let directive = self.parse_directive(&token);
                    if self.options.process_includes && is_include(&directive.name) {
                        if let Some(included) = self.process_include(&directive)? {
                            config.directives.extend(included.directives);
                            config.virtual_hosts.extend(included.virtual_hosts);
                            config.comments.extend(included.comments);
                        }
                    } else {
                        config.directives.push(directive);
                    }
                }
                TokenKind::VirtualHost if !token.is_closing() => {
                    let vhost = self.parse_virtual_host(&token)?;
                    config.virtual_hosts.push(vhost);
                }
                TokenKind::BlockDirective if !token.is_closing() => {
                    let block = self.parse_block(&token)?;
                    config.directives.push(block);
                }
                TokenKind::Illegal => return Err(illegal(&token)),
                _ => return Err(unexpected(&token)),
            }
        }

        config.includes = std::mem::take(&mut self.includes);
        Ok(config)
    }

    // ========================================
    // Statements
    // ========================================

    fn parse_directive(&mut self, token: &Token) -> Directive {
        let mut directive = Directive::new(token.value.clone(), Vec::<String>::new());
        directive.line = token.line;
        directive.column = token.column;

        loop {
            let next = self.lexer.peek_token();
            if matches!(next.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            let arg = self.lexer.next_token();
            if matches!(arg.kind, TokenKind::String | TokenKind::Directive) {
                directive.args.push(arg.value);
            }
        }

        directive
    }

    fn parse_virtual_host(&mut self, token: &Token) -> ParseResult<VirtualHost> {
        let body = self.parse_body(token, "virtual host")?;
        Ok(VirtualHost {
            name: "VirtualHost".to_string(),
            args: token.args.clone(),
            line: token.line,
            column: token.column,
            directives: body.directives,
            comments: body.comments,
        })
    }

    fn parse_block(&mut self, token: &Token) -> ParseResult<Directive> {
        let body = self.parse_body(token, "block directive")?;
        let mut directive = Directive::block(token.value.clone(), token.args.clone());
        directive.line = token.line;
        directive.column = token.column;
        if let Some(block) = directive.block.as_mut() {
            block.line = token.line;
            block.column = token.column;
            block.directives = body.directives;
            block.comments = body.comments;
        }
        Ok(directive)
    }

    /// Statements up to the closing tag matching `open`
    fn parse_body(&mut self, open: &Token, context: &'static str) -> ParseResult<Body> {
        let mut body = Body::default();

        loop {
            let token = self.lexer.next_token();
            match token.kind {
                TokenKind::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        context,
                        line: open.line,
                    });
                }
                TokenKind::Newline => continue,
                TokenKind::Comment => body.comments.push(Comment::from_token(&token)),
                TokenKind::VirtualHost | TokenKind::BlockDirective if token.is_closing() => {
                    if token.kind == open.kind && token.tag_name().eq_ignore_ascii_case(&open.value) {
                        break;
                    }
                    return Err(unexpected(&token));
                }
                TokenKind::BlockDirective => {
                    let block = self.parse_block(&token)?;
                    body.directives.push(block);
                }
                TokenKind::Directive => {
                    let directive = self.parse_directive(&token);
                    if self.options.process_includes && is_include(&directive.name) {
                        if let Some(included) = self.process_include(&directive)? {
                            if !included.virtual_hosts.is_empty() {
                                return Err(ParseError::VirtualHostInInclude {
                                    path: PathBuf::from(unquote(&directive.args[0])),
                                });
                            }
                            body.directives.extend(included.directives);
                            body.comments.extend(included.comments);
                        }
                    } else {
                        body.directives.push(directive);
                    }
                }
                TokenKind::Illegal => return Err(illegal(&token)),
                _ => return Err(unexpected(&token)),
            }
        }

        Ok(body)
    }

    // ========================================
    // Includes
    // ========================================

    /// Parse the files an include directive names.
    ///
    /// Records the include. Returns `None` when an `IncludeOptional` target
    /// does not exist.
    fn process_include(&mut self, directive: &Directive) -> ParseResult<Option<Config>> {
        let Some(raw) = directive.args.first() else {
            return Err(ParseError::IncludeMissingPath {
                line: directive.line,
                column: directive.column,
            });
        };

        if self.depth >= self.options.max_include_depth {
            return Err(ParseError::IncludeDepth {
                limit: self.options.max_include_depth,
            });
        }

        let path = unquote(raw);
        let full_path = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.base_dir.join(path)
        };

        let files = expand_include(&full_path)?;
        let optional = directive.name.eq_ignore_ascii_case("IncludeOptional");
        if files.is_empty() {
            if !optional {
                return Err(ParseError::IncludeNotFound { path: full_path });
            }
            tracing::trace!("optional include {} matched nothing", full_path.display());
            self.record_include(path, directive);
            return Ok(None);
        }

        let mut merged = Config::default();
        for file in files {
            let included = self.parse_included_file(&file)?;
            merged.directives.extend(included.directives);
            merged.virtual_hosts.extend(included.virtual_hosts);
            merged.comments.extend(included.comments);
            self.includes.extend(included.includes);
        }

        self.record_include(path, directive);
        Ok(Some(merged))
    }

    fn parse_included_file(&self, file: &Path) -> ParseResult<Config> {
        let canonical = fs::canonicalize(file).map_err(|source| ParseError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        if self.visited.contains(&canonical) {
            return Err(ParseError::CircularInclude { path: canonical });
        }

        let source = fs::read_to_string(file).map_err(|source| ParseError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        tracing::trace!("including {} at depth {}", file.display(), self.depth + 1);

        let mut visited = self.visited.clone();
        visited.insert(canonical);

        let mut child = Parser {
            lexer: Lexer::new(&source),
            options: self.options,
            base_dir: file.parent().map(Path::to_path_buf).unwrap_or_default(),
            depth: self.depth + 1,
            visited,
            includes: Vec::new(),
        };
        child.parse()
    }

    fn record_include(&mut self, path: &str, directive: &Directive) {
        self.includes.push(Include {
            path: path.to_string(),
            line: directive.line,
            column: directive.column,
        });
    }
}

// ============================================================
// Helpers
// ============================================================

fn illegal(token: &Token) -> ParseError {
    ParseError::Illegal {
        value: token.value.clone(),
        line: token.line,
        column: token.column,
    }
}

fn unexpected(token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        value: token.to_string(),
        line: token.line,
        column: token.column,
    }
}

/// Strip one pair of surrounding quotes
pub(crate) fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Files an include path refers to. Wildcards are allowed in the last component.
fn expand_include(path: &Path) -> ParseResult<Vec<PathBuf>> {
    let io_err = |source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if !file_name.contains(['*', '?', '[']) {
        return match fs::metadata(path) {
            Ok(_) => Ok(vec![path.to_path_buf()]),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_err(e)),
        };
    }

    let dir = path.parent().unwrap_or(Path::new("."));
    let pattern = glob_to_regex(file_name);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if pattern.as_ref().is_some_and(|re| re.is_match(name)) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn glob_to_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            '[' | ']' => pattern.push(c),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

// ============================================================
// Entry points
// ============================================================

/// Parse configuration text with default options
pub fn parse_str(source: &str) -> ParseResult<Config> {
    parse_str_with_options(source, &ParseOptions::default())
}

/// Parse configuration text
pub fn parse_str_with_options(source: &str, options: &ParseOptions) -> ParseResult<Config> {
    Parser::new(source, options).parse()
}

/// Parse a configuration file with default options
pub fn parse_file(path: impl AsRef<Path>) -> ParseResult<Config> {
    let path = path.as_ref();
    let options = ParseOptions {
        base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        ..ParseOptions::default()
    };
    parse_file_with_options(path, &options)
}

/// Parse a configuration file; the file itself seeds include cycle detection
pub fn parse_file_with_options(path: impl AsRef<Path>, options: &ParseOptions) -> ParseResult<Config> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut parser = Parser::new(&source, options);
    if let Ok(canonical) = fs::canonicalize(path) {
        parser.visited.insert(canonical);
    }
    parser.parse()
}
