//! Apache httpd configuration parser
//!
//! Lexes and parses the block-structured directive language into an AST
//! that keeps source positions, optionally splicing `Include` files.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{Block, Comment, Config, Directive, DirectiveList, Include, VirtualHost};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{
    parse_file, parse_file_with_options, parse_str, parse_str_with_options, ParseError,
    ParseOptions, Parser,
};

pub(crate) use parser::unquote;
