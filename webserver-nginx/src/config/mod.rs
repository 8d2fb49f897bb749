//! Nginx configuration tree: lexer, parser, AST and dumper

pub mod ast;
pub mod dumper;
pub mod lexer;
pub mod parser;

pub use ast::{quote_arg, unquote, Block, Directive};
pub use dumper::{dump, dump_directive};
pub use lexer::{tokenize, LexError, Spanned, Token};
pub use parser::{parse_file, parse_str, ParseError, ParseResult};
