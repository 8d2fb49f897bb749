//! Nginx backend
//!
//! This crate provides:
//! - A logos-based lexer, parser and dumper for the Nginx config language
//! - [`Parser`], an editor addressing directives by dotted path (`server.listen`)
//! - Fragment codecs for redirects, reverse proxies and upstreams
//! - [`NginxVhost`], the `webserver_core::Vhost` implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use webserver_nginx::Parser;
//!
//! let mut parser = Parser::parse("server {\n    listen 80;\n}\n")?;
//! parser.set_one("server.server_name", ["example.com"])?;
//! println!("{}", parser.dump());
//! ```

pub mod config;
pub mod data;
mod getter;
pub mod order;
pub mod parser;
pub mod proxy;
pub mod redirect;
mod setter;
pub mod upstream;
pub mod vhost;

pub use config::{parse_file, parse_str, Block, Directive, ParseError};
pub use parser::Parser;
pub use vhost::{NginxVhost, PhpSite, PhpVhost, ProxySite, ProxyVhost, SiteKind, StaticSite, StaticVhost};
