//! Apache httpd backend
//!
//! This crate provides a lexer, parser and pretty-printer for Apache's
//! block-structured configuration language, the fragment codecs for
//! redirects, reverse proxies and balancers, and the [`ApacheVhost`]
//! implementation of the `webserver_core::Vhost` contract.
//!
//! # Example
//!
//! ```rust,ignore
//! use webserver_apache::parse_str;
//!
//! let config = parse_str("<VirtualHost *:80>\n    ServerName example.com\n</VirtualHost>\n")?;
//! println!("{}", config.export());
//! ```

pub mod balancer;
pub mod data;
pub mod export;
pub mod order;
pub mod parser;
pub mod proxy;
pub mod redirect;
pub mod vhost;

pub use export::{ExportOptions, FormatStyle, IndentStyle};
pub use parser::{
    parse_file, parse_file_with_options, parse_str, parse_str_with_options, Block, Comment,
    Config, Directive, DirectiveList, ParseError, ParseOptions, VirtualHost,
};
pub use vhost::{ApacheVhost, PhpSite, PhpVhost, ProxySite, ProxyVhost, SiteKind, StaticSite, StaticVhost};
