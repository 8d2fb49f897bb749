//! Webserver Core Library
//!
//! This crate provides the pieces shared by the Apache and Nginx backends:
//! the record types exchanged with callers, the polymorphic `Vhost`
//! contract, the reserved-range fragment store and the engine configuration.

pub mod config;
pub mod error;
pub mod fragment;
pub mod layout;
pub mod types;
pub mod vhost;

pub use config::{ConfigLoader, EngineConfig, ServerType};
pub use error::{Error, Result};
pub use layout::SiteLayout;
pub use types::*;
pub use vhost::{
    Capability, PhpVhost, ProxyVhost, StaticVhost, Vhost, VhostPhp, VhostProxy, VhostRedirect,
};

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
