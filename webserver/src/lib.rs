//! Webserver virtual-host configuration engine
//!
//! Opens a site's config directory with the Nginx or Apache backend and
//! hands it back behind the backend-independent vhost traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use webserver::{new_php_vhost, ServerType};
//!
//! let mut vhost = new_php_vhost(ServerType::Nginx, "/srv/sites/blog/config")?;
//! vhost.set_server_name(&["blog.example.com".to_string()])?;
//! vhost.set_php(84)?;
//! vhost.save()?;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use webserver_core::{
    Capability, EngineConfig, Error, PhpVhost, ProxyVhost, Result, ServerType, StaticVhost, Vhost,
    VhostPhp, VhostProxy, VhostRedirect,
};

/// Which facets a site is opened with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VhostKind {
    #[default]
    Static,
    Php,
    Proxy,
}

impl VhostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VhostKind::Static => "static",
            VhostKind::Php => "php",
            VhostKind::Proxy => "proxy",
        }
    }
}

impl fmt::Display for VhostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VhostKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(VhostKind::Static),
            "php" => Ok(VhostKind::Php),
            "proxy" => Ok(VhostKind::Proxy),
            other => Err(Error::InvalidArgument(format!(
                "vhost kind must be static, php or proxy, got {other}"
            ))),
        }
    }
}

fn engine_for(server: ServerType) -> EngineConfig {
    EngineConfig {
        server,
        ..EngineConfig::default()
    }
}

pub fn new_static_vhost(server: ServerType, config_dir: impl Into<PathBuf>) -> Result<Box<dyn StaticVhost>> {
    new_static_vhost_with_config(config_dir, &engine_for(server))
}

pub fn new_php_vhost(server: ServerType, config_dir: impl Into<PathBuf>) -> Result<Box<dyn PhpVhost>> {
    new_php_vhost_with_config(config_dir, &engine_for(server))
}

pub fn new_proxy_vhost(server: ServerType, config_dir: impl Into<PathBuf>) -> Result<Box<dyn ProxyVhost>> {
    new_proxy_vhost_with_config(config_dir, &engine_for(server))
}

/// Static site on the backend named by `engine.server`
pub fn new_static_vhost_with_config(
    config_dir: impl Into<PathBuf>,
    engine: &EngineConfig,
) -> Result<Box<dyn StaticVhost>> {
    let vhost: Box<dyn StaticVhost> = match engine.server {
        ServerType::Nginx => Box::new(webserver_nginx::StaticVhost::with_config(config_dir, engine)?),
        ServerType::Apache => Box::new(webserver_apache::StaticVhost::with_config(config_dir, engine)?),
    };
    Ok(vhost)
}

/// PHP site on the backend named by `engine.server`
pub fn new_php_vhost_with_config(config_dir: impl Into<PathBuf>, engine: &EngineConfig) -> Result<Box<dyn PhpVhost>> {
    let vhost: Box<dyn PhpVhost> = match engine.server {
        ServerType::Nginx => Box::new(webserver_nginx::PhpVhost::with_config(config_dir, engine)?),
        ServerType::Apache => Box::new(webserver_apache::PhpVhost::with_config(config_dir, engine)?),
    };
    Ok(vhost)
}

/// Proxy site on the backend named by `engine.server`
pub fn new_proxy_vhost_with_config(
    config_dir: impl Into<PathBuf>,
    engine: &EngineConfig,
) -> Result<Box<dyn ProxyVhost>> {
    let vhost: Box<dyn ProxyVhost> = match engine.server {
        ServerType::Nginx => Box::new(webserver_nginx::ProxyVhost::with_config(config_dir, engine)?),
        ServerType::Apache => Box::new(webserver_apache::ProxyVhost::with_config(config_dir, engine)?),
    };
    Ok(vhost)
}

/// Open a site by backend name (`nginx` or `apache`) as a plain [`Vhost`];
/// facets stay reachable through the `as_*` accessors
pub fn open_vhost(server: &str, kind: VhostKind, config_dir: impl Into<PathBuf>) -> Result<Box<dyn Vhost>> {
    let server: ServerType = server.parse()?;
    open_vhost_with_config(kind, config_dir, &engine_for(server))
}

pub fn open_vhost_with_config(
    kind: VhostKind,
    config_dir: impl Into<PathBuf>,
    engine: &EngineConfig,
) -> Result<Box<dyn Vhost>> {
    tracing::debug!("opening {kind} site on {}", engine.server);
    let vhost: Box<dyn Vhost> = match (engine.server, kind) {
        (ServerType::Nginx, VhostKind::Static) => Box::new(webserver_nginx::StaticVhost::with_config(config_dir, engine)?),
        (ServerType::Nginx, VhostKind::Php) => Box::new(webserver_nginx::PhpVhost::with_config(config_dir, engine)?),
        (ServerType::Nginx, VhostKind::Proxy) => Box::new(webserver_nginx::ProxyVhost::with_config(config_dir, engine)?),
        (ServerType::Apache, VhostKind::Static) => Box::new(webserver_apache::StaticVhost::with_config(config_dir, engine)?),
        (ServerType::Apache, VhostKind::Php) => Box::new(webserver_apache::PhpVhost::with_config(config_dir, engine)?),
        (ServerType::Apache, VhostKind::Proxy) => Box::new(webserver_apache::ProxyVhost::with_config(config_dir, engine)?),
    };
    Ok(vhost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vhost_kind_parse() {
        assert_eq!("PHP".parse::<VhostKind>().unwrap(), VhostKind::Php);
        assert_eq!(VhostKind::Proxy.to_string(), "proxy");
        assert!(matches!("cgi".parse::<VhostKind>(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_unknown_server_type() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_vhost("iis", VhostKind::Static, dir.path().join("config")).err().unwrap();
        assert!(matches!(err, Error::UnsupportedServerType(ref name) if name == "iis"));
        assert_eq!(err.to_string(), "unsupported server type: iis");
    }
}
