//! The backend-independent vhost contract
//!
//! Every backend implements [`Vhost`]. Optional behavior is exposed through
//! capability facets ([`VhostPhp`], [`VhostRedirect`], [`VhostProxy`]) that
//! callers discover with [`Vhost::capabilities`] and reach through the
//! `as_*` accessors instead of downcasting concrete types.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{
    BasicAuth, ConfigScope, IncludeFile, Listen, Proxy, RateLimit, RealIp, Redirect, SslConfig,
    Upstream,
};

/// Optional facets a vhost may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Php,
    Redirect,
    Proxy,
}

/// Operations shared by every vhost.
///
/// Getters are best-effort: a value that cannot be read yields the empty
/// default. Mutators edit the in-memory config; `save` persists it. Fragment
/// files (redirects, proxies, upstreams, free-form configs) are written
/// immediately by their setters.
pub trait Vhost {
    /// Whether the site is serving (no disable marker present)
    fn enable(&self) -> bool;
    fn set_enable(&mut self, enable: bool) -> Result<()>;

    fn listen(&self) -> Vec<Listen>;
    fn set_listen(&mut self, listens: &[Listen]) -> Result<()>;

    fn server_name(&self) -> Vec<String>;
    fn set_server_name(&mut self, names: &[String]) -> Result<()>;

    fn index(&self) -> Vec<String>;
    fn set_index(&mut self, index: &[String]) -> Result<()>;

    fn root(&self) -> String;
    fn set_root(&mut self, root: &str) -> Result<()>;

    fn includes(&self) -> Vec<IncludeFile>;
    fn set_includes(&mut self, includes: &[IncludeFile]) -> Result<()>;

    fn access_log(&self) -> String;
    fn set_access_log(&mut self, path: &str) -> Result<()>;

    fn error_log(&self) -> String;
    fn set_error_log(&mut self, path: &str) -> Result<()>;

    /// Write the main config file
    fn save(&mut self) -> Result<()>;
    /// Replace the in-memory config with the default template
    fn reset(&mut self) -> Result<()>;

    fn ssl(&self) -> bool;
    fn ssl_config(&self) -> Option<SslConfig>;
    fn set_ssl_config(&mut self, config: &SslConfig) -> Result<()>;
    fn clear_ssl(&mut self) -> Result<()>;

    fn rate_limit(&self) -> Option<RateLimit>;
    fn set_rate_limit(&mut self, limit: &RateLimit) -> Result<()>;
    fn clear_rate_limit(&mut self) -> Result<()>;

    fn basic_auth(&self) -> Option<BasicAuth>;
    fn set_basic_auth(&mut self, auth: &BasicAuth) -> Result<()>;
    fn clear_basic_auth(&mut self) -> Result<()>;

    fn real_ip(&self) -> Option<RealIp>;
    fn set_real_ip(&mut self, real_ip: &RealIp) -> Result<()>;
    fn clear_real_ip(&mut self) -> Result<()>;

    /// Content of a free-form fragment, `None` when absent
    fn config(&self, name: &str, scope: ConfigScope) -> Option<String>;
    fn set_config(&mut self, name: &str, scope: ConfigScope, content: &str) -> Result<()>;
    fn remove_config(&mut self, name: &str, scope: ConfigScope) -> Result<()>;

    fn as_php(&self) -> Option<&dyn VhostPhp> {
        None
    }

    fn as_php_mut(&mut self) -> Option<&mut dyn VhostPhp> {
        None
    }

    fn as_redirect(&self) -> Option<&dyn VhostRedirect> {
        None
    }

    fn as_redirect_mut(&mut self) -> Option<&mut dyn VhostRedirect> {
        None
    }

    fn as_proxy(&self) -> Option<&dyn VhostProxy> {
        None
    }

    fn as_proxy_mut(&mut self) -> Option<&mut dyn VhostProxy> {
        None
    }

    /// Facets this vhost supports
    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.as_php().is_some() {
            caps.push(Capability::Php);
        }
        if self.as_redirect().is_some() {
            caps.push(Capability::Redirect);
        }
        if self.as_proxy().is_some() {
            caps.push(Capability::Proxy);
        }
        caps
    }
}

/// PHP-FPM binding
pub trait VhostPhp {
    /// Bound PHP version as digits (`84` for 8.4), 0 when none
    fn php(&self) -> u32;
    /// Bind a PHP version, 0 unbinds
    fn set_php(&mut self, version: u32) -> Result<()>;
}

/// Redirect rules stored in the redirect fragment range
pub trait VhostRedirect {
    fn redirects(&self) -> Result<Vec<Redirect>>;
    fn set_redirects(&mut self, redirects: &[Redirect]) -> Result<()>;
}

/// Reverse-proxy rules and upstream pools
pub trait VhostProxy {
    fn proxies(&self) -> Result<Vec<Proxy>>;
    fn set_proxies(&mut self, proxies: &[Proxy]) -> Result<()>;
    fn clear_proxies(&mut self) -> Result<()>;

    fn upstreams(&self) -> Result<Vec<Upstream>>;
    fn set_upstreams(&mut self, upstreams: &[Upstream]) -> Result<()>;
    fn clear_upstreams(&mut self) -> Result<()>;
}

/// Static site: base operations plus redirects
pub trait StaticVhost: Vhost + VhostRedirect {}

impl<T: Vhost + VhostRedirect> StaticVhost for T {}

/// PHP site: base operations, PHP binding and redirects
pub trait PhpVhost: Vhost + VhostPhp + VhostRedirect {}

impl<T: Vhost + VhostPhp + VhostRedirect> PhpVhost for T {}

/// Reverse-proxy site: base operations, redirects, proxies and upstreams
pub trait ProxyVhost: Vhost + VhostRedirect + VhostProxy {}

impl<T: Vhost + VhostRedirect + VhostProxy> ProxyVhost for T {}
