//! Nginx virtual host
//!
//! [`NginxVhost`] edits the `server` block of `<config_dir>/nginx.conf`
//! through the dotted-path [`Parser`]. As on the Apache side, the kind
//! marker picks the capability facets: every kind handles redirects,
//! `PhpSite` adds the PHP binding and `ProxySite` adds proxies and upstreams.

use std::marker::PhantomData;
use std::path::PathBuf;

use webserver_core::layout::toggle_root;
use webserver_core::{
    BasicAuth, ConfigScope, EngineConfig, Error, IncludeFile, Listen, Proxy, RateLimit, RealIp,
    Redirect, Result, ServerType, SiteLayout, SslConfig, Upstream, Vhost, VhostPhp, VhostProxy,
    VhostRedirect, DEFAULT_AUTH_REALM,
};

use crate::data::{self, DISABLE_CONF_CONTENT, MAIN_CONF_NAME};
use crate::getter::php_version;
use crate::parser::Parser;
use crate::{proxy, redirect, upstream};

const PER_SERVER_ZONE: &str = "perserver";
const PER_IP_ZONE: &str = "perip";
const DEFAULT_REAL_IP_HEADER: &str = "X-Forwarded-For";

// ============================================================
// Site kinds
// ============================================================

/// Selects the capability facets of an [`NginxVhost`]
pub trait SiteKind: Sized + 'static {
    fn php(_vhost: &NginxVhost<Self>) -> Option<&dyn VhostPhp> {
        None
    }

    fn php_mut(_vhost: &mut NginxVhost<Self>) -> Option<&mut dyn VhostPhp> {
        None
    }

    fn proxy(_vhost: &NginxVhost<Self>) -> Option<&dyn VhostProxy> {
        None
    }

    fn proxy_mut(_vhost: &mut NginxVhost<Self>) -> Option<&mut dyn VhostProxy> {
        None
    }
}

/// Static files only
#[derive(Debug)]
pub struct StaticSite;

/// PHP-FPM site
#[derive(Debug)]
pub struct PhpSite;

/// Reverse proxy site
#[derive(Debug)]
pub struct ProxySite;

impl SiteKind for StaticSite {}

impl SiteKind for PhpSite {
    fn php(vhost: &NginxVhost<Self>) -> Option<&dyn VhostPhp> {
        Some(vhost)
    }

    fn php_mut(vhost: &mut NginxVhost<Self>) -> Option<&mut dyn VhostPhp> {
        Some(vhost)
    }
}

impl SiteKind for ProxySite {
    fn proxy(vhost: &NginxVhost<Self>) -> Option<&dyn VhostProxy> {
        Some(vhost)
    }

    fn proxy_mut(vhost: &mut NginxVhost<Self>) -> Option<&mut dyn VhostProxy> {
        Some(vhost)
    }
}

pub type StaticVhost = NginxVhost<StaticSite>;
pub type PhpVhost = NginxVhost<PhpSite>;
pub type ProxyVhost = NginxVhost<ProxySite>;

// ============================================================
// Vhost
// ============================================================

/// An Nginx site backed by `<config_dir>/nginx.conf`
#[derive(Debug)]
pub struct NginxVhost<K: SiteKind> {
    layout: SiteLayout,
    engine: EngineConfig,
    parser: Parser,
    _kind: PhantomData<K>,
}

impl<K: SiteKind> NginxVhost<K> {
    /// Open the site in `config_dir` with default engine settings
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let engine = EngineConfig {
            server: ServerType::Nginx,
            ..EngineConfig::default()
        };
        Self::with_config(config_dir, &engine)
    }

    /// Open the site, loading `nginx.conf` or falling back to the default template
    pub fn with_config(config_dir: impl Into<PathBuf>, engine: &EngineConfig) -> Result<Self> {
        let layout = SiteLayout::new(config_dir);
        layout.ensure_dirs()?;

        let main = layout.main_file(MAIN_CONF_NAME);
        let parser = if main.exists() {
            Parser::from_file(main)?
        } else {
            let mut parser = Parser::parse(&data::default_config(&layout))?;
            parser.set_config_path(main);
            parser
        };

        Ok(Self {
            layout,
            engine: engine.clone(),
            parser,
            _kind: PhantomData,
        })
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    /// The config text `save` would write, before ordering
    pub fn dump(&self) -> String {
        self.parser.dump()
    }
}

/// Merge `listen` directives that share an address, first seen first
fn merge_listens(directives: Vec<Vec<String>>) -> Vec<Listen> {
    let mut listens: Vec<Listen> = Vec::new();
    for args in directives {
        let Some((address, flags)) = args.split_first() else {
            continue;
        };
        match listens.iter_mut().find(|l| l.address == *address) {
            Some(listen) => {
                for flag in flags {
                    if !listen.args.contains(flag) {
                        listen.args.push(flag.clone());
                    }
                }
            }
            None => listens.push(Listen::with_args(address.clone(), flags.iter().cloned())),
        }
    }
    listens
}

/// QUIC needs its own `listen` line next to the TCP one
fn split_listens(listens: &[Listen]) -> Vec<Vec<String>> {
    let mut directives = Vec::new();
    for listen in listens {
        let has_quic = listen.args.iter().any(|a| a == "quic");
        let others: Vec<String> = listen.args.iter().filter(|a| *a != "quic").cloned().collect();
        if has_quic && !others.is_empty() {
            directives.push(std::iter::once(listen.address.clone()).chain(others).collect());
            directives.push(vec![listen.address.clone(), "quic".to_string()]);
        } else {
            directives.push(std::iter::once(listen.address.clone()).chain(listen.args.iter().cloned()).collect());
        }
    }
    directives
}

/// `512k` -> 512; `2m` -> 2048
fn parse_rate(rate: &str) -> u32 {
    let rate = rate.trim();
    let (number, scale) = match rate.chars().last() {
        Some('k' | 'K') => (&rate[..rate.len() - 1], 1),
        Some('m' | 'M') => (&rate[..rate.len() - 1], 1024),
        _ => (rate, 0),
    };
    let value: u32 = number.parse().unwrap_or(0);
    if scale == 0 {
        value / 1024
    } else {
        value.saturating_mul(scale)
    }
}

impl<K: SiteKind> Vhost for NginxVhost<K> {
    fn enable(&self) -> bool {
        self.layout.is_enabled()
    }

    /// Toggles the disable marker and the document root in memory; call `save` to persist the root
    fn set_enable(&mut self, enable: bool) -> Result<()> {
        let stop_root = self.engine.stop_page_root(ServerType::Nginx);
        let current = self.root();
        if let Some(root) = toggle_root(&self.layout, enable, &current, &stop_root, DISABLE_CONF_CONTENT)? {
            self.set_root(&root)?;
        }
        Ok(())
    }

    fn listen(&self) -> Vec<Listen> {
        self.parser.get_listen().map(merge_listens).unwrap_or_default()
    }

    fn set_listen(&mut self, listens: &[Listen]) -> Result<()> {
        if listens.is_empty() {
            return Err(Error::InvalidArgument("at least one listen address is required".to_string()));
        }
        self.parser.set_listen(&split_listens(listens))
    }

    fn server_name(&self) -> Vec<String> {
        self.parser.get_server_name().unwrap_or_default()
    }

    fn set_server_name(&mut self, names: &[String]) -> Result<()> {
        self.parser.set_server_name(names)
    }

    fn index(&self) -> Vec<String> {
        self.parser.get_index().unwrap_or_default()
    }

    fn set_index(&mut self, index: &[String]) -> Result<()> {
        self.parser.set_index(index)
    }

    fn root(&self) -> String {
        self.parser.get_root().unwrap_or_default()
    }

    fn set_root(&mut self, root: &str) -> Result<()> {
        self.parser.set_root(root)
    }

    fn includes(&self) -> Vec<IncludeFile> {
        self.parser.get_includes().unwrap_or_default()
    }

    fn set_includes(&mut self, includes: &[IncludeFile]) -> Result<()> {
        self.parser.set_includes(includes)
    }

    fn access_log(&self) -> String {
        self.parser.get_access_log().unwrap_or_default()
    }

    fn set_access_log(&mut self, path: &str) -> Result<()> {
        self.parser.set_access_log(path)
    }

    fn error_log(&self) -> String {
        self.parser.get_error_log().unwrap_or_default()
    }

    fn set_error_log(&mut self, path: &str) -> Result<()> {
        self.parser.set_error_log(path)
    }

    fn save(&mut self) -> Result<()> {
        self.parser.save()
    }

    fn reset(&mut self) -> Result<()> {
        let mut parser = Parser::parse(&data::default_config(&self.layout))?;
        parser.set_config_path(self.layout.main_file(MAIN_CONF_NAME));
        self.parser = parser;
        Ok(())
    }

    fn ssl(&self) -> bool {
        self.parser.get_https()
    }

    fn ssl_config(&self) -> Option<SslConfig> {
        if !self.ssl() {
            return None;
        }
        let (cert, key) = self.parser.get_https_cert();
        Some(SslConfig {
            cert,
            key,
            protocols: self.parser.get_https_protocols(),
            ciphers: self.parser.get_https_ciphers(),
            hsts: self.parser.get_hsts(),
            ocsp: self.parser.get_ocsp(),
            http_redirect: self.parser.get_https_redirect(),
            alt_svc: self.parser.get_alt_svc(),
        })
    }

    fn set_ssl_config(&mut self, config: &SslConfig) -> Result<()> {
        if config.cert.is_empty() || config.key.is_empty() {
            return Err(Error::InvalidArgument("SSL certificate and key are required".to_string()));
        }
        self.parser.clear_https()?;
        self.parser.set_https_cert(&config.cert, &config.key)?;
        self.parser.set_https_protocols(&config.protocols)?;
        self.parser.set_https_ciphers(&config.ciphers)?;
        self.parser.set_ocsp(config.ocsp)?;
        self.parser.set_hsts(config.hsts)?;
        self.parser.set_https_redirect(config.http_redirect)?;
        self.parser.set_alt_svc(&config.alt_svc)
    }

    fn clear_ssl(&mut self) -> Result<()> {
        self.parser.clear_https()
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        let mut limit = RateLimit::default();
        for args in self.parser.get_limit_conn() {
            let [zone, count] = args.as_slice() else {
                continue;
            };
            let count = count.parse().unwrap_or(0);
            match zone.as_str() {
                PER_SERVER_ZONE => limit.per_server = count,
                PER_IP_ZONE => limit.per_ip = count,
                _ => {}
            }
        }
        limit.rate = parse_rate(&self.parser.get_limit_rate());
        (!limit.is_empty()).then_some(limit)
    }

    fn set_rate_limit(&mut self, limit: &RateLimit) -> Result<()> {
        let mut conns = Vec::new();
        if limit.per_server > 0 {
            conns.push(vec![PER_SERVER_ZONE.to_string(), limit.per_server.to_string()]);
        }
        if limit.per_ip > 0 {
            conns.push(vec![PER_IP_ZONE.to_string(), limit.per_ip.to_string()]);
        }
        self.parser.set_limit_conn(&conns)?;
        let rate = if limit.rate > 0 { format!("{}k", limit.rate) } else { String::new() };
        self.parser.set_limit_rate(&rate)
    }

    fn clear_rate_limit(&mut self) -> Result<()> {
        self.set_rate_limit(&RateLimit::default())
    }

    fn basic_auth(&self) -> Option<BasicAuth> {
        let (realm, user_file) = self.parser.get_basic_auth();
        (!user_file.is_empty()).then_some(BasicAuth { realm, user_file })
    }

    fn set_basic_auth(&mut self, auth: &BasicAuth) -> Result<()> {
        if auth.user_file.is_empty() {
            return Err(Error::InvalidArgument("basic auth user file is required".to_string()));
        }
        let realm = if auth.realm.is_empty() { DEFAULT_AUTH_REALM } else { auth.realm.as_str() };
        self.parser.set_basic_auth(realm, &auth.user_file)
    }

    fn clear_basic_auth(&mut self) -> Result<()> {
        self.parser.clear_basic_auth()
    }

    fn real_ip(&self) -> Option<RealIp> {
        let (from, header, recursive) = self.parser.get_real_ip();
        if from.is_empty() && header.is_empty() {
            return None;
        }
        Some(RealIp { from, header, recursive })
    }

    fn set_real_ip(&mut self, real_ip: &RealIp) -> Result<()> {
        if real_ip.from.is_empty() {
            return Err(Error::InvalidArgument("real IP requires at least one trusted address".to_string()));
        }
        let header = if real_ip.header.is_empty() { DEFAULT_REAL_IP_HEADER } else { real_ip.header.as_str() };
        self.parser.set_real_ip(&real_ip.from, header, real_ip.recursive)
    }

    fn clear_real_ip(&mut self) -> Result<()> {
        self.parser.clear_real_ip()
    }

    fn config(&self, name: &str, scope: ConfigScope) -> Option<String> {
        self.layout.read_config(name, scope)
    }

    fn set_config(&mut self, name: &str, scope: ConfigScope, content: &str) -> Result<()> {
        self.layout.write_config(name, scope, content)
    }

    fn remove_config(&mut self, name: &str, scope: ConfigScope) -> Result<()> {
        self.layout.remove_config(name, scope)
    }

    fn as_php(&self) -> Option<&dyn VhostPhp> {
        K::php(self)
    }

    fn as_php_mut(&mut self) -> Option<&mut dyn VhostPhp> {
        K::php_mut(self)
    }

    fn as_redirect(&self) -> Option<&dyn VhostRedirect> {
        Some(self)
    }

    fn as_redirect_mut(&mut self) -> Option<&mut dyn VhostRedirect> {
        Some(self)
    }

    fn as_proxy(&self) -> Option<&dyn VhostProxy> {
        K::proxy(self)
    }

    fn as_proxy_mut(&mut self) -> Option<&mut dyn VhostProxy> {
        K::proxy_mut(self)
    }
}

impl<K: SiteKind> VhostRedirect for NginxVhost<K> {
    fn redirects(&self) -> Result<Vec<Redirect>> {
        redirect::load(&self.layout.site_dir())
    }

    fn set_redirects(&mut self, redirects: &[Redirect]) -> Result<()> {
        redirect::store(&self.layout.site_dir(), redirects)
    }
}

impl VhostPhp for NginxVhost<PhpSite> {
    fn php(&self) -> u32 {
        self.parser.get_php()
    }

    /// Swaps the `enable-php-*.conf` include; other includes keep their order
    fn set_php(&mut self, version: u32) -> Result<()> {
        let mut includes: Vec<IncludeFile> = self
            .includes()
            .into_iter()
            .filter(|i| php_version(&i.path).is_none())
            .collect();
        if version > 0 {
            includes.push(IncludeFile {
                path: data::php_include(version),
                comment: vec![format!("# Enable PHP {}.{}", version / 10, version % 10)],
            });
        }
        self.parser.set_includes(&includes)
    }
}

impl VhostProxy for NginxVhost<ProxySite> {
    fn proxies(&self) -> Result<Vec<Proxy>> {
        proxy::load(&self.layout.site_dir())
    }

    fn set_proxies(&mut self, proxies: &[Proxy]) -> Result<()> {
        proxy::store(&self.layout.site_dir(), proxies)
    }

    fn clear_proxies(&mut self) -> Result<()> {
        proxy::clear(&self.layout.site_dir())
    }

    fn upstreams(&self) -> Result<Vec<Upstream>> {
        upstream::load(&self.layout.shared_dir())
    }

    fn set_upstreams(&mut self, upstreams: &[Upstream]) -> Result<()> {
        upstream::store(&self.layout.shared_dir(), upstreams)
    }

    fn clear_upstreams(&mut self) -> Result<()> {
        upstream::clear(&self.layout.shared_dir())
    }
}
