//! Apache virtual host
//!
//! One generic [`ApacheVhost`] serves every site kind. The kind marker only
//! decides which capability facets are exposed: every kind handles
//! redirects, `PhpSite` adds the PHP binding and `ProxySite` adds proxies
//! and balancers.

use regex::Regex;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::LazyLock;

use webserver_core::layout::toggle_root;
use webserver_core::{
    BasicAuth, ConfigScope, EngineConfig, Error, IncludeFile, Listen, Proxy, RateLimit, RealIp,
    Redirect, Result, ServerType, SiteLayout, SslConfig, Upstream, Vhost, VhostPhp, VhostProxy,
    VhostRedirect, DEFAULT_AUTH_REALM,
};

use crate::data::{
    self, DEFAULT_SSL_CIPHERS, DEFAULT_SSL_PROTOCOLS, DISABLE_CONF_CONTENT, MAIN_CONF_NAME,
    PHP_CONF_NAME,
};
use crate::export::quote_arg;
use crate::parser::{
    parse_file_with_options, parse_str, unquote, Config, Directive, DirectiveList, ParseOptions,
    VirtualHost,
};
use crate::{balancer, proxy, redirect};

static PHP_SOCKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"php-cgi-(\d+)\.sock").expect("valid php socket pattern"));

const HSTS_HEADER: &str = "Strict-Transport-Security";
const ALT_SVC_HEADER: &str = "Alt-Svc";
const HTTPS_REDIRECT_TARGET: &str = "https://%{HTTP_HOST}%{REQUEST_URI}";

const SSL_DIRECTIVES: &[&str] = &[
    "SSLEngine",
    "SSLCertificateFile",
    "SSLCertificateKeyFile",
    "SSLCertificateChainFile",
    "SSLProtocol",
    "SSLCipherSuite",
    "SSLHonorCipherOrder",
    "SSLUseStapling",
];

const RATELIMIT_MODULE: &str = "mod_ratelimit.c";
const QOS_MODULE: &str = "mod_qos.c";

// ============================================================
// Site kinds
// ============================================================

/// Selects the capability facets of an [`ApacheVhost`]
pub trait SiteKind: Sized + 'static {
    fn php(_vhost: &ApacheVhost<Self>) -> Option<&dyn VhostPhp> {
        None
    }

    fn php_mut(_vhost: &mut ApacheVhost<Self>) -> Option<&mut dyn VhostPhp> {
        None
    }

    fn proxy(_vhost: &ApacheVhost<Self>) -> Option<&dyn VhostProxy> {
        None
    }

    fn proxy_mut(_vhost: &mut ApacheVhost<Self>) -> Option<&mut dyn VhostProxy> {
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
    fn php(vhost: &ApacheVhost<Self>) -> Option<&dyn VhostPhp> {
        Some(vhost)
    }

    fn php_mut(vhost: &mut ApacheVhost<Self>) -> Option<&mut dyn VhostPhp> {
        Some(vhost)
    }
}

impl SiteKind for ProxySite {
    fn proxy(vhost: &ApacheVhost<Self>) -> Option<&dyn VhostProxy> {
        Some(vhost)
    }

    fn proxy_mut(vhost: &mut ApacheVhost<Self>) -> Option<&mut dyn VhostProxy> {
        Some(vhost)
    }
}

pub type StaticVhost = ApacheVhost<StaticSite>;
pub type PhpVhost = ApacheVhost<PhpSite>;
pub type ProxyVhost = ApacheVhost<ProxySite>;

// ============================================================
// Vhost
// ============================================================

/// An Apache site backed by `<config_dir>/apache.conf`
#[derive(Debug)]
pub struct ApacheVhost<K: SiteKind> {
    layout: SiteLayout,
    engine: EngineConfig,
    config: Config,
    _kind: PhantomData<K>,
}

impl<K: SiteKind> ApacheVhost<K> {
    /// Open the site in `config_dir` with default engine settings
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let engine = EngineConfig {
            server: ServerType::Apache,
            ..EngineConfig::default()
        };
        Self::with_config(config_dir, &engine)
    }

    /// Open the site, loading `apache.conf` or falling back to the default template
    pub fn with_config(config_dir: impl Into<PathBuf>, engine: &EngineConfig) -> Result<Self> {
        let layout = SiteLayout::new(config_dir);
        layout.ensure_dirs()?;

        let main = layout.main_file(MAIN_CONF_NAME);
        let config = if main.exists() {
            let options = ParseOptions {
                process_includes: false,
                base_dir: layout.config_dir().to_path_buf(),
                max_include_depth: engine.max_include_depth,
            };
            tracing::debug!("loading {}", main.display());
            parse_file_with_options(&main, &options)?
        } else {
            parse_str(&data::default_config(&layout))?
        };

        Ok(Self {
            layout,
            engine: engine.clone(),
            config,
            _kind: PhantomData,
        })
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    /// The parsed `apache.conf`
    pub fn ast(&self) -> &Config {
        &self.config
    }

    pub fn ast_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Render the main config with the engine's export settings
    pub fn export(&self) -> String {
        self.config.export_with_options(&self.engine.export)
    }

    pub fn vhost(&self) -> Option<&VirtualHost> {
        self.config.virtual_hosts.first()
    }

    /// The site's `<VirtualHost>`, created on `*:80` when missing
    pub fn vhost_mut(&mut self) -> &mut VirtualHost {
        if self.config.virtual_hosts.is_empty() {
            self.config.add_virtual_host(["*:80"]);
        }
        &mut self.config.virtual_hosts[0]
    }

    fn value(&self, name: &str) -> String {
        self.vhost()
            .map(|v| unquote(v.get_directive_value(name)).to_string())
            .unwrap_or_default()
    }

    fn headers_with(&self, name: &str) -> Option<&Directive> {
        self.vhost()?
            .get_directives("Header")
            .into_iter()
            .find(|d| d.args.iter().any(|a| unquote(a).eq_ignore_ascii_case(name)))
    }

    fn has_https_redirect(&self) -> bool {
        self.vhost().is_some_and(|v| {
            v.get_directives("RewriteCond")
                .iter()
                .any(|d| d.args.first().is_some_and(|a| a == "%{HTTPS}") && d.args.get(1).is_some_and(|a| a == "off"))
        })
    }

    fn remove_ssl_directives(&mut self) {
        let vhost = self.vhost_mut();
        for name in SSL_DIRECTIVES {
            vhost.remove_directives(name);
        }
        vhost.remove_directives_where(|d| {
            d.name.eq_ignore_ascii_case("Header")
                && d.args.iter().any(|a| {
                    let a = unquote(a);
                    a.eq_ignore_ascii_case(HSTS_HEADER) || a.eq_ignore_ascii_case(ALT_SVC_HEADER)
                })
        });
        vhost.remove_directives_where(|d| {
            (d.name.eq_ignore_ascii_case("RewriteCond")
                && d.args.first().is_some_and(|a| a == "%{HTTPS}"))
                || (d.name.eq_ignore_ascii_case("RewriteRule")
                    && d.args.get(1).is_some_and(|a| a.starts_with(HTTPS_REDIRECT_TARGET)))
        });
        let rewrites_left = vhost.directives.iter().any(|d| {
            d.name.eq_ignore_ascii_case("RewriteCond") || d.name.eq_ignore_ascii_case("RewriteRule")
        });
        if !rewrites_left {
            vhost.remove_directives("RewriteEngine");
        }
    }

    fn module_block_value(&self, module: &str, name: &str) -> Option<String> {
        let block = self.vhost()?.get_block("IfModule", &[module])?;
        let directive = block.get_directive(name)?;
        Some(directive.args.last()?.clone())
    }
}

/// `80` -> `*:80`; anything with a host part is kept
fn vhost_address(address: &str) -> String {
    if !address.is_empty() && address.chars().all(|c| c.is_ascii_digit()) {
        format!("*:{address}")
    } else {
        address.to_string()
    }
}

/// `-all +TLSv1.2 +TLSv1.3` -> `[TLSv1.2, TLSv1.3]`
fn parse_protocols(args: &[String]) -> Vec<String> {
    args.iter()
        .flat_map(|a| unquote(a).split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|p| !p.starts_with('-') && !p.eq_ignore_ascii_case("all"))
        .map(|p| p.trim_start_matches('+').to_string())
        .collect()
}

impl<K: SiteKind> Vhost for ApacheVhost<K> {
    fn enable(&self) -> bool {
        self.layout.is_enabled()
    }

    /// Toggles the disable marker and the document root in memory; call `save` to persist the root
    fn set_enable(&mut self, enable: bool) -> Result<()> {
        let stop_root = self.engine.stop_page_root(ServerType::Apache);
        let current = self.root();
        if let Some(root) = toggle_root(&self.layout, enable, &current, &stop_root, DISABLE_CONF_CONTENT)? {
            self.set_root(&root)?;
        }
        Ok(())
    }

    fn listen(&self) -> Vec<Listen> {
        let mut listens: Vec<Listen> = self
            .vhost()
            .map(|v| v.args.iter().map(Listen::new).collect())
            .unwrap_or_default();

        for directive in self.config.get_directives("Listen") {
            let Some((address, rest)) = directive.args.split_first() else {
                continue;
            };
            let normalized = vhost_address(address);
            match listens.iter_mut().find(|l| l.address == normalized || l.address == *address) {
                Some(listen) if listen.args.is_empty() => listen.args = rest.to_vec(),
                Some(_) => {}
                None => listens.push(Listen::with_args(address.clone(), rest.iter().cloned())),
            }
        }

        listens
    }

    /// Addresses go on the `<VirtualHost>` tag; a top-level `Listen` is only
    /// written for addresses that carry a protocol argument
    fn set_listen(&mut self, listens: &[Listen]) -> Result<()> {
        if listens.is_empty() {
            return Err(Error::InvalidArgument("at least one listen address is required".to_string()));
        }

        self.config.remove_directives("Listen");
        let explicit = listens.iter().filter(|l| !l.args.is_empty());
        for (index, listen) in explicit.enumerate() {
            let args = std::iter::once(listen.address.clone()).chain(listen.args.iter().cloned());
            let mut directive = Directive::new("Listen", args);
            directive.line = 0;
            self.config.directives.insert(index, directive);
        }

        let addresses = listens.iter().map(|l| vhost_address(&l.address)).collect();
        self.vhost_mut().args = addresses;
        Ok(())
    }

    fn server_name(&self) -> Vec<String> {
        let Some(vhost) = self.vhost() else {
            return Vec::new();
        };
        let mut names: Vec<String> = vhost
            .get_directive("ServerName")
            .and_then(|d| d.value())
            .map(|n| vec![n.to_string()])
            .unwrap_or_default();
        for alias in vhost.get_directives("ServerAlias") {
            names.extend(alias.args.iter().map(|a| unquote(a).to_string()));
        }
        names
    }

    fn set_server_name(&mut self, names: &[String]) -> Result<()> {
        let vhost = self.vhost_mut();
        vhost.remove_directives("ServerAlias");
        let Some((first, aliases)) = names.split_first() else {
            vhost.remove_directives("ServerName");
            return Ok(());
        };

        vhost.set_directive("ServerName", [first.as_str()]);
        if !aliases.is_empty() {
            vhost.insert_directive_after("ServerName", Directive::new("ServerAlias", aliases.iter().cloned()));
        }
        Ok(())
    }

    fn index(&self) -> Vec<String> {
        self.vhost()
            .map(|v| v.get_directive_values("DirectoryIndex").to_vec())
            .unwrap_or_default()
    }

    fn set_index(&mut self, index: &[String]) -> Result<()> {
        let vhost = self.vhost_mut();
        if index.is_empty() {
            vhost.remove_directives("DirectoryIndex");
        } else {
            vhost.set_directive("DirectoryIndex", index.iter().cloned());
        }
        Ok(())
    }

    fn root(&self) -> String {
        self.value("DocumentRoot")
    }

    /// Also moves the `<Directory>` block of the old root, or the first one
    fn set_root(&mut self, root: &str) -> Result<()> {
        let old = self.root();
        let arg = quote_arg(root);
        let vhost = self.vhost_mut();
        vhost.set_directive("DocumentRoot", [arg.as_str()]);

        let is_directory = |d: &Directive| d.block.is_some() && d.name.eq_ignore_ascii_case("Directory");
        let target = vhost
            .directives
            .iter()
            .position(|d| is_directory(d) && d.value() == Some(old.as_str()))
            .or_else(|| vhost.directives.iter().position(is_directory));
        if let Some(index) = target {
            vhost.directives[index].set_args(vec![arg]);
        }
        Ok(())
    }

    fn includes(&self) -> Vec<IncludeFile> {
        let Some(vhost) = self.vhost() else {
            return Vec::new();
        };

        vhost
            .directives
            .iter()
            .filter(|d| d.name.eq_ignore_ascii_case("Include") || d.name.eq_ignore_ascii_case("IncludeOptional"))
            .filter_map(|d| {
                let path = d.value()?.to_string();
                Some(IncludeFile {
                    path,
                    comment: leading_comments(vhost, d.line),
                })
            })
            .collect()
    }

    fn set_includes(&mut self, includes: &[IncludeFile]) -> Result<()> {
        let vhost = self.vhost_mut();

        let lines: Vec<usize> = vhost
            .directives
            .iter()
            .filter(|d| d.name.eq_ignore_ascii_case("Include") || d.name.eq_ignore_ascii_case("IncludeOptional"))
            .map(|d| d.line)
            .collect();
        for line in lines {
            let attached = leading_comment_lines(vhost, line);
            vhost.comments.retain(|c| !attached.contains(&c.line));
        }
        vhost.remove_directives("Include");
        vhost.remove_directives("IncludeOptional");

        for include in includes {
            for comment in &include.comment {
                let text = comment.trim_start_matches('#').trim_start();
                vhost.add_comment(text);
            }
            vhost.add_directive("IncludeOptional", [quote_arg(&include.path)]);
        }
        Ok(())
    }

    fn access_log(&self) -> String {
        self.value("CustomLog")
    }

    fn set_access_log(&mut self, path: &str) -> Result<()> {
        let vhost = self.vhost_mut();
        let format: Vec<String> = vhost
            .get_directive("CustomLog")
            .map(|d| d.args.iter().skip(1).cloned().collect())
            .filter(|f: &Vec<String>| !f.is_empty())
            .unwrap_or_else(|| vec!["combined".to_string()]);
        let args = std::iter::once(quote_arg(path)).chain(format);
        vhost.set_directive("CustomLog", args);
        Ok(())
    }

    fn error_log(&self) -> String {
        self.value("ErrorLog")
    }

    fn set_error_log(&mut self, path: &str) -> Result<()> {
        self.vhost_mut().set_directive("ErrorLog", [quote_arg(path)]);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let path = self.layout.main_file(MAIN_CONF_NAME);
        std::fs::create_dir_all(self.layout.config_dir())?;
        webserver_core::fragment::write_file(&path, &(self.export() + "\n"))?;
        tracing::debug!("saved {}", path.display());
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.config = parse_str(&data::default_config(&self.layout))?;
        Ok(())
    }

    fn ssl(&self) -> bool {
        self.vhost()
            .and_then(|v| v.get_directive("SSLEngine"))
            .and_then(|d| d.value())
            .is_some_and(|v| v.eq_ignore_ascii_case("on"))
    }

    fn ssl_config(&self) -> Option<SslConfig> {
        if !self.ssl() {
            return None;
        }
        let vhost = self.vhost()?;

        let alt_svc = self
            .headers_with(ALT_SVC_HEADER)
            .and_then(|d| {
                let at = d.args.iter().position(|a| unquote(a).eq_ignore_ascii_case(ALT_SVC_HEADER))?;
                d.args.get(at + 1)
            })
            .map(|a| unquote(a).to_string())
            .unwrap_or_default();

        Some(SslConfig {
            cert: self.value("SSLCertificateFile"),
            key: self.value("SSLCertificateKeyFile"),
            protocols: parse_protocols(vhost.get_directive_values("SSLProtocol")),
            ciphers: self.value("SSLCipherSuite"),
            hsts: self.headers_with(HSTS_HEADER).is_some(),
            ocsp: self.value("SSLUseStapling").eq_ignore_ascii_case("on"),
            http_redirect: self.has_https_redirect(),
            alt_svc,
        })
    }

    fn set_ssl_config(&mut self, config: &SslConfig) -> Result<()> {
        if config.cert.is_empty() || config.key.is_empty() {
            return Err(Error::InvalidArgument("SSL certificate and key are required".to_string()));
        }

        self.remove_ssl_directives();
        let vhost = self.vhost_mut();

        vhost.add_directive("SSLEngine", ["on"]);
        vhost.add_directive("SSLCertificateFile", [quote_arg(&config.cert)]);
        vhost.add_directive("SSLCertificateKeyFile", [quote_arg(&config.key)]);

        let protocols: Vec<String> = if config.protocols.is_empty() {
            DEFAULT_SSL_PROTOCOLS.iter().map(|p| p.to_string()).collect()
        } else {
            config.protocols.clone()
        };
        let args = std::iter::once("-all".to_string()).chain(protocols.iter().map(|p| format!("+{p}")));
        vhost.add_directive("SSLProtocol", args);

        let ciphers = if config.ciphers.is_empty() { DEFAULT_SSL_CIPHERS } else { config.ciphers.as_str() };
        vhost.add_directive("SSLCipherSuite", [ciphers]);
        vhost.add_directive("SSLHonorCipherOrder", ["off"]);

        if config.hsts {
            vhost.add_directive("Header", ["always", "set", HSTS_HEADER, "\"max-age=31536000\""]);
        }
        if config.ocsp {
            vhost.add_directive("SSLUseStapling", ["on"]);
        }
        if config.http_redirect {
            if !vhost.has_directive("RewriteEngine") {
                vhost.add_directive("RewriteEngine", ["on"]);
            }
            vhost.add_directive("RewriteCond", ["%{HTTPS}", "off"]);
            vhost.add_directive("RewriteRule", ["^(.*)$", HTTPS_REDIRECT_TARGET, "[R=308,L]"]);
        }
        if !config.alt_svc.is_empty() {
            let value = format!("\"{}\"", unquote(&config.alt_svc));
            vhost.add_directive("Header", ["always".to_string(), "set".to_string(), ALT_SVC_HEADER.to_string(), value]);
        }
        Ok(())
    }

    fn clear_ssl(&mut self) -> Result<()> {
        self.remove_ssl_directives();
        Ok(())
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        let number = |module: &str, name: &str| {
            self.module_block_value(module, name)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0)
        };
        let limit = RateLimit {
            per_server: number(QOS_MODULE, "QS_SrvMaxConn"),
            per_ip: number(QOS_MODULE, "QS_SrvMaxConnPerIP"),
            rate: number(RATELIMIT_MODULE, "SetEnv"),
        };
        (!limit.is_empty()).then_some(limit)
    }

    fn set_rate_limit(&mut self, limit: &RateLimit) -> Result<()> {
        self.clear_rate_limit()?;
        let vhost = self.vhost_mut();

        if limit.rate > 0 {
            let block = vhost.add_block("IfModule", [RATELIMIT_MODULE]);
            block.add_directive("SetOutputFilter", ["RATE_LIMIT"]);
            block.add_directive("SetEnv", ["rate-limit".to_string(), limit.rate.to_string()]);
        }
        if limit.per_server > 0 || limit.per_ip > 0 {
            let block = vhost.add_block("IfModule", [QOS_MODULE]);
            if limit.per_server > 0 {
                block.add_directive("QS_SrvMaxConn", [limit.per_server.to_string()]);
            }
            if limit.per_ip > 0 {
                block.add_directive("QS_SrvMaxConnPerIP", [limit.per_ip.to_string()]);
            }
        }
        Ok(())
    }

    fn clear_rate_limit(&mut self) -> Result<()> {
        self.vhost_mut().remove_directives_where(|d| {
            d.block.is_some()
                && d.name.eq_ignore_ascii_case("IfModule")
                && d.args.first().is_some_and(|m| m == RATELIMIT_MODULE || m == QOS_MODULE)
        });
        Ok(())
    }

    fn basic_auth(&self) -> Option<BasicAuth> {
        let block = self.vhost()?.get_block("Location", &["/"])?;
        if !block.has_directive("AuthType") {
            return None;
        }
        let user_file = unquote(block.get_directive_value("AuthUserFile")).to_string();
        if user_file.is_empty() {
            return None;
        }
        Some(BasicAuth {
            realm: unquote(block.get_directive_value("AuthName")).to_string(),
            user_file,
        })
    }

    fn set_basic_auth(&mut self, auth: &BasicAuth) -> Result<()> {
        if auth.user_file.is_empty() {
            return Err(Error::InvalidArgument("basic auth user file is required".to_string()));
        }
        self.clear_basic_auth()?;

        let realm = if auth.realm.is_empty() { DEFAULT_AUTH_REALM } else { auth.realm.as_str() };
        let block = self.vhost_mut().add_block("Location", ["/"]);
        block.add_directive("AuthType", ["Basic"]);
        block.add_directive("AuthName", [format!("\"{}\"", realm.replace('"', "'"))]);
        block.add_directive("AuthUserFile", [quote_arg(&auth.user_file)]);
        block.add_directive("Require", ["valid-user"]);
        Ok(())
    }

    fn clear_basic_auth(&mut self) -> Result<()> {
        self.vhost_mut().remove_directives_where(|d| {
            d.name.eq_ignore_ascii_case("Location")
                && d.value() == Some("/")
                && d.block.as_ref().is_some_and(|b| b.has_directive("AuthType"))
        });
        Ok(())
    }

    fn real_ip(&self) -> Option<RealIp> {
        let vhost = self.vhost()?;
        let trusted = vhost.get_directives("RemoteIPTrustedProxy");
        let internal = vhost.get_directives("RemoteIPInternalProxy");
        let header = self.value("RemoteIPHeader");
        if header.is_empty() && trusted.is_empty() && internal.is_empty() {
            return None;
        }

        let recursive = !trusted.is_empty();
        let from = trusted
            .iter()
            .chain(internal.iter())
            .flat_map(|d| d.args.iter().cloned())
            .collect();
        Some(RealIp { from, header, recursive })
    }

    fn set_real_ip(&mut self, real_ip: &RealIp) -> Result<()> {
        if real_ip.from.is_empty() {
            return Err(Error::InvalidArgument("real IP requires at least one trusted address".to_string()));
        }
        self.clear_real_ip()?;

        let header = if real_ip.header.is_empty() { "X-Forwarded-For" } else { real_ip.header.as_str() };
        let proxy_directive = if real_ip.recursive { "RemoteIPTrustedProxy" } else { "RemoteIPInternalProxy" };
        let vhost = self.vhost_mut();
        vhost.add_directive("RemoteIPHeader", [header]);
        vhost.add_directive(proxy_directive, real_ip.from.iter().cloned());
        Ok(())
    }

    fn clear_real_ip(&mut self) -> Result<()> {
        let vhost = self.vhost_mut();
        vhost.remove_directives("RemoteIPHeader");
        vhost.remove_directives("RemoteIPTrustedProxy");
        vhost.remove_directives("RemoteIPInternalProxy");
        Ok(())
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

/// Lines of the comment run directly above `line`
fn leading_comment_lines(vhost: &VirtualHost, line: usize) -> Vec<usize> {
    let mut lines = Vec::new();
    let mut current = line;
    while current > 0 && vhost.comments.iter().any(|c| c.line == current - 1) {
        current -= 1;
        lines.push(current);
    }
    lines.reverse();
    lines
}

fn leading_comments(vhost: &VirtualHost, line: usize) -> Vec<String> {
    leading_comment_lines(vhost, line)
        .into_iter()
        .filter_map(|l| vhost.comments.iter().find(|c| c.line == l))
        .map(|c| format!("# {}", c.text))
        .collect()
}

impl<K: SiteKind> VhostRedirect for ApacheVhost<K> {
    fn redirects(&self) -> Result<Vec<Redirect>> {
        redirect::load(&self.layout.site_dir())
    }

    fn set_redirects(&mut self, redirects: &[Redirect]) -> Result<()> {
        redirect::store(&self.layout.site_dir(), redirects)
    }
}

impl VhostPhp for ApacheVhost<PhpSite> {
    fn php(&self) -> u32 {
        self.layout
            .read_config(PHP_CONF_NAME, ConfigScope::Site)
            .and_then(|content| {
                PHP_SOCKET_RE
                    .captures(&content)
                    .and_then(|c| c[1].parse().ok())
            })
            .unwrap_or(0)
    }

    fn set_php(&mut self, version: u32) -> Result<()> {
        if version == 0 {
            return self.layout.remove_config(PHP_CONF_NAME, ConfigScope::Site);
        }
        let content = data::php_config(version, &self.engine.php_socket_dir);
        self.layout.write_config(PHP_CONF_NAME, ConfigScope::Site, &content)
    }
}

impl VhostProxy for ApacheVhost<ProxySite> {
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
        balancer::load(&self.layout.shared_dir())
    }

    fn set_upstreams(&mut self, upstreams: &[Upstream]) -> Result<()> {
        balancer::store(&self.layout.shared_dir(), upstreams)
    }

    fn clear_upstreams(&mut self) -> Result<()> {
        balancer::clear(&self.layout.shared_dir())
    }
}
