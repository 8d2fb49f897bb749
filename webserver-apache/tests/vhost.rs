use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use webserver_apache::{DirectiveList, PhpVhost, ProxyVhost, StaticVhost};
use webserver_core::{
    BasicAuth, Capability, ConfigScope, Error, IncludeFile, Listen, Proxy, RateLimit, RealIp,
    Redirect, RedirectKind, SslConfig, Upstream, Vhost, VhostPhp, VhostProxy, VhostRedirect,
};

fn site() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("config");
    (dir, config_dir)
}

fn php_vhost() -> (TempDir, PathBuf, PhpVhost) {
    let (dir, config_dir) = site();
    let vhost = PhpVhost::new(&config_dir).unwrap();
    (dir, config_dir, vhost)
}

fn proxy_vhost() -> (TempDir, PathBuf, ProxyVhost) {
    let (dir, config_dir) = site();
    let vhost = ProxyVhost::new(&config_dir).unwrap();
    (dir, config_dir, vhost)
}

fn ssl(cert: &str, key: &str) -> SslConfig {
    SslConfig {
        cert: cert.to_string(),
        key: key.to_string(),
        ..SslConfig::default()
    }
}

// ============================================================
// Base operations
// ============================================================

#[test]
fn test_new_vhost_uses_template() {
    let (dir, config_dir, vhost) = php_vhost();

    assert!(config_dir.join("site").is_dir());
    assert!(config_dir.join("shared").is_dir());
    assert!(vhost.vhost().is_some());
    assert_eq!(vhost.server_name(), vec!["localhost"]);
    assert_eq!(PathBuf::from(vhost.root()), dir.path().join("public"));
    assert_eq!(vhost.index(), vec!["index.php", "index.html"]);
    assert_eq!(PathBuf::from(vhost.error_log()), dir.path().join("log").join("error.log"));
}

#[test]
fn test_server_name_with_aliases() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    let names = vec![
        "example.com".to_string(),
        "www.example.com".to_string(),
        "api.example.com".to_string(),
    ];
    vhost.set_server_name(&names).unwrap();
    assert_eq!(vhost.server_name(), names);

    let exported = vhost.export();
    assert!(exported.contains("ServerName example.com\n    ServerAlias www.example.com api.example.com\n"));

    vhost.set_server_name(&[]).unwrap();
    assert!(vhost.server_name().is_empty());
}

#[test]
fn test_server_name_scenario() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost.set_server_name(&["www.example.com".to_string()]).unwrap();
    assert_eq!(vhost.server_name(), vec!["www.example.com"]);
    assert!(vhost.export().contains("ServerName www.example.com"));
}

#[test]
fn test_root_moves_directory_block() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost.set_root("/var/www/test-dir").unwrap();

    assert_eq!(vhost.root(), "/var/www/test-dir");
    let exported = vhost.export();
    assert!(exported.contains("<Directory /var/www/test-dir>"));
    assert!(exported.contains("</Directory>"));
    assert_eq!(exported.matches("<Directory").count(), 1);
}

#[test]
fn test_root_with_spaces_is_quoted() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost.set_root("/var/www/my site").unwrap();
    assert_eq!(vhost.root(), "/var/www/my site");
    assert!(vhost.export().contains("DocumentRoot \"/var/www/my site\""));
}

#[test]
fn test_index() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    let index = vec!["index.html".to_string(), "index.php".to_string(), "default.html".to_string()];
    vhost.set_index(&index).unwrap();
    assert_eq!(vhost.index(), index);

    vhost.set_index(&[]).unwrap();
    assert!(vhost.index().is_empty());
}

#[test]
fn test_listen() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost
        .set_listen(&[Listen::new("*:80"), Listen::new("443")])
        .unwrap();

    let listens = vhost.listen();
    assert_eq!(listens.len(), 2);
    assert_eq!(listens[0].address, "*:80");
    assert_eq!(listens[1].address, "*:443");
    assert!(vhost.export().contains("<VirtualHost *:80 *:443>"));

    assert!(vhost.set_listen(&[]).is_err());
}

#[test]
fn test_listen_with_protocol_writes_top_level_listen() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost
        .set_listen(&[Listen::with_args("8443", ["https"])])
        .unwrap();

    let exported = vhost.export();
    assert!(exported.starts_with("Listen 8443 https\n"));
    assert!(exported.contains("<VirtualHost *:8443>"));

    let listens = vhost.listen();
    assert_eq!(listens.len(), 1);
    assert_eq!(listens[0].address, "*:8443");
    assert_eq!(listens[0].args, vec!["https"]);
}

#[test]
fn test_listen_survives_ssl() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost.set_listen(&[Listen::new("*:443")]).unwrap();
    vhost.set_ssl_config(&ssl("/etc/ssl/cert.pem", "/etc/ssl/key.pem")).unwrap();

    let listens = vhost.listen();
    assert_eq!(listens.len(), 1);
    assert_eq!(listens[0].address, "*:443");
}

#[test]
fn test_logs() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost.set_access_log("/var/log/apache/access.log").unwrap();
    vhost.set_error_log("/var/log/apache/error.log").unwrap();

    assert_eq!(vhost.access_log(), "/var/log/apache/access.log");
    assert_eq!(vhost.error_log(), "/var/log/apache/error.log");
    assert!(vhost.export().contains("CustomLog /var/log/apache/access.log combined"));
}

#[test]
fn test_includes_with_comments() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    let includes = vec![
        IncludeFile {
            path: "/etc/apache/conf.d/ssl.conf".to_string(),
            comment: vec!["# TLS settings".to_string()],
        },
        IncludeFile::new("/etc/apache/conf.d/php.conf"),
    ];
    vhost.set_includes(&includes).unwrap();
    assert_eq!(vhost.includes(), includes);

    let exported = vhost.export();
    assert!(exported.contains("    # TLS settings\n    IncludeOptional /etc/apache/conf.d/ssl.conf\n"));
    assert!(!exported.contains("# custom configs"));
}

#[test]
fn test_template_include_is_listed() {
    let (_dir, config_dir, vhost) = php_vhost();
    let includes = vhost.includes();
    assert_eq!(includes.len(), 1);
    assert_eq!(PathBuf::from(&includes[0].path), config_dir.join("site").join("*.conf"));
    assert_eq!(includes[0].comment, vec!["# custom configs"]);
}

#[test]
fn test_save_and_reload() {
    let (_dir, config_dir, mut vhost) = php_vhost();
    vhost.set_server_name(&["save-test.com".to_string()]).unwrap();
    vhost.save().unwrap();

    let content = fs::read_to_string(config_dir.join("apache.conf")).unwrap();
    assert!(content.contains("save-test.com"));
    assert!(content.ends_with("</VirtualHost>\n"));

    let reloaded = PhpVhost::new(&config_dir).unwrap();
    assert_eq!(reloaded.server_name(), vec!["save-test.com"]);
    assert_eq!(reloaded.export(), vhost.export());
}

#[test]
fn test_reset() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost.set_server_name(&["modified.com".to_string()]).unwrap();
    vhost.set_root("/modified/path").unwrap();

    vhost.reset().unwrap();
    assert!(!vhost.server_name().contains(&"modified.com".to_string()));
    assert_ne!(vhost.root(), "/modified/path");
}

// ============================================================
// Enable / disable
// ============================================================

#[test]
fn test_enable_round_trip_restores_root() {
    let (_dir, config_dir, mut vhost) = php_vhost();
    let root = vhost.root();
    assert!(vhost.enable());

    vhost.set_enable(false).unwrap();
    assert!(!vhost.enable());
    assert!(config_dir.join("site").join("000-disable.conf").exists());
    assert_eq!(vhost.root(), "/var/www/html");

    // Disabling twice keeps the saved root
    vhost.set_enable(false).unwrap();

    vhost.set_enable(true).unwrap();
    assert!(vhost.enable());
    assert_eq!(vhost.root(), root);
    assert!(vhost.export().contains(&format!("<Directory {root}>")));
}

// ============================================================
// SSL
// ============================================================

#[test]
fn test_ssl_defaults_off() {
    let (_dir, _config_dir, vhost) = php_vhost();
    assert!(!vhost.ssl());
    assert!(vhost.ssl_config().is_none());
}

#[test]
fn test_set_ssl_config() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    let config = SslConfig {
        protocols: vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()],
        hsts: true,
        ocsp: true,
        http_redirect: true,
        alt_svc: "h3=\":443\"; ma=86400".to_string(),
        ..ssl("/etc/ssl/cert.pem", "/etc/ssl/key.pem")
    };
    vhost.set_ssl_config(&config).unwrap();
    assert!(vhost.ssl());

    let got = vhost.ssl_config().unwrap();
    assert_eq!(got.cert, config.cert);
    assert_eq!(got.key, config.key);
    assert_eq!(got.protocols, config.protocols);
    assert!(got.hsts);
    assert!(got.ocsp);
    assert!(got.http_redirect);
    assert!(!got.ciphers.is_empty());

    let exported = vhost.export();
    assert!(exported.contains("SSLEngine on"));
    assert!(exported.contains("SSLCertificateFile /etc/ssl/cert.pem"));
    assert!(exported.contains("SSLProtocol -all +TLSv1.2 +TLSv1.3"));
    assert!(exported.contains("RewriteCond %{HTTPS} off"));
}

#[test]
fn test_set_ssl_config_twice_does_not_duplicate() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    let config = SslConfig {
        hsts: true,
        ..ssl("/etc/ssl/cert.pem", "/etc/ssl/key.pem")
    };
    vhost.set_ssl_config(&config).unwrap();
    vhost.set_ssl_config(&config).unwrap();

    let exported = vhost.export();
    assert_eq!(exported.matches("SSLEngine").count(), 1);
    assert_eq!(exported.matches("Strict-Transport-Security").count(), 1);
}

#[test]
fn test_ssl_requires_cert_and_key() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    let err = vhost.set_ssl_config(&ssl("", "/etc/ssl/key.pem")).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(!vhost.ssl());
}

#[test]
fn test_clear_ssl_preserves_custom_headers() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost
        .vhost_mut()
        .add_directive("Header", ["set", "X-Custom-Header", "value"]);

    let config = SslConfig {
        hsts: true,
        http_redirect: true,
        ..ssl("/etc/ssl/cert.pem", "/etc/ssl/key.pem")
    };
    vhost.set_ssl_config(&config).unwrap();
    vhost.clear_ssl().unwrap();
    assert!(!vhost.ssl());

    let inner = vhost.vhost().unwrap();
    let headers = inner.get_directives("Header");
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].args[1], "X-Custom-Header");
    assert!(!inner.has_directive("RewriteEngine"));
    assert!(!inner.has_directive("SSLCertificateFile"));
}

// ============================================================
// Access control
// ============================================================

#[test]
fn test_rate_limit() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    assert!(vhost.rate_limit().is_none());

    let limit = RateLimit {
        per_server: 100,
        per_ip: 10,
        rate: 512,
    };
    vhost.set_rate_limit(&limit).unwrap();
    assert_eq!(vhost.rate_limit(), Some(limit));
    assert!(vhost.export().contains("<IfModule mod_ratelimit.c>"));

    vhost.set_rate_limit(&RateLimit { rate: 256, ..RateLimit::default() }).unwrap();
    assert_eq!(vhost.rate_limit().unwrap().per_ip, 0);

    vhost.clear_rate_limit().unwrap();
    assert!(vhost.rate_limit().is_none());
}

#[test]
fn test_basic_auth() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    assert!(vhost.basic_auth().is_none());

    let auth = BasicAuth {
        realm: "Test Realm".to_string(),
        user_file: "/etc/htpasswd".to_string(),
    };
    vhost.set_basic_auth(&auth).unwrap();
    assert_eq!(vhost.basic_auth(), Some(auth));
    assert!(vhost.export().contains("AuthName \"Test Realm\""));

    vhost.clear_basic_auth().unwrap();
    assert!(vhost.basic_auth().is_none());
}

#[test]
fn test_basic_auth_defaults_realm() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    vhost
        .set_basic_auth(&BasicAuth {
            realm: String::new(),
            user_file: "/etc/htpasswd".to_string(),
        })
        .unwrap();
    assert_eq!(vhost.basic_auth().unwrap().realm, "Restricted");

    let empty = BasicAuth::default();
    assert!(vhost.set_basic_auth(&empty).is_err());
}

#[test]
fn test_real_ip() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    assert!(vhost.real_ip().is_none());

    let real_ip = RealIp {
        from: vec!["10.0.0.0/8".to_string(), "192.168.0.0/16".to_string()],
        header: "X-Real-IP".to_string(),
        recursive: true,
    };
    vhost.set_real_ip(&real_ip).unwrap();
    assert_eq!(vhost.real_ip(), Some(real_ip));
    assert!(vhost.export().contains("RemoteIPTrustedProxy 10.0.0.0/8 192.168.0.0/16"));

    vhost.clear_real_ip().unwrap();
    assert!(vhost.real_ip().is_none());
    assert!(vhost.set_real_ip(&RealIp::default()).is_err());
}

// ============================================================
// Fragments
// ============================================================

#[test]
fn test_free_form_config() {
    let (_dir, config_dir, mut vhost) = php_vhost();
    vhost.set_config("custom.conf", ConfigScope::Site, "Header set X-A 1\n").unwrap();
    assert!(config_dir.join("site").join("custom.conf").exists());
    assert_eq!(
        vhost.config("custom.conf", ConfigScope::Site).as_deref(),
        Some("Header set X-A 1\n")
    );

    vhost.remove_config("custom.conf", ConfigScope::Site).unwrap();
    assert!(vhost.config("custom.conf", ConfigScope::Site).is_none());
}

#[test]
fn test_php() {
    let (_dir, _config_dir, mut vhost) = php_vhost();
    assert_eq!(vhost.php(), 0);

    vhost.set_php(84).unwrap();
    assert_eq!(vhost.php(), 84);
    let content = vhost.config("010-php.conf", ConfigScope::Site).unwrap();
    assert!(content.contains("proxy:unix:/tmp/php-cgi-84.sock|fcgi://localhost/"));

    vhost.set_php(0).unwrap();
    assert_eq!(vhost.php(), 0);
}

#[test]
fn test_redirects() {
    let (_dir, config_dir, mut vhost) = php_vhost();
    assert!(vhost.redirects().unwrap().is_empty());

    let redirects = vec![
        Redirect {
            kind: RedirectKind::Url,
            from: "/old".to_string(),
            to: "/new".to_string(),
            keep_uri: false,
            status_code: 301,
        },
        Redirect {
            kind: RedirectKind::Host,
            from: "old.example.com".to_string(),
            to: "https://new.example.com".to_string(),
            keep_uri: true,
            status_code: 308,
        },
        Redirect {
            kind: RedirectKind::NotFound,
            to: "/custom-404.html".to_string(),
            ..Redirect::default()
        },
    ];
    vhost.set_redirects(&redirects).unwrap();

    let site = config_dir.join("site");
    assert!(site.join("100-redirect.conf").exists());
    assert!(site.join("102-redirect.conf").exists());
    assert_eq!(vhost.redirects().unwrap(), redirects);

    // Rewriting is idempotent byte for byte
    let before = fs::read_to_string(site.join("101-redirect.conf")).unwrap();
    vhost.set_redirects(&redirects).unwrap();
    assert_eq!(fs::read_to_string(site.join("101-redirect.conf")).unwrap(), before);
}

#[test]
fn test_proxies() {
    let (_dir, config_dir, mut vhost) = proxy_vhost();
    assert!(vhost.proxies().unwrap().is_empty());

    let mut with_replace = Proxy {
        location: "/".to_string(),
        pass: "https://backend:443/".to_string(),
        host: "example.com".to_string(),
        sni: "backend.example.com".to_string(),
        resolver_timeout: Some(Duration::from_secs(10)),
        ..Proxy::default()
    };
    with_replace.replaces.insert(
        "http://old.example.com/path/to/resource".to_string(),
        "https://new.example.com/new/path".to_string(),
    );
    let proxies = vec![
        with_replace,
        Proxy {
            location: "/api".to_string(),
            pass: "http://api-backend:8080/".to_string(),
            buffering: true,
            ..Proxy::default()
        },
    ];
    vhost.set_proxies(&proxies).unwrap();

    let content = fs::read_to_string(config_dir.join("site").join("200-proxy.conf")).unwrap();
    assert!(content.contains("# SNI: backend.example.com"));
    assert!(content.contains(
        "Substitute \"s|http://old.example.com/path/to/resource|https://new.example.com/new/path|n\""
    ));
    assert_eq!(vhost.proxies().unwrap(), proxies);

    vhost.clear_proxies().unwrap();
    assert!(vhost.proxies().unwrap().is_empty());
}

#[test]
fn test_proxy_capacity_leaves_existing_files() {
    let (_dir, config_dir, mut vhost) = proxy_vhost();
    let proxy = Proxy {
        location: "/".to_string(),
        pass: "http://backend/".to_string(),
        ..Proxy::default()
    };
    vhost.set_proxies(&[proxy.clone()]).unwrap();

    let err = vhost.set_proxies(&vec![proxy; 101]).unwrap_err();
    assert!(matches!(err, Error::Capacity { limit: 100, .. }));
    assert!(config_dir.join("site").join("200-proxy.conf").exists());
    assert_eq!(vhost.proxies().unwrap().len(), 1);
}

#[test]
fn test_upstreams() {
    let (_dir, config_dir, mut vhost) = proxy_vhost();
    assert!(vhost.upstreams().unwrap().is_empty());

    let mut upstream = Upstream {
        name: "test_upstream".to_string(),
        algo: "least_conn".to_string(),
        keepalive: 32,
        ..Upstream::default()
    };
    upstream.servers.insert("127.0.0.1:8080".to_string(), String::new());
    upstream.servers.insert("127.0.0.1:8081".to_string(), String::new());
    upstream.servers.insert("127.0.0.1:8082".to_string(), "loadfactor=5".to_string());
    vhost.set_upstreams(&[upstream.clone()]).unwrap();

    let content = fs::read_to_string(config_dir.join("shared").join("100-balancer-test_upstream.conf")).unwrap();
    assert!(content.contains("balancer://test_upstream"));
    assert!(content.contains("lbmethod=bybusyness"));
    assert_eq!(vhost.upstreams().unwrap(), vec![upstream]);

    vhost.clear_upstreams().unwrap();
    assert!(vhost.upstreams().unwrap().is_empty());
}

// ============================================================
// Capabilities
// ============================================================

#[test]
fn test_capabilities() {
    let (_dir, config_dir) = site();

    let mut static_vhost = StaticVhost::new(&config_dir).unwrap();
    assert_eq!(static_vhost.capabilities(), vec![Capability::Redirect]);
    assert!(static_vhost.as_php_mut().is_none());
    assert!(static_vhost.as_proxy().is_none());

    let mut php = PhpVhost::new(&config_dir).unwrap();
    assert_eq!(php.capabilities(), vec![Capability::Php, Capability::Redirect]);
    php.as_php_mut().unwrap().set_php(83).unwrap();
    assert_eq!(php.as_php().unwrap().php(), 83);

    let proxy = ProxyVhost::new(&config_dir).unwrap();
    assert_eq!(proxy.capabilities(), vec![Capability::Redirect, Capability::Proxy]);
    assert!(proxy.as_proxy().unwrap().proxies().unwrap().is_empty());
}
