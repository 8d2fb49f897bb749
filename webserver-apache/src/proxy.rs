//! Reverse-proxy fragments (`NNN-proxy.conf` in the site dir)
//!
//! Apache has no per-location resolver, so `resolver` is not stored and
//! `resolver_timeout` maps to `ProxyTimeout`. Of the cache settings only
//! the default expiry and the lock survive a round trip.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use webserver_core::fragment::{FragmentSet, PROXY_SLOTS};
use webserver_core::{format_duration, parse_duration, CacheConfig, Proxy, Result};

use crate::data::GENERATED_HEADER;

/// Expiry used when a cache config has no parsable `valid` entry
const DEFAULT_CACHE_EXPIRE: u64 = 600;

/// Headers every proxy fragment sets
const STANDARD_HEADERS: &[(&str, &str)] = &[
    ("X-Real-IP", "%{REMOTE_ADDR}e"),
    ("X-Forwarded-For", "%{X-Forwarded-For}e"),
    ("X-Forwarded-Proto", "%{REQUEST_SCHEME}e"),
];

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3})-proxy\.conf$").expect("valid proxy file pattern"));

static PASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*ProxyPass\s+(\S+)\s+(\S+)").expect("valid ProxyPass pattern")
});

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*RequestHeader\s+set\s+(\S+)\s+"((?:[^"\\]|\\.)*)""#).expect("valid RequestHeader pattern")
});

static SNI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#\s*SNI:\s*(\S+)").expect("valid SNI pattern"));

static TIMEOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*ProxyTimeout\s+(\d+)").expect("valid ProxyTimeout pattern"));

static BUFFER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*ProxyIOBufferSize\s+\d+").expect("valid buffer pattern"));

static CACHE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*CacheEnable\s+\S+").expect("valid CacheEnable pattern"));

static CACHE_EXPIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*CacheDefaultExpire\s+(\d+)").expect("valid CacheDefaultExpire pattern")
});

static CACHE_LOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*CacheLock\s+on\b").expect("valid CacheLock pattern"));

static SUBSTITUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*Substitute\s+"s\|([^|]*)\|([^|]*)\|[a-z]*""#).expect("valid Substitute pattern")
});

fn fragments(site_dir: &Path) -> FragmentSet<'static> {
    FragmentSet::new(site_dir, &FILE_RE, PROXY_SLOTS, "proxy")
}

pub fn load(site_dir: &Path) -> Result<Vec<Proxy>> {
    fragments(site_dir).load(decode)
}

pub fn store(site_dir: &Path, proxies: &[Proxy]) -> Result<()> {
    fragments(site_dir).replace(proxies, |slot, proxy| (format!("{slot:03}-proxy.conf"), encode(proxy)))
}

pub fn clear(site_dir: &Path) -> Result<()> {
    fragments(site_dir).clear()
}

pub fn encode(proxy: &Proxy) -> String {
    let location = if proxy.location.is_empty() { "/" } else { proxy.location.as_str() };
    let mut out = String::new();

    let _ = writeln!(out, "{GENERATED_HEADER}");
    let _ = writeln!(out, "# Reverse proxy: {location} -> {}", proxy.pass);
    out.push_str("<IfModule mod_proxy.c>\n");
    let _ = writeln!(out, "    ProxyPass {location} {}", proxy.pass);
    let _ = writeln!(out, "    ProxyPassReverse {location} {}", proxy.pass);

    if proxy.host.is_empty() {
        out.push_str("    ProxyPreserveHost On\n");
    } else {
        let _ = writeln!(out, "    RequestHeader set Host \"{}\"", escape_quoted(&proxy.host));
    }
    for (name, value) in STANDARD_HEADERS {
        let _ = writeln!(out, "    RequestHeader set {name} \"{value}\"");
    }
    for (name, value) in &proxy.headers {
        let _ = writeln!(out, "    RequestHeader set {name} \"{}\"", escape_quoted(value));
    }

    if !proxy.sni.is_empty() || proxy.pass.starts_with("https://") {
        if !proxy.sni.is_empty() {
            let _ = writeln!(out, "    # SNI: {}", proxy.sni);
        }
        out.push_str("    SSLProxyEngine On\n");
        out.push_str("    SSLProxyVerify none\n");
        out.push_str("    SSLProxyCheckPeerCN off\n");
        out.push_str("    SSLProxyCheckPeerName off\n");
    }

    if proxy.buffering {
        out.push_str("    ProxyIOBufferSize 65536\n");
    }
    if let Some(timeout) = proxy.resolver_timeout.filter(|t| t.as_secs() > 0) {
        let _ = writeln!(out, "    ProxyTimeout {}", timeout.as_secs());
    }

    if let Some(cache) = &proxy.cache {
        let expire = cache
            .valid
            .values()
            .find_map(|v| parse_duration(v))
            .map(|d| d.as_secs())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_CACHE_EXPIRE);
        out.push_str("    <IfModule mod_cache.c>\n");
        let _ = writeln!(out, "        CacheEnable disk {location}");
        let _ = writeln!(out, "        CacheDefaultExpire {expire}");
        if cache.lock {
            out.push_str("        CacheLock on\n");
        }
        out.push_str("    </IfModule>\n");
    }

    if !proxy.replaces.is_empty() {
        out.push_str("    <IfModule mod_substitute.c>\n");
        out.push_str("        AddOutputFilterByType SUBSTITUTE text/html text/plain text/xml\n");
        for (from, to) in &proxy.replaces {
            let _ = writeln!(out, "        Substitute \"s|{from}|{to}|n\"");
        }
        out.push_str("    </IfModule>\n");
    }

    out.push_str("</IfModule>\n");
    out
}

/// Body of a double-quoted Apache argument
fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

pub fn decode(content: &str) -> Option<Proxy> {
    let caps = PASS_RE.captures(content)?;
    let mut proxy = Proxy {
        location: caps[1].to_string(),
        pass: caps[2].to_string(),
        ..Proxy::default()
    };

    let mut headers = BTreeMap::new();
    for caps in HEADER_RE.captures_iter(content) {
        let (name, value) = (&caps[1], unescape_quoted(&caps[2]));
        if name.eq_ignore_ascii_case("Host") {
            proxy.host = value;
        } else if !STANDARD_HEADERS.iter().any(|(n, v)| *n == name && *v == value) {
            headers.insert(name.to_string(), value);
        }
    }
    proxy.headers = headers;

    if let Some(caps) = SNI_RE.captures(content) {
        proxy.sni = caps[1].to_string();
    }
    proxy.buffering = BUFFER_RE.is_match(content);
    proxy.resolver_timeout = TIMEOUT_RE
        .captures(content)
        .and_then(|c| c[1].parse().ok())
        .map(Duration::from_secs);

    if CACHE_RE.is_match(content) {
        let expire = CACHE_EXPIRE_RE
            .captures(content)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(DEFAULT_CACHE_EXPIRE);
        let mut cache = CacheConfig {
            lock: CACHE_LOCK_RE.is_match(content),
            ..CacheConfig::default()
        };
        cache
            .valid
            .insert("any".to_string(), format_duration(Duration::from_secs(expire)));
        proxy.cache = Some(cache);
    }

    proxy.replaces = SUBSTITUTE_RE
        .captures_iter(content)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();

    Some(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Proxy {
        let mut proxy = Proxy {
            location: "/api".to_string(),
            pass: "https://backend.internal:8443".to_string(),
            host: "api.example.com".to_string(),
            sni: "backend.internal".to_string(),
            buffering: true,
            resolver_timeout: Some(Duration::from_secs(30)),
            ..Proxy::default()
        };
        proxy.headers.insert("X-Custom".to_string(), "yes".to_string());
        proxy.replaces.insert("http://old".to_string(), "https://new".to_string());
        proxy
    }

    #[test]
    fn test_encode() {
        let content = encode(&sample());
        assert!(content.starts_with(GENERATED_HEADER));
        assert!(content.contains("    ProxyPass /api https://backend.internal:8443\n"));
        assert!(content.contains("    ProxyPassReverse /api https://backend.internal:8443\n"));
        assert!(content.contains("    RequestHeader set Host \"api.example.com\"\n"));
        assert!(content.contains("    # SNI: backend.internal\n    SSLProxyEngine On\n"));
        assert!(content.contains("    ProxyIOBufferSize 65536\n"));
        assert!(content.contains("    ProxyTimeout 30\n"));
        assert!(content.contains("        Substitute \"s|http://old|https://new|n\"\n"));
        assert!(!content.contains("ProxyPreserveHost"));
    }

    #[test]
    fn test_decode_round_trip() {
        let proxy = sample();
        assert_eq!(decode(&encode(&proxy)), Some(proxy));
    }

    #[test]
    fn test_header_quotes_survive_round_trip() {
        let mut proxy = sample();
        proxy.headers.insert("X-Quote".to_string(), r#"say "hi""#.to_string());
        proxy.headers.insert("X-Path".to_string(), r"C:\dir".to_string());
        proxy.host = r#"a"b"#.to_string();

        let content = encode(&proxy);
        assert!(content.contains(r#"    RequestHeader set X-Quote "say \"hi\"""#));
        assert!(content.contains(r#"    RequestHeader set X-Path "C:\\dir""#));
        assert_eq!(decode(&content), Some(proxy));
    }

    #[test]
    fn test_minimal_proxy() {
        let proxy = Proxy {
            location: "/".to_string(),
            pass: "http://127.0.0.1:3000".to_string(),
            ..Proxy::default()
        };
        let content = encode(&proxy);
        assert!(content.contains("ProxyPreserveHost On"));
        assert!(!content.contains("SSLProxyEngine"));
        assert_eq!(decode(&content), Some(proxy));
    }

    #[test]
    fn test_cache_is_lossy_but_stable() {
        let mut cache = CacheConfig {
            lock: true,
            ..CacheConfig::default()
        };
        cache.valid.insert("200 302".to_string(), "10m".to_string());
        let proxy = Proxy {
            location: "/".to_string(),
            pass: "http://127.0.0.1:3000".to_string(),
            cache: Some(cache),
            ..Proxy::default()
        };

        let content = encode(&proxy);
        assert!(content.contains("CacheDefaultExpire 600\n"));
        assert!(content.contains("CacheLock on\n"));

        let decoded = decode(&content).unwrap();
        let cache = decoded.cache.clone().unwrap();
        assert_eq!(cache.valid.get("any").map(String::as_str), Some("600s"));
        assert!(cache.lock);
        assert_eq!(encode(&decoded), content);
    }

    #[test]
    fn test_decode_without_proxy_pass() {
        assert_eq!(decode("# empty\n"), None);
    }

    #[test]
    fn test_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = Proxy {
            location: "/".to_string(),
            pass: "http://127.0.0.1".to_string(),
            ..Proxy::default()
        };
        store(dir.path(), &[proxy.clone()]).unwrap();

        let too_many = vec![proxy; 101];
        assert!(store(dir.path(), &too_many).is_err());
        assert_eq!(load(dir.path()).unwrap().len(), 1);
        assert!(dir.path().join("200-proxy.conf").exists());
    }
}
