//! Reverse-proxy fragments (`NNN-proxy.conf` in the site dir)
//!
//! Each fragment is one `location` block. Forwarding headers the encoder
//! always writes are skipped on decode so only caller headers come back.

use regex::Regex;
use std::fmt::Write;
use std::path::Path;
use std::sync::LazyLock;

use webserver_core::fragment::{FragmentSet, PROXY_SLOTS};
use webserver_core::{format_duration, parse_duration, CacheConfig, Proxy, Result};

use crate::config::{parse_str, unquote, Block, Directive};
use crate::data::GENERATED_HEADER;

/// Cache zone every proxy fragment refers to
const CACHE_ZONE: &str = "proxy_cache";

const STANDARD_HEADERS: &[(&str, &str)] = &[
    ("X-Real-IP", "$remote_addr"),
    ("X-Forwarded-For", "$proxy_add_x_forwarded_for"),
    ("X-Forwarded-Proto", "$scheme"),
    ("Upgrade", "$http_upgrade"),
    ("Connection", "$connection_upgrade"),
    ("Early-Data", "$ssl_early_data"),
];

/// Headers owned by the encoder, never reported as custom headers
const RESERVED_HEADERS: &[&str] = &[
    "Host",
    "X-Real-IP",
    "X-Forwarded-For",
    "X-Forwarded-Proto",
    "Upgrade",
    "Connection",
    "Early-Data",
    "Accept-Encoding",
];

/// Host header values that mean "keep the upstream host"
const UPSTREAM_HOSTS: &[&str] = &["$proxy_host", "$host", "$http_host"];

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3})-proxy\.conf$").expect("valid proxy file pattern"));

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

/// Double-quote a value, falling back to single quotes when it holds `"`
fn quote(value: &str) -> String {
    if value.contains('"') {
        format!("'{value}'")
    } else {
        format!("\"{value}\"")
    }
}

/// Variables go in bare, literals quoted
fn header_value(value: &str) -> String {
    if value.starts_with('$') && !value.contains(char::is_whitespace) {
        value.to_string()
    } else {
        quote(value)
    }
}

pub fn encode(proxy: &Proxy) -> String {
    let location = if proxy.location.is_empty() { "/" } else { proxy.location.as_str() };
    let mut out = String::new();

    let _ = writeln!(out, "{GENERATED_HEADER}");
    let _ = writeln!(out, "# Reverse proxy: {location} -> {}", proxy.pass);
    let _ = writeln!(out, "location {location} {{");

    if !proxy.resolver.is_empty() {
        let _ = writeln!(out, "    resolver {};", proxy.resolver.join(" "));
        if let Some(timeout) = proxy.resolver_timeout.filter(|t| !t.is_zero()) {
            let _ = writeln!(out, "    resolver_timeout {};", format_duration(timeout));
        }
    }

    let _ = writeln!(out, "    proxy_pass {};", proxy.pass);
    out.push_str("    proxy_http_version 1.1;\n");
    if proxy.host.is_empty() {
        out.push_str("    proxy_set_header Host $proxy_host;\n");
    } else {
        let _ = writeln!(out, "    proxy_set_header Host {};", quote(&proxy.host));
    }
    for (name, value) in STANDARD_HEADERS {
        let _ = writeln!(out, "    proxy_set_header {name} {value};");
    }

    if proxy.pass.starts_with("https://") {
        out.push_str("    proxy_ssl_protocols TLSv1.2 TLSv1.3;\n");
        out.push_str("    proxy_ssl_session_reuse off;\n");
        out.push_str("    proxy_ssl_server_name on;\n");
        let sni = if proxy.sni.is_empty() { "$proxy_host" } else { proxy.sni.as_str() };
        let _ = writeln!(out, "    proxy_ssl_name {sni};");
    }

    let buffering = if proxy.buffering { "on" } else { "off" };
    let _ = writeln!(out, "    proxy_buffering {buffering};");

    if let Some(cache) = &proxy.cache {
        encode_cache(&mut out, cache);
    }

    for (name, value) in &proxy.headers {
        let _ = writeln!(out, "    proxy_set_header {name} {};", header_value(value));
    }

    if !proxy.replaces.is_empty() {
        out.push_str("    proxy_set_header Accept-Encoding \"\";\n");
        out.push_str("    sub_filter_once off;\n");
        for (from, to) in &proxy.replaces {
            let _ = writeln!(out, "    sub_filter {} {};", quote(from), quote(to));
        }
    }

    out.push_str("}\n");
    out
}

fn encode_cache(out: &mut String, cache: &CacheConfig) {
    let _ = writeln!(out, "    proxy_cache {CACHE_ZONE};");
    if !cache.key.is_empty() {
        let _ = writeln!(out, "    proxy_cache_key {};", quote(&cache.key));
    }
    if cache.valid.is_empty() {
        out.push_str("    proxy_cache_valid 200 302 10m;\n");
        out.push_str("    proxy_cache_valid 404 1m;\n");
    }
    for (codes, time) in &cache.valid {
        if codes.is_empty() {
            let _ = writeln!(out, "    proxy_cache_valid {time};");
        } else {
            let _ = writeln!(out, "    proxy_cache_valid {codes} {time};");
        }
    }
    if !cache.no_cache_conditions.is_empty() {
        let conditions = cache.no_cache_conditions.join(" ");
        let _ = writeln!(out, "    proxy_no_cache {conditions};");
        let _ = writeln!(out, "    proxy_cache_bypass {conditions};");
    }
    if !cache.use_stale.is_empty() {
        let _ = writeln!(out, "    proxy_cache_use_stale {};", cache.use_stale.join(" "));
    }
    if cache.background_update {
        out.push_str("    proxy_cache_background_update on;\n");
    }
    if cache.lock {
        out.push_str("    proxy_cache_lock on;\n");
    }
    if cache.min_uses > 0 {
        let _ = writeln!(out, "    proxy_cache_min_uses {};", cache.min_uses);
    }
    if !cache.methods.is_empty() {
        let _ = writeln!(out, "    proxy_cache_methods {};", cache.methods.join(" "));
    }
}

pub fn decode(content: &str) -> Option<Proxy> {
    let config = parse_str(content).ok()?;
    let location = config
        .directives
        .iter()
        .find(|d| d.name == "location" && d.block.is_some())?;
    let block = location.block.as_ref()?;

    let mut proxy = Proxy {
        location: location.args.join(" "),
        pass: block.find("proxy_pass").first()?.value()?.to_string(),
        ..Proxy::default()
    };

    for directive in &block.directives {
        let args = unquoted(directive);
        match (directive.name.as_str(), args.as_slice()) {
            ("proxy_set_header", [name, value]) if name.eq_ignore_ascii_case("Host") => {
                if !UPSTREAM_HOSTS.contains(&value.as_str()) {
                    proxy.host = value.clone();
                }
            }
            ("proxy_set_header", [name, value]) => {
                if !RESERVED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                    proxy.headers.insert(name.clone(), value.clone());
                }
            }
            ("proxy_ssl_name", [sni]) if sni != "$proxy_host" => proxy.sni = sni.clone(),
            ("proxy_buffering", [flag]) => proxy.buffering = flag == "on",
            ("resolver", resolvers) => proxy.resolver = resolvers.to_vec(),
            ("resolver_timeout", [timeout]) => proxy.resolver_timeout = parse_duration(timeout),
            ("sub_filter", [from, to]) => {
                proxy.replaces.insert(from.clone(), to.clone());
            }
            _ => {}
        }
    }

    proxy.cache = decode_cache(block);
    Some(proxy)
}

fn unquoted(directive: &Directive) -> Vec<String> {
    directive.args.iter().map(|a| unquote(a).to_string()).collect()
}

fn decode_cache(block: &Block) -> Option<CacheConfig> {
    let zone = block.find("proxy_cache").first()?.value()?.to_string();
    if zone == "off" {
        return None;
    }

    let mut cache = CacheConfig::default();
    for directive in &block.directives {
        let args = unquoted(directive);
        match (directive.name.as_str(), args.as_slice()) {
            ("proxy_cache_key", [key]) => cache.key = key.clone(),
            ("proxy_cache_valid", [codes @ .., time]) => {
                cache.valid.insert(codes.join(" "), time.clone());
            }
            ("proxy_no_cache", conditions) => cache.no_cache_conditions = conditions.to_vec(),
            ("proxy_cache_use_stale", stale) => cache.use_stale = stale.to_vec(),
            ("proxy_cache_background_update", [flag]) => cache.background_update = flag == "on",
            ("proxy_cache_lock", [flag]) => cache.lock = flag == "on",
            ("proxy_cache_min_uses", [uses]) => cache.min_uses = uses.parse().unwrap_or(0),
            ("proxy_cache_methods", methods) => cache.methods = methods.to_vec(),
            _ => {}
        }
    }
    Some(cache)
}
