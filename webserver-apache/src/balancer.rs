//! Load-balancer fragments (`NNN-balancer-<name>.conf` in the shared dir)
//!
//! Apache's equivalent of an Nginx `upstream`: a `<Proxy balancer://name>`
//! section with one `BalancerMember` per server. mod_proxy has no resolver
//! setting, so `resolver` / `resolver_timeout` are kept as comments.

use regex::Regex;
use std::fmt::Write;
use std::path::Path;
use std::sync::LazyLock;

use webserver_core::fragment::{FragmentSet, UPSTREAM_SLOTS};
use webserver_core::{format_duration, parse_duration, Error, Result, Upstream};

use crate::data::GENERATED_HEADER;

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3})-balancer-(.+)\.conf$").expect("valid balancer file pattern"));

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<Proxy\s+balancer://([A-Za-z0-9_.-]+)\s*>").expect("valid balancer name pattern")
});

static MEMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*BalancerMember\s+(\S+)[ \t]*([^\n]*)$").expect("valid BalancerMember pattern")
});

static LBMETHOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"lbmethod=(\S+)").expect("valid lbmethod pattern"));

static MAX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*ProxySet\s+max=(\d+)").expect("valid ProxySet max pattern"));

static RESOLVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#\s*resolver:[ \t]*([^\n]*)$").expect("valid resolver comment pattern"));

static RESOLVER_TIMEOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*#\s*resolver_timeout:\s*(\S+)").expect("valid resolver_timeout comment pattern")
});

static VALID_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid upstream name pattern"));

fn fragments(shared_dir: &Path) -> FragmentSet<'static> {
    FragmentSet::new(shared_dir, &FILE_RE, UPSTREAM_SLOTS, "balancer")
}

pub fn load(shared_dir: &Path) -> Result<Vec<Upstream>> {
    fragments(shared_dir).load(decode)
}

/// Replace every balancer fragment. Names are validated before anything is written.
pub fn store(shared_dir: &Path, upstreams: &[Upstream]) -> Result<()> {
    for upstream in upstreams {
        if !VALID_NAME_RE.is_match(&upstream.name) {
            return Err(Error::InvalidArgument(format!("invalid upstream name: {:?}", upstream.name)));
        }
    }
    fragments(shared_dir).replace(upstreams, |slot, upstream| {
        (format!("{slot:03}-balancer-{}.conf", upstream.name), encode(upstream))
    })
}

pub fn clear(shared_dir: &Path) -> Result<()> {
    fragments(shared_dir).clear()
}

fn lbmethod(algo: &str) -> &'static str {
    match algo {
        "least_conn" | "bybusyness" => "bybusyness",
        "bytraffic" => "bytraffic",
        "heartbeat" => "heartbeat",
        _ => "byrequests",
    }
}

fn algo(lbmethod: &str) -> &str {
    match lbmethod {
        "bybusyness" => "least_conn",
        "byrequests" => "",
        other => other,
    }
}

pub fn encode(upstream: &Upstream) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{GENERATED_HEADER}");
    let _ = writeln!(out, "# Load balancer: {}", upstream.name);
    if !upstream.resolver.is_empty() {
        tracing::debug!("balancer {} keeps its resolver as a comment", upstream.name);
        let _ = writeln!(out, "# resolver: {}", upstream.resolver.join(" "));
        if let Some(timeout) = upstream.resolver_timeout.filter(|t| !t.is_zero()) {
            let _ = writeln!(out, "# resolver_timeout: {}", format_duration(timeout));
        }
    }
    out.push_str("<IfModule mod_proxy_balancer.c>\n");
    let _ = writeln!(out, "    <Proxy balancer://{}>", upstream.name);

    for (addr, options) in &upstream.servers {
        if options.is_empty() {
            let _ = writeln!(out, "        BalancerMember {addr}");
        } else {
            let _ = writeln!(out, "        BalancerMember {addr} {options}");
        }
    }

    let _ = writeln!(out, "        ProxySet lbmethod={}", lbmethod(&upstream.algo));
    if upstream.keepalive > 0 {
        let _ = writeln!(out, "        ProxySet max={}", upstream.keepalive);
    }

    out.push_str("    </Proxy>\n");
    out.push_str("</IfModule>\n");
    out
}

pub fn decode(content: &str) -> Option<Upstream> {
    let name = NAME_RE.captures(content)?[1].to_string();
    let servers = MEMBER_RE
        .captures_iter(content)
        .map(|c| (c[1].to_string(), c[2].trim().to_string()))
        .collect();
    let algo = LBMETHOD_RE
        .captures(content)
        .map(|c| algo(&c[1]).to_string())
        .unwrap_or_default();
    let keepalive = MAX_RE
        .captures(content)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let resolver: Vec<String> = RESOLVER_RE
        .captures(content)
        .map(|c| c[1].split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let resolver_timeout = if resolver.is_empty() {
        None
    } else {
        RESOLVER_TIMEOUT_RE.captures(content).and_then(|c| parse_duration(&c[1]))
    };

    Some(Upstream {
        name,
        servers,
        algo,
        keepalive,
        resolver,
        resolver_timeout,
    })
}
