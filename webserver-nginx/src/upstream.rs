//! Upstream fragments (`NNN-<name>.conf` in the shared dir)

use regex::Regex;
use std::fmt::Write;
use std::path::Path;
use std::sync::LazyLock;

use webserver_core::fragment::{FragmentSet, UPSTREAM_SLOTS};
use webserver_core::{format_duration, parse_duration, Error, Result, Upstream};

use crate::config::parse_str;
use crate::data::GENERATED_HEADER;

/// Directives that select the balancing method
const ALGORITHMS: &[&str] = &["least_conn", "ip_hash", "hash", "random", "least_time"];

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3})-(.+)\.conf$").expect("valid upstream file pattern"));

static VALID_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid upstream name pattern"));

fn fragments(shared_dir: &Path) -> FragmentSet<'static> {
    FragmentSet::new(shared_dir, &FILE_RE, UPSTREAM_SLOTS, "upstream")
}

pub fn load(shared_dir: &Path) -> Result<Vec<Upstream>> {
    fragments(shared_dir).load(decode)
}

/// Replace every upstream fragment. Names are validated before anything is written.
pub fn store(shared_dir: &Path, upstreams: &[Upstream]) -> Result<()> {
    if let Some(bad) = upstreams.iter().find(|u| !VALID_NAME_RE.is_match(&u.name)) {
        return Err(Error::InvalidArgument(format!("invalid upstream name: {:?}", bad.name)));
    }
    fragments(shared_dir).replace(upstreams, |slot, upstream| {
        (format!("{slot:03}-{}.conf", upstream.name), encode(upstream))
    })
}

pub fn clear(shared_dir: &Path) -> Result<()> {
    fragments(shared_dir).clear()
}

pub fn encode(upstream: &Upstream) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{GENERATED_HEADER}");
    let _ = writeln!(out, "# Upstream: {}", upstream.name);
    let _ = writeln!(out, "upstream {} {{", upstream.name);

    if !upstream.algo.is_empty() {
        let _ = writeln!(out, "    {};", upstream.algo);
    }
    for (addr, options) in &upstream.servers {
        if options.is_empty() {
            let _ = writeln!(out, "    server {addr};");
        } else {
            let _ = writeln!(out, "    server {addr} {options};");
        }
    }
    if upstream.keepalive > 0 {
        let _ = writeln!(out, "    keepalive {};", upstream.keepalive);
    }
    if !upstream.resolver.is_empty() {
        let _ = writeln!(out, "    resolver {};", upstream.resolver.join(" "));
        if let Some(timeout) = upstream.resolver_timeout.filter(|t| !t.is_zero()) {
            let _ = writeln!(out, "    resolver_timeout {};", format_duration(timeout));
        }
    }

    out.push_str("}\n");
    out
}

pub fn decode(content: &str) -> Option<Upstream> {
    let config = parse_str(content).ok()?;
    let directive = config
        .directives
        .iter()
        .find(|d| d.name == "upstream" && d.block.is_some())?;
    let block = directive.block.as_ref()?;

    let mut upstream = Upstream {
        name: directive.value()?.to_string(),
        ..Upstream::default()
    };

    for d in &block.directives {
        match (d.name.as_str(), d.args.as_slice()) {
            ("server", [addr, options @ ..]) => {
                upstream.servers.insert(addr.clone(), options.join(" "));
            }
            ("keepalive", [n]) => upstream.keepalive = n.parse().unwrap_or(0),
            ("resolver", resolvers) => upstream.resolver = resolvers.to_vec(),
            ("resolver_timeout", [timeout]) => upstream.resolver_timeout = parse_duration(timeout),
            (name, args) if ALGORITHMS.contains(&name) => {
                upstream.algo = std::iter::once(name.to_string())
                    .chain(args.iter().cloned())
                    .collect::<Vec<_>>()
                    .join(" ");
            }
            _ => {}
        }
    }

    Some(upstream)
}
