//! Redirect fragments (`NNN-redirect.conf` in the site dir)

use regex::Regex;
use std::fmt::Write;
use std::path::Path;
use std::sync::LazyLock;

use webserver_core::fragment::{FragmentSet, REDIRECT_SLOTS};
use webserver_core::{Redirect, RedirectKind, Result};

use crate::config::{parse_str, unquote, Block, Directive};
use crate::data::GENERATED_HEADER;

/// Named location that serves 404 redirects
const NOT_FOUND_LOCATION: &str = "@redirect_404";

/// Suffix appended to the target when the request URI is kept
const KEEP_URI_SUFFIX: &str = "$1$is_args$args";
const KEEP_HOST_URI_SUFFIX: &str = "$request_uri";

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3})-redirect\.conf$").expect("valid redirect file pattern"));

fn fragments(site_dir: &Path) -> FragmentSet<'static> {
    FragmentSet::new(site_dir, &FILE_RE, REDIRECT_SLOTS, "redirect")
}

/// Redirects stored in the site dir, in slot order
pub fn load(site_dir: &Path) -> Result<Vec<Redirect>> {
    fragments(site_dir).load(decode)
}

/// Replace every redirect fragment with `redirects`
pub fn store(site_dir: &Path, redirects: &[Redirect]) -> Result<()> {
    fragments(site_dir).replace(redirects, |slot, redirect| {
        (format!("{slot:03}-redirect.conf"), encode(redirect))
    })
}

pub fn encode(redirect: &Redirect) -> String {
    let status = redirect.status();
    let mut out = String::new();
    let _ = writeln!(out, "{GENERATED_HEADER}");

    match redirect.kind {
        RedirectKind::Url => {
            let _ = writeln!(out, "# URL redirect: {} -> {}", redirect.from, redirect.to);
            if redirect.keep_uri {
                let from = redirect.from.trim_start_matches('^');
                let _ = writeln!(out, "location ~ ^{from}(.*)$ {{");
                let _ = writeln!(out, "    return {status} {}{KEEP_URI_SUFFIX};", redirect.to);
            } else {
                let _ = writeln!(out, "location = {} {{", redirect.from);
                let _ = writeln!(out, "    return {status} {};", redirect.to);
            }
            out.push_str("}\n");
        }
        RedirectKind::Host => {
            let _ = writeln!(out, "# Host redirect: {} -> {}", redirect.from, redirect.to);
            let _ = writeln!(out, "if ($host = \"{}\") {{", redirect.from);
            let suffix = if redirect.keep_uri { KEEP_HOST_URI_SUFFIX } else { "" };
            let _ = writeln!(out, "    return {status} {}{suffix};", redirect.to);
            out.push_str("}\n");
        }
        RedirectKind::NotFound => {
            let _ = writeln!(out, "# 404 redirect -> {}", redirect.to);
            let _ = writeln!(out, "error_page 404 = {NOT_FOUND_LOCATION};");
            let _ = writeln!(out, "location {NOT_FOUND_LOCATION} {{");
            let _ = writeln!(out, "    return {status} {};", redirect.to);
            out.push_str("}\n");
        }
    }

    out
}

pub fn decode(content: &str) -> Option<Redirect> {
    let config = parse_str(content).ok()?;
    config.directives.iter().find_map(decode_directive)
}

fn decode_directive(directive: &Directive) -> Option<Redirect> {
    let block = directive.block.as_ref()?;
    match (directive.name.as_str(), directive.args.as_slice()) {
        ("location", [op, from]) if op == "=" => {
            let (status_code, to) = return_of(block)?;
            Some(Redirect {
                kind: RedirectKind::Url,
                from: from.clone(),
                to,
                keep_uri: false,
                status_code,
            })
        }
        ("location", [op, pattern]) if op == "~" => {
            let from = pattern.strip_prefix('^')?.strip_suffix("(.*)$")?;
            let (status_code, to) = return_of(block)?;
            let (to, keep_uri) = match to.strip_suffix(KEEP_URI_SUFFIX) {
                Some(base) => (base.to_string(), true),
                None => (to, false),
            };
            Some(Redirect {
                kind: RedirectKind::Url,
                from: from.to_string(),
                to,
                keep_uri,
                status_code,
            })
        }
        ("location", [name]) if name == NOT_FOUND_LOCATION => {
            let (status_code, to) = return_of(block)?;
            Some(Redirect {
                kind: RedirectKind::NotFound,
                from: String::new(),
                to,
                keep_uri: false,
                status_code,
            })
        }
        ("if", [var, op, host]) if var == "($host" && op == "=" => {
            let host = unquote(host.strip_suffix(')')?);
            let (status_code, to) = return_of(block)?;
            let (to, keep_uri) = match to.strip_suffix(KEEP_HOST_URI_SUFFIX) {
                Some(base) => (base.to_string(), true),
                None => (to, false),
            };
            Some(Redirect {
                kind: RedirectKind::Host,
                from: host.to_string(),
                to,
                keep_uri,
                status_code,
            })
        }
        _ => None,
    }
}

/// Status and target of the block's `return`
fn return_of(block: &Block) -> Option<(u16, String)> {
    let directive = block.find("return").into_iter().next()?;
    match directive.args.as_slice() {
        [code, to] => Some((code.parse().ok()?, unquote(to).to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect(kind: RedirectKind, from: &str, to: &str, keep_uri: bool) -> Redirect {
        Redirect {
            kind,
            from: from.to_string(),
            to: to.to_string(),
            keep_uri,
            status_code: 301,
        }
    }

    #[test]
    fn test_url_redirect() {
        let r = redirect(RedirectKind::Url, "/old", "/new", false);
        let content = encode(&r);
        assert!(content.starts_with(GENERATED_HEADER));
        assert!(content.contains("location = /old {\n    return 301 /new;\n}\n"));
        assert_eq!(decode(&content), Some(r));
    }

    #[test]
    fn test_url_redirect_keep_uri() {
        let r = redirect(RedirectKind::Url, "/docs", "https://docs.example.com", true);
        let content = encode(&r);
        assert!(content.contains("location ~ ^/docs(.*)$ {\n    return 301 https://docs.example.com$1$is_args$args;\n}"));
        assert_eq!(decode(&content), Some(r));
    }

    #[test]
    fn test_host_redirect() {
        let r = redirect(RedirectKind::Host, "old.example.com", "https://new.example.com", true);
        let content = encode(&r);
        assert!(content.contains("if ($host = \"old.example.com\") {\n    return 301 https://new.example.com$request_uri;\n}"));
        assert_eq!(decode(&content), Some(r));

        let plain = redirect(RedirectKind::Host, "a.com", "https://b.com", false);
        assert_eq!(decode(&encode(&plain)), Some(plain));
    }

    #[test]
    fn test_not_found_redirect() {
        let r = Redirect {
            kind: RedirectKind::NotFound,
            to: "/".to_string(),
            status_code: 302,
            ..Redirect::default()
        };
        let content = encode(&r);
        assert!(content.contains("error_page 404 = @redirect_404;\n"));
        assert_eq!(decode(&content), Some(r));
    }

    #[test]
    fn test_default_status() {
        let r = Redirect {
            status_code: 0,
            ..redirect(RedirectKind::Url, "/a", "/b", false)
        };
        assert!(encode(&r).contains("return 308 /b;"));
    }

    #[test]
    fn test_unparsable_content() {
        assert_eq!(decode("# nothing\nserver_name a.com;\n"), None);
        assert_eq!(decode("location = /x {"), None);
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let redirects = vec![
            redirect(RedirectKind::Url, "/a", "/b", false),
            redirect(RedirectKind::Host, "x.com", "https://y.com", true),
        ];
        store(dir.path(), &redirects).unwrap();
        assert!(dir.path().join("100-redirect.conf").exists());
        assert!(dir.path().join("101-redirect.conf").exists());
        assert_eq!(load(dir.path()).unwrap(), redirects);

        let first = std::fs::read(dir.path().join("100-redirect.conf")).unwrap();
        store(dir.path(), &redirects).unwrap();
        assert_eq!(std::fs::read(dir.path().join("100-redirect.conf")).unwrap(), first);
    }
}
