//! Redirect fragments (`NNN-redirect.conf` in the site dir)

use regex::Regex;
use std::fmt::Write;
use std::path::Path;
use std::sync::LazyLock;

use webserver_core::fragment::{FragmentSet, REDIRECT_SLOTS};
use webserver_core::{Redirect, RedirectKind, Result, DEFAULT_REDIRECT_STATUS};

use crate::data::GENERATED_HEADER;

static FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3})-redirect\.conf$").expect("valid redirect file pattern"));

static REDIRECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Redirect\s+(\d{3})\s+(\S+)\s+(\S+)").expect("valid Redirect pattern")
});

static REDIRECT_MATCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*RedirectMatch\s+(\d{3})\s+(\S+)\s+(\S+)").expect("valid RedirectMatch pattern")
});

static HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"RewriteCond\s+%\{HTTP_HOST\}\s+\^?([^$\s]+)\$?\s*(?:\[NC\])?\s*\n\s*RewriteRule\s+\^\(\.\*\)\$\s+([^\s\[]+)\s*\[R=(\d{3})",
    )
    .expect("valid host redirect pattern")
});

static NOT_FOUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*ErrorDocument\s+404\s+(\S+)").expect("valid ErrorDocument pattern")
});

static NOT_FOUND_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\s*404 redirect \((\d{3})\)").expect("valid 404 status pattern")
});

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
                let mut from = if redirect.from.starts_with('^') {
                    redirect.from.clone()
                } else {
                    format!("^{}", redirect.from)
                };
                if !from.ends_with('$') {
                    from.push_str("(.*)$");
                }
                let to = if redirect.to.ends_with("$1") {
                    redirect.to.clone()
                } else {
                    format!("{}$1", redirect.to)
                };
                let _ = writeln!(out, "RedirectMatch {status} {from} {to}");
            } else {
                let _ = writeln!(out, "Redirect {status} {} {}", redirect.from, redirect.to);
            }
        }
        RedirectKind::Host => {
            let _ = writeln!(out, "# Host redirect: {} -> {}", redirect.from, redirect.to);
            out.push_str("RewriteEngine on\n");
            let _ = writeln!(out, "RewriteCond %{{HTTP_HOST}} ^{}$ [NC]", redirect.from.replace('.', r"\."));
            let suffix = if redirect.keep_uri { "$1" } else { "" };
            let _ = writeln!(out, "RewriteRule ^(.*)$ {}{suffix} [R={status},L]", redirect.to);
        }
        RedirectKind::NotFound => {
            let _ = writeln!(out, "# 404 redirect ({status}) -> {}", redirect.to);
            let _ = writeln!(out, "ErrorDocument 404 {}", redirect.to);
        }
    }

    out
}

pub fn decode(content: &str) -> Option<Redirect> {
    if let Some(caps) = REDIRECT_RE.captures(content) {
        return Some(Redirect {
            kind: RedirectKind::Url,
            from: caps[2].to_string(),
            to: caps[3].to_string(),
            keep_uri: false,
            status_code: caps[1].parse().ok()?,
        });
    }

    if let Some(caps) = REDIRECT_MATCH_RE.captures(content) {
        let (to, keep_uri) = strip_uri_suffix(&caps[3]);
        let from = caps[2].trim_start_matches('^');
        let from = from
            .strip_suffix("(.*)$")
            .or_else(|| from.strip_suffix('$'))
            .unwrap_or(from);
        return Some(Redirect {
            kind: RedirectKind::Url,
            from: from.to_string(),
            to,
            keep_uri,
            status_code: caps[1].parse().ok()?,
        });
    }

    if let Some(caps) = HOST_RE.captures(content) {
        let (to, keep_uri) = strip_uri_suffix(&caps[2]);
        return Some(Redirect {
            kind: RedirectKind::Host,
            from: caps[1].replace(r"\.", "."),
            to,
            keep_uri,
            status_code: caps[3].parse().ok()?,
        });
    }

    if let Some(caps) = NOT_FOUND_RE.captures(content) {
        let status_code = NOT_FOUND_STATUS_RE
            .captures(content)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(DEFAULT_REDIRECT_STATUS);
        return Some(Redirect {
            kind: RedirectKind::NotFound,
            from: String::new(),
            to: caps[1].to_string(),
            keep_uri: false,
            status_code,
        });
    }

    None
}

fn strip_uri_suffix(to: &str) -> (String, bool) {
    match to.strip_suffix("$1") {
        Some(base) => (base.to_string(), true),
        None => (to.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(from: &str, to: &str, keep_uri: bool) -> Redirect {
        Redirect {
            kind: RedirectKind::Url,
            from: from.to_string(),
            to: to.to_string(),
            keep_uri,
            status_code: 301,
        }
    }

    #[test]
    fn test_url_redirect() {
        let content = encode(&url("/old", "/new", false));
        assert!(content.starts_with(GENERATED_HEADER));
        assert!(content.contains("Redirect 301 /old /new\n"));
        assert_eq!(decode(&content), Some(url("/old", "/new", false)));
    }

    #[test]
    fn test_url_redirect_keep_uri() {
        let content = encode(&url("/old", "https://example.com/new", true));
        assert!(content.contains("RedirectMatch 301 ^/old(.*)$ https://example.com/new$1\n"));
        assert_eq!(decode(&content), Some(url("/old", "https://example.com/new", true)));
    }

    #[test]
    fn test_host_redirect() {
        let redirect = Redirect {
            kind: RedirectKind::Host,
            from: "old.example.com".to_string(),
            to: "https://new.example.com".to_string(),
            keep_uri: true,
            status_code: 0,
        };
        let content = encode(&redirect);
        assert!(content.contains(r"RewriteCond %{HTTP_HOST} ^old\.example\.com$ [NC]"));
        assert!(content.contains("RewriteRule ^(.*)$ https://new.example.com$1 [R=308,L]"));

        let decoded = decode(&content).unwrap();
        assert_eq!(decoded.kind, RedirectKind::Host);
        assert_eq!(decoded.from, "old.example.com");
        assert_eq!(decoded.to, "https://new.example.com");
        assert!(decoded.keep_uri);
        assert_eq!(decoded.status_code, 308);
    }

    #[test]
    fn test_not_found_redirect_keeps_status() {
        let redirect = Redirect {
            kind: RedirectKind::NotFound,
            to: "/404.html".to_string(),
            status_code: 302,
            ..Redirect::default()
        };
        let decoded = decode(&encode(&redirect)).unwrap();
        assert_eq!(decoded, redirect);

        // Hand-written files without the header fall back to 308
        let decoded = decode("ErrorDocument 404 /missing\n").unwrap();
        assert_eq!(decoded.status_code, 308);
    }

    #[test]
    fn test_unparsable_content() {
        assert_eq!(decode("# nothing here\nServerName a.com\n"), None);
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let redirects = vec![url("/a", "/b", false), url("/c", "/d", true)];
        store(dir.path(), &redirects).unwrap();

        assert!(dir.path().join("100-redirect.conf").exists());
        assert!(dir.path().join("101-redirect.conf").exists());
        assert_eq!(load(dir.path()).unwrap(), redirects);

        store(dir.path(), &redirects[..1]).unwrap();
        assert!(!dir.path().join("101-redirect.conf").exists());
        assert_eq!(load(dir.path()).unwrap().len(), 1);
    }
}
