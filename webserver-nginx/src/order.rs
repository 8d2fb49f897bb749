//! Directive order applied on save

use crate::config::Directive;

const ORDER: &[&str] = &[
    "listen",
    "server_name",
    "index",
    "root",
    "ssl_certificate",
    "ssl_certificate_key",
    "ssl_session_timeout",
    "ssl_session_cache",
    "ssl_protocols",
    "ssl_ciphers",
    "ssl_prefer_server_ciphers",
    "ssl_early_data",
    "ssl_stapling",
    "ssl_stapling_verify",
    "ssl_trusted_certificate",
    "resolver",
    "set_real_ip_from",
    "real_ip_header",
    "real_ip_recursive",
    "limit_conn",
    "limit_rate",
    "auth_basic",
    "auth_basic_user_file",
    "error_page",
    "include",
    "if",
    "location",
    "add_header",
    "access_log",
    "error_log",
];

/// Sort rank; unknown names go after every known one
pub fn priority(name: &str) -> usize {
    ORDER.iter().position(|n| *n == name).unwrap_or(ORDER.len())
}

/// Stable sort: simple directives before non-empty blocks, then by rank.
/// Recurses into every block.
pub fn sort_directives(directives: &mut [Directive]) {
    directives.sort_by_key(|d| (d.has_body(), priority(&d.name)));
    for directive in directives.iter_mut() {
        if let Some(block) = directive.block.as_mut() {
            sort_directives(&mut block.directives);
        }
    }
}
