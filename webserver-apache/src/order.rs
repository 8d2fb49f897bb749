//! Directive priority used by sorted export

use std::collections::HashMap;
use std::sync::LazyLock;

/// Directives in the same row share a priority
const ORDER: &[&[&str]] = &[
    &["Listen"],
    &["ServerRoot", "ServerAdmin"],
    &["LoadModule"],
    &["Include", "IncludeOptional"],
    &["VirtualHost"],
    &["ServerName", "ServerAlias"],
    &["DocumentRoot", "DirectoryIndex"],
    &["SSLEngine"],
    &["SSLCertificateFile", "SSLCertificateKeyFile", "SSLCertificateChainFile"],
    &["SSLProtocol", "SSLCipherSuite", "SSLHonorCipherOrder", "SSLUseStapling"],
    &["ErrorDocument"],
    &["ErrorLog", "CustomLog", "LogLevel"],
    &["RemoteIPHeader", "RemoteIPTrustedProxy", "RemoteIPInternalProxy"],
    &[
        "RewriteEngine",
        "RewriteBase",
        "RewriteCond",
        "RewriteRule",
        "RewriteMap",
        "RewriteOptions",
    ],
    &["Redirect", "RedirectMatch", "RedirectPermanent", "RedirectTemp"],
    &["ProxyPreserveHost", "ProxyPass", "ProxyPassReverse", "ProxyPassMatch", "ProxyTimeout"],
    &["Header", "RequestHeader"],
    &["SetEnv", "SetOutputFilter", "SetHandler", "AddHandler", "AddType"],
    &["Options", "AllowOverride"],
    &["AuthType", "AuthName", "AuthUserFile", "Require"],
    &["IfModule", "IfDefine", "IfVersion"],
    &["Location", "LocationMatch"],
    &["Files", "FilesMatch"],
    &["Directory", "DirectoryMatch"],
    &["Proxy"],
];

/// Directives whose relative order changes their meaning
const ORDER_SENSITIVE: &[&str] = &[
    "RewriteEngine",
    "RewriteBase",
    "RewriteCond",
    "RewriteRule",
    "RewriteMap",
    "RewriteOptions",
    "Header",
    "RequestHeader",
    "Redirect",
    "RedirectMatch",
    "RedirectPermanent",
    "RedirectTemp",
    "ProxyPass",
    "ProxyPassReverse",
    "ProxyPassMatch",
];

static PRIORITY: LazyLock<HashMap<String, usize>> = LazyLock::new(|| {
    ORDER
        .iter()
        .enumerate()
        .flat_map(|(rank, row)| row.iter().map(move |name| (name.to_ascii_lowercase(), rank)))
        .collect()
});

/// Sort rank of a directive; unknown names sort after every known one
pub fn priority(name: &str) -> usize {
    PRIORITY
        .get(&name.to_ascii_lowercase())
        .copied()
        .unwrap_or(ORDER.len())
}

pub fn is_order_sensitive(name: &str) -> bool {
    ORDER_SENSITIVE.iter().any(|n| n.eq_ignore_ascii_case(name))
}
