//! Records exchanged between callers and the vhost backends

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

// ============================================================
// Base vhost records
// ============================================================

/// A listen address with its flags (`ssl`, `quic`, `http2`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listen {
    pub address: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Listen {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(address: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            address: address.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// TLS settings of a vhost
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    /// Certificate path
    pub cert: String,
    /// Private key path
    pub key: String,
    /// Enabled protocol versions, e.g. `TLSv1.2`
    pub protocols: Vec<String>,
    /// Cipher suite list in OpenSSL syntax
    pub ciphers: String,
    /// Send `Strict-Transport-Security`
    pub hsts: bool,
    /// OCSP stapling
    pub ocsp: bool,
    /// Redirect plain HTTP to HTTPS
    pub http_redirect: bool,
    /// `Alt-Svc` header value, empty to omit
    pub alt_svc: String,
}

/// Connection and bandwidth limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Concurrent connections per server, 0 for unlimited
    pub per_server: u32,
    /// Concurrent connections per client address, 0 for unlimited
    pub per_ip: u32,
    /// Response rate in KiB/s, 0 for unlimited
    pub rate: u32,
}

impl RateLimit {
    pub fn is_empty(&self) -> bool {
        self.per_server == 0 && self.per_ip == 0 && self.rate == 0
    }
}

/// HTTP basic authentication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuth {
    pub realm: String,
    pub user_file: String,
}

/// Default realm used when none is given
pub const DEFAULT_AUTH_REALM: &str = "Restricted";

/// Client address recovery from a trusted proxy header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealIp {
    /// Trusted proxy addresses or CIDRs
    pub from: Vec<String>,
    /// Header carrying the client address
    pub header: String,
    /// Walk the header past trusted addresses
    pub recursive: bool,
}

/// An include directive together with the comment lines above it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeFile {
    pub path: String,
    #[serde(default)]
    pub comment: Vec<String>,
}

impl IncludeFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            comment: Vec::new(),
        }
    }
}

/// Which fragment directory a free-form config file lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigScope {
    /// Included inside the server / virtual host
    Site,
    /// Included at http / server-config level
    Shared,
}

impl ConfigScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigScope::Site => "site",
            ConfigScope::Shared => "shared",
        }
    }
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "site" => Ok(ConfigScope::Site),
            "shared" => Ok(ConfigScope::Shared),
            other => Err(Error::InvalidArgument(format!(
                "config scope must be site or shared, got {other}"
            ))),
        }
    }
}

// ============================================================
// Sub-config records
// ============================================================

/// Proxy response cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Status code list -> validity, e.g. `"200 302" -> "10m"`
    pub valid: BTreeMap<String, String>,
    /// Conditions that bypass the cache
    pub no_cache_conditions: Vec<String>,
    /// Situations where a stale entry may be served
    pub use_stale: Vec<String>,
    pub background_update: bool,
    pub lock: bool,
    pub min_uses: u32,
    pub methods: Vec<String>,
    pub key: String,
}

/// A reverse-proxy rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proxy {
    /// Matched location, e.g. `/` or `/api`
    pub location: String,
    /// Upstream URL
    pub pass: String,
    /// Host header sent upstream, empty keeps the upstream host
    pub host: String,
    /// TLS server name sent upstream
    pub sni: String,
    pub cache: Option<CacheConfig>,
    pub buffering: bool,
    pub resolver: Vec<String>,
    pub resolver_timeout: Option<Duration>,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// Response body substitutions
    pub replaces: BTreeMap<String, String>,
}

/// A load-balanced upstream pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upstream {
    pub name: String,
    /// Server address -> options, e.g. `"127.0.0.1:8080" -> "weight=5"`
    pub servers: BTreeMap<String, String>,
    /// Balancing algorithm: empty (round robin), `least_conn`, `ip_hash`, ...
    pub algo: String,
    pub keepalive: u32,
    pub resolver: Vec<String>,
    pub resolver_timeout: Option<Duration>,
}

/// What a redirect matches on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectKind {
    /// Requests that would 404
    #[serde(rename = "404")]
    NotFound,
    /// Requests for another host name
    #[serde(rename = "host")]
    Host,
    /// Requests for a path
    #[default]
    #[serde(rename = "url")]
    Url,
}

/// Default redirect status
pub const DEFAULT_REDIRECT_STATUS: u16 = 308;

/// A redirect rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Redirect {
    #[serde(rename = "type")]
    pub kind: RedirectKind,
    pub from: String,
    pub to: String,
    /// Append the original request URI to the target
    pub keep_uri: bool,
    pub status_code: u16,
}

impl Default for Redirect {
    fn default() -> Self {
        Self {
            kind: RedirectKind::Url,
            from: String::new(),
            to: String::new(),
            keep_uri: false,
            status_code: DEFAULT_REDIRECT_STATUS,
        }
    }
}

impl Redirect {
    /// Status code to emit, falling back to 308 when unset
    pub fn status(&self) -> u16 {
        if self.status_code == 0 {
            DEFAULT_REDIRECT_STATUS
        } else {
            self.status_code
        }
    }
}

// ============================================================
// Durations
// ============================================================

/// Render a duration the way both servers accept it (`30s`, `500ms`)
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

/// Parse `500ms`, `30s`, `5m`, `1h`, `7d` or a bare number of seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let n: u64 = num.parse().ok()?;
    let secs = match unit {
        "ms" => return Some(Duration::from_millis(n)),
        "" | "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        "d" => n.checked_mul(86400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
