//! Configuration type definitions
//!
//! These types describe how the engine is run: which backend is managed,
//! where the stop page lives, and how configs are pretty-printed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Root configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Backend being managed
    #[serde(default)]
    pub server: ServerType,

    /// Directory served while a site is stopped; backend default when unset
    #[serde(default)]
    pub stop_page_root: Option<PathBuf>,

    /// Directory holding `php-cgi-<version>.sock`
    #[serde(default = "default_php_socket_dir")]
    pub php_socket_dir: PathBuf,

    /// Maximum nesting of Apache `Include` directives
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Pretty-printer settings
    #[serde(default)]
    pub export: ExportSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerType::default(),
            stop_page_root: None,
            php_socket_dir: default_php_socket_dir(),
            max_include_depth: default_max_include_depth(),
            export: ExportSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Stop page directory for the configured backend
    pub fn stop_page_root(&self, server: ServerType) -> PathBuf {
        self.stop_page_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(server.default_stop_page_root()))
    }
}

fn default_php_socket_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_max_include_depth() -> usize {
    10
}

/// Managed webserver backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    #[default]
    Nginx,
    Apache,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Nginx => "nginx",
            ServerType::Apache => "apache",
        }
    }

    fn default_stop_page_root(&self) -> &'static str {
        match self {
            ServerType::Nginx => "/usr/share/nginx/html",
            ServerType::Apache => "/var/www/html",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nginx" => Ok(ServerType::Nginx),
            "apache" | "httpd" => Ok(ServerType::Apache),
            _ => Err(Error::UnsupportedServerType(s.to_string())),
        }
    }
}

/// Indentation character
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndentStyle {
    #[default]
    Spaces,
    Tabs,
}

/// Blank-line policy of the pretty-printer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FormatStyle {
    /// No blank lines
    Compact,
    /// Blank lines between groups of differing item kinds
    #[default]
    Standard,
    /// Blank line after every item
    Verbose,
}

/// Pretty-printer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportSettings {
    pub indent_style: IndentStyle,
    pub indent_size: usize,
    pub sort_directives: bool,
    pub include_comments: bool,
    pub preserve_empty_lines: bool,
    pub format_style: FormatStyle,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            indent_style: IndentStyle::Spaces,
            indent_size: 4,
            sort_directives: false,
            include_comments: true,
            preserve_empty_lines: true,
            format_style: FormatStyle::Standard,
        }
    }
}
