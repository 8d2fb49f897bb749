//! Typed reads of the `server` block

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use webserver_core::{Error, IncludeFile, Result};

use crate::config::{unquote, Directive};
use crate::parser::Parser;

pub(crate) const HSTS_HEADER: &str = "Strict-Transport-Security";
pub(crate) const ALT_SVC_HEADER: &str = "Alt-Svc";
pub(crate) const HTTPS_REDIRECT_TARGET: &str = "https://$host$request_uri";

static PHP_INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^enable-php-(\d+)\.conf$").expect("valid php include pattern"));

pub(crate) fn server_key(name: &str) -> String {
    format!("server.{name}")
}

fn unquoted_args(directive: &Directive) -> impl Iterator<Item = String> + '_ {
    directive.args.iter().map(|a| unquote(a).to_string())
}

/// `if` block that sends plain HTTP to HTTPS
pub(crate) fn is_https_redirect(directive: &Directive) -> bool {
    directive.name == "if"
        && directive.block.as_ref().is_some_and(|b| {
            b.directives
                .iter()
                .any(|d| d.name == "return" && d.args.iter().any(|a| a == HTTPS_REDIRECT_TARGET))
        })
}

/// Version bound by an `enable-php-NN.conf` include path
pub(crate) fn php_version(path: &str) -> Option<u32> {
    let name = Path::new(path).file_name()?.to_str()?;
    PHP_INCLUDE_RE.captures(name)?[1].parse().ok()
}

impl Parser {
    fn first_value(&self, name: &str) -> Result<String> {
        let directive = self.find_one(&server_key(name))?;
        Ok(directive.value().unwrap_or_default().to_string())
    }

    fn server_directives(&self, name: &str) -> Vec<&Directive> {
        self.find(&server_key(name)).unwrap_or_default()
    }

    /// Raw `listen` parameter lists in source order
    pub fn get_listen(&self) -> Result<Vec<Vec<String>>> {
        Ok(self
            .find(&server_key("listen"))?
            .into_iter()
            .map(|d| d.args.clone())
            .collect())
    }

    pub fn get_server_name(&self) -> Result<Vec<String>> {
        Ok(self
            .find(&server_key("server_name"))?
            .into_iter()
            .flat_map(unquoted_args)
            .collect())
    }

    pub fn get_index(&self) -> Result<Vec<String>> {
        Ok(self
            .find(&server_key("index"))?
            .into_iter()
            .flat_map(unquoted_args)
            .collect())
    }

    pub fn get_root(&self) -> Result<String> {
        self.first_value("root")
    }

    pub fn get_root_with_comment(&self) -> Result<(String, Vec<String>)> {
        let directive = self.find_one(&server_key("root"))?;
        Ok((directive.value().unwrap_or_default().to_string(), directive.comment.clone()))
    }

    /// `include` directives of the server block with their comments
    pub fn get_includes(&self) -> Result<Vec<IncludeFile>> {
        self.find(&server_key("include"))?
            .into_iter()
            .map(|d| match d.args.as_slice() {
                [path] => Ok(IncludeFile {
                    path: unquote(path).to_string(),
                    comment: d.comment.clone(),
                }),
                args => Err(Error::InvalidArgument(format!(
                    "invalid include directive, expected 1 parameter but got {}",
                    args.len()
                ))),
            })
            .collect()
    }

    /// PHP version bound through an include, 0 when none
    pub fn get_php(&self) -> u32 {
        self.server_directives("include")
            .into_iter()
            .filter_map(|d| d.value().and_then(php_version))
            .next()
            .unwrap_or(0)
    }

    pub fn get_https(&self) -> bool {
        !self.server_directives("ssl_certificate").is_empty()
    }

    /// Certificate and key paths
    pub fn get_https_cert(&self) -> (String, String) {
        (
            self.first_value("ssl_certificate").unwrap_or_default(),
            self.first_value("ssl_certificate_key").unwrap_or_default(),
        )
    }

    pub fn get_https_protocols(&self) -> Vec<String> {
        self.find_one(&server_key("ssl_protocols"))
            .map(|d| unquoted_args(d).collect())
            .unwrap_or_default()
    }

    pub fn get_https_ciphers(&self) -> String {
        self.first_value("ssl_ciphers").unwrap_or_default()
    }

    pub fn get_ocsp(&self) -> bool {
        self.first_value("ssl_stapling").is_ok_and(|v| v == "on")
    }

    pub fn get_hsts(&self) -> bool {
        self.server_directives("add_header")
            .iter()
            .any(|d| d.args.iter().any(|a| unquote(a) == HSTS_HEADER))
    }

    pub fn get_https_redirect(&self) -> bool {
        self.server_directives("if").into_iter().any(is_https_redirect)
    }

    /// Value of the `Alt-Svc` header, unquoted
    pub fn get_alt_svc(&self) -> String {
        self.server_directives("add_header")
            .into_iter()
            .find_map(|d| {
                let at = d.args.iter().position(|a| a.starts_with(ALT_SVC_HEADER))?;
                d.args.get(at + 1).map(|v| unquote(v).to_string())
            })
            .unwrap_or_default()
    }

    pub fn get_access_log(&self) -> Result<String> {
        self.first_value("access_log")
    }

    pub fn get_error_log(&self) -> Result<String> {
        self.first_value("error_log")
    }

    pub fn get_limit_rate(&self) -> String {
        self.first_value("limit_rate").unwrap_or_default()
    }

    /// `limit_conn` parameter lists: `[zone, count]`
    pub fn get_limit_conn(&self) -> Vec<Vec<String>> {
        self.server_directives("limit_conn")
            .into_iter()
            .map(|d| d.args.clone())
            .collect()
    }

    /// Realm and user file, empty strings when either directive is missing
    pub fn get_basic_auth(&self) -> (String, String) {
        match (self.first_value("auth_basic"), self.first_value("auth_basic_user_file")) {
            (Ok(realm), Ok(file)) => (realm, file),
            _ => (String::new(), String::new()),
        }
    }

    /// Trusted addresses, header and recursion flag
    pub fn get_real_ip(&self) -> (Vec<String>, String, bool) {
        let from = self
            .server_directives("set_real_ip_from")
            .into_iter()
            .flat_map(unquoted_args)
            .collect();
        let header = self.first_value("real_ip_header").unwrap_or_default();
        let recursive = self.first_value("real_ip_recursive").is_ok_and(|v| v == "on");
        (from, header, recursive)
    }
}
