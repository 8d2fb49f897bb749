//! Typed writes to the `server` block
//!
//! Single-valued directives are replaced in place and keep the comments of
//! the directive they replace. New directives are appended; `save` puts
//! them in order.

use webserver_core::{IncludeFile, Result};

use crate::config::{quote_arg, Block, Directive};
use crate::data::{DEFAULT_SSL_CIPHERS, DEFAULT_SSL_PROTOCOLS};
use crate::getter::{is_https_redirect, server_key, ALT_SVC_HEADER, HSTS_HEADER, HTTPS_REDIRECT_TARGET};
use crate::parser::Parser;

/// Status used for the HTTP to HTTPS redirect
const HTTPS_REDIRECT_STATUS: &str = "308";

impl Parser {
    fn server_mut(&mut self) -> Result<&mut Block> {
        self.block_mut("server")
    }

    /// Replace `name` with one directive, carrying over the old comments
    fn set_server_value<I, S>(&mut self, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut directive = Directive::new(name, args);
        if let Some(old) = self.find(&server_key(name))?.first() {
            directive.comment = old.comment.clone();
            directive.inline_comment = old.inline_comment.clone();
        }
        self.replace(&server_key(name), vec![directive])
    }

    fn set_server_values(&mut self, name: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            self.clear(&server_key(name))
        } else {
            self.set_server_value(name, values.iter().map(|v| quote_arg(v)))
        }
    }

    pub fn set_listen(&mut self, listens: &[Vec<String>]) -> Result<()> {
        let directives = listens
            .iter()
            .map(|args| Directive::new("listen", args.iter().cloned()))
            .collect();
        self.replace(&server_key("listen"), directives)
    }

    pub fn set_server_name(&mut self, names: &[String]) -> Result<()> {
        self.set_server_values("server_name", names)
    }

    pub fn set_index(&mut self, index: &[String]) -> Result<()> {
        self.set_server_values("index", index)
    }

    pub fn set_root(&mut self, root: &str) -> Result<()> {
        self.set_server_value("root", [quote_arg(root)])
    }

    pub fn set_root_with_comment(&mut self, root: &str, comment: &[String]) -> Result<()> {
        let directive = Directive::new("root", [quote_arg(root)]).with_comment(comment.iter().cloned());
        self.replace(&server_key("root"), vec![directive])
    }

    pub fn set_includes(&mut self, includes: &[IncludeFile]) -> Result<()> {
        let directives = includes
            .iter()
            .map(|include| {
                Directive::new("include", [quote_arg(&include.path)]).with_comment(include.comment.iter().cloned())
            })
            .collect();
        self.replace(&server_key("include"), directives)
    }

    pub fn set_access_log(&mut self, path: &str) -> Result<()> {
        self.set_server_value("access_log", [quote_arg(path)])
    }

    pub fn set_error_log(&mut self, path: &str) -> Result<()> {
        self.set_server_value("error_log", [quote_arg(path)])
    }

    // ============================================================
    // HTTPS
    // ============================================================

    /// Set the certificate pair and session defaults; protocols and
    /// ciphers fall back to defaults when not yet set
    pub fn set_https_cert(&mut self, cert: &str, key: &str) -> Result<()> {
        self.set_server_value("ssl_certificate", [quote_arg(cert)])?;
        self.set_server_value("ssl_certificate_key", [quote_arg(key)])?;
        self.set_server_value("ssl_session_timeout", ["1d"])?;
        self.set_server_value("ssl_session_cache", ["shared:SSL:10m"])?;
        self.set_server_value("ssl_prefer_server_ciphers", ["off"])?;
        self.set_server_value("ssl_early_data", ["on"])?;

        if !self.server_mut()?.has("ssl_protocols") {
            self.set_https_protocols(&[])?;
        }
        if !self.server_mut()?.has("ssl_ciphers") {
            self.set_https_ciphers("")?;
        }
        Ok(())
    }

    /// Empty selects the default protocol set
    pub fn set_https_protocols(&mut self, protocols: &[String]) -> Result<()> {
        if protocols.is_empty() {
            self.set_server_value("ssl_protocols", DEFAULT_SSL_PROTOCOLS.iter().copied())
        } else {
            self.set_server_value("ssl_protocols", protocols.iter().cloned())
        }
    }

    /// Empty selects the default cipher list
    pub fn set_https_ciphers(&mut self, ciphers: &str) -> Result<()> {
        let ciphers = if ciphers.is_empty() { DEFAULT_SSL_CIPHERS } else { ciphers };
        self.set_server_value("ssl_ciphers", [quote_arg(ciphers)])
    }

    pub fn set_ocsp(&mut self, ocsp: bool) -> Result<()> {
        if ocsp {
            self.set_server_value("ssl_stapling", ["on"])?;
            self.set_server_value("ssl_stapling_verify", ["on"])
        } else {
            self.clear(&server_key("ssl_stapling"))?;
            self.clear(&server_key("ssl_stapling_verify"))
        }
    }

    pub fn set_hsts(&mut self, hsts: bool) -> Result<()> {
        let server = self.server_mut()?;
        server.remove_where(|d| is_header(d, HSTS_HEADER));
        if hsts {
            server.directives.push(Directive::new(
                "add_header",
                [HSTS_HEADER, "\"max-age=31536000\"", "always"],
            ));
        }
        Ok(())
    }

    pub fn set_https_redirect(&mut self, redirect: bool) -> Result<()> {
        let server = self.server_mut()?;
        server.remove_where(|d| is_https_redirect(d) || is_https_error_page(d));
        if redirect {
            let target = HTTPS_REDIRECT_TARGET.to_string();
            server.directives.push(Directive::with_block(
                "if",
                ["($scheme", "=", "http)"],
                vec![Directive::new("return", [HTTPS_REDIRECT_STATUS.to_string(), target.clone()])],
            ));
            server
                .directives
                .push(Directive::new("error_page", ["497".to_string(), format!("={HTTPS_REDIRECT_STATUS}"), target]));
        }
        Ok(())
    }

    /// Empty removes the header
    pub fn set_alt_svc(&mut self, alt_svc: &str) -> Result<()> {
        let server = self.server_mut()?;
        server.remove_where(|d| is_header(d, ALT_SVC_HEADER));
        if !alt_svc.is_empty() {
            server
                .directives
                .push(Directive::new("add_header", [ALT_SVC_HEADER.to_string(), quote_arg(alt_svc), "always".to_string()]));
        }
        Ok(())
    }

    /// Drop every directive the HTTPS setters own; other headers stay
    pub fn clear_https(&mut self) -> Result<()> {
        let server = self.server_mut()?;
        server.remove_where(|d| {
            d.name.starts_with("ssl_")
                || is_header(d, HSTS_HEADER)
                || is_header(d, ALT_SVC_HEADER)
                || is_https_redirect(d)
                || is_https_error_page(d)
        });
        Ok(())
    }

    // ============================================================
    // Limits, auth, real IP
    // ============================================================

    /// Empty removes the limit
    pub fn set_limit_rate(&mut self, rate: &str) -> Result<()> {
        if rate.is_empty() {
            self.clear(&server_key("limit_rate"))
        } else {
            self.set_server_value("limit_rate", [rate])
        }
    }

    pub fn set_limit_conn(&mut self, limits: &[Vec<String>]) -> Result<()> {
        let directives = limits
            .iter()
            .map(|args| Directive::new("limit_conn", args.iter().cloned()))
            .collect();
        self.replace(&server_key("limit_conn"), directives)
    }

    pub fn set_basic_auth(&mut self, realm: &str, user_file: &str) -> Result<()> {
        self.set_server_value("auth_basic", [format!("\"{}\"", realm.replace('"', "'"))])?;
        self.set_server_value("auth_basic_user_file", [quote_arg(user_file)])
    }

    pub fn clear_basic_auth(&mut self) -> Result<()> {
        self.clear(&server_key("auth_basic"))?;
        self.clear(&server_key("auth_basic_user_file"))
    }

    pub fn set_real_ip(&mut self, from: &[String], header: &str, recursive: bool) -> Result<()> {
        let trusted = from
            .iter()
            .map(|addr| Directive::new("set_real_ip_from", [quote_arg(addr)]))
            .collect();
        self.replace(&server_key("set_real_ip_from"), trusted)?;
        self.set_server_value("real_ip_header", [header])?;
        if recursive {
            self.set_server_value("real_ip_recursive", ["on"])
        } else {
            self.clear(&server_key("real_ip_recursive"))
        }
    }

    pub fn clear_real_ip(&mut self) -> Result<()> {
        self.clear(&server_key("set_real_ip_from"))?;
        self.clear(&server_key("real_ip_header"))?;
        self.clear(&server_key("real_ip_recursive"))
    }
}

fn is_header(directive: &Directive, header: &str) -> bool {
    directive.name == "add_header"
        && directive
            .args
            .first()
            .is_some_and(|a| crate::config::unquote(a).eq_ignore_ascii_case(header))
}

fn is_https_error_page(directive: &Directive) -> bool {
    directive.name == "error_page" && directive.args.first().is_some_and(|a| a == "497")
}
