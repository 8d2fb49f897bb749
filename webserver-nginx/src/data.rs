//! Templates and fixed file contents

use std::path::Path;

use webserver_core::SiteLayout;

use crate::config::quote_arg;

/// First line of every generated fragment
pub const GENERATED_HEADER: &str = "# Auto-generated by webserver. DO NOT EDIT MANUALLY!";

/// Main config file inside the config dir
pub const MAIN_CONF_NAME: &str = "nginx.conf";

/// Served while the site is stopped
pub const DISABLE_CONF_CONTENT: &str = "# Site stopped
error_page 503 /stop.html;
if ($uri != /stop.html) {
    return 503;
}
";

pub const DEFAULT_SSL_PROTOCOLS: &[&str] = &["TLSv1.2", "TLSv1.3"];

pub const DEFAULT_SSL_CIPHERS: &str = "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305:DHE-RSA-AES128-GCM-SHA256:DHE-RSA-AES256-GCM-SHA384:DHE-RSA-CHACHA20-POLY1305";

fn path_arg(path: &Path) -> String {
    quote_arg(&path.to_string_lossy())
}

/// Default site config for a layout
pub fn default_config(layout: &SiteLayout) -> String {
    let config = layout.config_dir();
    let shared = path_arg(&config.join("shared").join("*.conf"));
    let site = path_arg(&config.join("site").join("*.conf"));
    let root = path_arg(&layout.default_document_root());
    let access_log = path_arg(&layout.default_access_log());
    let error_log = path_arg(&layout.default_error_log());

    format!(
        r"include {shared};
server {{
    listen 80;
    server_name localhost;
    index index.php index.html;
    root {root};
    # error page
    error_page 404 /404.html;
    # custom configs
    include {site};
    # browser cache
    location ~ .*\.(bmp|jpg|jpeg|png|gif|svg|ico|tiff|webp|avif|heif|heic|jxl)$ {{
        expires 30d;
        access_log /dev/null;
        error_log /dev/null;
    }}
    location ~ .*\.(js|css|ttf|otf|woff|woff2|eot)$ {{
        expires 6h;
        access_log /dev/null;
        error_log /dev/null;
    }}
    # deny sensitive files
    location ~ ^/(\.user.ini|\.htaccess|\.git|\.svn|\.env) {{
        return 404;
    }}
    access_log {access_log};
    error_log {error_log};
}}
"
    )
}

/// Include file name that binds PHP `version` (`84` -> PHP 8.4)
pub fn php_include(version: u32) -> String {
    format!("enable-php-{version}.conf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{dump, parse_str};

    #[test]
    fn test_default_config_parses() {
        let layout = SiteLayout::new("/srv/sites/blog/config");
        let block = parse_str(&default_config(&layout)).unwrap();

        assert_eq!(block.directives[0].args, vec!["/srv/sites/blog/config/shared/*.conf"]);
        let server = block.directives[1].block.as_ref().unwrap();
        let root = server.find("root");
        assert_eq!(root[0].args, vec!["/srv/sites/blog/public"]);
        let include = server.find("include");
        assert_eq!(include[0].comment, vec!["# custom configs"]);
        assert_eq!(server.find("location").len(), 3);
    }

    #[test]
    fn test_default_config_dumps_unchanged() {
        let layout = SiteLayout::new("/srv/sites/blog/config");
        let source = default_config(&layout);
        let block = parse_str(&source).unwrap();
        assert_eq!(dump(&block) + "\n", source);
    }

    #[test]
    fn test_disable_conf_parses() {
        let block = parse_str(DISABLE_CONF_CONTENT).unwrap();
        assert_eq!(block.directives[0].comment, vec!["# Site stopped"]);
        assert_eq!(block.directives[1].name, "if");
    }

    #[test]
    fn test_php_include() {
        assert_eq!(php_include(84), "enable-php-84.conf");
    }
}
