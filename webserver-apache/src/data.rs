//! Templates and fixed file contents

use std::path::Path;

use webserver_core::SiteLayout;

use crate::export::quote_arg;

/// First line of every generated fragment
pub const GENERATED_HEADER: &str = "# Auto-generated by webserver. DO NOT EDIT MANUALLY!";

/// Main config file inside the config dir
pub const MAIN_CONF_NAME: &str = "apache.conf";

/// PHP handler fragment inside the site dir
pub const PHP_CONF_NAME: &str = "010-php.conf";

/// Served while the site is stopped
pub const DISABLE_CONF_CONTENT: &str = "# Site stopped
ErrorDocument 503 /stop.html
RewriteEngine on
RewriteCond %{REQUEST_URI} !=/stop.html
RewriteRule ^ - [R=503,L]
";

pub const DEFAULT_SSL_PROTOCOLS: &[&str] = &["TLSv1.2", "TLSv1.3"];

pub const DEFAULT_SSL_CIPHERS: &str = "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305:DHE-RSA-AES128-GCM-SHA256:DHE-RSA-AES256-GCM-SHA384";

fn path_arg(path: &Path) -> String {
    quote_arg(&path.to_string_lossy())
}

/// Default site config for a layout
pub fn default_config(layout: &SiteLayout) -> String {
    let config = layout.config_dir();
    let root = path_arg(&layout.default_document_root());
    let shared = path_arg(&config.join("shared").join("*.conf"));
    let site = path_arg(&config.join("site").join("*.conf"));
    let error_log = path_arg(&layout.default_error_log());
    let access_log = path_arg(&layout.default_access_log());

    format!(
        "# Shared configs
IncludeOptional {shared}

<VirtualHost *:80>
    ServerName localhost
    DocumentRoot {root}
    DirectoryIndex index.php index.html

    ErrorLog {error_log}
    CustomLog {access_log} combined

    # custom configs
    IncludeOptional {site}

    <Directory {root}>
        Options -Indexes +FollowSymLinks
        AllowOverride All
        Require all granted
    </Directory>
</VirtualHost>
"
    )
}

/// PHP-FPM handler for `version` (`84` -> PHP 8.4)
pub fn php_config(version: u32, socket_dir: &Path) -> String {
    format!(
        "{GENERATED_HEADER}
# PHP {major}.{minor}
<FilesMatch \\.php$>
    SetHandler \"proxy:unix:{dir}/php-cgi-{version}.sock|fcgi://localhost/\"
</FilesMatch>
",
        major = version / 10,
        minor = version % 10,
        dir = socket_dir.display(),
    )
}
