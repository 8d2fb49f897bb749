//! On-disk layout of a site's configuration directory
//!
//! ```text
//! <site>/
//!   public/              default document root
//!   log/                 access.log, error.log
//!   config/              <- config_dir
//!     nginx.conf | apache.conf
//!     site/              included inside the server block / virtual host
//!     shared/            included at http / server-config level
//!     disabled-root      root saved while the site is stopped
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fragment::{remove_file, write_file};
use crate::types::ConfigScope;

/// Marker file whose presence means the site is stopped
pub const DISABLE_CONF_NAME: &str = "000-disable.conf";

/// Sidecar holding the document root while the site is stopped
const DISABLED_ROOT_NAME: &str = "disabled-root";

/// Paths derived from a site's config directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    config_dir: PathBuf,
}

impl SiteLayout {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The site directory that owns `config/`
    pub fn site_root(&self) -> &Path {
        self.config_dir.parent().unwrap_or(&self.config_dir)
    }

    pub fn scope_dir(&self, scope: ConfigScope) -> PathBuf {
        self.config_dir.join(scope.as_str())
    }

    pub fn site_dir(&self) -> PathBuf {
        self.scope_dir(ConfigScope::Site)
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.scope_dir(ConfigScope::Shared)
    }

    pub fn main_file(&self, name: &str) -> PathBuf {
        self.config_dir.join(name)
    }

    pub fn default_document_root(&self) -> PathBuf {
        self.site_root().join("public")
    }

    pub fn default_access_log(&self) -> PathBuf {
        self.site_root().join("log").join("access.log")
    }

    pub fn default_error_log(&self) -> PathBuf {
        self.site_root().join("log").join("error.log")
    }

    /// Create `site/` and `shared/`
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.site_dir())?;
        fs::create_dir_all(self.shared_dir())?;
        Ok(())
    }

    // ============================================================
    // Free-form fragments
    // ============================================================

    /// Path of a fragment; the name must be a single file name inside the scope dir
    fn config_path(&self, name: &str, scope: ConfigScope) -> Result<PathBuf> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(Error::InvalidArgument(format!("invalid config name: {name:?}")));
        }
        Ok(self.scope_dir(scope).join(name))
    }

    pub fn read_config(&self, name: &str, scope: ConfigScope) -> Option<String> {
        fs::read_to_string(self.config_path(name, scope).ok()?).ok()
    }

    pub fn write_config(&self, name: &str, scope: ConfigScope, content: &str) -> Result<()> {
        let path = self.config_path(name, scope)?;
        fs::create_dir_all(self.scope_dir(scope))?;
        write_file(&path, content)
    }

    pub fn remove_config(&self, name: &str, scope: ConfigScope) -> Result<()> {
        remove_file(&self.config_path(name, scope)?)
    }

    // ============================================================
    // Enable / disable
    // ============================================================

    pub fn is_enabled(&self) -> bool {
        !self.site_dir().join(DISABLE_CONF_NAME).exists()
    }

    pub fn write_disable_marker(&self, content: &str) -> Result<()> {
        self.write_config(DISABLE_CONF_NAME, ConfigScope::Site, content)
    }

    pub fn remove_disable_marker(&self) -> Result<()> {
        self.remove_config(DISABLE_CONF_NAME, ConfigScope::Site)
    }

    pub fn saved_root(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.config_dir.join(DISABLED_ROOT_NAME)) {
            Ok(root) => Ok(Some(root.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn store_root(&self, root: &str) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        write_file(&self.config_dir.join(DISABLED_ROOT_NAME), root)
    }

    pub fn discard_saved_root(&self) -> Result<()> {
        remove_file(&self.config_dir.join(DISABLED_ROOT_NAME))
    }
}

/// Replace a site's document root by the stop page, or restore it.
///
/// Backends pass their current root and get back the root to apply, or
/// `None` when nothing changes.
pub fn toggle_root(
    layout: &SiteLayout,
    enable: bool,
    current_root: &str,
    stop_root: &Path,
    marker: &str,
) -> Result<Option<String>> {
    if enable {
        layout.remove_disable_marker()?;
        let restored = layout.saved_root()?;
        layout.discard_saved_root()?;
        tracing::debug!("enabled site {}", layout.config_dir().display());
        return Ok(restored);
    }

    if !layout.is_enabled() {
        return Ok(None);
    }
    layout.store_root(current_root)?;
    layout.write_disable_marker(marker)?;
    tracing::debug!("disabled site {}", layout.config_dir().display());
    Ok(Some(stop_root.to_string_lossy().into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = SiteLayout::new("/srv/sites/blog/config");
        assert_eq!(layout.site_dir(), PathBuf::from("/srv/sites/blog/config/site"));
        assert_eq!(layout.shared_dir(), PathBuf::from("/srv/sites/blog/config/shared"));
        assert_eq!(layout.default_document_root(), PathBuf::from("/srv/sites/blog/public"));
        assert_eq!(layout.default_access_log(), PathBuf::from("/srv/sites/blog/log/access.log"));
    }

    #[test]
    fn test_toggle_root_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SiteLayout::new(dir.path().join("config"));
        let stop = Path::new("/usr/share/stop");

        let applied = toggle_root(&layout, false, "/srv/www", stop, "marker").unwrap();
        assert_eq!(applied.as_deref(), Some("/usr/share/stop"));
        assert!(!layout.is_enabled());

        // A second disable keeps the original root
        let again = toggle_root(&layout, false, "/usr/share/stop", stop, "marker").unwrap();
        assert_eq!(again, None);

        let restored = toggle_root(&layout, true, "/usr/share/stop", stop, "marker").unwrap();
        assert_eq!(restored.as_deref(), Some("/srv/www"));
        assert!(layout.is_enabled());
        assert_eq!(layout.saved_root().unwrap(), None);
    }

    #[test]
    fn test_free_form_configs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SiteLayout::new(dir.path());

        assert_eq!(layout.read_config("custom.conf", ConfigScope::Shared), None);
        layout.write_config("custom.conf", ConfigScope::Shared, "gzip on;").unwrap();
        assert_eq!(layout.read_config("custom.conf", ConfigScope::Shared).as_deref(), Some("gzip on;"));
        layout.remove_config("custom.conf", ConfigScope::Shared).unwrap();
        layout.remove_config("custom.conf", ConfigScope::Shared).unwrap();
        assert_eq!(layout.read_config("custom.conf", ConfigScope::Shared), None);
    }

    #[test]
    fn test_config_names_stay_inside_scope_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SiteLayout::new(dir.path().join("site-a").join("config"));

        for name in ["../../escape.conf", "../x.conf", "sub/x.conf", "..", "", "a\\b.conf"] {
            assert!(
                matches!(layout.write_config(name, ConfigScope::Site, "x"), Err(Error::InvalidArgument(_))),
                "{name:?} should be rejected"
            );
            assert!(matches!(layout.remove_config(name, ConfigScope::Site), Err(Error::InvalidArgument(_))));
            assert_eq!(layout.read_config(name, ConfigScope::Site), None);
        }
        assert!(!dir.path().join("escape.conf").exists());
        assert!(!dir.path().join("site-a").join("x.conf").exists());

        layout.write_config("..hidden.conf", ConfigScope::Site, "x").unwrap();
        assert_eq!(layout.read_config("..hidden.conf", ConfigScope::Site).as_deref(), Some("x"));
    }
}
