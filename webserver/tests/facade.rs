use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use webserver::{
    new_php_vhost, new_proxy_vhost, new_static_vhost, new_static_vhost_with_config, open_vhost,
    Capability, EngineConfig, Error, ServerType, VhostKind,
};
use webserver_core::{Redirect, RedirectKind, Vhost, VhostPhp, VhostProxy, VhostRedirect};

fn site() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("config");
    (dir, config_dir)
}

#[test]
fn test_backends_write_their_own_main_file() {
    for (server, main) in [(ServerType::Nginx, "nginx.conf"), (ServerType::Apache, "apache.conf")] {
        let (_dir, config_dir) = site();
        let mut vhost = new_static_vhost(server, &config_dir).unwrap();
        vhost.set_server_name(&["example.com".to_string()]).unwrap();
        vhost.save().unwrap();

        assert!(config_dir.join(main).exists(), "{server} should write {main}");
        let reopened = new_static_vhost(server, &config_dir).unwrap();
        assert_eq!(reopened.server_name(), vec!["example.com"]);
    }
}

#[test]
fn test_open_vhost_by_name() {
    let (_dir, config_dir) = site();
    let vhost = open_vhost("httpd", VhostKind::Php, &config_dir).unwrap();
    assert_eq!(vhost.capabilities(), vec![Capability::Php, Capability::Redirect]);

    let vhost = open_vhost("NGINX", VhostKind::Proxy, &config_dir).unwrap();
    assert_eq!(vhost.capabilities(), vec![Capability::Redirect, Capability::Proxy]);

    let err = open_vhost("lighttpd", VhostKind::Static, &config_dir).err().unwrap();
    assert!(matches!(err, Error::UnsupportedServerType(_)));
}

#[test]
fn test_facets_through_boxed_traits() {
    for server in [ServerType::Nginx, ServerType::Apache] {
        let (_dir, config_dir) = site();

        let mut php = new_php_vhost(server, &config_dir).unwrap();
        php.set_php(83).unwrap();
        assert_eq!(php.php(), 83);
        php.set_redirects(&[Redirect {
            kind: RedirectKind::Url,
            from: "/old".to_string(),
            to: "/new".to_string(),
            keep_uri: false,
            status_code: 301,
        }])
        .unwrap();
        assert_eq!(php.redirects().unwrap().len(), 1);

        let proxy = new_proxy_vhost(server, &config_dir).unwrap();
        assert!(proxy.proxies().unwrap().is_empty());
        assert!(proxy.upstreams().unwrap().is_empty());
        assert!(proxy.as_php().is_none());
    }
}

#[test]
fn test_custom_stop_page_root() {
    let (dir, config_dir) = site();
    let stop = dir.path().join("stopped");
    let engine = EngineConfig {
        server: ServerType::Apache,
        stop_page_root: Some(stop.clone()),
        ..EngineConfig::default()
    };

    let mut vhost = new_static_vhost_with_config(&config_dir, &engine).unwrap();
    let root = vhost.root();
    vhost.set_enable(false).unwrap();
    assert_eq!(PathBuf::from(vhost.root()), stop);
    vhost.save().unwrap();
    assert!(fs::read_to_string(config_dir.join("apache.conf")).unwrap().contains("stopped"));

    vhost.set_enable(true).unwrap();
    assert_eq!(vhost.root(), root);
}
