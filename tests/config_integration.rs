use esce_session::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("ESCE_API__BASE_URL");
        env::remove_var("ESCE_BADGES__POLL_INTERVAL_SECS");
        env::remove_var("ESCE_SESSION__PUBLIC_ROUTES");
        env::remove_var("API_BASE_URL");
        env::remove_var("STORAGE_DIR");
        env::remove_var("CONFIG_FILE");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(["esce"]).expect("defaults should load");

    assert_eq!(config.api.base_url, "http://localhost:5000/api");
    assert_eq!(config.session.probe_timeout_ms, 5000);
    assert_eq!(config.session.login_route, "/login");
    assert!(config.session.public_routes.iter().any(|r| r == "/tours"));
    assert_eq!(config.badges.poll_interval_secs, 30);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("ESCE_API__BASE_URL", "https://api.esce.test/api");
        env::set_var("ESCE_BADGES__POLL_INTERVAL_SECS", "45");
        env::set_var("ESCE_SESSION__PUBLIC_ROUTES", "/, /login, /promo");
    }

    let config = AppConfig::load_from_args(["esce"]).expect("Failed to load config");
    assert_eq!(config.api.base_url, "https://api.esce.test/api");
    assert_eq!(config.badges.poll_interval_secs, 45);
    assert_eq!(config.session.public_routes, vec!["/", "/login", "/promo"]);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_flag_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("ESCE_API__BASE_URL", "https://from-env/api");
    }

    let config = AppConfig::load_from_args(["esce", "--base-url", "https://from-flag/api"])
        .expect("Failed to load config");
    assert_eq!(config.api.base_url, "https://from-flag/api");

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("custom.yaml");
    fs::write(
        &file_path,
        r#"
api:
  base_url: "https://staging.esce.test/api"
badges:
  poll_interval_secs: 10
session:
  public_routes: ["/", "/login"]
"#,
    )
    .expect("Failed to write temp config");

    let path = file_path.to_str().unwrap();
    let config =
        AppConfig::load_from_args(["esce", "--config", path]).expect("Failed to load config");

    assert_eq!(config.api.base_url, "https://staging.esce.test/api");
    assert_eq!(config.badges.poll_interval_secs, 10);
    assert_eq!(config.session.public_routes, vec!["/", "/login"]);
    assert_eq!(config.storage.dir, ".esce");
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();

    let result = AppConfig::load_from_args(["esce", "--config", "/nonexistent/esce.yaml"]);
    assert!(result.is_err());
}
