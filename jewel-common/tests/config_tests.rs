//! Integration tests for configuration resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate JEWEL_* variables are marked with #[serial].

use jewel_common::config::{
    resolve_config_path, resolve_sarvam_api_key, TomlConfig, CONFIG_ENV_VAR,
    INDEX_URL_ENV_VAR, SARVAM_KEY_ENV_VAR,
};
use jewel_common::logging::bootstrap_subscriber;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Log sink shared between a test and its subscriber
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_cli_path_takes_precedence_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/jewel-env-config.toml");

    let resolved = resolve_config_path(Some(PathBuf::from("/tmp/cli.toml").as_path()));
    assert_eq!(resolved, Some(PathBuf::from("/tmp/cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/jewel-env-config.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/jewel-env-config.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    env::remove_var(SARVAM_KEY_ENV_VAR);
    let config =
        TomlConfig::load_or_default(Some(PathBuf::from("/nonexistent/jewel.toml").as_path()))
            .expect("missing config must not be fatal");

    assert_eq!(config.search.top_n, 50);
    assert_eq!(config.services.collection, "jewelry_collection");
}

#[test]
#[serial]
fn test_load_full_config_with_custom_facet() {
    env::remove_var(SARVAM_KEY_ENV_VAR);
    env::remove_var(INDEX_URL_ENV_VAR);

    let file = write_config(
        r#"
        [logging]
        level = "debug"

        [services]
        index_url = "http://index.internal:6333"
        sarvam_api_key = "toml-key"

        [search]
        top_n = 100
        result_count = 10

        [conflict]
        penalty_multiplier = 0.25
        hard_filter_min_conflicts = 3

        [[conflict.facets]]
        name = "finish"
        metadata_key = "surface_finish"

        [[conflict.facets.values]]
        value = "matte"
        keywords = ["matte", "brushed"]

        [[conflict.facets.values]]
        value = "polished"
        keywords = ["polished", "shiny"]
        "#,
    );

    let config = TomlConfig::load_or_default(Some(file.path())).unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.services.index_url, "http://index.internal:6333");
    assert_eq!(config.services.sarvam_api_key.as_deref(), Some("toml-key"));
    assert_eq!(config.search.top_n, 100);
    assert_eq!(config.search.result_count, 10);
    assert_eq!(config.conflict.penalty_multiplier, 0.25);
    assert_eq!(config.conflict.hard_filter_min_conflicts, Some(3));
    assert_eq!(config.conflict.facets.len(), 1);
    assert_eq!(config.conflict.facets[0].metadata_key(), "surface_finish");
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    let file = write_config("[search\ntop_n = ");
    assert!(TomlConfig::load_or_default(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    let file = write_config(
        r#"
        [rerank]
        concurrency = 0
        "#,
    );
    assert!(TomlConfig::load_or_default(Some(file.path())).is_err());
}

#[test]
fn test_hard_filter_below_two_rejected() {
    for min in [0, 1] {
        let mut config = TomlConfig::default();
        config.conflict.hard_filter_min_conflicts = Some(min);
        assert!(config.validate().is_err(), "threshold {} accepted", min);
    }

    let mut config = TomlConfig::default();
    config.conflict.hard_filter_min_conflicts = Some(2);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_single_conflict_hard_filter_in_file_is_error() {
    let file = write_config(
        r#"
        [conflict]
        hard_filter_min_conflicts = 1
        "#,
    );
    let err = TomlConfig::load_or_default(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("hard_filter_min_conflicts"));
}

#[test]
#[serial]
fn test_missing_config_notice_logged_during_startup() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var("RUST_LOG");
    let log = CapturedLog::default();
    let writer = log.clone();

    let config = tracing::subscriber::with_default(
        bootstrap_subscriber(move || writer.clone()),
        || TomlConfig::load_or_default(Some(Path::new("/nonexistent/jewel-search.toml"))),
    )
    .unwrap();

    assert_eq!(config.search.top_n, TomlConfig::default().search.top_n);
    let output = log.contents();
    assert!(output.contains("/nonexistent/jewel-search.toml"), "{}", output);
    assert!(output.contains("not found"), "{}", output);
}

#[test]
#[serial]
fn test_env_api_key_overrides_toml() {
    env::set_var(SARVAM_KEY_ENV_VAR, "env-key");

    let mut config = TomlConfig::default();
    config.services.sarvam_api_key = Some("toml-key".to_string());

    assert_eq!(resolve_sarvam_api_key(&config).as_deref(), Some("env-key"));

    env::remove_var(SARVAM_KEY_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_api_key_ignored() {
    env::set_var(SARVAM_KEY_ENV_VAR, "   ");

    let mut config = TomlConfig::default();
    config.services.sarvam_api_key = Some("toml-key".to_string());

    assert_eq!(resolve_sarvam_api_key(&config).as_deref(), Some("toml-key"));

    env::remove_var(SARVAM_KEY_ENV_VAR);
}

#[test]
#[serial]
fn test_env_index_url_override() {
    env::set_var(INDEX_URL_ENV_VAR, "http://override:6333");

    let mut config = TomlConfig::default();
    config.apply_env_overrides();
    assert_eq!(config.services.index_url, "http://override:6333");

    env::remove_var(INDEX_URL_ENV_VAR);
}

#[test]
fn test_effective_config_round_trips_through_toml() {
    let config = TomlConfig::default();
    let rendered = config.to_toml_string().unwrap();
    let parsed: TomlConfig = toml::from_str(&rendered).unwrap();

    assert_eq!(parsed.search.top_n, config.search.top_n);
    assert_eq!(parsed.conflict.facets, config.conflict.facets);
}
