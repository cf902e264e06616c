use super::data::Config;
use super::defaults::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use super::io::ConfigError;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(config, Config::default());
    assert_eq!(config.model, DEFAULT_MODEL);
    assert_eq!(config.base_url, DEFAULT_BASE_URL);
    assert!(config.system_prompt.contains("{tools}"));
}

#[test]
fn partial_config_keeps_defaults_for_missing_fields() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "model = \"gpt-4o-mini\"\npython_command = \"uv run\"\n",
    )
    .expect("write config");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(config.model, "gpt-4o-mini");
    assert_eq!(config.python_command, "uv run");
    assert_eq!(config.node_command, "node");
    assert_eq!(config.api_key_env, "OPENAI_API_KEY");
}

#[test]
fn invalid_toml_reports_parse_error_with_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "model = [").expect("write config");

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at "));
}

#[test]
fn base_url_env_override_wins_over_file() {
    let mut config = Config {
        base_url: "https://example.invalid".to_string(),
        ..Config::default()
    };
    config.apply_env_overrides(env_from(&[("OPENAI_BASE_URL", " http://localhost:11434/v1 ")]));
    assert_eq!(config.base_url, "http://localhost:11434/v1");

    config.apply_env_overrides(env_from(&[("OPENAI_BASE_URL", "  ")]));
    assert_eq!(config.base_url, "http://localhost:11434/v1");
}

#[test]
fn api_key_is_read_from_configured_variable() {
    let config = Config {
        api_key_env: "DEEPSEEK_API_KEY".to_string(),
        ..Config::default()
    };
    assert_eq!(
        config.api_key(env_from(&[("DEEPSEEK_API_KEY", "sk-test")])),
        Some("sk-test".to_string())
    );
    assert_eq!(config.api_key(env_from(&[("OPENAI_API_KEY", "sk-other")])), None);
    assert_eq!(config.api_key(env_from(&[("DEEPSEEK_API_KEY", "")])), None);
}
