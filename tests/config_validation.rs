//! Integration tests for configuration validation
//!
//! Verifies that invalid configurations are rejected at startup (Config::from_file())
//! rather than causing runtime errors. Tests the full path: file → parse → validate.

use stackrelay::config::Config;
use stackrelay::error::AppError;
use std::io::Write;
use tempfile::NamedTempFile;

/// Helper to create a temporary config file with given TOML content
fn create_temp_config(toml_content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file
        .write_all(toml_content.as_bytes())
        .expect("Failed to write temp file");
    temp_file.flush().expect("Failed to flush temp file");
    temp_file
}

fn config_with_provider(provider_section: &str) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = 3000

[provider]
{provider_section}
"#
    )
}

fn assert_validation_error(toml_content: &str, expected: &str) {
    let temp_file = create_temp_config(toml_content);
    let err = Config::from_file(temp_file.path()).unwrap_err();

    assert!(
        matches!(err, AppError::ConfigValidationFailed { .. }),
        "expected validation failure, got {:?}",
        err
    );
    let message = err.to_string();
    assert!(
        message.contains(expected),
        "expected {:?} in {:?}",
        expected,
        message
    );
    assert!(message.contains(&temp_file.path().display().to_string()));
}

#[test]
fn test_minimal_config_loads() {
    let temp_file = create_temp_config(&config_with_provider(
        r#"
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
"#,
    ));

    let config = Config::from_file(temp_file.path()).expect("should load");
    assert_eq!(config.provider.model(), "gpt-4o-mini");
    assert_eq!(config.streaming.keep_alive_seconds, 15);
}

#[test]
fn test_missing_file_reports_path() {
    let err = Config::from_file("/definitely/not/here/config.toml").unwrap_err();
    assert!(matches!(err, AppError::ConfigFileRead { .. }));
    assert!(err.to_string().contains("/definitely/not/here/config.toml"));
}

#[test]
fn test_invalid_toml_reports_parse_failure() {
    let temp_file = create_temp_config("[server\nhost = ");
    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
}

#[test]
fn test_missing_provider_section_is_parse_failure() {
    let temp_file = create_temp_config(
        r#"
[server]
host = "127.0.0.1"
port = 3000
"#,
    );
    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    assert!(err.to_string().contains("provider"));
}

#[test]
fn test_rejects_base_url_without_scheme() {
    assert_validation_error(
        &config_with_provider(
            r#"
base_url = "api.openai.com/v1"
model = "gpt-4o-mini"
"#,
        ),
        "provider.base_url",
    );
}

#[test]
fn test_rejects_blank_model() {
    assert_validation_error(
        &config_with_provider(
            r#"
base_url = "https://api.openai.com/v1"
model = "  "
"#,
        ),
        "provider.model",
    );
}

#[test]
fn test_rejects_zero_and_excessive_timeouts() {
    assert_validation_error(
        &config_with_provider(
            r#"
base_url = "https://api.openai.com/v1"
model = "m"
timeout_seconds = 0
"#,
        ),
        "provider.timeout_seconds",
    );

    assert_validation_error(
        &config_with_provider(
            r#"
base_url = "https://api.openai.com/v1"
model = "m"
timeout_seconds = 301
"#,
        ),
        "cannot exceed 300",
    );
}

#[test]
fn test_rejects_zero_retries() {
    assert_validation_error(
        &config_with_provider(
            r#"
base_url = "https://api.openai.com/v1"
model = "m"
max_retries = 0
"#,
        ),
        "provider.max_retries",
    );
}

#[test]
fn test_rejects_out_of_range_temperature() {
    assert_validation_error(
        &config_with_provider(
            r#"
base_url = "https://api.openai.com/v1"
model = "m"
temperature = 2.5
"#,
        ),
        "provider.temperature",
    );
}

#[test]
fn test_rejects_zero_idle_timeout() {
    let toml_content = format!(
        "{}\n[streaming]\nidle_timeout_seconds = 0\n",
        config_with_provider(
            r#"
base_url = "https://api.openai.com/v1"
model = "m"
"#
        )
    );
    assert_validation_error(&toml_content, "streaming.idle_timeout_seconds");
}

#[test]
fn test_api_key_env_falls_back_to_none_when_unset() {
    let temp_file = create_temp_config(&config_with_provider(
        r#"
base_url = "https://api.openai.com/v1"
model = "m"
api_key_env = "STACKRELAY_CONFIG_TEST_NEVER_SET"
"#,
    ));

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.provider.resolve_api_key(), None);
}

#[test]
fn test_blank_config_key_is_ignored() {
    let temp_file = create_temp_config(&config_with_provider(
        r#"
base_url = "https://api.openai.com/v1"
model = "m"
api_key = "   "
api_key_env = "STACKRELAY_CONFIG_TEST_NEVER_SET"
"#,
    ));

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.provider.resolve_api_key(), None);
}

#[test]
fn test_rejects_hostname_bind_address() {
    assert_validation_error(
        r#"
[server]
host = "localhost"
port = 3000

[provider]
base_url = "https://api.openai.com/v1"
model = "m"
"#,
        "server.host 'localhost' must be an IP address",
    );
}

#[test]
fn test_loopback_bind_address_is_kept() {
    let temp_file = create_temp_config(&config_with_provider(
        r#"
base_url = "https://api.openai.com/v1"
model = "m"
"#,
    ));

    let config = Config::from_file(temp_file.path()).unwrap();
    let addr = config.server.socket_addr().unwrap();
    assert!(addr.ip().is_loopback());
    assert_eq!(addr.port(), 3000);
}

#[test]
fn test_api_key_env_used_when_config_key_absent() {
    // SAFETY: the variable name is unique to this test
    unsafe { std::env::set_var("STACKRELAY_CONFIG_TEST_ENV_ONLY", "sk-from-env") };

    let temp_file = create_temp_config(&config_with_provider(
        r#"
base_url = "https://api.openai.com/v1"
model = "m"
api_key_env = "STACKRELAY_CONFIG_TEST_ENV_ONLY"
"#,
    ));

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.provider.resolve_api_key().as_deref(),
        Some("sk-from-env")
    );
}

#[test]
fn test_config_key_wins_over_env() {
    // SAFETY: the variable name is unique to this test
    unsafe { std::env::set_var("STACKRELAY_CONFIG_TEST_ENV_SHADOWED", "sk-from-env") };

    let temp_file = create_temp_config(&config_with_provider(
        r#"
base_url = "https://api.openai.com/v1"
model = "m"
api_key = "sk-from-config"
api_key_env = "STACKRELAY_CONFIG_TEST_ENV_SHADOWED"
"#,
    ));

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.provider.resolve_api_key().as_deref(),
        Some("sk-from-config")
    );
}
