//! Table-driven tests for configuration loading and validation.

mod common;

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use common::ConfigBuilder;
use quizgen::config::load_config_from_str;
use quizgen::{load_config, EngineSettings, ModelProvider};

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config: String,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

fn cases() -> Vec<ConfigTestCase> {
    vec![
        ConfigTestCase {
            name: "valid_minimal",
            config: ConfigBuilder::new().build(),
            should_succeed: true,
            expected_error: None,
        },
        ConfigTestCase {
            name: "valid_full",
            config: ConfigBuilder::new()
                .database_path("/var/lib/quizgen/quizgen.db")
                .worker_count(8)
                .retry(5, 2)
                .generation(15, 21)
                .set("prompt_directory", json!("/etc/quizgen/prompts"))
                .model(json!({
                    "provider": "openai",
                    "model": "gpt-4o-mini",
                    "api_key_env": "QUIZGEN_OPENAI_KEY",
                    "base_url": "https://llm.internal/v1",
                    "timeout_secs": 30
                }))
                .build(),
            should_succeed: true,
            expected_error: None,
        },
        ConfigTestCase {
            name: "unsupported_version",
            config: ConfigBuilder::new().set("version", json!("2.0")).build(),
            should_succeed: false,
            expected_error: Some("Schema validation failed"),
        },
        ConfigTestCase {
            name: "unknown_top_level_key",
            config: ConfigBuilder::new().set("broker_url", json!("redis://")).build(),
            should_succeed: false,
            expected_error: Some("Schema validation failed"),
        },
        ConfigTestCase {
            name: "zero_workers",
            config: ConfigBuilder::new().worker_count(0).build(),
            should_succeed: false,
            expected_error: Some("Schema validation failed"),
        },
        ConfigTestCase {
            name: "zero_attempts",
            config: ConfigBuilder::new().retry(0, 1).build(),
            should_succeed: false,
            expected_error: Some("Schema validation failed"),
        },
        ConfigTestCase {
            name: "unknown_provider",
            config: ConfigBuilder::new()
                .model(json!({ "provider": "mistral" }))
                .build(),
            should_succeed: false,
            expected_error: Some("Schema validation failed"),
        },
        ConfigTestCase {
            name: "blank_document_directory",
            config: ConfigBuilder::new().document_directory("   ").build(),
            should_succeed: false,
            expected_error: Some("document_directory must not be empty"),
        },
        ConfigTestCase {
            name: "non_http_base_url",
            config: ConfigBuilder::new()
                .model(json!({ "provider": "gemini", "base_url": "ftp://models" }))
                .build(),
            should_succeed: false,
            expected_error: Some("must be an http(s) URL"),
        },
        ConfigTestCase {
            name: "not_json",
            config: "version = \"1.0\"".to_string(),
            should_succeed: false,
            expected_error: Some("Failed to parse config JSON"),
        },
    ]
}

#[test]
fn test_config_loading_table() {
    for case in cases() {
        let result = load_config_from_str(&case.config);
        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("[{}] expected success, got: {}", case.name, e),
            (false, Ok(_)) => panic!("[{}] expected an error", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "[{}] error '{}' does not contain '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_defaults_applied() {
    let config = load_config_from_str(&ConfigBuilder::new().build()).unwrap();

    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_secs, 1);
    assert_eq!(config.generation.questions_per_topic, 10);
    assert_eq!(config.generation.start_index, 1);
    assert_eq!(config.model.provider, ModelProvider::Gemini);
    assert!(config.worker_count >= 1);

    let settings = EngineSettings::from_config(&config);
    assert_eq!(settings.retry.next_delay(0), Some(Duration::from_secs(1)));
    assert_eq!(settings.retry.next_delay(1), Some(Duration::from_secs(2)));
    assert_eq!(settings.retry.next_delay(2), None);
}

#[test]
fn test_load_config_from_file() {
    let temp = TempDir::new().unwrap();
    let documents = temp.path().join("documents");
    let path = temp.path().join("quizgen.json");
    let content = ConfigBuilder::new()
        .document_directory(documents.to_str().unwrap())
        .database_path(temp.path().join("quizgen.db").to_str().unwrap())
        .worker_count(2)
        .build();
    std::fs::write(&path, content).unwrap();

    let config = load_config(&path).unwrap();

    assert_eq!(config.worker_count, 2);
    assert_eq!(config.document_directory(), documents);
    assert_eq!(
        config.database_path(),
        Some(temp.path().join("quizgen.db"))
    );
    assert!(config.prompt_directory().is_none());
}

#[test]
fn test_load_missing_file() {
    let temp = TempDir::new().unwrap();
    let err = load_config(temp.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
