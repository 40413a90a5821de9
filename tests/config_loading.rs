use std::io::Write;

use sleuth_core::config::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[agent]
step_budget = 12
walker_step_budget = 30
frame_fps = 0.5

[model]
provider = "openai"
model_id = "gpt-4.1-mini"
api_key = "sk-test-key"
max_tokens = 4096
temperature = 0.5

[smart_model]
model_id = "o3"

[model.retry]
max_retries = 5

[search]
api_key = "brave-key"
min_interval_ms = 1500

[eval]
base_url = "http://localhost:7860"
questions_dir = "/tmp/sleuth-test-questions"
username = "tester"
agent_code = "https://example.com/agent"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.agent.step_budget, 12);
    assert_eq!(config.agent.walker_step_budget, 30);
    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_id, "gpt-4.1-mini");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 4096);
    assert_eq!(config.model.retry.as_ref().unwrap().max_retries, 5);

    assert_eq!(config.smart_model().model_id, "o3");
    assert_eq!(config.search.api_key, Some("brave-key".to_string()));
    assert_eq!(config.search.min_interval_ms, 1500);

    assert_eq!(config.eval.base_url, "http://localhost:7860");
    assert_eq!(config.eval.username, Some("tester".to_string()));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SLEUTH_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${SLEUTH_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("SLEUTH_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "gpt-4.1-mini"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.agent.step_budget, 20);
    assert_eq!(config.agent.walker_step_budget, 50);
    assert!((config.agent.frame_fps - 0.2).abs() < f64::EPSILON);
    assert_eq!(config.search.min_interval_ms, 1000);
    assert!(config.search.api_key.is_none());
    assert!(config.smart_model.is_none());
    // Without a configured smart model, escalation falls back to the
    // primary model.
    assert_eq!(config.smart_model().model_id, "gpt-4.1-mini");
    assert!(config.eval.base_url.contains("agents-course"));
}

#[test]
fn test_missing_config_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/sleuth.toml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}
