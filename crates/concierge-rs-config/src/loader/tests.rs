//! Tests for layered configuration loading.

use super::*;
use crate::LogFormat;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

fn isolated_options(root: &Path, cwd: &Path) -> LayeredConfigOptions {
    LayeredConfigOptions {
        system_config_path: Some(root.join("system.json5")),
        user_config_path: Some(root.join("user.json5")),
        ..LayeredConfigOptions::new(cwd)
    }
}

#[test]
fn parse_minimal_config_applies_defaults() {
    let config = ConciergeConfig::load_from_str("{}").expect("config");
    assert_eq!(config.model.default, "openai:gpt-4o");
    assert_eq!(config.window.max_messages, 10);
    assert_eq!(config.memory.recall_threshold, 0.3);
    assert_eq!(config.memory.recall_limit, 3);
    assert_eq!(config.retrieval.threshold, 0.3);
    assert_eq!(config.logging.format, LogFormat::Console);
    let names = config
        .forms
        .iter()
        .map(|form| form.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["address_change", "book_appointment", "open_account"]);
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = ConciergeConfig::load_from_str("{ unexpected: true }").unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

#[test]
fn rejects_threshold_out_of_range() {
    let err = ConciergeConfig::load_from_str("{ retrieval: { threshold: 1.5 } }").unwrap_err();
    assert!(format!("{err}").contains("retrieval.threshold"));
}

#[test]
fn rejects_unknown_log_format() {
    let err = ConciergeConfig::load_from_str(r#"{ logging: { format: "xml" } }"#).unwrap_err();
    assert!(format!("{err}").contains("logging.format"));
}

#[test]
fn rejects_duplicate_form_names() {
    let json5 = r#"{
        forms: [
            { name: "a", description: "first", fields: ["x"] },
            { name: "a", description: "second", fields: ["y"] },
        ],
    }"#;
    let err = ConciergeConfig::load_from_str(json5).unwrap_err();
    assert!(format!("{err}").contains("duplicate form name"));
}

#[test]
fn rejects_reserved_form_field() {
    let json5 = r#"{ forms: [{ name: "a", description: "", fields: ["user_id"] }] }"#;
    let err = ConciergeConfig::load_from_str(json5).unwrap_err();
    assert!(format!("{err}").contains("reserved"));
}

#[test]
fn rejects_model_without_provider() {
    let err = ConciergeConfig::load_from_str(r#"{ model: { default: "gpt-4o" } }"#).unwrap_err();
    assert!(format!("{err}").contains("model.default"));
}

#[test]
fn layered_config_prefers_later_layers() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    write_json5(
        &root.join("system.json5"),
        "{ window: { max_messages: 4 }, memory: { recall_limit: 7 } }",
    );
    write_json5(&root.join("user.json5"), "{ window: { max_messages: 6 } }");
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ window: { max_messages: 8 } }",
    );
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ window: { max_messages: 12 } }",
    );

    let layered =
        ConciergeConfig::load_layered_with_options(isolated_options(root, &cwd)).expect("layered");
    assert_eq!(layered.config.window.max_messages, 12);
    assert_eq!(layered.config.memory.recall_limit, 7);
    let sources = layered
        .layers
        .iter()
        .map(|layer| layer.source)
        .collect::<Vec<_>>();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::System,
            ConfigLayerSource::User,
            ConfigLayerSource::Project,
            ConfigLayerSource::Cwd,
        ]
    );
}

#[test]
fn runtime_layer_overrides_local_layers() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let cwd = root.join("work");
    fs::create_dir_all(&cwd).expect("cwd");
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), r#"{ model: { default: "openai:gpt-4o-mini" } }"#);
    let runtime = root.join("runtime.json5");
    write_json5(&runtime, r#"{ model: { default: "openai:gpt-4o" }, retry: { max_attempts: 5 } }"#);

    let options = isolated_options(root, &cwd).with_runtime_path(&runtime);
    let layered = ConciergeConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.model.default, "openai:gpt-4o");
    assert_eq!(layered.config.retry.max_attempts, 5);
}

#[test]
fn missing_runtime_layer_is_an_error() {
    let temp = TempDir::new().expect("tmp");
    let options =
        isolated_options(temp.path(), temp.path()).with_runtime_path(temp.path().join("nope.json5"));
    let err = ConciergeConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed { .. }));
}

#[test]
fn invalid_layer_reports_layer_label() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    write_json5(&root.join("user.json5"), "{ sessions: { enabled: \"yes\" } }");
    let err = ConciergeConfig::load_layered_with_options(isolated_options(root, root)).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("user("));
    assert!(msg.contains("sessions.enabled"));
}

#[test]
fn builder_overrides_sections() {
    let config = ConciergeConfig::builder()
        .window(crate::WindowConfig { max_messages: 3 })
        .forms(Vec::new())
        .build();
    assert_eq!(config.window.max_messages, 3);
    assert!(config.forms.is_empty());
    assert_eq!(config.retry, crate::RetryConfig::default());
}
