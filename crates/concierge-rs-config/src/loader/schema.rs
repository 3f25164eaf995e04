//! Schema validation helpers for Concierge JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer (or the merged document) against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &[
            "$schema",
            "model",
            "window",
            "orchestrator",
            "retry",
            "memory",
            "retrieval",
            "sessions",
            "logging",
            "forms",
        ],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("model") {
        validate_model(value, layer, "model")?;
    }
    if let Some(value) = map.get("window") {
        let map = expect_object(value, layer, "window")?;
        ensure_allowed_keys(map, &["max_messages"], layer, "window")?;
        if let Some(value) = map.get("max_messages") {
            expect_u64(value, layer, "window.max_messages")?;
        }
    }
    if let Some(value) = map.get("orchestrator") {
        validate_orchestrator(value, layer, "orchestrator")?;
    }
    if let Some(value) = map.get("retry") {
        validate_retry(value, layer, "retry")?;
    }
    if let Some(value) = map.get("memory") {
        validate_memory(value, layer, "memory")?;
    }
    if let Some(value) = map.get("retrieval") {
        validate_retrieval(value, layer, "retrieval")?;
    }
    if let Some(value) = map.get("sessions") {
        let map = expect_object(value, layer, "sessions")?;
        ensure_allowed_keys(map, &["enabled", "path"], layer, "sessions")?;
        if let Some(value) = map.get("enabled") {
            expect_bool(value, layer, "sessions.enabled")?;
        }
        if let Some(value) = map.get("path") {
            expect_string(value, layer, "sessions.path")?;
        }
    }
    if let Some(value) = map.get("logging") {
        validate_logging(value, layer, "logging")?;
    }
    if let Some(value) = map.get("forms") {
        validate_forms(value, layer, "forms")?;
    }
    Ok(())
}

/// Validate the "model" block.
fn validate_model(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["default", "available", "temperature", "max_tokens"],
        layer,
        path,
    )?;
    if let Some(value) = map.get("default") {
        expect_string(value, layer, &join_path(path, "default"))?;
    }
    if let Some(value) = map.get("available") {
        validate_string_array(value, layer, &join_path(path, "available"))?;
    }
    if let Some(value) = map.get("temperature") {
        let temperature_path = join_path(path, "temperature");
        expect_f64(value, layer, &temperature_path)?;
        if !value.as_f64().is_some_and(|t| (0.0..=2.0).contains(&t)) {
            return Err(invalid_field(
                layer,
                &temperature_path,
                "expected a value between 0 and 2",
            ));
        }
    }
    if let Some(value) = map.get("max_tokens") {
        expect_u64(value, layer, &join_path(path, "max_tokens"))?;
    }
    Ok(())
}

/// Validate the "orchestrator" block.
fn validate_orchestrator(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "system_prompt",
            "max_tool_iterations",
            "stream_buffer",
            "parallel_tools",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("system_prompt") {
        expect_string(value, layer, &join_path(path, "system_prompt"))?;
    }
    if let Some(value) = map.get("max_tool_iterations") {
        expect_u64(value, layer, &join_path(path, "max_tool_iterations"))?;
    }
    if let Some(value) = map.get("stream_buffer") {
        expect_u64(value, layer, &join_path(path, "stream_buffer"))?;
    }
    if let Some(value) = map.get("parallel_tools") {
        expect_bool(value, layer, &join_path(path, "parallel_tools"))?;
    }
    Ok(())
}

/// Validate the "retry" block.
fn validate_retry(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    let keys = ["max_attempts", "initial_backoff_ms", "max_backoff_ms"];
    ensure_allowed_keys(map, &keys, layer, path)?;
    for key in keys {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate the "memory" block.
fn validate_memory(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["path", "recall_threshold", "recall_limit"],
        layer,
        path,
    )?;
    if let Some(value) = map.get("path") {
        expect_string(value, layer, &join_path(path, "path"))?;
    }
    if let Some(value) = map.get("recall_threshold") {
        expect_f64(value, layer, &join_path(path, "recall_threshold"))?;
    }
    if let Some(value) = map.get("recall_limit") {
        expect_u64(value, layer, &join_path(path, "recall_limit"))?;
    }
    Ok(())
}

/// Validate the "retrieval" block.
fn validate_retrieval(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["embeddings_model", "threshold", "top_k"], layer, path)?;
    if let Some(value) = map.get("embeddings_model") {
        expect_string(value, layer, &join_path(path, "embeddings_model"))?;
    }
    if let Some(value) = map.get("threshold") {
        expect_f64(value, layer, &join_path(path, "threshold"))?;
    }
    if let Some(value) = map.get("top_k") {
        expect_u64(value, layer, &join_path(path, "top_k"))?;
    }
    Ok(())
}

/// Validate the "logging" block.
fn validate_logging(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["level", "format"], layer, path)?;
    if let Some(value) = map.get("level") {
        let level_path = join_path(path, "level");
        let level = value
            .as_str()
            .ok_or_else(|| invalid_field(layer, &level_path, "expected string"))?;
        if !["off", "error", "warn", "info", "debug", "trace"]
            .contains(&level.to_ascii_lowercase().as_str())
        {
            return Err(invalid_field(layer, &level_path, "unknown log level"));
        }
    }
    if let Some(value) = map.get("format") {
        let format_path = join_path(path, "format");
        match value.as_str() {
            Some("console") | Some("json") => {}
            _ => {
                return Err(invalid_field(
                    layer,
                    &format_path,
                    "expected \"console\" or \"json\"",
                ));
            }
        }
    }
    Ok(())
}

/// Validate the "forms" list.
fn validate_forms(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let forms = expect_array(value, layer, path)?;
    for (idx, form) in forms.iter().enumerate() {
        let form_path = format!("{path}[{idx}]");
        let map = expect_object(form, layer, &form_path)?;
        ensure_allowed_keys(map, &["name", "description", "fields"], layer, &form_path)?;
        for key in ["name", "description"] {
            let key_path = join_path(&form_path, key);
            let value = map
                .get(key)
                .ok_or_else(|| invalid_field(layer, &key_path, "missing required field"))?;
            expect_string(value, layer, &key_path)?;
        }
        let fields_path = join_path(&form_path, "fields");
        let fields = map
            .get("fields")
            .ok_or_else(|| invalid_field(layer, &fields_path, "missing required field"))?;
        validate_string_array(fields, layer, &fields_path)?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON array or return a typed error.
fn expect_array<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Vec<Value>, ConfigError> {
    match value {
        Value::Array(arr) => Ok(arr),
        _ => Err(invalid_field(layer, path, "expected array")),
    }
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::String(_) => Ok(()),
        _ => Err(invalid_field(layer, path, "expected string")),
    }
}

fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::Bool(_) => Ok(()),
        _ => Err(invalid_field(layer, path, "expected bool")),
    }
}

fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Validate that a value is an array of strings.
fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    for (idx, entry) in expect_array(value, layer, path)?.iter().enumerate() {
        if !entry.is_string() {
            return Err(invalid_field(
                layer,
                &format!("{path}[{idx}]"),
                "expected string",
            ));
        }
    }
    Ok(())
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error prefixed with the layer label.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::invalid(format!("{layer}:{normalized_path}"), message)
}
