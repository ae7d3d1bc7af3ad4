//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{BackendKind, Settings};

/// Resolve the path to the settings file (`~/.mindflow/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mindflow").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides. `lookup` returns a variable's value, if set.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("AI_PROVIDER") {
        settings.default_backend = v;
    }
    if let Some(v) = read("VOICE_SERVER_URL") {
        settings.voice.base_url = v;
    }
    if let Some(v) = read("GPT5_SERVICE_URL") {
        for backend in settings.backends.values_mut() {
            if backend.kind == BackendKind::StatefulResponses {
                backend.base_url = v.clone();
            }
        }
    }
    if let Some(v) = read("GPT5_PRO_MODEL") {
        if let Some(backend) = settings.backends.get_mut("gpt5-pro") {
            backend.model = v;
        }
    }
    if let Some(v) = read("GPT5_THINKING_MODEL") {
        if let Some(backend) = settings.backends.get_mut("gpt5-thinking") {
            backend.model = v;
        }
    }
    if let Some(v) = read("OLLAMA_URL") {
        for backend in settings.backends.values_mut() {
            if backend.kind == BackendKind::Relay {
                backend.base_url = v.clone();
            }
        }
    }
    if let Some(v) = read("MINDFLOW_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("MINDFLOW_PORT") {
        match parse_ranged::<u16>(&v, 1, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "MINDFLOW_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("MINDFLOW_MAX_ITERATIONS") {
        match parse_ranged::<u32>(&v, 1, 50) {
            Some(n) => settings.orchestration.max_iterations = n,
            None => {
                warn!(key = "MINDFLOW_MAX_ITERATIONS", value = %v, "invalid iteration cap, ignoring")
            }
        }
    }
    if let Some(v) = read("MINDFLOW_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a number within an inclusive range.
pub fn parse_ranged<T: std::str::FromStr + PartialOrd>(val: &str, min: T, max: T) -> Option<T> {
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn validate(settings: &Settings) -> Result<()> {
    if !settings.backends.contains_key(&settings.default_backend) {
        return Err(SettingsError::InvalidValue(format!(
            "unknown default backend: {}",
            settings.default_backend
        )));
    }
    if settings.orchestration.max_iterations == 0 {
        return Err(SettingsError::InvalidValue(
            "orchestration.maxIterations must be at least 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_objects_per_key() {
        let merged = deep_merge(
            json!({"server": {"host": "0.0.0.0", "port": 3000}}),
            json!({"server": {"port": 8080}}),
        );
        assert_eq!(merged, json!({"server": {"host": "0.0.0.0", "port": 8080}}));
    }

    #[test]
    fn merge_replaces_arrays_and_skips_nulls() {
        let merged = deep_merge(
            json!({"tools": [1, 2], "level": "info"}),
            json!({"tools": [3], "level": null}),
        );
        assert_eq!(merged, json!({"tools": [3], "level": "info"}));
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_file_layer(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_overrides_single_backend_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"backends": {"ollama": {"model": "llama3.1"}}, "server": {"port": 9000}}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.backends["ollama"].model, "llama3.1");
        assert_eq!(settings.backends["ollama"].base_url, "http://localhost:11434");
        assert_eq!(settings.backends.len(), Settings::default().backends.len());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_file_layer(&path), Err(SettingsError::Json(_))));
    }

    // ── env layer ───────────────────────────────────────────────────

    #[test]
    fn env_overrides_provider_and_urls() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("AI_PROVIDER", "claude"),
                ("VOICE_SERVER_URL", "http://voice:8001"),
                ("GPT5_SERVICE_URL", "http://gpt5:8002"),
                ("GPT5_PRO_MODEL", "gpt-5-pro"),
            ]),
        );
        assert_eq!(settings.default_backend, "claude");
        assert_eq!(settings.voice.base_url, "http://voice:8001");
        assert_eq!(settings.backends["gpt5-pro"].base_url, "http://gpt5:8002");
        assert_eq!(settings.backends["gpt5-thinking"].base_url, "http://gpt5:8002");
        assert_eq!(settings.backends["gpt5-pro"].model, "gpt-5-pro");
        assert_eq!(settings.backends["gpt5-thinking"].model, "gpt-5");
    }

    #[test]
    fn invalid_numeric_env_values_are_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env(&[("MINDFLOW_PORT", "99999"), ("MINDFLOW_MAX_ITERATIONS", "0")]),
        );
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.orchestration.max_iterations, 5);

        apply_env_overrides(
            &mut settings,
            env(&[("MINDFLOW_PORT", "8080"), ("MINDFLOW_MAX_ITERATIONS", "8")]),
        );
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.orchestration.max_iterations, 8);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, env(&[("AI_PROVIDER", "")]));
        assert_eq!(settings.default_backend, "openai");
    }

    #[test]
    fn parse_ranged_bounds() {
        assert_eq!(parse_ranged::<u32>("5", 1, 50), Some(5));
        assert_eq!(parse_ranged::<u32>("51", 1, 50), None);
        assert_eq!(parse_ranged::<u32>("abc", 1, 50), None);
    }

    #[test]
    fn validate_rejects_unknown_default_backend() {
        let settings = Settings {
            default_backend: "mystery".into(),
            ..Settings::default()
        };
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("mystery")
        ));
        assert!(validate(&Settings::default()).is_ok());
    }
}
