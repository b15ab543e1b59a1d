//! Configuration loading and management

use super::schema::Config;
use super::validate::validate_config;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Fields every backend variant carries; kept when the variant changes.
const SHARED_BACKEND_FIELDS: [&str; 4] = ["endpoint", "model", "timeout_ms", "headers"];

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|h| h.join(".accueil"))
            .unwrap_or_else(|| PathBuf::from(".accueil"));

        Self { config_dir }
    }

    /// Create a new config loader with a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file and environment
    pub fn load(&self) -> crate::Result<Config> {
        let config_path = self.config_path();
        let mut merged = serde_json::to_value(Config::default())?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let file_value: Value = serde_json::from_str(&content)?;
            merge_config(&mut merged, file_value);
        }

        apply_alias_overrides(&mut merged);
        apply_path_overrides(&mut merged);

        let config: Config = serde_json::from_value(merged)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge a file overlay into the defaults.
///
/// A plain deep merge would leave variant-specific defaults (e.g. the chat
/// `path`) behind when the file selects another backend kind, so the backend
/// section is re-tagged first.
fn merge_config(base: &mut Value, overlay: Value) {
    if let Some(kind) = overlay
        .get("backend")
        .and_then(|b| b.get("kind"))
        .and_then(Value::as_str)
    {
        switch_backend_kind(base, kind);
    }
    merge_values(base, overlay);
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if let Some(existing) = base_map.get_mut(&key) {
                    merge_values(existing, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

/// Replace `backend` with a bare object of the given kind, keeping only the
/// connection fields shared by all variants.
fn switch_backend_kind(config: &mut Value, kind: &str) {
    let Some(root) = config.as_object_mut() else {
        return;
    };
    let current = root.get("backend").cloned().unwrap_or(Value::Null);
    if current.get("kind").and_then(Value::as_str) == Some(kind) {
        return;
    }

    let mut fresh = Map::new();
    fresh.insert("kind".to_string(), Value::String(kind.to_string()));
    if let Value::Object(old) = current {
        for field in SHARED_BACKEND_FIELDS {
            if let Some(value) = old.get(field) {
                fresh.insert(field.to_string(), value.clone());
            }
        }
    }
    root.insert("backend".to_string(), Value::Object(fresh));
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Number(v.into());
    }
    if let Ok(v) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(v) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn set_path_value(root: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }

    let mut current = root;
    for segment in &path[..path.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(path[path.len() - 1].clone(), value);
    }
}

fn apply_alias_overrides(config: &mut Value) {
    let aliases = [
        ("ACCUEIL_LLM_ENDPOINT", "backend.endpoint"),
        ("ACCUEIL_LLM_MODEL", "backend.model"),
    ];

    for (env_key, target_path) in aliases {
        if let Ok(value) = std::env::var(env_key) {
            let path: Vec<String> = target_path.split('.').map(ToString::to_string).collect();
            set_path_value(config, &path, Value::String(value));
        }
    }

    if let Ok(key) = std::env::var("ACCUEIL_LLM_API_KEY") {
        let path = ["backend", "headers", "Authorization"].map(ToString::to_string);
        set_path_value(config, &path, Value::String(format!("Bearer {}", key)));
    }
}

fn apply_path_overrides(config: &mut Value) {
    const PREFIX: &str = "ACCUEIL__";
    let mut overrides: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| key.starts_with(PREFIX))
        .collect();
    // Kind first, so later field overrides land on the selected variant.
    overrides.sort_by_key(|(key, _)| key != "ACCUEIL__BACKEND__KIND");

    for (key, value) in overrides {
        let suffix = &key[PREFIX.len()..];
        let segments: Vec<String> = suffix
            .split("__")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if segments.is_empty() {
            continue;
        }
        if segments == ["backend", "kind"] {
            switch_backend_kind(config, &value);
            continue;
        }
        set_path_value(config, &segments, parse_env_value(&value));
    }
}
