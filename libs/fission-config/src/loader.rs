//! Layered configuration loading
//!
//! Merge priority, lowest to highest: struct defaults, environment
//! variables with a service prefix, YAML file. The merge happens on
//! serde_json value trees so partial YAML files and single env overrides
//! compose with the typed defaults.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use tracing::{debug, info};

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON merge error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Generic layered loader.
pub struct ConfigLoader<T>
where
    T: Default + DeserializeOwned + Serialize,
{
    defaults: T,
    env_prefix: Option<String>,
    yaml_path: Option<String>,
}

impl<T> Default for ConfigLoader<T>
where
    T: Default + DeserializeOwned + Serialize,
{
    fn default() -> Self {
        Self {
            defaults: T::default(),
            env_prefix: None,
            yaml_path: None,
        }
    }
}

impl<T> ConfigLoader<T>
where
    T: Default + DeserializeOwned + Serialize,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self, defaults: T) -> Self {
        self.defaults = defaults;
        self
    }

    /// Environment variables `PREFIX_SECTION_FIELD` map onto
    /// `section.field`.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    pub fn with_yaml_file(mut self, path: &str) -> Self {
        self.yaml_path = Some(path.to_string());
        self
    }

    pub fn build(self) -> Result<T> {
        let mut tree = serde_json::to_value(&self.defaults)?;
        debug!("Starting from default configuration");

        if let Some(prefix) = &self.env_prefix {
            debug!("Applying environment variables, prefix: {}", prefix);
            self.apply_env_vars(&mut tree, prefix);
        }

        if let Some(yaml_path) = &self.yaml_path {
            if Path::new(yaml_path).exists() {
                info!("Loading YAML config file: {}", yaml_path);
                let content = std::fs::read_to_string(yaml_path)?;
                let overlay: JsonValue = serde_yaml::from_str(&content)?;
                merge_json_values(&mut tree, &overlay);
            } else {
                debug!("YAML config file not found, skipping: {}", yaml_path);
            }
        }

        Ok(serde_json::from_value(tree)?)
    }

    fn apply_env_vars(&self, tree: &mut JsonValue, prefix: &str) {
        let vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(prefix)).collect();

        for (key, value) in vars {
            // PREFIX_SECTION_FIELD_NAME -> section.field_name: the first
            // token selects the section, the remainder is the field
            let stripped = key
                .strip_prefix(prefix)
                .unwrap_or(&key)
                .trim_start_matches('_')
                .to_lowercase();
            let path = match stripped.split_once('_') {
                Some((section, field)) => format!("{}.{}", section, field),
                None => stripped,
            };
            if path.is_empty() {
                continue;
            }
            debug!("Applying environment override {} -> {}", key, path);
            set_value_by_path(tree, &path, &value);
        }
    }
}

fn merge_json_values(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_json_values(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn set_value_by_path(tree: &mut JsonValue, path: &str, value: &str) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = tree;

    for (i, part) in parts.iter().enumerate() {
        let JsonValue::Object(map) = current else {
            return;
        };
        if i == parts.len() - 1 {
            map.insert(part.to_string(), parse_env_value(value));
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
    }
}

fn parse_env_value(value: &str) -> JsonValue {
    if let Ok(b) = value.parse::<bool>() {
        return JsonValue::Bool(b);
    }
    if let Ok(i) = value.parse::<i64>() {
        return JsonValue::Number(serde_json::Number::from(i));
    }
    if let Ok(f) = value.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return JsonValue::Number(n);
        }
    }
    JsonValue::String(value.to_string())
}
