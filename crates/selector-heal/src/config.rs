//! Engine configuration
//!
//! Layers, later wins: built-in defaults, YAML files, then
//! `SELECTOR_HEAL__<SECTION>__<KEY>` environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheWindows, DEFAULT_EVICTION_WINDOW, DEFAULT_REUSE_WINDOW};
use crate::errors::LocatorError;
use crate::types::ResolveOptions;

const ENV_PREFIX: &str = "SELECTOR_HEAL__";
const ENV_JSON: &str = "SELECTOR_HEAL_OVERRIDE_JSON";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealConfig {
    pub resolve: ResolvePolicy,
    pub cache: CachePolicy,
}

/// Defaults applied to calls that do not pass explicit options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvePolicy {
    pub enable_healing: bool,
    pub max_strategies: usize,
    pub min_confidence: f64,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        let options = ResolveOptions::default();
        Self {
            enable_healing: options.enable_healing,
            max_strategies: options.max_strategies,
            min_confidence: options.min_confidence,
        }
    }
}

impl ResolvePolicy {
    pub fn options(&self) -> ResolveOptions {
        ResolveOptions {
            text_hint: None,
            enable_healing: self.enable_healing,
            max_strategies: self.max_strategies,
            min_confidence: self.min_confidence,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub reuse_window_ms: u64,
    pub eviction_window_ms: u64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            reuse_window_ms: DEFAULT_REUSE_WINDOW.as_millis() as u64,
            eviction_window_ms: DEFAULT_EVICTION_WINDOW.as_millis() as u64,
        }
    }
}

impl CachePolicy {
    pub fn windows(&self) -> CacheWindows {
        CacheWindows {
            reuse: Duration::from_millis(self.reuse_window_ms),
            eviction: Duration::from_millis(self.eviction_window_ms),
        }
    }
}

impl HealConfig {
    pub fn validate(&self) -> Result<(), LocatorError> {
        self.resolve
            .options()
            .validate()
            .map_err(|err| LocatorError::Config(err.to_string()))?;
        if self.cache.eviction_window_ms < self.cache.reuse_window_ms {
            return Err(LocatorError::Config(format!(
                "cache.eviction_window_ms ({}) must be >= cache.reuse_window_ms ({})",
                self.cache.eviction_window_ms, self.cache.reuse_window_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<HealConfig, LocatorError> {
    let mut options = LoadOptions::default();
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    options.include_env = true;
    load_config_with_options(&options)
}

pub fn load_config_with_options(options: &LoadOptions) -> Result<HealConfig, LocatorError> {
    let mut root = serde_json::to_value(HealConfig::default()).map_err(invalid)?;

    for path in &options.paths {
        if path.exists() {
            debug!("Loading selector-heal config from {}", path.display());
            apply_overlays(&mut root, overlays_from_file(path)?)?;
        }
    }

    if options.include_env {
        apply_overlays(&mut root, overlays_from_env()?)?;
    }

    let config: HealConfig = serde_json::from_value(root).map_err(invalid)?;
    config.validate()?;
    Ok(config)
}

struct ConfigOverlay {
    path: String,
    value: Value,
}

fn apply_overlays(root: &mut Value, overlays: Vec<ConfigOverlay>) -> Result<(), LocatorError> {
    for overlay in overlays {
        let mut cursor = &mut *root;
        for segment in overlay.path.split('.') {
            cursor = cursor
                .get_mut(segment)
                .ok_or_else(|| LocatorError::Config(format!("unsupported path: {}", overlay.path)))?;
        }
        *cursor = overlay.value;
    }
    Ok(())
}

fn overlays_from_file(path: &Path) -> Result<Vec<ConfigOverlay>, LocatorError> {
    let content = fs::read_to_string(path)
        .map_err(|err| LocatorError::Config(format!("{}: {}", path.display(), err)))?;
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(invalid)?;
    let json_value = serde_json::to_value(yaml_value).map_err(invalid)?;
    Ok(flatten_value(json_value, None))
}

fn overlays_from_env() -> Result<Vec<ConfigOverlay>, LocatorError> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            overlays.push(ConfigOverlay {
                path,
                value: parse_env_value(&raw),
            });
        }
    }

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json).map_err(invalid)?;
            overlays.extend(flatten_value(json_value, None));
        }
    }

    Ok(overlays)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>) -> Vec<ConfigOverlay> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let key_segment = key.trim().to_ascii_lowercase();
                let next_prefix = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key_segment),
                    _ => key_segment,
                };
                result.extend(flatten_value(value, Some(next_prefix)));
            }
            result
        }
        other => match prefix {
            Some(path) => vec![ConfigOverlay { path, value: other }],
            None => Vec::new(),
        },
    }
}

fn invalid(err: impl std::fmt::Display) -> LocatorError {
    LocatorError::Config(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static ENV_GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_GUARD.get_or_init(|| Mutex::new(()))
    }

    fn file_only(path: &Path) -> LoadOptions {
        LoadOptions {
            paths: vec![path.to_path_buf()],
            include_env: false,
        }
    }

    #[test]
    fn defaults_match_resolve_options() {
        let config = HealConfig::default();
        assert_eq!(config.resolve.options(), ResolveOptions::default());
        assert_eq!(config.cache.windows(), CacheWindows::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("selector-heal.yaml");
        std::fs::write(
            &file_path,
            r#"resolve:
  min_confidence: 0.8
  max_strategies: 3
cache:
  reuse_window_ms: 1000
"#,
        )
        .unwrap();

        let config = load_config_with_options(&file_only(&file_path)).unwrap();
        assert_eq!(config.resolve.min_confidence, 0.8);
        assert_eq!(config.resolve.max_strategies, 3);
        assert!(config.resolve.enable_healing);
        assert_eq!(config.cache.reuse_window_ms, 1000);
        assert_eq!(
            config.cache.eviction_window_ms,
            CachePolicy::default().eviction_window_ms
        );
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let config =
            load_config_with_options(&file_only(Path::new("/nonexistent/heal.yaml"))).unwrap();
        assert_eq!(config, HealConfig::default());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("bad.yaml");
        std::fs::write(&file_path, "resolve:\n  max_attempts: 2\n").unwrap();
        let err = load_config_with_options(&file_only(&file_path)).unwrap_err();
        assert!(err.to_string().contains("resolve.max_attempts"));
    }

    #[test]
    fn inverted_windows_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("windows.yaml");
        std::fs::write(
            &file_path,
            "cache:\n  reuse_window_ms: 5000\n  eviction_window_ms: 100\n",
        )
        .unwrap();
        let err = load_config_with_options(&file_only(&file_path)).unwrap_err();
        assert!(matches!(err, LocatorError::Config(_)));
    }

    #[test]
    fn env_overrides_file() {
        let _guard = env_guard().lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("selector-heal.yaml");
        std::fs::write(&file_path, "resolve:\n  min_confidence: 0.8\n").unwrap();

        env::set_var("SELECTOR_HEAL__RESOLVE__MIN_CONFIDENCE", "0.9");
        env::set_var("SELECTOR_HEAL__RESOLVE__ENABLE_HEALING", "false");
        let loaded = load_config(Some(&file_path));
        env::remove_var("SELECTOR_HEAL__RESOLVE__MIN_CONFIDENCE");
        env::remove_var("SELECTOR_HEAL__RESOLVE__ENABLE_HEALING");

        let config = loaded.unwrap();
        assert_eq!(config.resolve.min_confidence, 0.9);
        assert!(!config.resolve.enable_healing);
    }

    #[test]
    fn env_json_override() {
        let _guard = env_guard().lock().unwrap();
        env::set_var(ENV_JSON, r#"{"cache": {"reuse_window_ms": 42}}"#);
        let loaded = load_config(None);
        env::remove_var(ENV_JSON);
        assert_eq!(loaded.unwrap().cache.reuse_window_ms, 42);
    }
}
