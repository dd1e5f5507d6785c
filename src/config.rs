use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{LocatorError, LocatorResult};

pub const DEFAULT_SERVER_URL: &str = "https://smartdriver.dev-tools.ai";
const CONFIG_FILE_NAME: &str = "smartlocator.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub server_url: String,
    /// Falls back to env `DEVTOOLSAI_API_KEY`, then `~/.smartdriver`.
    pub api_key: Option<String>,
    pub test_case_name: Option<String>,
    pub local_caching: bool,
    /// Defaults to `~/.smartdriver/cache/<api_key>`.
    pub local_cache_dir: Option<PathBuf>,
    pub detect_timeout_secs: u64,
    pub misc_timeout_secs: u64,
    pub template_timeout_secs: u64,
    pub retrieve_timeout_secs: u64,
    pub network_tries: u32,
    pub retry_backoff_ms: u64,
    pub resolve_strategy: ResolveStrategy,
    /// Return a synthetic element instead of falling through when no live
    /// element sits under a predicted box.
    pub synthetic_fallback: bool,
    pub remote_scroll_settle_ms: u64,
    pub scroll_step_settle_ms: u64,
    pub max_scroll_steps: u32,
    pub do_exact_match_first: bool,
    pub exact_match_first_threshold: f64,
    pub resolver: ResolverConfig,
    pub template: TemplateConfig,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            api_key: None,
            test_case_name: None,
            local_caching: false,
            local_cache_dir: None,
            detect_timeout_secs: 60,
            misc_timeout_secs: 10,
            template_timeout_secs: 10,
            retrieve_timeout_secs: 30,
            network_tries: 3,
            retry_backoff_ms: 200,
            resolve_strategy: ResolveStrategy::Enumerate,
            synthetic_fallback: false,
            remote_scroll_settle_ms: 1000,
            scroll_step_settle_ms: 200,
            max_scroll_steps: 50,
            do_exact_match_first: false,
            exact_match_first_threshold: 0.999,
            resolver: ResolverConfig::default(),
            template: TemplateConfig::default(),
        }
    }
}

/// How a predicted box is turned into an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    /// Staged type-priority enumeration scored by IOU.
    Enumerate,
    /// Ask the driver for the topmost element at the box centre, falling back
    /// to enumeration when the backend cannot answer.
    PointLookup,
    /// Skip live elements entirely and act on coordinates.
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Candidates at or below this IOU are ignored.
    pub min_iou: f64,
    /// Candidates scoring above `near_best_ratio * best` count as equally good.
    pub near_best_ratio: f64,
    /// Element tags queried in order; `*` matches every element.
    pub tag_priority: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.2,
            near_best_ratio: 0.9,
            tag_priority: ["a", "input", "button", "img", "*"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Similarity (1 − normalised squared difference) a match must exceed.
    pub match_threshold: f64,
    /// Relative slack around the best squared-difference score that still
    /// counts as a candidate.
    pub best_score_tolerance: f64,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.998,
            best_score_tolerance: 0.03,
        }
    }
}

impl LocatorConfig {
    /// Apply environment overrides and fill the API key from the usual places.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DEVTOOLSAI_URL") {
            if !url.trim().is_empty() {
                self.server_url = url;
            }
        }
        if self.api_key.is_none() {
            self.api_key = resolve_api_key();
        }
        self
    }

    pub fn require_api_key(&self) -> LocatorResult<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                LocatorError::Config(
                    "no API key: set api_key, DEVTOOLSAI_API_KEY or ~/.smartdriver".into(),
                )
            })
    }

    pub fn cache_dir(&self) -> LocatorResult<PathBuf> {
        if let Some(dir) = &self.local_cache_dir {
            return Ok(dir.clone());
        }
        let api_key = self.require_api_key()?;
        let home = dirs::home_dir()
            .ok_or_else(|| LocatorError::Config("cannot determine home directory".into()))?;
        Ok(home.join(".smartdriver").join("cache").join(api_key))
    }

    pub fn test_case_name(&self) -> &str {
        self.test_case_name.as_deref().unwrap_or("default")
    }
}

/// API key lookup order: `DEVTOOLSAI_API_KEY`, then `{"api_key": ...}` in `~/.smartdriver`.
pub fn resolve_api_key() -> Option<String> {
    if let Ok(key) = std::env::var("DEVTOOLSAI_API_KEY") {
        if !key.is_empty() {
            return Some(key);
        }
    }
    let path = dirs::home_dir()?.join(".smartdriver");
    if !path.is_file() {
        return None;
    }
    let content = std::fs::read_to_string(&path).ok()?;
    api_key_from_json(&content)
}

fn api_key_from_json(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    value["api_key"].as_str().map(|s| s.to_string())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Load `smartlocator.toml` if present (defaults otherwise), after reading `.env`.
pub fn load_config() -> LocatorResult<LocatorConfig> {
    let _ = dotenvy::dotenv();
    let config = match resolve_config_path() {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: LocatorConfig = toml::from_str(&content)?;
            tracing::info!(path = %path.display(), "config loaded");
            config
        }
        None => {
            tracing::debug!("no {CONFIG_FILE_NAME} found, using defaults");
            LocatorConfig::default()
        }
    };
    Ok(config.with_env_overrides())
}

pub fn save_config(config: &LocatorConfig, path: &std::path::Path) -> LocatorResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: LocatorConfig = toml::from_str(
            r#"
            local_caching = true
            resolve_strategy = "point_lookup"

            [resolver]
            min_iou = 0.3

            [template]
            match_threshold = 0.99
            "#,
        )
        .unwrap();
        assert!(cfg.local_caching);
        assert_eq!(cfg.resolve_strategy, ResolveStrategy::PointLookup);
        assert_eq!(cfg.resolver.min_iou, 0.3);
        assert_eq!(cfg.resolver.near_best_ratio, 0.9);
        assert_eq!(cfg.resolver.tag_priority.last().map(String::as_str), Some("*"));
        assert_eq!(cfg.template.match_threshold, 0.99);
        assert_eq!(cfg.template.best_score_tolerance, 0.03);
        assert_eq!(cfg.server_url, DEFAULT_SERVER_URL);
        assert_eq!(cfg.network_tries, 3);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let cfg = LocatorConfig {
            api_key: Some("k1".into()),
            local_cache_dir: Some(dir.path().join("cache")),
            ..Default::default()
        };
        save_config(&cfg, &path).unwrap();
        let loaded: LocatorConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("k1"));
        assert_eq!(loaded.cache_dir().unwrap(), dir.path().join("cache"));
    }

    #[test]
    fn api_key_file_format() {
        assert_eq!(api_key_from_json(r#"{"api_key": "abc"}"#).as_deref(), Some("abc"));
        assert_eq!(api_key_from_json(r#"{"other": 1}"#), None);
        assert_eq!(api_key_from_json("not json"), None);
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let cfg = LocatorConfig::default();
        assert!(matches!(cfg.require_api_key(), Err(LocatorError::Config(_))));
    }
}
