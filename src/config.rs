use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "DEVGUIDE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub community: CommunityConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("devguide-tui/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityConfig {
    #[serde(default = "default_page_size")]
    pub questions_page_size: usize,
    #[serde(default = "default_page_size")]
    pub leaderboard_page_size: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            questions_page_size: default_page_size(),
            leaderboard_page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_start_route")]
    pub start_route: String,
    #[serde(default = "default_tick_rate", with = "humantime_serde")]
    pub tick_rate: Duration,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            start_route: default_start_route(),
            tick_rate: default_tick_rate(),
        }
    }
}

fn default_start_route() -> String {
    "tracks".into()
}

fn default_tick_rate() -> Duration {
    Duration::from_millis(120)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("devguide").join("devguide.log"))
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.trim().is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.trim().is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }

    if other.community.questions_page_size != 0 {
        base.community.questions_page_size = other.community.questions_page_size;
    }
    if other.community.leaderboard_page_size != 0 {
        base.community.leaderboard_page_size = other.community.leaderboard_page_size;
    }

    if !other.ui.start_route.trim().is_empty() {
        base.ui.start_route = other.ui.start_route;
    }
    if !other.ui.tick_rate.is_zero() {
        base.ui.tick_rate = other.ui.tick_rate;
    }

    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }

    base.logging.file = other.logging.file;
    if !other.logging.level.trim().is_empty() {
        base.logging.level = other.logging.level;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "community.questions_page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.community.questions_page_size = parsed.max(1);
            }
        }
        "community.leaderboard_page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.community.leaderboard_page_size = parsed.max(1);
            }
        }
        "ui.start_route" => cfg.ui.start_route = value,
        "ui.tick_rate" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.tick_rate = duration;
            }
        }
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        "logging.file" => {
            cfg.logging.file = if value.trim().is_empty() || value == "off" {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        "logging.level" => cfg.logging.level = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("devguide").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated() -> LoadOptions {
        let dir = tempdir().unwrap();
        LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("DEVGUIDE_TEST_NONE".into()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(isolated()).unwrap();
        assert_eq!(cfg.api.base_url, crate::api::DEFAULT_BASE_URL);
        assert_eq!(cfg.community.questions_page_size, 3);
        assert_eq!(cfg.ui.start_route, "tracks");
        assert_eq!(cfg.api.timeout, Duration::from_secs(20));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: http://localhost:8000/api/\n  timeout: 5s\ncommunity:\n  questions_page_size: 10\nlogging:\n  level: debug\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("DEVGUIDE_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:8000/api/");
        assert_eq!(cfg.api.timeout, Duration::from_secs(5));
        assert_eq!(cfg.community.questions_page_size, 10);
        assert_eq!(cfg.community.leaderboard_page_size, 3);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn env_overrides() {
        env::set_var("DEVGUIDE_ENVTEST_UI__START_ROUTE", "community");
        env::set_var("DEVGUIDE_ENVTEST_API__TIMEOUT", "3s");
        let mut opts = isolated();
        opts.env_prefix = Some("DEVGUIDE_ENVTEST".into());
        let cfg = load(opts).unwrap();
        assert_eq!(cfg.ui.start_route, "community");
        assert_eq!(cfg.api.timeout, Duration::from_secs(3));
        env::remove_var("DEVGUIDE_ENVTEST_UI__START_ROUTE");
        env::remove_var("DEVGUIDE_ENVTEST_API__TIMEOUT");
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "api: [unclosed").unwrap();
        let err = load(LoadOptions {
            config_file: Some(path.clone()),
            env_prefix: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
