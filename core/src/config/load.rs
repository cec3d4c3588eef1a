use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AppConfig;

/// Get the default data directory: ~/.skillbatch
pub fn get_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".skillbatch"))
        .ok_or(ConfigError::NoHomeDir)
}

pub fn load_default() -> Result<AppConfig, ConfigError> {
    // Priority 1: ~/.skillbatch/config.toml
    let data_dir = get_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if home_config.exists() {
        load_from_path(&home_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    validate(&cfg)?;

    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn apply_env_overrides<F>(cfg: &mut AppConfig, get: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("SKILLBATCH_BACKEND_URL") {
        cfg.backend.url = v;
    }
    if let Some(v) = non_empty("SKILLBATCH_API_KEY") {
        cfg.backend.api_key = v;
    }
    if let Some(v) = non_empty("SKILLBATCH_MODEL") {
        cfg.backend.model = v;
    }
}

pub fn validate(cfg: &AppConfig) -> Result<(), ConfigError> {
    if cfg.engine.concurrency_limit == 0 {
        return Err(ConfigError::Invalid {
            field: "engine.concurrency_limit",
            reason: "must be at least 1".to_string(),
        });
    }
    if cfg.engine.rate_limit_per_window == 0 {
        return Err(ConfigError::Invalid {
            field: "engine.rate_limit_per_window",
            reason: "must be at least 1".to_string(),
        });
    }
    if cfg.engine.window_seconds == 0 {
        return Err(ConfigError::Invalid {
            field: "engine.window_seconds",
            reason: "must be at least 1".to_string(),
        });
    }
    if cfg.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid {
            field: "retry.max_attempts",
            reason: "must be at least 1".to_string(),
        });
    }
    match cfg.retry.strategy.as_str() {
        "exponential-backoff" | "linear" => Ok(()),
        other => Err(ConfigError::Invalid {
            field: "retry.strategy",
            reason: format!("unknown strategy `{other}`"),
        }),
    }
}
