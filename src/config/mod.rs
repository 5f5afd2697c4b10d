pub mod persist;
mod types;

pub use persist::save_config;
pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use vobreel_av::{ConcatMethod, SpeedPreset, MAX_CRF};

/// Settings file used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/vobreel/config.json";

/// Keys accepted by [`get_value`] and [`set_value`].
pub const CONFIG_KEYS: &[&str] = &[
    "default_export_path",
    "ffmpeg_crf",
    "ffmpeg_preset",
    "concat_method",
    "keep_original_audio",
    "ffmpeg_path",
];

/// Errors from string-keyed config access.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown config key: {0} (known keys: {keys})", keys = CONFIG_KEYS.join(", "))]
    UnknownKey(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Resolve the settings file path, expanding `~`.
pub fn config_path(custom_path: Option<&Path>) -> PathBuf {
    match custom_path {
        Some(path) => PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref()),
        None => PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref()),
    }
}

/// Load configuration from a JSON file, failing on any parse or
/// validation error.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load the settings file, creating it with defaults if it does not exist.
///
/// A file that cannot be parsed or holds invalid values is left untouched
/// and defaults are used instead.
pub fn load_or_create(path: &Path) -> Result<Config> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create config directory {:?}: {}", parent, e);
            }
        }
    }

    if !path.exists() {
        let config = Config::default();
        if let Err(e) = save_config(path, &config) {
            tracing::warn!("Failed to save default config: {:#}", e);
        } else {
            tracing::info!("Wrote default config to {:?}", path);
        }
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    match serde_json::from_str::<Config>(&content) {
        Ok(config) => match validate_config(&config) {
            Ok(()) => {
                tracing::debug!("Loaded config from {:?}", path);
                Ok(config)
            }
            Err(e) => {
                tracing::warn!("Config file {:?} is invalid ({:#}), using defaults", path, e);
                Ok(Config::default())
            }
        },
        Err(e) => {
            tracing::warn!("Config file {:?} is corrupted ({}), using defaults", path, e);
            Ok(Config::default())
        }
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    config
        .encode_settings()
        .validate()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if config.default_export_path.as_os_str().is_empty() {
        anyhow::bail!("default_export_path cannot be empty");
    }

    if let Some(ref ffmpeg) = config.ffmpeg_path {
        if !ffmpeg.exists() {
            tracing::warn!("Configured ffmpeg does not exist: {:?}", ffmpeg);
        }
    }

    Ok(())
}

/// Read one setting as a string.
pub fn get_value(config: &Config, key: &str) -> Result<String, ConfigError> {
    let value = match key {
        "default_export_path" => config.default_export_path.display().to_string(),
        "ffmpeg_crf" => config.ffmpeg_crf.to_string(),
        "ffmpeg_preset" => config.ffmpeg_preset.to_string(),
        "concat_method" => config.concat_method.to_string(),
        "keep_original_audio" => config.keep_original_audio.to_string(),
        "ffmpeg_path" => config
            .ffmpeg_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    };
    Ok(value)
}

/// Change one setting from its string form.
///
/// An empty value clears `ffmpeg_path`.
pub fn set_value(config: &mut Config, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "default_export_path" => {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(key, "path cannot be empty"));
            }
            config.default_export_path = PathBuf::from(shellexpand::tilde(value).as_ref());
        }
        "ffmpeg_crf" => {
            let crf: u8 = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(key, format!("not a number: {}", value)))?;
            if crf > MAX_CRF {
                return Err(ConfigError::invalid(
                    key,
                    format!("must be between 0 and {}", MAX_CRF),
                ));
            }
            config.ffmpeg_crf = crf;
        }
        "ffmpeg_preset" => {
            config.ffmpeg_preset = value
                .parse::<SpeedPreset>()
                .map_err(|e| ConfigError::invalid(key, e))?;
        }
        "concat_method" => {
            config.concat_method = value
                .parse::<ConcatMethod>()
                .map_err(|e| ConfigError::invalid(key, e))?;
        }
        "keep_original_audio" => {
            config.keep_original_audio = match value.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => true,
                "false" | "no" | "0" | "off" => false,
                _ => return Err(ConfigError::invalid(key, "expected true or false")),
            };
        }
        "ffmpeg_path" => {
            config.ffmpeg_path = if value.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(shellexpand::tilde(value).as_ref()))
            };
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}
