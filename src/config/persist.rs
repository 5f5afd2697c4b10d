//! Configuration persistence.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Write the config as 4-space indented JSON, creating the parent
/// directory if needed.
pub fn save_config(path: &Path, config: &super::Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    config
        .serialize(&mut ser)
        .with_context(|| "Failed to serialize config")?;
    buf.push(b'\n');

    std::fs::write(path, buf)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

/// Update one key in the settings file and write it back.
pub fn update_value(path: &Path, key: &str, value: &str) -> Result<super::Config> {
    let mut config = super::load_or_create(path)?;
    super::set_value(&mut config, key, value)?;
    save_config(path, &config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Config};
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.ffmpeg_crf = 23;
        config.keep_original_audio = true;
        save_config(&path, &config).unwrap();

        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_update_value_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        update_value(&path, "concat_method", "demuxer").unwrap();

        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded.concat_method, vobreel_av::ConcatMethod::Demuxer);
    }

    #[test]
    fn test_update_value_unknown_key_leaves_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        save_config(&path, &Config::default()).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(update_value(&path, "nope", "1").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
