//! External tool detection.

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the tool's version banner, if it could be read.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

impl ToolInfo {
    fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        }
    }
}

/// Look a tool up on `PATH` and read its version banner.
///
/// FFmpeg tools print their banner for `-version`, not `--version`.
///
/// # Example
///
/// ```no_run
/// use vobreel_av::check_tool;
///
/// let info = check_tool("ffmpeg");
/// if info.available {
///     println!("ffmpeg at {:?}", info.path);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    match which::which(name) {
        Ok(path) => check_tool_at(name, &path),
        Err(_) => ToolInfo::missing(name),
    }
}

/// Check a tool at an explicit location.
///
/// The tool counts as available only if `-version` runs and succeeds.
pub fn check_tool_at(name: &str, path: &Path) -> ToolInfo {
    if !path.is_file() {
        return ToolInfo::missing(name);
    }

    match Command::new(path).arg("-version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.trim().to_string());

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path: Some(path.to_path_buf()),
            }
        }
        _ => ToolInfo::missing(name),
    }
}

/// Require that a tool is available on `PATH`, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn resolve_tool(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Configured {} path {:?} does not exist, falling back to PATH",
            name,
            path
        );
    }

    require_tool(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tool_not_found() {
        let info = check_tool("nonexistent_tool_12345");
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
    }

    #[test]
    fn test_check_tool_at_missing_path() {
        let info = check_tool_at("ffmpeg", Path::new("/nonexistent/bin/ffmpeg"));
        assert_eq!(info.name, "ffmpeg");
        assert!(!info.available);
    }

    #[test]
    fn test_require_tool_error_names_tool() {
        let err = require_tool("nonexistent_tool_12345").unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { ref tool } if tool == "nonexistent_tool_12345"));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tool");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_check_tool_at_reads_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "echo 'ffmpeg version 6.1'", 0o755);

        let info = check_tool_at("ffmpeg", &path);
        assert!(info.available);
        assert_eq!(info.version.as_deref(), Some("ffmpeg version 6.1"));
        assert_eq!(info.path.as_deref(), Some(path.as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_tool_at_failing_version_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "exit 1", 0o755);

        let info = check_tool_at("ffmpeg", &path);
        assert!(!info.available);
        assert!(info.path.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_check_tool_at_not_executable_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "echo 'ffmpeg version 6.1'", 0o644);

        assert!(!check_tool_at("ffmpeg", &path).available);
    }

    #[test]
    fn test_resolve_tool_prefers_configured_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_tool("nonexistent_tool_12345", Some(file.path())).unwrap();
        assert_eq!(resolved, file.path());
    }

    #[test]
    fn test_resolve_tool_falls_back_to_path_lookup() {
        let err = resolve_tool(
            "nonexistent_tool_12345",
            Some(Path::new("/nonexistent/bin/tool")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }
}
