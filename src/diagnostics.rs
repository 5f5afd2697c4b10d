//! System requirement checks.

use serde::Serialize;
use std::path::{Path, PathBuf};
use vobreel_av::{check_tool, check_tool_at, ToolInfo};

/// Tools the converter needs. ffprobe ships with ffmpeg and is checked as a
/// sign of a complete install.
pub const REQUIRED_TOOLS: [&str; 2] = ["ffmpeg", "ffprobe"];

/// Result of a requirements check.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub tools: Vec<ToolInfo>,
}

impl Diagnostics {
    /// True when every required tool was found.
    pub fn is_ready(&self) -> bool {
        self.tools.iter().all(|t| t.available)
    }

    /// Names of tools that were not found.
    pub fn missing(&self) -> Vec<&str> {
        self.tools
            .iter()
            .filter(|t| !t.available)
            .map(|t| t.name.as_str())
            .collect()
    }

    pub fn tool(&self, name: &str) -> Option<&ToolInfo> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Check every tool in [`REQUIRED_TOOLS`].
///
/// A configured ffmpeg path is used when it points at a file, otherwise
/// ffmpeg is looked up on `PATH`, the same way `convert` resolves it.
/// ffprobe is first looked for next to the configured ffmpeg.
pub fn check_requirements(ffmpeg_path: Option<&Path>) -> Diagnostics {
    let configured = match ffmpeg_path {
        Some(path) if path.is_file() => Some(path),
        Some(path) => {
            tracing::warn!(
                "Configured ffmpeg path {:?} does not exist, checking PATH instead",
                path
            );
            None
        }
        None => None,
    };

    let tools: Vec<ToolInfo> = REQUIRED_TOOLS
        .iter()
        .map(|name| check_required(name, configured))
        .collect();

    for tool in &tools {
        tracing::debug!("Diagnostics: {} available={}", tool.name, tool.available);
    }

    Diagnostics { tools }
}

fn check_required(name: &str, configured_ffmpeg: Option<&Path>) -> ToolInfo {
    match configured_ffmpeg {
        Some(ffmpeg) if name == "ffmpeg" => check_tool_at(name, ffmpeg),
        Some(ffmpeg) => sibling_tool(ffmpeg, name)
            .map(|path| check_tool_at(name, &path))
            .filter(|info| info.available)
            .unwrap_or_else(|| check_tool(name)),
        None => check_tool(name),
    }
}

fn sibling_tool(ffmpeg: &Path, name: &str) -> Option<PathBuf> {
    let dir = ffmpeg.parent()?;
    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    Some(dir.join(file_name))
}
