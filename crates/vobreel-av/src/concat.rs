//! Concat input preparation.
//!
//! DVD titles are split into 1 GB VOB parts. FFmpeg can join them either by
//! reading the raw byte stream through the `concat:` protocol, or by opening
//! each part separately through the concat demuxer and a list file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// How the parts of a title set are stitched together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcatMethod {
    /// Raw byte concatenation via the `concat:` protocol. Safe for VOBs
    /// split purely by size.
    #[default]
    Binary,
    /// FFmpeg concat demuxer reading a `file '...'` list.
    Demuxer,
}

impl fmt::Display for ConcatMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcatMethod::Binary => write!(f, "binary"),
            ConcatMethod::Demuxer => write!(f, "demuxer"),
        }
    }
}

impl std::str::FromStr for ConcatMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binary" | "protocol" => Ok(ConcatMethod::Binary),
            "demuxer" | "list" => Ok(ConcatMethod::Demuxer),
            _ => Err(format!("Unknown concat method: {}", s)),
        }
    }
}

/// A prepared FFmpeg input for a title set.
///
/// The list-file variant owns the temp directory holding the list, so the
/// value must outlive the FFmpeg process.
#[derive(Debug)]
pub enum ConcatInput {
    /// `concat:a|b|c` protocol URL.
    Protocol(String),
    /// Concat demuxer list file.
    ListFile { path: PathBuf, _dir: TempDir },
}

impl ConcatInput {
    /// Prepare the input for `parts` using the given method.
    pub fn prepare(parts: &[PathBuf], method: ConcatMethod) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::InvalidInput("title set has no parts".to_string()));
        }

        match method {
            ConcatMethod::Binary => Ok(ConcatInput::Protocol(protocol_url(parts)?)),
            ConcatMethod::Demuxer => write_list_file(parts),
        }
    }

    /// Arguments that select this input, starting with any input options
    /// and ending with `-i <input>`.
    pub fn input_args(&self) -> Vec<String> {
        match self {
            ConcatInput::Protocol(url) => vec!["-i".to_string(), url.clone()],
            ConcatInput::ListFile { path, .. } => vec![
                "-f".to_string(),
                "concat".to_string(),
                "-safe".to_string(),
                "0".to_string(),
                "-i".to_string(),
                path.to_string_lossy().to_string(),
            ],
        }
    }
}

/// Build a `concat:` protocol URL from the parts, in order.
pub fn protocol_url(parts: &[PathBuf]) -> Result<String> {
    let mut joined = Vec::with_capacity(parts.len());
    for part in parts {
        let s = part.to_string_lossy();
        // '|' is the protocol's separator and cannot be escaped
        if s.contains('|') {
            return Err(Error::InvalidInput(format!(
                "path contains '|', use the demuxer concat method: {}",
                s
            )));
        }
        joined.push(s.to_string());
    }
    Ok(format!("concat:{}", joined.join("|")))
}

/// Render the concat demuxer list for the parts.
pub fn list_file_contents(parts: &[PathBuf]) -> String {
    let mut out = String::new();
    for part in parts {
        out.push_str("file '");
        out.push_str(&escape_single_quotes(&part.to_string_lossy()));
        out.push_str("'\n");
    }
    out
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "'\\''")
}

fn write_list_file(parts: &[PathBuf]) -> Result<ConcatInput> {
    // Relative entries are resolved against the list file's directory
    let absolute = parts
        .iter()
        .map(|p| absolutize(p))
        .collect::<Result<Vec<_>>>()?;

    let dir = tempfile::Builder::new()
        .prefix("vobreel-concat")
        .tempdir()?;
    let path = dir.path().join("parts.txt");

    let mut file = std::fs::File::create(&path)?;
    file.write_all(list_file_contents(&absolute).as_bytes())?;
    file.flush()?;

    #[cfg(feature = "tracing")]
    tracing::debug!("Wrote concat list with {} parts to {:?}", parts.len(), path);

    Ok(ConcatInput::ListFile { path, _dir: dir })
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_protocol_url_joins_in_order() {
        let url = protocol_url(&parts(&["/dvd/VTS_01_1.VOB", "/dvd/VTS_01_2.VOB"])).unwrap();
        assert_eq!(url, "concat:/dvd/VTS_01_1.VOB|/dvd/VTS_01_2.VOB");
    }

    #[test]
    fn test_protocol_url_rejects_pipe() {
        let err = protocol_url(&parts(&["/dvd/a|b/VTS_01_1.VOB"])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_list_file_escapes_quotes() {
        let contents = list_file_contents(&parts(&["/rips/Bob's DVD/VTS_01_1.VOB"]));
        assert_eq!(contents, "file '/rips/Bob'\\''s DVD/VTS_01_1.VOB'\n");
    }

    #[test]
    fn test_prepare_empty_parts() {
        assert!(ConcatInput::prepare(&[], ConcatMethod::Binary).is_err());
    }

    #[test]
    fn test_prepare_demuxer_writes_list() {
        let input = ConcatInput::prepare(
            &parts(&["/dvd/VTS_02_1.VOB", "/dvd/VTS_02_2.VOB"]),
            ConcatMethod::Demuxer,
        )
        .unwrap();

        let args = input.input_args();
        assert_eq!(&args[..5], &["-f", "concat", "-safe", "0", "-i"]);

        let written = std::fs::read_to_string(&args[5]).unwrap();
        assert_eq!(
            written,
            "file '/dvd/VTS_02_1.VOB'\nfile '/dvd/VTS_02_2.VOB'\n"
        );
    }

    #[test]
    fn test_list_file_removed_on_drop() {
        let input =
            ConcatInput::prepare(&parts(&["/dvd/VTS_01_1.VOB"]), ConcatMethod::Demuxer).unwrap();
        let path = match &input {
            ConcatInput::ListFile { path, .. } => path.clone(),
            ConcatInput::Protocol(_) => panic!("expected list file"),
        };
        assert!(path.exists());
        drop(input);
        assert!(!path.exists());
    }

    #[test]
    fn test_concat_method_from_str() {
        assert_eq!("binary".parse::<ConcatMethod>().ok(), Some(ConcatMethod::Binary));
        assert_eq!("DEMUXER".parse::<ConcatMethod>().ok(), Some(ConcatMethod::Demuxer));
        assert!("zip".parse::<ConcatMethod>().is_err());
    }
}
