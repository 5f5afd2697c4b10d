//! DVD title-set discovery.
//!
//! A DVD-Video rip stores each title as a run of `VTS_<title>_<part>.VOB`
//! files inside a `VIDEO_TS` folder. Part 0 holds the title's menu; parts 1
//! and up are the video, split at 1 GB boundaries. This module walks a
//! directory tree and groups the video parts into ordered title sets.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

fn vob_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^VTS_(\d+)_(\d+)\.VOB$").expect("VOB pattern is valid")
    })
}

/// Title id and part number parsed from a VOB file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VobName {
    /// Title id as written in the file name, e.g. `"01"`.
    pub title_id: String,
    pub part: u32,
}

impl VobName {
    /// Part 0 is the title's menu, not video.
    pub fn is_menu(&self) -> bool {
        self.part == 0
    }
}

/// Parse a `VTS_<title>_<part>.VOB` file name (case-insensitive).
pub fn parse_vob_name(file_name: &str) -> Option<VobName> {
    let caps = vob_pattern().captures(file_name)?;
    let title_id = caps.get(1)?.as_str().to_string();
    let part = caps.get(2)?.as_str().parse().ok()?;
    Some(VobName { title_id, part })
}

/// An ordered run of VOB parts forming one DVD title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleSet {
    /// Unique name, `<folder>_Title_<title>`; also the output file stem.
    pub key: String,
    /// Folder containing the parts.
    pub folder: PathBuf,
    pub title_id: String,
    /// Parts sorted lexically by path.
    pub parts: Vec<PathBuf>,
}

impl TitleSet {
    /// File name of the MP4 produced for this title set.
    pub fn output_file_name(&self) -> String {
        format!("{}.mp4", self.key)
    }
}

/// Build the title-set key from a folder and title id.
pub fn title_key(folder: &Path, title_id: &str) -> String {
    format!("{}_Title_{}", folder_name(folder), title_id)
}

/// Base name of `folder`, resolving `.` and `..` against the filesystem.
fn folder_name(folder: &Path) -> String {
    if let Some(name) = folder.file_name() {
        return name.to_string_lossy().to_string();
    }
    match std::fs::canonicalize(folder) {
        Ok(resolved) => resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        Err(e) => {
            warn!("Cannot resolve folder name of {:?}: {}", folder, e);
            String::new()
        }
    }
}

/// Scan `root` recursively and return its title sets, ordered by key.
pub fn scan_title_sets(root: &Path) -> Result<Vec<TitleSet>> {
    let metadata =
        std::fs::metadata(root).with_context(|| format!("Cannot read source: {:?}", root))?;
    if !metadata.is_dir() {
        anyhow::bail!("Source is not a directory: {:?}", root);
    }

    info!("Scanning directory: {:?}", root);

    // (folder, title id) -> parts
    let mut groups: BTreeMap<(PathBuf, String), Vec<PathBuf>> = BTreeMap::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(vob) = parse_vob_name(name) else {
            continue;
        };
        if vob.is_menu() {
            debug!("Skipping menu VOB: {:?}", entry.path());
            continue;
        }

        let folder = entry
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        groups
            .entry((folder, vob.title_id))
            .or_default()
            .push(entry.into_path());
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut title_sets = Vec::with_capacity(groups.len());

    for ((folder, title_id), mut parts) in groups {
        parts.sort();

        let base_key = title_key(&folder, &title_id);
        let count = seen.entry(base_key.clone()).or_insert(0);
        *count += 1;
        let key = if *count == 1 {
            base_key
        } else {
            let renamed = format!("{}_{}", base_key, count);
            warn!(
                "Title set {} in {:?} clashes with an earlier folder of the same name, using {}",
                base_key, folder, renamed
            );
            renamed
        };

        debug!("Title set {}: {} parts", key, parts.len());
        title_sets.push(TitleSet {
            key,
            folder,
            title_id,
            parts,
        });
    }

    title_sets.sort_by(|a, b| a.key.cmp(&b.key));

    info!(
        "Scan complete: {} title sets found in {:?}",
        title_sets.len(),
        root
    );
    Ok(title_sets)
}
