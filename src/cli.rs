use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vobreel_av::{ConcatMethod, QualityPreset, SpeedPreset};

#[derive(Parser)]
#[command(name = "vobreel")]
#[command(
    author,
    version,
    about = "Batch converter that stitches DVD VOB title sets into MP4 files",
    long_about = "Batch converter that stitches DVD VOB title sets into MP4 files.\n\n\
        Point it at a folder containing DVD rips (e.g. /Movies/Wedding_DVD/VIDEO_TS/). \
        Every VTS_<title>_<part>.VOB run is joined and encoded with FFmpeg into \
        <folder>_Title_<title>.mp4. Existing outputs are skipped."
)]
pub struct Cli {
    /// Path to the settings file
    #[arg(short, long, global = true, env = "VOBREEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert every DVD title set under a folder to MP4
    Convert {
        /// Folder containing VIDEO_TS folders
        #[arg(required = true)]
        source: PathBuf,

        /// Output folder (defaults to the configured export path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Named quality: best (CRF 18), standard (CRF 20), compact (CRF 23)
        #[arg(short, long, conflicts_with = "crf")]
        quality: Option<QualityPreset>,

        /// x264 CRF value, 0-51
        #[arg(long)]
        crf: Option<u8>,

        /// x264 speed preset (e.g. slow, medium, fast)
        #[arg(short, long)]
        preset: Option<SpeedPreset>,

        /// Copy the original DVD audio instead of converting to AAC
        #[arg(long, conflicts_with = "aac_audio")]
        keep_audio: bool,

        /// Convert audio to AAC even if the settings say keep it
        #[arg(long)]
        aac_audio: bool,

        /// How VOB parts are joined: binary or demuxer
        #[arg(long)]
        concat: Option<ConcatMethod>,

        /// Show the title sets and FFmpeg commands without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// List the DVD title sets found under a folder
    Scan {
        /// Folder to scan
        #[arg(required = true)]
        source: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that FFmpeg is installed
    CheckTools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print all settings
    Show,
    /// Print the settings file location
    Path,
    /// Print one setting
    Get {
        /// Setting name
        key: String,
    },
    /// Change one setting and save it
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },
    /// Restore default settings
    Reset,
}
