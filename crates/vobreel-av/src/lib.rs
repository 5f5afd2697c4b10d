//! # vobreel-av
//!
//! External-tool layer for converting DVD title sets with FFmpeg.
//!
//! This crate provides functionality for:
//! - Detecting `ffmpeg` and `ffprobe` on the host
//! - Building the FFmpeg argument list for a title set (concat, deinterlace,
//!   H.264/AAC encode, MP4 faststart)
//! - Preparing concat inputs, either through the `concat:` protocol or a
//!   demuxer list file
//! - Running FFmpeg behind the [`Encoder`] trait
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use vobreel_av::{EncodeJob, EncodeSettings, Encoder, FfmpegEncoder};
//!
//! let encoder = FfmpegEncoder::from_path()?;
//! let job = EncodeJob::new(
//!     vec!["/dvd/VIDEO_TS/VTS_01_1.VOB".into(), "/dvd/VIDEO_TS/VTS_01_2.VOB".into()],
//!     "/out/VIDEO_TS_Title_01.mp4",
//!     EncodeSettings::default(),
//! );
//! encoder.encode(&job)?;
//! # Ok::<(), vobreel_av::Error>(())
//! ```

pub mod concat;
pub mod encode;
mod error;
pub mod tools;

// Re-exports
pub use concat::{ConcatInput, ConcatMethod};
pub use encode::{
    build_args, AudioMode, EncodeJob, EncodeSettings, Encoder, FfmpegEncoder, QualityPreset,
    SpeedPreset, MAX_CRF,
};
pub use error::{Error, Result};
pub use tools::{check_tool, check_tool_at, require_tool, resolve_tool, ToolInfo};
