//! Title-set encoding with the FFmpeg CLI.

use crate::concat::{ConcatInput, ConcatMethod};
use crate::{tools, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Highest CRF accepted by libx264.
pub const MAX_CRF: u8 = 51;

/// Lines of FFmpeg stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

/// How often a running encode checks its cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Named CRF shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreset {
    /// CRF 18. Larger files, keeps film and VHS grain intact.
    Best,
    /// CRF 20. Balanced for most DVDs.
    Standard,
    /// CRF 23. Smoother image, smaller file.
    Compact,
}

impl QualityPreset {
    /// The CRF value this preset stands for.
    pub fn crf(&self) -> u8 {
        match self {
            QualityPreset::Best => 18,
            QualityPreset::Standard => 20,
            QualityPreset::Compact => 23,
        }
    }
}

impl std::str::FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best" | "high" => Ok(QualityPreset::Best),
            "standard" | "balanced" => Ok(QualityPreset::Standard),
            "compact" | "small" => Ok(QualityPreset::Compact),
            _ => Err(format!(
                "Unknown quality preset: {} (expected best, standard or compact)",
                s
            )),
        }
    }
}

/// x264 speed presets, passed to `-preset` as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl SpeedPreset {
    pub const ALL: [SpeedPreset; 10] = [
        SpeedPreset::Ultrafast,
        SpeedPreset::Superfast,
        SpeedPreset::Veryfast,
        SpeedPreset::Faster,
        SpeedPreset::Fast,
        SpeedPreset::Medium,
        SpeedPreset::Slow,
        SpeedPreset::Slower,
        SpeedPreset::Veryslow,
        SpeedPreset::Placebo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedPreset::Ultrafast => "ultrafast",
            SpeedPreset::Superfast => "superfast",
            SpeedPreset::Veryfast => "veryfast",
            SpeedPreset::Faster => "faster",
            SpeedPreset::Fast => "fast",
            SpeedPreset::Medium => "medium",
            SpeedPreset::Slow => "slow",
            SpeedPreset::Slower => "slower",
            SpeedPreset::Veryslow => "veryslow",
            SpeedPreset::Placebo => "placebo",
        }
    }
}

impl fmt::Display for SpeedPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpeedPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        SpeedPreset::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| format!("Unknown x264 preset: {}", s))
    }
}

/// What happens to the DVD audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    /// Re-encode to AAC 192k.
    #[default]
    Aac,
    /// Copy the original AC3/PCM stream.
    Copy,
}

impl AudioMode {
    pub fn from_keep_original(keep: bool) -> Self {
        if keep {
            AudioMode::Copy
        } else {
            AudioMode::Aac
        }
    }

    fn args(&self) -> &'static [&'static str] {
        match self {
            AudioMode::Aac => &["-c:a", "aac", "-b:a", "192k"],
            AudioMode::Copy => &["-c:a", "copy"],
        }
    }
}

/// Encoding parameters shared by every title set in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub crf: u8,
    pub preset: SpeedPreset,
    pub audio: AudioMode,
    pub concat: ConcatMethod,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            crf: QualityPreset::Standard.crf(),
            preset: SpeedPreset::Medium,
            audio: AudioMode::Aac,
            concat: ConcatMethod::Binary,
        }
    }
}

impl EncodeSettings {
    /// Check that the settings are accepted by libx264.
    pub fn validate(&self) -> Result<()> {
        if self.crf > MAX_CRF {
            return Err(Error::InvalidInput(format!(
                "CRF must be between 0 and {}, got {}",
                MAX_CRF, self.crf
            )));
        }
        Ok(())
    }
}

/// One title set to encode.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// VOB parts in playback order.
    pub parts: Vec<PathBuf>,
    /// Destination MP4.
    pub output: PathBuf,
    pub settings: EncodeSettings,
}

impl EncodeJob {
    pub fn new(parts: Vec<PathBuf>, output: impl Into<PathBuf>, settings: EncodeSettings) -> Self {
        Self {
            parts,
            output: output.into(),
            settings,
        }
    }
}

/// Build the FFmpeg argument list (without the program name).
pub fn build_args(input: &ConcatInput, output: &Path, settings: &EncodeSettings) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-stats",
        // VOBs often start with a long run of navigation packets
        "-analyzeduration",
        "100M",
        "-probesize",
        "100M",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend(input.input_args());

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        settings.crf.to_string(),
        "-preset".to_string(),
        settings.preset.to_string(),
        "-vf".to_string(),
        "yadif,format=yuv420p".to_string(),
    ]);

    args.extend(settings.audio.args().iter().map(|s| s.to_string()));

    args.extend(["-movflags".to_string(), "+faststart".to_string()]);

    args.push(output.to_string_lossy().to_string());
    args
}

/// Something that turns a title set into an MP4.
pub trait Encoder: Send + Sync {
    fn encode(&self, job: &EncodeJob) -> Result<()>;
}

/// [`Encoder`] backed by the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    capture_output: bool,
    cancel_flag: Arc<AtomicBool>,
}

impl FfmpegEncoder {
    /// Use the given ffmpeg executable.
    ///
    /// FFmpeg's stderr (progress stats and errors) goes to the terminal.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            capture_output: false,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Locate ffmpeg on `PATH`.
    pub fn from_path() -> Result<Self> {
        Ok(Self::new(tools::require_tool("ffmpeg")?))
    }

    /// Capture stderr instead of passing it through; failures then carry
    /// the tail of FFmpeg's output.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Flag that kills the running FFmpeg process when raised.
    ///
    /// The partial output is removed and the encode fails with
    /// [`Error::Cancelled`]. Later encodes fail the same way until the flag
    /// is cleared.
    pub fn cancel_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The full command line for a job, for display.
    ///
    /// Demuxer list paths shown here are not the ones used by a later
    /// [`Encoder::encode`] call.
    pub fn command_line(&self, job: &EncodeJob) -> Result<Vec<String>> {
        let input = ConcatInput::prepare(&job.parts, job.settings.concat)?;
        let mut line = vec![self.program.to_string_lossy().to_string()];
        line.extend(build_args(&input, &job.output, &job.settings));
        Ok(line)
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<()> {
        job.settings.validate()?;

        if let Some(missing) = job.parts.iter().find(|p| !p.exists()) {
            return Err(Error::file_not_found(missing));
        }
        if job.output.exists() {
            return Err(Error::InvalidInput(format!(
                "output already exists: {}",
                job.output.display()
            )));
        }

        let input = ConcatInput::prepare(&job.parts, job.settings.concat)?;
        let args = build_args(&input, &job.output, &job.settings);

        #[cfg(feature = "tracing")]
        tracing::debug!("FFmpeg args: {:?}", args);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args).stdin(Stdio::null());
        if self.capture_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        // Own process group, so a terminal Ctrl-C stops the batch without
        // killing the title being encoded
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        if self.cancel_flag.load(Ordering::Relaxed) {
            return Err(Error::Cancelled {
                tool: "ffmpeg".to_string(),
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffmpeg")
            } else {
                Error::Io(e)
            }
        })?;

        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    remove_partial_output(&job.output);
                    return Err(Error::Io(e));
                }
            }
            if self.cancel_flag.load(Ordering::Relaxed) {
                let _ = child.kill();
                let _ = child.wait();
                remove_partial_output(&job.output);
                return Err(Error::Cancelled {
                    tool: "ffmpeg".to_string(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        // Keep the list file alive until ffmpeg has exited
        drop(input);

        if !status.success() {
            remove_partial_output(&job.output);
            let mut message = format!("exited with {}", status);
            let stderr = String::from_utf8_lossy(&stderr);
            let tail = stderr_tail(&stderr, STDERR_TAIL_LINES);
            if !tail.is_empty() {
                message.push_str(": ");
                message.push_str(&tail);
            }
            return Err(Error::tool_failed("ffmpeg", message));
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Encoded {:?}", job.output);

        Ok(())
    }
}

/// Delete whatever FFmpeg wrote before failing, so the title is not later
/// mistaken for a finished one.
fn remove_partial_output(output: &Path) {
    if !output.exists() {
        return;
    }
    match std::fs::remove_file(output) {
        Ok(()) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Removed partial output {:?}", output);
        }
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Could not remove partial output {:?}: {}", output, _e);
        }
    }
}

fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_parts() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/dvd/VIDEO_TS/VTS_01_1.VOB"),
            PathBuf::from("/dvd/VIDEO_TS/VTS_01_2.VOB"),
        ]
    }

    #[test]
    fn test_default_settings() {
        let settings = EncodeSettings::default();
        assert_eq!(settings.crf, 20);
        assert_eq!(settings.preset, SpeedPreset::Medium);
        assert_eq!(settings.audio, AudioMode::Aac);
        assert_eq!(settings.concat, ConcatMethod::Binary);
    }

    #[test]
    fn test_build_args_binary_aac() {
        let input = ConcatInput::prepare(&two_parts(), ConcatMethod::Binary).unwrap();
        let args = build_args(
            &input,
            Path::new("/out/VIDEO_TS_Title_01.mp4"),
            &EncodeSettings::default(),
        );

        let expected = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-stats",
            "-analyzeduration",
            "100M",
            "-probesize",
            "100M",
            "-i",
            "concat:/dvd/VIDEO_TS/VTS_01_1.VOB|/dvd/VIDEO_TS/VTS_01_2.VOB",
            "-c:v",
            "libx264",
            "-crf",
            "20",
            "-preset",
            "medium",
            "-vf",
            "yadif,format=yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-movflags",
            "+faststart",
            "/out/VIDEO_TS_Title_01.mp4",
        ];
        assert_eq!(args, expected);
    }

    #[test]
    fn test_build_args_copy_audio() {
        let input = ConcatInput::prepare(&two_parts(), ConcatMethod::Binary).unwrap();
        let settings = EncodeSettings {
            crf: 18,
            preset: SpeedPreset::Slow,
            audio: AudioMode::Copy,
            ..Default::default()
        };
        let args = build_args(&input, Path::new("/out/a.mp4"), &settings);

        let joined = args.join(" ");
        assert!(joined.contains("-crf 18 -preset slow"));
        assert!(joined.contains("-c:a copy -movflags"));
        assert!(!args.iter().any(|a| a == "aac" || a == "192k"));
        assert!(!args.iter().any(|a| a == "-y"));
    }

    #[test]
    fn test_quality_presets() {
        assert_eq!(QualityPreset::Best.crf(), 18);
        assert_eq!(QualityPreset::Standard.crf(), 20);
        assert_eq!(QualityPreset::Compact.crf(), 23);
        assert_eq!("Best".parse::<QualityPreset>().ok(), Some(QualityPreset::Best));
        assert!("ultra".parse::<QualityPreset>().is_err());
    }

    #[test]
    fn test_speed_preset_round_trip_names() {
        for preset in SpeedPreset::ALL {
            assert_eq!(preset.as_str().parse::<SpeedPreset>().ok(), Some(preset));
        }
        assert!("warp".parse::<SpeedPreset>().is_err());
    }

    #[test]
    fn test_validate_crf_range() {
        let mut settings = EncodeSettings::default();
        settings.crf = 51;
        assert!(settings.validate().is_ok());
        settings.crf = 52;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_audio_mode_from_keep_original() {
        assert_eq!(AudioMode::from_keep_original(true), AudioMode::Copy);
        assert_eq!(AudioMode::from_keep_original(false), AudioMode::Aac);
    }

    #[test]
    fn test_encode_missing_part() {
        let encoder = FfmpegEncoder::new("ffmpeg");
        let job = EncodeJob::new(
            vec![PathBuf::from("/nonexistent/VTS_01_1.VOB")],
            "/nonexistent/out.mp4",
            EncodeSettings::default(),
        );
        let err = encoder.encode(&job).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_encode_refuses_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("VTS_01_1.VOB");
        let output = dir.path().join("out.mp4");
        std::fs::write(&part, b"vob").unwrap();
        std::fs::write(&output, b"mp4").unwrap();

        let encoder = FfmpegEncoder::new("ffmpeg");
        let job = EncodeJob::new(vec![part], &output, EncodeSettings::default());
        assert!(matches!(
            encoder.encode(&job).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_encode_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("VTS_01_1.VOB");
        std::fs::write(&part, b"vob").unwrap();

        let encoder = FfmpegEncoder::new("/nonexistent/bin/ffmpeg");
        let job = EncodeJob::new(
            vec![part],
            dir.path().join("out.mp4"),
            EncodeSettings::default(),
        );
        assert!(matches!(
            encoder.encode(&job).unwrap_err(),
            Error::ToolNotFound { .. }
        ));
    }

    #[test]
    fn test_command_line_starts_with_program() {
        let encoder = FfmpegEncoder::new("/usr/bin/ffmpeg");
        let job = EncodeJob::new(two_parts(), "/out/x.mp4", EncodeSettings::default());
        let line = encoder.command_line(&job).unwrap();
        assert_eq!(line[0], "/usr/bin/ffmpeg");
        assert_eq!(line.last().map(String::as_str), Some("/out/x.mp4"));
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\nfor a; do out=\"$a\"; done\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_encode_failure_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("VTS_01_1.VOB");
        std::fs::write(&part, b"vob").unwrap();
        let program = script(
            dir.path(),
            "printf half > \"$out\"\necho 'Conversion failed!' >&2\nexit 1",
        );
        let output = dir.path().join("out.mp4");

        let encoder = FfmpegEncoder::new(program).capture_output(true);
        let job = EncodeJob::new(vec![part], &output, EncodeSettings::default());
        match encoder.encode(&job).unwrap_err() {
            Error::ToolFailed { message, .. } => assert!(message.contains("Conversion failed!")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_encode_success_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("VTS_01_1.VOB");
        std::fs::write(&part, b"vob").unwrap();
        let program = script(dir.path(), "printf mp4 > \"$out\"");
        let output = dir.path().join("out.mp4");

        let encoder = FfmpegEncoder::new(program).capture_output(true);
        let job = EncodeJob::new(vec![part], &output, EncodeSettings::default());
        encoder.encode(&job).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "mp4");
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_running_encode() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("VTS_01_1.VOB");
        std::fs::write(&part, b"vob").unwrap();
        let program = script(dir.path(), "printf half > \"$out\"\nexec sleep 30");
        let output = dir.path().join("out.mp4");

        let encoder = FfmpegEncoder::new(program).capture_output(true);
        let cancel = encoder.cancel_signal();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            cancel.store(true, Ordering::Relaxed);
        });

        let started = std::time::Instant::now();
        let job = EncodeJob::new(vec![part], &output, EncodeSettings::default());
        let err = encoder.encode(&job).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!output.exists());
    }

    #[test]
    fn test_cancelled_encoder_does_not_start() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("VTS_01_1.VOB");
        std::fs::write(&part, b"vob").unwrap();

        let encoder = FfmpegEncoder::new("/nonexistent/bin/ffmpeg");
        encoder.cancel_signal().store(true, Ordering::Relaxed);
        let job = EncodeJob::new(
            vec![part],
            dir.path().join("out.mp4"),
            EncodeSettings::default(),
        );
        assert!(matches!(
            encoder.encode(&job).unwrap_err(),
            Error::Cancelled { .. }
        ));
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = "a\n\nb\nc\n";
        assert_eq!(stderr_tail(stderr, 2), "b\nc");
        assert_eq!(stderr_tail("", 5), "");
    }
}
