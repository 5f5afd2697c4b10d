use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use vobreel_av::{AudioMode, ConcatMethod, EncodeSettings, QualityPreset, SpeedPreset};

/// Persisted user settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Where finished MP4s go when no output directory is given.
    #[serde(default = "default_export_path")]
    pub default_export_path: PathBuf,

    /// x264 CRF, lower is higher quality.
    #[serde(default = "default_crf", deserialize_with = "de_crf")]
    pub ffmpeg_crf: u8,

    #[serde(default)]
    pub ffmpeg_preset: SpeedPreset,

    /// `binary` (raw byte concat) or `demuxer` (FFmpeg list file).
    #[serde(default)]
    pub concat_method: ConcatMethod,

    /// Copy the DVD audio stream instead of converting it to AAC.
    #[serde(default)]
    pub keep_original_audio: bool,

    /// Explicit ffmpeg executable; looked up on PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_export_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/Desktop/VobReel_Exports").as_ref())
}

fn default_crf() -> u8 {
    QualityPreset::Standard.crf()
}

// Older settings files store the CRF as a string ("20").
fn de_crf<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Crf {
        Number(u8),
        Text(String),
    }

    match Crf::deserialize(deserializer)? {
        Crf::Number(n) => Ok(n),
        Crf::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid CRF: {:?}", s))),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_export_path: default_export_path(),
            ffmpeg_crf: default_crf(),
            ffmpeg_preset: SpeedPreset::default(),
            concat_method: ConcatMethod::default(),
            keep_original_audio: false,
            ffmpeg_path: None,
        }
    }
}

impl Config {
    /// Encoding settings derived from the stored preferences.
    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            crf: self.ffmpeg_crf,
            preset: self.ffmpeg_preset,
            audio: AudioMode::from_keep_original(self.keep_original_audio),
            concat: self.concat_method,
        }
    }
}
