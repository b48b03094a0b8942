//! Persistent player settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use pcmdeck_core::{PcmFormat, PlayerConfig, SampleFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_output_device: Option<String>,
    pub volume: f32,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
    /// Chunk length in milliseconds; converted to bytes for the active format.
    pub chunk_ms: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_output_device: None,
            volume: 1.0,
            sample_rate: 48_000,
            channels: 2,
            sample_format: "s16le".into(),
            chunk_ms: 20,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.volume = if self.volume.is_nan() {
            1.0
        } else {
            self.volume.clamp(0.0, 1.0)
        };
        self.sample_rate = self.sample_rate.clamp(8_000, 384_000);
        self.channels = self.channels.clamp(1, 8);
        self.sample_format = normalize_sample_format(&self.sample_format);
        self.chunk_ms = self.chunk_ms.clamp(5, 500);
        self.preferred_output_device = self
            .preferred_output_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub fn pcm_format(&self) -> PcmFormat {
        let sample_format = self
            .sample_format
            .parse::<SampleFormat>()
            .unwrap_or(SampleFormat::S16Le);
        PcmFormat::new(self.sample_rate, self.channels, sample_format)
    }

    pub fn player_config(&self) -> PlayerConfig {
        let format = self.pcm_format();
        let chunk_bytes = format
            .align_to_frame(format.bytes_per_second() * self.chunk_ms as usize / 1000)
            .max(format.frame_bytes());
        PlayerConfig {
            format,
            volume: self.volume,
            chunk_bytes,
            preferred_output_device: self.preferred_output_device.clone(),
        }
    }
}

pub fn normalize_sample_format(raw: &str) -> String {
    match raw.parse::<SampleFormat>() {
        Ok(fmt) => fmt.to_string(),
        Err(_) => SampleFormat::S16Le.to_string(),
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("pcmdeck")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("pcmdeck")
            .join("settings.json")
    }
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}
