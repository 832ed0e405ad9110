// SPDX-License-Identifier: GPL-3.0-only

//! Service configuration
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/quietcam/config.json`. A missing file
//! means defaults; unknown or missing fields fall back to their defaults.

use crate::backends::camera::{CameraBackendType, CameraSelector, FpsRange};
use crate::constants::{BitratePreset, capture};
use crate::errors::ConfigError;
use crate::media::encoders::{AudioQuality, ContainerFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Camera format settings used for recording
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatSettings {
    /// Resolution width
    pub width: u32,
    /// Resolution height
    pub height: u32,
    /// Framerate
    pub framerate: u32,
    /// Pixel format (e.g., "YUYV", "NV12")
    pub pixel_format: String,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            width: capture::DEFAULT_WIDTH,
            height: capture::DEFAULT_HEIGHT,
            framerate: capture::DEFAULT_FRAMERATE,
            pixel_format: capture::DEFAULT_PIXEL_FORMAT.to_string(),
        }
    }
}

/// Microphone settings
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// PipeWire node name or serial; `None` records from the default source
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u32,
    pub quality: AudioQuality,
    /// Record a generated tone instead of the microphone
    pub test_tone: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: capture::DEFAULT_AUDIO_SAMPLE_RATE,
            channels: capture::DEFAULT_AUDIO_CHANNELS,
            quality: AudioQuality::High,
            test_tone: false,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where recordings are written (default: `<videos>/quietcam`)
    pub storage_root: Option<PathBuf>,
    /// Camera selector, a V4L2 index or device path
    pub camera: String,
    /// Camera backend to use (V4L2 or simulated)
    pub backend: CameraBackendType,
    /// Recording format requested from the camera
    pub video: FormatSettings,
    /// Frame-rate range applied to the repeating capture request
    pub fps_range: FpsRange,
    /// Output container
    pub container: ContainerFormat,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    pub audio: AudioSettings,
    /// Give up on a start that has not reached recording after this long
    pub ready_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: None,
            camera: capture::DEFAULT_CAMERA_SELECTOR.to_string(),
            backend: CameraBackendType::default(),
            video: FormatSettings::default(),
            fps_range: FpsRange::fixed(capture::DEFAULT_FRAMERATE),
            container: ContainerFormat::MP4,
            bitrate_preset: BitratePreset::default(),
            audio: AudioSettings::default(),
            ready_timeout_ms: None,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(capture::DEFAULT_SAVE_FOLDER).join("config.json"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    pub fn camera_selector(&self) -> CameraSelector {
        CameraSelector::new(&self.camera)
    }

    /// Storage root, explicit or the default one
    pub fn storage_root(&self) -> PathBuf {
        self.storage_root
            .clone()
            .unwrap_or_else(crate::storage::default_storage_root)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{ "camera": "0" }"#).unwrap();
        assert_eq!(config.camera, "0");
        assert_eq!(config.video, FormatSettings::default());
        assert_eq!(config.fps_range, FpsRange::fixed(30));
        assert!(config.ready_timeout().is_none());
    }

    #[test]
    fn test_ready_timeout() {
        let config = Config {
            ready_timeout_ms: Some(1500),
            ..Config::default()
        };
        assert_eq!(config.ready_timeout(), Some(Duration::from_millis(1500)));
    }
}
