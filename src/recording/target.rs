// SPDX-License-Identifier: GPL-3.0-only

//! Where a recording goes and what it looks like

use crate::backends::audio::AudioInput;
use crate::backends::camera::{PixelFormat, SurfaceFormat};
use crate::config::Config;
use crate::constants::capture::ORIENTATION_HINT;
use crate::errors::EncoderError;
use crate::media::encoders::{AudioQuality, ContainerFormat};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Encoding parameters for one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureProfile {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Raw format the camera writes into the encoder surface
    pub pixel_format: PixelFormat,
    pub video_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    pub audio_quality: AudioQuality,
    pub audio_input: AudioInput,
    pub container: ContainerFormat,
    /// Clockwise rotation in degrees written to the container
    pub orientation_hint: u32,
}

impl CaptureProfile {
    pub fn from_config(config: &Config) -> Result<Self, EncoderError> {
        let pixel_format = PixelFormat::from_fourcc(&config.video.pixel_format).ok_or_else(|| {
            EncoderError::ConfigurationRejected(format!(
                "unsupported pixel format {:?}",
                config.video.pixel_format
            ))
        })?;

        Ok(Self {
            width: config.video.width,
            height: config.video.height,
            framerate: config.video.framerate,
            pixel_format,
            video_bitrate_kbps: config
                .bitrate_preset
                .bitrate_kbps(config.video.width, config.video.height),
            audio_sample_rate: config.audio.sample_rate,
            audio_channels: config.audio.channels,
            audio_quality: config.audio.quality,
            audio_input: AudioInput::from_settings(
                config.audio.device.as_deref(),
                config.audio.test_tone,
            ),
            container: config.container,
            orientation_hint: ORIENTATION_HINT,
        })
    }

    /// Reject profiles no encoder could honour
    pub fn validate(&self) -> Result<(), EncoderError> {
        let reject = |msg: String| Err(EncoderError::ConfigurationRejected(msg));

        if self.width == 0 || self.height == 0 {
            return reject(format!("invalid resolution {}x{}", self.width, self.height));
        }
        // 4:2:x chroma subsampling needs even dimensions
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return reject(format!(
                "resolution {}x{} must be even",
                self.width, self.height
            ));
        }
        if self.framerate == 0 || self.framerate > 240 {
            return reject(format!("invalid frame rate {}", self.framerate));
        }
        if self.video_bitrate_kbps == 0 {
            return reject("video bitrate must be positive".to_string());
        }
        if !(1..=8).contains(&self.audio_channels) {
            return reject(format!("invalid channel count {}", self.audio_channels));
        }
        if !(8_000..=192_000).contains(&self.audio_sample_rate) {
            return reject(format!("invalid sample rate {}", self.audio_sample_rate));
        }
        if !matches!(self.orientation_hint, 0 | 90 | 180 | 270) {
            return reject(format!("invalid orientation {}", self.orientation_hint));
        }
        Ok(())
    }

    /// Frame layout the encoder surface accepts
    pub fn surface_format(&self) -> SurfaceFormat {
        SurfaceFormat {
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
            framerate: self.framerate,
        }
    }
}

/// Output file and profile of one recording
///
/// The file is named after the capture start in epoch milliseconds.
#[derive(Debug, Clone)]
pub struct RecordingTarget {
    id: Uuid,
    path: PathBuf,
    profile: CaptureProfile,
    started_at: DateTime<Local>,
}

impl RecordingTarget {
    /// Target under `root` named after the current time
    pub fn new(root: &Path, profile: CaptureProfile) -> Self {
        let started_at = Local::now();
        let extension = profile.container.extension();

        // Two starts within one millisecond must not share a file
        let mut millis = started_at.timestamp_millis();
        let mut path = root.join(format!("{}.{}", millis, extension));
        while path.exists() {
            millis += 1;
            path = root.join(format!("{}.{}", millis, extension));
        }

        Self {
            id: Uuid::new_v4(),
            path,
            profile,
            started_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profile(&self) -> &CaptureProfile {
        &self.profile
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }
}
