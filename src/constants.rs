// SPDX-License-Identifier: GPL-3.0-only

//! Service-wide constants and capture defaults

use serde::{Deserialize, Serialize};

/// Video encoder bitrate presets
///
/// These presets define the target bitrate for video encoding based on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    /// All preset variants, lowest bitrate first
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Get bitrate in kbps for a given resolution
    ///
    /// - SD (640x480): Low=1, Medium=2, High=4 Mbps
    /// - HD (1280x720): Low=2.5, Medium=5, High=10 Mbps
    /// - Full HD (1920x1080): Low=4, Medium=8, High=16 Mbps
    /// - 2K (2560x1440): Low=8, Medium=16, High=32 Mbps
    /// - 4K (3840x2160): Low=15, Medium=30, High=50 Mbps
    pub fn bitrate_kbps(&self, width: u32, _height: u32) -> u32 {
        match (get_resolution_tier(width), self) {
            (ResolutionTier::SD, BitratePreset::Low) => 1_000,
            (ResolutionTier::SD, BitratePreset::Medium) => 2_000,
            (ResolutionTier::SD, BitratePreset::High) => 4_000,
            (ResolutionTier::HD, BitratePreset::Low) => 2_500,
            (ResolutionTier::HD, BitratePreset::Medium) => 5_000,
            (ResolutionTier::HD, BitratePreset::High) => 10_000,
            (ResolutionTier::FullHD, BitratePreset::Low) => 4_000,
            (ResolutionTier::FullHD, BitratePreset::Medium) => 8_000,
            (ResolutionTier::FullHD, BitratePreset::High) => 16_000,
            (ResolutionTier::TwoK, BitratePreset::Low) => 8_000,
            (ResolutionTier::TwoK, BitratePreset::Medium) => 16_000,
            (ResolutionTier::TwoK, BitratePreset::High) => 32_000,
            (ResolutionTier::FourK, BitratePreset::Low) => 15_000,
            (ResolutionTier::FourK, BitratePreset::Medium) => 30_000,
            (ResolutionTier::FourK, BitratePreset::High) => 50_000,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// SD: 640x480 and below
    SD,
    /// HD: 1280x720
    HD,
    /// Full HD: 1920x1080
    FullHD,
    /// 2K: 2560x1440
    TwoK,
    /// 4K: 3840x2160 and above
    FourK,
}

/// Get the resolution tier for a given width
pub fn get_resolution_tier(width: u32) -> ResolutionTier {
    match width {
        w if w >= 3840 => ResolutionTier::FourK,
        w if w >= 2560 => ResolutionTier::TwoK,
        w if w >= 1920 => ResolutionTier::FullHD,
        w if w >= 1280 => ResolutionTier::HD,
        _ => ResolutionTier::SD,
    }
}

/// Format bitrate for display (e.g., "8 Mbps" or "2.5 Mbps")
pub fn format_bitrate(kbps: u32) -> String {
    let mbps = kbps as f64 / 1000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Fixed capture defaults
///
/// The selector and frame-rate range match a front-facing camera recording
/// at a steady 30 fps. All of them can be overridden in the config file.
pub mod capture {
    /// Camera selector ("1" is the front camera, i.e. /dev/video1)
    pub const DEFAULT_CAMERA_SELECTOR: &str = "1";

    /// Default recording resolution
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;

    /// Target frame rate, also used as both ends of the fps range
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// Pixel format requested from the camera and accepted by the surface
    pub const DEFAULT_PIXEL_FORMAT: &str = "YUYV";

    /// Microphone sample parameters
    pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;
    pub const DEFAULT_AUDIO_CHANNELS: u32 = 2;

    /// Rotation written to the container (degrees)
    pub const ORIENTATION_HINT: u32 = 0;

    /// Folder under the user's video directory
    pub const DEFAULT_SAVE_FOLDER: &str = "quietcam";
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// How long to watch the bus for immediate errors after going to PLAYING
    pub const START_ERROR_PROBE: Duration = Duration::from_millis(500);

    /// Upper bound for the EOS to travel through the pipeline on stop
    pub const EOS_TIMEOUT: Duration = Duration::from_secs(5);

    /// Consecutive failed frame reads before the device counts as lost
    pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 30;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
