// SPDX-License-Identifier: MPL-2.0

//! Audio encoders for the recording's sound track
//!
//! MP4 recordings prefer AAC and fall back to Opus; WebM only carries Opus.

use super::video::ContainerFormat;
use gstreamer as gst;
use gstreamer::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Opus,
    AAC,
}

impl AudioCodec {
    /// Sample rates the encoder takes as-is
    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        match self {
            AudioCodec::Opus => matches!(rate, 8_000 | 12_000 | 16_000 | 24_000 | 48_000),
            AudioCodec::AAC => matches!(
                rate,
                8_000 | 11_025 | 12_000 | 16_000 | 22_050 | 24_000 | 32_000 | 44_100 | 48_000
            ),
        }
    }
}

/// Sound track quality, stored in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    #[default]
    High,
    Maximum,
}

impl AudioQuality {
    pub fn bitrate_bps(&self) -> i32 {
        match self {
            AudioQuality::Low => 64_000,
            AudioQuality::Medium => 96_000,
            AudioQuality::High => 128_000,
            AudioQuality::Maximum => 192_000,
        }
    }
}

pub struct SelectedAudioEncoder {
    pub encoder: gst::Element,
    pub codec: AudioCodec,
    pub element_name: &'static str,
}

/// AAC encoders in preference order
const AAC_ENCODERS: [&str; 4] = ["fdkaacenc", "avenc_aac", "voaacenc", "faac"];

/// Build the audio encoder for `container`
///
/// An AAC encoder that cannot take `sample_rate` is skipped in favour of
/// Opus when the container allows it.
pub fn select_audio_encoder(
    container: ContainerFormat,
    quality: AudioQuality,
    channels: u32,
    sample_rate: u32,
) -> Result<SelectedAudioEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    if container == ContainerFormat::MP4 && AudioCodec::AAC.supports_sample_rate(sample_rate) {
        for name in AAC_ENCODERS {
            let Ok(encoder) = gst::ElementFactory::make(name).build() else {
                continue;
            };
            if encoder.has_property("bitrate") {
                // gint on most encoders, gint64 on avenc_aac
                encoder.set_property_from_str("bitrate", &quality.bitrate_bps().to_string());
            }
            info!(codec = "AAC", encoder = name, channels, "Selected audio encoder");
            return Ok(SelectedAudioEncoder {
                encoder,
                codec: AudioCodec::AAC,
                element_name: name,
            });
        }
    }

    if !AudioCodec::Opus.supports_sample_rate(sample_rate) {
        return Err(format!("no audio encoder accepts {} Hz", sample_rate));
    }

    let encoder = gst::ElementFactory::make("opusenc").build().map_err(|_| {
        "No audio encoder available. Install gstreamer1-plugins-base (opusenc) \
         or gstreamer1-plugins-bad (fdkaacenc, voaacenc)"
            .to_string()
    })?;

    encoder.set_property("bitrate", quality.bitrate_bps());
    let audio_type = if channels == 1 { "voice" } else { "generic" };
    encoder.set_property_from_str("audio-type", audio_type);
    debug!(bitrate = quality.bitrate_bps(), audio_type, "Configured opusenc");

    info!(codec = "Opus", channels, "Selected audio encoder");
    Ok(SelectedAudioEncoder {
        encoder,
        codec: AudioCodec::Opus,
        element_name: "opusenc",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_quality_bitrates() {
        assert!(AudioQuality::Low.bitrate_bps() < AudioQuality::High.bitrate_bps());
        assert_eq!(AudioQuality::Maximum.bitrate_bps(), 192_000);
        assert_eq!(AudioQuality::default(), AudioQuality::High);
    }

    #[test]
    fn test_audio_quality_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AudioQuality::Maximum).unwrap(),
            "\"maximum\""
        );
    }

    #[test]
    fn test_sample_rate_support() {
        assert!(AudioCodec::AAC.supports_sample_rate(44_100));
        assert!(!AudioCodec::Opus.supports_sample_rate(44_100));
        assert!(AudioCodec::Opus.supports_sample_rate(48_000));
    }
}
