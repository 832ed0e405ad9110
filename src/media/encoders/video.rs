// SPDX-License-Identifier: MPL-2.0

//! Video encoder selection with hardware acceleration priority
//!
//! Candidates are filtered by what the output container can carry, then
//! tried in priority order: hardware encoders first, software fallbacks
//! after. The first one GStreamer can instantiate wins.

use gstreamer as gst;
use gstreamer::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Video codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 codec (best compatibility)
    H264,
    /// HEVC/H.265 codec (good compression)
    HEVC,
    /// AV1 codec (best compression, modern)
    AV1,
    VP9,
    VP8,
}

impl VideoCodec {
    /// Get the parser element name (if needed)
    pub fn parser_name(&self) -> Option<&'static str> {
        match self {
            VideoCodec::AV1 => Some("av1parse"),
            VideoCodec::HEVC => Some("h265parse"),
            VideoCodec::H264 => Some("h264parse"),
            VideoCodec::VP9 | VideoCodec::VP8 => None,
        }
    }
}

/// Container formats for recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// MP4 container (good compatibility)
    #[default]
    MP4,
    /// WebM container (open format)
    WebM,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 2] = [ContainerFormat::MP4, ContainerFormat::WebM];

    /// Get file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4",
            ContainerFormat::WebM => "webm",
        }
    }

    /// Get muxer element name
    pub fn muxer_name(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4mux",
            ContainerFormat::WebM => "webmmux",
        }
    }

    /// Whether the container can carry this video codec
    pub fn carries(&self, codec: VideoCodec) -> bool {
        match self {
            ContainerFormat::MP4 => matches!(codec, VideoCodec::H264 | VideoCodec::HEVC),
            ContainerFormat::WebM => {
                matches!(codec, VideoCodec::AV1 | VideoCodec::VP9 | VideoCodec::VP8)
            }
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Information about an available encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    /// GStreamer element name
    pub element_name: String,
    /// Human readable name
    pub display_name: String,
    /// Codec type
    pub codec: VideoCodec,
    /// Whether this is hardware accelerated
    pub is_hardware: bool,
    /// Priority (lower = higher priority)
    pub priority: u32,
}

/// Selected video encoder with configuration
pub struct SelectedVideoEncoder {
    /// The encoder element
    pub encoder: gst::Element,
    /// Optional parser element
    pub parser: Option<gst::Element>,
    /// Codec being used
    pub codec: VideoCodec,
    /// GStreamer element name of the encoder
    pub element_name: &'static str,
}

/// Known encoders: element, display name, codec, hardware, priority
static ENCODER_SPECS: [(&str, &str, VideoCodec, bool, u32); 20] = [
    // Hardware H.264
    ("vah264enc", "VA-API H.264 (HW)", VideoCodec::H264, true, 1),
    ("vaapih264enc", "VA-API H.264 (HW)", VideoCodec::H264, true, 2),
    ("nvh264enc", "NVIDIA H.264 (HW)", VideoCodec::H264, true, 3),
    ("qsvh264enc", "Intel QSV H.264 (HW)", VideoCodec::H264, true, 4),
    ("v4l2h264enc", "V4L2 H.264 (HW)", VideoCodec::H264, true, 5),
    // Hardware HEVC/H.265
    ("vah265enc", "VA-API H.265 (HW)", VideoCodec::HEVC, true, 10),
    ("vaapih265enc", "VA-API H.265 (HW)", VideoCodec::HEVC, true, 11),
    ("nvh265enc", "NVIDIA H.265 (HW)", VideoCodec::HEVC, true, 12),
    ("v4l2h265enc", "V4L2 H.265 (HW)", VideoCodec::HEVC, true, 13),
    // Hardware AV1
    ("vaav1enc", "VA-API AV1 (HW)", VideoCodec::AV1, true, 20),
    ("nvav1enc", "NVIDIA AV1 (HW)", VideoCodec::AV1, true, 21),
    ("qsvav1enc", "Intel QSV AV1 (HW)", VideoCodec::AV1, true, 22),
    // Hardware VP9
    ("vavp9enc", "VA-API VP9 (HW)", VideoCodec::VP9, true, 30),
    // Software H.264
    ("x264enc", "x264 H.264 (SW)", VideoCodec::H264, false, 50),
    ("openh264enc", "OpenH264 H.264 (SW)", VideoCodec::H264, false, 51),
    // Software HEVC/H.265
    ("x265enc", "x265 H.265 (SW)", VideoCodec::HEVC, false, 55),
    // Software AV1
    ("svtav1enc", "SVT-AV1 (SW)", VideoCodec::AV1, false, 60),
    ("av1enc", "AOM AV1 (SW)", VideoCodec::AV1, false, 61),
    // Software VP9/VP8
    ("vp9enc", "libvpx VP9 (SW)", VideoCodec::VP9, false, 70),
    ("vp8enc", "libvpx VP8 (SW)", VideoCodec::VP8, false, 71),
];

fn is_available(element_name: &str) -> bool {
    gst::ElementFactory::find(element_name).is_some()
}

/// All known encoders installed on this system, best first
pub fn enumerate_video_encoders() -> Vec<EncoderInfo> {
    if gst::init().is_err() {
        return Vec::new();
    }

    let mut available: Vec<EncoderInfo> = ENCODER_SPECS
        .iter()
        .filter(|(name, ..)| is_available(name))
        .map(
            |(element_name, display_name, codec, is_hardware, priority)| EncoderInfo {
                element_name: element_name.to_string(),
                display_name: display_name.to_string(),
                codec: *codec,
                is_hardware: *is_hardware,
                priority: *priority,
            },
        )
        .collect();

    available.sort_by_key(|e| e.priority);
    available
}

/// Select the best available video encoder the container can carry
///
/// # Arguments
/// * `container` - Output container
/// * `bitrate_kbps` - Target bitrate
/// * `framerate` - Frames per second, used for keyframe spacing
///
/// # Returns
/// * `Ok(SelectedVideoEncoder)` - Selected encoder with configuration
/// * `Err(String)` - No usable encoder is installed
pub fn select_video_encoder(
    container: ContainerFormat,
    bitrate_kbps: u32,
    framerate: u32,
) -> Result<SelectedVideoEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    let candidates = ENCODER_SPECS
        .iter()
        .filter(|(_, _, codec, ..)| container.carries(*codec));

    for (encoder_name, _, codec, is_hardware, _) in candidates {
        let Ok(encoder) = gst::ElementFactory::make(*encoder_name).build() else {
            continue;
        };

        info!(
            encoder = %encoder_name,
            codec = ?codec,
            hardware = *is_hardware,
            container = %container,
            "Selected video encoder"
        );
        configure_video_encoder(&encoder, encoder_name, bitrate_kbps, framerate);

        let parser = match codec.parser_name() {
            Some(parser_name) => match gst::ElementFactory::make(parser_name).build() {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Failed to create parser {}: {}", parser_name, e);
                    None
                }
            },
            None => None,
        };

        return Ok(SelectedVideoEncoder {
            encoder,
            parser,
            codec: *codec,
            element_name: *encoder_name,
        });
    }

    Err(match container {
        ContainerFormat::MP4 => "No H.264/H.265 encoder available. Please install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264".to_string(),
        ContainerFormat::WebM => "No VP8/VP9/AV1 encoder available. Please install gstreamer1-plugins-good (vp8enc, vp9enc)".to_string(),
    })
}

/// Configure encoder for live recording at a fixed bitrate
fn configure_video_encoder(
    encoder: &gst::Element,
    encoder_name: &str,
    bitrate: u32,
    framerate: u32,
) {
    // One keyframe per second
    let keyframe_interval = framerate.max(1);

    match encoder_name {
        "x264enc" => {
            let _ = encoder.set_property_from_str("speed-preset", "veryfast");
            let _ = encoder.set_property_from_str("tune", "zerolatency");
            let _ = encoder.set_property("bitrate", bitrate);
            let _ = encoder.set_property("key-int-max", keyframe_interval);
            debug!("Configured x264enc: bitrate={} kbps", bitrate);
        }

        "x265enc" => {
            let _ = encoder.set_property_from_str("speed-preset", "veryfast");
            let _ = encoder.set_property_from_str("tune", "zerolatency");
            let _ = encoder.set_property("bitrate", bitrate);
            debug!("Configured x265enc: bitrate={} kbps", bitrate);
        }

        "openh264enc" => {
            let _ = encoder.set_property_from_str("rate-control", "bitrate");
            let _ = encoder.set_property("bitrate", bitrate * 1000); // Bits per second
            let _ = encoder.set_property_from_str("usage-type", "camera");
            debug!("Configured openh264enc: bitrate={} bps", bitrate * 1000);
        }

        // VA-API encoders (old plugin style - uses integer)
        "vaapih264enc" | "vaapih265enc" => {
            let _ = encoder.set_property("rate-control", 2); // CBR
            let _ = encoder.set_property("bitrate", bitrate);
            debug!("Configured VA-API encoder: bitrate={} kbps", bitrate);
        }

        "vah264enc" | "vah265enc" | "vaav1enc" | "vavp9enc" => {
            let _ = encoder.set_property_from_str("rate-control", "cbr");
            let _ = encoder.set_property("bitrate", bitrate);
            debug!("Configured VA encoder: bitrate={} kbps", bitrate);
        }

        "nvh264enc" | "nvh265enc" | "nvav1enc" => {
            let _ = encoder.set_property("bitrate", bitrate);
            let _ = encoder.set_property_from_str("rc-mode", "cbr");
            debug!("Configured NVIDIA encoder: bitrate={} kbps", bitrate);
        }

        "qsvh264enc" | "qsvav1enc" => {
            let _ = encoder.set_property("bitrate", bitrate);
            debug!("Configured Intel QSV encoder: bitrate={} kbps", bitrate);
        }

        "v4l2h264enc" | "v4l2h265enc" => {
            debug!("Using V4L2 encoder with default configuration");
        }

        "svtav1enc" => {
            let _ = encoder.set_property("target-bitrate", bitrate);
            let _ = encoder.set_property("preset", 10u32);
            debug!("Configured svtav1enc: bitrate={} kbps", bitrate);
        }

        "av1enc" => {
            let _ = encoder.set_property("target-bitrate", bitrate);
            let _ = encoder.set_property("cpu-used", 8i32);
            let _ = encoder.set_property_from_str("usage-profile", "realtime");
            debug!("Configured av1enc: bitrate={} kbps", bitrate);
        }

        "vp8enc" | "vp9enc" => {
            let _ = encoder.set_property("target-bitrate", (bitrate * 1000) as i32);
            let _ = encoder.set_property("deadline", 1i64); // realtime
            let _ = encoder.set_property("cpu-used", 8i32);
            let _ = encoder.set_property("keyframe-max-dist", keyframe_interval as i32);
            debug!("Configured {}: bitrate={} bps", encoder_name, bitrate * 1000);
        }

        _ => {
            debug!("Unknown encoder type, using default configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_formats() {
        assert_eq!(ContainerFormat::MP4.extension(), "mp4");
        assert_eq!(ContainerFormat::WebM.extension(), "webm");
        assert_eq!(ContainerFormat::MP4.muxer_name(), "mp4mux");
        assert_eq!(ContainerFormat::WebM.muxer_name(), "webmmux");
    }

    #[test]
    fn test_container_codec_compatibility() {
        assert!(ContainerFormat::MP4.carries(VideoCodec::H264));
        assert!(!ContainerFormat::MP4.carries(VideoCodec::VP8));
        assert!(ContainerFormat::WebM.carries(VideoCodec::AV1));
        assert!(!ContainerFormat::WebM.carries(VideoCodec::HEVC));
    }

    #[test]
    fn test_container_serde_names() {
        assert_eq!(
            serde_json::to_string(&ContainerFormat::WebM).unwrap(),
            "\"webm\""
        );
        let parsed: ContainerFormat = serde_json::from_str("\"mp4\"").unwrap();
        assert_eq!(parsed, ContainerFormat::MP4);
    }

    #[test]
    fn test_priorities_prefer_hardware() {
        let lowest_sw = ENCODER_SPECS
            .iter()
            .filter(|spec| !spec.3)
            .map(|spec| spec.4)
            .min()
            .unwrap();
        assert!(ENCODER_SPECS.iter().filter(|spec| spec.3).all(|spec| spec.4 < lowest_sw));
    }
}
