// SPDX-License-Identifier: MPL-2.0

//! Media encoder selection and configuration
//!
//! - Video: hardware encoders first, software fallbacks, filtered by container
//! - Audio: AAC for MP4, Opus for WebM
//! - Detection of what the GStreamer installation provides

pub mod audio;
pub mod detection;
pub mod video;

// Re-export commonly used types
pub use audio::{AudioCodec, AudioQuality};
pub use video::{ContainerFormat, VideoCodec};
