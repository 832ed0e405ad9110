// SPDX-License-Identifier: MPL-2.0

//! Encoder selection for the recording pipeline
//!
//! Picks one video and one audio encoder for a capture profile. Both
//! tracks are mandatory, so a missing audio encoder is an error rather
//! than a silent video-only recording.

use crate::media::encoders::{
    audio::{SelectedAudioEncoder, select_audio_encoder},
    video::{SelectedVideoEncoder, select_video_encoder},
};
use crate::recording::CaptureProfile;
use tracing::info;

/// Selected encoders for recording
pub struct SelectedEncoders {
    pub video: SelectedVideoEncoder,
    pub audio: SelectedAudioEncoder,
}

/// Select the best available encoders for `profile`
///
/// # Returns
/// * `Ok(SelectedEncoders)` - Selected encoders
/// * `Err(String)` - No usable encoder, or none that takes the profile's
///   sample rate
pub fn select_encoders(profile: &CaptureProfile) -> Result<SelectedEncoders, String> {
    let video = select_video_encoder(
        profile.container,
        profile.video_bitrate_kbps,
        profile.framerate,
    )?;

    let audio = select_audio_encoder(
        profile.container,
        profile.audio_quality,
        profile.audio_channels,
        profile.audio_sample_rate,
    )?;

    info!(
        video_encoder = %video.element_name,
        video_codec = ?video.codec,
        audio_encoder = audio.element_name,
        container = %profile.container,
        "Selected encoders"
    );

    Ok(SelectedEncoders { video, audio })
}
