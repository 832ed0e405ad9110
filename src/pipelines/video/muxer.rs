// SPDX-License-Identifier: MPL-2.0

//! Audio/video muxing logic
//!
//! Creates the container muxer and file sink and links encoded streams
//! into them.

use crate::media::encoders::ContainerFormat;
use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Muxer configuration
pub struct MuxerConfig {
    /// Muxer element
    pub muxer: gst::Element,
    /// File sink element
    pub filesink: gst::Element,
    /// Output file path
    pub output_path: PathBuf,
}

/// Create muxer and filesink for `container`
///
/// # Arguments
/// * `container` - Output container
/// * `output_path` - Path to output file
/// * `orientation_hint` - Clockwise rotation in degrees, 0 for none
///
/// # Returns
/// * `Ok(MuxerConfig)` - Muxer configuration
/// * `Err(String)` - Error message
pub fn create_muxer(
    container: ContainerFormat,
    output_path: &Path,
    orientation_hint: u32,
) -> Result<MuxerConfig, String> {
    info!(path = %output_path.display(), container = %container, "Creating muxer");

    let muxer_name = container.muxer_name();
    let muxer = gst::ElementFactory::make(muxer_name)
        .build()
        .map_err(|e| format!("Failed to create {}: {}", muxer_name, e))?;

    // Non-streamable output gets duration and indexes written for seeking
    if muxer.has_property("streamable") {
        muxer.set_property("streamable", false);
        debug!(muxer = %muxer_name, "Configured muxer with streamable=false");
    }

    if orientation_hint != 0 {
        set_orientation(&muxer, orientation_hint);
    }

    let location = output_path
        .to_str()
        .ok_or_else(|| format!("Output path is not valid UTF-8: {}", output_path.display()))?;
    let filesink = gst::ElementFactory::make("filesink")
        .property("location", location)
        .build()
        .map_err(|e| format!("Failed to create filesink: {}", e))?;

    debug!(muxer = %muxer_name, "Muxer and filesink created");

    Ok(MuxerConfig {
        muxer,
        filesink,
        output_path: output_path.to_path_buf(),
    })
}

/// Tag the container with a display rotation
fn set_orientation(muxer: &gst::Element, degrees: u32) {
    let Some(setter) = muxer.dynamic_cast_ref::<gst::TagSetter>() else {
        warn!(degrees, "Muxer cannot carry an orientation tag");
        return;
    };
    let orientation = format!("rotate-{}", degrees);
    setter.add_tag::<gst::tags::ImageOrientation>(
        &orientation.as_str(),
        gst::TagMergeMode::Replace,
    );
    debug!(orientation = %orientation, "Set container orientation");
}

/// Link the last element of an encoded stream to the muxer
///
/// # Arguments
/// * `upstream` - Video parser/encoder or audio encoder element
/// * `muxer` - Muxer element
/// * `kind` - "video" or "audio", for error messages
pub fn link_to_muxer(
    upstream: &gst::Element,
    muxer: &gst::Element,
    kind: &str,
) -> Result<(), String> {
    upstream
        .link(muxer)
        .map_err(|_| format!("Failed to link {} stream to muxer", kind))?;

    debug!("{} stream linked to muxer", kind);
    Ok(())
}

/// Link muxer to filesink
pub fn link_muxer_to_sink(muxer: &gst::Element, filesink: &gst::Element) -> Result<(), String> {
    muxer
        .link(filesink)
        .map_err(|_| "Failed to link muxer to filesink".to_string())?;

    debug!("Muxer linked to filesink");
    Ok(())
}
