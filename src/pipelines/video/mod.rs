// SPDX-License-Identifier: MPL-2.0

//! Video recording pipeline
//!
//! - Selects the best available encoders (hardware preferred)
//! - Takes raw frames from the camera through an `appsrc` surface
//! - Records the microphone alongside into one container

pub mod encoder_selection;
pub mod muxer;
pub mod recorder;

pub use recorder::{AppSrcSurface, GstRecorder, GstRecorderFactory};
