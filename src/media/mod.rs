// SPDX-License-Identifier: MPL-2.0

//! Media encoding utilities
//!
//! The [`encoders`] module picks and configures the GStreamer video and
//! audio encoders used by the recording pipeline.

pub mod encoders;
