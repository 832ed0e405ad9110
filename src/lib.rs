// SPDX-License-Identifier: MPL-2.0

//! quietcam - headless camera recorder
//!
//! Opens a camera without rendering any preview, drives it through
//! open → configure → repeating capture, and records synchronized audio and
//! video into a container file when an external controller says so.
//!
//! # Architecture
//!
//! - [`recording`]: the capture controller, camera session state machine
//!   and encoder resource
//! - [`backends`]: camera hardware (V4L2, simulated) and microphone sources
//! - [`pipelines`]: the GStreamer recording pipeline
//! - [`media`]: encoder selection and detection
//! - [`config`]: user configuration
//! - [`storage`]: storage root and recording listing
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load()?;
//! let hardware = create_hardware(config.backend);
//! let controller = CaptureController::spawn(config, hardware, Box::new(GstRecorderFactory))?;
//! let path = controller.start().await?;
//! // ...
//! controller.stop().await?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod recording;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{CameraError, ControllerError, EncoderError, StartFailure};
pub use recording::{CaptureController, CaptureSessionState, ServiceStatus, StopReport};
