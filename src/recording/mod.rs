// SPDX-License-Identifier: GPL-3.0-only

//! Recording core
//!
//! - [`target`]: output file naming and the capture profile
//! - [`encoder`]: encoder resource lifecycle
//! - [`session`]: camera session state machine
//! - [`controller`]: the worker that ties the three together

pub mod controller;
pub mod encoder;
pub mod session;
pub mod target;

pub use controller::{CaptureController, ServiceStatus, StopReport};
pub use encoder::{EncoderFactory, EncoderResource, EncoderState, MediaEncoder};
pub use session::{CameraSession, CaptureSessionState, SessionOutcome};
pub use target::{CaptureProfile, RecordingTarget};
