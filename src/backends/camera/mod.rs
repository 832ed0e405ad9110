// SPDX-License-Identifier: MPL-2.0

//! Camera hardware abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  CaptureController   │  ← camera-worker thread
//! └──────────┬───────────┘
//!            │ commands
//!            ▼
//! ┌──────────────────────┐       HardwareCallback
//! │    CameraSession     │ ◀─────────────────────────┐
//! └──────────┬───────────┘                           │
//!            │ requests                              │
//!            ▼                                       │
//! ┌──────────────────────┐                  ┌────────┴───────┐
//! │ CameraHardware trait │ ───────────────▶ │  CallbackSink  │
//! └──────────┬───────────┘                  └────────────────┘
//!            │
//!       ┌────┴──────┐
//!       │ V4L2      │ Simulated
//!       └───────────┘
//! ```
//!
//! Requests are issued synchronously from the camera worker. Progress is
//! reported asynchronously: a backend answers `open_device` with a
//! `DeviceOpened` callback, `create_session` with `SessionConfigured` and
//! then `SessionReady`. Backends may call the sink from any thread.

pub mod frame_loop;
pub mod simulated;
pub mod types;
pub mod v4l2;

pub use simulated::{HardwareCall, SimulatedControl, SimulatedHardware};
pub use types::*;
pub use v4l2::V4l2Hardware;

use crate::errors::CameraError;

/// Camera device driver seen by the capture session
///
/// Every method is called from the camera worker only. Teardown methods
/// (`stop_repeating`, `close_session`, `close_device`) must tolerate handles
/// that are already gone and never fail; the session calls each at most once
/// per handle.
pub trait CameraHardware: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Begin opening a device
    ///
    /// A refused permission is reported synchronously as
    /// [`CameraError::AccessDenied`]. On success the backend later delivers
    /// `DeviceOpened`, `DeviceDisconnected` or `DeviceError` through `sink`.
    fn open_device(
        &mut self,
        selector: &CameraSelector,
        sink: CallbackSink,
    ) -> Result<(), CameraError>;

    /// Begin configuring a capture session with `surface` as its only output
    ///
    /// Answered by `SessionConfigured` then `SessionReady`, or by
    /// `SessionConfigureFailed`.
    fn create_session(
        &mut self,
        device: DeviceHandle,
        surface: SurfaceHandle,
        sink: CallbackSink,
    ) -> Result<(), CameraError>;

    /// Start the repeating capture request; frames flow into the request target
    fn set_repeating_request(
        &mut self,
        session: SessionHandle,
        request: CaptureRequest,
    ) -> Result<(), CameraError>;

    /// Cancel the repeating request and wait for frame delivery to stop
    fn stop_repeating(&mut self, session: SessionHandle);

    fn close_session(&mut self, session: SessionHandle);

    fn close_device(&mut self, device: DeviceHandle);
}

/// Create the hardware driver for a backend type
///
/// The simulated backend is returned in automatic mode with frames at the
/// requested rate, which is what `--simulate` uses.
pub fn create_hardware(backend: CameraBackendType) -> Box<dyn CameraHardware> {
    match backend {
        CameraBackendType::V4l2 => Box::new(V4l2Hardware::new()),
        CameraBackendType::Simulated => Box::new(SimulatedHardware::new().0),
    }
}
