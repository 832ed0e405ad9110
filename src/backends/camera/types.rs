// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends
//!
//! Hardware backends never call into the session state machine directly.
//! Everything they want to report is sent as a [`HardwareEvent`] through the
//! [`CallbackSink`] handed to them, tagged with the open attempt it belongs to.

use crate::constants::capture::DEFAULT_CAMERA_SELECTOR;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// Video4Linux2 capture devices
    #[default]
    V4l2,
    /// Scripted camera producing synthetic frames
    Simulated,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::V4l2 => write!(f, "V4L2"),
            CameraBackendType::Simulated => write!(f, "simulated"),
        }
    }
}

/// Which camera to open
///
/// A bare number selects `/dev/video<N>`; an absolute path is used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraSelector(String);

impl CameraSelector {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Device node this selector refers to
    pub fn device_path(&self) -> PathBuf {
        if self.0.starts_with('/') {
            PathBuf::from(&self.0)
        } else {
            PathBuf::from(format!("/dev/video{}", self.0))
        }
    }
}

impl Default for CameraSelector {
    fn default() -> Self {
        Self::new(DEFAULT_CAMERA_SELECTOR)
    }
}

impl std::fmt::Display for CameraSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to an open camera device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Opaque handle to a configured capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Pixel formats exchanged between camera and encoder surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 4:2:2 (YUYV / YUY2)
    Yuyv,
    /// Semi-planar 4:2:0
    Nv12,
    /// Planar 4:2:0
    I420,
}

impl PixelFormat {
    /// Parse a V4L2 FourCC string ("YUYV", "NV12", "YU12"/"I420")
    pub fn from_fourcc(fourcc: &str) -> Option<Self> {
        match fourcc.trim().to_ascii_uppercase().as_str() {
            "YUYV" | "YUY2" => Some(PixelFormat::Yuyv),
            "NV12" => Some(PixelFormat::Nv12),
            "YU12" | "I420" => Some(PixelFormat::I420),
            _ => None,
        }
    }

    /// V4L2 FourCC bytes
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Nv12 => *b"NV12",
            PixelFormat::I420 => *b"YU12",
        }
    }

    /// Size in bytes of one tightly packed frame
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Yuyv => pixels * 2,
            PixelFormat::Nv12 | PixelFormat::I420 => pixels * 3 / 2,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.fourcc()))
    }
}

/// Frame layout a surface accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub framerate: u32,
}

impl std::fmt::Display for SurfaceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} {} @ {}fps",
            self.width, self.height, self.pixel_format, self.framerate
        )
    }
}

/// Auto-exposure target frame-rate range applied to a capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    /// Range pinned to a single frame rate
    pub fn fixed(fps: u32) -> Self {
        Self { min: fps, max: fps }
    }

    pub fn contains(&self, fps: u32) -> bool {
        (self.min..=self.max).contains(&fps)
    }

    pub fn is_valid(&self) -> bool {
        self.min > 0 && self.min <= self.max
    }
}

impl std::fmt::Display for FpsRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Capture request templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTemplate {
    Preview,
    /// Stable frame rate for video recording
    Record,
}

/// A single raw frame on its way from the camera into a surface
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sequence: u64,
    pub captured_at: Instant,
}

/// Frame-consuming target exposed by an encoder
///
/// `push_frame` returns `false` when the frame was dropped, e.g. because the
/// encoder has not started consuming yet.
pub trait FrameSink: Send + Sync {
    fn format(&self) -> SurfaceFormat;

    fn push_frame(&self, frame: VideoFrame) -> bool;
}

/// Shared handle to an encoder surface
pub type SurfaceHandle = Arc<dyn FrameSink>;

/// Request the hardware re-issues until cancelled
#[derive(Clone)]
pub struct CaptureRequest {
    pub template: CaptureTemplate,
    pub fps_range: FpsRange,
    pub target: SurfaceHandle,
}

impl std::fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("template", &self.template)
            .field("fps_range", &self.fps_range)
            .field("target", &self.target.format())
            .finish()
    }
}

/// Asynchronous notifications from camera hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    DeviceOpened(DeviceHandle),
    DeviceDisconnected,
    DeviceError(String),
    DeviceClosed,
    SessionConfigured(SessionHandle),
    SessionConfigureFailed(String),
    SessionReady,
    SessionClosed,
}

/// A hardware event together with the open attempt that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareCallback {
    pub attempt: u64,
    pub event: HardwareEvent,
}

/// Where a backend posts its callbacks
///
/// Every sink is bound to one open attempt, so callbacks that arrive after
/// the attempt was torn down can be told apart from current ones.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    attempt: u64,
    tx: mpsc::UnboundedSender<HardwareCallback>,
}

impl CallbackSink {
    pub fn new(attempt: u64, tx: mpsc::UnboundedSender<HardwareCallback>) -> Self {
        Self { attempt, tx }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Same channel, different attempt tag
    pub fn rebind(&self, attempt: u64) -> Self {
        Self {
            attempt,
            tx: self.tx.clone(),
        }
    }

    /// Queue an event for the camera worker; `false` if the worker is gone
    pub fn deliver(&self, event: HardwareEvent) -> bool {
        self.tx
            .send(HardwareCallback {
                attempt: self.attempt,
                event,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_device_path() {
        assert_eq!(
            CameraSelector::default().device_path(),
            PathBuf::from("/dev/video1")
        );
        assert_eq!(
            CameraSelector::new("/dev/v4l/by-id/cam").device_path(),
            PathBuf::from("/dev/v4l/by-id/cam")
        );
    }

    #[test]
    fn test_pixel_format_fourcc() {
        assert_eq!(PixelFormat::from_fourcc("yuyv"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc("I420"), Some(PixelFormat::I420));
        assert_eq!(PixelFormat::from_fourcc("MJPG"), None);
        assert_eq!(PixelFormat::Yuyv.frame_size(4, 2), 16);
        assert_eq!(PixelFormat::Nv12.frame_size(4, 2), 12);
    }

    #[test]
    fn test_fps_range() {
        let range = FpsRange::fixed(30);
        assert!(range.contains(30));
        assert!(!range.contains(29));
        assert!(range.is_valid());
        assert!(!FpsRange { min: 30, max: 15 }.is_valid());
    }

    #[test]
    fn test_callback_sink_tags_attempt() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = CallbackSink::new(7, tx);
        assert!(sink.deliver(HardwareEvent::SessionReady));

        let callback = rx.try_recv().unwrap();
        assert_eq!(callback.attempt, 7);
        assert_eq!(callback.event, HardwareEvent::SessionReady);

        drop(rx);
        assert!(!sink.deliver(HardwareEvent::SessionReady));
    }
}
