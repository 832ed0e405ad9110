// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera hardware
//!
//! Opens `/dev/videoN` nodes directly through the `v4l` crate. The format is
//! negotiated when the capture session is created and the surface's format
//! must be accepted exactly. Frames are read from a memory-mapped stream on
//! a frame loop thread and copied into the target surface.

use super::frame_loop::{FrameLoop, LoopAction};
use super::types::*;
use super::CameraHardware;
use crate::constants::timing::{FRAME_LOG_INTERVAL, MAX_CONSECUTIVE_READ_ERRORS};
use crate::errors::CameraError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

/// Number of kernel buffers in the capture queue
const STREAM_BUFFERS: u32 = 4;

struct OpenDevice {
    path: PathBuf,
    device: Device,
}

struct ActiveSession {
    device: DeviceHandle,
    format: SurfaceFormat,
    surface: SurfaceHandle,
    sink: CallbackSink,
    frame_loop: Option<FrameLoop>,
}

/// A discovered capture device
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub path: PathBuf,
    pub card: String,
    pub driver: String,
    pub formats: Vec<String>,
}

/// V4L2 camera driver
#[derive(Default)]
pub struct V4l2Hardware {
    next_handle: u64,
    devices: HashMap<DeviceHandle, OpenDevice>,
    sessions: HashMap<SessionHandle, ActiveSession>,
}

impl V4l2Hardware {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Map an open(2) failure on a device node to a camera error
fn open_error(path: &Path, err: &std::io::Error) -> CameraError {
    match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => CameraError::AccessDenied,
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
            CameraError::OpenFailed(format!("{}: no such device", path.display()))
        }
        Some(libc::EBUSY) => CameraError::OpenFailed(format!("{}: device busy", path.display())),
        _ => CameraError::OpenFailed(format!("{}: {}", path.display(), err)),
    }
}

/// Apply the surface format to the device, returning what the driver chose
fn negotiate_format(device: &Device, wanted: &SurfaceFormat) -> Result<Format, String> {
    let requested = Format::new(
        wanted.width,
        wanted.height,
        FourCC::new(&wanted.pixel_format.fourcc()),
    );
    let actual = device
        .set_format(&requested)
        .map_err(|e| format!("Failed to set format: {}", e))?;

    if actual.width != requested.width
        || actual.height != requested.height
        || actual.fourcc != requested.fourcc
    {
        return Err(format!(
            "device offered {}x{} {} instead of {}",
            actual.width, actual.height, actual.fourcc, wanted
        ));
    }
    Ok(actual)
}

struct CaptureState {
    // Declared before `device` so the stream is released first
    stream: Stream<'static>,
    _device: Device,
    sequence: u64,
    read_errors: u32,
}

fn spawn_capture(
    path: PathBuf,
    format: SurfaceFormat,
    surface: SurfaceHandle,
    sink: CallbackSink,
) -> std::io::Result<FrameLoop> {
    let init_path = path.clone();
    let init_sink = sink.clone();
    let frame_size = format.pixel_format.frame_size(format.width, format.height);

    FrameLoop::spawn_with_init(
        "v4l2-capture",
        move || {
            let state = Device::with_path(&init_path)
                .map_err(|e| format!("Failed to open device for streaming: {}", e))
                .and_then(|device| {
                    let stream = Stream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFERS)
                        .map_err(|e| format!("Failed to create stream: {}", e))?;
                    Ok(CaptureState {
                        stream,
                        _device: device,
                        sequence: 0,
                        read_errors: 0,
                    })
                });
            if let Err(e) = &state {
                init_sink.deliver(HardwareEvent::DeviceError(e.clone()));
            }
            state
        },
        move |state| match state.stream.next() {
            Ok((buf, meta)) => {
                state.read_errors = 0;
                let used = (meta.bytesused as usize).min(buf.len());
                if used < frame_size {
                    debug!(used, frame_size, "Short frame dropped");
                    return LoopAction::Continue;
                }

                let frame = VideoFrame {
                    data: Arc::from(&buf[..frame_size]),
                    width: format.width,
                    height: format.height,
                    format: format.pixel_format,
                    sequence: state.sequence,
                    captured_at: Instant::now(),
                };
                state.sequence += 1;
                let accepted = surface.push_frame(frame);

                if state.sequence % FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        sequence = state.sequence,
                        accepted,
                        "V4L2 frames flowing"
                    );
                }
                LoopAction::Continue
            }
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                warn!(path = %path.display(), "Camera disappeared");
                sink.deliver(HardwareEvent::DeviceDisconnected);
                LoopAction::Stop
            }
            Err(e) => {
                state.read_errors += 1;
                warn!(error = %e, count = state.read_errors, "Failed to read frame");
                if state.read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    sink.deliver(HardwareEvent::DeviceDisconnected);
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            }
        },
    )
}

impl CameraHardware for V4l2Hardware {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open_device(
        &mut self,
        selector: &CameraSelector,
        sink: CallbackSink,
    ) -> Result<(), CameraError> {
        let path = selector.device_path();

        // Probe read/write access first so a refused permission is reported
        // before anything is acquired
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| open_error(&path, &e))?;

        let device = Device::with_path(&path).map_err(|e| open_error(&path, &e))?;
        let caps = device
            .query_caps()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;
        info!(
            path = %path.display(),
            card = %caps.card,
            driver = %caps.driver,
            "Opened V4L2 device"
        );

        let handle = DeviceHandle::new(self.next_id());
        self.devices.insert(handle, OpenDevice { path, device });
        sink.deliver(HardwareEvent::DeviceOpened(handle));
        Ok(())
    }

    fn create_session(
        &mut self,
        device: DeviceHandle,
        surface: SurfaceHandle,
        sink: CallbackSink,
    ) -> Result<(), CameraError> {
        let Some(open) = self.devices.get(&device) else {
            return Err(CameraError::ConfigureFailed(format!(
                "unknown device handle {}",
                device.id()
            )));
        };

        let format = surface.format();
        match negotiate_format(&open.device, &format) {
            Ok(actual) => {
                debug!(
                    width = actual.width,
                    height = actual.height,
                    fourcc = %actual.fourcc,
                    "V4L2 format configured"
                );
                let handle = SessionHandle::new(self.next_id());
                self.sessions.insert(
                    handle,
                    ActiveSession {
                        device,
                        format,
                        surface,
                        sink: sink.clone(),
                        frame_loop: None,
                    },
                );
                sink.deliver(HardwareEvent::SessionConfigured(handle));
                sink.deliver(HardwareEvent::SessionReady);
            }
            Err(reason) => {
                warn!(reason = %reason, "V4L2 format rejected");
                sink.deliver(HardwareEvent::SessionConfigureFailed(reason));
            }
        }
        Ok(())
    }

    fn set_repeating_request(
        &mut self,
        session: SessionHandle,
        request: CaptureRequest,
    ) -> Result<(), CameraError> {
        let Some(active) = self.sessions.get_mut(&session) else {
            return Err(CameraError::ConfigureFailed(format!(
                "unknown session handle {}",
                session.id()
            )));
        };
        let Some(open) = self.devices.get(&active.device) else {
            return Err(CameraError::Disconnected);
        };

        // Drivers take a single frame interval; the top of the range wins
        let fps = request.fps_range.max;
        match open.device.set_params(&Parameters::with_fps(fps)) {
            Ok(params) => debug!(
                requested = fps,
                interval = %params.interval,
                template = ?request.template,
                "Frame interval applied"
            ),
            Err(e) => warn!(error = %e, fps, "Driver refused frame interval"),
        }

        if let Some(mut previous) = active.frame_loop.take() {
            previous.stop();
        }
        active.surface = request.target;
        let frame_loop = spawn_capture(
            open.path.clone(),
            active.format,
            Arc::clone(&active.surface),
            active.sink.clone(),
        )
        .map_err(|e| CameraError::ConfigureFailed(e.to_string()))?;
        active.frame_loop = Some(frame_loop);
        Ok(())
    }

    fn stop_repeating(&mut self, session: SessionHandle) {
        if let Some(active) = self.sessions.get_mut(&session)
            && let Some(mut frame_loop) = active.frame_loop.take()
        {
            frame_loop.stop();
            debug!(session = session.id(), "Repeating request cancelled");
        }
    }

    fn close_session(&mut self, session: SessionHandle) {
        if let Some(mut active) = self.sessions.remove(&session)
            && let Some(mut frame_loop) = active.frame_loop.take()
        {
            frame_loop.stop();
        }
    }

    fn close_device(&mut self, device: DeviceHandle) {
        if let Some(open) = self.devices.remove(&device) {
            info!(path = %open.path.display(), "Closed V4L2 device");
        }
    }
}

/// List V4L2 capture devices
pub fn enumerate_cameras() -> Vec<CameraInfo> {
    let mut cameras = Vec::new();
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return cameras;
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("video"))
        })
        .collect();
    paths.sort();

    for path in paths {
        let Ok(device) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = device.query_caps() else {
            continue;
        };
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            continue;
        }

        let formats = device
            .enum_formats()
            .map(|formats| {
                formats
                    .into_iter()
                    .map(|desc| desc.fourcc.to_string())
                    .collect()
            })
            .unwrap_or_default();

        debug!(path = %path.display(), card = %caps.card, "Found V4L2 capture device");
        cameras.push(CameraInfo {
            path,
            card: caps.card,
            driver: caps.driver,
            formats,
        });
    }

    cameras
}
