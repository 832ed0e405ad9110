// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera hardware
//!
//! Behaves like a well-mannered camera driver: every request is answered with
//! the callbacks a real device would send, and once a repeating request is
//! set, synthetic frames are pushed into the target surface at the requested
//! frame rate.
//!
//! A [`SimulatedControl`] handle shares state with the hardware so tests can
//! switch to manual callbacks, inject failures and inspect the request log
//! after the hardware has been moved onto the camera worker.

use super::frame_loop::{FrameLoop, LoopAction};
use super::types::*;
use super::CameraHardware;
use crate::errors::CameraError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One request the session made against the hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCall {
    OpenDevice(String),
    CreateSession(DeviceHandle),
    SetRepeating {
        session: SessionHandle,
        template: CaptureTemplate,
        fps_range: FpsRange,
    },
    StopRepeating(SessionHandle),
    CloseSession(SessionHandle),
    CloseDevice(DeviceHandle),
}

#[derive(Default)]
struct SimState {
    manual: bool,
    deny_access: bool,
    fail_configure: Option<String>,
    frames_enabled: bool,
    calls: Vec<HardwareCall>,
    last_sink: Option<CallbackSink>,
    device_sinks: HashMap<DeviceHandle, CallbackSink>,
    session_sinks: HashMap<SessionHandle, CallbackSink>,
}

/// Test-side handle to a [`SimulatedHardware`]
#[derive(Clone)]
pub struct SimulatedControl {
    state: Arc<Mutex<SimState>>,
    frames_pushed: Arc<AtomicU64>,
}

impl SimulatedControl {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop answering requests; callbacks must come from [`Self::deliver`]
    pub fn set_manual(&self, manual: bool) {
        self.lock().manual = manual;
    }

    /// Refuse the next opens with `AccessDenied`
    pub fn deny_access(&self, deny: bool) {
        self.lock().deny_access = deny;
    }

    /// Answer session requests with "configuration failed"
    pub fn fail_configure(&self, reason: Option<&str>) {
        self.lock().fail_configure = reason.map(str::to_string);
    }

    pub fn set_frames_enabled(&self, enabled: bool) {
        self.lock().frames_enabled = enabled;
    }

    /// Deliver an event tagged with the most recent open attempt
    pub fn deliver(&self, event: HardwareEvent) -> bool {
        let sink = self.lock().last_sink.clone();
        sink.is_some_and(|sink| sink.deliver(event))
    }

    /// Deliver an event tagged with an arbitrary attempt
    pub fn deliver_for(&self, attempt: u64, event: HardwareEvent) -> bool {
        let sink = self.lock().last_sink.clone();
        sink.is_some_and(|sink| sink.rebind(attempt).deliver(event))
    }

    /// Simulate the device being unplugged
    pub fn disconnect(&self) -> bool {
        self.deliver(HardwareEvent::DeviceDisconnected)
    }

    /// Attempt tag of the latest open, if any
    pub fn last_attempt(&self) -> Option<u64> {
        self.lock().last_sink.as_ref().map(CallbackSink::attempt)
    }

    pub fn calls(&self) -> Vec<HardwareCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&HardwareCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }

    /// Devices opened and not yet closed
    pub fn open_devices(&self) -> usize {
        let state = self.lock();
        let opened = state
            .calls
            .iter()
            .filter(|call| matches!(call, HardwareCall::OpenDevice(_)))
            .count();
        let closed = state
            .calls
            .iter()
            .filter(|call| matches!(call, HardwareCall::CloseDevice(_)))
            .count();
        opened.saturating_sub(closed)
    }

    /// Sessions created and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.lock().session_sinks.len()
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed.load(Ordering::SeqCst)
    }
}

/// Scripted camera driver
pub struct SimulatedHardware {
    state: Arc<Mutex<SimState>>,
    frames_pushed: Arc<AtomicU64>,
    next_handle: u64,
    frame_loops: HashMap<SessionHandle, FrameLoop>,
}

impl SimulatedHardware {
    /// Hardware in automatic mode, plus its control handle
    pub fn new() -> (Self, SimulatedControl) {
        let state = Arc::new(Mutex::new(SimState {
            frames_enabled: true,
            ..SimState::default()
        }));
        let frames_pushed = Arc::new(AtomicU64::new(0));

        let control = SimulatedControl {
            state: Arc::clone(&state),
            frames_pushed: Arc::clone(&frames_pushed),
        };
        let hardware = Self {
            state,
            frames_pushed,
            next_handle: 0,
            frame_loops: HashMap::new(),
        };
        (hardware, control)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn spawn_frames(&self, surface: SurfaceHandle, fps: u32) -> std::io::Result<FrameLoop> {
        let format = surface.format();
        let pixels: Arc<[u8]> =
            vec![0x80; format.pixel_format.frame_size(format.width, format.height)].into();
        let interval = Duration::from_secs(1) / fps.max(1);
        let pushed = Arc::clone(&self.frames_pushed);
        let mut sequence = 0u64;

        FrameLoop::spawn("simulated-frames", move || {
            let frame = VideoFrame {
                data: Arc::clone(&pixels),
                width: format.width,
                height: format.height,
                format: format.pixel_format,
                sequence,
                captured_at: Instant::now(),
            };
            sequence += 1;
            if surface.push_frame(frame) {
                pushed.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(interval);
            LoopAction::Continue
        })
    }
}

impl CameraHardware for SimulatedHardware {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn open_device(
        &mut self,
        selector: &CameraSelector,
        sink: CallbackSink,
    ) -> Result<(), CameraError> {
        let handle = DeviceHandle::new(self.next_id());
        let mut state = self.lock();
        state.last_sink = Some(sink.clone());

        if state.deny_access {
            debug!(camera = %selector, "Simulated access denial");
            return Err(CameraError::AccessDenied);
        }

        state.calls.push(HardwareCall::OpenDevice(selector.to_string()));
        state.device_sinks.insert(handle, sink.clone());
        if !state.manual {
            sink.deliver(HardwareEvent::DeviceOpened(handle));
        }
        Ok(())
    }

    fn create_session(
        &mut self,
        device: DeviceHandle,
        surface: SurfaceHandle,
        sink: CallbackSink,
    ) -> Result<(), CameraError> {
        let handle = SessionHandle::new(self.next_id());
        let mut state = self.lock();
        state.calls.push(HardwareCall::CreateSession(device));
        state.session_sinks.insert(handle, sink.clone());

        if state.manual {
            return Ok(());
        }

        if let Some(reason) = state.fail_configure.clone() {
            sink.deliver(HardwareEvent::SessionConfigureFailed(reason));
        } else {
            debug!(surface = %surface.format(), "Simulated session configured");
            sink.deliver(HardwareEvent::SessionConfigured(handle));
            sink.deliver(HardwareEvent::SessionReady);
        }
        Ok(())
    }

    fn set_repeating_request(
        &mut self,
        session: SessionHandle,
        request: CaptureRequest,
    ) -> Result<(), CameraError> {
        let frames_enabled = {
            let mut state = self.lock();
            state.calls.push(HardwareCall::SetRepeating {
                session,
                template: request.template,
                fps_range: request.fps_range,
            });
            state.frames_enabled
        };

        if frames_enabled {
            let frame_loop = self
                .spawn_frames(request.target, request.fps_range.max)
                .map_err(|e| CameraError::ConfigureFailed(e.to_string()))?;
            self.frame_loops.insert(session, frame_loop);
            info!(fps = %request.fps_range, "Simulated frames flowing");
        }
        Ok(())
    }

    fn stop_repeating(&mut self, session: SessionHandle) {
        self.lock().calls.push(HardwareCall::StopRepeating(session));
        if let Some(mut frame_loop) = self.frame_loops.remove(&session) {
            frame_loop.stop();
        }
    }

    fn close_session(&mut self, session: SessionHandle) {
        let mut state = self.lock();
        state.calls.push(HardwareCall::CloseSession(session));
        if let Some(sink) = state.session_sinks.remove(&session)
            && !state.manual
        {
            sink.deliver(HardwareEvent::SessionClosed);
        }
    }

    fn close_device(&mut self, device: DeviceHandle) {
        let mut state = self.lock();
        state.calls.push(HardwareCall::CloseDevice(device));
        if let Some(sink) = state.device_sinks.remove(&device)
            && !state.manual
        {
            sink.deliver(HardwareEvent::DeviceClosed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct CountingSurface;

    impl FrameSink for CountingSurface {
        fn format(&self) -> SurfaceFormat {
            SurfaceFormat {
                width: 4,
                height: 2,
                pixel_format: PixelFormat::Yuyv,
                framerate: 30,
            }
        }

        fn push_frame(&self, frame: VideoFrame) -> bool {
            frame.data.len() == 16
        }
    }

    #[test]
    fn test_automatic_callbacks() {
        let (mut hw, control) = SimulatedHardware::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = CallbackSink::new(1, tx);

        hw.open_device(&CameraSelector::default(), sink.clone())
            .unwrap();
        let opened = rx.try_recv().unwrap();
        let HardwareEvent::DeviceOpened(device) = opened.event else {
            panic!("expected DeviceOpened, got {:?}", opened.event);
        };

        hw.create_session(device, Arc::new(CountingSurface), sink)
            .unwrap();
        assert!(matches!(
            rx.try_recv().unwrap().event,
            HardwareEvent::SessionConfigured(_)
        ));
        assert_eq!(rx.try_recv().unwrap().event, HardwareEvent::SessionReady);
        assert_eq!(control.open_devices(), 1);
    }

    #[test]
    fn test_denied_open_is_not_logged() {
        let (mut hw, control) = SimulatedHardware::new();
        control.deny_access(true);
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = hw.open_device(&CameraSelector::default(), CallbackSink::new(1, tx));
        assert_eq!(result, Err(CameraError::AccessDenied));
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_frames_flow_until_stopped() {
        let (mut hw, control) = SimulatedHardware::new();
        let session = SessionHandle::new(9);
        hw.set_repeating_request(
            session,
            CaptureRequest {
                template: CaptureTemplate::Record,
                fps_range: FpsRange::fixed(200),
                target: Arc::new(CountingSurface),
            },
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        hw.stop_repeating(session);
        let pushed = control.frames_pushed();
        assert!(pushed > 0);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(control.frames_pushed(), pushed);
    }
}
