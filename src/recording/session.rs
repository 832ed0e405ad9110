// SPDX-License-Identifier: GPL-3.0-only

//! Camera session state machine
//!
//! Drives one camera through open → configure → repeating capture and
//! owns the device and session handles it acquires on the way.
//!
//! ```text
//! Idle ──open──▶ Opening ──DeviceOpened──▶ Opened ──▶ ConfiguringSession
//!                                                          │
//!           SessionReady ◀──SessionReady── SessionActive ◀─┘ SessionConfigured
//!                │
//!                └─begin_recording──▶ Recording
//!
//! any active state ──close──▶ Closing ──▶ Closed
//! any active state ──disconnect/error──▶ Failed
//! ```
//!
//! Transitions are decided by the pure [`transition`] function; the side
//! effects it asks for are carried out by [`CameraSession::handle`].

use super::encoder::EncoderResource;
use crate::backends::camera::{
    CallbackSink, CameraHardware, CameraSelector, CaptureRequest, CaptureTemplate, DeviceHandle,
    FpsRange, HardwareCallback, HardwareEvent, SessionHandle, SurfaceHandle,
};
use crate::errors::{CameraError, EncoderError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Where the camera session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSessionState {
    Idle,
    Opening,
    Opened,
    ConfiguringSession,
    SessionActive,
    SessionReady,
    Recording,
    Closing,
    Closed,
    Failed(CameraError),
}

impl CaptureSessionState {
    /// States holding (or waiting for) hardware resources
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            CaptureSessionState::Idle | CaptureSessionState::Closed | CaptureSessionState::Failed(_)
        )
    }
}

impl std::fmt::Display for CaptureSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSessionState::Failed(err) => write!(f, "Failed({})", err),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    None,
    /// Keep the device handle and request a capture session on it
    ConfigureSession(DeviceHandle),
    /// Keep the session handle
    AdoptSession(SessionHandle),
    /// Submit the repeating record request
    SubmitRepeating,
}

/// Result of applying one hardware event to a state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The event does not apply in this state
    Ignore,
    Advance(CaptureSessionState, SessionEffect),
}

/// Decide what a hardware event does in a given state
pub fn transition(state: &CaptureSessionState, event: &HardwareEvent) -> Transition {
    use CaptureSessionState as S;
    use HardwareEvent as E;

    match (state, event) {
        (S::Opening, E::DeviceOpened(device)) => {
            Transition::Advance(S::Opened, SessionEffect::ConfigureSession(*device))
        }
        (S::ConfiguringSession, E::SessionConfigured(session)) => {
            Transition::Advance(S::SessionActive, SessionEffect::AdoptSession(*session))
        }
        (S::ConfiguringSession, E::SessionConfigureFailed(reason)) => Transition::Advance(
            S::Failed(CameraError::ConfigureFailed(reason.clone())),
            SessionEffect::None,
        ),
        (S::SessionActive, E::SessionReady) => {
            Transition::Advance(S::SessionReady, SessionEffect::SubmitRepeating)
        }
        (
            S::Opening
            | S::Opened
            | S::ConfiguringSession
            | S::SessionActive
            | S::SessionReady
            | S::Recording,
            E::DeviceDisconnected,
        ) => Transition::Advance(S::Failed(CameraError::Disconnected), SessionEffect::None),
        (
            S::Opening
            | S::Opened
            | S::ConfiguringSession
            | S::SessionActive
            | S::SessionReady
            | S::Recording,
            E::DeviceError(reason),
        ) => Transition::Advance(
            S::Failed(CameraError::OpenFailed(reason.clone())),
            SessionEffect::None,
        ),
        _ => Transition::Ignore,
    }
}

/// What handling a callback meant for the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stale, out of order or otherwise irrelevant
    Ignored,
    /// Moved forward, nothing for the controller to do yet
    Progressed,
    /// Frames are flowing into the encoder surface
    Ready,
    Failed(CameraError),
}

/// The camera session and the handles it owns
pub struct CameraSession {
    state: CaptureSessionState,
    fps_range: FpsRange,
    callbacks: UnboundedSender<HardwareCallback>,
    attempt: u64,
    sink: Option<CallbackSink>,
    surface: Option<SurfaceHandle>,
    device: Option<DeviceHandle>,
    session: Option<SessionHandle>,
    repeating: bool,
    trail: Vec<CaptureSessionState>,
}

impl CameraSession {
    /// A new idle session whose hardware callbacks go to `callbacks`
    pub fn new(fps_range: FpsRange, callbacks: UnboundedSender<HardwareCallback>) -> Self {
        Self {
            state: CaptureSessionState::Idle,
            fps_range,
            callbacks,
            attempt: 0,
            sink: None,
            surface: None,
            device: None,
            session: None,
            repeating: false,
            trail: vec![CaptureSessionState::Idle],
        }
    }

    pub fn state(&self) -> &CaptureSessionState {
        &self.state
    }

    /// Tag of the current (or last) open attempt; 0 before the first open
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// States visited since the last `open`, oldest first
    pub fn trail(&self) -> &[CaptureSessionState] {
        &self.trail
    }

    fn set_state(&mut self, state: CaptureSessionState) {
        debug!(attempt = self.attempt, from = %self.state, to = %state, "Session state");
        self.trail.push(state.clone());
        self.state = state;
    }

    fn fail(&mut self, err: CameraError) -> SessionOutcome {
        warn!(attempt = self.attempt, error = %err, "Camera session failed");
        self.set_state(CaptureSessionState::Failed(err.clone()));
        SessionOutcome::Failed(err)
    }

    /// Start acquiring the camera, rendering into `surface`
    ///
    /// Accepted from `Idle` and `Closed`. A refused permission leaves the
    /// session where it was; any other open failure moves it to `Failed`.
    pub fn open(
        &mut self,
        hw: &mut dyn CameraHardware,
        selector: &CameraSelector,
        surface: SurfaceHandle,
    ) -> Result<(), CameraError> {
        if !matches!(
            self.state,
            CaptureSessionState::Idle | CaptureSessionState::Closed
        ) {
            return Err(CameraError::Busy);
        }

        self.attempt += 1;
        let sink = CallbackSink::new(self.attempt, self.callbacks.clone());

        match hw.open_device(selector, sink.clone()) {
            Ok(()) => {
                self.trail = vec![self.state.clone()];
                self.sink = Some(sink);
                self.surface = Some(surface);
                self.set_state(CaptureSessionState::Opening);
                info!(camera = %selector, backend = hw.name(), attempt = self.attempt, "Opening camera");
                Ok(())
            }
            Err(CameraError::AccessDenied) => {
                warn!(camera = %selector, "Camera access denied");
                Err(CameraError::AccessDenied)
            }
            Err(err) => {
                self.trail = vec![self.state.clone()];
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Apply one hardware callback
    pub fn handle(
        &mut self,
        hw: &mut dyn CameraHardware,
        callback: HardwareCallback,
    ) -> SessionOutcome {
        let HardwareCallback { attempt, event } = callback;

        if attempt == 0 || attempt > self.attempt {
            debug!(attempt, event = ?event, "Callback for an attempt never made, ignored");
            return SessionOutcome::Ignored;
        }

        let torn_down = attempt < self.attempt
            || matches!(
                self.state,
                CaptureSessionState::Closing
                    | CaptureSessionState::Closed
                    | CaptureSessionState::Failed(_)
            );
        if torn_down {
            match event {
                HardwareEvent::DeviceOpened(device) if self.device != Some(device) => {
                    info!(attempt, device = device.id(), "Releasing device opened after teardown");
                    hw.close_device(device);
                }
                HardwareEvent::SessionConfigured(session) if self.session != Some(session) => {
                    info!(
                        attempt,
                        session = session.id(),
                        "Releasing session configured after teardown"
                    );
                    hw.close_session(session);
                }
                event => {
                    debug!(attempt, event = ?event, state = %self.state, "Late callback ignored");
                }
            }
            return SessionOutcome::Ignored;
        }

        let (next, effect) = match transition(&self.state, &event) {
            Transition::Ignore => {
                debug!(event = ?event, state = %self.state, "Out-of-order callback ignored");
                return SessionOutcome::Ignored;
            }
            Transition::Advance(next, effect) => (next, effect),
        };

        if let CaptureSessionState::Failed(err) = next {
            return self.fail(err);
        }
        self.set_state(next);

        match effect {
            SessionEffect::None => SessionOutcome::Progressed,
            SessionEffect::ConfigureSession(device) => {
                self.device = Some(device);
                info!(device = device.id(), "Camera opened");
                self.configure(hw, device)
            }
            SessionEffect::AdoptSession(session) => {
                self.session = Some(session);
                debug!(session = session.id(), "Capture session configured");
                SessionOutcome::Progressed
            }
            SessionEffect::SubmitRepeating => self.submit_repeating(hw),
        }
    }

    fn configure(&mut self, hw: &mut dyn CameraHardware, device: DeviceHandle) -> SessionOutcome {
        let (Some(surface), Some(sink)) = (self.surface.clone(), self.sink.clone()) else {
            return self.fail(CameraError::ConfigureFailed(
                "no encoder surface to target".to_string(),
            ));
        };

        self.set_state(CaptureSessionState::ConfiguringSession);
        match hw.create_session(device, surface, sink) {
            Ok(()) => SessionOutcome::Progressed,
            Err(err) => self.fail(err),
        }
    }

    fn submit_repeating(&mut self, hw: &mut dyn CameraHardware) -> SessionOutcome {
        let (Some(session), Some(target)) = (self.session, self.surface.clone()) else {
            return self.fail(CameraError::ConfigureFailed(
                "session ready without a configured session".to_string(),
            ));
        };

        let request = CaptureRequest {
            template: CaptureTemplate::Record,
            fps_range: self.fps_range,
            target,
        };
        debug!(request = ?request, "Submitting repeating request");

        match hw.set_repeating_request(session, request) {
            Ok(()) => {
                self.repeating = true;
                info!(fps = %self.fps_range, "Capture session ready, frames flowing");
                SessionOutcome::Ready
            }
            Err(err) => self.fail(err),
        }
    }

    /// SessionReady → Recording: start the encoder now that frames flow
    pub fn begin_recording(&mut self, encoder: &mut EncoderResource) -> Result<(), EncoderError> {
        if self.state != CaptureSessionState::SessionReady {
            return Err(EncoderError::NotPrepared);
        }
        encoder.start_recording()?;
        self.set_state(CaptureSessionState::Recording);
        Ok(())
    }

    /// Tear down capture: cancel the repeating request, close the session,
    /// close the device
    ///
    /// Safe in every state; each handle is released at most once. Returns
    /// `false` when there was nothing to close.
    pub fn close(&mut self, hw: &mut dyn CameraHardware) -> bool {
        let holds_resources = self.device.is_some() || self.session.is_some();
        if !self.state.is_active() && !holds_resources {
            if matches!(self.state, CaptureSessionState::Failed(_)) {
                self.set_state(CaptureSessionState::Closed);
            }
            return false;
        }

        if self.state != CaptureSessionState::Closing {
            self.set_state(CaptureSessionState::Closing);
        }

        if let Some(session) = self.session.take() {
            if std::mem::take(&mut self.repeating) {
                hw.stop_repeating(session);
            }
            hw.close_session(session);
        }
        if let Some(device) = self.device.take() {
            hw.close_device(device);
        }
        self.surface = None;
        self.sink = None;

        self.set_state(CaptureSessionState::Closed);
        info!(attempt = self.attempt, "Camera closed");
        true
    }
}
