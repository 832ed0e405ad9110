// SPDX-License-Identifier: GPL-3.0-only

//! Capture service controller
//!
//! The controller owns a single `camera-worker` thread running a
//! current-thread tokio runtime. That thread owns the camera hardware, the
//! session state machine and the encoder resource; commands and hardware
//! callbacks reach it as messages and are handled one at a time.
//!
//! ```text
//! start() ──Command──▶ ┌───────────────┐ ◀──HardwareCallback── camera driver
//! stop()  ──Command──▶ │ camera-worker │
//!                      └───────┬───────┘
//!                              └──watch──▶ status() / is_running()
//! ```

use super::encoder::{EncoderFactory, EncoderResource, EncoderState};
use super::session::{CameraSession, CaptureSessionState, SessionOutcome};
use super::target::{CaptureProfile, RecordingTarget};
use crate::backends::camera::{CameraHardware, HardwareCallback};
use crate::config::Config;
use crate::errors::{
    CameraError, ControllerError, ControllerResult, EncoderError, StartFailure,
};
use crate::storage::ensure_storage_root;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What a stop request found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReport {
    /// Nothing was recording
    Idle,
    /// A recording was finalized at this path
    Finished(PathBuf),
}

/// Snapshot of the service published after every worker step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub session: CaptureSessionState,
    /// Session states since the latest open
    pub session_trail: Vec<CaptureSessionState>,
    /// State of the current encoder, if one exists
    pub encoder: Option<EncoderState>,
    /// States of the current or most recently released encoder
    pub encoder_trail: Vec<EncoderState>,
    /// Recording end-to-end: frames flowing and the encoder consuming them
    pub running: bool,
    pub output: Option<PathBuf>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            session: CaptureSessionState::Idle,
            session_trail: vec![CaptureSessionState::Idle],
            encoder: None,
            encoder_trail: Vec::new(),
            running: false,
            output: None,
        }
    }
}

enum Command {
    Start(oneshot::Sender<ControllerResult<PathBuf>>),
    Stop(oneshot::Sender<ControllerResult<StopReport>>),
    Shutdown,
}

/// Handle to the capture service
///
/// Dropping the controller stops any recording and joins the worker.
pub struct CaptureController {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ServiceStatus>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureController {
    /// Start the camera worker
    pub fn spawn(
        config: Config,
        hardware: Box<dyn CameraHardware>,
        encoders: Box<dyn EncoderFactory>,
    ) -> std::io::Result<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ServiceStatus::default());

        let worker = std::thread::Builder::new()
            .name("camera-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Failed to create camera worker runtime");
                        return;
                    }
                };

                let (callback_tx, callback_rx) = mpsc::unbounded_channel();
                let worker = Worker {
                    session: CameraSession::new(config.fps_range, callback_tx),
                    ready_timeout: config.ready_timeout(),
                    config,
                    hardware,
                    encoders,
                    encoder: None,
                    last_encoder_trail: Vec::new(),
                    pending: None,
                    status: status_tx,
                };
                runtime.block_on(worker.run(command_rx, callback_rx));
            })?;

        Ok(Self {
            commands: command_tx,
            status: status_rx,
            worker: Some(worker),
        })
    }

    /// Begin a recording; resolves once frames reach the encoder
    pub async fn start(&self) -> ControllerResult<PathBuf> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start(reply))
            .map_err(|_| ControllerError::WorkerUnavailable)?;
        response
            .await
            .map_err(|_| ControllerError::WorkerUnavailable)?
    }

    /// End the recording, if any; always safe to call
    pub async fn stop(&self) -> ControllerResult<StopReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop(reply))
            .map_err(|_| ControllerError::WorkerUnavailable)?;
        response
            .await
            .map_err(|_| ControllerError::WorkerUnavailable)?
    }

    pub fn is_running(&self) -> bool {
        self.status.borrow().running
    }

    pub fn status(&self) -> ServiceStatus {
        self.status.borrow().clone()
    }

    /// Output path of the active recording
    pub fn current_recording(&self) -> ControllerResult<PathBuf> {
        let status = self.status.borrow();
        match (&status.output, status.running) {
            (Some(path), true) => Ok(path.clone()),
            _ => Err(ControllerError::NotRunning),
        }
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&ServiceStatus) -> bool,
    ) -> ControllerResult<ServiceStatus> {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(predicate)
            .await
            .map_err(|_| ControllerError::WorkerUnavailable)?;
        Ok(matched.clone())
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("Camera worker panicked");
        }
    }
}

/// A start waiting for the camera to become ready
struct PendingStart {
    reply: oneshot::Sender<ControllerResult<PathBuf>>,
    deadline: Option<Instant>,
}

/// State owned by the camera worker thread
struct Worker {
    config: Config,
    hardware: Box<dyn CameraHardware>,
    encoders: Box<dyn EncoderFactory>,
    session: CameraSession,
    encoder: Option<EncoderResource>,
    last_encoder_trail: Vec<EncoderState>,
    pending: Option<PendingStart>,
    ready_timeout: Option<Duration>,
    status: watch::Sender<ServiceStatus>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut callbacks: mpsc::UnboundedReceiver<HardwareCallback>,
    ) {
        debug!(backend = self.hardware.name(), "Camera worker started");
        self.publish();

        loop {
            let deadline = self.pending.as_ref().and_then(|pending| pending.deadline);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start(reply)) => self.start(reply),
                    Some(Command::Stop(reply)) => {
                        let stopped = self.stop();
                        self.reply(reply, stopped);
                    }
                    Some(Command::Shutdown) | None => {
                        if let Err(e) = self.stop() {
                            warn!(error = %e, "Recording not finalized at shutdown");
                        }
                        self.publish();
                        break;
                    }
                },
                Some(callback) = callbacks.recv() => self.on_callback(callback),
                () = ready_deadline(deadline) => self.on_timeout(),
            }

            self.publish();
        }

        debug!("Camera worker stopped");
    }

    fn start(&mut self, reply: oneshot::Sender<ControllerResult<PathBuf>>) {
        if self.encoder.is_some() || self.pending.is_some() {
            debug!("Start ignored, recording already in progress");
            self.reply(reply, Err(ControllerError::AlreadyRunning));
            return;
        }

        match self.begin_start() {
            Ok(()) => {
                self.pending = Some(PendingStart {
                    reply,
                    deadline: self.ready_timeout.map(|timeout| Instant::now() + timeout),
                });
            }
            Err(failure) => {
                warn!(error = %failure, "Start failed");
                self.rollback();
                self.reply(reply, Err(failure.into()));
            }
        }
    }

    /// Output file, encoder, then camera; the camera only sees a prepared
    /// surface
    fn begin_start(&mut self) -> Result<(), StartFailure> {
        if !self.config.fps_range.is_valid() {
            return Err(CameraError::ConfigureFailed(format!(
                "invalid frame rate range {}",
                self.config.fps_range
            ))
            .into());
        }

        let root = self.config.storage_root();
        ensure_storage_root(&root)?;
        let profile = CaptureProfile::from_config(&self.config)?;
        let target = RecordingTarget::new(&root, profile);

        let mut encoder = EncoderResource::new(self.encoders.create());
        let surface = encoder.prepare(&target)?;
        self.encoder = Some(encoder);

        info!(
            id = %target.id(),
            path = %target.path().display(),
            "Starting recording"
        );
        self.session.open(
            self.hardware.as_mut(),
            &self.config.camera_selector(),
            surface,
        )?;
        Ok(())
    }

    fn on_callback(&mut self, callback: HardwareCallback) {
        match self.session.handle(self.hardware.as_mut(), callback) {
            SessionOutcome::Ignored | SessionOutcome::Progressed => {}
            SessionOutcome::Ready => self.on_ready(),
            SessionOutcome::Failed(err) => self.on_failure(err),
        }
    }

    fn on_ready(&mut self) {
        let Some(pending) = self.pending.take() else {
            warn!("Camera ready without a pending start, closing");
            self.teardown();
            return;
        };

        let started = match self.encoder.as_mut() {
            Some(encoder) => self
                .session
                .begin_recording(encoder)
                .map_err(StartFailure::from),
            None => Err(StartFailure::Encoder(EncoderError::NotPrepared)),
        };

        match started {
            Ok(()) => {
                let path = self
                    .encoder
                    .as_ref()
                    .and_then(EncoderResource::output_path)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                info!(path = %path.display(), "Recording started");
                self.reply(pending.reply, Ok(path));
            }
            Err(failure) => {
                warn!(error = %failure, "Encoder did not start");
                self.rollback();
                self.reply(pending.reply, Err(failure.into()));
            }
        }
    }

    fn on_failure(&mut self, err: CameraError) {
        if let Some(pending) = self.pending.take() {
            self.rollback();
            self.reply(pending.reply, Err(StartFailure::Camera(err).into()));
        } else if self.encoder.is_some() {
            warn!(error = %err, "Recording interrupted by camera failure");
            self.teardown();
        } else {
            debug!(error = %err, "Camera failure with nothing recording");
            self.session.close(self.hardware.as_mut());
        }
    }

    fn on_timeout(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let timeout = self.ready_timeout.unwrap_or_default();
        warn!(?timeout, state = %self.session.state(), "Camera did not become ready");
        self.rollback();
        self.reply(pending.reply, Err(StartFailure::TimedOut(timeout).into()));
    }

    fn stop(&mut self) -> ControllerResult<StopReport> {
        if let Some(pending) = self.pending.take() {
            info!("Pending start cancelled by stop");
            let _ = pending.reply.send(Err(StartFailure::Cancelled.into()));
        }

        self.session.close(self.hardware.as_mut());
        match self.release_encoder() {
            Ok(Some(path)) => {
                info!(path = %path.display(), "Recording saved");
                Ok(StopReport::Finished(path))
            }
            Ok(None) => Ok(StopReport::Idle),
            Err(e) => Err(ControllerError::StopFailed(e)),
        }
    }

    /// Undo a start that did not reach recording
    fn rollback(&mut self) {
        self.session.close(self.hardware.as_mut());
        if let Err(e) = self.release_encoder() {
            warn!(error = %e, "Encoder release failed during rollback");
        }
    }

    /// Stop after a mid-recording failure, keeping what was recorded
    fn teardown(&mut self) {
        self.session.close(self.hardware.as_mut());
        match self.release_encoder() {
            Ok(Some(path)) => info!(path = %path.display(), "Partial recording saved"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Recording could not be finalized"),
        }
    }

    fn release_encoder(&mut self) -> Result<Option<PathBuf>, EncoderError> {
        let Some(mut encoder) = self.encoder.take() else {
            return Ok(None);
        };
        let result = encoder.stop_and_release();
        self.last_encoder_trail = encoder.trail().to_vec();
        result
    }

    /// Answer a command once the status reflects its outcome
    fn reply<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn publish(&self) {
        let encoder = self.encoder.as_ref();
        let encoder_state = encoder.map(EncoderResource::state);
        let status = ServiceStatus {
            session: self.session.state().clone(),
            session_trail: self.session.trail().to_vec(),
            encoder: encoder_state,
            encoder_trail: encoder
                .map(|encoder| encoder.trail().to_vec())
                .unwrap_or_else(|| self.last_encoder_trail.clone()),
            running: *self.session.state() == CaptureSessionState::Recording
                && encoder_state == Some(EncoderState::Recording),
            output: encoder
                .and_then(EncoderResource::output_path)
                .map(Path::to_path_buf),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn ready_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
