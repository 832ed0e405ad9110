// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture service
//!
//! Each layer has its own error enum:
//!
//! - [`CameraError`]: device acquisition and capture session failures
//! - [`EncoderError`]: encoder preparation, recording and finalization failures
//! - [`ControllerError`]: what the external command interface sees
//! - [`ConfigError`]: reading and writing the config file

use std::time::Duration;
use thiserror::Error;

/// Camera-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// Permission or hardware access refused when the open was requested
    #[error("Camera access denied")]
    AccessDenied,
    /// The device could not be opened
    #[error("Failed to open camera: {0}")]
    OpenFailed(String),
    /// The capture session could not be configured
    #[error("Failed to configure capture session: {0}")]
    ConfigureFailed(String),
    /// Camera disconnected during operation
    #[error("Camera disconnected")]
    Disconnected,
    /// A capture attempt is already in progress on this session
    #[error("Camera is busy")]
    Busy,
}

/// Encoder-specific errors
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The capture profile is not supported by the encoder stack
    #[error("Encoder rejected configuration: {0}")]
    ConfigurationRejected(String),
    /// The output file could not be created or written
    #[error("Output file error: {0}")]
    IOFailure(#[from] std::io::Error),
    /// The encoder was already prepared or is already recording
    #[error("Encoder is already active")]
    AlreadyActive,
    /// The operation needs a prepared encoder
    #[error("Encoder has not been prepared")]
    NotPrepared,
    /// The running pipeline reported an error
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Why a start request did not reach the recording state
#[derive(Debug, Error)]
pub enum StartFailure {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    /// A stop request arrived before the camera became ready
    #[error("start cancelled by a stop request")]
    Cancelled,
    /// The camera did not become ready within the configured bound
    #[error("camera did not become ready within {0:?}")]
    TimedOut(Duration),
}

/// Errors returned to the external command interface
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A recording is active or being started
    #[error("Recording already in progress")]
    AlreadyRunning,
    /// The start chain failed and was rolled back
    #[error("Failed to start recording: {0}")]
    StartFailed(#[source] StartFailure),
    /// The query needs an active recording
    #[error("No recording in progress")]
    NotRunning,
    /// Capture stopped but the output could not be finalized
    #[error("Failed to finalize recording: {0}")]
    StopFailed(#[source] EncoderError),
    /// The camera worker thread is gone
    #[error("Capture worker is not available")]
    WorkerUnavailable,
}

impl ControllerError {
    /// Camera error behind a failed start, if that is what failed
    pub fn camera_error(&self) -> Option<&CameraError> {
        match self {
            ControllerError::StartFailed(StartFailure::Camera(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<StartFailure> for ControllerError {
    fn from(err: StartFailure) -> Self {
        ControllerError::StartFailed(err)
    }
}

/// Result type alias for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
