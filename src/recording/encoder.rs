// SPDX-License-Identifier: GPL-3.0-only

//! Encoder resource lifecycle
//!
//! [`EncoderResource`] wraps a [`MediaEncoder`] backend together with the
//! output file and walks it through
//! `Unprepared → Prepared → Recording → Stopped → Released`.
//! The resource is owned by the camera worker and only moves on explicit
//! calls from it.

use super::target::RecordingTarget;
use crate::backends::camera::SurfaceHandle;
use crate::errors::EncoderError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An audio+video encoder writing one container file
///
/// `prepare` builds everything and returns the surface the camera renders
/// into; `start` begins consuming; `stop` finalizes the file; `release`
/// frees whatever is left. `release` may be called in any state.
pub trait MediaEncoder: Send {
    fn prepare(&mut self, target: &RecordingTarget) -> Result<SurfaceHandle, EncoderError>;

    fn start(&mut self) -> Result<(), EncoderError>;

    fn stop(&mut self) -> Result<(), EncoderError>;

    fn release(&mut self);
}

/// Creates a fresh encoder backend for every recording
pub trait EncoderFactory: Send {
    fn create(&self) -> Box<dyn MediaEncoder>;
}

impl<F> EncoderFactory for F
where
    F: Fn() -> Box<dyn MediaEncoder> + Send,
{
    fn create(&self) -> Box<dyn MediaEncoder> {
        self()
    }
}

/// Lifecycle state of an [`EncoderResource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Unprepared,
    Prepared,
    Recording,
    Stopped,
    Released,
}

/// One recording's encoder and output file
pub struct EncoderResource {
    backend: Box<dyn MediaEncoder>,
    state: EncoderState,
    surface: Option<SurfaceHandle>,
    output: Option<PathBuf>,
    trail: Vec<EncoderState>,
}

impl EncoderResource {
    pub fn new(backend: Box<dyn MediaEncoder>) -> Self {
        Self {
            backend,
            state: EncoderState::Unprepared,
            surface: None,
            output: None,
            trail: vec![EncoderState::Unprepared],
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Every state this resource has been in, oldest first
    pub fn trail(&self) -> &[EncoderState] {
        &self.trail
    }

    /// Output file, once prepared
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    fn set_state(&mut self, state: EncoderState) {
        debug!(from = ?self.state, to = ?state, "Encoder state");
        self.state = state;
        self.trail.push(state);
    }

    /// Allocate the output file and ready the encoder
    ///
    /// May only succeed once per resource; any later call returns
    /// [`EncoderError::AlreadyActive`]. On failure nothing is left behind.
    pub fn prepare(&mut self, target: &RecordingTarget) -> Result<SurfaceHandle, EncoderError> {
        if self.state != EncoderState::Unprepared || self.output.is_some() {
            return Err(EncoderError::AlreadyActive);
        }

        target.profile().validate()?;

        let path = target.path().to_path_buf();
        std::fs::File::create(&path)?;
        self.output = Some(path.clone());

        match self.backend.prepare(target) {
            Ok(surface) => {
                self.surface = Some(surface.clone());
                self.set_state(EncoderState::Prepared);
                info!(path = %path.display(), "Encoder prepared");
                Ok(surface)
            }
            Err(e) => {
                self.backend.release();
                remove_output(&path);
                Err(e)
            }
        }
    }

    /// The surface the camera renders into
    ///
    /// # Panics
    ///
    /// Panics if called before [`Self::prepare`] succeeded.
    pub fn surface(&self) -> SurfaceHandle {
        match &self.surface {
            Some(surface) => surface.clone(),
            None => panic!("encoder surface requested in state {:?}", self.state),
        }
    }

    pub fn try_surface(&self) -> Option<SurfaceHandle> {
        self.surface.clone()
    }

    /// Prepared → Recording
    pub fn start_recording(&mut self) -> Result<(), EncoderError> {
        match self.state {
            EncoderState::Prepared => {}
            EncoderState::Recording => return Err(EncoderError::AlreadyActive),
            _ => return Err(EncoderError::NotPrepared),
        }

        self.backend.start()?;
        self.set_state(EncoderState::Recording);
        Ok(())
    }

    /// Finalize the file and release the encoder
    ///
    /// Returns the output path when a recording was finalized. Calling it
    /// again, or on a resource that never recorded, is a no-op apart from
    /// removing the unused output file.
    pub fn stop_and_release(&mut self) -> Result<Option<PathBuf>, EncoderError> {
        match self.state {
            EncoderState::Unprepared | EncoderState::Released => Ok(None),
            EncoderState::Prepared => {
                self.backend.release();
                self.surface = None;
                self.set_state(EncoderState::Released);
                if let Some(path) = &self.output {
                    remove_output(path);
                }
                Ok(None)
            }
            EncoderState::Recording | EncoderState::Stopped => {
                let finalized = if self.state == EncoderState::Recording {
                    let result = self.backend.stop();
                    self.set_state(EncoderState::Stopped);
                    result
                } else {
                    Ok(())
                };

                self.backend.release();
                self.surface = None;
                self.set_state(EncoderState::Released);

                finalized?;
                if let Some(path) = &self.output {
                    info!(path = %path.display(), "Recording finalized");
                }
                Ok(self.output.clone())
            }
        }
    }
}

impl Drop for EncoderResource {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_release() {
            warn!(error = %e, "Encoder teardown failed during drop");
        }
    }
}

fn remove_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed unused output file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove unused output file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{FrameSink, PixelFormat, SurfaceFormat, VideoFrame};
    use crate::config::Config;
    use crate::recording::target::CaptureProfile;
    use std::sync::{Arc, Mutex};

    struct NullSurface;

    impl FrameSink for NullSurface {
        fn format(&self) -> SurfaceFormat {
            SurfaceFormat {
                width: 2,
                height: 2,
                pixel_format: PixelFormat::Yuyv,
                framerate: 30,
            }
        }

        fn push_frame(&self, _frame: VideoFrame) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct Log(Mutex<Vec<&'static str>>);

    struct ScriptedEncoder {
        log: Arc<Log>,
        fail_prepare: bool,
        fail_stop: bool,
    }

    impl MediaEncoder for ScriptedEncoder {
        fn prepare(&mut self, _target: &RecordingTarget) -> Result<SurfaceHandle, EncoderError> {
            self.log.0.lock().unwrap().push("prepare");
            if self.fail_prepare {
                return Err(EncoderError::ConfigurationRejected("no encoder".into()));
            }
            Ok(Arc::new(NullSurface))
        }

        fn start(&mut self) -> Result<(), EncoderError> {
            self.log.0.lock().unwrap().push("start");
            Ok(())
        }

        fn stop(&mut self) -> Result<(), EncoderError> {
            self.log.0.lock().unwrap().push("stop");
            if self.fail_stop {
                return Err(EncoderError::Pipeline("eos lost".into()));
            }
            Ok(())
        }

        fn release(&mut self) {
            self.log.0.lock().unwrap().push("release");
        }
    }

    fn resource(fail_prepare: bool, fail_stop: bool) -> (EncoderResource, Arc<Log>) {
        let log = Arc::new(Log::default());
        let backend = ScriptedEncoder {
            log: Arc::clone(&log),
            fail_prepare,
            fail_stop,
        };
        (EncoderResource::new(Box::new(backend)), log)
    }

    fn target(dir: &Path) -> RecordingTarget {
        RecordingTarget::new(dir, CaptureProfile::from_config(&Config::default()).unwrap())
    }

    #[test]
    fn test_full_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let target = target(dir.path());
        let (mut encoder, log) = resource(false, false);

        encoder.prepare(&target).unwrap();
        assert!(target.path().exists());
        encoder.start_recording().unwrap();

        let finalized = encoder.stop_and_release().unwrap();
        assert_eq!(finalized.as_deref(), Some(target.path()));
        assert_eq!(
            encoder.trail(),
            &[
                EncoderState::Unprepared,
                EncoderState::Prepared,
                EncoderState::Recording,
                EncoderState::Stopped,
                EncoderState::Released,
            ]
        );
        assert_eq!(*log.0.lock().unwrap(), ["prepare", "start", "stop", "release"]);

        // Idempotent
        assert_eq!(encoder.stop_and_release().unwrap(), None);
        assert_eq!(log.0.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_second_prepare_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut encoder, _) = resource(false, false);
        encoder.prepare(&target(dir.path())).unwrap();
        assert!(matches!(
            encoder.prepare(&target(dir.path())),
            Err(EncoderError::AlreadyActive)
        ));
    }

    #[test]
    fn test_failed_prepare_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = target(dir.path());
        let (mut encoder, log) = resource(true, false);

        assert!(encoder.prepare(&target).is_err());
        assert!(!target.path().exists());
        assert!(encoder.try_surface().is_none());
        assert_eq!(*log.0.lock().unwrap(), ["prepare", "release"]);
    }

    #[test]
    fn test_unwritable_root_is_io_failure() {
        let target = target(Path::new("/nonexistent/quietcam"));
        let (mut encoder, log) = resource(false, false);
        assert!(matches!(
            encoder.prepare(&target),
            Err(EncoderError::IOFailure(_))
        ));
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_start_requires_prepare() {
        let (mut encoder, _) = resource(false, false);
        assert!(matches!(
            encoder.start_recording(),
            Err(EncoderError::NotPrepared)
        ));
    }

    #[test]
    #[should_panic(expected = "encoder surface requested")]
    fn test_surface_before_prepare_panics() {
        let (encoder, _) = resource(false, false);
        let _ = encoder.surface();
    }

    #[test]
    fn test_release_without_recording_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = target(dir.path());
        let (mut encoder, _) = resource(false, false);

        encoder.prepare(&target).unwrap();
        assert_eq!(encoder.stop_and_release().unwrap(), None);
        assert!(!target.path().exists());
        assert_eq!(encoder.state(), EncoderState::Released);
    }

    #[test]
    fn test_failed_finalize_still_releases() {
        let dir = tempfile::tempdir().unwrap();
        let (mut encoder, log) = resource(false, true);
        encoder.prepare(&target(dir.path())).unwrap();
        encoder.start_recording().unwrap();

        assert!(matches!(
            encoder.stop_and_release(),
            Err(EncoderError::Pipeline(_))
        ));
        assert_eq!(encoder.state(), EncoderState::Released);
        assert_eq!(log.0.lock().unwrap().last(), Some(&"release"));
    }
}
