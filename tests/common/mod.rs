// SPDX-License-Identifier: GPL-3.0-only

//! Shared fixtures: a scripted encoder and a controller on simulated hardware

#![allow(dead_code)]

use quietcam::backends::camera::{
    CameraBackendType, FrameSink, SimulatedControl, SimulatedHardware, SurfaceFormat,
    SurfaceHandle, VideoFrame,
};
use quietcam::config::Config;
use quietcam::errors::EncoderError;
use quietcam::recording::{CaptureController, MediaEncoder, RecordingTarget, ServiceStatus};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Calls made on every encoder the factory created, in order
#[derive(Default)]
pub struct EncoderLog {
    calls: Mutex<Vec<&'static str>>,
    pub frames: AtomicU64,
}

impl EncoderLog {
    fn push(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeSurface {
    format: SurfaceFormat,
    accepting: AtomicBool,
    log: Arc<EncoderLog>,
}

impl FrameSink for FakeSurface {
    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn push_frame(&self, _frame: VideoFrame) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }
        self.log.frames.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Encoder that writes a placeholder file on stop
pub struct FakeEncoder {
    log: Arc<EncoderLog>,
    surface: Option<Arc<FakeSurface>>,
    output: Option<PathBuf>,
    fail_start: bool,
}

impl MediaEncoder for FakeEncoder {
    fn prepare(&mut self, target: &RecordingTarget) -> Result<SurfaceHandle, EncoderError> {
        self.log.push("prepare");
        let surface = Arc::new(FakeSurface {
            format: target.profile().surface_format(),
            accepting: AtomicBool::new(false),
            log: Arc::clone(&self.log),
        });
        self.surface = Some(Arc::clone(&surface));
        self.output = Some(target.path().to_path_buf());
        Ok(surface)
    }

    fn start(&mut self) -> Result<(), EncoderError> {
        self.log.push("start");
        if self.fail_start {
            return Err(EncoderError::Pipeline("scripted start failure".into()));
        }
        if let Some(surface) = &self.surface {
            surface.accepting.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EncoderError> {
        self.log.push("stop");
        if let Some(surface) = &self.surface {
            surface.accepting.store(false, Ordering::SeqCst);
        }
        if let Some(path) = &self.output {
            std::fs::write(path, b"ftypisom fake recording")?;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.log.push("release");
        self.surface = None;
    }
}

/// A controller wired to simulated hardware and fake encoders
pub struct Harness {
    pub controller: CaptureController,
    pub camera: SimulatedControl,
    pub encoders: Arc<EncoderLog>,
    pub storage: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|_, _| {})
    }

    /// Adjust the config or the simulated camera before the worker starts
    pub fn with(setup: impl FnOnce(&mut Config, &SimulatedControl)) -> Self {
        Self::build(setup, false)
    }

    pub fn with_failing_encoder_start() -> Self {
        Self::build(|_, _| {}, true)
    }

    fn build(setup: impl FnOnce(&mut Config, &SimulatedControl), fail_start: bool) -> Self {
        let storage = tempfile::tempdir().unwrap();
        let mut config = Config {
            storage_root: Some(storage.path().to_path_buf()),
            backend: CameraBackendType::Simulated,
            ..Config::default()
        };

        let (hardware, camera) = SimulatedHardware::new();
        setup(&mut config, &camera);

        let encoders = Arc::new(EncoderLog::default());
        let log = Arc::clone(&encoders);
        let factory = move || -> Box<dyn MediaEncoder> {
            Box::new(FakeEncoder {
                log: Arc::clone(&log),
                surface: None,
                output: None,
                fail_start,
            })
        };

        let controller =
            CaptureController::spawn(config, Box::new(hardware), Box::new(factory)).unwrap();

        Self {
            controller,
            camera,
            encoders,
            storage,
        }
    }

    pub fn files(&self) -> Vec<PathBuf> {
        files_in(self.storage.path())
    }

    /// Wait (bounded) until the published status matches
    pub async fn wait_until(&self, predicate: impl FnMut(&ServiceStatus) -> bool) -> ServiceStatus {
        tokio::time::timeout(
            Duration::from_secs(5),
            self.controller.wait_for_status(predicate),
        )
        .await
        .expect("status never matched")
        .unwrap()
    }
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

/// Give the worker a moment to drain callbacks that need no reply
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
