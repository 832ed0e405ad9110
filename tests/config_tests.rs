// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use quietcam::Config;
use quietcam::backends::camera::{CameraBackendType, FpsRange};
use quietcam::errors::ConfigError;
use quietcam::media::encoders::ContainerFormat;
use std::path::PathBuf;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.camera, "1", "Front camera should be the default");
    assert_eq!(config.fps_range, FpsRange::fixed(30));
    assert_eq!(config.container, ContainerFormat::MP4);
    assert_eq!(config.backend, CameraBackendType::V4l2);
    assert!(config.ready_timeout_ms.is_none());
}

#[test]
fn test_camera_selector_paths() {
    let mut config = Config::default();
    assert_eq!(
        config.camera_selector().device_path(),
        PathBuf::from("/dev/video1")
    );

    config.camera = "/dev/v4l/by-id/usb-cam".to_string();
    assert_eq!(
        config.camera_selector().device_path(),
        PathBuf::from("/dev/v4l/by-id/usb-cam")
    );
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("config.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = Config {
        storage_root: Some(dir.path().to_path_buf()),
        camera: "0".to_string(),
        backend: CameraBackendType::Simulated,
        container: ContainerFormat::WebM,
        ready_timeout_ms: Some(3000),
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
}

#[test]
fn test_invalid_file_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        Config::load_from(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_storage_root_override() {
    let config = Config {
        storage_root: Some(PathBuf::from("/srv/recordings")),
        ..Config::default()
    };
    assert_eq!(config.storage_root(), PathBuf::from("/srv/recordings"));
    assert!(Config::default().storage_root().ends_with("quietcam"));
}
