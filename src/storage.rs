// SPDX-License-Identifier: MPL-2.0

//! Storage utilities for recordings

use crate::constants::capture::DEFAULT_SAVE_FOLDER;
use crate::errors::EncoderError;
use crate::media::encoders::ContainerFormat;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// A finished recording on disk
#[derive(Debug, Clone)]
pub struct RecordingFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// `<videos>/quietcam`, or `~/quietcam` when there is no video directory
pub fn default_storage_root() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Create the storage root if needed
pub fn ensure_storage_root(root: &Path) -> Result<(), EncoderError> {
    std::fs::create_dir_all(root)?;
    debug!(path = %root.display(), "Storage root ready");
    Ok(())
}

/// Recordings under `root`, newest first
pub fn list_recordings(root: &Path) -> Vec<RecordingFile> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut files: Vec<RecordingFile> = entries
        .flatten()
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    ContainerFormat::ALL
                        .iter()
                        .any(|c| ext.eq_ignore_ascii_case(c.extension()))
                })
        })
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            Some(RecordingFile {
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified().ok()?,
            })
        })
        .collect();

    files.sort_by_key(|file| std::cmp::Reverse(file.modified));
    files
}
