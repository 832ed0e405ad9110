// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end recording through GStreamer
//!
//! Uses the simulated camera and a test tone, so no devices are needed.
//! Skipped when the GStreamer plugins for an MP4 recording are missing.

use quietcam::backends::camera::{CameraBackendType, create_hardware};
use quietcam::config::Config;
use quietcam::media::encoders::ContainerFormat;
use quietcam::media::encoders::detection::{can_record, is_element_available};
use quietcam::pipelines::video::GstRecorderFactory;
use quietcam::recording::{CaptureController, StopReport};
use std::time::Duration;

fn gstreamer_ready() -> bool {
    let ready = can_record(ContainerFormat::MP4) && is_element_available("audiotestsrc");
    if !ready {
        eprintln!("skipping: GStreamer MP4 recording elements not installed");
    }
    ready
}

/// Top-level boxes of an ISO BMFF buffer as (type, payload)
fn boxes(data: &[u8]) -> Vec<([u8; 4], &[u8])> {
    let mut found = Vec::new();
    let mut pos = 0;
    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
        let kind: [u8; 4] = data[pos + 4..pos + 8].try_into().unwrap();
        let (header, size) = match size {
            0 => (8, data.len() - pos),
            1 => {
                let large = u64::from_be_bytes(data[pos + 8..pos + 16].try_into().unwrap());
                (16, large as usize)
            }
            size => (8, size),
        };
        if size < header || pos + size > data.len() {
            break;
        }
        found.push((kind, &data[pos + header..pos + size]));
        pos += size;
    }
    found
}

fn child<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    boxes(data)
        .into_iter()
        .find(|(found, _)| found == kind)
        .map(|(_, payload)| payload)
}

fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes(data[at..at + 2].try_into().unwrap())
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
}

fn be_u64(data: &[u8], at: usize) -> u64 {
    u64::from_be_bytes(data[at..at + 8].try_into().unwrap())
}

struct Track {
    handler: [u8; 4],
    width: u32,
    height: u32,
    timescale: u32,
    duration: u64,
    /// First sample entry of `stsd`
    sample_entry: [u8; 4],
    /// Audio tracks only
    channels: u16,
    sample_rate: u32,
    /// Samples and their summed deltas, from `stts`
    samples: u64,
    sample_ticks: u64,
}

impl Track {
    /// Average sample rate of a video track, in frames per second
    fn frame_rate(&self) -> f64 {
        self.samples as f64 * self.timescale as f64 / self.sample_ticks as f64
    }
}

fn parse_track(trak: &[u8]) -> Track {
    let mdia = child(trak, b"mdia").expect("track without media");
    let hdlr = child(mdia, b"hdlr").expect("track without handler");
    // version/flags (4) + pre_defined (4), then the handler type
    let handler: [u8; 4] = hdlr[8..12].try_into().unwrap();

    // tkhd ends with width and height in 16.16 fixed point
    let tkhd = child(trak, b"tkhd").expect("track without header");
    let width = be_u32(tkhd, tkhd.len() - 8) >> 16;
    let height = be_u32(tkhd, tkhd.len() - 4) >> 16;

    let mdhd = child(mdia, b"mdhd").expect("track without media header");
    let (timescale, duration) = match mdhd[0] {
        1 => (be_u32(mdhd, 20), be_u64(mdhd, 24)),
        _ => (be_u32(mdhd, 12), be_u32(mdhd, 16) as u64),
    };

    let stbl = child(mdia, b"minf")
        .and_then(|minf| child(minf, b"stbl"))
        .expect("track without sample table");

    // version/flags (4) + entry count (4), then the entries as boxes
    let stsd = child(stbl, b"stsd").expect("track without sample descriptions");
    let (sample_entry, entry) = boxes(&stsd[8..])
        .into_iter()
        .next()
        .expect("empty sample descriptions");
    let (channels, sample_rate) = if &handler == b"soun" {
        // reserved (6) + data ref (2) + reserved (8), then channel count,
        // sample size (2) + reserved (4), then the 16.16 sample rate
        (be_u16(entry, 16), be_u32(entry, 24) >> 16)
    } else {
        (0, 0)
    };

    let stts = child(stbl, b"stts").expect("track without sample timing");
    let (mut samples, mut sample_ticks) = (0u64, 0u64);
    for i in 0..be_u32(stts, 4) as usize {
        let count = be_u32(stts, 8 + i * 8) as u64;
        let delta = be_u32(stts, 12 + i * 8) as u64;
        samples += count;
        sample_ticks += count * delta;
    }

    Track {
        handler,
        width,
        height,
        timescale,
        duration,
        sample_entry,
        channels,
        sample_rate,
        samples,
        sample_ticks,
    }
}

fn tracks(file: &[u8]) -> Vec<Track> {
    let moov = child(file, b"moov").expect("no moov box");
    boxes(moov)
        .into_iter()
        .filter(|(kind, _)| kind == b"trak")
        .map(|(_, trak)| parse_track(trak))
        .collect()
}

#[test]
fn test_box_walker() {
    let mut file = Vec::new();
    file.extend_from_slice(&16u32.to_be_bytes());
    file.extend_from_slice(b"ftyp");
    file.extend_from_slice(b"isom\0\0\0\0");
    file.extend_from_slice(&8u32.to_be_bytes());
    file.extend_from_slice(b"free");

    let found = boxes(&file);
    assert_eq!(found.len(), 2);
    assert_eq!(&found[0].0, b"ftyp");
    assert_eq!(found[0].1, b"isom\0\0\0\0");
    assert!(found[1].1.is_empty());
}

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

#[test]
fn test_parse_audio_track() {
    let mut tkhd = vec![0u8; 76];
    tkhd.extend_from_slice(&[0; 8]);

    let mut mdhd = vec![0u8; 12];
    mdhd.extend_from_slice(&48_000u32.to_be_bytes());
    mdhd.extend_from_slice(&96_000u32.to_be_bytes());
    mdhd.extend_from_slice(&[0; 4]);

    let mut hdlr = vec![0u8; 8];
    hdlr.extend_from_slice(b"soun");
    hdlr.extend_from_slice(&[0; 13]);

    let mut entry = vec![0u8; 16];
    entry.extend_from_slice(&2u16.to_be_bytes());
    entry.extend_from_slice(&16u16.to_be_bytes());
    entry.extend_from_slice(&[0; 4]);
    entry.extend_from_slice(&(48_000u32 << 16).to_be_bytes());
    let mut stsd = vec![0, 0, 0, 0, 0, 0, 0, 1];
    stsd.extend(mp4_box(b"mp4a", &entry));

    let mut stts = vec![0, 0, 0, 0, 0, 0, 0, 2];
    for (count, delta) in [(90u32, 1024u32), (1, 512)] {
        stts.extend_from_slice(&count.to_be_bytes());
        stts.extend_from_slice(&delta.to_be_bytes());
    }

    let stbl = mp4_box(b"stbl", &[mp4_box(b"stsd", &stsd), mp4_box(b"stts", &stts)].concat());
    let mdia = [
        mp4_box(b"mdhd", &mdhd),
        mp4_box(b"hdlr", &hdlr),
        mp4_box(b"minf", &stbl),
    ]
    .concat();
    let trak = [mp4_box(b"tkhd", &tkhd), mp4_box(b"mdia", &mdia)].concat();

    let track = parse_track(&trak);
    assert_eq!(&track.handler, b"soun");
    assert_eq!((track.timescale, track.duration), (48_000, 96_000));
    assert_eq!(&track.sample_entry, b"mp4a");
    assert_eq!((track.channels, track.sample_rate), (2, 48_000));
    assert_eq!((track.samples, track.sample_ticks), (91, 90 * 1024 + 512));
}

#[tokio::test]
async fn test_records_audio_and_video_tracks() {
    if !gstreamer_ready() {
        return;
    }

    let storage = tempfile::tempdir().unwrap();
    let mut config = Config {
        storage_root: Some(storage.path().to_path_buf()),
        backend: CameraBackendType::Simulated,
        ..Config::default()
    };
    config.video.width = 320;
    config.video.height = 240;
    config.audio.test_tone = true;

    let hardware = create_hardware(config.backend);
    let controller =
        CaptureController::spawn(config.clone(), hardware, Box::new(GstRecorderFactory)).unwrap();

    let path = controller.start().await.unwrap();
    assert!(controller.is_running());
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let report = controller.stop().await.unwrap();
    assert_eq!(report, StopReport::Finished(path.clone()));

    let file = std::fs::read(&path).unwrap();
    assert!(!file.is_empty());
    assert!(child(&file, b"ftyp").is_some());

    let tracks = tracks(&file);
    assert_eq!(tracks.len(), 2);

    let video: Vec<&Track> = tracks.iter().filter(|t| &t.handler == b"vide").collect();
    let audio: Vec<&Track> = tracks.iter().filter(|t| &t.handler == b"soun").collect();
    assert_eq!(video.len(), 1);
    assert_eq!(audio.len(), 1);
    let (video, audio) = (video[0], audio[0]);

    assert_eq!((video.width, video.height), (config.video.width, config.video.height));
    assert!(video.timescale > 0 && video.duration > 0);
    assert!(video.samples > 1);
    // Live timestamps jitter around the configured rate
    let fps = video.frame_rate();
    let target = config.video.framerate as f64;
    assert!(
        (target * 0.7..=target * 1.3).contains(&fps),
        "recorded {fps:.1} fps, configured {target}"
    );

    assert!(matches!(&audio.sample_entry, b"mp4a" | b"Opus"));
    assert!(audio.timescale > 0 && audio.duration > 0);
    assert_eq!(audio.channels as u32, config.audio.channels);
    assert_eq!(audio.sample_rate, config.audio.sample_rate);

    let recordings: Vec<_> = std::fs::read_dir(storage.path()).unwrap().collect();
    assert_eq!(recordings.len(), 1);
}

#[tokio::test]
async fn test_unopenable_camera_leaves_no_file() {
    if !gstreamer_ready() {
        return;
    }

    let storage = tempfile::tempdir().unwrap();
    let mut config = Config {
        storage_root: Some(storage.path().to_path_buf()),
        backend: CameraBackendType::V4l2,
        camera: "/nonexistent/video".to_string(),
        ..Config::default()
    };
    config.audio.test_tone = true;

    let hardware = create_hardware(config.backend);
    let controller =
        CaptureController::spawn(config, hardware, Box::new(GstRecorderFactory)).unwrap();

    assert!(controller.start().await.is_err());
    assert!(std::fs::read_dir(storage.path()).unwrap().next().is_none());
    assert_eq!(controller.stop().await.unwrap(), StopReport::Idle);
}
