// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Recording for a duration or until Ctrl+C
//! - A line-based command loop for an external controller
//! - Listing recordings, devices and encoders

use quietcam::backends::audio::enumerate_audio_devices;
use quietcam::backends::camera::{create_hardware, v4l2::enumerate_cameras};
use quietcam::config::Config;
use quietcam::constants::format_bitrate;
use quietcam::media::encoders::detection::{
    detect_audio_encoders, detect_containers, detect_video_encoders,
};
use quietcam::pipelines::video::GstRecorderFactory;
use quietcam::recording::{CaptureController, StopReport};
use quietcam::storage::list_recordings as recordings_in;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};

fn spawn_controller(config: Config) -> Result<CaptureController, Box<dyn std::error::Error>> {
    let hardware = create_hardware(config.backend);
    println!(
        "Camera: {} ({})",
        config.camera_selector().device_path().display(),
        hardware.name()
    );
    Ok(CaptureController::spawn(
        config,
        hardware,
        Box::new(GstRecorderFactory),
    )?)
}

/// Record until the duration elapses, Ctrl+C, or the camera goes away
pub fn record(config: Config, duration: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let controller = spawn_controller(config)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let path = controller.start().await?;
        println!("Output: {}", path.display());
        match duration {
            Some(secs) => println!("Recording for {} seconds (press Ctrl+C to stop early)", secs),
            None => println!("Recording... (press Ctrl+C to stop)"),
        }

        let start = Instant::now();
        let target = duration.map(Duration::from_secs);
        loop {
            if stop_flag.load(Ordering::SeqCst) {
                println!();
                println!("Stopping...");
                break;
            }
            if target.is_some_and(|target| start.elapsed() >= target) {
                break;
            }
            if !controller.is_running() {
                println!();
                println!("Camera stopped delivering frames");
                break;
            }

            let elapsed = start.elapsed().as_secs();
            print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
            std::io::Write::flush(&mut std::io::stdout())?;

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        println!();

        match controller.stop().await? {
            StopReport::Finished(path) => println!("Video saved: {}", path.display()),
            StopReport::Idle => {
                let saved = controller.status().encoder_trail.last().copied();
                println!("Recording ended early (encoder {:?})", saved);
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Line-command loop: `start`, `stop`, `toggle`, `status`, `quit`
pub fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let controller = spawn_controller(config)?;

    let (interrupt_tx, mut interrupt_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("ready");

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = interrupt_rx.recv() => None,
            };
            let Some(line) = line else {
                break;
            };

            match line.trim() {
                "" => {}
                "start" => start_command(&controller).await,
                "stop" => stop_command(&controller).await,
                "toggle" => {
                    if controller.is_running() {
                        stop_command(&controller).await;
                    } else {
                        start_command(&controller).await;
                    }
                }
                "status" => {
                    let status = controller.status();
                    match &status.output {
                        Some(path) if status.running => {
                            println!("running {} {}", status.session, path.display())
                        }
                        _ => println!("idle {}", status.session),
                    }
                }
                "quit" | "exit" => break,
                other => println!("error: unknown command {:?}", other),
            }
        }

        stop_command(&controller).await;
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

async fn start_command(controller: &CaptureController) {
    match controller.start().await {
        Ok(path) => println!("started {}", path.display()),
        Err(e) => println!("error: {}", e),
    }
}

async fn stop_command(controller: &CaptureController) {
    match controller.stop().await {
        Ok(StopReport::Finished(path)) => println!("stopped {}", path.display()),
        Ok(StopReport::Idle) => println!("idle"),
        Err(e) => println!("error: {}", e),
    }
}

/// Recordings in the storage root, newest first
pub fn list_recordings(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let root = config.storage_root();
    let recordings = recordings_in(&root);

    if recordings.is_empty() {
        println!("No recordings in {}", root.display());
        return Ok(());
    }

    println!("Recordings in {}:", root.display());
    println!();
    for recording in recordings {
        let modified: chrono::DateTime<chrono::Local> = recording.modified.into();
        println!(
            "  {}  {:>10} KB  {}",
            modified.format("%Y-%m-%d %H:%M:%S"),
            recording.size / 1024,
            recording.path.display()
        );
    }
    Ok(())
}

/// V4L2 cameras and PipeWire microphones
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = enumerate_cameras();
    if cameras.is_empty() {
        println!("No cameras found.");
    } else {
        println!("Cameras:");
        for camera in &cameras {
            println!("  {}  {} ({})", camera.path.display(), camera.card, camera.driver);
            if !camera.formats.is_empty() {
                println!("      Formats: {}", camera.formats.join(", "));
            }
        }
    }
    println!();

    let microphones = enumerate_audio_devices();
    if microphones.is_empty() {
        println!("No microphones found.");
    } else {
        println!("Microphones:");
        for mic in &microphones {
            let marker = if mic.is_default { " (default)" } else { "" };
            println!("  {}{}  [{}]", mic.name, marker, mic.node_name);
        }
    }
    Ok(())
}

/// Encoders and muxers this GStreamer installation provides
pub fn list_encoders() -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let video = detect_video_encoders();
    println!("Video encoders:");
    if video.is_empty() {
        println!("  none");
    }
    for encoder in &video {
        println!(
            "  {:<14} {:?}  {}",
            encoder.element_name, encoder.codec, encoder.display_name
        );
    }

    println!();
    println!("Audio encoders:");
    let audio = detect_audio_encoders();
    if audio.is_empty() {
        println!("  none");
    }
    for encoder in &audio {
        println!("  {}", encoder);
    }

    println!();
    let containers: Vec<String> = detect_containers()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("Containers: {}", containers.join(", "));

    let config = Config::default();
    println!(
        "Default bitrate at {}x{}: {}",
        config.video.width,
        config.video.height,
        format_bitrate(
            config
                .bitrate_preset
                .bitrate_kbps(config.video.width, config.video.height)
        )
    );
    Ok(())
}
