// SPDX-License-Identifier: MPL-2.0

//! GStreamer recording pipeline
//!
//! ```text
//! appsrc (camera surface) → queue → videoconvert → encoder → [parser] → queue ─┐
//!                                                                              ├→ muxer → filesink
//! microphone → queue → audioconvert → audioresample → capsfilter → encoder → queue ─┘
//! ```
//!
//! The camera pushes raw frames into the `appsrc` through [`AppSrcSurface`];
//! frames are dropped until the pipeline is playing.

use super::encoder_selection::{SelectedEncoders, select_encoders};
use super::muxer::{create_muxer, link_muxer_to_sink, link_to_muxer};
use crate::backends::audio::create_audio_source;
use crate::backends::camera::{FrameSink, PixelFormat, SurfaceFormat, SurfaceHandle, VideoFrame};
use crate::constants::timing::{EOS_TIMEOUT, FRAME_LOG_INTERVAL, START_ERROR_PROBE};
use crate::errors::EncoderError;
use crate::recording::{CaptureProfile, EncoderFactory, MediaEncoder, RecordingTarget};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Encoder surface backed by an `appsrc`
pub struct AppSrcSurface {
    appsrc: gst_app::AppSrc,
    format: SurfaceFormat,
    accepting: AtomicBool,
    pushed: AtomicU64,
}

impl AppSrcSurface {
    fn new(format: SurfaceFormat) -> Result<Self, String> {
        let caps = gst_video::VideoCapsBuilder::new()
            .format(video_format(format.pixel_format))
            .width(format.width as i32)
            .height(format.height as i32)
            .framerate(gst::Fraction::new(format.framerate as i32, 1))
            .build();

        let frame_size = format.pixel_format.frame_size(format.width, format.height) as u64;
        let appsrc = gst::ElementFactory::make("appsrc")
            .name("camera-surface")
            .property("caps", &caps)
            .property("format", gst::Format::Time)
            .property("is-live", true)
            .property("do-timestamp", true)
            // A few frames of slack, then drop instead of blocking the camera
            .property("max-bytes", frame_size * 4)
            .property("block", false)
            .build()
            .map_err(|e| format!("Failed to create appsrc: {}", e))?
            .dynamic_cast::<gst_app::AppSrc>()
            .map_err(|_| "Failed to cast to AppSrc".to_string())?;

        Ok(Self {
            appsrc,
            format,
            accepting: AtomicBool::new(false),
            pushed: AtomicU64::new(0),
        })
    }

    fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn frames_pushed(&self) -> u64 {
        self.pushed.load(Ordering::SeqCst)
    }
}

impl FrameSink for AppSrcSurface {
    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn push_frame(&self, frame: VideoFrame) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }

        let expected = self
            .format
            .pixel_format
            .frame_size(self.format.width, self.format.height);
        if frame.format != self.format.pixel_format || frame.data.len() != expected {
            debug!(
                sequence = frame.sequence,
                size = frame.data.len(),
                expected,
                "Dropping frame that does not match the surface format"
            );
            return false;
        }

        let mut buffer = gst::Buffer::from_slice(frame.data);
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_duration(gst::ClockTime::SECOND / u64::from(self.format.framerate.max(1)));
        }

        match self.appsrc.push_buffer(buffer) {
            Ok(_) => {
                let pushed = self.pushed.fetch_add(1, Ordering::SeqCst) + 1;
                if pushed % FRAME_LOG_INTERVAL == 0 {
                    debug!(pushed, "Frames pushed into encoder");
                }
                true
            }
            Err(flow) => {
                debug!(?flow, "appsrc refused frame");
                false
            }
        }
    }
}

fn video_format(pixel_format: PixelFormat) -> gst_video::VideoFormat {
    match pixel_format {
        PixelFormat::Yuyv => gst_video::VideoFormat::Yuy2,
        PixelFormat::Nv12 => gst_video::VideoFormat::Nv12,
        PixelFormat::I420 => gst_video::VideoFormat::I420,
    }
}

/// Audio branch elements
struct AudioBranch {
    source: gst::Element,
    queue: gst::Element,
    convert: gst::Element,
    resample: gst::Element,
    capsfilter: gst::Element,
    encoder: gst::Element,
    out_queue: gst::Element,
}

impl AudioBranch {
    fn new(profile: &CaptureProfile, encoder: gst::Element) -> Result<Self, String> {
        let source = create_audio_source(&profile.audio_input)?;

        // Buffer up to 2 s of audio to ride out scheduling hiccups
        let queue = gst::ElementFactory::make("queue")
            .property("max-size-buffers", 200u32)
            .property("max-size-time", 2_000_000_000u64)
            .build()
            .map_err(|e| format!("Failed to create audio queue: {}", e))?;

        let convert = make("audioconvert")?;
        let resample = make("audioresample")?;

        let caps = gst::Caps::builder("audio/x-raw")
            .field("rate", profile.audio_sample_rate as i32)
            .field("channels", profile.audio_channels as i32)
            .build();
        let capsfilter = gst::ElementFactory::make("capsfilter")
            .property("caps", &caps)
            .build()
            .map_err(|e| format!("Failed to create audio capsfilter: {}", e))?;

        let out_queue = make("queue")?;

        Ok(Self {
            source,
            queue,
            convert,
            resample,
            capsfilter,
            encoder,
            out_queue,
        })
    }

    fn elements(&self) -> [&gst::Element; 7] {
        [
            &self.source,
            &self.queue,
            &self.convert,
            &self.resample,
            &self.capsfilter,
            &self.encoder,
            &self.out_queue,
        ]
    }
}

fn make(factory: &str) -> Result<gst::Element, String> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| format!("Failed to create {}: {}", factory, e))
}

/// A built pipeline and the surface feeding it
struct RecordingPipeline {
    pipeline: gst::Pipeline,
    surface: Arc<AppSrcSurface>,
}

fn build_pipeline(
    profile: &CaptureProfile,
    output_path: &Path,
    encoders: SelectedEncoders,
) -> Result<RecordingPipeline, String> {
    let surface = Arc::new(AppSrcSurface::new(profile.surface_format())?);
    let pipeline = gst::Pipeline::with_name("quietcam-recorder");

    let video_queue = make("queue")?;
    let videoconvert = make("videoconvert")?;
    let video_out_queue = make("queue")?;
    let video_encoder = encoders.video.encoder;
    let video_parser = encoders.video.parser;

    let muxer_config = create_muxer(profile.container, output_path, profile.orientation_hint)?;
    let audio = AudioBranch::new(profile, encoders.audio.encoder)?;

    let appsrc = surface.appsrc.upcast_ref::<gst::Element>();
    let mut elements: Vec<&gst::Element> =
        vec![appsrc, &video_queue, &videoconvert, &video_encoder];
    if let Some(parser) = &video_parser {
        elements.push(parser);
    }
    elements.push(&video_out_queue);
    elements.push(&muxer_config.muxer);
    elements.push(&muxer_config.filesink);
    elements.extend(audio.elements());

    pipeline
        .add_many(&elements)
        .map_err(|e| format!("Failed to add elements to pipeline: {}", e))?;

    // Video chain
    let mut video_chain: Vec<&gst::Element> =
        vec![appsrc, &video_queue, &videoconvert, &video_encoder];
    if let Some(parser) = &video_parser {
        video_chain.push(parser);
    }
    video_chain.push(&video_out_queue);
    gst::Element::link_many(&video_chain)
        .map_err(|_| "Failed to link video chain".to_string())?;
    link_to_muxer(&video_out_queue, &muxer_config.muxer, "video")?;

    // Audio chain
    gst::Element::link_many(audio.elements())
        .map_err(|_| "Failed to link audio chain".to_string())?;
    link_to_muxer(&audio.out_queue, &muxer_config.muxer, "audio")?;

    link_muxer_to_sink(&muxer_config.muxer, &muxer_config.filesink)?;

    info!(
        path = %muxer_config.output_path.display(),
        format = %profile.surface_format(),
        bitrate_kbps = profile.video_bitrate_kbps,
        sample_rate = profile.audio_sample_rate,
        channels = profile.audio_channels,
        "Recording pipeline built"
    );

    Ok(RecordingPipeline { pipeline, surface })
}

/// [`MediaEncoder`] backed by a GStreamer pipeline
#[derive(Default)]
pub struct GstRecorder {
    active: Option<RecordingPipeline>,
}

impl GstRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// First error or warning on the bus within `timeout`
    fn probe_bus(pipeline: &gst::Pipeline, timeout: Duration) -> Result<(), EncoderError> {
        let bus = pipeline
            .bus()
            .ok_or_else(|| EncoderError::Pipeline("No bus available".to_string()))?;

        let Some(msg) = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(timeout.as_millis() as u64),
            &[gst::MessageType::Error, gst::MessageType::Warning],
        ) else {
            return Ok(());
        };

        match msg.view() {
            gst::MessageView::Error(err) => {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    source = ?err.src().map(|s| s.name()),
                    "GStreamer error during start"
                );
                Err(EncoderError::Pipeline(err.error().to_string()))
            }
            gst::MessageView::Warning(w) => {
                warn!(
                    warning = %w.error(),
                    debug = ?w.debug(),
                    source = ?w.src().map(|s| s.name()),
                    "GStreamer warning during start"
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Wait for EOS to reach the sink, or for an error
    fn wait_for_eos(pipeline: &gst::Pipeline, timeout: Duration) -> Result<(), EncoderError> {
        let bus = pipeline
            .bus()
            .ok_or_else(|| EncoderError::Pipeline("No bus available".to_string()))?;

        match bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(timeout.as_millis() as u64),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(..) => {
                    debug!("EOS reached the file sink");
                    Ok(())
                }
                gst::MessageView::Error(err) => {
                    error!(
                        error = %err.error(),
                        debug = ?err.debug(),
                        source = ?err.src().map(|s| s.name()),
                        "GStreamer error while finalizing"
                    );
                    Err(EncoderError::Pipeline(err.error().to_string()))
                }
                _ => Ok(()),
            },
            None => Err(EncoderError::Pipeline(format!(
                "EOS not received within {:?}",
                timeout
            ))),
        }
    }
}

impl MediaEncoder for GstRecorder {
    fn prepare(&mut self, target: &RecordingTarget) -> Result<SurfaceHandle, EncoderError> {
        if self.active.is_some() {
            return Err(EncoderError::AlreadyActive);
        }

        gst::init()
            .map_err(|e| EncoderError::Pipeline(format!("Failed to initialize GStreamer: {}", e)))?;

        let profile = target.profile();
        let encoders = select_encoders(profile).map_err(EncoderError::ConfigurationRejected)?;
        let recording =
            build_pipeline(profile, target.path(), encoders).map_err(EncoderError::Pipeline)?;

        if let Err(e) = recording.pipeline.set_state(gst::State::Ready) {
            let _ = recording.pipeline.set_state(gst::State::Null);
            return Err(EncoderError::Pipeline(format!(
                "Failed to prepare pipeline: {}",
                e
            )));
        }

        let surface: SurfaceHandle = recording.surface.clone();
        self.active = Some(recording);
        Ok(surface)
    }

    fn start(&mut self) -> Result<(), EncoderError> {
        let recording = self.active.as_ref().ok_or(EncoderError::NotPrepared)?;

        info!("Starting recording pipeline");
        recording
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncoderError::Pipeline(format!("Failed to start recording: {}", e)))?;

        Self::probe_bus(&recording.pipeline, START_ERROR_PROBE)?;
        recording.surface.set_accepting(true);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EncoderError> {
        let recording = self.active.as_ref().ok_or(EncoderError::NotPrepared)?;

        recording.surface.set_accepting(false);
        info!(
            frames = recording.surface.frames_pushed(),
            "Sending EOS to recording pipeline"
        );
        if !recording.pipeline.send_event(gst::event::Eos::new()) {
            warn!("Failed to send EOS event to pipeline");
        }

        let finalized = Self::wait_for_eos(&recording.pipeline, EOS_TIMEOUT);
        recording
            .pipeline
            .set_state(gst::State::Null)
            .map_err(|e| EncoderError::Pipeline(format!("Failed to stop pipeline: {}", e)))?;
        finalized
    }

    fn release(&mut self) {
        if let Some(recording) = self.active.take() {
            recording.surface.set_accepting(false);
            let _ = recording.pipeline.set_state(gst::State::Null);
            debug!("Recording pipeline released");
        }
    }
}

impl Drop for GstRecorder {
    fn drop(&mut self) {
        self.release();
    }
}

/// Creates a [`GstRecorder`] per recording
#[derive(Debug, Default, Clone, Copy)]
pub struct GstRecorderFactory;

impl EncoderFactory for GstRecorderFactory {
    fn create(&self) -> Box<dyn MediaEncoder> {
        Box::new(GstRecorder::new())
    }
}
