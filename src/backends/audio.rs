// SPDX-License-Identifier: MPL-2.0

//! Microphone sources for recordings
//!
//! Devices are listed through `pw-dump`. The recording pipeline gets its
//! audio source element from [`create_audio_source`], which prefers
//! PipeWire, then PulseAudio, then whatever `autoaudiosrc` finds.

use gstreamer as gst;
use serde_json::Value;
use std::process::Command;
use tracing::{debug, info, warn};

/// Represents an audio input device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub name: String,
    pub serial: String,
    pub node_name: String,
    pub is_default: bool,
}

/// Where the audio track comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AudioInput {
    /// The system default microphone
    #[default]
    Default,
    /// A PipeWire node name or serial
    Device(String),
    /// A generated sine tone, for machines without a microphone
    TestTone,
}

impl AudioInput {
    pub fn from_settings(device: Option<&str>, test_tone: bool) -> Self {
        match (test_tone, device) {
            (true, _) => AudioInput::TestTone,
            (false, Some(device)) if !device.is_empty() => AudioInput::Device(device.to_string()),
            _ => AudioInput::Default,
        }
    }
}

/// Build a live audio source element for `input`
pub fn create_audio_source(input: &AudioInput) -> Result<gst::Element, String> {
    if let AudioInput::TestTone = input {
        return gst::ElementFactory::make("audiotestsrc")
            .property("is-live", true)
            .property("do-timestamp", true)
            .property_from_str("wave", "sine")
            .build()
            .map_err(|e| format!("Failed to create audiotestsrc: {}", e));
    }

    let target = match input {
        AudioInput::Device(device) => {
            let target = device
                .strip_prefix("pipewire-serial-")
                .or_else(|| device.strip_prefix("pipewire-"))
                .unwrap_or(device);
            info!(target = %target, "Using PipeWire audio target");
            Some(target.to_string())
        }
        _ => None,
    };

    let mut pipewire = gst::ElementFactory::make("pipewiresrc")
        .property("do-timestamp", true)
        // Keep the stream alive when the mic goes quiet
        .property("keepalive-time", 1000);
    if let Some(target) = &target {
        pipewire = pipewire.property("target-object", target.as_str());
    }
    match pipewire.build() {
        Ok(source) => return Ok(source),
        Err(e) => debug!(error = %e, "pipewiresrc unavailable"),
    }

    let mut pulse = gst::ElementFactory::make("pulsesrc").property("do-timestamp", true);
    if let Some(target) = &target {
        pulse = pulse.property("device", target.as_str());
    }
    match pulse.build() {
        Ok(source) => return Ok(source),
        Err(e) => debug!(error = %e, "pulsesrc unavailable"),
    }

    if target.is_some() {
        warn!("Audio device selection ignored, falling back to autoaudiosrc");
    }
    gst::ElementFactory::make("autoaudiosrc")
        .build()
        .map_err(|e| format!("Failed to create audio source: {}", e))
}

/// Enumerate available audio input devices using PipeWire
pub fn enumerate_audio_devices() -> Vec<AudioDevice> {
    let output = match Command::new("pw-dump").output() {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to run pw-dump: {}", e);
            return Vec::new();
        }
    };

    if !output.status.success() {
        warn!("pw-dump command failed");
        return Vec::new();
    }

    let nodes: Vec<Value> = match serde_json::from_slice(&output.stdout) {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!("Failed to parse JSON from pw-dump: {}", e);
            return Vec::new();
        }
    };

    parse_audio_sources(&nodes)
}

/// Default source name from the "default" metadata object
fn default_source_name(nodes: &[Value]) -> Option<String> {
    let metadata = nodes.iter().find(|node| {
        node.get("type").and_then(Value::as_str) == Some("PipeWire:Interface:Metadata")
            && node
                .pointer("/props/metadata.name")
                .and_then(Value::as_str)
                == Some("default")
    })?;

    metadata
        .get("metadata")?
        .as_array()?
        .iter()
        .find(|entry| {
            matches!(
                entry.get("key").and_then(Value::as_str),
                Some("default.audio.source") | Some("default.configured.audio.source")
            )
        })?
        .pointer("/value/name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_audio_sources(nodes: &[Value]) -> Vec<AudioDevice> {
    let default_node_name = default_source_name(nodes);
    if let Some(name) = &default_node_name {
        debug!(default_source = %name, "Found default audio source from metadata");
    }

    let prop = |props: &Value, key: &str| props.get(key).and_then(Value::as_str).map(str::to_string);

    let mut devices: Vec<AudioDevice> = nodes
        .iter()
        .filter_map(|node| node.pointer("/info/props"))
        .filter(|props| props.get("media.class").and_then(Value::as_str) == Some("Audio/Source"))
        .map(|props| {
            let node_name = prop(props, "node.name").unwrap_or_default();
            let device = AudioDevice {
                name: prop(props, "node.nick")
                    .or_else(|| prop(props, "node.description"))
                    .or_else(|| prop(props, "node.name"))
                    .unwrap_or_else(|| "Unknown Audio Device".to_string()),
                serial: props
                    .get("object.serial")
                    .map(|serial| match serial {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "0".to_string()),
                is_default: default_node_name.as_deref() == Some(node_name.as_str()),
                node_name,
            };
            debug!(
                name = %device.name,
                serial = %device.serial,
                is_default = device.is_default,
                "Found audio input device"
            );
            device
        })
        .collect();

    // Sort: default first, then alphabetically
    devices.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_input_from_settings() {
        assert_eq!(AudioInput::from_settings(None, false), AudioInput::Default);
        assert_eq!(AudioInput::from_settings(Some(""), false), AudioInput::Default);
        assert_eq!(
            AudioInput::from_settings(Some("alsa_input.usb"), false),
            AudioInput::Device("alsa_input.usb".to_string())
        );
        assert_eq!(AudioInput::from_settings(Some("mic"), true), AudioInput::TestTone);
    }

    #[test]
    fn test_parse_pw_dump_sources() {
        let nodes: Vec<Value> = serde_json::from_str(
            r#"[
                {"type": "PipeWire:Interface:Metadata",
                 "props": {"metadata.name": "default"},
                 "metadata": [{"key": "default.audio.source", "value": {"name": "mic.b"}}]},
                {"info": {"props": {"media.class": "Audio/Source", "node.name": "mic.a",
                                    "node.nick": "Alpha", "object.serial": 40}}},
                {"info": {"props": {"media.class": "Audio/Source", "node.name": "mic.b",
                                    "node.description": "Beta", "object.serial": "41"}}},
                {"info": {"props": {"media.class": "Audio/Sink", "node.name": "speaker"}}}
            ]"#,
        )
        .unwrap();

        let devices = parse_audio_sources(&nodes);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Beta");
        assert!(devices[0].is_default);
        assert_eq!(devices[0].serial, "41");
        assert_eq!(devices[1].serial, "40");
    }
}
