// SPDX-License-Identifier: MPL-2.0

//! Media pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera frame │ ──▶ │  Video pipeline   │ ──▶ │ MP4/WebM     │
//! │  (appsrc)    │     │  - HW encoding    │     │ file         │
//! │ Microphone   │ ──▶ │  - Audio muxing   │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! - [`video`]: GStreamer recording pipeline behind the encoder resource

pub mod video;
