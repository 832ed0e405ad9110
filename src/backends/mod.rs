// SPDX-License-Identifier: MPL-2.0

//! Hardware backends for camera and audio capture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              Recording layer                 │
//! └─────────────────────┬────────────────────────┘
//!                       │
//! ┌─────────────────────┴────────────────────────┐
//! │               Backend layer                  │
//! │  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │      Audio       │  │      Camera      │  │
//! │  │ (PipeWire/Pulse) │  │ (V4L2/simulated) │  │
//! │  └──────────────────┘  └──────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! - [`audio`]: microphone source elements and device enumeration
//! - [`camera`]: camera hardware trait, V4L2 and simulated drivers

pub mod audio;
pub mod camera;
