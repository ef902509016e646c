// SPDX-License-Identifier: GPL-3.0-only

//! Camera device abstraction
//!
//! A [`CameraDevice`] is the narrow capability set the [`FrameSource`] needs
//! from a capture driver: mode changes, streaming start/stop, one-frame reads
//! and file captures. Two implementations exist:
//!
//! - [`simulated::SimulatedCamera`]: always built, generates frames and
//!   supports fault injection for tests and desktop runs
//! - `v4l2::V4l2Camera`: Linux V4L2 capture, built with the `hardware` feature
//!
//! Which one is used is decided once by [`device_factory`] from the
//! `camera.backend` setting.

pub mod format_converters;
pub mod simulated;
pub mod source;
pub mod types;
pub mod v4l2_controls;

#[cfg(feature = "hardware")]
pub mod v4l2;

pub use source::FrameSource;
pub use types::{CameraControl, CameraResult, Frame, Resolution, StreamMode};

use crate::config::CameraSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Capture driver used by the frame source
///
/// Implementations are driven from one thread at a time through a mutex,
/// so they only need to be `Send`.
pub trait CameraDevice: Send {
    /// Human-readable device name for logs
    fn name(&self) -> &str;

    /// Apply a stream mode. Only valid while stopped.
    fn configure(&mut self, mode: StreamMode) -> CameraResult<()>;

    /// Start streaming in the configured mode
    fn start(&mut self) -> CameraResult<()>;

    /// Stop streaming. Stopping a stopped device is not an error.
    fn stop(&mut self) -> CameraResult<()>;

    /// Block until the next frame arrives
    fn read_frame(&mut self) -> CameraResult<Frame>;

    /// Capture one frame in the current (still) mode and write it as JPEG
    fn capture_file(&mut self, path: &Path, quality: u8) -> CameraResult<()>;

    /// Apply advisory controls
    fn set_controls(&mut self, controls: &[CameraControl]) -> CameraResult<()>;
}

/// Camera backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackendType {
    /// Generated frames, no hardware
    #[default]
    Simulated,
    /// Linux V4L2 device
    V4l2,
}

impl fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraBackendType::Simulated => write!(f, "simulated"),
            CameraBackendType::V4l2 => write!(f, "v4l2"),
        }
    }
}

/// Build the device constructor for the configured backend
///
/// The returned closure is handed to [`FrameSource::open`], which calls it
/// once per initialization attempt.
pub fn device_factory(
    settings: &CameraSettings,
) -> impl FnMut() -> CameraResult<Box<dyn CameraDevice>> + use<> {
    let backend = settings.backend;
    let device = settings.device.clone();

    move || match backend {
        CameraBackendType::Simulated => {
            Ok(Box::new(simulated::SimulatedCamera::new()) as Box<dyn CameraDevice>)
        }
        CameraBackendType::V4l2 => open_v4l2(&device),
    }
}

#[cfg(feature = "hardware")]
fn open_v4l2(device: &str) -> CameraResult<Box<dyn CameraDevice>> {
    Ok(Box::new(v4l2::V4l2Camera::open(device)?))
}

#[cfg(not(feature = "hardware"))]
fn open_v4l2(device: &str) -> CameraResult<Box<dyn CameraDevice>> {
    Err(crate::errors::CameraError::HardwareUnavailable(format!(
        "{} requested but this build has no V4L2 support (enable the `hardware` feature)",
        device
    )))
}
