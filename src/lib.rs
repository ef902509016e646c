// SPDX-License-Identifier: GPL-3.0-only

//! pocketcam - capture, filter and power core for a handheld camera appliance
//!
//! The appliance is a single-board computer with a camera module, a portrait
//! touchscreen, a rotary encoder, a flash LED and a haptic motor. This crate
//! is the real-time core: frame acquisition, per-frame color/ISO filters,
//! ambient sensors, and the scene and power state machines that gate
//! capture, display and shutdown.
//!
//! # Architecture
//!
//! - [`app`]: Scene and power state machines and the per-tick orchestrator
//! - [`backends`]: Camera, sensors and backlight, each real or simulated
//! - [`pipelines`]: Frame filters
//! - [`config`]: Persisted JSON configuration
//! - [`storage`]: Photo files and retention
//! - [`flash`]: Flash LED with watchdog
//! - [`haptic`]: Vibration feedback
//!
//! Three threads run at once: the camera acquisition loop, the sensor loop,
//! and the orchestrator on the caller's thread.
//!
//! # Example
//!
//! ```no_run
//! use pocketcam::app::{self, NullSink};
//! use pocketcam::config::JsonConfigStore;
//! use std::sync::{Arc, atomic::AtomicBool, mpsc};
//!
//! let config = JsonConfigStore::load(pocketcam::config::default_config_path())?;
//! let (_input, receiver) = mpsc::channel();
//! let mut orchestrator = app::assemble(Box::new(config), Box::new(NullSink::default()), receiver)?;
//! orchestrator.run(Arc::new(AtomicBool::new(false)))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flash;
pub mod haptic;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use app::{AppEvent, AppState, Orchestrator, PowerState};
pub use backends::camera::{Frame, FrameSource, Resolution};
pub use config::{ConfigExt, ConfigProvider, JsonConfigStore};
pub use errors::{AppError, AppResult, CameraError};
pub use pipelines::filters::{FilterKind, FilterPipeline};
