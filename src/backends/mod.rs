// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access layer
//!
//! Every device sits behind a small trait with a Linux implementation and a
//! simulated one, so the core runs unchanged on a desktop:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Orchestrator                     │
//! └──────────┬──────────────────┬──────────────┬────────┘
//!            │                  │              │
//! ┌──────────┴────────┐ ┌───────┴───────┐ ┌────┴──────┐
//! │   FrameSource     │ │ SensorPoller  │ │ Backlight │
//! │ (acquisition loop)│ │ (sensor loop) │ │  (sysfs)  │
//! │  V4L2 | simulated │ │ IIO | simulated│ │           │
//! └───────────────────┘ └───────────────┘ └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Camera devices and the [`camera::FrameSource`] front end
//! - [`sensors`]: Light, tilt and battery sensors and their poller
//! - [`backlight`]: Panel brightness
//! - [`loop_controller`]: Stoppable background loop threads

pub mod backlight;
pub mod camera;
pub mod loop_controller;
pub mod sensors;
