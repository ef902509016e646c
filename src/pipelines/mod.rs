// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │  FilterPipeline   │ ──▶ │  FrameSink / │
//! │   (RGB888)   │     │  - ISO gain       │     │  PhotoStore  │
//! │              │     │  - Color filter   │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! Transforms never modify their input: each stage returns a new frame, or
//! the input itself when the stage is a no-op.
//!
//! # Modules
//!
//! - [`filters`]: Lookup-table color filters and simulated ISO gain

pub mod filters;
