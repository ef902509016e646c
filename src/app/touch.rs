// SPDX-License-Identifier: GPL-3.0-only

//! Physical-to-logical touch coordinate mapping
//!
//! The panel's touch controller reports in its own orientation. How it is
//! mounted relative to the portrait UI varies between builds, so the
//! rotation is a config value (`input.touch_rotation`) and the mapping is a
//! pure function.

use crate::backends::camera::Resolution;
use serde::{Deserialize, Serialize};

/// Rotation from touch-panel coordinates to UI coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchRotation {
    /// 90 degrees clockwise
    Cw90,
    /// Uncalibrated panels start here
    #[default]
    Identity,
    /// 90 degrees counter-clockwise
    Ccw90,
    Rotate180,
}

impl TouchRotation {
    pub const ALL: [TouchRotation; 4] = [
        TouchRotation::Cw90,
        TouchRotation::Identity,
        TouchRotation::Ccw90,
        TouchRotation::Rotate180,
    ];
}

/// Map a raw touch point into UI space
///
/// `physical` is the panel's reporting size; the result is clamped into
/// `logical` so edge touches never land outside the UI.
pub fn map_touch(
    point: (i32, i32),
    rotation: TouchRotation,
    physical: Resolution,
    logical: Resolution,
) -> (u32, u32) {
    let (px, py) = (i64::from(point.0), i64::from(point.1));
    let (pw, ph) = (i64::from(physical.width), i64::from(physical.height));

    let (lx, ly) = match rotation {
        TouchRotation::Cw90 => (py, pw - px),
        TouchRotation::Identity => (px, py),
        TouchRotation::Ccw90 => (ph - py, px),
        TouchRotation::Rotate180 => (pw - px, ph - py),
    };

    let clamp = |v: i64, extent: u32| v.clamp(0, i64::from(extent.saturating_sub(1))) as u32;
    (clamp(lx, logical.width), clamp(ly, logical.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANEL: Resolution = Resolution::new(480, 800);

    #[test]
    fn test_rotations() {
        let p = (100, 200);
        assert_eq!(map_touch(p, TouchRotation::Identity, PANEL, PANEL), (100, 200));
        assert_eq!(map_touch(p, TouchRotation::Cw90, PANEL, PANEL), (200, 380));
        assert_eq!(map_touch(p, TouchRotation::Ccw90, PANEL, PANEL), (479, 100));
        assert_eq!(map_touch(p, TouchRotation::Rotate180, PANEL, PANEL), (380, 600));
    }

    #[test]
    fn test_results_are_clamped() {
        for rotation in TouchRotation::ALL {
            for point in [(-50, -50), (0, 0), (480, 800), (5000, 5000)] {
                let (x, y) = map_touch(point, rotation, PANEL, PANEL);
                assert!(x < PANEL.width && y < PANEL.height, "{rotation:?} {point:?}");
            }
        }
    }

    #[test]
    fn test_config_spelling() {
        let r: TouchRotation = serde_json::from_str("\"ccw90\"").unwrap();
        assert_eq!(r, TouchRotation::Ccw90);
        assert_eq!(serde_json::to_string(&TouchRotation::Rotate180).unwrap(), "\"rotate180\"");
    }
}
