// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 control ioctls
//!
//! Maps [`CameraControl`] values onto V4L2 control IDs and writes them with
//! `VIDIOC_S_CTRL`. Works on any V4L2 node path, independent of whether the
//! streaming side is built.

use super::types::{CameraControl, CameraResult};
use crate::errors::CameraError;
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

const V4L2_CTRL_CLASS_USER: u32 = 0x00980000;
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;

const V4L2_CID_BASE: u32 = V4L2_CTRL_CLASS_USER | 0x900;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

pub const V4L2_CID_BRIGHTNESS: u32 = V4L2_CID_BASE;
pub const V4L2_CID_CONTRAST: u32 = V4L2_CID_BASE + 1;
pub const V4L2_CID_SATURATION: u32 = V4L2_CID_BASE + 2;
pub const V4L2_CID_AUTO_WHITE_BALANCE: u32 = V4L2_CID_BASE + 12;
pub const V4L2_CID_GAIN: u32 = V4L2_CID_BASE + 19;
pub const V4L2_CID_SHARPNESS: u32 = V4L2_CID_BASE + 27;

/// Exposure mode menu
pub const V4L2_CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1;
/// Absolute exposure time in 100 us units
pub const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 2;

/// Exposure menu: manual time, manual iris
pub const V4L2_EXPOSURE_MANUAL: i32 = 1;
/// Exposure menu: auto time, manual iris (what fixed-lens sensors report as auto)
pub const V4L2_EXPOSURE_APERTURE_PRIORITY: i32 = 3;

/// `_IOWR('V', 28, struct v4l2_control)`
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

/// V4L2 control ID and value for a control request
pub fn control_id_value(control: CameraControl) -> (u32, i32) {
    match control {
        CameraControl::Brightness(v) => (V4L2_CID_BRIGHTNESS, v),
        CameraControl::Contrast(v) => (V4L2_CID_CONTRAST, v),
        CameraControl::Saturation(v) => (V4L2_CID_SATURATION, v),
        CameraControl::Sharpness(v) => (V4L2_CID_SHARPNESS, v),
        CameraControl::Gain(v) => (V4L2_CID_GAIN, v),
        CameraControl::Exposure(v) => (V4L2_CID_EXPOSURE_ABSOLUTE, v),
        CameraControl::AutoExposure(on) => (
            V4L2_CID_EXPOSURE_AUTO,
            if on {
                V4L2_EXPOSURE_APERTURE_PRIORITY
            } else {
                V4L2_EXPOSURE_MANUAL
            },
        ),
        CameraControl::AutoWhiteBalance(on) => (V4L2_CID_AUTO_WHITE_BALANCE, on as i32),
    }
}

/// Set one control on the device node
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> CameraResult<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(device_path)
        .map_err(|e| CameraError::Device(format!("Failed to open {}: {}", device_path, e)))?;

    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    // SAFETY: fd is valid for the lifetime of `file`, ctrl matches struct v4l2_control.
    let result = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            VIDIOC_S_CTRL,
            &mut ctrl as *mut V4l2Control,
        )
    };

    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(device_path, control_id, value, ?errno, "Failed to set V4L2 control");
        return Err(CameraError::Device(format!(
            "control {:#x} rejected: {}",
            control_id, errno
        )));
    }

    if ctrl.value != value {
        debug!(
            device_path,
            control_id,
            requested = value,
            actual = ctrl.value,
            "Driver adjusted control value"
        );
    }
    Ok(())
}

/// Apply every control, continuing past failures. Returns the first error.
pub fn apply_controls(device_path: &str, controls: &[CameraControl]) -> CameraResult<()> {
    let mut first_error = None;
    for &control in controls {
        let (id, value) = control_id_value(control);
        if let Err(e) = set_control(device_path, id, value) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_id_values() {
        assert_eq!(V4L2_CID_BRIGHTNESS, 0x00980900);
        assert_eq!(V4L2_CID_GAIN, 0x00980913);
        assert_eq!(V4L2_CID_EXPOSURE_AUTO, 0x009a0901);
        assert_eq!(V4L2_CID_EXPOSURE_ABSOLUTE, 0x009a0902);
    }

    #[test]
    fn test_auto_exposure_menu_mapping() {
        assert_eq!(
            control_id_value(CameraControl::AutoExposure(true)),
            (V4L2_CID_EXPOSURE_AUTO, V4L2_EXPOSURE_APERTURE_PRIORITY)
        );
        assert_eq!(
            control_id_value(CameraControl::AutoWhiteBalance(false)),
            (V4L2_CID_AUTO_WHITE_BALANCE, 0)
        );
    }

    #[test]
    fn test_missing_device_is_an_error() {
        let result = apply_controls("/nonexistent/video99", &[CameraControl::Gain(4)]);
        assert!(matches!(result, Err(CameraError::Device(_))));
    }
}
