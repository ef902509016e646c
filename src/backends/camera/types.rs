// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera devices and the frame source

use crate::errors::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Result type for camera operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Frame or sensor-mode dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes of a packed RGB888 buffer at this size
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Device configuration requested by the frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Low-latency continuous streaming
    Preview { resolution: Resolution, fps: u32 },
    /// One-shot high resolution capture
    Still { resolution: Resolution },
}

impl StreamMode {
    pub fn resolution(&self) -> Resolution {
        match self {
            StreamMode::Preview { resolution, .. } | StreamMode::Still { resolution } => *resolution,
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, StreamMode::Preview { .. })
    }
}

/// A decoded RGB888 frame
///
/// Pixel data is shared and immutable. Consumers that want different pixels
/// build a new frame with [`Frame::with_data`]; the producer's buffer is never
/// written after the frame leaves the acquisition loop.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB888, row-major, no padding
    pub data: Arc<[u8]>,
    /// When the frame was read from the device
    pub captured_at: Instant,
    /// Position in the frame source's output sequence, starting at 1
    pub generation: u64,
}

impl Frame {
    /// Build a frame from a packed RGB buffer. Generation is assigned by the
    /// frame source when the frame is published.
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            captured_at: Instant::now(),
            generation: 0,
        }
    }

    /// Uniformly colored frame
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data: Vec<u8> = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(width, height, data)
    }

    /// New frame with the same geometry, timestamp and generation but other pixels
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: data.into(),
            captured_at: self.captured_at,
            generation: self.generation,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Whether the buffer length matches width x height x 3
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.resolution().rgb_len()
    }

    /// RGB triple at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Whether both frames carry the very same pixel allocation
    pub fn shares_buffer_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Advisory camera controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraControl {
    Brightness(i32),
    Contrast(i32),
    Saturation(i32),
    Sharpness(i32),
    Gain(i32),
    /// Exposure time in 100 us units
    Exposure(i32),
    AutoExposure(bool),
    AutoWhiteBalance(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_frame_layout() {
        let frame = Frame::filled(4, 2, [1, 2, 3]);
        assert!(frame.is_well_formed());
        assert_eq!(frame.pixel(3, 1), Some([1, 2, 3]));
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn test_with_data_keeps_identity() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0]);
        frame.generation = 7;
        let next = frame.with_data(vec![9; 12]);
        assert_eq!(next.generation, 7);
        assert_eq!(next.captured_at, frame.captured_at);
        assert!(!next.shares_buffer_with(&frame));
        assert_eq!(frame.data[0], 0);
    }

    #[test]
    fn test_stream_mode_resolution() {
        let preview = StreamMode::Preview {
            resolution: Resolution::new(640, 480),
            fps: 24,
        };
        assert!(preview.is_preview());
        assert_eq!(preview.resolution().rgb_len(), 640 * 480 * 3);
        assert_eq!(Resolution::new(640, 480).to_string(), "640x480");
    }
}
