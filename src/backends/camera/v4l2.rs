// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture device
//!
//! Streams through mmap buffers. RGB3 is requested first; sensors that only
//! offer YUYV are converted on read. Stills reuse the streaming path at the
//! still resolution and are JPEG-encoded here.

use super::CameraDevice;
use super::format_converters::{pack_rgb_rows, yuyv_to_rgb};
use super::types::{CameraControl, CameraResult, Frame, StreamMode};
use super::v4l2_controls::apply_controls;
use crate::constants::camera::{READ_TIMEOUT, STREAM_BUFFERS};
use crate::errors::CameraError;
use crate::storage::write_jpeg;
use std::path::Path;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

const RGB3: [u8; 4] = *b"RGB3";
const YUYV: [u8; 4] = *b"YUYV";

/// Negotiated buffer layout
#[derive(Debug, Clone, Copy)]
struct Negotiated {
    width: u32,
    height: u32,
    fourcc: FourCC,
    stride: usize,
}

/// V4L2 device node
pub struct V4l2Camera {
    path: String,
    device: Device,
    negotiated: Option<Negotiated>,
    stream: Option<MmapStream<'static>>,
}

impl V4l2Camera {
    /// Open the device node
    pub fn open(path: &str) -> CameraResult<Self> {
        let device = Device::with_path(path).map_err(|e| {
            CameraError::HardwareUnavailable(format!("Failed to open {}: {}", path, e))
        })?;
        info!(path, "Opened V4L2 device");
        Ok(Self {
            path: path.to_string(),
            device,
            negotiated: None,
            stream: None,
        })
    }

    fn negotiate(&mut self, mode: StreamMode) -> CameraResult<Negotiated> {
        let resolution = mode.resolution();
        let mut accepted = None;

        for fourcc in [FourCC::new(&RGB3), FourCC::new(&YUYV)] {
            let requested = Format::new(resolution.width, resolution.height, fourcc);
            match self.device.set_format(&requested) {
                Ok(f) if f.fourcc == fourcc => {
                    accepted = Some(f);
                    break;
                }
                Ok(f) => debug!(requested = ?fourcc, got = ?f.fourcc, "Format not accepted"),
                Err(e) => debug!(requested = ?fourcc, error = %e, "set_format failed"),
            }
        }

        let format = accepted.ok_or_else(|| {
            CameraError::Device(format!("{} accepts neither RGB3 nor YUYV", self.path))
        })?;

        if (format.width, format.height) != (resolution.width, resolution.height) {
            warn!(
                requested = %resolution,
                width = format.width,
                height = format.height,
                "Driver adjusted resolution"
            );
        }

        if let StreamMode::Preview { fps, .. } = mode
            && let Err(e) = self.device.set_params(&Parameters::with_fps(fps))
        {
            warn!(fps, error = %e, "Could not set frame rate");
        }

        Ok(Negotiated {
            width: format.width,
            height: format.height,
            fourcc: format.fourcc,
            stride: format.stride as usize,
        })
    }

    fn decode(layout: Negotiated, buf: &[u8]) -> Vec<u8> {
        if layout.fourcc == FourCC::new(&YUYV) {
            yuyv_to_rgb(buf, layout.width, layout.height)
        } else {
            let stride = if layout.stride == 0 {
                layout.width as usize * 3
            } else {
                layout.stride
            };
            pack_rgb_rows(buf, layout.width, layout.height, stride)
        }
    }
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.path
    }

    fn configure(&mut self, mode: StreamMode) -> CameraResult<()> {
        if self.stream.is_some() {
            return Err(CameraError::Device("cannot change mode while streaming".into()));
        }
        let layout = self.negotiate(mode)?;
        info!(path = %self.path, ?mode, fourcc = ?layout.fourcc, "V4L2 mode configured");
        self.negotiated = Some(layout);
        Ok(())
    }

    fn start(&mut self) -> CameraResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.negotiated.is_none() {
            return Err(CameraError::Device("device not configured".into()));
        }
        let mut stream =
            MmapStream::with_buffers(&self.device, Type::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| CameraError::Device(format!("Failed to create buffer stream: {}", e)))?;
        stream.set_timeout(READ_TIMEOUT);
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> CameraResult<()> {
        // Dropping the stream issues STREAMOFF and unmaps the buffers.
        self.stream = None;
        Ok(())
    }

    fn read_frame(&mut self) -> CameraResult<Frame> {
        let layout = self
            .negotiated
            .ok_or_else(|| CameraError::AcquisitionError("device not configured".into()))?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::AcquisitionError("device is not streaming".into()))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::AcquisitionError(e.to_string()))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };

        Ok(Frame::new(
            layout.width,
            layout.height,
            Self::decode(layout, &buf[..used]),
        ))
    }

    fn capture_file(&mut self, path: &Path, quality: u8) -> CameraResult<()> {
        let frame = self
            .read_frame()
            .map_err(|e| CameraError::CaptureFailure(e.to_string()))?;
        write_jpeg(&frame, path, quality)?;
        Ok(())
    }

    fn set_controls(&mut self, controls: &[CameraControl]) -> CameraResult<()> {
        apply_controls(&self.path, controls)
    }
}
