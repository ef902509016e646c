// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera device
//!
//! Produces an animated XOR gradient at the configured preview rate. The
//! [`SimulatedCameraHandle`] returned alongside the device lets tests inject
//! failures and inspect what the frame source asked the device to do.

use super::CameraDevice;
use super::types::{CameraControl, CameraResult, Frame, Resolution, StreamMode};
use crate::errors::CameraError;
use crate::storage::write_jpeg;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct SimState {
    fail_reads: AtomicU32,
    failing_reads: AtomicBool,
    stall_ms: AtomicU64,
    fail_still_configure: AtomicBool,
    fail_still_capture: AtomicBool,
    fail_stop: AtomicBool,
    streaming: AtomicBool,
    starts: AtomicU32,
    stops: AtomicU32,
    captures: AtomicU32,
    reads: AtomicU64,
    mode: Mutex<Option<StreamMode>>,
    controls: Mutex<Vec<CameraControl>>,
}

/// Test and diagnostics view into a [`SimulatedCamera`]
#[derive(Debug, Clone)]
pub struct SimulatedCameraHandle {
    state: Arc<SimState>,
}

impl SimulatedCameraHandle {
    /// Make the next `count` frame reads fail
    pub fn fail_next_reads(&self, count: u32) {
        self.state.fail_reads.store(count, Ordering::SeqCst);
    }

    /// Make every frame read fail until released with `false`
    pub fn hold_read_failures(&self, hold: bool) {
        self.state.failing_reads.store(hold, Ordering::SeqCst);
    }

    /// Block the next frame read for `stall`, like a dequeue that never
    /// gets a buffer
    pub fn stall_next_read(&self, stall: Duration) {
        self.state
            .stall_ms
            .store(stall.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make switching to still mode fail
    pub fn fail_still_configure(&self, fail: bool) {
        self.state.fail_still_configure.store(fail, Ordering::SeqCst);
    }

    /// Make still captures fail
    pub fn fail_still_capture(&self, fail: bool) {
        self.state.fail_still_capture.store(fail, Ordering::SeqCst);
    }

    /// Make `stop()` report an error (the device still stops)
    pub fn fail_stop(&self, fail: bool) {
        self.state.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn is_streaming(&self) -> bool {
        self.state.streaming.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> Option<StreamMode> {
        *lock(&self.state.mode)
    }

    pub fn start_count(&self) -> u32 {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> u32 {
        self.state.captures.load(Ordering::SeqCst)
    }

    /// Frame reads attempted so far, failed ones included
    pub fn read_count(&self) -> u64 {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn applied_controls(&self) -> Vec<CameraControl> {
        lock(&self.state.controls).clone()
    }
}

/// Generated-frame camera
#[derive(Debug)]
pub struct SimulatedCamera {
    state: Arc<SimState>,
    tick: u64,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::with_handle().0
    }

    /// Device plus a handle sharing its state
    pub fn with_handle() -> (Self, SimulatedCameraHandle) {
        let state = Arc::new(SimState::default());
        let handle = SimulatedCameraHandle {
            state: Arc::clone(&state),
        };
        (Self { state, tick: 0 }, handle)
    }

    fn current_mode(&self) -> CameraResult<StreamMode> {
        lock(&self.state.mode)
            .ok_or_else(|| CameraError::Device("simulated camera is not configured".into()))
    }

    fn frame_interval(mode: StreamMode) -> Duration {
        match mode {
            StreamMode::Preview { fps, .. } => Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            StreamMode::Still { .. } => Duration::from_millis(5),
        }
    }

    fn render(&mut self, resolution: Resolution) -> Frame {
        self.tick = self.tick.wrapping_add(1);
        Frame::new(
            resolution.width,
            resolution.height,
            xor_gradient(resolution, (self.tick.wrapping_mul(4) % 256) as u8),
        )
    }
}

impl CameraDevice for SimulatedCamera {
    fn name(&self) -> &str {
        "simulated"
    }

    fn configure(&mut self, mode: StreamMode) -> CameraResult<()> {
        if self.state.streaming.load(Ordering::SeqCst) {
            return Err(CameraError::Device(
                "cannot change mode while streaming".into(),
            ));
        }
        if !mode.is_preview() && self.state.fail_still_configure.load(Ordering::SeqCst) {
            return Err(CameraError::Device("still mode rejected".into()));
        }
        debug!(?mode, "Simulated camera configured");
        *lock(&self.state.mode) = Some(mode);
        Ok(())
    }

    fn start(&mut self) -> CameraResult<()> {
        self.current_mode()?;
        self.state.streaming.store(true, Ordering::SeqCst);
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> CameraResult<()> {
        self.state.streaming.store(false, Ordering::SeqCst);
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_stop.load(Ordering::SeqCst) {
            return Err(CameraError::Device("simulated stop failure".into()));
        }
        Ok(())
    }

    fn read_frame(&mut self) -> CameraResult<Frame> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let mode = self.current_mode()?;
        std::thread::sleep(Self::frame_interval(mode));
        let stall_ms = self.state.stall_ms.swap(0, Ordering::SeqCst);
        if stall_ms > 0 {
            debug!(stall_ms, "Simulated read stalled");
            std::thread::sleep(Duration::from_millis(stall_ms));
        }

        if !self.state.streaming.load(Ordering::SeqCst) {
            return Err(CameraError::AcquisitionError("device is not streaming".into()));
        }

        if self.state.failing_reads.load(Ordering::SeqCst) {
            return Err(CameraError::AcquisitionError("simulated read failure".into()));
        }
        let pending = self.state.fail_reads.load(Ordering::SeqCst);
        if pending > 0 {
            self.state.fail_reads.store(pending - 1, Ordering::SeqCst);
            return Err(CameraError::AcquisitionError("simulated read failure".into()));
        }

        Ok(self.render(mode.resolution()))
    }

    fn capture_file(&mut self, path: &Path, quality: u8) -> CameraResult<()> {
        let mode = self.current_mode()?;
        if mode.is_preview() || !self.state.streaming.load(Ordering::SeqCst) {
            return Err(CameraError::CaptureFailure(
                "still capture needs a started still mode".into(),
            ));
        }
        if self.state.fail_still_capture.load(Ordering::SeqCst) {
            return Err(CameraError::CaptureFailure("simulated capture failure".into()));
        }

        let frame = self.render(mode.resolution());
        write_jpeg(&frame, path, quality)?;
        self.state.captures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_controls(&mut self, controls: &[CameraControl]) -> CameraResult<()> {
        lock(&self.state.controls).extend_from_slice(controls);
        Ok(())
    }
}

/// Gradient pattern shifted by `offset`, packed RGB
pub fn xor_gradient(resolution: Resolution, offset: u8) -> Vec<u8> {
    let w = resolution.width.max(1) as usize;
    let h = resolution.height.max(1) as usize;
    let mut data = Vec::with_capacity(resolution.rgb_len());
    for y in 0..resolution.height as usize {
        for x in 0..resolution.width as usize {
            data.push(((x * 255 / w) as u8) ^ offset);
            data.push(((y * 255 / h) as u8) ^ offset);
            data.push((((x + y) * 255 / (w + h)) as u8) ^ offset);
        }
    }
    data
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
