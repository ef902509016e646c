// SPDX-License-Identifier: GPL-3.0-only

//! Frame source: device ownership, preview acquisition and still capture
//!
//! While preview runs, the acquisition thread owns the device outright and
//! reads without holding any lock the orchestrator could wait on. Control
//! changes reach it over a channel and are applied between reads. When the
//! thread exits, its worker stops the device and parks it back for still
//! capture and the next preview start.
//!
//! Frames are published into a single slot; a newer frame replaces the older
//! one, nothing queues.

use super::CameraDevice;
use super::types::{CameraControl, CameraResult, Frame, StreamMode};
use crate::backends::loop_controller::LoopController;
use crate::config::CameraSettings;
use crate::constants::camera::{
    ACQUISITION_RETRY_DELAY, ERROR_LOG_BURST, ERROR_LOG_INTERVAL, INIT_ATTEMPTS, INIT_BACKOFF,
    STILL_SETTLE_DELAY,
};
use crate::constants::timing::LOOP_JOIN_TIMEOUT;
use crate::errors::CameraError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Device slot; `None` while the acquisition worker holds the device
type ParkedDevice = Arc<Mutex<Option<Box<dyn CameraDevice>>>>;

/// Latest-frame slot shared with the acquisition thread
#[derive(Default)]
struct FrameSlot {
    latest: Mutex<Option<Frame>>,
}

impl FrameSlot {
    fn publish(&self, frame: Frame) {
        *self.lock() = Some(frame);
    }

    /// Copy of the latest frame. The writer only holds the lock for a swap.
    fn peek(&self) -> Option<Frame> {
        self.lock().clone()
    }

    fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counters shared between the acquisition loop and readers
#[derive(Default)]
struct AcquisitionStats {
    consecutive_errors: AtomicU64,
    generation: AtomicU64,
}

/// Running preview: the loop thread and its control channel
struct Acquisition {
    controller: LoopController,
    controls: Sender<Vec<CameraControl>>,
}

/// Owns the capture device and its preview acquisition loop
pub struct FrameSource {
    device: ParkedDevice,
    device_name: String,
    preview_mode: StreamMode,
    still_mode: StreamMode,
    slot: Arc<FrameSlot>,
    stats: Arc<AcquisitionStats>,
    acquisition: Option<Acquisition>,
}

impl FrameSource {
    /// Construct the device and configure it for preview
    ///
    /// `factory` is called up to three times, 350 ms apart. Failing every
    /// attempt yields [`CameraError::HardwareUnavailable`], which callers
    /// treat as fatal.
    pub fn open<F>(factory: F, settings: &CameraSettings) -> CameraResult<Self>
    where
        F: FnMut() -> CameraResult<Box<dyn CameraDevice>>,
    {
        Self::open_with_retry(factory, settings, INIT_ATTEMPTS, INIT_BACKOFF)
    }

    /// [`FrameSource::open`] with explicit retry parameters
    pub fn open_with_retry<F>(
        mut factory: F,
        settings: &CameraSettings,
        attempts: u32,
        backoff: Duration,
    ) -> CameraResult<Self>
    where
        F: FnMut() -> CameraResult<Box<dyn CameraDevice>>,
    {
        let preview_mode = settings.preview_mode();
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=attempts.max(1) {
            let opened = factory().and_then(|mut device| {
                device.configure(preview_mode)?;
                Ok(device)
            });

            match opened {
                Ok(device) => {
                    let device_name = device.name().to_string();
                    info!(device = %device_name, attempt, mode = ?preview_mode, "Camera ready");
                    return Ok(Self {
                        device: Arc::new(Mutex::new(Some(device))),
                        device_name,
                        preview_mode,
                        still_mode: settings.still_mode(),
                        slot: Arc::new(FrameSlot::default()),
                        stats: Arc::new(AcquisitionStats::default()),
                        acquisition: None,
                    });
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Camera initialization failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        std::thread::sleep(backoff);
                    }
                }
            }
        }

        error!(attempts, error = %last_error, "Camera unavailable, giving up");
        Err(CameraError::HardwareUnavailable(last_error))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_previewing(&self) -> bool {
        self.acquisition.is_some()
    }

    /// Read failures since the last successful frame
    pub fn consecutive_errors(&self) -> u64 {
        self.stats.consecutive_errors.load(Ordering::SeqCst)
    }

    /// Generation of the most recently published frame (0 before the first)
    pub fn latest_generation(&self) -> u64 {
        self.stats.generation.load(Ordering::SeqCst)
    }

    /// Start streaming and the acquisition loop. No-op while already previewing.
    ///
    /// Fails with [`CameraError::Device`] while a previous acquisition thread
    /// still holds the device, or when the thread cannot be spawned.
    pub fn start_preview(&mut self) -> CameraResult<()> {
        if self.acquisition.is_some() {
            return Ok(());
        }

        let mut device = self.lock_parked().take().ok_or_else(busy)?;
        if let Err(e) = device.start() {
            *self.lock_parked() = Some(device);
            return Err(e);
        }
        self.slot.clear();
        self.stats.consecutive_errors.store(0, Ordering::SeqCst);

        let (controls_tx, controls_rx) = mpsc::channel();
        let mut worker = AcquisitionWorker {
            device: Some(device),
            parked: Arc::clone(&self.device),
            controls: controls_rx,
            slot: Arc::clone(&self.slot),
            stats: Arc::clone(&self.stats),
        };
        // On spawn failure the closure is dropped here and the worker parks
        // the stopped device again.
        let controller =
            LoopController::start("camera-acquisition", move || worker.acquire_once())
                .map_err(|e| CameraError::Device(format!("acquisition thread: {}", e)))?;

        self.acquisition = Some(Acquisition {
            controller,
            controls: controls_tx,
        });
        info!(device = %self.device_name, "Preview started");
        Ok(())
    }

    /// Stop the acquisition loop. Always returns within the loop join
    /// timeout; device errors are logged by the worker.
    pub fn stop_preview(&mut self) {
        let Some(mut acquisition) = self.acquisition.take() else {
            return;
        };

        if !acquisition.controller.stop(LOOP_JOIN_TIMEOUT) {
            warn!(
                device = %self.device_name,
                "Frame read still pending, device is released when it returns"
            );
        }
        self.slot.clear();
        info!(device = %self.device_name, "Preview stopped");
    }

    /// Latest preview frame, `None` before the first frame or when stopped
    pub fn get_preview_frame(&self) -> Option<Frame> {
        if self.acquisition.is_none() {
            return None;
        }
        self.slot.peek()
    }

    /// Latest live frame for the preview capture path
    pub fn capture_array(&self) -> Option<Frame> {
        self.get_preview_frame()
    }

    /// Full-resolution still capture to `path`
    ///
    /// Preview is paused for the duration and resumed afterwards if it was
    /// running, whether or not the capture succeeded.
    pub fn capture_photo(&mut self, path: &Path, quality: u8) -> CameraResult<PathBuf> {
        let was_previewing = self.is_previewing();
        if was_previewing {
            self.stop_preview();
        }

        info!(path = %path.display(), mode = ?self.still_mode, "Capturing still");
        let result = self.run_still_sequence(path, quality);

        if let Err(e) = &result {
            warn!(error = %e, "Still capture failed, restoring preview");
            if let Some(device) = self.lock_parked().as_mut()
                && let Err(stop_err) = device.stop()
            {
                debug!(error = %stop_err, "Device stop after failed capture");
            }
        }

        if let Err(restore_err) = self.restore_preview(was_previewing) {
            error!(error = %restore_err, "Could not restore preview after capture");
        }

        match result {
            Ok(()) => {
                info!(path = %path.display(), "Still captured");
                Ok(path.to_path_buf())
            }
            Err(CameraError::CaptureFailure(msg)) => Err(CameraError::CaptureFailure(msg)),
            Err(e) => Err(CameraError::CaptureFailure(e.to_string())),
        }
    }

    /// Apply advisory controls; failures are logged and otherwise ignored
    ///
    /// Never waits on a frame read: during preview the controls are queued
    /// for the acquisition thread.
    pub fn set_controls(&self, controls: &[CameraControl]) {
        if controls.is_empty() {
            return;
        }
        if let Some(acquisition) = &self.acquisition {
            if acquisition.controls.send(controls.to_vec()).is_err() {
                warn!(device = %self.device_name, "Acquisition gone, controls dropped");
            }
            return;
        }

        match self.lock_parked().as_mut() {
            Some(device) => {
                if let Err(e) = device.set_controls(controls) {
                    warn!(device = %self.device_name, error = %e, "Camera controls not applied");
                }
            }
            None => warn!(device = %self.device_name, "Camera busy, controls dropped"),
        }
    }

    fn run_still_sequence(&self, path: &Path, quality: u8) -> CameraResult<()> {
        let mut parked = self.lock_parked();
        let device = parked.as_mut().ok_or_else(busy)?;
        device.configure(self.still_mode)?;
        device.start()?;
        std::thread::sleep(STILL_SETTLE_DELAY);
        device.capture_file(path, quality)?;
        device.stop()
    }

    fn restore_preview(&mut self, restart: bool) -> CameraResult<()> {
        self.lock_parked()
            .as_mut()
            .ok_or_else(busy)?
            .configure(self.preview_mode)?;
        if restart {
            self.start_preview()?;
        }
        Ok(())
    }

    fn lock_parked(&self) -> MutexGuard<'_, Option<Box<dyn CameraDevice>>> {
        self.device
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop_preview();
    }
}

fn busy() -> CameraError {
    CameraError::Device("camera is still held by acquisition".into())
}

/// State moved onto the acquisition thread for one preview session
struct AcquisitionWorker {
    device: Option<Box<dyn CameraDevice>>,
    parked: ParkedDevice,
    controls: Receiver<Vec<CameraControl>>,
    slot: Arc<FrameSlot>,
    stats: Arc<AcquisitionStats>,
}

impl AcquisitionWorker {
    /// One acquisition-loop iteration
    fn acquire_once(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        apply_pending_controls(device.as_mut(), &self.controls);

        match device.read_frame() {
            Ok(mut frame) => {
                frame.generation = self.stats.generation.fetch_add(1, Ordering::SeqCst) + 1;
                self.slot.publish(frame);
                self.stats.consecutive_errors.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                let count = self.stats.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                if count <= ERROR_LOG_BURST || count % ERROR_LOG_INTERVAL == 0 {
                    warn!(consecutive = count, error = %e, "Frame read failed");
                }
                std::thread::sleep(ACQUISITION_RETRY_DELAY);
            }
        }
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };
        apply_pending_controls(device.as_mut(), &self.controls);
        if let Err(e) = device.stop() {
            warn!(device = %device.name(), error = %e, "Device stop failed");
        }
        debug!(device = %device.name(), "Device parked");
        *self
            .parked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(device);
    }
}

fn apply_pending_controls(device: &mut dyn CameraDevice, pending: &Receiver<Vec<CameraControl>>) {
    for controls in pending.try_iter() {
        if let Err(e) = device.set_controls(&controls) {
            warn!(device = %device.name(), error = %e, "Camera controls not applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::simulated::{SimulatedCamera, SimulatedCameraHandle};
    use crate::backends::camera::types::Resolution;
    use std::time::Instant;

    fn settings() -> CameraSettings {
        CameraSettings {
            preview: Resolution::new(16, 12),
            preview_fps: 100,
            capture: Resolution::new(32, 24),
            ..CameraSettings::default()
        }
    }

    fn open_simulated() -> (FrameSource, SimulatedCameraHandle) {
        let (camera, handle) = SimulatedCamera::with_handle();
        let mut camera = Some(camera);
        let source = FrameSource::open(
            move || {
                camera
                    .take()
                    .map(|c| Box::new(c) as Box<dyn CameraDevice>)
                    .ok_or_else(|| CameraError::Device("already taken".into()))
            },
            &settings(),
        )
        .unwrap();
        (source, handle)
    }

    fn wait_for_frame(source: &FrameSource) -> Option<Frame> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(frame) = source.get_preview_frame() {
                return Some(frame);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_open_retries_then_succeeds() {
        let mut calls = 0;
        let source = FrameSource::open_with_retry(
            || {
                calls += 1;
                if calls < 3 {
                    Err(CameraError::Device("busy".into()))
                } else {
                    Ok(Box::new(SimulatedCamera::new()) as Box<dyn CameraDevice>)
                }
            },
            &settings(),
            3,
            Duration::from_millis(1),
        );
        assert!(source.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_open_gives_up_after_three_attempts() {
        let mut calls = 0;
        let started = Instant::now();
        let result = FrameSource::open(
            || {
                calls += 1;
                Err(CameraError::Device("no sensor".into()))
            },
            &settings(),
        );
        assert!(matches!(result, Err(CameraError::HardwareUnavailable(_))));
        assert_eq!(calls, 3);
        assert!(started.elapsed() >= INIT_BACKOFF * 2);
    }

    #[test]
    fn test_preview_start_and_stop_are_idempotent() {
        let (mut source, handle) = open_simulated();
        source.start_preview().unwrap();
        source.start_preview().unwrap();
        assert_eq!(handle.start_count(), 1);

        assert!(wait_for_frame(&source).is_some());

        source.stop_preview();
        source.stop_preview();
        assert_eq!(handle.stop_count(), 1);
        assert!(source.get_preview_frame().is_none());
    }

    #[test]
    fn test_stop_preview_swallows_device_error() {
        let (mut source, handle) = open_simulated();
        source.start_preview().unwrap();
        handle.fail_stop(true);
        source.stop_preview();
        assert!(!source.is_previewing());
    }

    #[test]
    fn test_generations_increase() {
        let (mut source, _handle) = open_simulated();
        source.start_preview().unwrap();
        let first = wait_for_frame(&source).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut later = first.clone();
        while later.generation == first.generation && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            later = source.get_preview_frame().unwrap_or(later);
        }
        assert!(later.generation > first.generation);
    }

    #[test]
    fn test_set_controls_reaches_device() {
        let (source, handle) = open_simulated();
        source.set_controls(&[CameraControl::Brightness(10)]);
        assert_eq!(handle.applied_controls(), vec![CameraControl::Brightness(10)]);
    }

    #[test]
    fn test_controls_during_preview_reach_device() {
        let (mut source, handle) = open_simulated();
        source.start_preview().unwrap();
        source.set_controls(&[CameraControl::Contrast(4)]);

        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.applied_controls().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.applied_controls(), vec![CameraControl::Contrast(4)]);
    }

    #[test]
    fn test_stalled_read_blocks_neither_controls_nor_stop() {
        let (mut source, handle) = open_simulated();
        handle.stall_next_read(Duration::from_secs(2));
        source.start_preview().unwrap();
        while handle.read_count() == 0 {
            std::thread::sleep(Duration::from_millis(2));
        }

        let started = Instant::now();
        source.set_controls(&[CameraControl::Brightness(-5)]);
        assert!(started.elapsed() < Duration::from_millis(100));

        let started = Instant::now();
        source.stop_preview();
        assert!(started.elapsed() < LOOP_JOIN_TIMEOUT + Duration::from_millis(300));
        assert!(!source.is_previewing());

        // The device is still inside the stalled read
        assert!(matches!(source.start_preview(), Err(CameraError::Device(_))));
        assert!(!source.is_previewing());

        let deadline = Instant::now() + Duration::from_secs(4);
        while handle.stop_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.stop_count(), 1);
        assert_eq!(
            handle.applied_controls(),
            vec![CameraControl::Brightness(-5)]
        );

        source.start_preview().unwrap();
        assert!(wait_for_frame(&source).is_some());
    }

    #[test]
    fn test_peek_sees_frame_while_publisher_is_busy() {
        let slot = Arc::new(FrameSlot::default());
        slot.publish(Frame::new(2, 2, vec![0; 12]));

        let writer = Arc::clone(&slot);
        let publisher = std::thread::spawn(move || {
            let until = Instant::now() + Duration::from_millis(150);
            while Instant::now() < until {
                writer.publish(Frame::new(2, 2, vec![7; 12]));
            }
        });

        let until = Instant::now() + Duration::from_millis(100);
        while Instant::now() < until {
            assert!(slot.peek().is_some());
        }
        publisher.join().unwrap();
    }

    #[test]
    fn test_capture_photo_without_preview_leaves_it_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut source, handle) = open_simulated();
        let path = dir.path().join("still.jpg");
        source.capture_photo(&path, 85).unwrap();
        assert!(path.exists());
        assert!(!source.is_previewing());
        assert!(!handle.is_streaming());
        assert!(handle.mode().is_some_and(|m| m.is_preview()));
    }
}
