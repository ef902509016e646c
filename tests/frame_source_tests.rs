// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the camera frame source

use pocketcam::backends::camera::simulated::{SimulatedCamera, SimulatedCameraHandle};
use pocketcam::backends::camera::source::FrameSource;
use pocketcam::backends::camera::{CameraDevice, Frame, Resolution, StreamMode};
use pocketcam::config::CameraSettings;
use pocketcam::errors::CameraError;
use std::time::{Duration, Instant};

fn settings() -> CameraSettings {
    CameraSettings {
        preview: Resolution::new(32, 24),
        preview_fps: 100,
        capture: Resolution::new(64, 48),
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
    .expect("simulated camera opens");
    (source, handle)
}

fn wait_for_frame_after(source: &FrameSource, generation: u64) -> Option<Frame> {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if let Some(frame) = source.get_preview_frame()
            && frame.generation > generation
        {
            return Some(frame);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    None
}

#[test]
fn test_acquisition_recovers_after_read_failures() {
    let (mut source, handle) = open_simulated();
    handle.hold_read_failures(true);
    source.start_preview().unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    while handle.read_count() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(handle.read_count() >= 2);
    assert!(source.consecutive_errors() > 0);
    assert!(source.get_preview_frame().is_none());
    assert!(source.is_previewing());

    handle.hold_read_failures(false);
    let frame = wait_for_frame_after(&source, 0).expect("frames after transient failures");
    assert_eq!(frame.resolution(), Resolution::new(32, 24));
    assert!(frame.is_well_formed());
    assert_eq!(source.consecutive_errors(), 0);
}

#[test]
fn test_preview_frame_is_none_before_start() {
    let (source, _handle) = open_simulated();
    assert!(!source.is_previewing());
    assert!(source.get_preview_frame().is_none());
    assert!(source.capture_array().is_none());
}

#[test]
fn test_capture_while_previewing_restores_preview() {
    let dir = tempfile::tempdir().unwrap();
    let (mut source, handle) = open_simulated();
    source.start_preview().unwrap();
    let before = wait_for_frame_after(&source, 0).unwrap();

    let target = dir.path().join("still.jpg");
    let saved = source.capture_photo(&target, 90).unwrap();

    assert_eq!(saved, target);
    let decoded = image::open(&saved).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
    assert_eq!(handle.capture_count(), 1);

    assert!(source.is_previewing());
    assert!(matches!(handle.mode(), Some(StreamMode::Preview { .. })));
    assert!(wait_for_frame_after(&source, before.generation).is_some());
}

#[test]
fn test_failed_capture_restores_preview() {
    let dir = tempfile::tempdir().unwrap();
    let (mut source, handle) = open_simulated();
    source.start_preview().unwrap();
    let before = wait_for_frame_after(&source, 0).unwrap();

    handle.fail_still_capture(true);
    let result = source.capture_photo(&dir.path().join("x.jpg"), 90);
    assert!(matches!(result, Err(CameraError::CaptureFailure(_))));
    assert!(!dir.path().join("x.jpg").exists());

    assert!(source.is_previewing());
    assert!(handle.is_streaming());
    assert!(matches!(handle.mode(), Some(StreamMode::Preview { .. })));
    assert!(wait_for_frame_after(&source, before.generation).is_some());
}

#[test]
fn test_rejected_still_mode_restores_preview() {
    let dir = tempfile::tempdir().unwrap();
    let (mut source, handle) = open_simulated();
    source.start_preview().unwrap();

    handle.fail_still_configure(true);
    let result = source.capture_photo(&dir.path().join("x.jpg"), 90);
    assert!(matches!(result, Err(CameraError::CaptureFailure(_))));
    assert!(source.is_previewing());
    assert!(matches!(handle.mode(), Some(StreamMode::Preview { .. })));
}

#[test]
fn test_frames_are_not_shared_with_producer() {
    let (mut source, _handle) = open_simulated();
    source.start_preview().unwrap();
    let first = wait_for_frame_after(&source, 0).unwrap();
    let second = wait_for_frame_after(&source, first.generation).unwrap();
    assert!(!first.shares_buffer_with(&second));
    // A held frame is unaffected by later acquisitions
    assert_eq!(first.data.len(), 32 * 24 * 3);
}
