// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Camera bring-up and acquisition timing
pub mod camera {
    use super::Duration;

    /// Device construction attempts before giving up
    pub const INIT_ATTEMPTS: u32 = 3;

    /// Delay between device construction attempts
    pub const INIT_BACKOFF: Duration = Duration::from_millis(350);

    /// Pause after a failed frame read before the next attempt
    pub const ACQUISITION_RETRY_DELAY: Duration = Duration::from_millis(10);

    /// Every read error is logged up to this count
    pub const ERROR_LOG_BURST: u64 = 5;

    /// After the burst, only every Nth error is logged
    pub const ERROR_LOG_INTERVAL: u64 = 30;

    /// Sensor settle time between still-mode start and capture
    pub const STILL_SETTLE_DELAY: Duration = Duration::from_millis(200);

    /// V4L2 mmap buffers per stream
    pub const STREAM_BUFFERS: u32 = 4;

    /// Longest a single buffer dequeue may block
    pub const READ_TIMEOUT: Duration = Duration::from_millis(400);
}

/// Background thread bookkeeping
pub mod timing {
    use super::Duration;

    /// How long `stop()` waits for a background loop before detaching it
    pub const LOOP_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

    /// Sensor poller stop timeout
    pub const SENSOR_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

    /// Poll step while waiting for a thread to finish
    pub const JOIN_POLL_STEP: Duration = Duration::from_millis(5);
}

/// Sensor cadences
pub mod sensors {
    use super::Duration;

    /// Poller loop tick
    pub const TICK: Duration = Duration::from_millis(10);

    pub const ILLUMINANCE_INTERVAL: Duration = Duration::from_millis(200);
    pub const TILT_INTERVAL: Duration = Duration::from_millis(50);
    pub const BATTERY_INTERVAL: Duration = Duration::from_millis(1000);

    /// Moving-average window for lux readings
    pub const LUX_WINDOW: usize = 5;

    /// Moving-average window for tilt readings
    pub const TILT_WINDOW: usize = 10;

    /// Tilt readings are clamped to +/- this many degrees
    pub const TILT_LIMIT_DEG: f32 = 90.0;
}

/// Orchestrator cadences
pub mod orchestrator {
    use super::Duration;

    /// Interval between standby checks
    pub const STANDBY_CHECK_INTERVAL: Duration = Duration::from_secs(2);

    /// Tilt change between standby checks that counts as motion
    pub const MOTION_TILT_DELTA_DEG: f32 = 3.0;

    /// Interval between health file writes
    pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

    /// Flash lead time before and after the exposure
    pub const FLASH_LEAD: Duration = Duration::from_millis(50);
}

/// Display geometry of the appliance panel (portrait, logical)
pub mod display {
    pub const LOGICAL_WIDTH: u32 = 480;
    pub const LOGICAL_HEIGHT: u32 = 800;

    /// Auto brightness saturates at this illuminance
    pub const AUTO_BRIGHTNESS_MAX_LUX: f32 = 500.0;
}

/// File names used by the storage layer
pub mod file_formats {
    /// Extensions counted as photos for retention
    pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

    /// Prefix of generated photo file names
    pub const PHOTO_PREFIX: &str = "photo_";

    /// chrono format for the timestamp part of photo names
    pub const PHOTO_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
}

/// Application identity, used for data directories
pub const APP_DIR_NAME: &str = "pocketcam";
