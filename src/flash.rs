// SPDX-License-Identifier: GPL-3.0-only

//! Flash LED control
//!
//! Discovers flash LEDs exposed at `/sys/class/leds/*:flash` and drives them
//! through the `brightness` file. [`FlashController`] wraps any [`FlashLight`]
//! with a watchdog deadline: the LED is forced off once it has been lit for
//! longer than the configured maximum, checked by [`FlashController::poll`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Flash operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    /// Flash LED is off
    #[default]
    Off,
    /// Flash fires for every capture
    On,
    /// Flash fires when the scene is darker than the configured threshold
    Auto,
}

impl FlashMode {
    /// Cycle to the next mode: Off -> On -> Auto -> Off
    pub fn next(self) -> Self {
        match self {
            FlashMode::Off => FlashMode::On,
            FlashMode::On => FlashMode::Auto,
            FlashMode::Auto => FlashMode::Off,
        }
    }
}

impl fmt::Display for FlashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlashMode::Off => "off",
            FlashMode::On => "on",
            FlashMode::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// Whether a capture should use the flash
///
/// Auto needs a light reading: with no reading the flash stays off.
pub fn should_fire(mode: FlashMode, lux: Option<f32>, threshold_lux: f32) -> bool {
    match mode {
        FlashMode::Off => false,
        FlashMode::On => true,
        FlashMode::Auto => lux.is_some_and(|lux| lux < threshold_lux),
    }
}

/// Something that can be switched on and off. Both calls are idempotent.
pub trait FlashLight: Send {
    fn on(&mut self) -> io::Result<()>;
    fn off(&mut self) -> io::Result<()>;
}

/// A flash LED device discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    max_brightness: u32,
    name: String,
}

impl FlashDevice {
    /// Scan `dir` for entries matching `*:flash` that we can write to
    pub fn discover_in(dir: &Path) -> Vec<FlashDevice> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "Cannot read LED class, flash discovery skipped");
            return Vec::new();
        };

        let mut devices = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };
            if !name_str.ends_with(":flash") {
                continue;
            }

            let led_path = entry.path();
            let max_brightness_path = led_path.join("max_brightness");
            let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(path = %max_brightness_path.display(), "Invalid max_brightness value");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        path = %max_brightness_path.display(),
                        error = %e,
                        "Cannot read max_brightness"
                    );
                    continue;
                }
            };

            let brightness_path = led_path.join("brightness");
            if let Err(e) = std::fs::OpenOptions::new()
                .write(true)
                .open(&brightness_path)
            {
                warn!(path = %brightness_path.display(), error = %e, "Flash LED found but not writable");
                continue;
            }

            info!(name = name_str, max_brightness, "Discovered flash LED");
            devices.push(FlashDevice {
                path: led_path,
                max_brightness,
                name: name_str.to_string(),
            });
        }

        // white before yellow
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }
}

/// All `*:flash` LEDs driven together
#[derive(Debug, Clone, Default)]
pub struct SysfsFlash {
    devices: Vec<FlashDevice>,
}

impl SysfsFlash {
    pub fn discover() -> Self {
        Self::discover_in(Path::new("/sys/class/leds"))
    }

    pub fn discover_in(dir: &Path) -> Self {
        Self {
            devices: FlashDevice::discover_in(dir),
        }
    }

    pub fn has_devices(&self) -> bool {
        !self.devices.is_empty()
    }

    fn set_all(&self, on: bool) -> io::Result<()> {
        let mut first_err = None;
        for dev in &self.devices {
            let value = if on { dev.max_brightness } else { 0 };
            if let Err(e) = dev.set_brightness(value) {
                warn!(device = %dev.name, error = %e, on, "Failed to switch flash LED");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl FlashLight for SysfsFlash {
    fn on(&mut self) -> io::Result<()> {
        self.set_all(true)
    }

    fn off(&mut self) -> io::Result<()> {
        self.set_all(false)
    }
}

/// In-memory flash for desktop runs and tests; clones share state
#[derive(Debug, Clone, Default)]
pub struct VirtualFlash {
    lit: Arc<AtomicBool>,
    fired: Arc<AtomicU32>,
    stuck: Arc<AtomicBool>,
}

impl VirtualFlash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lit(&self) -> bool {
        self.lit.load(Ordering::SeqCst)
    }

    /// Number of off -> on edges seen
    pub fn fire_count(&self) -> u32 {
        self.fired.load(Ordering::SeqCst)
    }

    /// While set, `off()` fails and the LED stays lit
    pub fn fail_off(&self, fail: bool) {
        self.stuck.store(fail, Ordering::SeqCst);
    }
}

impl FlashLight for VirtualFlash {
    fn on(&mut self) -> io::Result<()> {
        if !self.lit.swap(true, Ordering::SeqCst) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn off(&mut self) -> io::Result<()> {
        if self.stuck.load(Ordering::SeqCst) {
            return Err(io::Error::other("virtual flash stuck on"));
        }
        self.lit.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Sysfs flash if any LED is present, otherwise a virtual one
pub fn open_flash() -> Box<dyn FlashLight> {
    let sysfs = SysfsFlash::discover();
    if sysfs.has_devices() {
        Box::new(sysfs)
    } else {
        Box::new(VirtualFlash::new())
    }
}

/// Flash LED guarded by a maximum on-time
pub struct FlashController {
    light: Box<dyn FlashLight>,
    max_on: Duration,
    /// Set while lit; cleared only once `off()` succeeds
    deadline: Option<Instant>,
}

impl FlashController {
    pub fn new(light: Box<dyn FlashLight>, max_on: Duration) -> Self {
        Self {
            light,
            max_on,
            deadline: None,
        }
    }

    /// Light the LED and arm the watchdog; re-arming while lit keeps the
    /// original deadline
    pub fn on(&mut self, now: Instant) {
        if let Err(e) = self.light.on() {
            warn!(error = %e, "Flash on failed");
        }
        if self.deadline.is_none() {
            self.deadline = Some(now + self.max_on);
        }
    }

    /// Switch off and disarm. A failed switch-off stays armed so the next
    /// poll retries it.
    pub fn off(&mut self) {
        match self.light.off() {
            Ok(()) => self.deadline = None,
            Err(e) => warn!(error = %e, "Flash off failed"),
        }
    }

    /// Force the LED off if it outlived its deadline. Returns true when the
    /// watchdog fired.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                warn!(max_on_ms = self.max_on.as_millis() as u64, "Flash watchdog expired, forcing off");
                self.off();
                true
            }
            _ => false,
        }
    }

    pub fn is_lit(&self) -> bool {
        self.deadline.is_some()
    }
}

impl Drop for FlashController {
    fn drop(&mut self) {
        if self.deadline.is_some() {
            self.off();
        }
    }
}
