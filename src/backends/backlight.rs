// SPDX-License-Identifier: GPL-3.0-only

//! Display backlight control via Linux sysfs
//!
//! Discovers the panel backlight at `/sys/class/backlight/*` and writes its
//! `brightness` file. Brightness values use the appliance scale 0..=255 and
//! are rescaled to the device's `max_brightness`.

use crate::config::DisplaySettings;
use crate::constants::display::AUTO_BRIGHTNESS_MAX_LUX;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Appliance-level full brightness
pub const FULL_SCALE: u32 = 255;

/// Panel brightness control
pub trait Backlight: Send {
    /// Current brightness on the 0..=255 scale, if readable
    fn brightness(&self) -> Option<u32>;

    /// Set brightness on the 0..=255 scale
    fn set_brightness(&mut self, value: u32) -> io::Result<()>;
}

/// How the active brightness is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessMode {
    Dark,
    Medium,
    Bright,
    /// Follow ambient light
    #[default]
    Auto,
}

impl BrightnessMode {
    /// Next mode: Auto -> Dark -> Medium -> Bright -> Auto
    pub fn next(self) -> Self {
        match self {
            BrightnessMode::Auto => BrightnessMode::Dark,
            BrightnessMode::Dark => BrightnessMode::Medium,
            BrightnessMode::Medium => BrightnessMode::Bright,
            BrightnessMode::Bright => BrightnessMode::Auto,
        }
    }
}

/// Logarithmic lux mapping: `min` in the dark, `max` at 500 lux and above
pub fn auto_brightness_from_lux(lux: f32, min: u32, max: u32) -> u32 {
    if lux < 1.0 {
        return min;
    }
    let span = max.saturating_sub(min) as f32;
    let level = min as f32 + span * (lux + 1.0).ln() / (AUTO_BRIGHTNESS_MAX_LUX + 1.0).ln();
    (level as u32).clamp(min, max)
}

/// Brightness to use while active
///
/// Auto mode without a light reading falls back to the medium level.
pub fn target_brightness(display: &DisplaySettings, lux: Option<f32>) -> u32 {
    match display.brightness_mode {
        BrightnessMode::Dark => display.brightness_dark,
        BrightnessMode::Medium => display.brightness_medium,
        BrightnessMode::Bright => display.brightness_bright,
        BrightnessMode::Auto => lux.map_or(display.brightness_medium, |lux| {
            auto_brightness_from_lux(lux, display.brightness_dark, display.brightness_bright)
        }),
    }
}

/// A backlight discovered via sysfs
#[derive(Debug, Clone)]
pub struct SysfsBacklight {
    /// e.g. `/sys/class/backlight/10-0045`
    path: PathBuf,
    max_brightness: u32,
    name: String,
}

impl SysfsBacklight {
    /// First writable backlight under `/sys/class/backlight`
    pub fn discover() -> Option<Self> {
        Self::discover_in(Path::new("/sys/class/backlight"))
    }

    pub fn discover_in(dir: &Path) -> Option<Self> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            warn!(dir = %dir.display(), "Cannot read backlight class, brightness control disabled");
            return None;
        };

        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            let max_path = path.join("max_brightness");
            let max_brightness = match std::fs::read_to_string(&max_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(path = %max_path.display(), "Invalid max_brightness value");
                        continue;
                    }
                },
                Err(e) => {
                    debug!(path = %max_path.display(), error = %e, "Cannot read max_brightness");
                    continue;
                }
            };

            if let Err(e) = std::fs::OpenOptions::new()
                .write(true)
                .open(path.join("brightness"))
            {
                warn!(path = %path.display(), error = %e, "Backlight not writable");
                continue;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!(name = %name, max_brightness, "Discovered backlight");
            return Some(Self {
                path,
                max_brightness,
                name,
            });
        }
        None
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Backlight for SysfsBacklight {
    fn brightness(&self) -> Option<u32> {
        let raw: u32 = std::fs::read_to_string(self.path.join("brightness"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        Some((raw * FULL_SCALE + self.max_brightness / 2) / self.max_brightness)
    }

    fn set_brightness(&mut self, value: u32) -> io::Result<()> {
        let raw = (value.min(FULL_SCALE) * self.max_brightness + FULL_SCALE / 2) / FULL_SCALE;
        std::fs::write(self.path.join("brightness"), raw.to_string())
    }
}

/// In-memory backlight for desktop runs and tests
///
/// Clones share the same value, so a test can keep one and hand the other
/// to the power controller.
#[derive(Debug, Clone)]
pub struct VirtualBacklight {
    value: Arc<AtomicU32>,
}

impl VirtualBacklight {
    pub fn new(initial: u32) -> Self {
        Self {
            value: Arc::new(AtomicU32::new(initial.min(FULL_SCALE))),
        }
    }

    pub fn value(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }
}

impl Backlight for VirtualBacklight {
    fn brightness(&self) -> Option<u32> {
        Some(self.value())
    }

    fn set_brightness(&mut self, value: u32) -> io::Result<()> {
        self.value.store(value.min(FULL_SCALE), Ordering::SeqCst);
        Ok(())
    }
}

/// Sysfs backlight if present, otherwise a virtual one
pub fn open_backlight(initial: u32) -> Box<dyn Backlight> {
    match SysfsBacklight::discover() {
        Some(bl) => Box::new(bl),
        None => Box::new(VirtualBacklight::new(initial)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonConfigStore;

    #[test]
    fn test_auto_brightness_curve() {
        assert_eq!(auto_brightness_from_lux(0.5, 40, 220), 40);
        assert_eq!(auto_brightness_from_lux(500.0, 40, 220), 220);
        assert_eq!(auto_brightness_from_lux(100_000.0, 40, 220), 220);
        let mid = auto_brightness_from_lux(20.0, 40, 220);
        assert!(mid > 40 && mid < 220);
        assert!(auto_brightness_from_lux(100.0, 40, 220) > mid);
    }

    #[test]
    fn test_target_brightness_modes() {
        let mut display = DisplaySettings::from_config(&JsonConfigStore::in_memory());
        display.brightness_mode = BrightnessMode::Auto;
        assert_eq!(target_brightness(&display, None), 120);
        assert_eq!(target_brightness(&display, Some(0.0)), 40);
        display.brightness_mode = BrightnessMode::Bright;
        assert_eq!(target_brightness(&display, Some(0.0)), 220);
    }

    #[test]
    fn test_sysfs_backlight_scaling() {
        let dir = tempfile::tempdir().unwrap();
        let panel = dir.path().join("10-0045");
        std::fs::create_dir_all(&panel).unwrap();
        std::fs::write(panel.join("max_brightness"), "31\n").unwrap();
        std::fs::write(panel.join("brightness"), "31\n").unwrap();

        let mut bl = SysfsBacklight::discover_in(dir.path()).unwrap();
        assert_eq!(bl.name(), "10-0045");
        assert_eq!(bl.brightness(), Some(255));

        bl.set_brightness(0).unwrap();
        assert_eq!(std::fs::read_to_string(panel.join("brightness")).unwrap(), "0");
        bl.set_brightness(128).unwrap();
        assert_eq!(std::fs::read_to_string(panel.join("brightness")).unwrap(), "16");
    }

    #[test]
    fn test_virtual_backlight_shares_value() {
        let observer = VirtualBacklight::new(100);
        let mut owned: Box<dyn Backlight> = Box::new(observer.clone());
        owned.set_brightness(300).unwrap();
        assert_eq!(observer.value(), 255);
    }
}
