// SPDX-License-Identifier: GPL-3.0-only

//! Power state: active, standby and shutdown
//!
//! Standby blanks the backlight after a period without user activity or
//! device motion. A long press of the encoder button requests shutdown, which
//! is terminal.

use crate::backends::backlight::Backlight;
use crate::config::PowerSettings;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to; clones share the same time
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    Active,
    Standby,
    Shutdown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::Active => write!(f, "active"),
            PowerState::Standby => write!(f, "standby"),
            PowerState::Shutdown => write!(f, "shutdown"),
        }
    }
}

pub struct PowerController {
    state: PowerState,
    backlight: Box<dyn Backlight>,
    clock: Arc<dyn Clock>,
    standby_timeout: Duration,
    long_press: Duration,
    /// Restored on wake when the pre-standby level is unknown
    fallback_brightness: u32,
    last_activity: Instant,
    press_started: Option<Instant>,
    saved_brightness: Option<u32>,
}

impl PowerController {
    pub fn new(
        settings: &PowerSettings,
        fallback_brightness: u32,
        backlight: Box<dyn Backlight>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let last_activity = clock.now();
        info!(
            standby_timeout_s = settings.standby_timeout.as_secs_f32(),
            long_press_s = settings.long_press.as_secs_f32(),
            "Power controller ready"
        );
        Self {
            state: PowerState::Active,
            backlight,
            clock,
            standby_timeout: settings.standby_timeout,
            long_press: settings.long_press,
            fallback_brightness,
            last_activity,
            press_started: None,
            saved_brightness: None,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn is_standby(&self) -> bool {
        self.state == PowerState::Standby
    }

    pub fn is_shutdown(&self) -> bool {
        self.state == PowerState::Shutdown
    }

    /// Current backlight level, if readable
    pub fn brightness(&self) -> Option<u32> {
        self.backlight.brightness()
    }

    /// Record user activity; wakes from standby
    pub fn update_activity(&mut self) {
        self.last_activity = self.clock.now();
        if self.state == PowerState::Standby {
            self.wake();
        }
    }

    /// Enter standby if idle for longer than the timeout
    ///
    /// Motion counts as activity. Only acts while active; returns true when
    /// standby was entered.
    pub fn check_standby(&mut self, motion: bool) -> bool {
        if self.state != PowerState::Active {
            return false;
        }
        let now = self.clock.now();
        if motion {
            self.last_activity = now;
            return false;
        }
        if now.duration_since(self.last_activity) < self.standby_timeout {
            return false;
        }

        self.saved_brightness = self.backlight.brightness();
        self.set_backlight(0);
        self.state = PowerState::Standby;
        info!(saved_brightness = ?self.saved_brightness, "Entering standby");
        true
    }

    /// Set the active backlight level; ignored outside Active
    pub fn apply_brightness(&mut self, level: u32) {
        if self.state != PowerState::Active {
            return;
        }
        if self.backlight.brightness() != Some(level) {
            debug!(level, "Backlight level");
            self.set_backlight(level);
        }
    }

    pub fn encoder_button_pressed(&mut self) {
        match self.state {
            PowerState::Standby => {
                // Waking press never counts towards a long press
                self.press_started = None;
                self.update_activity();
            }
            PowerState::Active => {
                self.press_started = Some(self.clock.now());
                self.update_activity();
            }
            PowerState::Shutdown => {}
        }
    }

    /// Handle a button release after being held for `held`
    ///
    /// Returns true when this release requested shutdown; the caller then
    /// dispatches the scene shutdown event.
    pub fn encoder_button_released(&mut self, held: Duration) -> bool {
        if self.press_started.take().is_none() {
            return false;
        }
        if self.state == PowerState::Active && held >= self.long_press {
            info!(held_s = held.as_secs_f32(), "Long press, shutting down");
            self.request_shutdown();
            return true;
        }
        false
    }

    /// Move to Shutdown unconditionally
    pub fn request_shutdown(&mut self) {
        if self.state != PowerState::Shutdown {
            info!("Shutdown requested");
        }
        self.state = PowerState::Shutdown;
        self.press_started = None;
    }

    fn wake(&mut self) {
        let level = self.saved_brightness.take().unwrap_or(self.fallback_brightness);
        self.set_backlight(level);
        self.state = PowerState::Active;
        self.last_activity = self.clock.now();
        info!(level, "Waking from standby");
    }

    fn set_backlight(&mut self, level: u32) {
        if let Err(e) = self.backlight.set_brightness(level) {
            warn!(level, error = %e, "Failed to set backlight");
        }
    }
}
