// SPDX-License-Identifier: GPL-3.0-only

//! Per-tick driver tying camera, filters, sensors and the two state machines
//!
//! Each tick:
//!
//! 1. Power in shutdown: run the shutdown sequence and stop
//! 2. Every two seconds: feed the standby check with tilt-derived motion and
//!    refresh the backlight level
//! 3. Drain queued input. In standby, input only wakes the device
//! 4. Present the latest filtered preview frame, or blank the sink in standby
//! 5. Service a pending capture (camera scene only), with flash
//! 6. Flash watchdog and periodic health report
//!
//! `capture_photo` blocks the tick for the duration of a still capture.

use crate::app::health::{FpsMeter, HealthReporter, HealthStatus};
use crate::app::power::PowerController;
use crate::app::state::{AppEvent, AppState, AppStateMachine};
use crate::app::touch::map_touch;
use crate::backends::backlight::target_brightness;
use crate::backends::camera::{CameraResult, Frame, FrameSource, Resolution};
use crate::backends::sensors::SensorPoller;
use crate::config::{
    CameraSettings, CaptureMode, ConfigExt, ConfigProvider, DisplaySettings, FilterSettings,
    FlashSettings, PowerSettings, StorageSettings,
};
use crate::constants::orchestrator::{
    FLASH_LEAD, HEALTH_INTERVAL, MOTION_TILT_DELTA_DEG, STANDBY_CHECK_INTERVAL,
};
use crate::errors::{AppError, CameraError};
use crate::flash::{FlashController, should_fire};
use crate::haptic::{Haptic, HapticEffect};
use crate::pipelines::filters::{FilterPipeline, ISO_VALUES};
use crate::storage::PhotoStorage;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Rendering collaborator
pub trait FrameSink: Send {
    /// Show a processed frame; scaling to `target` is the sink's job
    fn present(&mut self, frame: &Frame, target: Resolution);

    /// Turn the screen black
    fn blank(&mut self);
}

/// Sink that discards frames, for headless runs
#[derive(Debug, Default)]
pub struct NullSink {
    presented: u64,
    blanked: u64,
}

impl NullSink {
    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn blanked(&self) -> u64 {
        self.blanked
    }
}

impl FrameSink for NullSink {
    fn present(&mut self, frame: &Frame, target: Resolution) {
        self.presented += 1;
        if self.presented % 240 == 1 {
            debug!(frame = %frame.resolution(), %target, generation = frame.generation, "Presenting");
        }
    }

    fn blank(&mut self) {
        self.blanked += 1;
    }
}

/// UI-level action, already resolved from touch geometry or keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Navigate(AppEvent),
    Capture,
    CycleFlash,
    CycleFilter,
    CycleBrightness,
    SetIso(u32),
    Quit,
}

/// Raw input delivered to the orchestrator's queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Touch at panel coordinates, with the action hit-testing resolved
    Touch { x: i32, y: i32, action: Option<Action> },
    /// Key or other pre-resolved input
    Action(Action),
    /// Hardware shutter button
    Shutter,
    EncoderPressed,
    EncoderReleased { held: Duration },
    /// Encoder detents, positive clockwise
    EncoderRotated(i32),
}

/// One still capture, built per trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub use_flash: bool,
    pub mode: CaptureMode,
    pub quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stopped,
}

/// Everything the orchestrator drives
pub struct Components {
    pub camera: FrameSource,
    pub filters: Arc<FilterPipeline>,
    pub sensors: SensorPoller,
    pub power: PowerController,
    pub flash: FlashController,
    pub haptic: Box<dyn Haptic>,
    pub sink: Box<dyn FrameSink>,
    pub storage: Box<dyn PhotoStorage>,
    pub config: Box<dyn ConfigProvider>,
    pub input: Receiver<InputEvent>,
}

pub struct Orchestrator {
    camera: FrameSource,
    filters: Arc<FilterPipeline>,
    sensors: SensorPoller,
    scenes: AppStateMachine,
    power: PowerController,
    flash: FlashController,
    haptic: Box<dyn Haptic>,
    sink: Box<dyn FrameSink>,
    storage: Box<dyn PhotoStorage>,
    config: Box<dyn ConfigProvider>,
    input: Receiver<InputEvent>,
    health: HealthReporter,
    fps: FpsMeter,

    camera_settings: CameraSettings,
    display: DisplaySettings,
    filter: FilterSettings,
    flash_settings: FlashSettings,
    power_settings: PowerSettings,
    max_photos: usize,

    capture_pending: bool,
    last_standby_check: Option<Instant>,
    tilt_at_last_check: Option<f32>,
    last_photo: Option<PathBuf>,
    stopped: bool,
}

impl Orchestrator {
    pub fn new(parts: Components) -> Self {
        let config = parts.config;
        let storage_settings = StorageSettings::from_config(config.as_ref());
        let camera_settings = CameraSettings::from_config(config.as_ref());

        Self {
            camera: parts.camera,
            filters: parts.filters,
            sensors: parts.sensors,
            scenes: AppStateMachine::default(),
            power: parts.power,
            flash: parts.flash,
            haptic: parts.haptic,
            sink: parts.sink,
            storage: parts.storage,
            input: parts.input,
            health: HealthReporter::new(storage_settings.health_path, HEALTH_INTERVAL),
            fps: FpsMeter::new(camera_settings.preview_fps as usize * 2),
            display: DisplaySettings::from_config(config.as_ref()),
            filter: FilterSettings::from_config(config.as_ref()),
            flash_settings: FlashSettings::from_config(config.as_ref()),
            power_settings: PowerSettings::from_config(config.as_ref()),
            max_photos: storage_settings.max_photos,
            camera_settings,
            config,
            capture_pending: false,
            last_standby_check: None,
            tilt_at_last_check: None,
            last_photo: None,
            stopped: false,
        }
    }

    pub fn scene(&self) -> AppState {
        self.scenes.current()
    }

    /// Scene machine, for registering enter/exit hooks
    pub fn scenes_mut(&mut self) -> &mut AppStateMachine {
        &mut self.scenes
    }

    pub fn power(&self) -> &PowerController {
        &self.power
    }

    pub fn camera(&self) -> &FrameSource {
        &self.camera
    }

    pub fn filter_settings(&self) -> FilterSettings {
        self.filter
    }

    pub fn flash_settings(&self) -> FlashSettings {
        self.flash_settings
    }

    pub fn last_photo(&self) -> Option<&PathBuf> {
        self.last_photo.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Leave Boot for the camera scene and start the preview
    pub fn start(&mut self, now: Instant) -> CameraResult<()> {
        self.health.write(
            now,
            HealthStatus::Starting,
            0.0,
            self.scenes.current(),
            self.power.state(),
        );
        self.camera.start_preview()?;
        self.scenes.handle_event(AppEvent::BootComplete);
        self.refresh_brightness();
        self.last_standby_check = Some(now);
        info!(device = %self.camera.device_name(), "Camera appliance running");
        Ok(())
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.stopped {
            return TickOutcome::Stopped;
        }
        self.fps.tick(now);

        if self.power.is_shutdown() {
            self.shutdown(now);
            return TickOutcome::Stopped;
        }

        let check_due = self
            .last_standby_check
            .is_none_or(|last| now.duration_since(last) >= STANDBY_CHECK_INTERVAL);
        if check_due {
            self.last_standby_check = Some(now);
            let motion = self.motion_since_last_check();
            self.power.check_standby(motion);
            self.refresh_brightness();
        }

        let mut quit = false;
        while let Ok(event) = self.input.try_recv() {
            quit |= self.handle_input(event);
        }
        if quit {
            self.finish(now);
            return TickOutcome::Stopped;
        }
        if self.power.is_shutdown() {
            self.shutdown(now);
            return TickOutcome::Stopped;
        }

        if self.power.is_standby() {
            self.capture_pending = false;
            self.sink.blank();
        } else {
            if let Some(frame) = self.camera.get_preview_frame() {
                let processed =
                    self.filters
                        .process_frame(&frame, self.filter.active, self.filter.iso);
                self.sink.present(&processed, self.display.size);
            }

            if std::mem::take(&mut self.capture_pending) {
                if self.scenes.current() == AppState::Camera {
                    self.service_capture(now);
                } else {
                    debug!(scene = %self.scenes.current(), "Capture ignored outside camera scene");
                }
            }
        }

        self.flash.poll(now);

        if self.health.is_due(now) {
            self.health.write(
                now,
                HealthStatus::Running,
                self.fps.fps(),
                self.scenes.current(),
                self.power.state(),
            );
        }

        TickOutcome::Continue
    }

    /// Tick at the preview frame rate until stopped or `stop` is set
    pub fn run(&mut self, stop: Arc<AtomicBool>) -> CameraResult<()> {
        self.start(Instant::now())?;
        let interval = self.camera_settings.frame_interval();

        loop {
            let started = Instant::now();
            if stop.load(Ordering::SeqCst) {
                info!("Stop requested");
                self.finish(started);
                break;
            }
            if self.tick(started) == TickOutcome::Stopped {
                break;
            }
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        Ok(())
    }

    /// Returns true when the event asks to quit
    fn handle_input(&mut self, event: InputEvent) -> bool {
        if self.power.is_standby() {
            match event {
                InputEvent::EncoderPressed => self.power.encoder_button_pressed(),
                InputEvent::EncoderReleased { .. } | InputEvent::EncoderRotated(_) => {}
                _ => self.power.update_activity(),
            }
            debug!(?event, "Input swallowed by wake");
            return false;
        }

        match event {
            InputEvent::Touch { x, y, action } => {
                self.power.update_activity();
                let mapped = map_touch(
                    (x, y),
                    self.display.touch_rotation,
                    self.display.size,
                    self.display.size,
                );
                debug!(raw_x = x, raw_y = y, x = mapped.0, y = mapped.1, "Touch");
                action.is_some_and(|action| self.apply_action(action))
            }
            InputEvent::Action(action) => {
                self.power.update_activity();
                self.apply_action(action)
            }
            InputEvent::Shutter => {
                self.power.update_activity();
                self.apply_action(Action::Capture)
            }
            InputEvent::EncoderPressed => {
                self.power.encoder_button_pressed();
                false
            }
            InputEvent::EncoderReleased { held } => {
                if self.power.encoder_button_released(held) {
                    self.scenes.handle_event(AppEvent::ShutdownRequest);
                }
                false
            }
            InputEvent::EncoderRotated(steps) => {
                self.power.update_activity();
                if self.scenes.current() == AppState::Camera && steps != 0 {
                    self.pulse(HapticEffect::StrongClick, 0.3);
                    self.step_iso(steps);
                }
                false
            }
        }
    }

    fn apply_action(&mut self, action: Action) -> bool {
        match action {
            Action::Navigate(AppEvent::ShutdownRequest) => {
                self.power.request_shutdown();
            }
            Action::Navigate(event) => {
                self.scenes.handle_event(event);
            }
            Action::Capture => self.capture_pending = true,
            Action::CycleFlash => {
                let mode = self.flash_settings.mode.next();
                self.flash_settings.mode = mode;
                info!(%mode, "Flash mode");
                self.persist("flash", "mode", mode);
                self.pulse(HapticEffect::SoftBump, 0.6);
            }
            Action::CycleFilter => {
                let kind = self.filter.active.next();
                self.filter.active = kind;
                info!(filter = %kind, "Filter");
                self.persist("filter", "active", kind);
            }
            Action::CycleBrightness => {
                let mode = self.display.brightness_mode.next();
                self.display.brightness_mode = mode;
                info!(?mode, "Brightness mode");
                self.persist("display", "brightness_mode", mode);
                self.refresh_brightness();
            }
            Action::SetIso(iso) => self.set_iso(iso),
            Action::Quit => return true,
        }
        false
    }

    fn step_iso(&mut self, steps: i32) {
        let current = ISO_VALUES
            .iter()
            .position(|&v| v == self.filter.iso)
            .unwrap_or(2) as i32;
        let next = (current + steps).clamp(0, ISO_VALUES.len() as i32 - 1) as usize;
        self.set_iso(ISO_VALUES[next]);
    }

    fn set_iso(&mut self, iso: u32) {
        if self.filter.iso == iso {
            return;
        }
        self.filter.iso = iso;
        info!(iso, "ISO");
        self.persist("filter", "iso_fake", iso);
    }

    fn persist<T: serde::Serialize>(&mut self, section: &str, key: &str, value: T) {
        if let Err(e) = self.config.set(section, key, value, true) {
            warn!(section, key, error = %e, "Failed to persist setting");
        }
    }

    fn motion_since_last_check(&mut self) -> bool {
        let tilt = self.sensors.get_snapshot().tilt_deg();
        let motion = match (tilt, self.tilt_at_last_check) {
            (Some(now), Some(before)) => (now - before).abs() >= MOTION_TILT_DELTA_DEG,
            _ => false,
        };
        self.tilt_at_last_check = tilt;
        motion
    }

    fn refresh_brightness(&mut self) {
        let lux = self.sensors.get_snapshot().lux();
        let level = target_brightness(&self.display, lux);
        self.power.apply_brightness(level);
    }

    /// Flash decision for the current light level
    pub fn capture_request(&self) -> CaptureRequest {
        let lux = self.sensors.get_snapshot().lux();
        CaptureRequest {
            use_flash: should_fire(
                self.flash_settings.mode,
                lux,
                self.flash_settings.auto_threshold_lux,
            ),
            mode: self.camera_settings.capture_mode,
            quality: self.camera_settings.capture_quality,
        }
    }

    fn service_capture(&mut self, now: Instant) {
        let request = self.capture_request();
        info!(?request, "Capture");

        if request.use_flash {
            self.flash.on(now);
            std::thread::sleep(FLASH_LEAD);
        }

        let result = self.capture(request);

        if request.use_flash {
            self.flash.off();
        }

        match result {
            Ok(path) => {
                info!(path = %path.display(), "Photo captured");
                self.pulse(HapticEffect::SharpClick, 0.8);
                self.last_photo = Some(path);
                if let Err(e) = self.storage.enforce_limit(self.max_photos) {
                    warn!(error = %e, "Photo retention failed");
                }
            }
            Err(e) => {
                error!(error = %e, "Capture failed");
                self.pulse(HapticEffect::DoubleClick, 0.8);
            }
        }
    }

    fn pulse(&mut self, effect: HapticEffect, strength: f32) {
        if let Err(e) = self.haptic.play(effect, strength) {
            debug!(?effect, error = %e, "Haptic effect skipped");
        }
    }

    fn capture(&mut self, request: CaptureRequest) -> Result<PathBuf, AppError> {
        match request.mode {
            CaptureMode::Still => {
                let target = self.storage.next_path()?;
                Ok(self.camera.capture_photo(&target, request.quality)?)
            }
            CaptureMode::Preview => {
                let frame = self.camera.capture_array().ok_or_else(|| {
                    CameraError::CaptureFailure("no preview frame available".into())
                })?;
                let processed =
                    self.filters
                        .process_frame(&frame, self.filter.active, self.filter.iso);
                Ok(self.storage.save(&processed, request.quality)?)
            }
        }
    }

    fn shutdown(&mut self, now: Instant) {
        info!("Shutdown sequence");
        if !self.scenes.is_terminal() {
            self.scenes.handle_event(AppEvent::ShutdownRequest);
        }
        self.pulse(HapticEffect::DoubleClick, 1.0);
        self.finish(now);
        self.run_poweroff_command();
    }

    /// Release devices and persist state; idempotent
    fn finish(&mut self, now: Instant) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.camera.stop_preview();
        self.sensors.stop();
        self.flash.off();
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        self.sink.blank();
        self.health.write(
            now,
            HealthStatus::Stopping,
            self.fps.fps(),
            self.scenes.current(),
            self.power.state(),
        );
        info!("Stopped");
    }

    fn run_poweroff_command(&self) {
        let Some((program, args)) = self.power_settings.poweroff_command.split_first() else {
            debug!("No power-off command configured");
            return;
        };
        info!(%program, ?args, "Powering off");
        match std::process::Command::new(program).args(args).status() {
            Ok(status) if status.success() => {}
            Ok(status) => error!(%status, "Power-off command failed"),
            Err(e) => error!(error = %e, "Failed to run power-off command"),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.finish(Instant::now());
    }
}
