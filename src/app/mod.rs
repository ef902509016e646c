// SPDX-License-Identifier: GPL-3.0-only

//! Application layer
//!
//! - `state`: Scene state machine (boot, camera, settings, gallery, shutdown)
//! - `power`: Standby and long-press shutdown
//! - `orchestrator`: The per-tick driver
//! - `touch`: Touch panel rotation mapping
//! - `health`: Health status file

pub mod health;
pub mod orchestrator;
pub mod power;
pub mod state;
pub mod touch;

pub use orchestrator::{
    Action, CaptureRequest, Components, FrameSink, InputEvent, NullSink, Orchestrator, TickOutcome,
};
pub use power::{Clock, ManualClock, PowerController, PowerState, SystemClock};
pub use state::{AppEvent, AppState, AppStateMachine};

use crate::backends::backlight::open_backlight;
use crate::backends::camera::{CameraBackendType, FrameSource, device_factory};
use crate::backends::sensors::{SensorPoller, SensorSet};
use crate::backends::sensors::simulated::SimulatedSensors;
use crate::config::{
    CameraSettings, ConfigProvider, DisplaySettings, FlashSettings, HapticSettings, PowerSettings,
    StorageSettings,
};
use crate::errors::AppResult;
use crate::flash::{FlashController, open_flash};
use crate::haptic::open_haptic;
use crate::pipelines::filters::FilterPipeline;
use crate::storage::PhotoStore;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use tracing::info;

/// Open every device named by `config` and wire up an orchestrator
///
/// Camera construction failure is returned as
/// [`crate::errors::CameraError::HardwareUnavailable`]; every other device
/// degrades to a virtual stand-in.
pub fn assemble(
    config: Box<dyn ConfigProvider>,
    sink: Box<dyn FrameSink>,
    input: Receiver<InputEvent>,
) -> AppResult<Orchestrator> {
    let camera_settings = CameraSettings::from_config(config.as_ref());
    let display = DisplaySettings::from_config(config.as_ref());
    let power_settings = PowerSettings::from_config(config.as_ref());
    let flash_settings = FlashSettings::from_config(config.as_ref());
    let storage_settings = StorageSettings::from_config(config.as_ref());
    let haptic_settings = HapticSettings::from_config(config.as_ref());

    info!(backend = %camera_settings.backend, "Opening camera");
    let camera = FrameSource::open(device_factory(&camera_settings), &camera_settings)?;

    let sensor_set = match camera_settings.backend {
        CameraBackendType::Simulated => SimulatedSensors::new().sensor_set(),
        CameraBackendType::V4l2 => SensorSet::detect(),
    };

    let power = PowerController::new(
        &power_settings,
        display.brightness_medium,
        open_backlight(display.brightness_medium),
        Arc::new(SystemClock),
    );

    Ok(Orchestrator::new(Components {
        camera,
        filters: Arc::new(FilterPipeline::new()),
        sensors: SensorPoller::start(sensor_set),
        power,
        flash: FlashController::new(open_flash(), flash_settings.max_on),
        haptic: open_haptic(haptic_settings.enabled, haptic_settings.i2c_bus),
        sink,
        storage: Box::new(PhotoStore::open(storage_settings.photos_dir)?),
        config,
        input,
    }))
}
