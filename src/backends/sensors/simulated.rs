// SPDX-License-Identifier: GPL-3.0-only

//! Scripted sensors for desktop runs and tests

use super::{BatterySensor, IlluminanceSensor, SensorSet, TiltSensor};
use crate::errors::SensorError;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Values {
    lux: f32,
    tilt: f32,
    battery: u8,
}

#[derive(Debug)]
struct Shared {
    values: Mutex<Values>,
    fail_illuminance: AtomicBool,
    fail_tilt: AtomicBool,
    fail_battery: AtomicBool,
    illuminance_reads: AtomicU32,
    tilt_reads: AtomicU32,
    battery_reads: AtomicU32,
}

/// Control handle for a set of simulated sensors
#[derive(Debug, Clone)]
pub struct SimulatedSensors {
    shared: Arc<Shared>,
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSensors {
    /// Indoor light, level, mostly charged
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                values: Mutex::new(Values {
                    lux: 150.0,
                    tilt: 0.0,
                    battery: 85,
                }),
                fail_illuminance: AtomicBool::new(false),
                fail_tilt: AtomicBool::new(false),
                fail_battery: AtomicBool::new(false),
                illuminance_reads: AtomicU32::new(0),
                tilt_reads: AtomicU32::new(0),
                battery_reads: AtomicU32::new(0),
            }),
        }
    }

    /// Sensors backed by this handle, all present
    pub fn sensor_set(&self) -> SensorSet {
        SensorSet {
            illuminance: Some(Box::new(SimIlluminance(Arc::clone(&self.shared)))),
            tilt: Some(Box::new(SimTilt(Arc::clone(&self.shared)))),
            battery: Some(Box::new(SimBattery(Arc::clone(&self.shared)))),
        }
    }

    pub fn set_lux(&self, lux: f32) {
        self.values().lux = lux;
    }

    pub fn set_tilt(&self, deg: f32) {
        self.values().tilt = deg;
    }

    pub fn set_battery(&self, percent: u8) {
        self.values().battery = percent;
    }

    pub fn fail_illuminance(&self, fail: bool) {
        self.shared.fail_illuminance.store(fail, Ordering::SeqCst);
    }

    pub fn fail_tilt(&self, fail: bool) {
        self.shared.fail_tilt.store(fail, Ordering::SeqCst);
    }

    pub fn fail_battery(&self, fail: bool) {
        self.shared.fail_battery.store(fail, Ordering::SeqCst);
    }

    pub fn illuminance_reads(&self) -> u32 {
        self.shared.illuminance_reads.load(Ordering::SeqCst)
    }

    pub fn tilt_reads(&self) -> u32 {
        self.shared.tilt_reads.load(Ordering::SeqCst)
    }

    pub fn battery_reads(&self) -> u32 {
        self.shared.battery_reads.load(Ordering::SeqCst)
    }

    fn values(&self) -> std::sync::MutexGuard<'_, Values> {
        self.shared
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read<T>(
    shared: &Shared,
    fail: &AtomicBool,
    counter: &AtomicU32,
    pick: impl FnOnce(&Values) -> T,
) -> Result<T, SensorError> {
    counter.fetch_add(1, Ordering::SeqCst);
    if fail.load(Ordering::SeqCst) {
        return Err(SensorError::ReadFailed("simulated failure".into()));
    }
    let values = shared
        .values
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(pick(&values))
}

struct SimIlluminance(Arc<Shared>);
struct SimTilt(Arc<Shared>);
struct SimBattery(Arc<Shared>);

impl IlluminanceSensor for SimIlluminance {
    fn read_lux(&mut self) -> Result<f32, SensorError> {
        let s = &self.0;
        read(s, &s.fail_illuminance, &s.illuminance_reads, |v| v.lux)
    }
}

impl TiltSensor for SimTilt {
    fn read_tilt(&mut self) -> Result<f32, SensorError> {
        let s = &self.0;
        read(s, &s.fail_tilt, &s.tilt_reads, |v| v.tilt)
    }
}

impl BatterySensor for SimBattery {
    fn read_percent(&mut self) -> Result<u8, SensorError> {
        let s = &self.0;
        read(s, &s.fail_battery, &s.battery_reads, |v| v.battery)
    }
}
