// SPDX-License-Identifier: GPL-3.0-only

//! Ambient sensors and the background poller
//!
//! Three sensors are sampled at their own cadence by one loop:
//!
//! | Sensor      | Interval |
//! |-------------|----------|
//! | illuminance | 200 ms   |
//! | tilt        | 50 ms    |
//! | battery     | 1 s      |
//!
//! Each read happens without holding the snapshot lock; the lock is taken
//! only to store the result. A sensor absent at construction is never
//! polled and its snapshot field stays `None`.

pub mod simulated;
pub mod sysfs;

use crate::backends::loop_controller::LoopController;
use crate::constants::sensors::{
    BATTERY_INTERVAL, ILLUMINANCE_INTERVAL, TICK, TILT_INTERVAL, TILT_LIMIT_DEG, TILT_WINDOW,
};
use crate::constants::timing::SENSOR_JOIN_TIMEOUT;
use crate::errors::SensorError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Ambient light sensor
pub trait IlluminanceSensor: Send {
    /// Illuminance in lux
    fn read_lux(&mut self) -> Result<f32, SensorError>;
}

/// Device tilt sensor
pub trait TiltSensor: Send {
    /// Tilt in degrees, within [-90, 90]
    fn read_tilt(&mut self) -> Result<f32, SensorError>;
}

/// Battery fuel gauge
pub trait BatterySensor: Send {
    /// State of charge, 0 to 100
    fn read_percent(&mut self) -> Result<u8, SensorError>;
}

/// A value and when it was read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    pub at: Instant,
}

impl<T> Reading<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            at: Instant::now(),
        }
    }
}

/// Latest readings, each independently timestamped
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub illuminance: Option<Reading<f32>>,
    pub tilt: Option<Reading<f32>>,
    pub battery: Option<Reading<u8>>,
}

impl SensorSnapshot {
    pub fn lux(&self) -> Option<f32> {
        self.illuminance.map(|r| r.value)
    }

    pub fn tilt_deg(&self) -> Option<f32> {
        self.tilt.map(|r| r.value)
    }

    pub fn battery_percent(&self) -> Option<u8> {
        self.battery.map(|r| r.value)
    }
}

/// The sensors handed to a poller; `None` marks a sensor as unavailable
#[derive(Default)]
pub struct SensorSet {
    pub illuminance: Option<Box<dyn IlluminanceSensor>>,
    pub tilt: Option<Box<dyn TiltSensor>>,
    pub battery: Option<Box<dyn BatterySensor>>,
}

impl SensorSet {
    /// Probe the Linux IIO and power_supply classes
    pub fn detect() -> Self {
        sysfs::detect(std::path::Path::new("/sys"))
    }

    fn describe(&self) -> [(&'static str, bool); 3] {
        [
            ("illuminance", self.illuminance.is_some()),
            ("tilt", self.tilt.is_some()),
            ("battery", self.battery.is_some()),
        ]
    }
}

/// Poll intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorCadence {
    pub tick: Duration,
    pub illuminance: Duration,
    pub tilt: Duration,
    pub battery: Duration,
}

impl Default for SensorCadence {
    fn default() -> Self {
        Self {
            tick: TICK,
            illuminance: ILLUMINANCE_INTERVAL,
            tilt: TILT_INTERVAL,
            battery: BATTERY_INTERVAL,
        }
    }
}

/// Elapsed-time gate for one sensor
#[derive(Debug, Clone, Copy)]
struct Gate {
    interval: Duration,
    last: Option<Instant>,
}

impl Gate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True at most once per interval; marks the gate as fired
    fn due(&mut self, now: Instant) -> bool {
        let ready = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if ready {
            self.last = Some(now);
        }
        ready
    }
}

struct PollState {
    sensors: SensorSet,
    illuminance_gate: Gate,
    tilt_gate: Gate,
    battery_gate: Gate,
    tick: Duration,
}

/// Background sampler owning the shared snapshot
pub struct SensorPoller {
    snapshot: Arc<Mutex<SensorSnapshot>>,
    controller: Option<LoopController>,
}

impl SensorPoller {
    /// Start polling at the default cadence
    pub fn start(sensors: SensorSet) -> Self {
        Self::start_with(sensors, SensorCadence::default())
    }

    pub fn start_with(sensors: SensorSet, cadence: SensorCadence) -> Self {
        for (name, present) in sensors.describe() {
            if present {
                info!(sensor = name, "Sensor available");
            } else {
                info!(sensor = name, "Sensor unavailable, not polling");
            }
        }

        let snapshot = Arc::new(Mutex::new(SensorSnapshot::default()));
        let shared = Arc::clone(&snapshot);
        let mut state = PollState {
            sensors,
            illuminance_gate: Gate::new(cadence.illuminance),
            tilt_gate: Gate::new(cadence.tilt),
            battery_gate: Gate::new(cadence.battery),
            tick: cadence.tick,
        };

        // Without a thread the snapshot simply stays empty
        let controller = LoopController::start("sensor-poller", move || {
            poll_once(&mut state, &shared, Instant::now());
            std::thread::sleep(state.tick);
        })
        .inspect_err(|e| error!(error = %e, "Sensor polling disabled"))
        .ok();

        Self {
            snapshot,
            controller,
        }
    }

    /// Copy of the latest readings
    pub fn get_snapshot(&self) -> SensorSnapshot {
        *lock(&self.snapshot)
    }

    pub fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(LoopController::is_running)
    }

    /// Stop the loop, waiting up to one second for it
    pub fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop(SENSOR_JOIN_TIMEOUT);
        }
    }
}

impl Drop for SensorPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run every due gate once. Reads happen before the lock is taken.
fn poll_once(state: &mut PollState, snapshot: &Mutex<SensorSnapshot>, now: Instant) {
    if let Some(sensor) = state.sensors.illuminance.as_mut()
        && state.illuminance_gate.due(now)
    {
        match sensor.read_lux() {
            Ok(lux) => lock(snapshot).illuminance = Some(Reading::new(lux)),
            Err(e) => debug!(error = %e, "Illuminance read skipped"),
        }
    }

    if let Some(sensor) = state.sensors.tilt.as_mut()
        && state.tilt_gate.due(now)
    {
        match sensor.read_tilt() {
            Ok(deg) => {
                let deg = deg.clamp(-TILT_LIMIT_DEG, TILT_LIMIT_DEG);
                lock(snapshot).tilt = Some(Reading::new(deg));
            }
            Err(e) => debug!(error = %e, "Tilt read skipped"),
        }
    }

    if let Some(sensor) = state.sensors.battery.as_mut()
        && state.battery_gate.due(now)
    {
        match sensor.read_percent() {
            Ok(pct) => lock(snapshot).battery = Some(Reading::new(pct.min(100))),
            Err(e) => debug!(error = %e, "Battery read skipped"),
        }
    }
}

fn lock(snapshot: &Mutex<SensorSnapshot>) -> MutexGuard<'_, SensorSnapshot> {
    snapshot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed-window moving average
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f32>,
    capacity: usize,
}

impl MovingAverage {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Add a sample and return the current mean
    pub fn push(&mut self, value: f32) -> f32 {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.window.iter().sum::<f32>() / self.window.len() as f32
    }
}

/// Roll angle from gyroscope rates
///
/// Integrates the roll rate while the device moves and lets the angle decay
/// toward level while it is still, which keeps drift bounded. Output is
/// smoothed over the last ten estimates.
#[derive(Debug, Clone)]
pub struct TiltEstimator {
    angle: f32,
    smoothing: MovingAverage,
}

impl Default for TiltEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TiltEstimator {
    /// Below this rate on every axis the device counts as still (deg/s)
    pub const STILL_THRESHOLD_DPS: f32 = 5.0;

    /// Per-update decay toward zero while still
    pub const STILL_DECAY: f32 = 0.98;

    pub fn new() -> Self {
        Self {
            angle: 0.0,
            smoothing: MovingAverage::new(TILT_WINDOW),
        }
    }

    /// Feed one rate sample `[x, y, z]` in deg/s taken `dt` after the last
    pub fn update(&mut self, rates_dps: [f32; 3], dt: Duration) -> f32 {
        let still = rates_dps
            .iter()
            .all(|r| r.abs() < Self::STILL_THRESHOLD_DPS);
        if still {
            self.angle *= Self::STILL_DECAY;
        } else {
            self.angle = (self.angle + rates_dps[1] * dt.as_secs_f32())
                .clamp(-TILT_LIMIT_DEG, TILT_LIMIT_DEG);
        }
        self.smoothing.push(self.angle)
    }
}

#[cfg(test)]
mod tests {
    use super::simulated::SimulatedSensors;
    use super::*;

    fn fast() -> SensorCadence {
        SensorCadence {
            tick: Duration::from_millis(1),
            illuminance: Duration::from_millis(20),
            tilt: Duration::from_millis(5),
            battery: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_gate_fires_once_per_interval() {
        let start = Instant::now();
        let mut gate = Gate::new(Duration::from_millis(200));
        assert!(gate.due(start));
        assert!(!gate.due(start + Duration::from_millis(199)));
        assert!(gate.due(start + Duration::from_millis(200)));
        assert!(!gate.due(start + Duration::from_millis(250)));
    }

    #[test]
    fn test_poll_once_respects_cadence() {
        let sim = SimulatedSensors::new();
        let mut state = PollState {
            sensors: sim.sensor_set(),
            illuminance_gate: Gate::new(ILLUMINANCE_INTERVAL),
            tilt_gate: Gate::new(TILT_INTERVAL),
            battery_gate: Gate::new(BATTERY_INTERVAL),
            tick: TICK,
        };
        let snapshot = Mutex::new(SensorSnapshot::default());
        let start = Instant::now();

        // One simulated second of 10 ms ticks
        for i in 0..100 {
            poll_once(&mut state, &snapshot, start + TICK * i);
        }

        assert_eq!(sim.illuminance_reads(), 5);
        assert_eq!(sim.tilt_reads(), 20);
        assert_eq!(sim.battery_reads(), 1);
    }

    #[test]
    fn test_unavailable_illuminance_stays_unknown() {
        let sim = SimulatedSensors::new();
        let mut sensors = sim.sensor_set();
        sensors.illuminance = None;

        let mut poller = SensorPoller::start_with(sensors, fast());
        std::thread::sleep(Duration::from_millis(150));
        let snapshot = poller.get_snapshot();
        poller.stop();

        assert!(snapshot.illuminance.is_none());
        assert!(snapshot.tilt.is_some());
        assert!(snapshot.battery.is_some());
        assert_eq!(sim.illuminance_reads(), 0);
    }

    #[test]
    fn test_read_error_keeps_last_value() {
        let sim = SimulatedSensors::new();
        sim.set_lux(42.0);
        let mut poller = SensorPoller::start_with(sim.sensor_set(), fast());

        let deadline = Instant::now() + Duration::from_secs(2);
        while poller.get_snapshot().lux().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let first = poller.get_snapshot().illuminance.unwrap();

        sim.fail_illuminance(true);
        sim.set_lux(500.0);
        std::thread::sleep(Duration::from_millis(100));
        let later = poller.get_snapshot().illuminance.unwrap();
        poller.stop();

        assert_eq!(later.value, 42.0);
        assert_eq!(later.at, first.at);
    }

    #[test]
    fn test_tilt_is_clamped() {
        let sim = SimulatedSensors::new();
        sim.set_tilt(135.0);
        let mut poller = SensorPoller::start_with(sim.sensor_set(), fast());
        let deadline = Instant::now() + Duration::from_secs(2);
        while poller.get_snapshot().tilt.is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(poller.get_snapshot().tilt_deg(), Some(90.0));
        poller.stop();
        assert!(!poller.is_running());
    }

    #[test]
    fn test_moving_average_window() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.push(3.0), 3.0);
        assert_eq!(avg.push(6.0), 4.5);
        assert_eq!(avg.push(9.0), 6.0);
        assert_eq!(avg.push(12.0), 9.0);
    }

    #[test]
    fn test_tilt_estimator_integrates_and_decays() {
        let mut est = TiltEstimator::new();
        let moving = est.update([0.0, 100.0, 0.0], Duration::from_millis(100));
        assert!((moving - 10.0).abs() < 1e-4);
        for _ in 0..200 {
            est.update([0.0, 0.0, 0.0], Duration::from_millis(50));
        }
        assert!(est.angle.abs() < 0.5);

        let mut est = TiltEstimator::new();
        for _ in 0..50 {
            est.update([0.0, 1000.0, 0.0], Duration::from_secs(1));
        }
        assert_eq!(est.angle, 90.0);
    }
}
