// SPDX-License-Identifier: GPL-3.0-only

//! Linux sysfs sensor drivers
//!
//! - Illuminance: IIO `in_illuminance_input`, or `in_illuminance_raw` times
//!   `in_illuminance_scale`, smoothed over five samples
//! - Tilt: IIO gyroscope `in_anglvel_{x,y,z}_raw` fed into a [`TiltEstimator`]
//! - Battery: `power_supply` class entry of type `Battery`, `capacity` file

use super::{BatterySensor, IlluminanceSensor, MovingAverage, SensorSet, TiltEstimator, TiltSensor};
use crate::constants::sensors::LUX_WINDOW;
use crate::errors::SensorError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Probe `root` (normally `/sys`) for every supported sensor
pub fn detect(root: &Path) -> SensorSet {
    let iio_devices = list_dir(&root.join("bus/iio/devices"));

    let illuminance = iio_devices
        .iter()
        .find_map(|dir| IioIlluminance::probe(dir))
        .map(|s| Box::new(s) as Box<dyn IlluminanceSensor>);

    let tilt = iio_devices
        .iter()
        .find_map(|dir| IioGyroTilt::probe(dir))
        .map(|s| Box::new(s) as Box<dyn TiltSensor>);

    let battery = list_dir(&root.join("class/power_supply"))
        .iter()
        .find_map(|dir| PowerSupplyBattery::probe(dir))
        .map(|s| Box::new(s) as Box<dyn BatterySensor>);

    SensorSet {
        illuminance,
        tilt,
        battery,
    }
}

fn list_dir(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.flatten().map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn read_number(path: &Path) -> Result<f32, SensorError> {
    let text = fs::read_to_string(path)
        .map_err(|e| SensorError::ReadFailed(format!("{}: {}", path.display(), e)))?;
    text.trim()
        .parse::<f32>()
        .map_err(|e| SensorError::ReadFailed(format!("{}: {}", path.display(), e)))
}

/// IIO ambient light sensor
pub struct IioIlluminance {
    source: LuxSource,
    average: MovingAverage,
}

enum LuxSource {
    Processed(PathBuf),
    Raw { raw: PathBuf, scale: f32 },
}

impl IioIlluminance {
    pub fn probe(dir: &Path) -> Option<Self> {
        let processed = dir.join("in_illuminance_input");
        let raw = dir.join("in_illuminance_raw");

        let source = if processed.exists() {
            LuxSource::Processed(processed)
        } else if raw.exists() {
            let scale = read_number(&dir.join("in_illuminance_scale")).unwrap_or(1.0);
            LuxSource::Raw { raw, scale }
        } else {
            return None;
        };

        info!(dir = %dir.display(), "Found IIO light sensor");
        Some(Self {
            source,
            average: MovingAverage::new(LUX_WINDOW),
        })
    }
}

impl IlluminanceSensor for IioIlluminance {
    fn read_lux(&mut self) -> Result<f32, SensorError> {
        let lux = match &self.source {
            LuxSource::Processed(path) => read_number(path)?,
            LuxSource::Raw { raw, scale } => read_number(raw)? * scale,
        };
        Ok(self.average.push(lux.max(0.0)))
    }
}

/// IIO gyroscope integrated into a roll angle
pub struct IioGyroTilt {
    axes: [PathBuf; 3],
    /// Raw counts to deg/s
    scale_dps: f32,
    estimator: TiltEstimator,
    last_sample: Option<Instant>,
}

impl IioGyroTilt {
    pub fn probe(dir: &Path) -> Option<Self> {
        let axes = [
            dir.join("in_anglvel_x_raw"),
            dir.join("in_anglvel_y_raw"),
            dir.join("in_anglvel_z_raw"),
        ];
        if !axes.iter().all(|p| p.exists()) {
            return None;
        }
        // IIO reports angular velocity scale in rad/s per count
        let scale_rad = read_number(&dir.join("in_anglvel_scale")).unwrap_or(1.0);
        info!(dir = %dir.display(), "Found IIO gyroscope");
        Some(Self {
            axes,
            scale_dps: scale_rad.to_degrees(),
            estimator: TiltEstimator::new(),
            last_sample: None,
        })
    }
}

impl TiltSensor for IioGyroTilt {
    fn read_tilt(&mut self) -> Result<f32, SensorError> {
        let mut rates = [0.0f32; 3];
        for (rate, path) in rates.iter_mut().zip(&self.axes) {
            *rate = read_number(path)? * self.scale_dps;
        }

        let now = Instant::now();
        let dt = self
            .last_sample
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        self.last_sample = Some(now);

        Ok(self.estimator.update(rates, dt))
    }
}

/// power_supply fuel gauge
pub struct PowerSupplyBattery {
    capacity: PathBuf,
}

impl PowerSupplyBattery {
    pub fn probe(dir: &Path) -> Option<Self> {
        let kind = fs::read_to_string(dir.join("type")).ok()?;
        if kind.trim() != "Battery" {
            return None;
        }
        let capacity = dir.join("capacity");
        if !capacity.exists() {
            debug!(dir = %dir.display(), "Battery has no capacity file");
            return None;
        }
        info!(dir = %dir.display(), "Found battery");
        Some(Self { capacity })
    }
}

impl BatterySensor for PowerSupplyBattery {
    fn read_percent(&mut self) -> Result<u8, SensorError> {
        let pct = read_number(&self.capacity)?;
        Ok(pct.clamp(0.0, 100.0) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_detect_empty_root() {
        let root = tempfile::tempdir().unwrap();
        let set = detect(root.path());
        assert!(set.illuminance.is_none());
        assert!(set.tilt.is_none());
        assert!(set.battery.is_none());
    }

    #[test]
    fn test_detect_all_sensors() {
        let root = tempfile::tempdir().unwrap();
        let iio = root.path().join("bus/iio/devices");
        write(&iio.join("iio:device0/in_illuminance_raw"), "100\n");
        write(&iio.join("iio:device0/in_illuminance_scale"), "0.5\n");
        for axis in ["x", "y", "z"] {
            write(&iio.join(format!("iio:device1/in_anglvel_{axis}_raw")), "0\n");
        }
        write(&iio.join("iio:device1/in_anglvel_scale"), "0.001\n");
        let supply = root.path().join("class/power_supply");
        write(&supply.join("AC/type"), "Mains\n");
        write(&supply.join("BAT0/type"), "Battery\n");
        write(&supply.join("BAT0/capacity"), "73\n");

        let mut set = detect(root.path());
        assert_eq!(set.illuminance.as_mut().unwrap().read_lux().unwrap(), 50.0);
        assert_eq!(set.tilt.as_mut().unwrap().read_tilt().unwrap(), 0.0);
        assert_eq!(set.battery.as_mut().unwrap().read_percent().unwrap(), 73);
    }

    #[test]
    fn test_lux_is_averaged() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in_illuminance_input");
        write(&input, "10");
        let mut sensor = IioIlluminance::probe(dir.path()).unwrap();
        assert_eq!(sensor.read_lux().unwrap(), 10.0);
        write(&input, "30");
        assert_eq!(sensor.read_lux().unwrap(), 20.0);
    }

    #[test]
    fn test_garbage_reading_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("type"), "Battery");
        write(&dir.path().join("capacity"), "n/a");
        let mut battery = PowerSupplyBattery::probe(dir.path()).unwrap();
        assert!(matches!(
            battery.read_percent(),
            Err(SensorError::ReadFailed(_))
        ));
    }
}
