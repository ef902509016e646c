// SPDX-License-Identifier: GPL-3.0-only

//! Haptic feedback
//!
//! The appliance drives a coin LRA through a DRV2605L on the I2C bus. Effects
//! come from the chip's built-in LRA waveform library; the orchestrator only
//! names the effect and a strength. Feedback is best effort: a missing or
//! failing driver never affects capture or shutdown.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Waveforms from the DRV2605L LRA library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HapticEffect {
    StrongClick = 1,
    SoftBump = 10,
    DoubleClick = 14,
    SharpClick = 47,
}

impl HapticEffect {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Something that can play a haptic effect
pub trait Haptic: Send {
    /// Start `effect` at `strength` (clamped to 0.0..=1.0); does not wait for it
    fn play(&mut self, effect: HapticEffect, strength: f32) -> io::Result<()>;
}

/// Byte-register access to one I2C peripheral
pub trait RegisterBus: Send {
    fn read_reg(&mut self, reg: u8) -> io::Result<u8>;
    fn write_reg(&mut self, reg: u8, value: u8) -> io::Result<()>;
}

/// `I2C_SLAVE` from linux/i2c-dev.h
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// `/dev/i2c-N` bound to one slave address
pub struct I2cDevice {
    file: File,
}

impl I2cDevice {
    pub fn open(bus: u32, address: u16) -> io::Result<Self> {
        let path = PathBuf::from(format!("/dev/i2c-{bus}"));
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        // SAFETY: fd is valid for the lifetime of `file`; I2C_SLAVE takes the
        // address by value.
        let result =
            unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(address)) };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        debug!(path = %path.display(), address, "I2C device bound");
        Ok(Self { file })
    }
}

impl RegisterBus for I2cDevice {
    fn read_reg(&mut self, reg: u8) -> io::Result<u8> {
        self.file.write_all(&[reg])?;
        let mut value = [0u8; 1];
        self.file.read_exact(&mut value)?;
        Ok(value[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> io::Result<()> {
        self.file.write_all(&[reg, value])
    }
}

pub mod drv2605 {
    pub const ADDRESS: u16 = 0x5A;

    pub const REG_STATUS: u8 = 0x00;
    pub const REG_MODE: u8 = 0x01;
    pub const REG_LIBRARY: u8 = 0x03;
    pub const REG_WAVEFORM_SEQ_1: u8 = 0x04;
    pub const REG_WAVEFORM_SEQ_2: u8 = 0x05;
    pub const REG_GO: u8 = 0x0C;
    pub const REG_OVERDRIVE_OFFSET: u8 = 0x0D;
    pub const REG_RATED_VOLTAGE: u8 = 0x16;
    pub const REG_CLAMP_VOLTAGE: u8 = 0x17;
    pub const REG_FEEDBACK_CONTROL: u8 = 0x1A;
    pub const REG_CONTROL3: u8 = 0x1D;

    pub const MODE_INTERNAL_TRIGGER: u8 = 0x00;
    pub const MODE_STANDBY: u8 = 0x40;
    pub const LIBRARY_LRA: u8 = 0x06;
    /// LRA mode, brake factor 3, medium loop gain
    pub const FEEDBACK_LRA: u8 = 0xB6;
    /// About 1.6 V RMS
    pub const RATED_VOLTAGE: u8 = 0x59;
    /// About 2.5 V peak
    pub const CLAMP_VOLTAGE: u8 = 0x89;
    pub const CONTROL3: u8 = 0x20;
}

/// DRV2605L haptic driver configured for an LRA
pub struct Drv2605<B: RegisterBus> {
    bus: B,
}

impl Drv2605<I2cDevice> {
    /// Probe the driver on `/dev/i2c-{bus}` and configure it
    pub fn open(bus: u32) -> io::Result<Self> {
        Self::new(I2cDevice::open(bus, drv2605::ADDRESS)?)
    }
}

impl<B: RegisterBus> Drv2605<B> {
    /// Read the status register to confirm presence, then load the LRA setup
    pub fn new(mut bus: B) -> io::Result<Self> {
        use drv2605::*;

        let status = bus.read_reg(REG_STATUS)?;
        debug!(status, "DRV2605 found");

        bus.write_reg(REG_MODE, MODE_INTERNAL_TRIGGER)?;
        std::thread::sleep(Duration::from_millis(1));
        bus.write_reg(REG_LIBRARY, LIBRARY_LRA)?;
        bus.write_reg(REG_FEEDBACK_CONTROL, FEEDBACK_LRA)?;
        bus.write_reg(REG_RATED_VOLTAGE, RATED_VOLTAGE)?;
        bus.write_reg(REG_CLAMP_VOLTAGE, CLAMP_VOLTAGE)?;
        bus.write_reg(REG_CONTROL3, CONTROL3)?;
        Ok(Self { bus })
    }
}

impl<B: RegisterBus> Haptic for Drv2605<B> {
    fn play(&mut self, effect: HapticEffect, strength: f32) -> io::Result<()> {
        use drv2605::*;

        let overdrive = (strength.clamp(0.0, 1.0) * 127.0) as u8;
        self.bus.write_reg(REG_OVERDRIVE_OFFSET, overdrive)?;
        self.bus.write_reg(REG_WAVEFORM_SEQ_1, effect.id())?;
        // Sequence terminator
        self.bus.write_reg(REG_WAVEFORM_SEQ_2, 0x00)?;
        self.bus.write_reg(REG_GO, 0x01)
    }
}

impl<B: RegisterBus> Drop for Drv2605<B> {
    fn drop(&mut self) {
        if let Err(e) = self.bus.write_reg(drv2605::REG_MODE, drv2605::MODE_STANDBY) {
            debug!(error = %e, "DRV2605 standby failed");
        }
    }
}

/// Records played effects; clones share the log
#[derive(Debug, Clone, Default)]
pub struct VirtualHaptic {
    played: Arc<Mutex<Vec<(HapticEffect, f32)>>>,
}

impl VirtualHaptic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<(HapticEffect, f32)> {
        self.played
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Haptic for VirtualHaptic {
    fn play(&mut self, effect: HapticEffect, strength: f32) -> io::Result<()> {
        self.played
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((effect, strength.clamp(0.0, 1.0)));
        Ok(())
    }
}

/// DRV2605 on `bus` if enabled and present, otherwise a virtual driver
pub fn open_haptic(enabled: bool, bus: u32) -> Box<dyn Haptic> {
    if !enabled {
        debug!("Haptics disabled");
        return Box::new(VirtualHaptic::new());
    }
    match Drv2605::open(bus) {
        Ok(driver) => {
            info!(bus, "Haptic driver ready");
            Box::new(driver)
        }
        Err(e) => {
            warn!(bus, error = %e, "Haptic driver unavailable, using virtual");
            Box::new(VirtualHaptic::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::drv2605::*;
    use super::*;

    #[derive(Clone, Default)]
    struct RecordingBus {
        writes: Arc<Mutex<Vec<(u8, u8)>>>,
        absent: bool,
    }

    impl RegisterBus for RecordingBus {
        fn read_reg(&mut self, _reg: u8) -> io::Result<u8> {
            if self.absent {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            Ok(0xE0)
        }

        fn write_reg(&mut self, reg: u8, value: u8) -> io::Result<()> {
            self.writes.lock().unwrap().push((reg, value));
            Ok(())
        }
    }

    #[test]
    fn test_init_configures_lra() {
        let bus = RecordingBus::default();
        let driver = Drv2605::new(bus.clone()).unwrap();
        assert_eq!(
            *bus.writes.lock().unwrap(),
            [
                (REG_MODE, MODE_INTERNAL_TRIGGER),
                (REG_LIBRARY, LIBRARY_LRA),
                (REG_FEEDBACK_CONTROL, FEEDBACK_LRA),
                (REG_RATED_VOLTAGE, RATED_VOLTAGE),
                (REG_CLAMP_VOLTAGE, CLAMP_VOLTAGE),
                (REG_CONTROL3, CONTROL3),
            ]
        );

        drop(driver);
        assert_eq!(bus.writes.lock().unwrap().last(), Some(&(REG_MODE, MODE_STANDBY)));
    }

    #[test]
    fn test_missing_chip_fails_before_any_write() {
        let bus = RecordingBus {
            absent: true,
            ..RecordingBus::default()
        };
        assert!(Drv2605::new(bus.clone()).is_err());
        assert!(bus.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_play_writes_sequence_and_go() {
        let bus = RecordingBus::default();
        let mut driver = Drv2605::new(bus.clone()).unwrap();
        bus.writes.lock().unwrap().clear();

        driver.play(HapticEffect::SharpClick, 0.8).unwrap();
        assert_eq!(
            *bus.writes.lock().unwrap(),
            [
                (REG_OVERDRIVE_OFFSET, 101),
                (REG_WAVEFORM_SEQ_1, 47),
                (REG_WAVEFORM_SEQ_2, 0),
                (REG_GO, 1),
            ]
        );
    }

    #[test]
    fn test_strength_is_clamped() {
        let bus = RecordingBus::default();
        let mut driver = Drv2605::new(bus.clone()).unwrap();
        bus.writes.lock().unwrap().clear();

        driver.play(HapticEffect::DoubleClick, 3.0).unwrap();
        assert_eq!(bus.writes.lock().unwrap()[0], (REG_OVERDRIVE_OFFSET, 127));
    }

    #[test]
    fn test_disabled_haptics_are_virtual() {
        let mut haptic = open_haptic(false, 1);
        assert!(haptic.play(HapticEffect::StrongClick, 0.3).is_ok());
    }
}
