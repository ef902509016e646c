// SPDX-License-Identifier: GPL-3.0-only

//! Persisted configuration
//!
//! Configuration is a two-level JSON document (`section.key`). Components
//! never touch the file: they go through [`ConfigProvider`], and read typed
//! views such as [`CameraSettings`] built from it. [`JsonConfigStore`] is the
//! on-disk provider; writes go to a temp file that is fsynced and renamed
//! over the original so a power cut never leaves a truncated config.

use crate::app::touch::TouchRotation;
use crate::backends::backlight::BrightnessMode;
use crate::backends::camera::CameraBackendType;
use crate::backends::camera::types::{Resolution, StreamMode};
use crate::constants::APP_DIR_NAME;
use crate::constants::display::{LOGICAL_HEIGHT, LOGICAL_WIDTH};
use crate::errors::ConfigError;
use crate::flash::FlashMode;
use crate::pipelines::filters::FilterKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key-value configuration source
pub trait ConfigProvider: Send {
    /// Raw value at `section.key`, if present
    fn get_value(&self, section: &str, key: &str) -> Option<Value>;

    /// Store a value, writing the backing file when `persist` is set
    fn set_value(
        &mut self,
        section: &str,
        key: &str,
        value: Value,
        persist: bool,
    ) -> Result<(), ConfigError>;

    /// Write the current document to its backing store
    fn save(&self) -> Result<(), ConfigError>;
}

/// Typed accessors over any [`ConfigProvider`]
pub trait ConfigExt {
    /// Value at `section.key` deserialized as `T`, or `default` when missing
    /// or of the wrong shape
    fn get<T: DeserializeOwned>(&self, section: &str, key: &str, default: T) -> T;

    fn set<T: Serialize>(
        &mut self,
        section: &str,
        key: &str,
        value: T,
        persist: bool,
    ) -> Result<(), ConfigError>;
}

impl<C: ConfigProvider + ?Sized> ConfigExt for C {
    fn get<T: DeserializeOwned>(&self, section: &str, key: &str, default: T) -> T {
        let Some(value) = self.get_value(section, key) else {
            return default;
        };
        match serde_json::from_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(section, key, error = %e, "Config value has unexpected type, using default");
                default
            }
        }
    }

    fn set<T: Serialize>(
        &mut self,
        section: &str,
        key: &str,
        value: T,
        persist: bool,
    ) -> Result<(), ConfigError> {
        let value = serde_json::to_value(value).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(format!("{section}.{key}")),
            source,
        })?;
        self.set_value(section, key, value, persist)
    }
}

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("config.json")
}

/// Default location for saved photos
pub fn default_photos_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default location of the health status file
pub fn default_health_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("health.json")
}

/// Built-in configuration document
pub fn default_document() -> Value {
    json!({
        "camera": {
            "backend": "simulated",
            "device": "/dev/video0",
            "preview_width": 640,
            "preview_height": 480,
            "preview_fps": 24,
            "capture_width": 2592,
            "capture_height": 1944,
            "capture_quality": 92,
            "capture_mode": "still"
        },
        "display": {
            "width": LOGICAL_WIDTH,
            "height": LOGICAL_HEIGHT,
            "brightness_mode": "auto",
            "brightness_dark": 40,
            "brightness_medium": 120,
            "brightness_bright": 220
        },
        "input": {
            "touch_rotation": "identity"
        },
        "filter": {
            "active": "none",
            "iso_fake": 400
        },
        "flash": {
            "mode": "off",
            "auto_threshold_lux": 60.0,
            "max_on_ms": 1000
        },
        "haptic": {
            "enabled": true,
            "i2c_bus": 1
        },
        "power": {
            "standby_timeout_s": 30.0,
            "shutdown_long_press_s": 1.8,
            "poweroff_command": []
        },
        "storage": {
            "photos_dir": default_photos_dir(),
            "max_photos": 500
        },
        "system": {
            "health_path": default_health_path()
        }
    })
}

/// JSON-file backed configuration
#[derive(Debug)]
pub struct JsonConfigStore {
    /// `None` for an in-memory store that never touches disk
    path: Option<PathBuf>,
    document: Map<String, Value>,
}

impl JsonConfigStore {
    /// Load `path`, creating it from defaults if missing or unreadable
    ///
    /// Keys missing from an existing file are filled in from the defaults so
    /// older files keep working after new settings are added.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let defaults = default_object();

        let (document, needs_write) = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(mut existing)) => {
                    let added = merge_missing(&mut existing, &defaults);
                    (existing, added > 0)
                }
                Ok(_) => {
                    warn!(path = %path.display(), "Config root is not an object, using defaults");
                    (defaults, true)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Config file is corrupt, using defaults");
                    (defaults, true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config found, creating defaults");
                (defaults, true)
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let store = Self {
            path: Some(path),
            document,
        };
        if needs_write {
            store.save()?;
        }
        info!(path = ?store.path, "Configuration loaded");
        Ok(store)
    }

    /// Defaults only, never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: default_object(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whole document, for `config show`
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }
}

impl ConfigProvider for JsonConfigStore {
    fn get_value(&self, section: &str, key: &str) -> Option<Value> {
        self.document
            .get(section)
            .and_then(|s| s.get(key))
            .cloned()
    }

    fn set_value(
        &mut self,
        section: &str,
        key: &str,
        value: Value,
        persist: bool,
    ) -> Result<(), ConfigError> {
        debug!(section, key, %value, persist, "Config value set");
        let entry = self
            .document
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
        if persist { self.save() } else { Ok(()) }
    }

    fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&self.document).map_err(|source| {
            ConfigError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        write_atomic(path, text.as_bytes()).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })
    }
}

/// Write `bytes` to `path` through a synced temp file and rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn default_object() -> Map<String, Value> {
    match default_document() {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Copy keys present in `defaults` but absent in `target`. Returns how many were added.
fn merge_missing(target: &mut Map<String, Value>, defaults: &Map<String, Value>) -> usize {
    let mut added = 0;
    for (section, default_section) in defaults {
        match (target.get_mut(section), default_section) {
            (Some(Value::Object(existing)), Value::Object(default_keys)) => {
                for (key, value) in default_keys {
                    if !existing.contains_key(key) {
                        existing.insert(key.clone(), value.clone());
                        added += 1;
                    }
                }
            }
            (Some(_), _) => {}
            (None, value) => {
                target.insert(section.clone(), value.clone());
                added += 1;
            }
        }
    }
    added
}

/// How a capture trigger turns into a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Reconfigure the sensor for a full-resolution still
    #[default]
    Still,
    /// Filter and save the live preview frame
    Preview,
}

/// Camera section
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub backend: CameraBackendType,
    pub device: String,
    pub preview: Resolution,
    pub preview_fps: u32,
    pub capture: Resolution,
    pub capture_quality: u8,
    pub capture_mode: CaptureMode,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self::from_config(&JsonConfigStore::in_memory())
    }
}

impl CameraSettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(cfg: &C) -> Self {
        Self {
            backend: cfg.get("camera", "backend", CameraBackendType::default()),
            device: cfg.get("camera", "device", "/dev/video0".to_string()),
            preview: Resolution::new(
                cfg.get("camera", "preview_width", 640),
                cfg.get("camera", "preview_height", 480),
            ),
            preview_fps: cfg.get::<u32>("camera", "preview_fps", 24).max(1),
            capture: Resolution::new(
                cfg.get("camera", "capture_width", 2592),
                cfg.get("camera", "capture_height", 1944),
            ),
            capture_quality: cfg.get::<u8>("camera", "capture_quality", 92).clamp(1, 100),
            capture_mode: cfg.get("camera", "capture_mode", CaptureMode::default()),
        }
    }

    pub fn preview_mode(&self) -> StreamMode {
        StreamMode::Preview {
            resolution: self.preview,
            fps: self.preview_fps,
        }
    }

    pub fn still_mode(&self) -> StreamMode {
        StreamMode::Still {
            resolution: self.capture,
        }
    }

    /// Target interval between orchestrator ticks
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.preview_fps.max(1) as f64)
    }
}

/// Display and input section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    pub size: Resolution,
    pub brightness_mode: BrightnessMode,
    pub brightness_dark: u32,
    pub brightness_medium: u32,
    pub brightness_bright: u32,
    pub touch_rotation: TouchRotation,
}

impl DisplaySettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(cfg: &C) -> Self {
        Self {
            size: Resolution::new(
                cfg.get("display", "width", LOGICAL_WIDTH),
                cfg.get("display", "height", LOGICAL_HEIGHT),
            ),
            brightness_mode: cfg.get("display", "brightness_mode", BrightnessMode::default()),
            brightness_dark: cfg.get("display", "brightness_dark", 40),
            brightness_medium: cfg.get("display", "brightness_medium", 120),
            brightness_bright: cfg.get("display", "brightness_bright", 220),
            touch_rotation: cfg.get("input", "touch_rotation", TouchRotation::default()),
        }
    }
}

/// Filter section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSettings {
    pub active: FilterKind,
    pub iso: u32,
}

impl FilterSettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(cfg: &C) -> Self {
        Self {
            active: cfg.get("filter", "active", FilterKind::None),
            iso: cfg.get("filter", "iso_fake", 400),
        }
    }
}

/// Flash section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlashSettings {
    pub mode: FlashMode,
    pub auto_threshold_lux: f32,
    /// Longest time the LED may stay lit before the watchdog cuts it
    pub max_on: Duration,
}

impl FlashSettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(cfg: &C) -> Self {
        Self {
            mode: cfg.get("flash", "mode", FlashMode::default()),
            auto_threshold_lux: cfg.get("flash", "auto_threshold_lux", 60.0),
            max_on: Duration::from_millis(cfg.get("flash", "max_on_ms", 1000)),
        }
    }
}

/// Haptic section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HapticSettings {
    pub enabled: bool,
    /// N in `/dev/i2c-N`
    pub i2c_bus: u32,
}

impl HapticSettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(cfg: &C) -> Self {
        Self {
            enabled: cfg.get("haptic", "enabled", true),
            i2c_bus: cfg.get("haptic", "i2c_bus", 1),
        }
    }
}

/// Power section
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSettings {
    pub standby_timeout: Duration,
    pub long_press: Duration,
    /// Program and arguments run at the end of the shutdown sequence; empty disables
    pub poweroff_command: Vec<String>,
}

impl PowerSettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(cfg: &C) -> Self {
        Self {
            standby_timeout: secs(cfg.get("power", "standby_timeout_s", 30.0)),
            long_press: secs(cfg.get("power", "shutdown_long_press_s", 1.8)),
            poweroff_command: cfg.get("power", "poweroff_command", Vec::new()),
        }
    }
}

/// Storage section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub photos_dir: PathBuf,
    pub max_photos: usize,
    pub health_path: PathBuf,
}

impl StorageSettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(cfg: &C) -> Self {
        Self {
            photos_dir: cfg.get("storage", "photos_dir", default_photos_dir()),
            max_photos: cfg.get("storage", "max_photos", 500),
            health_path: cfg.get("system", "health_path", default_health_path()),
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
