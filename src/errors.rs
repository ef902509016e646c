// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera appliance core

use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error surfaced by the binary
#[derive(Debug)]
pub enum AppError {
    /// Camera-related errors
    Camera(CameraError),
    /// Configuration load/save errors
    Config(ConfigError),
    /// Photo storage errors
    Storage(StorageError),
    /// Generic error with message
    Other(String),
}

/// Camera-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Device missing or failed to initialize after all retries
    HardwareUnavailable(String),
    /// A single frame read failed (retried by the acquisition loop)
    AcquisitionError(String),
    /// A still capture step failed
    CaptureFailure(String),
    /// Device rejected a mode or control request
    Device(String),
}

/// Sensor read errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// Reading failed this time, the sensor may answer next time
    ReadFailed(String),
    /// Sensor is not present
    Unavailable(String),
}

/// Configuration store errors
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file or value was not valid JSON for the requested type
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Photo storage errors
#[derive(Debug)]
pub enum StorageError {
    /// Filesystem operation failed
    Io(std::io::Error),
    /// JPEG encoding failed
    Encode(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::HardwareUnavailable(msg) => write!(f, "Camera unavailable: {}", msg),
            CameraError::AcquisitionError(msg) => write!(f, "Frame acquisition failed: {}", msg),
            CameraError::CaptureFailure(msg) => write!(f, "Still capture failed: {}", msg),
            CameraError::Device(msg) => write!(f, "Device error: {}", msg),
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::ReadFailed(msg) => write!(f, "Sensor read failed: {}", msg),
            SensorError::Unavailable(msg) => write!(f, "Sensor unavailable: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "{}: invalid JSON: {}", path.display(), source)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Encode(msg) => write!(f, "Encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for SensorError {}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Encode(_) => None,
        }
    }
}

// Conversions from sub-errors to AppError
impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<image::ImageError> for StorageError {
    fn from(err: image::ImageError) -> Self {
        StorageError::Encode(err.to_string())
    }
}

impl From<StorageError> for CameraError {
    fn from(err: StorageError) -> Self {
        CameraError::CaptureFailure(err.to_string())
    }
}
