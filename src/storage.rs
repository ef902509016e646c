// SPDX-License-Identifier: GPL-3.0-only

//! Photo files on disk
//!
//! Photos are JPEG files named `photo_YYYYmmdd_HHMMSS.jpg` in one flat
//! directory. Two captures within the same second get `_01`, `_02`, ...
//! suffixes. Retention keeps the newest `max` files by modification time.

use crate::backends::camera::types::Frame;
use crate::constants::file_formats::{IMAGE_EXTENSIONS, PHOTO_PREFIX, PHOTO_TIMESTAMP_FORMAT};
use crate::errors::StorageError;
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Storage and retention collaborator used by the orchestrator
pub trait PhotoStorage: Send {
    /// Fresh, unused path for the next photo
    fn next_path(&mut self) -> Result<PathBuf, StorageError>;

    /// Encode and store a processed frame
    fn save(&mut self, frame: &Frame, quality: u8) -> Result<PathBuf, StorageError>;

    /// Delete the oldest photos beyond `max`. Returns how many were removed.
    fn enforce_limit(&mut self, max: usize) -> Result<usize, StorageError>;
}

/// Encode an RGB frame as JPEG bytes
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, StorageError> {
    if !frame.is_well_formed() {
        return Err(StorageError::Encode(format!(
            "frame buffer is {} bytes, expected {} for {}",
            frame.data.len(),
            frame.resolution().rgb_len(),
            frame.resolution()
        )));
    }

    let mut output = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
        encoder.encode(
            &frame.data,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )?;
    }
    Ok(output)
}

/// Encode a frame and write it to `path`
pub fn write_jpeg(frame: &Frame, path: &Path, quality: u8) -> Result<(), StorageError> {
    let bytes = encode_jpeg(frame, quality)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;
    debug!(path = %path.display(), size = bytes.len(), "JPEG written");
    Ok(())
}

/// Directory-backed photo store
#[derive(Debug, Clone)]
pub struct PhotoStore {
    photos_dir: PathBuf,
}

impl PhotoStore {
    /// Open (and create) the photo directory
    pub fn open(photos_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let photos_dir = photos_dir.into();
        fs::create_dir_all(&photos_dir)?;
        info!(dir = %photos_dir.display(), "Photo store ready");
        Ok(Self { photos_dir })
    }

    pub fn photos_dir(&self) -> &Path {
        &self.photos_dir
    }

    /// Photos, newest first
    pub fn list_photos(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.photos_dir) else {
            warn!(dir = %self.photos_dir.display(), "Cannot read photo directory");
            return Vec::new();
        };

        let mut photos: Vec<(SystemTime, PathBuf)> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_photo(p))
            .map(|p| {
                let modified = fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, p)
            })
            .collect();

        // Same-second captures share an mtime; the name suffix orders them.
        photos.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        photos.into_iter().map(|(_, p)| p).collect()
    }

    pub fn photo_count(&self) -> usize {
        self.list_photos().len()
    }

    /// Remove one photo, refusing paths outside the store
    pub fn delete(&self, path: &Path) -> Result<(), StorageError> {
        if path.parent() != Some(self.photos_dir.as_path()) || !is_photo(path) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a stored photo", path.display()),
            )));
        }
        fs::remove_file(path)?;
        info!(path = %path.display(), "Photo deleted");
        Ok(())
    }

    fn unique_path(&self, stamp: &str) -> PathBuf {
        let mut path = self
            .photos_dir
            .join(format!("{PHOTO_PREFIX}{stamp}.jpg"));
        let mut counter = 1;
        while path.exists() {
            path = self
                .photos_dir
                .join(format!("{PHOTO_PREFIX}{stamp}_{counter:02}.jpg"));
            counter += 1;
        }
        path
    }
}

impl PhotoStorage for PhotoStore {
    fn next_path(&mut self) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.photos_dir)?;
        let stamp = Local::now().format(PHOTO_TIMESTAMP_FORMAT).to_string();
        Ok(self.unique_path(&stamp))
    }

    fn save(&mut self, frame: &Frame, quality: u8) -> Result<PathBuf, StorageError> {
        let path = self.next_path()?;
        write_jpeg(frame, &path, quality)?;
        info!(path = %path.display(), "Photo saved");
        Ok(path)
    }

    fn enforce_limit(&mut self, max: usize) -> Result<usize, StorageError> {
        let photos = self.list_photos();
        if photos.len() <= max {
            return Ok(0);
        }

        let mut removed = 0;
        for photo in &photos[max..] {
            match fs::remove_file(photo) {
                Ok(()) => {
                    debug!(path = %photo.display(), "Deleted old photo");
                    removed += 1;
                }
                Err(e) => warn!(path = %photo.display(), error = %e, "Failed to delete old photo"),
            }
        }
        info!(removed, kept = max, "Photo retention enforced");
        Ok(removed)
    }
}

fn is_photo(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PHOTO_PREFIX));
    let extension_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)));
    named && extension_ok
}
