//! On-disk persistence of black references.
//!
//! One file per exposure duration, named `BLK#####.blk` after the rounded
//! duration in milliseconds. Files are bincode-encoded and carry their
//! dimensions so a reference taken with another sensor size is rejected.

use crate::capture::Frame;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationIoError {
    #[error("calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("calibration file {path} is corrupt: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to encode calibration file {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("calibration file {path} is {found_width}x{found_height}, expected {width}x{height}")]
    Shape {
        path: PathBuf,
        found_width: u32,
        found_height: u32,
        width: u32,
        height: u32,
    },
}

#[derive(Serialize, Deserialize)]
struct StoredReference {
    width: u32,
    height: u32,
    data: Vec<i16>,
}

/// Directory of stored references.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    dir: PathBuf,
}

impl ReferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the reference for `duration_ms`.
    pub fn path_for(&self, duration_ms: f64) -> PathBuf {
        self.dir
            .join(format!("BLK{:05}.blk", duration_ms.round() as u64))
    }

    /// Reads the reference for `duration_ms`.
    ///
    /// A missing file is not an error and yields `Ok(None)`.
    pub fn load(
        &self,
        duration_ms: f64,
        width: u32,
        height: u32,
    ) -> Result<Option<Frame>, CalibrationIoError> {
        let path = self.path_for(duration_ms);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CalibrationIoError::Io { path, source }),
        };

        let stored: StoredReference = bincode::deserialize(&bytes)
            .map_err(|source| CalibrationIoError::Decode {
                path: path.clone(),
                source,
            })?;

        let expected = width as usize * height as usize;
        if stored.width != width || stored.height != height || stored.data.len() != expected {
            return Err(CalibrationIoError::Shape {
                path,
                found_width: stored.width,
                found_height: stored.height,
                width,
                height,
            });
        }

        Ok(Some(Frame::new(stored.data, width, height, 0)))
    }

    /// Writes the reference for `duration_ms`, replacing any previous file.
    pub fn save(&self, duration_ms: f64, reference: &Frame) -> Result<PathBuf, CalibrationIoError> {
        let path = self.path_for(duration_ms);
        fs::create_dir_all(&self.dir).map_err(|source| CalibrationIoError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let stored = StoredReference {
            width: reference.width(),
            height: reference.height(),
            data: reference.pixels().to_vec(),
        };
        let bytes = bincode::serialize(&stored).map_err(|source| CalibrationIoError::Encode {
            path: path.clone(),
            source,
        })?;

        // Write then rename so a crash never leaves a truncated reference.
        let tmp = path.with_extension("blk.tmp");
        fs::write(&tmp, &bytes).map_err(|source| CalibrationIoError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| CalibrationIoError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "Saved black reference");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_naming() {
        let store = ReferenceStore::new("/cal");
        assert_eq!(store.path_for(20.0), PathBuf::from("/cal/BLK00020.blk"));
        assert_eq!(store.path_for(4000.0), PathBuf::from("/cal/BLK04000.blk"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(dir.path().join("cal"));
        let reference = Frame::new(vec![1, 2, 3, 4, 5, 6], 3, 2, 0);

        let path = store.save(50.0, &reference).unwrap();
        assert!(path.ends_with("BLK00050.blk"));

        let loaded = store.load(50.0, 3, 2).unwrap().unwrap();
        assert_eq!(loaded.pixels(), reference.pixels());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(dir.path());
        assert!(store.load(100.0, 4, 4).unwrap().is_none());
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(dir.path());
        store.save(100.0, &Frame::zeros(4, 4)).unwrap();

        assert!(matches!(
            store.load(100.0, 8, 8),
            Err(CalibrationIoError::Shape { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(dir.path());
        fs::write(store.path_for(100.0), b"xx").unwrap();

        assert!(matches!(
            store.load(100.0, 4, 4),
            Err(CalibrationIoError::Decode { .. })
        ));
    }
}
