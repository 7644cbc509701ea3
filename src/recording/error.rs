use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The two independent recording kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingKind {
    Sequence,
    Video,
}

impl fmt::Display for RecordingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingKind::Sequence => write!(f, "sequence"),
            RecordingKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("TIFF encoding failed: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("unsupported video codec {0:?}")]
    UnsupportedCodec(String),

    #[error("window {width}x{height} does not fit a {frame_width}x{frame_height} frame")]
    InvalidWindow {
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("{0} recording is already active")]
    AlreadyActive(RecordingKind),
}

impl RecordingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RecordingError::Io {
            path: path.into(),
            source,
        }
    }
}
