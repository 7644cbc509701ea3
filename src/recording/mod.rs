//! Recording of corrected frames.
//!
//! Sequences are multi-page 16-bit TIFF files of a centered, optionally
//! rebinned window. Videos carry the 8-bit display representation. Stills
//! are single-page TIFF snapshots of the latest frame.

mod error;
mod recorder;
mod sequence;
mod still;
mod video;
mod window;

pub use error::{RecordingError, RecordingKind};
pub use recorder::{RecordOutcome, Recorder};
pub use sequence::SequenceWriter;
pub use still::{write_tiff16, CapturedStill, StillCapture};
pub use video::{extension_for, open_video, FourCC, VideoEncoder, Y4mEncoder};
pub use window::WindowSpec;
