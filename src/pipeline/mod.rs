//! Live acquisition path.
//!
//! Frame-rate smoothing, black correction of delivered frames and the
//! 8-bit display representation with its histogram and contrast controls.

mod acquisition;
mod display;
mod fps;

pub use acquisition::{live_status, AcquisitionPipeline, DisplayState, ProcessedFrame};
pub use display::{
    auto_contrast, histogram, region_auto_contrast, to_display, DisplayImage, IntensityWindow,
    Region,
};
pub use fps::FpsSmoother;
