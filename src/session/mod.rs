//! Acquisition session: the single owner of a device and its consumers.
//!
//! Control commands from the user interface are queued through a
//! [`Controller`] and applied between device events, so device state and
//! calibration state only ever change on the session thread.

mod control;
mod runtime;

pub use control::{
    ChannelSelection, ControlCommand, Controller, ExposureChannel, ExposureChannels,
};
pub use runtime::{DisplaySink, DisplayUpdate, FrameUpdate, NullDisplay, Session, SessionError};
