//! Control surface consumed from the user interface.

use crate::capture::{ExposureError, ExposureTable, LedMode};
use crate::pipeline::Region;
use crossbeam_channel::{SendError, Sender};

/// The two exposure channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureChannel {
    /// "Bright" exposure.
    Primary,
    /// "Fluor" exposure.
    Secondary,
}

impl ExposureChannel {
    pub fn other(self) -> Self {
        match self {
            ExposureChannel::Primary => ExposureChannel::Secondary,
            ExposureChannel::Secondary => ExposureChannel::Primary,
        }
    }
}

/// Exposure and IFI indices of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelection {
    pub exposure_index: usize,
    pub ifi_index: usize,
}

/// Per-channel selections; exactly one channel is active.
#[derive(Debug, Clone)]
pub struct ExposureChannels {
    primary: ChannelSelection,
    secondary: ChannelSelection,
    active: ExposureChannel,
}

impl ExposureChannels {
    /// Both channels free-running, primary active.
    pub fn new(primary_exposure: usize, secondary_exposure: usize) -> Self {
        Self {
            primary: ChannelSelection {
                exposure_index: primary_exposure,
                ifi_index: 0,
            },
            secondary: ChannelSelection {
                exposure_index: secondary_exposure,
                ifi_index: 0,
            },
            active: ExposureChannel::Primary,
        }
    }

    pub fn active(&self) -> ExposureChannel {
        self.active
    }

    pub fn selection(&self, channel: ExposureChannel) -> ChannelSelection {
        match channel {
            ExposureChannel::Primary => self.primary,
            ExposureChannel::Secondary => self.secondary,
        }
    }

    pub fn active_selection(&self) -> ChannelSelection {
        self.selection(self.active)
    }

    fn selection_mut(&mut self, channel: ExposureChannel) -> &mut ChannelSelection {
        match channel {
            ExposureChannel::Primary => &mut self.primary,
            ExposureChannel::Secondary => &mut self.secondary,
        }
    }

    /// Sets a channel's exposure and makes it active.
    ///
    /// The channel's IFI is re-resolved against the new exposure. Returns
    /// the selection to program.
    pub fn set_exposure(
        &mut self,
        table: &ExposureTable,
        channel: ExposureChannel,
        exposure_index: usize,
    ) -> Result<ChannelSelection, ExposureError> {
        let requested_ifi = self.selection(channel).ifi_index;
        let ifi_index = resolve_ifi(table, exposure_index, requested_ifi)?;
        self.active = channel;
        let selection = self.selection_mut(channel);
        selection.exposure_index = exposure_index;
        selection.ifi_index = ifi_index;
        Ok(*selection)
    }

    /// Sets a channel's IFI, clamping intervals shorter than its exposure.
    pub fn set_ifi(
        &mut self,
        table: &ExposureTable,
        channel: ExposureChannel,
        ifi_index: usize,
    ) -> Result<ChannelSelection, ExposureError> {
        let exposure_index = self.selection(channel).exposure_index;
        let ifi_index = resolve_ifi(table, exposure_index, ifi_index)?;
        let selection = self.selection_mut(channel);
        selection.ifi_index = ifi_index;
        Ok(*selection)
    }

    /// Makes the other channel active and returns its selection.
    pub fn toggle(&mut self) -> ChannelSelection {
        self.active = self.active.other();
        self.active_selection()
    }
}

/// Validates an IFI request, logging when it has to be replaced.
fn resolve_ifi(
    table: &ExposureTable,
    exposure_index: usize,
    ifi_index: usize,
) -> Result<usize, ExposureError> {
    let resolved = table.resolve_ifi(exposure_index, ifi_index)?;
    if resolved != ifi_index {
        tracing::warn!(
            requested = ifi_index,
            resolved,
            exposure_index,
            "Interval shorter than exposure; using next valid interval"
        );
    }
    Ok(resolved)
}

/// Commands accepted by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    SelectExposure {
        channel: ExposureChannel,
        exposure_index: usize,
    },
    SelectIfi {
        channel: ExposureChannel,
        ifi_index: usize,
    },
    /// Swap the active exposure channel and its saved intensity window.
    ToggleChannel,
    SetLed(LedMode),
    StartCalibration,
    CancelCalibration,
    StartSequence,
    StopSequence,
    StartVideo,
    StopVideo,
    Capture,
    SetWindowLow(f64),
    SetWindowHigh(f64),
    ResetWindow,
    AutoContrast,
    RegionAutoContrast(Region),
    SetCorrection(bool),
    Shutdown,
}

/// Handle for sending commands to a session from any thread.
#[derive(Debug, Clone)]
pub struct Controller {
    tx: Sender<ControlCommand>,
}

impl Controller {
    pub(crate) fn new(tx: Sender<ControlCommand>) -> Self {
        Self { tx }
    }

    /// Queues a command. Fails only when the session is gone.
    pub fn send(&self, command: ControlCommand) -> Result<(), SendError<ControlCommand>> {
        self.tx.send(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_activates_channel() {
        let table = ExposureTable::standard();
        let mut channels = ExposureChannels::new(5, 9);
        assert_eq!(channels.active(), ExposureChannel::Primary);

        let sel = channels
            .set_exposure(&table, ExposureChannel::Secondary, 10)
            .unwrap();
        assert_eq!(channels.active(), ExposureChannel::Secondary);
        assert_eq!(sel.exposure_index, 10);
        assert_eq!(channels.selection(ExposureChannel::Primary).exposure_index, 5);
    }

    #[test]
    fn test_select_returns_active_selection() {
        let table = ExposureTable::standard();
        let mut channels = ExposureChannels::new(5, 9);
        channels.toggle();

        let sel = channels
            .set_exposure(&table, ExposureChannel::Primary, 7)
            .unwrap();
        assert_eq!(channels.active(), ExposureChannel::Primary);
        assert_eq!(channels.active_selection(), sel);
        assert_eq!(channels.selection(ExposureChannel::Secondary).exposure_index, 9);
    }

    #[test]
    fn test_toggle_swaps_active() {
        let mut channels = ExposureChannels::new(3, 7);
        assert_eq!(channels.toggle().exposure_index, 7);
        assert_eq!(channels.toggle().exposure_index, 3);
    }

    #[test]
    fn test_short_ifi_clamped() {
        let table = ExposureTable::standard();
        let mut channels = ExposureChannels::new(11, 0);
        // 800 ms exposure; 200 and 500 ms intervals are too short
        let sel = channels
            .set_ifi(&table, ExposureChannel::Primary, 1)
            .unwrap();
        assert_eq!(sel.ifi_index, 3);
    }

    #[test]
    fn test_longer_exposure_reresolves_ifi() {
        let table = ExposureTable::standard();
        let mut channels = ExposureChannels::new(0, 0);
        channels.set_ifi(&table, ExposureChannel::Primary, 1).unwrap();

        // 4000 ms needs at least the 5000 ms interval
        let sel = channels
            .set_exposure(&table, ExposureChannel::Primary, 16)
            .unwrap();
        assert_eq!(sel.ifi_index, 5);
    }

    #[test]
    fn test_out_of_range_exposure_rejected() {
        let table = ExposureTable::standard();
        let mut channels = ExposureChannels::new(0, 0);
        assert!(channels
            .set_exposure(&table, ExposureChannel::Primary, 99)
            .is_err());
        assert_eq!(channels.active_selection().exposure_index, 0);
    }
}
