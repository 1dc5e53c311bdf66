//! Flash wait states
//!
//! The flash read latency has to be raised before HCLK goes up, and may
//! only be lowered once the new (lower) frequency is in effect. How many
//! wait states a frequency needs depends on the supply voltage.

use super::ClockError;

/// One supply voltage range of a [`WaitStateTable`]
#[derive(Clone, Copy, Debug)]
pub struct WaitStateEntry {
    /// Lowest supply voltage this row applies to
    pub min_voltage_mv: u32,
    /// Highest HCLK, in MHz, usable with `index` wait states. Strictly
    /// increasing, at most 10 entries.
    pub thresholds_mhz: &'static [u32],
}

/// Rows ordered by strictly decreasing `min_voltage_mv`
#[derive(Clone, Copy, Debug)]
pub struct WaitStateTable {
    pub entries: &'static [WaitStateEntry],
}

/// RM0385, table 5: "Number of wait states according to CPU clock (HCLK)
/// frequency"
pub const STM32F746_WAIT_STATES: WaitStateTable = WaitStateTable {
    entries: &[
        WaitStateEntry {
            min_voltage_mv: 2700,
            thresholds_mhz: &[30, 60, 90, 120, 150, 180, 210, 216],
        },
        WaitStateEntry {
            min_voltage_mv: 2400,
            thresholds_mhz: &[24, 48, 72, 96, 120, 144, 168, 192, 216],
        },
        WaitStateEntry {
            min_voltage_mv: 2100,
            thresholds_mhz: &[22, 44, 66, 88, 110, 132, 154, 176, 198, 216],
        },
        WaitStateEntry {
            min_voltage_mv: 1800,
            thresholds_mhz: &[20, 40, 60, 80, 100, 120, 140, 160, 180],
        },
    ],
};

impl WaitStateTable {
    /// Minimum number of wait states for `frequency_hz` at `voltage_mv`.
    ///
    /// The frequency is rounded *up* to whole MHz before the comparison, so
    /// 30.5MHz is not treated as 30MHz.
    pub fn lookup(&self, frequency_hz: u32, voltage_mv: u32) -> Result<u8, ClockError> {
        let not_found = ClockError::NotFound {
            frequency_hz,
            voltage_mv,
        };
        let entry = self
            .entries
            .iter()
            .find(|e| e.min_voltage_mv <= voltage_mv)
            .ok_or(not_found)?;

        let mhz = frequency_hz.div_ceil(1_000_000);
        entry
            .thresholds_mhz
            .iter()
            .position(|&max| max >= mhz)
            .map(|ws| ws as u8)
            .ok_or(not_found)
    }

    /// The largest count any row can produce. Used as the worst case while
    /// a transition is in progress.
    pub fn max_wait_states(&self) -> u8 {
        self.entries
            .iter()
            .map(|e| e.thresholds_mhz.len().saturating_sub(1))
            .max()
            .unwrap_or(0) as u8
    }
}
