//! PLL configuration and frequency arithmetic
//!
//! Everything in here is pure: no register is touched. The controller uses
//! these helpers to validate a [`PllConfig`] before it starts sequencing
//! hardware, and the queries use them to derive frequencies on demand.

use super::config::ClockSource;
use super::{ClockError, Field};

/// Parameters of one PLL unit.
///
/// ```text
///              ┌────┐  vco_input  ┌────┐   vco   ┌────┐
/// reference ──▶│ /M │────────────▶│ xN │───┬────▶│ /P │───▶ p_out
///              └────┘             └────┘   │     └────┘
///                                          │     ┌────┐
///                                          ├────▶│ /Q │───▶ q_out
///                                          │     └────┘
///                                          │     ┌────┐
///                                          └────▶│ /R │───▶ r_out
///                                                └────┘
/// ```
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllConfig {
    /// PLL reference, only [`ClockSource::Hsi`] or [`ClockSource::Hse`]
    pub source: ClockSource,
    /// Input divider.
    ///
    /// Allowed range: `2..=63`.
    pub m: u8,
    /// VCO multiplier.
    ///
    /// Allowed range: `50..=432`.
    pub n: u16,
    /// Main output divider.
    ///
    /// Allowed values: 2, 4, 6, 8.
    pub p: u8,
    /// Secondary output divider, 0 when the output is unused.
    ///
    /// Allowed range: `2..=15`.
    pub q: u8,
    /// Third output divider, 0 when the output is unused.
    ///
    /// Allowed range: `2..=7`.
    pub r: u8,
}

/// Frequencies produced by a [`PllConfig`] for a given reference
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PllOutputFrequencies {
    /// Frequency of the selected oscillator
    pub reference: u32,
    /// `reference / M`, should be 1MHz..2MHz for lowest jitter
    pub vco_input: u32,
    /// `reference * N / M`
    pub vco: u32,
    /// `vco / P`
    pub p_out: u32,
    /// `vco / Q`, 0 when Q is unused
    pub q_out: u32,
    /// `vco / R`, 0 when R is unused
    pub r_out: u32,
}

impl PllConfig {
    /// Build a configuration whose VCO input runs at exactly 1MHz.
    ///
    /// `reference_hz` must be a whole number of MHz for that to hold.
    pub const fn with_1mhz_input(source: ClockSource, reference_hz: u32, n: u16, p: u8) -> Self {
        Self {
            source,
            m: (reference_hz / 1_000_000) as u8,
            n,
            p,
            q: 2,
            r: 0,
        }
    }

    /// 200MHz from HSE, VCO at 400MHz
    pub const fn main_200mhz(hse_hz: u32) -> Self {
        Self::with_1mhz_input(ClockSource::Hse, hse_hz, 400, 2)
    }

    /// 216MHz from HSE, VCO at 432MHz
    pub const fn main_216mhz(hse_hz: u32) -> Self {
        Self::with_1mhz_input(ClockSource::Hse, hse_hz, 432, 2)
    }

    /// Highest frequency the part is rated for (216MHz)
    pub const fn main_max(hse_hz: u32) -> Self {
        Self::main_216mhz(hse_hz)
    }

    /// 48MHz on P and Q from a 192MHz VCO, for USB, SDMMC and RNG.
    ///
    /// Meant for [`AuxPll::Sai`](super::config::AuxPll::Sai).
    pub const fn sai_48mhz(hse_hz: u32) -> Self {
        Self {
            source: ClockSource::Hse,
            m: (hse_hz / 1_000_000) as u8,
            n: 192,
            p: 4,
            q: 4,
            r: 4,
        }
    }

    /// Check every field against the ranges accepted by the hardware.
    ///
    /// Returns the first offending field, in declaration order.
    pub fn validate(&self) -> Result<(), ClockError> {
        if !self.source.is_pll_reference() {
            return Err(ClockError::range(Field::Source));
        }
        if !(2..=63).contains(&self.m) {
            return Err(ClockError::range(Field::M));
        }
        if !(50..=432).contains(&self.n) {
            return Err(ClockError::range(Field::N));
        }
        if !matches!(self.p, 2 | 4 | 6 | 8) {
            return Err(ClockError::range(Field::P));
        }
        if self.q != 0 && !(2..=15).contains(&self.q) {
            return Err(ClockError::range(Field::Q));
        }
        if self.r != 0 && !(2..=7).contains(&self.r) {
            return Err(ClockError::range(Field::R));
        }
        Ok(())
    }
}

/// Encode P (2, 4, 6, 8) into the 2-bit PLLP field
pub(crate) const fn p_into_bits(p: u8) -> u8 {
    (p / 2).saturating_sub(1) & 0b11
}

/// Decode the 2-bit PLLP field
pub(crate) const fn p_from_bits(bits: u8) -> u8 {
    (bits & 0b11) * 2 + 2
}

/// Output of the P branch: `reference * N / M / P`.
///
/// The product is formed in 64 bits before any division, and every division
/// truncates. Returns 0 when `config.source` cannot feed a PLL.
pub fn main_output(config: &PllConfig, reference_hz: u32) -> u32 {
    if !config.source.is_pll_reference() || config.m == 0 || config.p == 0 {
        return 0;
    }
    let out = reference_hz as u64 * config.n as u64 / config.m as u64 / config.p as u64;
    out as u32
}

/// All three branches of a PLL.
///
/// A branch whose divider is 0 reports 0 Hz.
pub fn all_outputs(config: &PllConfig, reference_hz: u32) -> PllOutputFrequencies {
    if !config.source.is_pll_reference() || config.m == 0 {
        return PllOutputFrequencies::default();
    }
    let m = config.m as u64;
    let vco = reference_hz as u64 * config.n as u64 / m;
    let branch = |div: u8| if div == 0 { 0 } else { (vco / div as u64) as u32 };

    PllOutputFrequencies {
        reference: reference_hz,
        vco_input: (reference_hz as u64 / m) as u32,
        vco: vco as u32,
        p_out: branch(config.p),
        q_out: branch(config.q),
        r_out: branch(config.r),
    }
}
