//! Clock sources, units and board constants

use super::flash::{WaitStateTable, STM32F746_WAIT_STATES};

//
// enums
//

/// System clock source
///
/// ```text
///              ┌────┐
///     hsi ────▶│00  │
///     hse ────▶│01  │────▶ sysclk
/// pll_p_out ──▶│10  │
///              └────┘
///                 ▲
///                 │
///        System clock switch
///           RCC_CFGR.SW[1:0]
/// ```
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    /// 16MHz internal RC oscillator, +/- 1%, always available
    Hsi = 0b00,
    /// External crystal or oscillator
    Hse = 0b01,
    /// P output of the main PLL
    MainPll = 0b10,
}

impl ClockSource {
    /// Encoding used by the SW/SWS fields
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    /// Decode a SW/SWS field. `0b11` is "not applicable" on this part.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Self::Hsi),
            0b01 => Some(Self::Hse),
            0b10 => Some(Self::MainPll),
            _ => None,
        }
    }

    /// Only the oscillators can feed the PLL input stage
    pub const fn is_pll_reference(self) -> bool {
        matches!(self, Self::Hsi | Self::Hse)
    }

    /// The unit that has to be running before this source can be selected
    pub const fn unit(self) -> ClockUnit {
        match self {
            Self::Hsi => ClockUnit::Hsi,
            Self::Hse => ClockUnit::Hse,
            Self::MainPll => ClockUnit::MainPll,
        }
    }
}

/// Anything with an enable bit and a ready flag in RCC_CR
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockUnit {
    /// HSION / HSIRDY
    Hsi,
    /// HSEON / HSERDY
    Hse,
    /// PLLON / PLLRDY
    MainPll,
    /// PLLSAION / PLLSAIRDY
    PllSai,
    /// PLLI2SON / PLLI2SRDY
    PllI2s,
}

/// The two secondary PLLs.
///
/// Both share the reference selection and the `M` input divider with the
/// main PLL, so they can only be programmed once the main PLL is.
///
/// ```text
///                 ┌─────┐   ┌────┐  vco_in  ┌──────────┐ ┌──▶ /P  main pll_p (sysclk)
///   hsi ────────▶│0    │   │    │   1MHz   │ Main PLL │─┼──▶ /Q  pll48 (usb, sdmmc, rng)
///   hse ────────▶│1    │──▶│ /M │─────┬───▶│   xN     │ └──▶ /R  unused on F746
///                 └─────┘   └────┘     │    └──────────┘
///                    ▲                 │    ┌──────────┐ ┌──▶ /P  pllsai_p (48MHz)
///                    │                 ├───▶│ PLLSAI   │─┼──▶ /Q  sai
///              PLLCFGR.PLLSRC          │    │   xN     │ └──▶ /R  lcd-tft
///                                      │    └──────────┘
///                                      │    ┌──────────┐ ┌──▶ /P  spdif-rx
///                                      └───▶│ PLLI2S   │─┼──▶ /Q  sai
///                                           │   xN     │ └──▶ /R  i2s
///                                           └──────────┘
/// ```
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuxPll {
    /// PLLSAI
    Sai = 0,
    /// PLLI2S
    I2s = 1,
}

impl AuxPll {
    /// Enable/ready bits for this PLL
    pub const fn unit(self) -> ClockUnit {
        match self {
            Self::Sai => ClockUnit::PllSai,
            Self::I2s => ClockUnit::PllI2s,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Selects one of the three PLL units for readback
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PllUnit {
    /// The main PLL
    Main,
    /// One of the secondary PLLs
    Aux(AuxPll),
}

//
// structs
//

/// Board-level constants the clock tree depends on.
///
/// None of this is computed: oscillator frequencies, the supply rail and the
/// bus ceilings come from the board design and the datasheet.
#[derive(Clone, Copy, Debug)]
pub struct PlatformConfig {
    /// Internal oscillator frequency
    pub hsi_hz: u32,
    /// External crystal/oscillator frequency
    pub hse_hz: u32,
    /// `true` when HSE is fed by an external oscillator rather than a crystal
    pub hse_bypass: bool,
    /// Core supply voltage, used to pick the flash wait states
    pub supply_mv: u32,
    /// Maximum HCLK (AHB) frequency
    pub hclk_max_hz: u32,
    /// Maximum APB1 (low speed peripheral bus) frequency
    pub apb1_max_hz: u32,
    /// Maximum APB2 (high speed peripheral bus) frequency
    pub apb2_max_hz: u32,
    /// Flash latency table
    pub wait_states: &'static WaitStateTable,
}

impl PlatformConfig {
    /// 32F746G-DISCO: 25MHz oscillator on HSE (bypass mode), 3.3V supply
    pub const STM32F746_DISCO: Self = Self {
        hsi_hz: 16_000_000,
        hse_hz: 25_000_000,
        hse_bypass: true,
        supply_mv: 3300,
        hclk_max_hz: 216_000_000,
        apb1_max_hz: 54_000_000,
        apb2_max_hz: 108_000_000,
        wait_states: &STM32F746_WAIT_STATES,
    };

    /// Frequency of an oscillator source. `MainPll` is not an oscillator and
    /// yields `None`.
    pub const fn oscillator_hz(&self, source: ClockSource) -> Option<u32> {
        match source {
            ClockSource::Hsi => Some(self.hsi_hz),
            ClockSource::Hse => Some(self.hse_hz),
            ClockSource::MainPll => None,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::STM32F746_DISCO
    }
}
