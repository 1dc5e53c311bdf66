#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

//! ## Feature flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod clocks;

pub use stm32f7::stm32f7x6 as pac;

pub use clocks::config::{AuxPll, ClockSource, ClockUnit, PlatformConfig, PllUnit};
pub use clocks::mmio::Stm32f746Registers;
pub use clocks::pll::{PllConfig, PllOutputFrequencies};
pub use clocks::prescaler::{AhbPrescaler, ApbPrescaler};
pub use clocks::regs::{Bounded, ClockRegisters, DelayWait, ReadyWait, Spin};
pub use clocks::{ClockController, ClockError, ClockState, Clocks, Field, InitError};
