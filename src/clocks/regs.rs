//! Register boundary of the clock controller
//!
//! [`ClockRegisters`] is the only way the controller reaches hardware.
//! Every field is typed, so there is no mask/shift arithmetic above this
//! layer. [`ReadyWait`] decides how long a readiness flag may be polled.

use core::convert::Infallible;

use embedded_hal_1::delay::DelayNs;

use super::config::{AuxPll, ClockSource, ClockUnit};
use super::pll::PllConfig;
use super::prescaler::{AhbPrescaler, ApbPrescaler};
use super::ClockError;

/// Access to the RCC and FLASH_ACR registers the clock tree needs
pub trait ClockRegisters {
    /// Put RCC back into its documented reset state: HSI on and selected,
    /// every PLL and HSE off, no bus division.
    fn reset(&mut self);

    /// Set the enable bit of `unit`
    fn enable(&mut self, unit: ClockUnit);
    /// Clear the enable bit of `unit`
    fn disable(&mut self, unit: ClockUnit);
    /// Ready flag of `unit`
    fn is_ready(&self, unit: ClockUnit) -> bool;
    /// HSEBYP, must be set before HSE is enabled
    fn set_hse_bypass(&mut self, bypass: bool);

    /// Program PLLCFGR: source, M, N, P, Q. `config` has been validated.
    fn write_main_pll(&mut self, config: &PllConfig);
    /// Read PLLCFGR back
    fn read_main_pll(&self) -> PllConfig;
    /// Program N, P, Q, R of a secondary PLL. Source and M are shared with
    /// the main PLL and are not written.
    fn write_aux_pll(&mut self, which: AuxPll, config: &PllConfig);
    /// Read a secondary PLL back, with source and M taken from PLLCFGR
    fn read_aux_pll(&self, which: AuxPll) -> PllConfig;

    /// Write RCC_CFGR.SW
    fn select_sysclk(&mut self, source: ClockSource);
    /// Read RCC_CFGR.SWS, `None` for the reserved encoding
    fn sysclk_status(&self) -> Option<ClockSource>;

    fn set_ahb_prescaler(&mut self, prescaler: AhbPrescaler);
    fn ahb_prescaler(&self) -> AhbPrescaler;
    fn set_apb1_prescaler(&mut self, prescaler: ApbPrescaler);
    fn apb1_prescaler(&self) -> ApbPrescaler;
    fn set_apb2_prescaler(&mut self, prescaler: ApbPrescaler);
    fn apb2_prescaler(&self) -> ApbPrescaler;

    /// Write FLASH_ACR.LATENCY
    fn set_flash_latency(&mut self, wait_states: u8);
    /// Read FLASH_ACR.LATENCY
    fn flash_latency(&self) -> u8;
    /// Reset and enable the ART accelerator and prefetch
    fn enable_flash_accelerator(&mut self);

    /// Data and instruction synchronization barrier after a clock switch
    fn barrier(&mut self);
}

/// Strategy for waiting on a readiness condition.
///
/// `poll` returns `WouldBlock` until the hardware reports ready.
pub trait ReadyWait {
    fn wait<F>(&mut self, unit: ClockUnit, poll: F) -> Result<(), ClockError>
    where
        F: FnMut() -> nb::Result<(), Infallible>;
}

impl<T: ReadyWait + ?Sized> ReadyWait for &mut T {
    fn wait<F>(&mut self, unit: ClockUnit, poll: F) -> Result<(), ClockError>
    where
        F: FnMut() -> nb::Result<(), Infallible>,
    {
        (**self).wait(unit, poll)
    }
}

/// Poll forever. A unit that never becomes ready hangs the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spin;

impl ReadyWait for Spin {
    fn wait<F>(&mut self, _unit: ClockUnit, mut poll: F) -> Result<(), ClockError>
    where
        F: FnMut() -> nb::Result<(), Infallible>,
    {
        nb::block!(poll()).map_err(|e| match e {})
    }
}

/// Give up after a fixed number of polls
#[derive(Clone, Copy, Debug)]
pub struct Bounded {
    pub polls: u32,
}

impl Bounded {
    pub const fn new(polls: u32) -> Self {
        Self { polls }
    }
}

impl Default for Bounded {
    fn default() -> Self {
        // HSE startup is the slowest, ~2ms worst case at 216MHz
        Self::new(500_000)
    }
}

impl ReadyWait for Bounded {
    fn wait<F>(&mut self, unit: ClockUnit, mut poll: F) -> Result<(), ClockError>
    where
        F: FnMut() -> nb::Result<(), Infallible>,
    {
        for _ in 0..self.polls {
            match poll() {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => match e {},
            }
        }
        Err(ClockError::HardwareTimeout { unit })
    }
}

/// Poll every `step_us` microseconds for at most `timeout_us`
pub struct DelayWait<D> {
    delay: D,
    step_us: u32,
    timeout_us: u32,
}

impl<D: DelayNs> DelayWait<D> {
    pub fn new(delay: D, step_us: u32, timeout_us: u32) -> Self {
        Self {
            delay,
            step_us: step_us.max(1),
            timeout_us,
        }
    }

    /// Give the delay provider back
    pub fn free(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> ReadyWait for DelayWait<D> {
    fn wait<F>(&mut self, unit: ClockUnit, mut poll: F) -> Result<(), ClockError>
    where
        F: FnMut() -> nb::Result<(), Infallible>,
    {
        let mut waited = 0u32;
        loop {
            match poll() {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => match e {},
            }
            if waited >= self.timeout_us {
                return Err(ClockError::HardwareTimeout { unit });
            }
            self.delay.delay_us(self.step_us);
            waited = waited.saturating_add(self.step_us);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDelay(u32);

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0 += ns / 1000;
        }
    }

    fn ready_after(n: u32) -> impl FnMut() -> nb::Result<(), Infallible> {
        let mut left = n;
        move || {
            if left == 0 {
                Ok(())
            } else {
                left -= 1;
                Err(nb::Error::WouldBlock)
            }
        }
    }

    #[test]
    fn spin_returns_once_ready() {
        assert_eq!(Spin.wait(ClockUnit::Hse, ready_after(1000)), Ok(()));
    }

    #[test]
    fn bounded_times_out() {
        let mut w = Bounded::new(10);
        assert_eq!(w.wait(ClockUnit::Hse, ready_after(9)), Ok(()));
        assert_eq!(
            w.wait(ClockUnit::MainPll, ready_after(10)),
            Err(ClockError::HardwareTimeout {
                unit: ClockUnit::MainPll
            })
        );
    }

    #[test]
    fn delay_wait_accounts_for_elapsed_time() {
        let mut w = DelayWait::new(CountingDelay(0), 10, 100);
        assert_eq!(w.wait(ClockUnit::PllSai, ready_after(3)), Ok(()));
        assert_eq!(
            w.wait(ClockUnit::PllSai, ready_after(1000)),
            Err(ClockError::HardwareTimeout {
                unit: ClockUnit::PllSai
            })
        );
        // 3 steps for the first wait, 10 for the second
        assert_eq!(w.free().0, 130);
    }
}
