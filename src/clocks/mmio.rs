//! RCC and FLASH registers of the STM32F746, through the `stm32f7` PAC
//!
//! Field layout is RM0385, sections 3.7 and 5.3. Reset values come from the
//! PAC, which takes them from the SVD.

use stm32f7::stm32f7x6 as pac;

use super::config::{AuxPll, ClockSource, ClockUnit};
use super::pll::{p_from_bits, p_into_bits, PllConfig};
use super::prescaler::{AhbPrescaler, ApbPrescaler};
use super::regs::ClockRegisters;

/// The RCC and FLASH registers involved in clock tree setup.
///
/// Other RCC registers (peripheral enables, resets, kernel clock muxes) are
/// never written.
pub struct Stm32f746Registers {
    rcc: *const pac::rcc::RegisterBlock,
    flash: *const pac::flash::RegisterBlock,
}

// SAFETY: the blocks are only written through `&mut self`, and the
// constructors hand out exclusive ownership of them
unsafe impl Send for Stm32f746Registers {}

impl Stm32f746Registers {
    /// Take ownership of RCC and FLASH
    pub fn new(_rcc: pac::RCC, _flash: pac::FLASH) -> Self {
        Self {
            rcc: pac::RCC::ptr(),
            flash: pac::FLASH::ptr(),
        }
    }

    /// Take RCC and FLASH without a `pac::Peripherals`.
    ///
    /// # Safety
    ///
    /// There must be no other owner of RCC_CR, RCC_PLLCFGR, RCC_CFGR,
    /// RCC_CIR, RCC_PLLSAICFGR, RCC_PLLI2SCFGR or FLASH_ACR.
    pub unsafe fn steal() -> Self {
        Self {
            rcc: pac::RCC::ptr(),
            flash: pac::FLASH::ptr(),
        }
    }

    /// Register blocks backed by plain memory
    #[cfg(test)]
    unsafe fn from_blocks(rcc: *const pac::rcc::RegisterBlock, flash: *const pac::flash::RegisterBlock) -> Self {
        Self { rcc, flash }
    }

    fn rcc(&self) -> &pac::rcc::RegisterBlock {
        // SAFETY: valid for the lifetime of `self`, see the constructors
        unsafe { &*self.rcc }
    }

    fn flash(&self) -> &pac::flash::RegisterBlock {
        // SAFETY: as above
        unsafe { &*self.flash }
    }

    fn switch(&mut self, unit: ClockUnit, on: bool) {
        self.rcc().cr.modify(|_, w| match unit {
            ClockUnit::Hsi => w.hsion().bit(on),
            ClockUnit::Hse => w.hseon().bit(on),
            ClockUnit::MainPll => w.pllon().bit(on),
            ClockUnit::PllSai => w.pllsaion().bit(on),
            ClockUnit::PllI2s => w.plli2son().bit(on),
        });
    }
}

impl ClockRegisters for Stm32f746Registers {
    fn reset(&mut self) {
        let rcc = self.rcc();
        rcc.cr.reset();
        rcc.cfgr.reset();
        rcc.pllcfgr.reset();
        rcc.pllsaicfgr.reset();
        rcc.plli2scfgr.reset();
        rcc.cir.reset();
    }

    fn enable(&mut self, unit: ClockUnit) {
        self.switch(unit, true);
    }

    fn disable(&mut self, unit: ClockUnit) {
        self.switch(unit, false);
    }

    fn is_ready(&self, unit: ClockUnit) -> bool {
        let cr = self.rcc().cr.read();
        match unit {
            ClockUnit::Hsi => cr.hsirdy().bit_is_set(),
            ClockUnit::Hse => cr.hserdy().bit_is_set(),
            ClockUnit::MainPll => cr.pllrdy().bit_is_set(),
            ClockUnit::PllSai => cr.pllsairdy().bit_is_set(),
            ClockUnit::PllI2s => cr.plli2srdy().bit_is_set(),
        }
    }

    fn set_hse_bypass(&mut self, bypass: bool) {
        self.rcc().cr.modify(|_, w| w.hsebyp().bit(bypass));
    }

    fn write_main_pll(&mut self, config: &PllConfig) {
        self.rcc().pllcfgr.modify(|_, w| unsafe {
            w.pllm()
                .bits(config.m)
                .plln()
                .bits(config.n)
                .pllp()
                .bits(p_into_bits(config.p))
                .pllsrc()
                .bit(config.source == ClockSource::Hse)
                .pllq()
                .bits(config.q)
        });
    }

    fn read_main_pll(&self) -> PllConfig {
        let r = self.rcc().pllcfgr.read();
        PllConfig {
            source: if r.pllsrc().bit_is_set() {
                ClockSource::Hse
            } else {
                ClockSource::Hsi
            },
            m: r.pllm().bits(),
            n: r.plln().bits(),
            p: p_from_bits(r.pllp().bits()),
            q: r.pllq().bits(),
            r: 0,
        }
    }

    fn write_aux_pll(&mut self, which: AuxPll, config: &PllConfig) {
        let rcc = self.rcc();
        let p = p_into_bits(config.p);
        match which {
            AuxPll::Sai => rcc.pllsaicfgr.modify(|_, w| unsafe {
                w.pllsain()
                    .bits(config.n)
                    .pllsaip()
                    .bits(p)
                    .pllsaiq()
                    .bits(config.q)
                    .pllsair()
                    .bits(config.r)
            }),
            AuxPll::I2s => rcc.plli2scfgr.modify(|_, w| unsafe {
                w.plli2sn()
                    .bits(config.n)
                    .plli2sp()
                    .bits(p)
                    .plli2sq()
                    .bits(config.q)
                    .plli2sr()
                    .bits(config.r)
            }),
        }
    }

    fn read_aux_pll(&self, which: AuxPll) -> PllConfig {
        let main = self.read_main_pll();
        let (n, p, q, r) = match which {
            AuxPll::Sai => {
                let r = self.rcc().pllsaicfgr.read();
                (r.pllsain().bits(), r.pllsaip().bits(), r.pllsaiq().bits(), r.pllsair().bits())
            }
            AuxPll::I2s => {
                let r = self.rcc().plli2scfgr.read();
                (r.plli2sn().bits(), r.plli2sp().bits(), r.plli2sq().bits(), r.plli2sr().bits())
            }
        };
        PllConfig {
            source: main.source,
            m: main.m,
            n,
            p: p_from_bits(p),
            q,
            r,
        }
    }

    fn select_sysclk(&mut self, source: ClockSource) {
        self.rcc().cfgr.modify(|_, w| unsafe { w.sw().bits(source.into_bits()) });
    }

    fn sysclk_status(&self) -> Option<ClockSource> {
        ClockSource::from_bits(self.rcc().cfgr.read().sws().bits())
    }

    fn set_ahb_prescaler(&mut self, prescaler: AhbPrescaler) {
        self.rcc().cfgr.modify(|_, w| unsafe { w.hpre().bits(prescaler.into_bits()) });
    }

    fn ahb_prescaler(&self) -> AhbPrescaler {
        AhbPrescaler::from_bits(self.rcc().cfgr.read().hpre().bits())
    }

    fn set_apb1_prescaler(&mut self, prescaler: ApbPrescaler) {
        self.rcc().cfgr.modify(|_, w| unsafe { w.ppre1().bits(prescaler.into_bits()) });
    }

    fn apb1_prescaler(&self) -> ApbPrescaler {
        ApbPrescaler::from_bits(self.rcc().cfgr.read().ppre1().bits())
    }

    fn set_apb2_prescaler(&mut self, prescaler: ApbPrescaler) {
        self.rcc().cfgr.modify(|_, w| unsafe { w.ppre2().bits(prescaler.into_bits()) });
    }

    fn apb2_prescaler(&self) -> ApbPrescaler {
        ApbPrescaler::from_bits(self.rcc().cfgr.read().ppre2().bits())
    }

    fn set_flash_latency(&mut self, wait_states: u8) {
        self.flash().acr.modify(|_, w| unsafe { w.latency().bits(wait_states) });
    }

    fn flash_latency(&self) -> u8 {
        self.flash().acr.read().latency().bits()
    }

    fn enable_flash_accelerator(&mut self) {
        let acr = &self.flash().acr;
        // ARTRST is only writable with the accelerator off
        acr.modify(|_, w| w.arten().clear_bit());
        acr.modify(|_, w| w.artrst().set_bit());
        acr.modify(|_, w| w.artrst().clear_bit());
        acr.modify(|_, w| w.prften().set_bit().arten().set_bit());
    }

    fn barrier(&mut self) {
        cfg_if::cfg_if! {
            if #[cfg(all(target_arch = "arm", target_os = "none"))] {
                cortex_m::asm::dsb();
                cortex_m::asm::isb();
            } else {
                core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
            }
        }
    }
}
