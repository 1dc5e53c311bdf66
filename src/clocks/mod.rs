//! Clock tree of the STM32F746
//!
//! [`ClockController`] owns the RCC/FLASH register block and the cached
//! [`ClockState`]. All transitions go through it so that the flash latency
//! and the APB dividers are always valid for the frequency the core is
//! actually running at.
//!
//! ```text
//!  hsi ──┬─────────────────────────────┐   ┌────┐          ┌──────┐
//!        │   ┌──────────┐              └──▶│ SW │─ sysclk ▶│ HPRE │─▶ hclk ─┬─▶ PPRE1 ─▶ pclk1
//!        ├──▶│ Main PLL │───── pll_p ─────▶│    │          └──────┘         │
//!  hse ──┴──▶│ PLLSAI   │                  │    │                           └─▶ PPRE2 ─▶ pclk2
//!        └──▶│ PLLI2S   │            hse ─▶│    │
//!            └──────────┘                  └────┘
//! ```

use core::fmt;

use config::{AuxPll, ClockSource, ClockUnit, PlatformConfig, PllUnit};
use pll::{PllConfig, PllOutputFrequencies};
use prescaler::{AhbPrescaler, ApbPrescaler};
use regs::{ClockRegisters, ReadyWait};

pub mod config;
pub mod flash;
pub mod mmio;
pub mod pll;
pub mod prescaler;
pub mod regs;
#[cfg(test)]
pub(crate) mod testing;

/// A field that can be out of range
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// PLL reference selection
    Source,
    /// PLL input divider
    M,
    /// PLL multiplier
    N,
    /// PLL main output divider
    P,
    /// PLL secondary output divider
    Q,
    /// PLL third output divider
    R,
    /// AHB prescaler
    AhbPrescaler,
    /// APB1 prescaler, or the APB1 frequency it would produce
    Apb1Prescaler,
    /// APB2 prescaler, or the APB2 frequency it would produce
    Apb2Prescaler,
}

/// Clock configuration errors
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockError {
    /// A field is outside the range the hardware accepts. Nothing was written.
    RangeViolation { field: Field },
    /// The request needs something that has not been set up yet
    DependencyUnsatisfied { reason: &'static str },
    /// No flash latency is safe for this frequency at this supply voltage
    NotFound { frequency_hz: u32, voltage_mv: u32 },
    /// A ready flag (or the SWS field) never reached the expected value
    HardwareTimeout { unit: ClockUnit },
}

impl ClockError {
    pub(crate) const fn range(field: Field) -> Self {
        Self::RangeViolation { field }
    }

    const fn dependency(reason: &'static str) -> Self {
        Self::DependencyUnsatisfied { reason }
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RangeViolation { field } => write!(f, "{field:?} out of range"),
            Self::DependencyUnsatisfied { reason } => write!(f, "dependency unsatisfied: {reason}"),
            Self::NotFound {
                frequency_hz,
                voltage_mv,
            } => write!(f, "no flash latency for {frequency_hz} Hz at {voltage_mv} mV"),
            Self::HardwareTimeout { unit } => write!(f, "{unit:?} did not become ready"),
        }
    }
}

/// [`ClockController::init`] or [`ClockController::adopt`] failed.
///
/// The register block and the wait policy come back with the error, so
/// bring-up can be retried, for example with a different [`PlatformConfig`].
pub struct InitError<R, W> {
    pub error: ClockError,
    pub regs: R,
    pub wait: W,
}

impl<R, W> InitError<R, W> {
    pub fn into_parts(self) -> (ClockError, R, W) {
        (self.error, self.regs, self.wait)
    }
}

impl<R, W> From<InitError<R, W>> for ClockError {
    fn from(e: InitError<R, W>) -> Self {
        e.error
    }
}

impl<R, W> fmt::Debug for InitError<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitError").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<R, W> fmt::Display for InitError<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

/// What the controller believes the hardware is doing.
///
/// Only [`ClockController`] mutates this, and every mutation refreshes
/// `core_clock_hz` before returning.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockState {
    /// Current system clock source
    pub source: ClockSource,
    /// Last configuration the main PLL locked with, `None` while it is off
    pub main_pll: Option<PllConfig>,
    /// PLLSAI and PLLI2S, indexed by [`AuxPll`]
    pub aux_pll: [Option<PllConfig>; 2],
    pub ahb: AhbPrescaler,
    pub apb1: ApbPrescaler,
    pub apb2: ApbPrescaler,
    /// HCLK, the frequency of the core and the AHB bus
    pub core_clock_hz: u32,
    /// FLASH_ACR.LATENCY
    pub wait_states: u8,
}

impl ClockState {
    /// Reset state: running from HSI, no PLL, no bus division
    pub const fn reset(hsi_hz: u32) -> Self {
        Self {
            source: ClockSource::Hsi,
            main_pll: None,
            aux_pll: [None; 2],
            ahb: AhbPrescaler::Div1,
            apb1: ApbPrescaler::Div1,
            apb2: ApbPrescaler::Div1,
            core_clock_hz: hsi_hz,
            wait_states: 0,
        }
    }

    /// The secondary PLLs share M and the reference with the main PLL, so
    /// they need it first.
    pub const fn main_pll_configured(&self) -> bool {
        self.main_pll.is_some()
    }
}

/// Snapshot of every frequency in the tree.
///
/// `Copy`, so drivers can hold on to it without borrowing the controller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clocks {
    /// "HSI", 16MHz internal RC oscillator, +/- 1%
    pub hsi: u32,
    /// "HSE", external oscillator or crystal
    pub hse: u32,
    pub sysclk: u32,
    /// Core and AHB clock
    pub hclk: u32,
    /// APB1 peripheral clock
    pub pclk1: u32,
    /// APB2 peripheral clock
    pub pclk2: u32,
    /// Timer clock of APB1 timers (TIM2..7, TIM12..14)
    pub timclk1: u32,
    /// Timer clock of APB2 timers (TIM1, TIM8..11)
    pub timclk2: u32,
    pub main_pll: Option<PllOutputFrequencies>,
    pub pll_sai: Option<PllOutputFrequencies>,
    pub pll_i2s: Option<PllOutputFrequencies>,
    pub wait_states: u8,
}

/// With TIMPRE cleared, timers run at PCLKx when the APB is not divided and
/// at twice PCLKx otherwise.
const fn timer_clock(pclk: u32, apb: ApbPrescaler) -> u32 {
    match apb {
        ApbPrescaler::Div1 => pclk,
        _ => pclk * 2,
    }
}

/// The single owner of the clock tree.
///
/// `R` is the register block, `W` decides how long ready flags are polled.
pub struct ClockController<R, W> {
    regs: R,
    wait: W,
    platform: PlatformConfig,
    state: ClockState,
}

impl<R: ClockRegisters, W: ReadyWait> ClockController<R, W> {
    /// Bring the clock tree into a known state.
    ///
    /// RCC is reset, HSE is started (but not selected), the buses are set to
    /// AHB/1, APB1/4, APB2/2, the ART accelerator and prefetch are turned on
    /// and the flash latency is set for the resulting HSI frequency.
    pub fn init(regs: R, platform: PlatformConfig, wait: W) -> Result<Self, InitError<R, W>> {
        let mut this = Self {
            regs,
            wait,
            platform,
            state: ClockState::reset(platform.hsi_hz),
        };
        match critical_section::with(|_| this.bring_up()) {
            Ok(()) => {
                info!("clocks initialized, core clock {} Hz", this.state.core_clock_hz);
                Ok(this)
            }
            Err(error) => {
                let (regs, wait) = this.release();
                Err(InitError { error, regs, wait })
            }
        }
    }

    /// Take over a clock tree someone else has set up, a bootloader for
    /// instance. Nothing is written, the state is read back from RCC and
    /// FLASH_ACR with [`Self::resync`].
    pub fn adopt(regs: R, platform: PlatformConfig, wait: W) -> Result<Self, InitError<R, W>> {
        let mut this = Self {
            regs,
            wait,
            platform,
            state: ClockState::reset(platform.hsi_hz),
        };
        match this.resync() {
            Ok(()) => Ok(this),
            Err(error) => {
                let (regs, wait) = this.release();
                Err(InitError { error, regs, wait })
            }
        }
    }

    fn bring_up(&mut self) -> Result<(), ClockError> {
        let wait_states = self.wait_states_for(self.platform.hsi_hz)?;

        self.regs.reset();
        self.state = ClockState::reset(self.platform.hsi_hz);

        self.start_unit(ClockUnit::Hse)?;

        self.regs.set_ahb_prescaler(AhbPrescaler::Div1);
        self.regs.set_apb1_prescaler(ApbPrescaler::Div4);
        self.regs.set_apb2_prescaler(ApbPrescaler::Div2);
        self.state.ahb = AhbPrescaler::Div1;
        self.state.apb1 = ApbPrescaler::Div4;
        self.state.apb2 = ApbPrescaler::Div2;

        self.regs.enable_flash_accelerator();

        self.state.core_clock_hz = self.sysclk_frequency() / self.state.ahb.into_divisor();
        self.set_wait_states(wait_states);
        Ok(())
    }

    /// Give the register block and the wait policy back
    pub fn release(self) -> (R, W) {
        (self.regs, self.wait)
    }

    /// Rebuild [`ClockState`] from the registers.
    ///
    /// The source comes from SWS, the dividers from HPRE/PPRE1/PPRE2 and the
    /// latency from FLASH_ACR. A PLL is only recorded if its ready flag is
    /// set. Its configuration is read as written, so an unused Q or R shows
    /// up with its parked divider instead of 0.
    pub fn resync(&mut self) -> Result<(), ClockError> {
        critical_section::with(|_| {
            let source = self
                .regs
                .sysclk_status()
                .ok_or(ClockError::range(Field::Source))?;
            let main_pll = (source == ClockSource::MainPll || self.regs.is_ready(ClockUnit::MainPll))
                .then(|| self.regs.read_main_pll());
            let aux_pll = [AuxPll::Sai, AuxPll::I2s].map(|aux| {
                (main_pll.is_some() && self.regs.is_ready(aux.unit())).then(|| self.regs.read_aux_pll(aux))
            });

            self.state = ClockState {
                source,
                main_pll,
                aux_pll,
                ahb: self.regs.ahb_prescaler(),
                apb1: self.regs.apb1_prescaler(),
                apb2: self.regs.apb2_prescaler(),
                core_clock_hz: 0,
                wait_states: self.regs.flash_latency(),
            };
            self.state.core_clock_hz = self.sysclk_frequency() / self.state.ahb.into_divisor();
            Ok::<(), ClockError>(())
        })?;
        debug!(
            "resynced: core clock {} Hz from {:?}, {} wait states",
            self.state.core_clock_hz,
            self.state.source,
            self.state.wait_states
        );
        Ok(())
    }

    //
    // mutators
    //

    /// Program the main PLL and wait for it to lock.
    ///
    /// If the core is running from the PLL it is moved to HSI for the
    /// duration and switched back afterwards. When the reference or M
    /// changes, running secondary PLLs are stopped first, since PLLSRC and
    /// PLLM may only be written with all three PLLs off.
    pub fn configure_main_pll(&mut self, config: PllConfig) -> Result<(), ClockError> {
        config.validate()?;
        critical_section::with(|_| self.reprogram_main_pll(config))
    }

    /// Program PLLSAI or PLLI2S.
    ///
    /// `config.source` and `config.m` must match the main PLL. Q or R set to
    /// 0 mark that output as unused.
    pub fn configure_auxiliary_pll(&mut self, which: AuxPll, config: PllConfig) -> Result<(), ClockError> {
        let main = self
            .state
            .main_pll
            .ok_or(ClockError::dependency("main PLL not configured"))?;
        config.validate()?;
        if config.source != main.source {
            return Err(ClockError::range(Field::Source));
        }
        if config.m != main.m {
            return Err(ClockError::range(Field::M));
        }

        critical_section::with(|_| {
            let unit = which.unit();
            self.stop_unit(unit)?;
            self.state.aux_pll[which.index()] = None;

            self.regs.write_aux_pll(which, &register_image(&config));
            self.regs.enable(unit);
            self.wait_ready(unit)?;
            self.state.aux_pll[which.index()] = Some(config);
            debug!("{:?} locked, vco {} Hz", which, self.pll_outputs(&config).vco);
            Ok(())
        })
    }

    /// Select the system clock source and AHB divisor.
    ///
    /// The flash latency is raised to its maximum and the APB dividers set to
    /// /4 and /2 before anything that could raise HCLK is written. Once the
    /// new source is confirmed through SWS the minimal latency is applied and
    /// the previous APB dividers are restored. Selecting the main PLL before
    /// it was ever configured programs it for 200MHz from HSE.
    ///
    /// A frequency with no valid flash latency is rejected before any
    /// register is written.
    pub fn set_core_clock(&mut self, source: ClockSource, ahb_divisor: u32) -> Result<(), ClockError> {
        let ahb = AhbPrescaler::from_divisor(ahb_divisor);
        critical_section::with(|_| self.switch_core_clock(source, ahb))
    }

    /// Run the core from the main PLL as close to `target_hz` as a 1MHz VCO
    /// input allows, capped at the maximum HCLK.
    ///
    /// Returns the core clock that was actually reached.
    pub fn set_core_clock_frequency(&mut self, target_hz: u32) -> Result<u32, ClockError> {
        let target_hz = target_hz.min(self.platform.hclk_max_hz);
        let n = (2 * (target_hz as u64) / 1_000_000) as u16;
        let config = PllConfig::with_1mhz_input(ClockSource::Hse, self.platform.hse_hz, n, 2);
        config.validate()?;
        self.wait_states_for(self.pll_output(&config))?;

        self.configure_main_pll(config)?;
        self.set_core_clock(ClockSource::MainPll, 1)?;
        Ok(self.core_clock())
    }

    /// Divide HCLK by `divisor` (rounded up to a power of two) for APB1.
    ///
    /// Fails if the result would exceed the APB1 maximum.
    pub fn set_apb1_prescaler(&mut self, divisor: u32) -> Result<(), ClockError> {
        let prescaler = ApbPrescaler::from_divisor(divisor);
        if self.core_clock() / prescaler.into_divisor() > self.platform.apb1_max_hz {
            return Err(ClockError::range(Field::Apb1Prescaler));
        }
        critical_section::with(|_| {
            self.regs.set_apb1_prescaler(prescaler);
            self.state.apb1 = prescaler;
        });
        debug!("APB1 at {} Hz", self.apb1_frequency());
        Ok(())
    }

    /// Divide HCLK by `divisor` (rounded up to a power of two) for APB2.
    ///
    /// Fails if the result would exceed the APB2 maximum.
    pub fn set_apb2_prescaler(&mut self, divisor: u32) -> Result<(), ClockError> {
        let prescaler = ApbPrescaler::from_divisor(divisor);
        if self.core_clock() / prescaler.into_divisor() > self.platform.apb2_max_hz {
            return Err(ClockError::range(Field::Apb2Prescaler));
        }
        critical_section::with(|_| {
            self.regs.set_apb2_prescaler(prescaler);
            self.state.apb2 = prescaler;
        });
        debug!("APB2 at {} Hz", self.apb2_frequency());
        Ok(())
    }

    //
    // queries
    //

    /// Frequency of the selected system clock source, before HPRE
    pub fn sysclk_frequency(&self) -> u32 {
        match self.state.source {
            ClockSource::Hsi => self.platform.hsi_hz,
            ClockSource::Hse => self.platform.hse_hz,
            ClockSource::MainPll => self.state.main_pll.map_or(0, |c| self.pll_output(&c)),
        }
    }

    /// HCLK
    pub fn core_clock(&self) -> u32 {
        self.state.core_clock_hz
    }

    /// Same as [`Self::core_clock`]
    pub fn ahb_frequency(&self) -> u32 {
        self.core_clock()
    }

    /// Same as [`Self::core_clock`]
    pub fn hclk_frequency(&self) -> u32 {
        self.core_clock()
    }

    pub fn apb1_frequency(&self) -> u32 {
        self.core_clock() / self.state.apb1.into_divisor()
    }

    pub fn apb2_frequency(&self) -> u32 {
        self.core_clock() / self.state.apb2.into_divisor()
    }

    pub fn main_pll_configuration(&self) -> Option<PllConfig> {
        self.state.main_pll
    }

    /// Configuration a PLL was last locked with, `None` if it is off
    pub fn pll_configuration(&self, which: PllUnit) -> Option<PllConfig> {
        match which {
            PllUnit::Main => self.state.main_pll,
            PllUnit::Aux(aux) => self.state.aux_pll[aux.index()],
        }
    }

    /// Output frequencies of a running PLL
    pub fn pll_frequencies(&self, which: PllUnit) -> Option<PllOutputFrequencies> {
        self.pll_configuration(which).map(|c| self.pll_outputs(&c))
    }

    /// Read a PLL configuration back from the registers.
    ///
    /// Unlike [`Self::pll_configuration`] this reports unused outputs with
    /// the divider that is parked in the register.
    pub fn read_pll_configuration(&self, which: PllUnit) -> PllConfig {
        match which {
            PllUnit::Main => self.regs.read_main_pll(),
            PllUnit::Aux(aux) => self.regs.read_aux_pll(aux),
        }
    }

    /// Frequencies the PLL registers would produce, whether or not the PLL
    /// is running
    pub fn read_pll_frequencies(&self, which: PllUnit) -> PllOutputFrequencies {
        self.pll_outputs(&self.read_pll_configuration(which))
    }

    pub fn source(&self) -> ClockSource {
        self.state.source
    }

    pub fn ahb_prescaler(&self) -> AhbPrescaler {
        self.state.ahb
    }

    pub fn apb1_prescaler(&self) -> ApbPrescaler {
        self.state.apb1
    }

    pub fn apb2_prescaler(&self) -> ApbPrescaler {
        self.state.apb2
    }

    pub fn wait_states(&self) -> u8 {
        self.state.wait_states
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Copy of every frequency in the tree
    pub fn clocks(&self) -> Clocks {
        let pclk1 = self.apb1_frequency();
        let pclk2 = self.apb2_frequency();
        Clocks {
            hsi: self.platform.hsi_hz,
            hse: self.platform.hse_hz,
            sysclk: self.sysclk_frequency(),
            hclk: self.core_clock(),
            pclk1,
            pclk2,
            timclk1: timer_clock(pclk1, self.state.apb1),
            timclk2: timer_clock(pclk2, self.state.apb2),
            main_pll: self.pll_frequencies(PllUnit::Main),
            pll_sai: self.pll_frequencies(PllUnit::Aux(AuxPll::Sai)),
            pll_i2s: self.pll_frequencies(PllUnit::Aux(AuxPll::I2s)),
            wait_states: self.state.wait_states,
        }
    }

    //
    // sequencing
    //

    fn switch_core_clock(&mut self, source: ClockSource, ahb: AhbPrescaler) -> Result<(), ClockError> {
        let default_pll = match (source, self.state.main_pll) {
            (ClockSource::MainPll, None) => {
                let config = PllConfig::main_200mhz(self.platform.hse_hz);
                config.validate()?;
                Some(config)
            }
            _ => None,
        };
        let sysclk = match source {
            ClockSource::MainPll => self
                .state
                .main_pll
                .or(default_pll)
                .map_or(0, |c| self.pll_output(&c)),
            osc => self.platform.oscillator_hz(osc).unwrap_or(0),
        };
        let hclk = sysclk / ahb.into_divisor();
        let wait_states = self.wait_states_for(hclk)?;

        let source_changes = source != self.state.source;
        let guarded = source_changes || ahb.into_divisor() < self.state.ahb.into_divisor();
        let (apb1, apb2) = (self.state.apb1, self.state.apb2);

        trace!(
            "switching {:?}/{} -> {:?}/{}",
            self.state.source,
            self.state.ahb.into_divisor(),
            source,
            ahb.into_divisor()
        );

        if guarded {
            let max = self.platform.wait_states.max_wait_states();
            self.set_wait_states(max);
            self.regs.set_apb1_prescaler(ApbPrescaler::Div4);
            self.regs.set_apb2_prescaler(ApbPrescaler::Div2);
            self.state.apb1 = ApbPrescaler::Div4;
            self.state.apb2 = ApbPrescaler::Div2;
        }

        self.regs.set_ahb_prescaler(ahb);
        self.state.ahb = ahb;

        let switched = if source_changes {
            self.change_source(source, default_pll)
        } else {
            Ok(())
        };

        // HPRE is already written, so the cache follows it even if the
        // source never switched. Latency and APB stay at their guard values.
        self.state.core_clock_hz = self.sysclk_frequency() / ahb.into_divisor();
        switched?;
        self.set_wait_states(wait_states);

        if guarded {
            self.restore_apb(apb1, apb2);
        }

        debug!(
            "core clock {} Hz from {:?}, {} wait states",
            self.state.core_clock_hz,
            source,
            wait_states
        );
        Ok(())
    }

    /// Start `source` and move SW over to it. `state.source` only follows
    /// once SWS confirms.
    fn change_source(&mut self, source: ClockSource, default_pll: Option<PllConfig>) -> Result<(), ClockError> {
        if let Some(config) = default_pll {
            debug!("main PLL not configured, defaulting to 200MHz");
            self.program_main_pll(&config)?;
        }
        self.start_unit(source.unit())?;
        self.regs.select_sysclk(source);
        self.regs.barrier();
        self.wait_switched(source)?;
        self.state.source = source;
        Ok(())
    }

    fn reprogram_main_pll(&mut self, config: PllConfig) -> Result<(), ClockError> {
        let was_source = self.state.source == ClockSource::MainPll;
        if was_source {
            // Check the frequency we come back to before leaving
            let hclk = self.pll_output(&config) / self.state.ahb.into_divisor();
            self.wait_states_for(hclk)?;
            self.switch_core_clock(ClockSource::Hsi, self.state.ahb)?;
        }

        let shared_input_changes = self
            .state
            .main_pll
            .map_or(true, |old| old.source != config.source || old.m != config.m);
        if shared_input_changes {
            for aux in [AuxPll::Sai, AuxPll::I2s] {
                if self.state.aux_pll[aux.index()].take().is_some() {
                    warn!("{:?} stopped, main PLL input changes", aux);
                }
                self.stop_unit(aux.unit())?;
            }
        }

        self.program_main_pll(&config)?;

        if was_source {
            self.switch_core_clock(ClockSource::MainPll, self.state.ahb)?;
        }
        Ok(())
    }

    /// Stop the main PLL, start its reference, write the fields and wait for
    /// lock. The core must not be running from the PLL.
    fn program_main_pll(&mut self, config: &PllConfig) -> Result<(), ClockError> {
        self.stop_unit(ClockUnit::MainPll)?;
        self.state.main_pll = None;

        self.start_unit(config.source.unit())?;
        self.regs.write_main_pll(&register_image(config));
        self.regs.enable(ClockUnit::MainPll);
        self.wait_ready(ClockUnit::MainPll)?;
        self.state.main_pll = Some(*config);

        debug!("main PLL locked, P output {} Hz", self.pll_output(config));
        Ok(())
    }

    fn restore_apb(&mut self, apb1: ApbPrescaler, apb2: ApbPrescaler) {
        let hclk = self.state.core_clock_hz;
        let apb1 = fit_apb(hclk, apb1, self.platform.apb1_max_hz);
        let apb2 = fit_apb(hclk, apb2, self.platform.apb2_max_hz);
        self.regs.set_apb1_prescaler(apb1);
        self.regs.set_apb2_prescaler(apb2);
        self.state.apb1 = apb1;
        self.state.apb2 = apb2;
    }

    fn set_wait_states(&mut self, wait_states: u8) {
        self.regs.set_flash_latency(wait_states);
        self.state.wait_states = wait_states;
    }

    /// Enable `unit` and wait until it reports ready
    fn start_unit(&mut self, unit: ClockUnit) -> Result<(), ClockError> {
        // HSEBYP is only writable while HSE is off
        if unit == ClockUnit::Hse && !self.regs.is_ready(ClockUnit::Hse) {
            self.regs.set_hse_bypass(self.platform.hse_bypass);
        }
        self.regs.enable(unit);
        self.wait_ready(unit)
    }

    /// Disable `unit` and wait until its ready flag drops
    fn stop_unit(&mut self, unit: ClockUnit) -> Result<(), ClockError> {
        self.regs.disable(unit);
        let regs = &self.regs;
        self.wait.wait(unit, || {
            if regs.is_ready(unit) {
                Err(nb::Error::WouldBlock)
            } else {
                Ok(())
            }
        })
    }

    fn wait_ready(&mut self, unit: ClockUnit) -> Result<(), ClockError> {
        let regs = &self.regs;
        self.wait.wait(unit, || {
            if regs.is_ready(unit) {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        })
    }

    fn wait_switched(&mut self, source: ClockSource) -> Result<(), ClockError> {
        let regs = &self.regs;
        self.wait.wait(source.unit(), || {
            if regs.sysclk_status() == Some(source) {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        })
    }

    fn wait_states_for(&self, hclk: u32) -> Result<u8, ClockError> {
        self.platform.wait_states.lookup(hclk, self.platform.supply_mv)
    }

    fn reference_hz(&self, source: ClockSource) -> u32 {
        self.platform.oscillator_hz(source).unwrap_or(0)
    }

    fn pll_output(&self, config: &PllConfig) -> u32 {
        pll::main_output(config, self.reference_hz(config.source))
    }

    fn pll_outputs(&self, config: &PllConfig) -> PllOutputFrequencies {
        pll::all_outputs(config, self.reference_hz(config.source))
    }
}

/// Field values actually written for `config`: PLLQ and PLLR do not accept
/// 0, so unused outputs get the smallest legal divider.
fn register_image(config: &PllConfig) -> PllConfig {
    let park = |div: u8| if div == 0 { 2 } else { div };
    PllConfig {
        q: park(config.q),
        r: park(config.r),
        ..*config
    }
}

/// `wanted`, unless it would push the bus above `max_hz` at `hclk`. Then the
/// smallest divider that fits.
fn fit_apb(hclk: u32, wanted: ApbPrescaler, max_hz: u32) -> ApbPrescaler {
    if hclk / wanted.into_divisor() <= max_hz {
        return wanted;
    }
    let fitted = ApbPrescaler::from_divisor(hclk.div_ceil(max_hz.max(1)));
    warn!(
        "APB divider /{} too small for {} Hz, using /{}",
        wanted.into_divisor(),
        hclk,
        fitted.into_divisor()
    );
    fitted
}
