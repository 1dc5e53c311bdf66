//! In-memory register file for host tests
//!
//! Every mutating access is appended to [`FakeRegisters::ops`], so tests can
//! assert the exact order in which the controller touched the hardware.

use super::config::{AuxPll, ClockSource, ClockUnit};
use super::pll::PllConfig;
use super::prescaler::{AhbPrescaler, ApbPrescaler};
use super::regs::ClockRegisters;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Reset,
    Enable(ClockUnit),
    Disable(ClockUnit),
    HseBypass(bool),
    WriteMainPll(PllConfig),
    WriteAuxPll(AuxPll, PllConfig),
    SelectSysclk(ClockSource),
    Ahb(AhbPrescaler),
    Apb1(ApbPrescaler),
    Apb2(ApbPrescaler),
    FlashLatency(u8),
    FlashAccelerator,
    Barrier,
}

const UNITS: [ClockUnit; 5] = [
    ClockUnit::Hsi,
    ClockUnit::Hse,
    ClockUnit::MainPll,
    ClockUnit::PllSai,
    ClockUnit::PllI2s,
];

fn slot(unit: ClockUnit) -> usize {
    match unit {
        ClockUnit::Hsi => 0,
        ClockUnit::Hse => 1,
        ClockUnit::MainPll => 2,
        ClockUnit::PllSai => 3,
        ClockUnit::PllI2s => 4,
    }
}

/// PLLCFGR after reset: 0x2400_3010
const MAIN_PLL_RESET: PllConfig = PllConfig {
    source: ClockSource::Hsi,
    m: 16,
    n: 192,
    p: 2,
    q: 4,
    r: 0,
};

/// PLLSAICFGR and PLLI2SCFGR after reset: 0x2400_3000
const AUX_PLL_RESET: PllConfig = PllConfig {
    source: ClockSource::Hsi,
    m: 16,
    n: 192,
    p: 2,
    q: 4,
    r: 2,
};

pub(crate) struct FakeRegisters {
    pub ops: Vec<Op>,
    enabled: [bool; 5],
    never_ready: [bool; 5],
    /// When set, SWS keeps reporting the previous source after a switch
    pub sws_stuck: bool,
    /// HSE is a crystal, so it never starts with HSEBYP set
    crystal: bool,
    hse_bypass: bool,
    main_pll: PllConfig,
    aux_pll: [PllConfig; 2],
    sw: ClockSource,
    /// Follows SW unless `sws_stuck`. `None` is the reserved encoding.
    pub sws: Option<ClockSource>,
    ahb: AhbPrescaler,
    apb1: ApbPrescaler,
    apb2: ApbPrescaler,
    latency: u8,
}

impl FakeRegisters {
    pub fn new() -> Self {
        let mut regs = Self {
            ops: Vec::new(),
            enabled: [false; 5],
            never_ready: [false; 5],
            sws_stuck: false,
            crystal: false,
            hse_bypass: false,
            main_pll: MAIN_PLL_RESET,
            aux_pll: [AUX_PLL_RESET; 2],
            sw: ClockSource::Hsi,
            sws: Some(ClockSource::Hsi),
            ahb: AhbPrescaler::Div1,
            apb1: ApbPrescaler::Div1,
            apb2: ApbPrescaler::Div1,
            latency: 0,
        };
        regs.apply_reset();
        regs
    }

    /// `unit` can be enabled but never reports ready
    pub fn never_ready(mut self, unit: ClockUnit) -> Self {
        self.never_ready[slot(unit)] = true;
        self
    }

    pub fn crystal(mut self) -> Self {
        self.crystal = true;
        self
    }

    pub fn is_enabled(&self, unit: ClockUnit) -> bool {
        self.enabled[slot(unit)]
    }

    pub fn hse_bypass(&self) -> bool {
        self.hse_bypass
    }

    pub fn selected(&self) -> ClockSource {
        self.sw
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Position of the first recorded `op`
    pub fn position(&self, op: Op) -> Option<usize> {
        self.ops.iter().position(|o| *o == op)
    }

    /// Position of the last recorded `op`
    pub fn last_position(&self, op: Op) -> Option<usize> {
        self.ops.iter().rposition(|o| *o == op)
    }

    fn apply_reset(&mut self) {
        self.enabled = [false; 5];
        self.enabled[slot(ClockUnit::Hsi)] = true;
        self.hse_bypass = false;
        self.main_pll = MAIN_PLL_RESET;
        self.aux_pll = [AUX_PLL_RESET; 2];
        self.sw = ClockSource::Hsi;
        self.sws = Some(ClockSource::Hsi);
        self.ahb = AhbPrescaler::Div1;
        self.apb1 = ApbPrescaler::Div1;
        self.apb2 = ApbPrescaler::Div1;
    }
}

impl ClockRegisters for FakeRegisters {
    fn reset(&mut self) {
        self.ops.push(Op::Reset);
        self.apply_reset();
    }

    fn enable(&mut self, unit: ClockUnit) {
        self.ops.push(Op::Enable(unit));
        self.enabled[slot(unit)] = true;
    }

    fn disable(&mut self, unit: ClockUnit) {
        self.ops.push(Op::Disable(unit));
        self.enabled[slot(unit)] = false;
    }

    fn is_ready(&self, unit: ClockUnit) -> bool {
        let i = slot(unit);
        let stalled = unit == ClockUnit::Hse && self.crystal && self.hse_bypass;
        self.enabled[i] && !self.never_ready[i] && !stalled
    }

    fn set_hse_bypass(&mut self, bypass: bool) {
        self.ops.push(Op::HseBypass(bypass));
        self.hse_bypass = bypass;
    }

    fn write_main_pll(&mut self, config: &PllConfig) {
        self.ops.push(Op::WriteMainPll(*config));
        self.main_pll = PllConfig { r: 0, ..*config };
    }

    fn read_main_pll(&self) -> PllConfig {
        self.main_pll
    }

    fn write_aux_pll(&mut self, which: AuxPll, config: &PllConfig) {
        self.ops.push(Op::WriteAuxPll(which, *config));
        self.aux_pll[which.index()] = *config;
    }

    fn read_aux_pll(&self, which: AuxPll) -> PllConfig {
        PllConfig {
            source: self.main_pll.source,
            m: self.main_pll.m,
            ..self.aux_pll[which.index()]
        }
    }

    fn select_sysclk(&mut self, source: ClockSource) {
        self.ops.push(Op::SelectSysclk(source));
        self.sw = source;
        if !self.sws_stuck {
            self.sws = Some(source);
        }
    }

    fn sysclk_status(&self) -> Option<ClockSource> {
        self.sws
    }

    fn set_ahb_prescaler(&mut self, prescaler: AhbPrescaler) {
        self.ops.push(Op::Ahb(prescaler));
        self.ahb = prescaler;
    }

    fn ahb_prescaler(&self) -> AhbPrescaler {
        self.ahb
    }

    fn set_apb1_prescaler(&mut self, prescaler: ApbPrescaler) {
        self.ops.push(Op::Apb1(prescaler));
        self.apb1 = prescaler;
    }

    fn apb1_prescaler(&self) -> ApbPrescaler {
        self.apb1
    }

    fn set_apb2_prescaler(&mut self, prescaler: ApbPrescaler) {
        self.ops.push(Op::Apb2(prescaler));
        self.apb2 = prescaler;
    }

    fn apb2_prescaler(&self) -> ApbPrescaler {
        self.apb2
    }

    fn set_flash_latency(&mut self, wait_states: u8) {
        self.ops.push(Op::FlashLatency(wait_states));
        self.latency = wait_states;
    }

    fn flash_latency(&self) -> u8 {
        self.latency
    }

    fn enable_flash_accelerator(&mut self) {
        self.ops.push(Op::FlashAccelerator);
    }

    fn barrier(&mut self) {
        self.ops.push(Op::Barrier);
    }
}

#[test]
fn reset_state_matches_reference_manual() {
    let regs = FakeRegisters::new();
    for unit in UNITS {
        assert_eq!(regs.is_enabled(unit), unit == ClockUnit::Hsi);
    }
    assert_eq!(regs.sysclk_status(), Some(ClockSource::Hsi));
    assert_eq!(regs.read_main_pll().m, 16);
    assert_eq!(regs.read_aux_pll(AuxPll::I2s).r, 2);
    assert!(regs.ops.is_empty());
}
