//! Bus prescalers
//!
//! The AHB and APB dividers only accept powers of two, and AHB has a hole
//! where divide-by-32 would be. Requests for arbitrary divisors are rounded
//! onto the ladder here.

/// Exponent of the power of two closest to `divisor`.
///
/// Scans `2^0..2^19` and stops as soon as the error grows again; on an exact
/// tie the smaller power wins.
pub fn nearest_power_of_two_exp(divisor: u32) -> u32 {
    let mut best = 0;
    let mut best_err = u64::MAX;
    for exp in 0..20 {
        let err = (divisor as i64 - (1i64 << exp)).unsigned_abs();
        if err >= best_err {
            break;
        }
        best_err = err;
        best = exp;
    }
    best
}

/// Power of two closest to `divisor`
pub fn nearest_power_of_two(divisor: u32) -> u32 {
    1 << nearest_power_of_two_exp(divisor)
}

/// Exponent of the smallest power of two that is `>= divisor`.
///
/// Only holds up to `2^20`: larger divisors still get 20, since the scan
/// stops at `2^19`. Both prescalers saturate long before that.
pub fn smallest_sufficient_power_of_two_exp(divisor: u32) -> u32 {
    let exp = nearest_power_of_two_exp(divisor);
    if (1u64 << exp) < divisor as u64 {
        exp + 1
    } else {
        exp
    }
}

/// Smallest power of two that is `>= divisor`, for `divisor <= 2^20`
pub fn smallest_sufficient_power_of_two(divisor: u32) -> u32 {
    1 << smallest_sufficient_power_of_two_exp(divisor)
}

/// HPRE field value for the requested AHB divisor.
///
/// Rounds up, so the resulting bus is never faster than requested. There is
/// no divide-by-32 setting; 32 becomes 64.
pub fn encode_ahb(divisor: u32) -> u8 {
    if divisor <= 1 {
        return 0;
    }
    if divisor >= 512 {
        return 0b1111;
    }
    match smallest_sufficient_power_of_two_exp(divisor) {
        0 => 0,
        exp @ 1..=4 => 0b1000 + exp as u8 - 1,
        5 => 0b1100,
        exp => 0b1000 + exp as u8 - 2,
    }
}

/// PPRE1/PPRE2 field value for the requested APB divisor, rounding up
pub fn encode_apb(divisor: u32) -> u8 {
    if divisor <= 1 {
        return 0;
    }
    let exp = smallest_sufficient_power_of_two_exp(divisor);
    (0b100 + exp - 1).min(0b111) as u8
}

/// AHB prescaler, HCLK = SYSCLK / divisor
///
/// ```text
///          ┌──────────┐          ┌────────┐
/// sysclk ─▶│   AHB    │── hclk ─▶│  APBx  │──▶ pclkx
///          │ /1../512 │          │ /1../16│
///          └──────────┘          └────────┘
///               ▲                     ▲
///               │                     │
///        RCC_CFGR.HPRE[3:0]   RCC_CFGR.PPREx[2:0]
/// ```
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AhbPrescaler {
    Div1 = 0b0000,
    Div2 = 0b1000,
    Div4 = 0b1001,
    Div8 = 0b1010,
    Div16 = 0b1011,
    Div64 = 0b1100,
    Div128 = 0b1101,
    Div256 = 0b1110,
    Div512 = 0b1111,
}

impl AhbPrescaler {
    /// Round an arbitrary divisor onto the AHB ladder
    pub fn from_divisor(divisor: u32) -> Self {
        Self::from_bits(encode_ahb(divisor))
    }

    /// Decode an HPRE field. All `0xxx` values mean "not divided".
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b1111 {
            0b1000 => Self::Div2,
            0b1001 => Self::Div4,
            0b1010 => Self::Div8,
            0b1011 => Self::Div16,
            0b1100 => Self::Div64,
            0b1101 => Self::Div128,
            0b1110 => Self::Div256,
            0b1111 => Self::Div512,
            _ => Self::Div1,
        }
    }

    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    pub const fn into_divisor(self) -> u32 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div64 => 64,
            Self::Div128 => 128,
            Self::Div256 => 256,
            Self::Div512 => 512,
        }
    }
}

/// APB1/APB2 prescaler, PCLKx = HCLK / divisor
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApbPrescaler {
    Div1 = 0b000,
    Div2 = 0b100,
    Div4 = 0b101,
    Div8 = 0b110,
    Div16 = 0b111,
}

impl ApbPrescaler {
    /// Round an arbitrary divisor onto the APB ladder
    pub fn from_divisor(divisor: u32) -> Self {
        Self::from_bits(encode_apb(divisor))
    }

    /// Decode a PPREx field. All `0xx` values mean "not divided".
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b100 => Self::Div2,
            0b101 => Self::Div4,
            0b110 => Self::Div8,
            0b111 => Self::Div16,
            _ => Self::Div1,
        }
    }

    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    pub const fn into_divisor(self) -> u32 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
        }
    }
}
