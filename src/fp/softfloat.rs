//! Software-float bridges between the packed encodings and `f64`.
//!
//! The datapath never touches native floats; these converters exist for the
//! test harness (stimulus generation, result printing, relative-error
//! oracles) and for the exhaustive arithmetic tests, where an `f64`
//! computation over exactly-representable operands serves as ground truth.
//!
//! The encoders take an explicit [`RoundingMode`] so directed-rounding
//! behavior of the hardware paths can be checked bit-for-bit.

use super::{FpClass, FpFormat, Precision, RoundingMode};

/// Decode a packed value of any format to `f64`. Exact: every finite value
/// of every supported format is representable in `f64`.
pub fn decode_f64(fmt: &FpFormat, bits: u64) -> f64 {
    let f = fmt.decode(bits);
    let s = if f.sign { -1.0 } else { 1.0 };
    match f.class {
        FpClass::Zero => s * 0.0,
        FpClass::Infinity => s * f64::INFINITY,
        FpClass::Nan => f64::NAN,
        FpClass::Subnormal => {
            let e = 1 - fmt.bias() - fmt.mant_bits as i32;
            s * (f.mant as f64) * 2f64.powi(e)
        }
        FpClass::Normal => {
            let sig = f.mant | (1 << fmt.mant_bits);
            let e = f.exp as i32 - fmt.bias() - fmt.mant_bits as i32;
            s * (sig as f64) * 2f64.powi(e)
        }
    }
}

/// Encode an `f64` into a packed value under the given rounding mode.
///
/// Overflow follows the core's saturation policy: RTZ, and the directed
/// mode pointing away from the overflow, produce the largest finite value;
/// the other modes produce infinity (E4M3 always saturates). An exactly
/// zero input keeps its sign.
pub fn encode_f64(fmt: &FpFormat, v: f64, rm: RoundingMode) -> u64 {
    if v.is_nan() {
        return fmt.quiet_nan();
    }
    let sign = v.is_sign_negative();
    if v == 0.0 {
        return fmt.encode(sign, 0, 0);
    }
    if v.is_infinite() {
        return fmt.infinity(sign);
    }

    // Decompose |v| into a 53-bit significand and unbiased exponent.
    let b = v.abs().to_bits();
    let mut e2 = ((b >> 52) & 0x7FF) as i32;
    let mut m53 = b & ((1u64 << 52) - 1);
    if e2 == 0 {
        e2 = 1;
        while m53 & (1 << 52) == 0 {
            m53 <<= 1;
            e2 -= 1;
        }
    } else {
        m53 |= 1 << 52;
    }
    let unbiased = e2 - 1023;

    let p = fmt.mant_bits;
    let biased = unbiased + fmt.bias();
    let max_exp = fmt.exp_mask() as i32; // all-ones: Inf/NaN row

    if biased >= max_exp {
        return overflow(fmt, sign, rm);
    }

    // Right-shift distance from the 53-bit significand down to the target
    // mantissa; for subnormal targets the shift grows by the exponent
    // deficit.
    let shift = if biased >= 1 {
        (52 - p) as i32
    } else {
        (52 - p) as i32 + (1 - biased)
    };

    let (keep, guard, sticky) = shift_with_grs(m53, shift as u32);
    let up = round_up(rm, sign, keep & 1 == 1, guard, sticky);
    let mut sig = keep + up as u64;

    if biased >= 1 {
        let mut be = biased;
        if sig >> (p + 1) != 0 {
            sig >>= 1;
            be += 1;
        }
        if be >= max_exp {
            return overflow(fmt, sign, rm);
        }
        fmt.encode(sign, be as u32, sig)
    } else {
        // Subnormal result; a full carry promotes to the minimum normal.
        let be = if sig >> p != 0 { 1 } else { 0 };
        fmt.encode(sign, be, sig)
    }
}

fn overflow(fmt: &FpFormat, sign: bool, rm: RoundingMode) -> u64 {
    if !fmt.has_infinity || rm.overflow_saturates(sign) {
        fmt.max_finite(sign)
    } else {
        fmt.encode(sign, fmt.exp_mask(), 0)
    }
}

/// Shift right by `n`, returning the kept bits, the guard bit (first bit
/// shifted out), and a sticky OR of everything below it.
fn shift_with_grs(v: u64, n: u32) -> (u64, bool, bool) {
    if n == 0 {
        (v, false, false)
    } else if n > 63 {
        (0, false, v != 0)
    } else {
        let keep = v >> n;
        let guard = (v >> (n - 1)) & 1 == 1;
        let sticky = v & ((1 << (n - 1)) - 1) != 0;
        (keep, guard, sticky)
    }
}

fn round_up(rm: RoundingMode, sign: bool, lsb: bool, guard: bool, sticky: bool) -> bool {
    let inexact = guard || sticky;
    match rm {
        RoundingMode::Rne => guard && (sticky || lsb),
        RoundingMode::Rtz => false,
        RoundingMode::Rdn => sign && inexact,
        RoundingMode::Rup => !sign && inexact,
        RoundingMode::Rmm => guard,
    }
}

// Per-format shorthands used throughout the harness.

pub fn fp4_to_f64(bits: u8) -> f64 {
    decode_f64(&FpFormat::FP4, bits as u64)
}

pub fn fp8_e4m3_to_f64(bits: u8) -> f64 {
    decode_f64(&FpFormat::FP8_E4M3, bits as u64)
}

pub fn fp8_e5m2_to_f64(bits: u8) -> f64 {
    decode_f64(&FpFormat::FP8_E5M2, bits as u64)
}

pub fn fp9_to_f64(bits: u16) -> f64 {
    decode_f64(&FpFormat::FP9, bits as u64)
}

pub fn fp16_to_f64(bits: u16) -> f64 {
    half::f16::from_bits(bits).to_f64()
}

pub fn fp22_to_f64(bits: u32) -> f64 {
    decode_f64(&FpFormat::FP22, bits as u64)
}

pub fn fp32_to_f64(bits: u32) -> f64 {
    f32::from_bits(bits) as f64
}

pub fn f64_to_fp4(v: f64) -> u8 {
    encode_f64(&FpFormat::FP4, v, RoundingMode::Rne) as u8
}

pub fn f64_to_fp8_e4m3(v: f64) -> u8 {
    encode_f64(&FpFormat::FP8_E4M3, v, RoundingMode::Rne) as u8
}

pub fn f64_to_fp8_e5m2(v: f64) -> u8 {
    encode_f64(&FpFormat::FP8_E5M2, v, RoundingMode::Rne) as u8
}

pub fn f64_to_fp16(v: f64) -> u16 {
    half::f16::from_f64(v).to_bits()
}

/// FP9 encode with explicit rounding mode (test oracle for the multiplier
/// and adder paths).
pub fn f64_to_fp9(v: f64, rm: RoundingMode) -> u16 {
    encode_f64(&FpFormat::FP9, v, rm) as u16
}

/// FP22 encode with explicit rounding mode.
pub fn f64_to_fp22(v: f64, rm: RoundingMode) -> u32 {
    encode_f64(&FpFormat::FP22, v, rm) as u32
}

/// Interpret a raw element of the given precision as `f64`.
pub fn bits_to_f64(bits: u32, prec: Precision) -> f64 {
    match prec {
        Precision::Fp16 => fp16_to_f64(bits as u16),
        Precision::Fp32 => fp32_to_f64(bits),
        _ => decode_f64(prec.format(), bits as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_values() {
        assert_eq!(fp9_to_f64(0x078), 1.0);
        assert_eq!(fp9_to_f64(0x178), -1.0);
        assert_eq!(fp9_to_f64(0x070), 0.5);
        assert_eq!(fp9_to_f64(0x086), 3.5);
        assert_eq!(fp9_to_f64(0x001), 2f64.powi(-17)); // min subnormal
        assert_eq!(fp22_to_f64(0x0FE000), 1.0);
        assert_eq!(fp8_e4m3_to_f64(0x77), 240.0);
        assert_eq!(fp4_to_f64(0x1), 0.5);
        assert!(fp9_to_f64(0x0F8).is_infinite());
        assert!(fp9_to_f64(0x0FC).is_nan());
        assert!(fp8_e4m3_to_f64(0x78).is_nan()); // whole exp=15 row is NaN
    }

    #[test]
    fn test_signed_zero() {
        assert!(fp9_to_f64(0x100).is_sign_negative());
        assert_eq!(f64_to_fp9(-0.0, RoundingMode::Rne), 0x100);
        assert_eq!(f64_to_fp9(0.0, RoundingMode::Rne), 0x000);
    }

    #[test]
    fn test_encode_decode_roundtrip_fp9() {
        // Every finite FP9 value encodes back to itself.
        for bits in 0..0x200u16 {
            let v = fp9_to_f64(bits);
            if v.is_nan() || v.is_infinite() {
                continue;
            }
            assert_eq!(f64_to_fp9(v, RoundingMode::Rne), bits, "bits {:#x}", bits);
        }
    }

    #[test]
    fn test_encode_matches_half_for_fp16() {
        // The generic encoder under RNE agrees with the `half` crate.
        for &v in &[0.0, 1.0, -1.0, 0.5, 3.5, 65504.0, 100000.0, 1e-8, 2f64.powi(-24)] {
            assert_eq!(
                encode_f64(&FpFormat::FP16, v, RoundingMode::Rne) as u16,
                half::f16::from_f64(v).to_bits(),
                "value {}",
                v
            );
        }
    }

    #[test]
    fn test_rne_ties() {
        // 1.25^2 = 1.5625 is exactly halfway between 1.5 and 1.625 in FP9.
        assert_eq!(f64_to_fp9(1.5625, RoundingMode::Rne), 0x07C); // 1.5, even
        assert_eq!(f64_to_fp9(1.5625, RoundingMode::Rmm), 0x07D); // 1.625, away
        assert_eq!(f64_to_fp9(1.5625, RoundingMode::Rtz), 0x07C);
        assert_eq!(f64_to_fp9(1.5625, RoundingMode::Rup), 0x07D);
        assert_eq!(f64_to_fp9(-1.5625, RoundingMode::Rdn), 0x17D);
    }

    #[test]
    fn test_overflow_policy() {
        // FP9 max finite is 1.875 * 2^15 = 61440.
        assert_eq!(f64_to_fp9(1e6, RoundingMode::Rne), 0x0F8); // +Inf
        assert_eq!(f64_to_fp9(1e6, RoundingMode::Rtz), 0x0F7); // max finite
        assert_eq!(f64_to_fp9(1e6, RoundingMode::Rdn), 0x0F7);
        assert_eq!(f64_to_fp9(1e6, RoundingMode::Rup), 0x0F8);
        assert_eq!(f64_to_fp9(-1e6, RoundingMode::Rup), 0x1F7);
        assert_eq!(f64_to_fp9(-1e6, RoundingMode::Rdn), 0x1F8);
        // E4M3 never has an infinity to give.
        assert_eq!(f64_to_fp8_e4m3(1e6), 0x77);
    }

    #[test]
    fn test_subnormal_encode() {
        // Half of the FP9 minimum subnormal ties to zero under RNE but
        // rounds away under RMM/RUP.
        let half_min = 2f64.powi(-18);
        assert_eq!(f64_to_fp9(half_min, RoundingMode::Rne), 0x000);
        assert_eq!(f64_to_fp9(half_min, RoundingMode::Rmm), 0x001);
        assert_eq!(f64_to_fp9(half_min, RoundingMode::Rup), 0x001);
        assert_eq!(f64_to_fp9(-half_min, RoundingMode::Rdn), 0x101);
    }
}
