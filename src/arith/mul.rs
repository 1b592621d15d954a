//! Parameterized fused multiplier, three logical stages.
//!
//! Stage 1 classifies the operands and precomputes the exponent and the
//! normalization shift; stage 2 forms the raw significand product; stage 3
//! shifts, rounds, and assembles the packed result. The split mirrors the
//! pipeline registers of the hardware multiplier: the stage-1 summary is
//! latched one cycle before the product.

use super::{clz, mask, round};
use crate::fp::RoundingMode;

/// Stage-1 summary: classification flags and exponent/shift precompute.
#[derive(Debug, Clone, Copy, Default)]
pub struct MulPrep {
    pub special_valid: bool,
    pub special_nan: bool,
    /// Any-infinity flag. Computed even when `0 * inf` forces NaN; the NaN
    /// flag wins during stage-3 assembly.
    pub special_inf: bool,
    pub special_has_zero: bool,
    pub early_overflow: bool,
    pub prod_sign: bool,
    pub shift_amt: u32,
    pub exp_shifted: i32,
    pub may_be_subnormal: bool,
    pub rm: RoundingMode,
}

#[inline]
fn unpack(bits: u64, exp_width: u32, precision: u32) -> (bool, u32, u64) {
    let sign = (bits >> (exp_width + precision - 1)) & 1 == 1;
    let exp = ((bits >> (precision - 1)) as u32) & ((1 << exp_width) - 1);
    let mant = bits & mask(precision - 1);
    (sign, exp, mant)
}

/// Stage 1: classification and exponent computation.
pub fn fmul_s1(a: u64, b: u64, exp_width: u32, precision: u32, rm: RoundingMode) -> MulPrep {
    let padding = precision + 2;
    let bias = (1i32 << (exp_width - 1)) - 1;
    let max_norm_exp = (1i32 << exp_width) - 2;

    let (a_sign, a_exp, a_mant) = unpack(a, exp_width, precision);
    let (b_sign, b_exp, b_mant) = unpack(b, exp_width, precision);

    let exp_ones = (1u32 << exp_width) - 1;
    let a_exp_is_zero = a_exp == 0;
    let b_exp_is_zero = b_exp == 0;
    let a_is_inf = a_exp == exp_ones && a_mant == 0;
    let b_is_inf = b_exp == exp_ones && b_mant == 0;
    let a_is_nan = a_exp == exp_ones && a_mant != 0;
    let b_is_nan = b_exp == exp_ones && b_mant != 0;
    let a_is_zero = a_exp_is_zero && a_mant == 0;
    let b_is_zero = b_exp_is_zero && b_mant == 0;

    // Subnormal exponents read as 1; the hidden bit attaches only when the
    // exponent field is nonzero.
    let raw_a_exp = (a_exp | a_exp_is_zero as u32) as i32;
    let raw_b_exp = (b_exp | b_exp_is_zero as u32) as i32;
    let a_sig = if a_exp_is_zero { 0 } else { 1u64 << (precision - 1) } | a_mant;
    let b_sig = if b_exp_is_zero { 0 } else { 1u64 << (precision - 1) } | b_mant;

    let exp_sum = raw_a_exp + raw_b_exp;
    let prod_exp = exp_sum - (bias - (padding as i32 + 1));
    let shift_lim_sub = exp_sum - (bias - padding as i32);
    let prod_exp_uf = shift_lim_sub < 0;
    let shift_lim = if prod_exp_uf { 0 } else { shift_lim_sub as u32 };

    // Normalization distance of the subnormal operand (or the fixed
    // distance of a normal one), over the doubled significand width.
    let subnormal_sig = if a_exp_is_zero { a_sig } else { b_sig };
    let lzc_val = clz(subnormal_sig, precision * 2 + 2);

    let exceed_lim = shift_lim <= lzc_val;
    let shift_amt = if prod_exp_uf {
        0
    } else if exceed_lim {
        shift_lim
    } else {
        lzc_val
    };

    let has_zero = a_is_zero || b_is_zero;
    let has_nan = a_is_nan || b_is_nan;
    let has_inf = a_is_inf || b_is_inf;
    let zero_mul_inf = has_zero && has_inf;

    MulPrep {
        special_valid: has_zero || has_nan || has_inf,
        special_nan: has_nan || zero_mul_inf,
        special_inf: has_inf,
        special_has_zero: has_zero,
        early_overflow: exp_sum > max_norm_exp + bias,
        prod_sign: a_sign ^ b_sign,
        shift_amt,
        exp_shifted: prod_exp - shift_amt as i32,
        may_be_subnormal: exceed_lim || prod_exp_uf,
        rm,
    }
}

/// Stage 2: the raw significand product, `2 * precision` bits.
pub fn fmul_s2(a: u64, b: u64, exp_width: u32, precision: u32) -> u64 {
    let (_, a_exp, a_mant) = unpack(a, exp_width, precision);
    let (_, b_exp, b_mant) = unpack(b, exp_width, precision);
    let a_sig = if a_exp == 0 { 0 } else { 1u64 << (precision - 1) } | a_mant;
    let b_sig = if b_exp == 0 { 0 } else { 1u64 << (precision - 1) } | b_mant;
    a_sig * b_sig
}

/// Stage 3: normalization shift, rounding, result assembly.
pub fn fmul_s3(prep: &MulPrep, prod: u64, exp_width: u32, precision: u32) -> u64 {
    let near_inv = (1i32 << exp_width) - 2;
    let inv = (1i32 << exp_width) - 1;
    let rm = prep.rm;
    let sign = prep.prod_sign;

    // Special cases short-circuit the datapath.
    if prep.special_valid {
        let (sp_exp, sp_sig) = if prep.special_nan {
            (inv, 1u64 << (precision - 2))
        } else if prep.special_inf {
            (inv, 0)
        } else {
            (0, 0) // has-zero
        };
        return assemble(sign, sp_exp, sp_sig, exp_width, precision);
    }

    let total_width = precision * 3 + 2;
    let shifted = (prod << prep.shift_amt) & mask(total_width);
    let top_set = (shifted >> (total_width - 1)) & 1 == 1;
    let exp_is_subnormal = prep.may_be_subnormal && !top_set;
    let no_extra_shift = top_set || exp_is_subnormal;

    let exp_pre = if exp_is_subnormal {
        0
    } else if no_extra_shift {
        prep.exp_shifted
    } else {
        prep.exp_shifted - 1
    };
    let sig = if no_extra_shift {
        shifted
    } else {
        (shifted & mask(total_width - 1)) << 1
    };

    // Rounding input: the top precision+2 bits, then a sticky OR over every
    // remaining product bit.
    let kept = (sig >> (precision * 2)) & mask(precision + 2);
    let sticky_low = sig & mask(precision * 2) != 0;
    let raw_sig = (kept << 1) | sticky_low as u64;

    let r_in = raw_sig & mask(precision + 2);
    let data = (r_in >> 3) & mask(precision - 1);
    let roundin = (r_in >> 2) & 1 == 1;
    let stickyin = r_in & 3 != 0;
    let rr = round(data, precision - 1, sign, roundin, stickyin, rm);

    let exp_rounded = rr.cout as i32 + exp_pre;
    let overflow = if rr.cout { exp_pre == near_inv } else { exp_pre == inv };
    let overflow = overflow || prep.early_overflow;

    if overflow {
        let (of_exp, of_sig) = if rm.overflow_saturates(sign) {
            (near_inv, mask(precision - 1))
        } else {
            (inv, 0)
        };
        return assemble(sign, of_exp, of_sig, exp_width, precision);
    }

    assemble(sign, exp_rounded, rr.out, exp_width, precision)
}

#[inline]
fn assemble(sign: bool, exp: i32, sig: u64, exp_width: u32, precision: u32) -> u64 {
    ((sign as u64) << (exp_width + precision - 1))
        | (((exp as u64) & mask(exp_width)) << (precision - 1))
        | (sig & mask(precision - 1))
}

/// Full combinational multiply: stages 1-3 back to back.
pub fn fp_mul(a: u64, b: u64, exp_width: u32, precision: u32, rm: RoundingMode) -> u64 {
    let prep = fmul_s1(a, b, exp_width, precision, rm);
    let prod = fmul_s2(a, b, exp_width, precision);
    fmul_s3(&prep, prod, exp_width, precision)
}

/// FP9 multiply as the dot-product unit instantiates it.
#[inline]
pub fn fp9_mul(a: u16, b: u16, rm: RoundingMode) -> u16 {
    fp_mul(a as u64, b as u64, 5, 4, rm) as u16
}
