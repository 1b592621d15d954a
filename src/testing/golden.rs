//! Golden references for the harness.
//!
//! Two oracles serve different purposes: the *quantized golden* runs the
//! combinational model and converts its FP22 results exactly as the
//! pipeline's last stage does (bit-exactness is the pass criterion); the
//! *FP32 golden* is a single-precision matmul over the inputs as the core
//! sees them (a reported sanity bound on the error the low-precision
//! datapath introduces — near-cancelling elements can make the relative
//! error arbitrarily large, so it is reported, not asserted).

use crate::fp::convert::{convert_fp22_to_output_bits, fp16_to_fp9};
use crate::fp::softfloat::{bits_to_f64, fp9_to_f64};
use crate::fp::{Precision, RoundingMode};
use crate::testing::MatrixSet;

/// The value of a raw A/B element as the datapath sees it: FP16 loses
/// mantissa bits in the FP9 fold, so it reads through the fold; the other
/// input formats fold exactly.
pub fn operand_as_folded(raw: u32, prec: Precision) -> f64 {
    match prec {
        Precision::Fp16 => fp9_to_f64(fp16_to_fp9(raw as u16)),
        _ => bits_to_f64(raw, prec),
    }
}

/// Single-precision software matmul over the folded operands.
pub fn golden_fp32_matmul(ms: &MatrixSet, prec: Precision) -> [[f64; 8]; 8] {
    let mut out = [[0.0; 8]; 8];
    for i in 0..8 {
        for j in 0..8 {
            let mut acc = 0.0f32;
            for k in 0..8 {
                let a = operand_as_folded(ms.a_raw[i][k], prec) as f32;
                let b = operand_as_folded(ms.b_raw[k][j], prec) as f32;
                acc += a * b;
            }
            let c = bits_to_f64(ms.c_raw[i][j], prec) as f32;
            out[i][j] = (acc + c) as f64;
        }
    }
    out
}

/// Convert a model FP22 matrix to output bits, element by element.
pub fn quantized_golden(
    d_fp22: &[[u32; 8]; 8],
    out_prec: Precision,
    rm: RoundingMode,
) -> [[u32; 8]; 8] {
    let mut out = [[0u32; 8]; 8];
    for i in 0..8 {
        for j in 0..8 {
            out[i][j] = convert_fp22_to_output_bits(d_fp22[i][j], out_prec, rm);
        }
    }
    out
}

/// Maximum relative error of the converted outputs against the FP32
/// golden, skipping zero/non-finite reference elements.
pub fn max_rel_error(
    d_out: &[[u32; 8]; 8],
    out_prec: Precision,
    golden: &[[f64; 8]; 8],
) -> f64 {
    let mut max_rel = 0.0f64;
    for i in 0..8 {
        for j in 0..8 {
            let expected = golden[i][j];
            if expected == 0.0 || !expected.is_finite() {
                continue;
            }
            let actual = bits_to_f64(d_out[i][j], out_prec);
            let rel = (actual - expected).abs() / expected.abs();
            if rel > max_rel {
                max_rel = rel;
            }
        }
    }
    max_rel
}
