//! Random matrix stimulus.
//!
//! Values are drawn uniformly from a per-precision range chosen so that
//! products and sums exercise the whole dynamic range without everything
//! saturating, then encoded to the raw input format and pre-folded to the
//! FP9/FP22 operands the core consumes.

use rand::rngs::StdRng;
use rand::Rng;

use crate::fp::convert::{convert_c_to_fp22, convert_to_fp9};
use crate::fp::softfloat::{f64_to_fp16, f64_to_fp4, f64_to_fp8_e4m3, f64_to_fp8_e5m2};
use crate::fp::Precision;

/// One job's worth of stimulus: the raw-format words and the pre-folded
/// core operands.
#[derive(Debug, Clone)]
pub struct MatrixSet {
    pub a_fp9: [[u16; 8]; 8],
    pub b_fp9: [[u16; 8]; 8],
    pub c_fp22: [[u32; 8]; 8],
    pub a_raw: [[u32; 8]; 8],
    pub b_raw: [[u32; 8]; 8],
    pub c_raw: [[u32; 8]; 8],
}

/// Uniform sampling range for a given input precision.
pub fn value_range(prec: Precision) -> (f64, f64) {
    match prec {
        Precision::Fp4E2M1 => (-3.0, 3.0),
        Precision::Fp8E4M3 => (-8.0, 8.0),
        Precision::Fp8E5M2 => (-4.0, 4.0),
        Precision::Fp16 => (-10.0, 10.0),
        Precision::Fp32 => (-1.0, 1.0),
    }
}

fn encode_raw(v: f64, prec: Precision) -> u32 {
    match prec {
        Precision::Fp4E2M1 => f64_to_fp4(v) as u32,
        Precision::Fp8E4M3 => f64_to_fp8_e4m3(v) as u32,
        Precision::Fp8E5M2 => f64_to_fp8_e5m2(v) as u32,
        Precision::Fp16 => f64_to_fp16(v) as u32,
        Precision::Fp32 => (v as f32).to_bits(),
    }
}

/// Generate a random matrix set for the given input precision. The C bias
/// is drawn from half the operand range, as the hardware test bench does.
pub fn random_matrices(rng: &mut StdRng, prec: Precision) -> MatrixSet {
    let (lo, hi) = value_range(prec);
    let mut ms = MatrixSet {
        a_fp9: [[0; 8]; 8],
        b_fp9: [[0; 8]; 8],
        c_fp22: [[0; 8]; 8],
        a_raw: [[0; 8]; 8],
        b_raw: [[0; 8]; 8],
        c_raw: [[0; 8]; 8],
    };
    for i in 0..8 {
        for j in 0..8 {
            let va: f64 = rng.gen_range(lo..=hi);
            let vb: f64 = rng.gen_range(lo..=hi);
            let vc: f64 = rng.gen_range(lo * 0.5..=hi * 0.5);
            ms.a_raw[i][j] = encode_raw(va, prec);
            ms.b_raw[i][j] = encode_raw(vb, prec);
            ms.c_raw[i][j] = encode_raw(vc, prec);
            ms.a_fp9[i][j] = convert_to_fp9(ms.a_raw[i][j], prec);
            ms.b_fp9[i][j] = convert_to_fp9(ms.b_raw[i][j], prec);
            ms.c_fp22[i][j] = convert_c_to_fp22(ms.c_raw[i][j], prec);
        }
    }
    ms
}

/// Identity-A / test-vector-B stimulus for the edge-case scenario: A is the
/// FP16 identity folded to the input precision, every row of B carries one
/// value of `vals`, C is zero.
pub fn identity_set(vals: &[f64; 8], prec: Precision) -> MatrixSet {
    let mut ms = MatrixSet {
        a_fp9: [[0; 8]; 8],
        b_fp9: [[0; 8]; 8],
        c_fp22: [[0; 8]; 8],
        a_raw: [[0; 8]; 8],
        b_raw: [[0; 8]; 8],
        c_raw: [[0; 8]; 8],
    };
    for i in 0..8 {
        for j in 0..8 {
            let av = if i == j { 1.0 } else { 0.0 };
            ms.a_raw[i][j] = encode_raw(av, prec);
            ms.b_raw[i][j] = encode_raw(vals[i], prec);
            ms.a_fp9[i][j] = convert_to_fp9(ms.a_raw[i][j], prec);
            ms.b_fp9[i][j] = convert_to_fp9(ms.b_raw[i][j], prec);
        }
    }
    ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::softfloat::{bits_to_f64, fp9_to_f64};
    use rand::SeedableRng;

    #[test]
    fn test_generation_is_seeded() {
        let mut r1 = StdRng::seed_from_u64(42);
        let mut r2 = StdRng::seed_from_u64(42);
        let m1 = random_matrices(&mut r1, Precision::Fp16);
        let m2 = random_matrices(&mut r2, Precision::Fp16);
        assert_eq!(m1.a_fp9, m2.a_fp9);
        assert_eq!(m1.c_fp22, m2.c_fp22);
    }

    #[test]
    fn test_values_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for prec in Precision::INPUTS {
            let (lo, hi) = value_range(prec);
            let ms = random_matrices(&mut rng, prec);
            for i in 0..8 {
                for j in 0..8 {
                    let v = bits_to_f64(ms.a_raw[i][j], prec);
                    assert!(v >= lo && v <= hi, "{:?}: {}", prec, v);
                }
            }
        }
    }

    #[test]
    fn test_identity_set_diagonal() {
        let vals = [1.0, -1.0, 0.5, -0.5, 2.0, -2.0, 0.25, 3.5];
        let ms = identity_set(&vals, Precision::Fp16);
        for i in 0..8 {
            for j in 0..8 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert_eq!(fp9_to_f64(ms.a_fp9[i][j]), expect);
                assert_eq!(fp9_to_f64(ms.b_fp9[i][j]), vals[i]);
            }
            assert_eq!(ms.c_fp22[i][0], 0);
        }
    }
}
