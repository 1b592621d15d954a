//! One dot-product unit: the 11-stage pipeline behind a single output
//! element of `D = A * B + C`.
//!
//! ```text
//! stages 1-2   8x MUL        FP9 x FP9 -> FP9
//! stages 3-4   4x ADD L0     pairs (0,4) (1,5) (2,6) (3,7)
//! stages 5-6   2x ADD L1     (L0[0], L0[1])  (L0[2], L0[3])
//! stages 7-8   1x ADD L2     (L1[0], L1[1])
//! stages 9-10  FINAL ADD     widen to FP22, add C
//! stage  11    CONV          FP22 -> output format
//! ```
//!
//! The per-tick update runs consumer-before-producer (CONV first, MUL
//! last) so every stage decides from the previous cycle's downstream
//! state. Iterating the other way would collapse the pipeline into a
//! combinational evaluation.

use super::stage::PipeStage2;
use crate::arith::add::{fp22_add, fp9_add};
use crate::arith::mul::{fmul_s1, fmul_s2, fmul_s3, MulPrep};
use crate::fp::convert::{convert_fp22_to_output_bits, fp9_to_fp22};
use crate::fp::{Precision, RoundingMode};

/// Adder-tree pairing, level 0: lane k pairs with lane k + 4. The tree is
/// deliberately *not* associative-equivalent to adjacent pairing; this
/// table is shared with the combinational model so both sides agree
/// bit-for-bit.
pub const TREE_PAIRS: [(usize, usize); 4] = [(0, 4), (1, 5), (2, 6), (3, 7)];

/// Token flowing through a multiplier pipe: operands, the stage-1 summary,
/// and (after stage 2) the packed FP9 product.
#[derive(Debug, Clone, Copy, Default)]
struct MulToken {
    a: u16,
    b: u16,
    prep: MulPrep,
    result: u16,
}

/// A tree adder: one two-stage pipe plus the input latch that captures an
/// operand pair the cycle both producers are valid.
#[derive(Debug, Clone, Copy, Default)]
struct TreeAdder {
    pipe: PipeStage2<u16>,
    in_a: u16,
    in_b: u16,
    in_valid: bool,
}

impl TreeAdder {
    fn latch(&mut self, pair_valid: bool, a: u16, b: u16) {
        if pair_valid && !self.in_valid {
            self.in_a = a;
            self.in_b = b;
            self.in_valid = true;
        }
    }

    /// Advance one cycle; returns true when the latched pair was accepted
    /// into the pipe (freeing the latch).
    fn tick(&mut self, out_ready: bool, rm: RoundingMode) -> bool {
        let b = self.in_b;
        let accepted = self.pipe.tick(
            self.in_valid,
            self.in_a,
            out_ready,
            |v| *v,
            |v| fp9_add(*v, b, rm),
        );
        if accepted {
            self.in_valid = false;
        }
        accepted
    }

    fn reset(&mut self) {
        self.pipe.reset();
        self.in_valid = false;
    }
}

/// Per-tick inputs a dot-product unit reads from the tensor-core top.
/// The unit never writes these.
pub struct DpuInputs {
    /// Row of A for this unit, already folded to FP9.
    pub a_row: [u16; 8],
    /// Column of B for this unit, already folded to FP9.
    pub b_col: [u16; 8],
    /// C bias element, already widened to FP22.
    pub c: u32,
    pub rm: RoundingMode,
    pub output_prec: Precision,
    /// High while a job's operands are installed.
    pub input_loaded: bool,
}

/// Output latched by the conversion stage.
#[derive(Debug, Clone, Copy)]
pub struct DpuOutput {
    /// Raw FP22 accumulator value, before output conversion.
    pub fp22: u32,
    /// Result bits in the configured output format.
    pub out_bits: u32,
}

/// One of the 64 dot-product pipelines.
#[derive(Debug, Clone, Default)]
pub struct DotProductUnit {
    mul: [PipeStage2<MulToken>; 8],
    mul_result: [u16; 8],
    mul_result_valid: [bool; 8],
    add_l0: [TreeAdder; 4],
    add_l1: [TreeAdder; 2],
    add_l2: TreeAdder,
    final_add: PipeStage2<u32>,
    final_a: u32,
    final_b: u32,
    final_in_valid: bool,
    conv_valid: bool,
}

impl DotProductUnit {
    pub fn reset(&mut self) {
        for m in &mut self.mul {
            m.reset();
        }
        self.mul_result_valid = [false; 8];
        for a in &mut self.add_l0 {
            a.reset();
        }
        for a in &mut self.add_l1 {
            a.reset();
        }
        self.add_l2.reset();
        self.final_add.reset();
        self.final_in_valid = false;
        self.conv_valid = false;
    }

    /// Advance the unit one clock edge. Returns the converted result the
    /// cycle the output-conversion register latches it.
    pub fn tick(&mut self, inp: &DpuInputs) -> Option<DpuOutput> {
        let rm = inp.rm;

        // Stage 11: output conversion. Always ready downstream.
        let mut output = None;
        if self.final_add.out_valid() && !self.conv_valid {
            let fp22 = *self.final_add.out_data();
            self.conv_valid = true;
            output = Some(DpuOutput {
                fp22,
                out_bits: convert_fp22_to_output_bits(fp22, inp.output_prec, rm),
            });
        }

        // Stages 9-10: final FP22 add (widened tree result + C bias).
        let final_out_ready = true;
        if self.add_l2.pipe.out_valid() && !self.final_in_valid {
            self.final_a = fp9_to_fp22(*self.add_l2.pipe.out_data());
            self.final_b = inp.c;
            self.final_in_valid = true;
        }
        {
            let c = self.final_b;
            let accepted = self.final_add.tick(
                self.final_in_valid,
                self.final_a,
                final_out_ready,
                |v| *v,
                |v| fp22_add(*v, c, rm),
            );
            if accepted {
                self.final_in_valid = false;
            }
        }

        // Stages 7-8: adder tree level 2.
        let l2_out_ready = self.final_add.in_ready(final_out_ready);
        let l2_pair = self.add_l1[0].pipe.out_valid() && self.add_l1[1].pipe.out_valid();
        self.add_l2.latch(
            l2_pair,
            *self.add_l1[0].pipe.out_data(),
            *self.add_l1[1].pipe.out_data(),
        );
        self.add_l2.tick(l2_out_ready, rm);

        // Stages 5-6: adder tree level 1.
        let l1_out_ready = self.add_l2.pipe.in_ready(l2_out_ready);
        for a in 0..2 {
            let (src0, src1) = (a * 2, a * 2 + 1);
            let pair = self.add_l0[src0].pipe.out_valid() && self.add_l0[src1].pipe.out_valid();
            let (v0, v1) = (
                *self.add_l0[src0].pipe.out_data(),
                *self.add_l0[src1].pipe.out_data(),
            );
            self.add_l1[a].latch(pair, v0, v1);
            self.add_l1[a].tick(l1_out_ready, rm);
        }

        // Stages 3-4: adder tree level 0, the pair-across reduction.
        let l0_out_ready = [
            self.add_l1[0].pipe.in_ready(l1_out_ready),
            self.add_l1[1].pipe.in_ready(l1_out_ready),
        ];
        for (a, &(src0, src1)) in TREE_PAIRS.iter().enumerate() {
            let pair = self.mul_result_valid[src0] && self.mul_result_valid[src1];
            self.add_l0[a].latch(pair, self.mul_result[src0], self.mul_result[src1]);
            if self.add_l0[a].tick(l0_out_ready[a / 2], rm) {
                self.mul_result_valid[src0] = false;
                self.mul_result_valid[src1] = false;
            }
        }

        // Stages 1-2: the eight multipliers.
        for k in 0..8 {
            let mul_out_ready = !self.mul_result_valid[k];
            let in_valid = inp.input_loaded && !self.mul_result_valid[k];
            let token = MulToken {
                a: inp.a_row[k],
                b: inp.b_col[k],
                prep: MulPrep::default(),
                result: 0,
            };
            self.mul[k].tick(
                in_valid,
                token,
                mul_out_ready,
                |t| MulToken {
                    prep: fmul_s1(t.a as u64, t.b as u64, 5, 4, rm),
                    ..*t
                },
                |t| {
                    let prod = fmul_s2(t.a as u64, t.b as u64, 5, 4);
                    MulToken {
                        result: fmul_s3(&t.prep, prod, 5, 4) as u16,
                        ..*t
                    }
                },
            );
            if self.mul[k].out_valid() && !self.mul_result_valid[k] {
                self.mul_result[k] = self.mul[k].out_data().result & 0x1FF;
                self.mul_result_valid[k] = true;
            }
        }

        output
    }

    /// Stage occupancy snapshot for the visualization harness:
    /// `(mul, l0, l1, l2, final)` as `(reg1_any, reg2_any)` pairs, plus the
    /// conversion-register valid.
    pub fn occupancy(&self) -> ([(bool, bool); 5], bool) {
        let or_valids = |acc: (bool, bool), v: (bool, bool)| (acc.0 || v.0, acc.1 || v.1);
        let mul = self.mul.iter().map(|m| m.valids()).fold((false, false), or_valids);
        let l0 = self.add_l0.iter().map(|a| a.pipe.valids()).fold((false, false), or_valids);
        let l1 = self.add_l1.iter().map(|a| a.pipe.valids()).fold((false, false), or_valids);
        ([mul, l0, l1, self.add_l2.pipe.valids(), self.final_add.valids()], self.conv_valid)
    }
}
