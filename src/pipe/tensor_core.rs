//! Tensor-core top: 64 dot-product units computing `D = A * B + C`.
//!
//! The top owns the input matrices (written once per job, read-only while
//! it runs), the output matrices, and the per-job statistics. Each clock
//! tick advances every unit exactly once; the units share no state, so the
//! order within a tick is immaterial.

use thiserror::Error;

use super::dot_product::{DotProductUnit, DpuInputs};
use crate::fp::{Precision, RoundingMode};

/// Matrix dimensions: D[M][N] = A[M][K] * B[K][N] + C[M][N].
pub const M: usize = 8;
pub const K: usize = 8;
pub const N: usize = 8;

/// Cycles from a clean load to all outputs valid when nothing stalls:
/// 2 (mul) + 2 + 2 + 2 (tree) + 2 (final add) + 1 (convert).
pub const PIPELINE_DEPTH: u32 = 11;

/// Default cycle cap for [`TensorCore::run_to_completion`]; comfortably
/// above the pipeline depth.
pub const DEFAULT_MAX_CYCLES: u32 = 100;

/// Rejected job installs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A/B operands must arrive in one of the four foldable input formats.
    #[error("unsupported input precision {0}")]
    UnsupportedInput(&'static str),

    /// The accumulator only converts to the four output formats.
    #[error("unsupported output precision {0}")]
    UnsupportedOutput(&'static str),
}

/// Failures while driving the clock.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The cycle cap expired with output-valid bits still clear. This is a
    /// handshake bug in the simulator, never a legitimate outcome; callers
    /// should report it rather than retry.
    #[error("cycle cap of {limit} reached before all 64 outputs were valid")]
    CycleLimit { limit: u32 },
}

/// Running counters, cleared by [`TensorCore::reset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub total_cycles: u64,
    pub jobs_completed: u64,
}

/// The cycle-accurate tensor core.
pub struct TensorCore {
    input_prec: Precision,
    output_prec: Precision,
    rm: RoundingMode,

    a_fp9: [[u16; K]; M],
    b_fp9: [[u16; N]; K],
    c_fp22: [[u32; N]; M],

    d_fp22: [[u32; N]; M],
    d_out: [[u32; N]; M],
    d_valid: [[bool; N]; M],

    dpus: Vec<DotProductUnit>,
    input_loaded: bool,
    cycle_count: u64,
    pub stats: Stats,
}

impl Default for TensorCore {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorCore {
    pub fn new() -> Self {
        Self {
            input_prec: Precision::Fp8E4M3,
            output_prec: Precision::Fp8E4M3,
            rm: RoundingMode::Rne,
            a_fp9: [[0; K]; M],
            b_fp9: [[0; N]; K],
            c_fp22: [[0; N]; M],
            d_fp22: [[0; N]; M],
            d_out: [[0; N]; M],
            d_valid: [[false; N]; M],
            dpus: vec![DotProductUnit::default(); M * N],
            input_loaded: false,
            cycle_count: 0,
            stats: Stats::default(),
        }
    }

    /// Clear all pipeline state, output-valid bits, and statistics.
    pub fn reset(&mut self) {
        for dpu in &mut self.dpus {
            dpu.reset();
        }
        self.d_valid = [[false; N]; M];
        self.input_loaded = false;
        self.cycle_count = 0;
        self.stats = Stats::default();
    }

    /// Install a job: operands already folded (A, B to FP9; C to FP22),
    /// plus the precision tags and rounding mode. Every unit is cleared so
    /// the job starts from an empty pipeline.
    pub fn load_inputs(
        &mut self,
        a_fp9: &[[u16; K]; M],
        b_fp9: &[[u16; N]; K],
        c_fp22: &[[u32; N]; M],
        input_prec: Precision,
        output_prec: Precision,
        rm: RoundingMode,
    ) -> Result<(), LoadError> {
        if !Precision::INPUTS.contains(&input_prec) {
            return Err(LoadError::UnsupportedInput(input_prec.name()));
        }
        if !Precision::OUTPUTS.contains(&output_prec) {
            return Err(LoadError::UnsupportedOutput(output_prec.name()));
        }

        self.input_prec = input_prec;
        self.output_prec = output_prec;
        self.rm = rm;
        self.a_fp9 = *a_fp9;
        self.b_fp9 = *b_fp9;
        self.c_fp22 = *c_fp22;
        for dpu in &mut self.dpus {
            dpu.reset();
        }
        self.d_valid = [[false; N]; M];
        self.input_loaded = true;
        log::debug!(
            "job installed: in={} out={} rm={}",
            input_prec.name(),
            output_prec.name(),
            rm.name()
        );
        Ok(())
    }

    /// Advance one clock edge: every dot-product unit ticks once.
    pub fn tick(&mut self) {
        self.cycle_count += 1;
        for i in 0..M {
            for j in 0..N {
                let mut b_col = [0u16; K];
                for (k, col) in b_col.iter_mut().enumerate() {
                    *col = self.b_fp9[k][j];
                }
                let inputs = DpuInputs {
                    a_row: self.a_fp9[i],
                    b_col,
                    c: self.c_fp22[i][j],
                    rm: self.rm,
                    output_prec: self.output_prec,
                    input_loaded: self.input_loaded,
                };
                if let Some(out) = self.dpus[i * N + j].tick(&inputs) {
                    self.d_fp22[i][j] = out.fp22;
                    self.d_out[i][j] = out.out_bits;
                    self.d_valid[i][j] = true;
                    log::trace!(
                        "cycle {}: d[{}][{}] = {:#08x} (fp22 {:#08x})",
                        self.cycle_count,
                        i,
                        j,
                        out.out_bits,
                        out.fp22
                    );
                }
            }
        }
    }

    /// Tick until every output-valid bit is set, up to `max_cycles`.
    /// Returns the number of cycles the job took.
    pub fn run_to_completion(&mut self, max_cycles: u32) -> Result<u32, SimError> {
        if !self.input_loaded {
            return Ok(0);
        }
        for cycle in 1..=max_cycles {
            self.tick();
            if self.is_complete() {
                self.stats.total_cycles += cycle as u64;
                self.stats.jobs_completed += 1;
                self.input_loaded = false;
                log::debug!("job complete in {} cycles", cycle);
                return Ok(cycle);
            }
        }
        log::warn!("cycle cap {} reached with incomplete outputs", max_cycles);
        Err(SimError::CycleLimit { limit: max_cycles })
    }

    /// All 64 output-valid bits set?
    pub fn is_complete(&self) -> bool {
        self.d_valid.iter().all(|row| row.iter().all(|&v| v))
    }

    /// Converted output element; `Some` only once its valid bit is set.
    pub fn d_out(&self, i: usize, j: usize) -> Option<u32> {
        if self.d_valid[i][j] {
            Some(self.d_out[i][j])
        } else {
            None
        }
    }

    /// Raw FP22 accumulator element, for comparison against the
    /// combinational model.
    pub fn d_fp22(&self, i: usize, j: usize) -> u32 {
        self.d_fp22[i][j]
    }

    /// Full converted output matrix (valid once [`Self::is_complete`]).
    pub fn d_out_matrix(&self) -> &[[u32; N]; M] {
        &self.d_out
    }

    /// Full FP22 accumulator matrix.
    pub fn d_fp22_matrix(&self) -> &[[u32; N]; M] {
        &self.d_fp22
    }

    pub fn output_prec(&self) -> Precision {
        self.output_prec
    }

    pub fn rounding_mode(&self) -> RoundingMode {
        self.rm
    }

    /// Occupancy snapshot of one unit, for the visualization harness.
    pub fn dpu_occupancy(&self, i: usize, j: usize) -> ([(bool, bool); 5], bool) {
        self.dpus[i * N + j].occupancy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::convert::{convert_c_to_fp22, convert_to_fp9, fp16_to_fp9};
    use crate::fp::softfloat::{f64_to_fp16, fp16_to_f64, fp22_to_f64};
    use crate::fp::RoundingMode::*;
    use crate::model;

    fn zeros() -> ([[u16; 8]; 8], [[u16; 8]; 8], [[u32; 8]; 8]) {
        ([[0; 8]; 8], [[0; 8]; 8], [[0; 8]; 8])
    }

    fn fp16_matrix_to_fp9(vals: &[[f64; 8]; 8]) -> [[u16; 8]; 8] {
        let mut out = [[0u16; 8]; 8];
        for i in 0..8 {
            for j in 0..8 {
                out[i][j] = fp16_to_fp9(f64_to_fp16(vals[i][j]));
            }
        }
        out
    }

    #[test]
    fn test_zero_job_latency_is_pipeline_depth() {
        let (a, b, c) = zeros();
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        let cycles = core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
        assert_eq!(cycles, PIPELINE_DEPTH);
        for i in 0..8 {
            for j in 0..8 {
                assert_eq!(core.d_out(i, j), Some(0));
                assert_eq!(core.d_fp22(i, j), 0);
            }
        }
    }

    #[test]
    fn test_outputs_invalid_before_completion() {
        let (a, b, c) = zeros();
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        for _ in 0..(PIPELINE_DEPTH - 1) {
            core.tick();
        }
        assert!(!core.is_complete());
        assert_eq!(core.d_out(0, 0), None);
        core.tick();
        assert!(core.is_complete());
    }

    #[test]
    fn test_cycle_cap_reports_limit() {
        // A cap below the pipeline depth is the deadlock surrogate: the
        // run returns the distinct error carrying the cap, leaves the
        // outputs invalid, and records no completed job.
        let (a, b, c) = zeros();
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        assert_eq!(
            core.run_to_completion(5),
            Err(SimError::CycleLimit { limit: 5 })
        );
        assert!(!core.is_complete());
        assert_eq!(core.d_out(0, 0), None);
        assert_eq!(core.stats.jobs_completed, 0);
        // After a clean reset and reload, a full-length run completes.
        core.reset();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        assert_eq!(core.run_to_completion(DEFAULT_MAX_CYCLES), Ok(PIPELINE_DEPTH));
    }

    #[test]
    fn test_load_rejects_bad_precisions() {
        let (a, b, c) = zeros();
        let mut core = TensorCore::new();
        assert!(matches!(
            core.load_inputs(&a, &b, &c, Precision::Fp32, Precision::Fp16, Rne),
            Err(LoadError::UnsupportedInput(_))
        ));
        assert!(matches!(
            core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp4E2M1, Rne),
            Err(LoadError::UnsupportedOutput(_))
        ));
    }

    #[test]
    fn test_identity_matmul_returns_b() {
        // A = I, C = 0: row 0 of D equals the FP16 test vector.
        let vals = [1.0, -1.0, 0.5, -0.5, 2.0, -2.0, 0.25, 3.5];
        let mut a = [[0u16; 8]; 8];
        let mut b = [[0u16; 8]; 8];
        let c = [[0u32; 8]; 8];
        for i in 0..8 {
            a[i][i] = fp16_to_fp9(f64_to_fp16(1.0));
            for j in 0..8 {
                b[i][j] = fp16_to_fp9(f64_to_fp16(vals[i]));
            }
        }
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
        for j in 0..8 {
            for i in 0..8 {
                assert_eq!(
                    fp16_to_f64(core.d_out(i, j).unwrap() as u16),
                    vals[i],
                    "d[{}][{}]",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_pipeline_matches_model_on_random_jobs() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        let mut core = TensorCore::new();
        for prec in Precision::INPUTS {
            for rm in RoundingMode::ALL {
                let mut a_raw = [[0u32; 8]; 8];
                let mut b_raw = [[0u32; 8]; 8];
                let mut a = [[0u16; 8]; 8];
                let mut b = [[0u16; 8]; 8];
                let mut c = [[0u32; 8]; 8];
                for i in 0..8 {
                    for j in 0..8 {
                        a_raw[i][j] = rng.gen::<u32>() & ((1 << prec.bits()) - 1);
                        b_raw[i][j] = rng.gen::<u32>() & ((1 << prec.bits()) - 1);
                        a[i][j] = convert_to_fp9(a_raw[i][j], prec);
                        b[i][j] = convert_to_fp9(b_raw[i][j], prec);
                        c[i][j] = convert_c_to_fp22(rng.gen::<u32>() & ((1 << prec.bits()) - 1), prec);
                    }
                }
                let want = model::matmul_fp22(&a, &b, &c, rm);
                core.reset();
                core.load_inputs(&a, &b, &c, prec, Precision::Fp16, rm).unwrap();
                let cycles = core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
                assert_eq!(cycles, PIPELINE_DEPTH);
                for i in 0..8 {
                    for j in 0..8 {
                        assert!(
                            model::fp22_matches(core.d_fp22(i, j), want[i][j]),
                            "{:?}/{:?} d[{}][{}]: pipe {:#08x} model {:#08x}",
                            prec,
                            rm,
                            i,
                            j,
                            core.d_fp22(i, j),
                            want[i][j]
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_determinism() {
        let vals = [[1.5f64; 8]; 8];
        let a = fp16_matrix_to_fp9(&vals);
        let b = fp16_matrix_to_fp9(&vals);
        let c = [[0u32; 8]; 8];
        let mut first: Option<([[u32; 8]; 8], u32)> = None;
        for _ in 0..3 {
            let mut core = TensorCore::new();
            core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp32, Rne).unwrap();
            let cycles = core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
            let snapshot = (*core.d_fp22_matrix(), cycles);
            match &first {
                None => first = Some(snapshot),
                Some(f) => assert_eq!(*f, snapshot),
            }
        }
    }

    #[test]
    fn test_nan_absorption() {
        let (mut a, b, c) = zeros();
        a[2][5] = 0x0FC; // NaN in A row 2
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
        for j in 0..8 {
            let bits = core.d_out(2, j).unwrap() as u16;
            assert_eq!(bits & 0x7C00, 0x7C00);
            assert_ne!(bits & 0x3FF, 0, "d[2][{}] must be NaN", j);
        }
        // Other rows are unaffected.
        assert_eq!(core.d_out(0, 0), Some(0));
    }

    #[test]
    fn test_signed_zero_under_rdn() {
        // Products (+1 * +1) and (-1 * +1) cancel in the tree; under RDN
        // the result is -0 all the way through the FP22 accumulator and
        // the FP16 output.
        let mut a = [[0u16; 8]; 8];
        let mut b = [[0u16; 8]; 8];
        let c = [[0u32; 8]; 8];
        a[0][0] = fp16_to_fp9(f64_to_fp16(1.0));
        a[0][1] = fp16_to_fp9(f64_to_fp16(-1.0));
        b[0][0] = fp16_to_fp9(f64_to_fp16(1.0));
        b[1][0] = fp16_to_fp9(f64_to_fp16(1.0));
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rdn).unwrap();
        core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
        assert_eq!(core.d_fp22(0, 0), 1 << 21, "-0 in the accumulator");
        assert_eq!(core.d_out(0, 0), Some(0x8000), "-0 in FP16");
        // Under RNE the same job yields +0.
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
        assert_eq!(core.d_fp22(0, 0), 0);
        assert_eq!(core.d_out(0, 0), Some(0x0000));
    }

    #[test]
    fn test_e4m3_saturation() {
        // A = B = all 8.0: every element of D is 512, far above the E4M3
        // maximum of 240; all 64 outputs saturate, none read as infinity.
        let vals = [[8.0f64; 8]; 8];
        let a = fp16_matrix_to_fp9(&vals);
        let b = fp16_matrix_to_fp9(&vals);
        let c = [[0u32; 8]; 8];
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp8E4M3, Rne).unwrap();
        core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
        for i in 0..8 {
            for j in 0..8 {
                assert_eq!(fp22_to_f64(core.d_fp22(i, j)), 512.0);
                assert_eq!(core.d_out(i, j), Some(0x77), "max finite, positive");
            }
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let (a, b, c) = zeros();
        let mut core = TensorCore::new();
        core.load_inputs(&a, &b, &c, Precision::Fp16, Precision::Fp16, Rne).unwrap();
        core.run_to_completion(DEFAULT_MAX_CYCLES).unwrap();
        assert_eq!(core.stats.jobs_completed, 1);
        core.reset();
        assert!(!core.is_complete());
        assert_eq!(core.d_out(0, 0), None);
        assert_eq!(core.stats.jobs_completed, 0);
    }
}
