//! tensorcore-emu library
//!
//! Cycle-accurate, bit-exact emulation of an 8x8x8 matrix
//! multiply-accumulate tensor core (`D = A * B + C`) with low-precision
//! floating-point operands.
//!
//! # Module Organization
//!
//! - [`fp`]: packed floating-point formats, conversions, f64 bridges
//! - [`arith`]: parameterized bit-accurate multiplier and dual-path adder
//! - [`pipe`]: the 64-unit elastic pipeline and its driver surface
//! - [`model`]: single-pass combinational model, the verification oracle
//! - [`config`]: run configuration (TOML file + CLI layering)
//! - [`testing`]: harness pieces — stimulus generation, golden models,
//!   end-to-end scenarios
//!
//! # Driving the core
//!
//! ```ignore
//! let mut core = TensorCore::new();
//! core.load_inputs(&a_fp9, &b_fp9, &c_fp22, in_prec, out_prec, rm)?;
//! let cycles = core.run_to_completion(DEFAULT_MAX_CYCLES)?;
//! let d00 = core.d_out(0, 0).unwrap();
//! ```

pub mod arith;
pub mod config;
pub mod fp;
pub mod model;
pub mod pipe;
pub mod testing;

pub use fp::{FpClass, FpFormat, Precision, RoundingMode};
pub use pipe::{LoadError, SimError, TensorCore, DEFAULT_MAX_CYCLES, PIPELINE_DEPTH};
