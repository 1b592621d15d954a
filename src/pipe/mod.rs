//! The cycle-accurate pipeline.
//!
//! - [`stage`]: the two-deep skid-buffer register every stage is built from
//! - [`dot_product`]: one 11-stage dot-product unit
//! - [`tensor_core`]: the 64-unit top with the driver surface
//!
//! Cycle accuracy rests on one invariant: within a tick, stages update in
//! reverse dataflow order, so stage N consumes what stage N+1 produced in
//! the *previous* tick. There is no real concurrency anywhere; `tick()` is
//! a plain single-threaded clock edge and results are deterministic across
//! runs and hosts.

pub mod dot_product;
pub mod stage;
pub mod tensor_core;

pub use dot_product::{DotProductUnit, TREE_PAIRS};
pub use stage::PipeStage2;
pub use tensor_core::{LoadError, SimError, TensorCore, DEFAULT_MAX_CYCLES, PIPELINE_DEPTH};
