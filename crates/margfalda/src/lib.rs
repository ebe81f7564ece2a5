//! Cache-resident multithreaded CPU matrix multiplication for the
//! transposed-weight layout `C = Aᵀ · B` used in transformer inference.
//!
//! The crate exposes a single entry point, [`matmul`], which services a
//! request only when a handwritten register-tiled kernel exists for the
//! given dtype pair and the instruction set the crate was compiled for.
//! When it returns `false` the caller must fall back to its own generic
//! matmul; no partial output is ever written.
//!
//! Instruction-set selection is a compile-time choice (`-C target-feature`
//! / `-C target-cpu`). There is no runtime CPU probing.

pub mod kernels;
pub mod ops;

mod dtype;
mod params;

pub use dtype::DType;
pub use kernels::q_common::{BlockIq4Nl, BlockQ4_0, BlockQ5_0, BlockQ8_0, IQ4NL_QUANTS, QK};
pub use ops::matmul::matmul;
pub use params::{MatmulParams, Threadpool};
