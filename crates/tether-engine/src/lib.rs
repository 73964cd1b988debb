//! Engine binding for handle-owned numeric values
//!
//! This crate provides:
//! - **Engine Trait**: the contract between handle-owning callers and an opaque engine
//! - **Kernels**: elementwise, spectral and linear algebra primitives keyed by name
//! - **Expression language**: the slow-path representation and `eval` entry point
//! - **Reference Engine**: an in-process implementation of the contract
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                caller (handle table, values)             │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │  Handle / Shape / Operand
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Engine trait                        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!          ┌────────────┴─────────────┐
//!          ▼                          ▼
//!   ┌──────────────┐          ┌───────────────┐
//!   │  fast path   │          │   slow path   │
//!   │ f64 buffers  │          │ literal text  │
//!   └──────┬───────┘          └──────┬────────┘
//!          │                         │ eval
//!          └────────────┬────────────┘
//!                       ▼
//!                  kernels::execute
//! ```
//!
//! # Usage
//!
//! ```rust
//! use tether_engine::{Engine, ReferenceEngine, ReprPolicy, Representation, Shape};
//!
//! # fn main() -> tether_engine::Result<()> {
//! let mut engine = ReferenceEngine::new();
//! let signal = engine.eval("[1, 0, -1, 0, 1, 0, -1, 0]", ReprPolicy::default())?;
//! assert_eq!(engine.representation(signal)?, Representation::Fast);
//!
//! let spectrum = engine.eval(&format!("fft_mag({signal})"), ReprPolicy::default())?;
//! assert_eq!(engine.shape(spectrum)?, Shape::Vector(8));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod eval;
pub mod kernels;
pub mod reference;
pub mod traits;
pub mod types;

pub use error::{EngineError, Result};
pub use kernels::{BinaryOp, Dense, DenseRef, Kernel, UnaryOp};
pub use reference::ReferenceEngine;
pub use traits::Engine;
pub use types::{Handle, Operand, ReprPolicy, Representation, Shape};

/// Complex scalar type used by complex-valued kernels
pub use rustfft::num_complex::Complex64;
