//! # tether-core - handle-owned numeric values
//!
//! Numeric values (vectors, matrices, scalars, complex numbers) live inside
//! an opaque engine and are known to Rust code only by integer handles. This
//! crate gives those handles safe, leak-free lifetimes and picks, per value,
//! between two physical representations.
//!
//! ## Architecture
//!
//! ```text
//! Session ──factories──► Runtime ──alloc/copy_in/invoke/eval──► dyn Engine
//!    │                     │
//!    │ weak tracking       ├── HandleTable  (live handles, leak counters)
//!    ▼                     └── BufferPool   (host scratch buffers)
//!  Value ──ops──► Runtime ──► new Value (tracked by the same Session)
//! ```
//!
//! - **Fast path**: values with at least `fast_path_threshold` elements sit in
//!   contiguous `f64` buffers; [`Value::data_view`] shares them without copying
//! - **Slow path**: smaller values are held as expression text and evaluated
//!   on demand; views materialize into pooled buffers
//!
//! ## Lifetimes
//!
//! A value is released by [`Value::dispose`], by [`Session`] teardown, or by
//! `Drop`. Drop-time releases of undisposed values are counted as leaks in
//! [`Diagnostics`]. Operations on released values fail with
//! [`Error::UseAfterDispose`].
//!
//! ## Example
//!
//! ```rust
//! use tether_core::{Runtime, RuntimeConfig};
//!
//! # fn main() -> tether_core::Result<()> {
//! let runtime = Runtime::new(RuntimeConfig::default());
//! let session = runtime.session();
//!
//! let t = session.linspace(0.0, 1.0, 16)?;
//! let spectrum = t.scale(std::f64::consts::TAU)?.sin()?.fft_mag()?;
//! assert_eq!(spectrum.len(), 16);
//!
//! session.teardown();
//! assert_eq!(runtime.diagnostics().active, 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handle_table;
pub mod pool;
pub mod runtime;
pub mod session;
pub mod value;

pub use config::{PoolConfig, RuntimeConfig};
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};
pub use handle_table::{HandleStats, HandleTable};
pub use pool::{BufferPool, PoolStats, PooledBuffer, SizeCategory};
pub use runtime::Runtime;
pub use session::Session;
pub use value::{DataView, Value};

pub use tether_engine::{Complex64, Engine, Handle, ReferenceEngine, Representation, Shape};
