//! Engine trait: the binding between handle-owning callers and a numeric engine
//!
//! An engine stores values and runs numeric kernels on them. Callers only
//! ever see [`Handle`]s; everything else crosses the boundary by copy, except
//! [`Engine::view`], which shares a fast-path buffer without copying.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Engine Trait                    │
//! │  - alloc / free / copy_in / copy_out             │
//! │  - shape / representation / view / read / write  │
//! │  - invoke (kernels) / eval (text) / bind         │
//! └────────────────────────┬────────────────────────┘
//!                          │
//!             ┌────────────┴────────────┐
//!             ▼                         ▼
//!      ┌────────────┐           ┌──────────────┐
//!      │ Reference  │           │   External   │
//!      │  Engine    │           │   engines    │
//!      └────────────┘           └──────────────┘
//! ```

use crate::error::Result;
use crate::kernels::Kernel;
use crate::types::{Handle, Operand, ReprPolicy, Representation, Shape};
use std::sync::Arc;

/// Numeric engine driven through opaque handles
///
/// Engines are single-threaded cooperative: callers serialize access (the
/// trait takes `&mut self` for anything that mutates engine state). Results
/// of `invoke` and `eval` are new handles; operands are never modified.
///
/// # Example
///
/// ```rust
/// use tether_engine::{Engine, Kernel, Operand, ReferenceEngine, ReprPolicy, Representation, Shape};
///
/// # fn main() -> tether_engine::Result<()> {
/// let mut engine = ReferenceEngine::new();
/// let a = engine.alloc(Shape::Vector(3), Representation::Slow)?;
/// engine.copy_in(a, &[1.0, 2.0, 3.0])?;
///
/// let doubled = engine.invoke(Kernel::Scale, &[Operand::Handle(a), Operand::Scalar(2.0)], ReprPolicy::default())?;
/// let mut out = [0.0; 3];
/// engine.copy_out(doubled, &mut out)?;
/// assert_eq!(out, [2.0, 4.0, 6.0]);
///
/// engine.free(a);
/// engine.free(doubled);
/// # Ok(())
/// # }
/// ```
pub trait Engine: Send {
    // ============================================================================================
    // Storage
    // ============================================================================================

    /// Allocate a zero-filled value of the given shape
    ///
    /// # Errors
    ///
    /// `AllocationFailed` when the engine cannot issue another handle.
    fn alloc(&mut self, shape: Shape, representation: Representation) -> Result<Handle>;

    /// Release a value. Freeing an unknown or already freed handle is a no-op.
    fn free(&mut self, handle: Handle);

    /// Overwrite a value's physical contents (`data.len()` must equal the physical length)
    fn copy_in(&mut self, handle: Handle, data: &[f64]) -> Result<()>;

    /// Copy a value's physical contents out (`out.len()` must equal the physical length)
    fn copy_out(&self, handle: Handle, out: &mut [f64]) -> Result<()>;

    /// Logical shape of a value
    fn shape(&self, handle: Handle) -> Result<Shape>;

    /// Physical representation of a value
    fn representation(&self, handle: Handle) -> Result<Representation>;

    /// Shared view of a fast-path buffer; `None` for slow-path values
    fn view(&self, handle: Handle) -> Result<Option<Arc<Vec<f64>>>>;

    /// Read one physical slot
    fn read(&self, handle: Handle, index: usize) -> Result<f64>;

    /// Write one physical slot
    fn write(&mut self, handle: Handle, index: usize, value: f64) -> Result<()>;

    // ============================================================================================
    // Computation
    // ============================================================================================

    /// Run a named kernel; the result's representation is picked by `policy`
    fn invoke(&mut self, kernel: Kernel, operands: &[Operand], policy: ReprPolicy) -> Result<Handle>;

    /// Evaluate program text (which may reference live values as `$N`)
    ///
    /// `let` statements and [`Engine::bind`] share one environment that
    /// persists across calls until [`Engine::reset_bindings`].
    fn eval(&mut self, expression: &str, policy: ReprPolicy) -> Result<Handle>;

    /// Bind `name` to a copy of a live value's current contents
    fn bind(&mut self, name: &str, handle: Handle) -> Result<()>;

    /// Forget every binding made by `bind` or `let`
    fn reset_bindings(&mut self);

    // ============================================================================================
    // Introspection
    // ============================================================================================

    /// Number of values currently held
    fn live_count(&self) -> usize;

    /// Engine name for logs
    fn name(&self) -> &'static str;
}
