//! Scoped ownership of values
//!
//! A [`Session`] tracks every value it creates, and every value derived from
//! those, through weak references. Teardown disposes whatever is still live.
//! Teardown runs on [`Session::teardown`], at the end of [`Session::run`]
//! (including when the work errors or panics), and when the session drops.
//!
//! ```rust
//! use tether_core::{Runtime, RuntimeConfig};
//!
//! # fn main() -> tether_core::Result<()> {
//! let runtime = Runtime::new(RuntimeConfig::default());
//! let session = runtime.session();
//!
//! let total = session.run(|s| -> tether_core::Result<f64> {
//!     let a = s.vector(&[1.0, 2.0, 3.0])?;
//!     let b = s.vector(&[4.0, 5.0, 6.0])?;
//!     a.dot(&b)?.get(0)
//! })?;
//!
//! assert_eq!(total, 32.0);
//! assert_eq!(session.active_count(), 0);
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tether_engine::{Complex64, Kernel, Operand, Shape};
use tether_tracing::perf_span;

use crate::error::{Error, Result};
use crate::handle_table::{Liveness, ReleaseKind};
use crate::runtime::{Registered, Runtime};
use crate::value::Value;

/// Weak registry of values owned by one session
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    tracked: Mutex<Vec<Weak<Liveness>>>,
}

impl Tracker {
    pub(crate) fn track(&self, state: &Arc<Liveness>) {
        let mut tracked = self.tracked.lock();
        // drop cells of values that are already gone
        if tracked.len() >= 64 && tracked.len().is_power_of_two() {
            tracked.retain(|cell| cell.upgrade().is_some_and(|state| !state.is_disposed()));
        }
        tracked.push(Arc::downgrade(state));
    }

    fn untrack(&self, state: &Arc<Liveness>) -> bool {
        let mut tracked = self.tracked.lock();
        let before = tracked.len();
        tracked.retain(|cell| cell.as_ptr() != Arc::as_ptr(state));
        tracked.len() != before
    }

    fn drain(&self) -> Vec<Arc<Liveness>> {
        std::mem::take(&mut *self.tracked.lock())
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn active_count(&self) -> usize {
        self.tracked
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|state| !state.is_disposed())
            .count()
    }
}

/// Scope that owns the values created through it
pub struct Session {
    runtime: Runtime,
    tracker: Arc<Tracker>,
}

impl Session {
    pub fn new(runtime: Runtime) -> Self {
        tracing::debug!("session_opened");
        Self {
            runtime,
            tracker: Arc::new(Tracker::default()),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    // ============================================================================================
    // Factories
    // ============================================================================================

    pub fn vector(&self, data: &[f64]) -> Result<Value> {
        self.create(Shape::Vector(data.len()), data)
    }

    /// Row-major matrix; `data.len()` must equal `rows * cols`
    pub fn matrix(&self, rows: usize, cols: usize, data: &[f64]) -> Result<Value> {
        self.create(Shape::Matrix { rows, cols }, data)
    }

    pub fn scalar(&self, value: f64) -> Result<Value> {
        self.create(Shape::Scalar, &[value])
    }

    /// Complex scalar, stored as `Complex(1)`
    pub fn complex(&self, re: f64, im: f64) -> Result<Value> {
        self.create(Shape::Complex(1), &[re, im])
    }

    pub fn complex_vector(&self, values: &[Complex64]) -> Result<Value> {
        let interleaved: Vec<f64> = values.iter().flat_map(|z| [z.re, z.im]).collect();
        self.create(Shape::Complex(values.len()), &interleaved)
    }

    /// `n` evenly spaced samples from `start` to `end` inclusive
    pub fn linspace(&self, start: f64, end: f64, n: usize) -> Result<Value> {
        if n == 0 {
            return Err(Error::InvalidArgument("linspace needs at least one sample".to_string()));
        }
        let operands = [Operand::Scalar(start), Operand::Scalar(end), Operand::Scalar(n as f64)];
        let registered = self.runtime.invoke(Kernel::Linspace, &operands)?;
        Ok(self.adopt(registered))
    }

    /// Evaluate expression text; live values are referenced as `$N`
    pub fn eval(&self, expression: &str) -> Result<Value> {
        let registered = self.runtime.eval(expression)?;
        Ok(self.adopt(registered))
    }

    /// Make `value` visible to [`Session::eval`] under `name`
    ///
    /// The name holds the contents `value` has now; later writes or disposal
    /// do not change it. Bindings live in the runtime's evaluator until
    /// [`Runtime::reset_bindings`].
    pub fn bind(&self, name: &str, value: &Value) -> Result<()> {
        if !self.runtime.same_as(value.runtime()) {
            return Err(Error::ForeignValue(value.handle()));
        }
        let handle = value.ensure_live()?;
        value.guard(self.runtime.bind(name, handle))
    }

    /// Vector from raw native-endian `f64` bytes
    pub fn vector_from_bytes(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.len() % std::mem::size_of::<f64>() != 0 {
            return Err(Error::InvalidArgument(format!(
                "{} bytes is not a whole number of f64 values",
                bytes.len()
            )));
        }
        // copy through an aligned buffer; `bytes` may start anywhere
        let mut data = vec![0.0f64; bytes.len() / std::mem::size_of::<f64>()];
        bytemuck::cast_slice_mut::<f64, u8>(&mut data).copy_from_slice(bytes);
        self.vector(&data)
    }

    fn create(&self, shape: Shape, data: &[f64]) -> Result<Value> {
        let registered = self.runtime.create(shape, data)?;
        Ok(self.adopt(registered))
    }

    fn adopt(&self, registered: Registered) -> Value {
        self.tracker.track(&registered.state);
        Value::from_registered(self.runtime.clone(), registered, Some(Arc::downgrade(&self.tracker)))
    }

    // ============================================================================================
    // Lifetime
    // ============================================================================================

    /// Run `work`, then dispose every tracked value however `work` exits
    ///
    /// Values that must outlive the call have to be [`Session::detach`]ed.
    pub fn run<R>(&self, work: impl FnOnce(&Session) -> R) -> R {
        struct TeardownOnExit<'a>(&'a Session);

        impl Drop for TeardownOnExit<'_> {
            fn drop(&mut self) {
                self.0.teardown();
            }
        }

        let _teardown = TeardownOnExit(self);
        work(self)
    }

    /// Tracked values not yet disposed
    pub fn active_count(&self) -> usize {
        self.tracker.active_count()
    }

    /// Stop tracking `value` so it survives teardown
    ///
    /// Values derived from it afterwards are not tracked either. Returns
    /// false if the value was not tracked by this session.
    pub fn detach(&self, value: &Value) -> bool {
        let detached = self.tracker.untrack(value.state()) && value.detach_from(&self.tracker);
        if detached {
            tracing::debug!(handle = %value.handle(), "value detached from session");
        }
        detached
    }

    /// Dispose every tracked value; returns how many were disposed
    pub fn teardown(&self) -> usize {
        let span = perf_span!("session_teardown");
        let tracked = self.tracker.drain();

        let mut disposed = 0;
        for state in &tracked {
            if state.mark_disposed() {
                self.runtime.release(state.handle(), ReleaseKind::Explicit);
                disposed += 1;
            }
        }

        if self.runtime.config().leak_detection {
            self.check_released(&tracked);
        }

        tracing::debug!(tracked = tracked.len(), disposed, duration_us = span.elapsed_us(), "session_teardown");
        disposed
    }

    fn check_released(&self, tracked: &[Arc<Liveness>]) {
        let escaped: Vec<_> = tracked
            .iter()
            .filter(|state| self.runtime.is_owned_by(state))
            .map(|state| state.handle())
            .collect();

        if !escaped.is_empty() {
            tracing::error!(handles = ?escaped, "session teardown left handles live");
            debug_assert!(escaped.is_empty(), "session teardown left handles live: {escaped:?}");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("active", &self.active_count()).finish()
    }
}
