//! Handle-owning numeric values
//!
//! A [`Value`] owns exactly one engine handle. It is immutable apart from
//! indexed [`Value::set`]; every operation returns a new value. Disposal is
//! terminal and idempotent, and every operation on a disposed value fails
//! with [`Error::UseAfterDispose`].
//!
//! Values pick their representation at construction from the runtime's
//! threshold. Operations never care which representation their operands use;
//! the engine bridges fast and slow operands.
//!
//! Dropping a value that was never disposed releases its handle and counts
//! it as leaked in [`crate::Diagnostics`].

mod ops;
mod view;

pub use view::DataView;

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tether_engine::{Complex64, Handle, Representation, Shape};

use crate::error::{Error, Result};
use crate::handle_table::{Liveness, ReleaseKind};
use crate::runtime::{Registered, Runtime};
use crate::session::Tracker;

/// A numeric value held by the engine
pub struct Value {
    runtime: Runtime,
    state: Arc<Liveness>,
    shape: Shape,
    representation: Representation,
    tracker: Mutex<Option<Weak<Tracker>>>,
}

impl Value {
    pub(crate) fn from_registered(runtime: Runtime, registered: Registered, tracker: Option<Weak<Tracker>>) -> Self {
        Self {
            runtime,
            state: registered.state,
            shape: registered.shape,
            representation: registered.representation,
            tracker: Mutex::new(tracker),
        }
    }

    pub fn handle(&self) -> Handle {
        self.state.handle()
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Logical element count
    pub fn len(&self) -> usize {
        self.shape.element_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        self.shape.is_complex()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub(crate) fn state(&self) -> &Arc<Liveness> {
        &self.state
    }

    // ============================================================================================
    // Element access
    // ============================================================================================

    /// Real element at `index` (row-major for matrices)
    pub fn get(&self, index: usize) -> Result<f64> {
        self.ensure_live()?;
        self.ensure_real("get")?;
        self.check_index(index)?;
        self.guard(self.runtime.read(self.handle(), index))
    }

    /// Complex element at `index`
    pub fn get_complex(&self, index: usize) -> Result<Complex64> {
        self.ensure_live()?;
        if !self.is_complex() {
            return self.get(index).map(|re| Complex64::new(re, 0.0));
        }
        self.check_index(index)?;
        let re = self.guard(self.runtime.read(self.handle(), 2 * index))?;
        let im = self.guard(self.runtime.read(self.handle(), 2 * index + 1))?;
        Ok(Complex64::new(re, im))
    }

    /// Overwrite the real element at `index`
    ///
    /// Zero-copy views taken earlier keep showing the old data.
    pub fn set(&self, index: usize, value: f64) -> Result<()> {
        self.ensure_live()?;
        self.ensure_real("set")?;
        self.check_index(index)?;
        self.guard(self.runtime.write(self.handle(), index, value))
    }

    /// Overwrite the complex element at `index`
    pub fn set_complex(&self, index: usize, value: Complex64) -> Result<()> {
        self.ensure_live()?;
        if !self.is_complex() {
            return Err(Error::InvalidArgument(format!("set_complex on a {} value", self.shape)));
        }
        self.check_index(index)?;
        self.guard(self.runtime.write(self.handle(), 2 * index, value.re))?;
        self.guard(self.runtime.write(self.handle(), 2 * index + 1, value.im))
    }

    // ============================================================================================
    // Bulk data
    // ============================================================================================

    /// Physical data without copying when the value is on the fast path
    pub fn data_view(&self) -> Result<DataView> {
        self.ensure_live()?;
        self.guard(self.runtime.data_view(self.handle(), self.shape))
    }

    /// Owned copy of the physical data (complex values interleave `re, im`)
    pub fn to_vec(&self) -> Result<Vec<f64>> {
        self.ensure_live()?;
        self.guard(self.runtime.to_vec(self.handle(), self.shape))
    }

    /// Owned copy as complex numbers; real values get zero imaginary parts
    pub fn to_complex_vec(&self) -> Result<Vec<Complex64>> {
        let data = self.to_vec()?;
        Ok(if self.is_complex() {
            data.chunks_exact(2).map(|pair| Complex64::new(pair[0], pair[1])).collect()
        } else {
            data.into_iter().map(|re| Complex64::new(re, 0.0)).collect()
        })
    }

    /// Owned copy as native-endian bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data = self.to_vec()?;
        Ok(bytemuck::cast_slice(&data).to_vec())
    }

    // ============================================================================================
    // Lifetime
    // ============================================================================================

    /// Release the handle. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.state.mark_disposed() {
            self.runtime.release(self.handle(), ReleaseKind::Explicit);
        }
    }

    /// Wrap a result so it belongs to the same session as `self`
    pub(crate) fn derive(&self, registered: Registered) -> Value {
        let tracker = self.tracker.lock().clone();
        if let Some(tracker) = tracker.as_ref().and_then(Weak::upgrade) {
            tracker.track(&registered.state);
        }
        Value::from_registered(self.runtime.clone(), registered, tracker)
    }

    /// Forget the session if it is `tracker`; true when it was
    pub(crate) fn detach_from(&self, tracker: &Arc<Tracker>) -> bool {
        let mut current = self.tracker.lock();
        let owned = current.as_ref().is_some_and(|weak| weak.as_ptr() == Arc::as_ptr(tracker));
        if owned {
            *current = None;
        }
        owned
    }

    pub(crate) fn ensure_live(&self) -> Result<Handle> {
        if self.state.is_disposed() {
            return Err(Error::UseAfterDispose { handle: self.handle() });
        }
        Ok(self.handle())
    }

    /// Check that `other` lives in the same runtime and is not disposed
    pub(crate) fn ensure_compatible(&self, other: &Value) -> Result<Handle> {
        if !self.runtime.same_as(&other.runtime) {
            return Err(Error::ForeignValue(other.handle()));
        }
        other.ensure_live()
    }

    /// Report a failure on a value disposed mid-call as use after dispose
    pub(crate) fn guard<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(_) if self.state.is_disposed() => Err(Error::UseAfterDispose { handle: self.handle() }),
            other => other,
        }
    }

    fn ensure_real(&self, operation: &str) -> Result<()> {
        if self.is_complex() {
            return Err(Error::InvalidArgument(format!(
                "{operation} on a complex value; use the complex accessor"
            )));
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(Error::IndexOutOfBounds { index, len: self.len() });
        }
        Ok(())
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        if self.state.mark_disposed() {
            self.runtime.release(self.handle(), ReleaseKind::Reclaimed);
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("handle", &self.handle())
            .field("shape", &self.shape)
            .field("representation", &self.representation)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::default())
    }

    #[test]
    fn test_get_set_bounds() {
        let session = runtime().session();
        let v = session.vector(&[1.0, 2.0, 3.0]).unwrap();
        v.set(1, 20.0).unwrap();
        assert_eq!(v.get(1).unwrap(), 20.0);
        assert_eq!(v.get(3).unwrap_err(), Error::IndexOutOfBounds { index: 3, len: 3 });
        assert_eq!(v.set(9, 0.0).unwrap_err(), Error::IndexOutOfBounds { index: 9, len: 3 });
    }

    #[test]
    fn test_complex_access() {
        let session = runtime().session();
        let z = session
            .complex_vector(&[Complex64::new(1.0, 2.0), Complex64::new(-3.0, 0.5)])
            .unwrap();
        assert_eq!(z.len(), 2);
        assert_eq!(z.get_complex(1).unwrap(), Complex64::new(-3.0, 0.5));
        z.set_complex(0, Complex64::new(0.0, -1.0)).unwrap();
        assert_eq!(z.to_vec().unwrap(), vec![0.0, -1.0, -3.0, 0.5]);
        assert!(matches!(z.get(0), Err(Error::InvalidArgument(_))));
        assert_eq!(z.get_complex(2).unwrap_err(), Error::IndexOutOfBounds { index: 2, len: 2 });

        let real = session.scalar(4.0).unwrap();
        assert_eq!(real.get_complex(0).unwrap(), Complex64::new(4.0, 0.0));
    }

    #[test]
    fn test_use_after_dispose() {
        let session = runtime().session();
        let v = session.vector(&[1.0]).unwrap();
        let handle = v.handle();
        v.dispose();
        v.dispose();
        assert_eq!(v.get(0).unwrap_err(), Error::UseAfterDispose { handle });
        assert_eq!(v.to_vec().unwrap_err(), Error::UseAfterDispose { handle });
        assert!(matches!(v.data_view(), Err(Error::UseAfterDispose { .. })));
    }

    #[test]
    fn test_drop_counts_as_leak() {
        let runtime = runtime();
        let session = runtime.session();
        {
            let _forgotten = session.vector(&[1.0, 2.0]).unwrap();
        }
        let explicit = session.scalar(1.0).unwrap();
        explicit.dispose();
        drop(explicit);

        let d = runtime.diagnostics();
        assert_eq!(d.active, 0);
        assert_eq!(d.leaked, 1);
        assert_eq!(d.freed, 2);
    }

    #[test]
    fn test_to_bytes_matches_data() {
        let session = runtime().session();
        let v = session.vector(&[0.5, -1.0]).unwrap();
        let bytes = v.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        let mut first = [0u8; 8];
        first.copy_from_slice(&bytes[..8]);
        assert_eq!(f64::from_ne_bytes(first), 0.5);
    }

    #[test]
    fn test_foreign_value_rejected() {
        let left = runtime().session();
        let right = runtime().session();
        let a = left.vector(&[1.0]).unwrap();
        let b = right.vector(&[1.0]).unwrap();
        assert_eq!(a.add(&b).unwrap_err(), Error::ForeignValue(b.handle()));
    }
}
