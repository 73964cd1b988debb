//! Host-side views of a value's physical data

use std::ops::Deref;
use std::sync::Arc;

use crate::pool::PooledBuffer;

/// Read-only data of a value
///
/// Fast-path values share the engine's buffer; the view is a snapshot, so
/// later writes to the value do not show through. Slow-path values are
/// materialized into a pooled buffer that returns to the pool on drop.
#[derive(Debug)]
pub enum DataView {
    Shared(Arc<Vec<f64>>),
    Materialized(PooledBuffer),
}

impl DataView {
    /// True when no copy was made
    pub fn is_zero_copy(&self) -> bool {
        matches!(self, DataView::Shared(_))
    }

    pub fn as_slice(&self) -> &[f64] {
        &**self
    }

    /// Raw native-endian bytes of the data
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}

impl Deref for DataView {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        match self {
            DataView::Shared(shared) => shared.as_slice(),
            DataView::Materialized(buffer) => &**buffer,
        }
    }
}

impl AsRef<[f64]> for DataView {
    fn as_ref(&self) -> &[f64] {
        &**self
    }
}
