//! Slot storage for the reference engine
//!
//! Handles are slot indices plus one, so `0` is never issued. Freed slots go
//! on a free list and their numbers are handed out again by later
//! allocations.

use crate::error::{EngineError, Result};
use crate::eval::{self, literal};
use crate::kernels::{Dense, DenseRef};
use crate::types::{Handle, Representation, Shape};
use std::sync::Arc;

/// Physical form of a stored value
#[derive(Debug, Clone)]
pub enum Storage {
    /// Contiguous buffer, shared copy-on-write with outstanding views
    Dense(Arc<Vec<f64>>),
    /// Literal expression text, evaluated when read
    Expr(String),
}

impl Storage {
    pub fn representation(&self) -> Representation {
        match self {
            Storage::Dense(_) => Representation::Fast,
            Storage::Expr(_) => Representation::Slow,
        }
    }

    /// Store `data` in the requested representation
    pub fn encode(shape: Shape, data: Vec<f64>, representation: Representation) -> Self {
        match representation {
            Representation::Fast => Storage::Dense(Arc::new(data)),
            Representation::Slow => Storage::Expr(literal::format(DenseRef::new(shape, &data))),
        }
    }
}

/// One stored value
#[derive(Debug, Clone)]
pub struct Slot {
    pub shape: Shape,
    pub storage: Storage,
}

impl Slot {
    /// Materialize the physical contents
    pub fn decode(&self) -> Result<Dense> {
        match &self.storage {
            Storage::Dense(data) => Dense::new(self.shape, data.to_vec()),
            Storage::Expr(text) => {
                // stored literals never reference other handles
                let detached = |handle: Handle| -> Result<Dense> { Err(EngineError::InvalidHandle(handle)) };
                let value = eval::evaluate(text, &detached)?;
                literal::conform(value, self.shape)
            }
        }
    }
}

/// Handle-indexed slot table
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    live: usize,
    limit: Option<usize>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that refuses to hold more than `limit` live values
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, slot: Slot) -> Result<Handle> {
        if self.limit.is_some_and(|limit| self.live >= limit) {
            return Err(EngineError::AllocationFailed(format!(
                "slot limit of {} live values reached",
                self.live
            )));
        }

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                if self.slots.len() >= u32::MAX as usize {
                    return Err(EngineError::AllocationFailed("handle space exhausted".to_string()));
                }
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };

        self.live += 1;
        // index < u32::MAX was checked when the slot was first pushed
        Ok(Handle::new(index as u32 + 1))
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Slot> {
        let index = Self::index(handle)?;
        let slot = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        self.live -= 1;
        Some(slot)
    }

    pub fn get(&self, handle: Handle) -> Result<&Slot> {
        Self::index(handle)
            .and_then(|index| self.slots.get(index))
            .and_then(Option::as_ref)
            .ok_or(EngineError::InvalidHandle(handle))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Slot> {
        Self::index(handle)
            .and_then(|index| self.slots.get_mut(index))
            .and_then(Option::as_mut)
            .ok_or(EngineError::InvalidHandle(handle))
    }

    pub fn live(&self) -> usize {
        self.live
    }

    fn index(handle: Handle) -> Option<usize> {
        (handle.id() as usize).checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: usize) -> Slot {
        Slot {
            shape: Shape::Vector(n),
            storage: Storage::encode(Shape::Vector(n), vec![0.0; n], Representation::Fast),
        }
    }

    #[test]
    fn test_handles_start_at_one_and_are_reused() {
        let mut table = SlotTable::new();
        let a = table.insert(slot(1)).unwrap();
        let b = table.insert(slot(2)).unwrap();
        assert_eq!(a, Handle::new(1));
        assert_eq!(b, Handle::new(2));

        assert!(table.remove(a).is_some());
        assert!(table.remove(a).is_none());
        assert_eq!(table.insert(slot(3)).unwrap(), a);
        assert_eq!(table.live(), 2);
    }

    #[test]
    fn test_zero_handle_is_invalid() {
        let table = SlotTable::new();
        assert_eq!(table.get(Handle::new(0)).unwrap_err(), EngineError::InvalidHandle(Handle::new(0)));
    }

    #[test]
    fn test_limit() {
        let mut table = SlotTable::with_limit(1);
        table.insert(slot(1)).unwrap();
        assert!(matches!(table.insert(slot(1)), Err(EngineError::AllocationFailed(_))));
    }

    #[test]
    fn test_slow_storage_decodes() {
        let shape = Shape::Matrix { rows: 2, cols: 2 };
        let stored = Slot {
            shape,
            storage: Storage::encode(shape, vec![1.0, -2.0, f64::INFINITY, 0.1], Representation::Slow),
        };
        let value = stored.decode().unwrap();
        assert_eq!(value.shape, shape);
        assert_eq!(value.data, vec![1.0, -2.0, f64::INFINITY, 0.1]);
    }
}
