//! In-process reference engine
//!
//! Fast-path values live in shared `f64` buffers and run kernels directly on
//! them. Slow-path values live as literal expression text and are decoded
//! back to their recorded shape before a kernel sees them. Both paths reach
//! the same kernel code with the same shapes, so mixed operations bridge
//! representations transparently.

mod storage;

pub use storage::{Slot, SlotTable, Storage};

use crate::error::{EngineError, Result};
use crate::eval::lexer::{tokenize, Token};
use crate::eval::{self, literal, Evaluator, Scope};
use crate::kernels::{self, Dense, DenseRef, Kernel};
use crate::traits::Engine;
use crate::types::{Handle, Operand, ReprPolicy, Representation, Shape};
use std::sync::Arc;

/// Engine that computes in-process
#[derive(Debug, Default)]
pub struct ReferenceEngine {
    slots: SlotTable,
    globals: Scope,
}

/// Operand resolved against the slot table
enum Resolved {
    Buffer(Shape, Arc<Vec<f64>>),
    Materialized(Dense),
}

impl Resolved {
    fn borrowed(&self) -> DenseRef<'_> {
        match self {
            Resolved::Buffer(shape, data) => DenseRef::new(*shape, data),
            Resolved::Materialized(dense) => dense.borrowed(),
        }
    }
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that fails allocation once `limit` values are live
    pub fn with_limit(limit: usize) -> Self {
        Self {
            slots: SlotTable::with_limit(limit),
            ..Self::default()
        }
    }

    fn store(&mut self, value: Dense, policy: ReprPolicy) -> Result<Handle> {
        let representation = policy.select(value.shape.element_count());
        let slot = Slot {
            shape: value.shape,
            storage: Storage::encode(value.shape, value.data, representation),
        };
        self.slots.insert(slot)
    }

    fn materialize(&self, handle: Handle) -> Result<Dense> {
        self.slots.get(handle)?.decode()
    }

    fn resolve(&self, operand: &Operand) -> Result<Resolved> {
        match *operand {
            Operand::Scalar(value) => Ok(Resolved::Materialized(Dense::scalar(value))),
            Operand::Handle(handle) => {
                let slot = self.slots.get(handle)?;
                match &slot.storage {
                    Storage::Dense(data) => Ok(Resolved::Buffer(slot.shape, Arc::clone(data))),
                    Storage::Expr(_) => slot.decode().map(Resolved::Materialized),
                }
            }
        }
    }

    fn has_slow_operand(&self, operands: &[Operand]) -> Result<bool> {
        for operand in operands {
            if let Operand::Handle(handle) = operand {
                if self.slots.get(*handle)?.storage.representation() == Representation::Slow {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn check_len(shape: Shape, len: usize) -> Result<()> {
        if shape.physical_len() != len {
            return Err(EngineError::mismatch(shape, format!("{len} values")));
        }
        Ok(())
    }
}

impl Engine for ReferenceEngine {
    fn alloc(&mut self, shape: Shape, representation: Representation) -> Result<Handle> {
        let data = vec![0.0; shape.physical_len()];
        let handle = self.slots.insert(Slot {
            shape,
            storage: Storage::encode(shape, data, representation),
        })?;
        tracing::trace!(handle = %handle, shape = %shape, representation = %representation, "engine alloc");
        Ok(handle)
    }

    fn free(&mut self, handle: Handle) {
        if self.slots.remove(handle).is_some() {
            tracing::trace!(handle = %handle, "engine free");
        }
    }

    fn copy_in(&mut self, handle: Handle, data: &[f64]) -> Result<()> {
        let slot = self.slots.get_mut(handle)?;
        Self::check_len(slot.shape, data.len())?;
        match &mut slot.storage {
            Storage::Dense(buffer) => Arc::make_mut(buffer).copy_from_slice(data),
            Storage::Expr(text) => *text = literal::format(DenseRef::new(slot.shape, data)),
        }
        Ok(())
    }

    fn copy_out(&self, handle: Handle, out: &mut [f64]) -> Result<()> {
        let slot = self.slots.get(handle)?;
        Self::check_len(slot.shape, out.len())?;
        match &slot.storage {
            Storage::Dense(buffer) => out.copy_from_slice(buffer),
            Storage::Expr(_) => out.copy_from_slice(&slot.decode()?.data),
        }
        Ok(())
    }

    fn shape(&self, handle: Handle) -> Result<Shape> {
        Ok(self.slots.get(handle)?.shape)
    }

    fn representation(&self, handle: Handle) -> Result<Representation> {
        Ok(self.slots.get(handle)?.storage.representation())
    }

    fn view(&self, handle: Handle) -> Result<Option<Arc<Vec<f64>>>> {
        Ok(match &self.slots.get(handle)?.storage {
            Storage::Dense(buffer) => Some(Arc::clone(buffer)),
            Storage::Expr(_) => None,
        })
    }

    fn read(&self, handle: Handle, index: usize) -> Result<f64> {
        let slot = self.slots.get(handle)?;
        let len = slot.shape.physical_len();
        if index >= len {
            return Err(EngineError::IndexOutOfBounds { index, len });
        }
        match &slot.storage {
            Storage::Dense(buffer) => Ok(buffer[index]),
            Storage::Expr(_) => Ok(slot.decode()?.data[index]),
        }
    }

    fn write(&mut self, handle: Handle, index: usize, value: f64) -> Result<()> {
        let slot = self.slots.get_mut(handle)?;
        let len = slot.shape.physical_len();
        if index >= len {
            return Err(EngineError::IndexOutOfBounds { index, len });
        }
        // views handed out earlier keep their snapshot
        if let Storage::Dense(buffer) = &mut slot.storage {
            Arc::make_mut(buffer)[index] = value;
            return Ok(());
        }

        let mut data = slot.decode()?.data;
        data[index] = value;
        slot.storage = Storage::Expr(literal::format(DenseRef::new(slot.shape, &data)));
        Ok(())
    }

    fn invoke(&mut self, kernel: Kernel, operands: &[Operand], policy: ReprPolicy) -> Result<Handle> {
        let path = if self.has_slow_operand(operands)? { "slow" } else { "fast" };
        let resolved = operands
            .iter()
            .map(|operand| self.resolve(operand))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<DenseRef<'_>> = resolved.iter().map(Resolved::borrowed).collect();
        tracing::trace!(kernel = %kernel, path, "engine invoke");
        let result = kernels::execute(kernel, &refs)?;

        self.store(result, policy)
    }

    fn eval(&mut self, expression: &str, policy: ReprPolicy) -> Result<Handle> {
        let (outcome, globals) = {
            let resolve = |handle: Handle| self.materialize(handle);
            let mut evaluator = Evaluator::with_globals(&resolve, Arc::clone(&self.globals));
            let outcome = eval::parse_program(expression).and_then(|program| evaluator.run(&program));
            (outcome, evaluator.into_globals())
        };
        self.globals = globals;

        let value = outcome?;
        tracing::trace!(expression, shape = %value.shape, "engine eval");
        self.store(value, policy)
    }

    fn bind(&mut self, name: &str, handle: Handle) -> Result<()> {
        let tokens = tokenize(name)?;
        if !matches!(tokens.as_slice(), [single] if matches!(single.token, Token::Ident(_))) {
            return Err(EngineError::invalid(format!("'{name}' is not a valid variable name")));
        }

        let value = self.materialize(handle)?;
        Arc::make_mut(&mut self.globals).insert(name.to_string(), eval::interpreter::Value::Data(value));
        tracing::trace!(name, handle = %handle, "engine bind");
        Ok(())
    }

    fn reset_bindings(&mut self) {
        let count = self.globals.len();
        self.globals = Scope::default();
        tracing::trace!(count, "engine bindings reset");
    }

    fn live_count(&self) -> usize {
        self.slots.live()
    }

    fn name(&self) -> &'static str {
        "reference"
    }
}
