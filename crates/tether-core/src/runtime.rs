//! Runtime context: engine, handle table and buffer pool behind one owner
//!
//! A [`Runtime`] is cheap to clone (an `Arc` inside). Independent runtimes can
//! coexist in one process; [`Runtime::global`] offers a process-wide default.
//!
//! ## Locking
//!
//! The engine and the handle table sit behind separate `parking_lot` mutexes
//! and are never held at the same time. The pool mutex is a leaf: it may be
//! taken while the engine is locked, never the other way round.
//!
//! ## Ordering
//!
//! Registration happens after the engine issues a handle; release removes the
//! table entry before the engine frees storage. A freed number can therefore
//! only be reissued once nothing in the table refers to it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tether_engine::{Engine, Handle, Kernel, Operand, ReferenceEngine, ReprPolicy, Representation, Shape};
use tether_tracing::{perf_span, timed_block};
use tether_tracing::performance::{record_throughput, record_transfer, Transfer};

use crate::config::RuntimeConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::handle_table::{HandleTable, Liveness, ReleaseKind};
use crate::pool::BufferPool;
use crate::session::Session;
use crate::value::DataView;

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

/// Owner of one engine and all bookkeeping for the values it holds
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    engine: Mutex<Box<dyn Engine>>,
    table: Mutex<HandleTable>,
    pool: Arc<Mutex<BufferPool>>,
    config: RuntimeConfig,
    fast_created: AtomicU64,
    slow_created: AtomicU64,
}

/// A handle freshly recorded in the table
pub(crate) struct Registered {
    pub shape: Shape,
    pub representation: Representation,
    pub state: Arc<Liveness>,
}

impl Runtime {
    /// Runtime over the in-process reference engine
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_engine(ReferenceEngine::new(), config)
    }

    /// Runtime over any engine
    #[tracing::instrument(skip_all, fields(engine = engine.name()))]
    pub fn with_engine(engine: impl Engine + 'static, config: RuntimeConfig) -> Self {
        tracing::debug!(
            fast_path_threshold = config.fast_path_threshold,
            leak_detection = config.leak_detection,
            "runtime_created"
        );
        Self {
            inner: Arc::new(RuntimeInner {
                engine: Mutex::new(Box::new(engine)),
                table: Mutex::new(HandleTable::new()),
                pool: Arc::new(Mutex::new(BufferPool::new(config.pool.clone()))),
                config,
                fast_created: AtomicU64::new(0),
                slow_created: AtomicU64::new(0),
            }),
        }
    }

    /// Process-wide runtime, configured from the environment on first use
    pub fn global() -> &'static Runtime {
        GLOBAL.get_or_init(|| Runtime::new(RuntimeConfig::from_env()))
    }

    /// Open a session that owns the values it creates
    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> ReprPolicy {
        self.inner.config.repr_policy()
    }

    pub fn engine_name(&self) -> &'static str {
        self.inner.engine.lock().name()
    }

    /// Whether two runtime handles refer to the same context
    pub fn same_as(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.inner.table.lock().is_live(handle)
    }

    /// Handles currently live in the table
    pub fn live_handles(&self) -> Vec<Handle> {
        self.inner.table.lock().live_handles()
    }

    /// Whether the table still holds `state`'s handle on behalf of that value
    pub(crate) fn is_owned_by(&self, state: &Arc<Liveness>) -> bool {
        self.inner
            .table
            .lock()
            .entry(state.handle())
            .is_some_and(|entry| entry.is_owned_by(state))
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let handles = self.inner.table.lock().stats();
        let pool = self.inner.pool.lock().stats();
        Diagnostics::new(
            handles,
            pool,
            self.inner.fast_created.load(Ordering::Relaxed),
            self.inner.slow_created.load(Ordering::Relaxed),
        )
    }

    /// Fail with `OutstandingHandles` if any value is still live
    pub fn check_no_outstanding(&self) -> Result<()> {
        let handles = self.live_handles();
        if handles.is_empty() {
            return Ok(());
        }
        tracing::error!(count = handles.len(), handles = ?handles, "outstanding handles");
        Err(Error::OutstandingHandles { handles })
    }

    /// Release every live handle; outstanding values become disposed
    #[tracing::instrument(skip(self))]
    pub fn force_release_all(&self) -> usize {
        let handles = self.inner.table.lock().force_release_all();
        let (freed, _) = timed_block!("force_release_all", {
            let mut engine = self.inner.engine.lock();
            for handle in &handles {
                engine.free(*handle);
            }
            handles.len()
        });
        freed
    }

    /// Forget every name bound through [`Session::bind`] or a `let` statement
    ///
    /// Bindings belong to the runtime's evaluator, so every session sharing
    /// this runtime loses them.
    pub fn reset_bindings(&self) {
        self.inner.engine.lock().reset_bindings();
        tracing::debug!("evaluator bindings reset");
    }

    /// Evict idle pool buffers older than the configured age
    pub fn evict_stale(&self) -> usize {
        let max_age = self.inner.config.pool.max_idle_age;
        self.inner.pool.lock().evict_stale(max_age)
    }

    // ============================================================================================
    // Value plumbing
    // ============================================================================================

    /// Allocate a value and fill it with `data` (physical layout)
    pub(crate) fn create(&self, shape: Shape, data: &[f64]) -> Result<Registered> {
        if data.len() != shape.physical_len() {
            return Err(Error::DimensionMismatch {
                left: shape.to_string(),
                right: format!("{} values", data.len()),
            });
        }

        let representation = self.policy().select(shape.element_count());
        let start = Instant::now();
        let handle = {
            let mut engine = self.inner.engine.lock();
            let handle = engine.alloc(shape, representation)?;
            if let Err(err) = engine.copy_in(handle, data) {
                engine.free(handle);
                return Err(err.into());
            }
            handle
        };
        record_transfer(
            std::mem::size_of_val(data),
            Transfer::HostToEngine,
            start.elapsed().as_micros() as u64,
        );

        self.register(handle, shape, representation)
    }

    /// Run a kernel and register its result
    pub(crate) fn invoke(&self, kernel: Kernel, operands: &[Operand]) -> Result<Registered> {
        let span = perf_span!("invoke", kernel = kernel.name());
        let (handle, shape, representation) = {
            let mut engine = self.inner.engine.lock();
            let handle = engine.invoke(kernel, operands, self.policy())?;
            Self::describe(&mut **engine, handle)?
        };
        record_throughput(kernel.name(), shape.element_count(), span.elapsed_us());

        self.register(handle, shape, representation)
    }

    /// Evaluate expression text and register its result
    pub(crate) fn eval(&self, expression: &str) -> Result<Registered> {
        let _span = perf_span!("eval", length = expression.len());
        let (handle, shape, representation) = {
            let mut engine = self.inner.engine.lock();
            let handle = engine.eval(expression, self.policy())?;
            Self::describe(&mut **engine, handle)?
        };

        self.register(handle, shape, representation)
    }

    /// Bind `name` in the evaluator environment to a copy of `handle`'s contents
    pub(crate) fn bind(&self, name: &str, handle: Handle) -> Result<()> {
        self.inner.engine.lock().bind(name, handle)?;
        tracing::debug!(name, handle = %handle, "evaluator binding");
        Ok(())
    }

    fn describe(engine: &mut dyn Engine, handle: Handle) -> Result<(Handle, Shape, Representation)> {
        let described = engine
            .shape(handle)
            .and_then(|shape| engine.representation(handle).map(|representation| (handle, shape, representation)));
        described.map_err(|err| {
            engine.free(handle);
            err.into()
        })
    }

    fn register(&self, handle: Handle, shape: Shape, representation: Representation) -> Result<Registered> {
        let state = Arc::new(Liveness::new(handle));
        self.inner
            .table
            .lock()
            .register(handle, representation, shape.element_count(), &state)?;

        let counter = match representation {
            Representation::Fast => &self.inner.fast_created,
            Representation::Slow => &self.inner.slow_created,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(handle = %handle, shape = %shape, representation = %representation, "value registered");

        Ok(Registered {
            shape,
            representation,
            state,
        })
    }

    /// Release a handle; never fails
    pub(crate) fn release(&self, handle: Handle, kind: ReleaseKind) {
        let released = self.inner.table.lock().release_as(handle, kind);
        if released {
            self.inner.engine.lock().free(handle);
            tracing::trace!(handle = %handle, kind = ?kind, "value released");
        }
    }

    pub(crate) fn read(&self, handle: Handle, index: usize) -> Result<f64> {
        Ok(self.inner.engine.lock().read(handle, index)?)
    }

    pub(crate) fn write(&self, handle: Handle, index: usize, value: f64) -> Result<()> {
        Ok(self.inner.engine.lock().write(handle, index, value)?)
    }

    /// Zero-copy view when the engine has a fast buffer, pooled copy otherwise
    pub(crate) fn data_view(&self, handle: Handle, shape: Shape) -> Result<DataView> {
        let engine = self.inner.engine.lock();
        if let Some(shared) = engine.view(handle)? {
            return Ok(DataView::Shared(shared));
        }

        let start = Instant::now();
        let bytes = shape.physical_len() * std::mem::size_of::<f64>();
        let mut buffer = BufferPool::loan(&self.inner.pool, bytes);
        engine.copy_out(handle, &mut buffer)?;
        record_transfer(bytes, Transfer::EngineToHost, start.elapsed().as_micros() as u64);
        Ok(DataView::Materialized(buffer))
    }

    /// Owned copy of the physical data
    pub(crate) fn to_vec(&self, handle: Handle, shape: Shape) -> Result<Vec<f64>> {
        let start = Instant::now();
        let mut out = vec![0.0; shape.physical_len()];
        self.inner.engine.lock().copy_out(handle, &mut out)?;
        record_transfer(
            std::mem::size_of_val(out.as_slice()),
            Transfer::EngineToHost,
            start.elapsed().as_micros() as u64,
        );
        Ok(out)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("live", &self.inner.table.lock().stats().active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_release() {
        let runtime = Runtime::default();
        let registered = runtime.create(Shape::Vector(3), &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(registered.representation, Representation::Slow);
        assert!(runtime.is_live(registered.state.handle()));

        runtime.release(registered.state.handle(), ReleaseKind::Explicit);
        runtime.release(registered.state.handle(), ReleaseKind::Explicit);
        assert!(registered.state.is_disposed());

        let d = runtime.diagnostics();
        assert_eq!((d.allocated, d.freed, d.active, d.leaked), (1, 1, 0, 0));
    }

    #[test]
    fn test_create_checks_length() {
        let runtime = Runtime::default();
        let err = runtime.create(Shape::Vector(3), &[1.0]).err().unwrap();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(runtime.diagnostics().allocated, 0);
    }

    #[test]
    fn test_allocation_failure_surfaces() {
        let runtime = Runtime::with_engine(ReferenceEngine::with_limit(1), RuntimeConfig::default());
        let _first = runtime.create(Shape::Scalar, &[1.0]).unwrap();
        let err = runtime.create(Shape::Scalar, &[2.0]).err().unwrap();
        assert!(matches!(err, Error::AllocationFailed(_)));
    }

    #[test]
    fn test_outstanding_and_forced_release() {
        let runtime = Runtime::default();
        let a = runtime.create(Shape::Scalar, &[1.0]).unwrap();
        let b = runtime.create(Shape::Scalar, &[2.0]).unwrap();

        match runtime.check_no_outstanding() {
            Err(Error::OutstandingHandles { handles }) => {
                assert_eq!(handles, vec![a.state.handle(), b.state.handle()])
            }
            other => panic!("expected outstanding handles, got {other:?}"),
        }

        assert_eq!(runtime.force_release_all(), 2);
        assert!(a.state.is_disposed() && b.state.is_disposed());
        assert!(runtime.check_no_outstanding().is_ok());
    }

    #[test]
    fn test_data_view_paths() {
        let runtime = Runtime::default();
        let fast = runtime.create(Shape::Vector(8), &[1.0; 8]).unwrap();
        let slow = runtime.create(Shape::Vector(2), &[4.0, 5.0]).unwrap();

        assert!(runtime.data_view(fast.state.handle(), fast.shape).unwrap().is_zero_copy());
        let copied = runtime.data_view(slow.state.handle(), slow.shape).unwrap();
        assert!(!copied.is_zero_copy());
        assert_eq!(&*copied, &[4.0, 5.0]);
        drop(copied);
        assert_eq!(runtime.diagnostics().pool_misses, 1);
    }

    #[test]
    fn test_fast_path_usage() {
        let runtime = Runtime::new(RuntimeConfig {
            fast_path_threshold: 2,
            ..RuntimeConfig::default()
        });
        runtime.create(Shape::Vector(2), &[0.0, 0.0]).unwrap();
        runtime.create(Shape::Scalar, &[0.0]).unwrap();
        assert_eq!(runtime.diagnostics().fast_path_usage_percent, 50.0);
    }

    #[test]
    fn test_independent_runtimes() {
        let a = Runtime::default();
        let b = Runtime::default();
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
    }
}
