//! Read-only snapshot of a runtime's bookkeeping

use serde::Serialize;

use crate::handle_table::HandleStats;
use crate::pool::PoolStats;

/// Counters captured by [`crate::Runtime::diagnostics`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Diagnostics {
    pub allocated: u64,
    pub freed: u64,
    pub active: usize,
    pub leaked: u64,
    /// Share of values created on the fast path, 0-100
    pub fast_path_usage_percent: f64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub pool_bytes_pooled: usize,
}

impl Diagnostics {
    pub(crate) fn new(handles: HandleStats, pool: PoolStats, fast: u64, slow: u64) -> Self {
        let total = fast + slow;
        let fast_path_usage_percent = if total == 0 {
            0.0
        } else {
            fast as f64 * 100.0 / total as f64
        };

        Self {
            allocated: handles.allocated,
            freed: handles.freed,
            active: handles.active,
            leaked: handles.leaked,
            fast_path_usage_percent,
            pool_hits: pool.hits,
            pool_misses: pool.misses,
            pool_bytes_pooled: pool.bytes_pooled,
        }
    }

    /// JSON rendering for logs and dashboards
    pub fn to_json(&self) -> String {
        // plain numeric fields cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}
