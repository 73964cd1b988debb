//! Macros for performance instrumentation

/// Create a [`crate::performance::PerformanceSpan`] with optional fields.
///
/// ```text
/// perf_span!("name")
/// perf_span!("name", field1 = value1, field2 = value2)
/// ```
///
/// # Example
///
/// ```rust
/// use tether_tracing::perf_span;
///
/// {
///     let _span = perf_span!("session_teardown", tracked = 12);
///     // ... work ...
/// } // logs the duration with the fields
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::new($name, None)
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        let name = $name;
        $crate::performance::PerformanceSpan::in_span(
            $crate::tracing::debug_span!("perf", name = name, $($field = $value),+),
            name,
            None,
        )
    }};
}

/// Time a block, returning `(result, duration_us)`.
///
/// ```rust
/// use tether_tracing::timed_block;
///
/// let (total, duration_us) = timed_block!("sum", { (1..=10).sum::<i32>() });
/// assert_eq!(total, 55);
/// # let _ = duration_us;
/// ```
#[macro_export]
macro_rules! timed_block {
    ($name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        let duration_us = start.elapsed().as_micros() as u64;
        $crate::tracing::debug!(operation = $name, duration_us, "timed_block_complete");
        (result, duration_us)
    }};
}
