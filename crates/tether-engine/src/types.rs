//! Handles, shapes and representation tags shared by the engine and its callers

use std::fmt;

/// Handle to an engine-resident value
///
/// Handles are opaque small integers issued by the engine. `0` is never
/// issued. The engine may reuse a number after it has been freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

impl Handle {
    /// Create a handle from its raw number
    pub const fn new(id: u32) -> Self {
        Handle(id)
    }

    /// Get the raw number
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Logical shape of an engine value
///
/// Complex values are stored as interleaved `re, im` pairs, so their
/// physical length is twice their element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A single real number
    Scalar,
    /// A real vector of `n` elements
    Vector(usize),
    /// A row-major real matrix
    Matrix { rows: usize, cols: usize },
    /// `n` complex numbers (`Complex(1)` is a complex scalar)
    Complex(usize),
}

impl Shape {
    /// Number of logical elements
    pub fn element_count(&self) -> usize {
        match *self {
            Shape::Scalar => 1,
            Shape::Vector(n) | Shape::Complex(n) => n,
            Shape::Matrix { rows, cols } => rows * cols,
        }
    }

    /// Number of `f64` slots needed to store the value
    pub fn physical_len(&self) -> usize {
        match *self {
            Shape::Complex(n) => n * 2,
            _ => self.element_count(),
        }
    }

    /// Whether the value holds complex numbers
    pub fn is_complex(&self) -> bool {
        matches!(self, Shape::Complex(_))
    }

    /// Short name used in logs and error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Scalar => "scalar",
            Shape::Vector(_) => "vector",
            Shape::Matrix { .. } => "matrix",
            Shape::Complex(_) => "complex",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Vector(n) => write!(f, "vector[{n}]"),
            Shape::Matrix { rows, cols } => write!(f, "matrix[{rows}x{cols}]"),
            Shape::Complex(n) => write!(f, "complex[{n}]"),
        }
    }
}

/// Physical representation of an engine value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// Contiguous `f64` buffer: zero-copy views and bulk kernels
    Fast,
    /// Expression text evaluated on demand: no minimum size, higher per-element cost
    Slow,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Fast => write!(f, "fast"),
            Representation::Slow => write!(f, "slow"),
        }
    }
}

/// Threshold policy that picks a representation from an element count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReprPolicy {
    /// Values with at least this many elements use the fast path
    pub fast_threshold: usize,
}

impl ReprPolicy {
    /// Default fast-path threshold in elements
    pub const DEFAULT_THRESHOLD: usize = 8;

    /// Create a policy with the given threshold
    pub const fn new(fast_threshold: usize) -> Self {
        Self { fast_threshold }
    }

    /// Pick the representation for a value of `element_count` elements
    pub fn select(&self, element_count: usize) -> Representation {
        if element_count >= self.fast_threshold {
            Representation::Fast
        } else {
            Representation::Slow
        }
    }
}

impl Default for ReprPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

/// Argument passed to an engine kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// An engine-resident value
    Handle(Handle),
    /// An immediate real number
    Scalar(f64),
}

impl From<Handle> for Operand {
    fn from(handle: Handle) -> Self {
        Operand::Handle(handle)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_threshold_boundary() {
        let policy = ReprPolicy::default();
        assert_eq!(policy.select(7), Representation::Slow);
        assert_eq!(policy.select(8), Representation::Fast);
        assert_eq!(policy.select(0), Representation::Slow);
    }

    #[test]
    fn test_shape_counts() {
        assert_eq!(Shape::Scalar.element_count(), 1);
        assert_eq!(Shape::Matrix { rows: 2, cols: 3 }.element_count(), 6);
        assert_eq!(Shape::Complex(4).element_count(), 4);
        assert_eq!(Shape::Complex(4).physical_len(), 8);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(Handle::new(12).to_string(), "$12");
    }
}
