//! Elementwise kernels
//!
//! Real arithmetic follows IEEE-754 double precision exactly: `x/0` is a
//! signed infinity, `0/0` and anything touching NaN is NaN, `ln` and `sqrt`
//! of negative reals are NaN (no complex promotion). Complex operands switch
//! to complex arithmetic.

use super::{Dense, DenseRef, PARALLEL_THRESHOLD};
use crate::error::{EngineError, Result};
use crate::types::Shape;
use rayon::prelude::*;
use rustfft::num_complex::Complex64;

/// Binary elementwise operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Whether the operation yields `1.0`/`0.0` truth values
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    /// Apply to two reals
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
            // f64::min/max drop NaN; NaN must propagate here
            BinaryOp::Min if a.is_nan() || b.is_nan() => f64::NAN,
            BinaryOp::Max if a.is_nan() || b.is_nan() => f64::NAN,
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::Mod => a % b,
            BinaryOp::Lt => truth(a < b),
            BinaryOp::Le => truth(a <= b),
            BinaryOp::Gt => truth(a > b),
            BinaryOp::Ge => truth(a >= b),
            BinaryOp::Eq => truth(a == b),
            BinaryOp::Ne => truth(a != b),
        }
    }

    /// Apply to two complex numbers
    pub fn apply_complex(self, a: Complex64, b: Complex64) -> Result<Complex64> {
        match self {
            BinaryOp::Add => Ok(a + b),
            BinaryOp::Sub => Ok(a - b),
            BinaryOp::Mul => Ok(a * b),
            BinaryOp::Div => Ok(a / b),
            BinaryOp::Pow => Ok(a.powc(b)),
            _ => Err(EngineError::invalid(format!("{self:?} is not defined for complex values"))),
        }
    }
}

#[inline]
fn truth(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Unary elementwise operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Sqrt,
    Ln,
    Log10,
    Exp,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Floor,
    Ceil,
    Round,
}

impl UnaryOp {
    /// Apply to a real
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Ln => x.ln(),
            UnaryOp::Log10 => x.log10(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Asin => x.asin(),
            UnaryOp::Acos => x.acos(),
            UnaryOp::Atan => x.atan(),
            UnaryOp::Sinh => x.sinh(),
            UnaryOp::Cosh => x.cosh(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Floor => x.floor(),
            UnaryOp::Ceil => x.ceil(),
            UnaryOp::Round => x.round(),
        }
    }

    /// Apply to a complex number (`Abs` is handled separately, it yields reals)
    fn apply_complex(self, z: Complex64) -> Result<Complex64> {
        Ok(match self {
            UnaryOp::Neg => -z,
            UnaryOp::Abs => Complex64::new(z.norm(), 0.0),
            UnaryOp::Sqrt => z.sqrt(),
            UnaryOp::Ln => z.ln(),
            UnaryOp::Log10 => z.log10(),
            UnaryOp::Exp => z.exp(),
            UnaryOp::Sin => z.sin(),
            UnaryOp::Cos => z.cos(),
            UnaryOp::Tan => z.tan(),
            UnaryOp::Asin => z.asin(),
            UnaryOp::Acos => z.acos(),
            UnaryOp::Atan => z.atan(),
            UnaryOp::Sinh => z.sinh(),
            UnaryOp::Cosh => z.cosh(),
            UnaryOp::Tanh => z.tanh(),
            UnaryOp::Floor | UnaryOp::Ceil | UnaryOp::Round => {
                return Err(EngineError::invalid(format!("{self:?} is not defined for complex values")));
            }
        })
    }
}

/// Result shape of a binary operation, honouring scalar broadcast
fn binary_shape(a: Shape, b: Shape) -> Result<Shape> {
    let base = match (a, b) {
        (Shape::Scalar, other) | (other, Shape::Scalar) => other,
        (Shape::Matrix { .. }, Shape::Matrix { .. }) if a != b => return Err(EngineError::mismatch(a, b)),
        _ if a.element_count() != b.element_count() => return Err(EngineError::mismatch(a, b)),
        _ => a,
    };

    if a.is_complex() || b.is_complex() {
        Ok(Shape::Complex(base.element_count()))
    } else {
        Ok(base)
    }
}

/// Elementwise binary kernel
///
/// A `Scalar` operand broadcasts against the other side. Otherwise element
/// counts must agree, and two matrices must agree in both dimensions.
pub fn binary(op: BinaryOp, a: DenseRef<'_>, b: DenseRef<'_>) -> Result<Dense> {
    let shape = binary_shape(a.shape, b.shape)?;
    let n = shape.element_count();

    if shape.is_complex() {
        let lhs = a.to_complex();
        let rhs = b.to_complex();
        let pick = |values: &[Complex64], i: usize| if values.len() == 1 { values[0] } else { values[i] };
        let out = (0..n)
            .map(|i| op.apply_complex(pick(&lhs, i), pick(&rhs, i)))
            .collect::<Result<Vec<_>>>()?;
        return Dense::new(shape, Dense::complex(&out).data);
    }

    let data = match (a.data.len(), b.data.len()) {
        (1, len) if len != 1 || n == 1 => map_real(b.data, |y| op.apply(a.data[0], y)),
        (_, 1) => map_real(a.data, |x| op.apply(x, b.data[0])),
        _ if n >= PARALLEL_THRESHOLD => a
            .data
            .par_iter()
            .zip(b.data.par_iter())
            .map(|(&x, &y)| op.apply(x, y))
            .collect(),
        _ => a.data.iter().zip(b.data).map(|(&x, &y)| op.apply(x, y)).collect(),
    };

    Dense::new(shape, data)
}

/// Elementwise unary kernel
pub fn unary(op: UnaryOp, a: DenseRef<'_>) -> Result<Dense> {
    if !a.shape.is_complex() {
        return Dense::new(a.shape, map_real(a.data, |x| op.apply(x)));
    }

    let values = a.to_complex();
    if op == UnaryOp::Abs {
        let magnitudes: Vec<f64> = values.iter().map(|z| z.norm()).collect();
        return Ok(match a.shape {
            Shape::Complex(1) => Dense::scalar(magnitudes[0]),
            _ => Dense::vector(magnitudes),
        });
    }

    let out = values
        .into_iter()
        .map(|z| op.apply_complex(z))
        .collect::<Result<Vec<_>>>()?;
    Ok(Dense::complex(&out))
}

fn map_real(data: &[f64], f: impl Fn(f64) -> f64 + Sync + Send) -> Vec<f64> {
    if data.len() >= PARALLEL_THRESHOLD {
        data.par_iter().map(|&x| f(x)).collect()
    } else {
        data.iter().map(|&x| f(x)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(data: &[f64]) -> Dense {
        Dense::vector(data.to_vec())
    }

    #[test]
    fn test_ieee_division() {
        let a = vector(&[1.0, -2.0, 0.0]);
        let b = vector(&[0.0, 0.0, 0.0]);
        let out = binary(BinaryOp::Div, a.borrowed(), b.borrowed()).unwrap();
        assert_eq!(out.data[0], f64::INFINITY);
        assert_eq!(out.data[1], f64::NEG_INFINITY);
        assert!(out.data[2].is_nan());
    }

    #[test]
    fn test_nan_propagates_through_min_max() {
        let a = vector(&[1.0, f64::NAN]);
        let b = vector(&[f64::NAN, 2.0]);
        let out = binary(BinaryOp::Min, a.borrowed(), b.borrowed()).unwrap();
        assert!(out.data.iter().all(|x| x.is_nan()));
        let out = binary(BinaryOp::Max, a.borrowed(), b.borrowed()).unwrap();
        assert!(out.data.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn test_logs_and_roots_of_negatives() {
        let a = vector(&[-1.0, 0.0, 4.0]);
        let ln = unary(UnaryOp::Ln, a.borrowed()).unwrap();
        assert!(ln.data[0].is_nan());
        assert_eq!(ln.data[1], f64::NEG_INFINITY);
        let sqrt = unary(UnaryOp::Sqrt, a.borrowed()).unwrap();
        assert!(sqrt.data[0].is_nan());
        assert_eq!(sqrt.data[2], 2.0);
    }

    #[test]
    fn test_comparisons_yield_truth_values() {
        let a = vector(&[1.0, 2.0, f64::NAN]);
        let two = Dense::scalar(2.0);
        let out = binary(BinaryOp::Lt, a.borrowed(), two.borrowed()).unwrap();
        assert_eq!(out.data, vec![1.0, 0.0, 0.0]);
        let out = binary(BinaryOp::Ne, a.borrowed(), two.borrowed()).unwrap();
        assert_eq!(out.data, vec![1.0, 0.0, 1.0]);
        let out = binary(BinaryOp::Mod, vector(&[7.0, -7.0]).borrowed(), Dense::scalar(3.0).borrowed()).unwrap();
        assert_eq!(out.data, vec![1.0, -1.0]);
    }

    #[test]
    fn test_scalar_broadcast() {
        let a = vector(&[1.0, 2.0, 3.0]);
        let two = Dense::scalar(2.0);
        let out = binary(BinaryOp::Pow, a.borrowed(), two.borrowed()).unwrap();
        assert_eq!(out.data, vec![1.0, 4.0, 9.0]);
        let out = binary(BinaryOp::Sub, two.borrowed(), a.borrowed()).unwrap();
        assert_eq!(out.data, vec![1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let a = vector(&[1.0, 2.0, 3.0]);
        let b = vector(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let err = binary(BinaryOp::Add, a.borrowed(), b.borrowed()).unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_matrix_shapes_must_agree() {
        let a = Dense::new(Shape::Matrix { rows: 2, cols: 3 }, vec![0.0; 6]).unwrap();
        let b = Dense::new(Shape::Matrix { rows: 3, cols: 2 }, vec![0.0; 6]).unwrap();
        assert!(binary(BinaryOp::Add, a.borrowed(), b.borrowed()).is_err());
    }

    #[test]
    fn test_complex_arithmetic() {
        let a = Dense::complex(&[Complex64::new(1.0, 2.0)]);
        let b = Dense::complex(&[Complex64::new(3.0, -1.0)]);
        let out = binary(BinaryOp::Mul, a.borrowed(), b.borrowed()).unwrap();
        assert_eq!(out.shape, Shape::Complex(1));
        assert_eq!(out.data, vec![5.0, 5.0]);

        let magnitude = unary(UnaryOp::Abs, Dense::complex(&[Complex64::new(3.0, 4.0)]).borrowed()).unwrap();
        assert_eq!(magnitude, Dense::scalar(5.0));
    }

    #[test]
    fn test_parallel_path_matches_serial() {
        let n = PARALLEL_THRESHOLD + 17;
        let a = Dense::vector((0..n).map(|i| i as f64).collect());
        let b = Dense::vector(vec![1.0; n]);
        let out = binary(BinaryOp::Add, a.borrowed(), b.borrowed()).unwrap();
        assert_eq!(out.data.len(), n);
        assert_eq!(out.data[n - 1], n as f64);
    }
}
