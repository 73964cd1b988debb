//! Reductions, matrix kernels and sample generation

use super::{Dense, DenseRef};
use crate::error::{EngineError, Result};
use crate::types::Shape;
use rustfft::num_complex::Complex64;

fn complex_scalar(z: Complex64) -> Dense {
    Dense::complex(&[z])
}

/// Sum of all elements (`Complex(1)` for complex input)
pub fn sum(a: DenseRef<'_>) -> Result<Dense> {
    if a.shape.is_complex() {
        return Ok(complex_scalar(a.to_complex().into_iter().sum()));
    }
    Ok(Dense::scalar(a.data.iter().sum()))
}

/// Arithmetic mean; NaN for an empty value
pub fn mean(a: DenseRef<'_>) -> Result<Dense> {
    let n = a.shape.element_count() as f64;
    if a.shape.is_complex() {
        let total: Complex64 = a.to_complex().into_iter().sum();
        return Ok(complex_scalar(total / n));
    }
    Ok(Dense::scalar(a.data.iter().sum::<f64>() / n))
}

/// Euclidean norm
pub fn norm(a: DenseRef<'_>) -> Result<Dense> {
    let squares: f64 = if a.shape.is_complex() {
        a.to_complex().iter().map(|z| z.norm_sqr()).sum()
    } else {
        a.data.iter().map(|x| x * x).sum()
    };
    Ok(Dense::scalar(squares.sqrt()))
}

/// Inner product of two equally sized values (no conjugation)
pub fn dot(a: DenseRef<'_>, b: DenseRef<'_>) -> Result<Dense> {
    if a.shape.element_count() != b.shape.element_count() {
        return Err(EngineError::mismatch(a.shape, b.shape));
    }

    if a.shape.is_complex() || b.shape.is_complex() {
        let total = a
            .to_complex()
            .into_iter()
            .zip(b.to_complex())
            .map(|(x, y)| x * y)
            .sum();
        return Ok(complex_scalar(total));
    }
    Ok(Dense::scalar(a.data.iter().zip(b.data).map(|(x, y)| x * y).sum()))
}

/// Transpose a row-major matrix
pub fn transpose(a: DenseRef<'_>) -> Result<Dense> {
    let Shape::Matrix { rows, cols } = a.shape else {
        return Err(EngineError::invalid(format!("transpose expects a matrix, got {}", a.shape)));
    };

    let mut out = vec![0.0; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = a.data[r * cols + c];
        }
    }
    Dense::new(Shape::Matrix { rows: cols, cols: rows }, out)
}

/// Matrix product: matrix × matrix, or matrix × vector
pub fn matmul(a: DenseRef<'_>, b: DenseRef<'_>) -> Result<Dense> {
    let Shape::Matrix { rows, cols: inner } = a.shape else {
        return Err(EngineError::invalid(format!("matmul expects a matrix on the left, got {}", a.shape)));
    };

    let (b_rows, b_cols, out_shape) = match b.shape {
        Shape::Matrix { rows: r, cols: c } => (r, c, Shape::Matrix { rows, cols: c }),
        Shape::Vector(n) => (n, 1, Shape::Vector(rows)),
        other => return Err(EngineError::invalid(format!("matmul expects a matrix or vector on the right, got {other}"))),
    };
    if b_rows != inner {
        return Err(EngineError::mismatch(a.shape, b.shape));
    }

    let mut out = vec![0.0; rows * b_cols];
    for r in 0..rows {
        for k in 0..inner {
            let lhs = a.data[r * inner + k];
            for c in 0..b_cols {
                out[r * b_cols + c] += lhs * b.data[k * b_cols + c];
            }
        }
    }
    Dense::new(out_shape, out)
}

/// `n` evenly spaced samples from `start` to `end` inclusive
///
/// `n == 1` yields `[start]`. The last sample is exactly `end`.
pub fn linspace(start: f64, end: f64, n: f64) -> Result<Dense> {
    if !n.is_finite() || n < 1.0 || n.fract() != 0.0 {
        return Err(EngineError::invalid(format!("linspace needs a positive integer count, got {n}")));
    }
    let n = n as usize;
    if n == 1 {
        return Ok(Dense::vector(vec![start]));
    }

    let step = (end - start) / (n - 1) as f64;
    let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    out[n - 1] = end;
    Ok(Dense::vector(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace_edges() {
        assert_eq!(linspace(3.0, 9.0, 1.0).unwrap().data, vec![3.0]);
        assert_eq!(linspace(3.0, 9.0, 2.0).unwrap().data, vec![3.0, 9.0]);
        assert_eq!(linspace(2.5, 2.5, 4.0).unwrap().data, vec![2.5; 4]);
        assert_eq!(linspace(0.0, 1.0, 5.0).unwrap().data, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(linspace(0.0, 1.0, 0.0).is_err());
        assert!(linspace(0.0, 1.0, 2.5).is_err());
    }

    #[test]
    fn test_linspace_endpoint_is_exact() {
        let out = linspace(0.1, 0.7, 7.0).unwrap();
        assert_eq!(*out.data.last().unwrap(), 0.7);
    }

    #[test]
    fn test_reductions() {
        let a = Dense::vector(vec![3.0, 4.0]);
        assert_eq!(sum(a.borrowed()).unwrap(), Dense::scalar(7.0));
        assert_eq!(mean(a.borrowed()).unwrap(), Dense::scalar(3.5));
        assert_eq!(norm(a.borrowed()).unwrap(), Dense::scalar(5.0));
        assert_eq!(dot(a.borrowed(), a.borrowed()).unwrap(), Dense::scalar(25.0));
        assert!(mean(Dense::vector(Vec::new()).borrowed()).unwrap().data[0].is_nan());
    }

    #[test]
    fn test_transpose_and_matmul() {
        let m = Dense::new(Shape::Matrix { rows: 2, cols: 3 }, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t = transpose(m.borrowed()).unwrap();
        assert_eq!(t.shape, Shape::Matrix { rows: 3, cols: 2 });
        assert_eq!(t.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let product = matmul(m.borrowed(), t.borrowed()).unwrap();
        assert_eq!(product.shape, Shape::Matrix { rows: 2, cols: 2 });
        assert_eq!(product.data, vec![14.0, 32.0, 32.0, 77.0]);

        let v = Dense::vector(vec![1.0, 0.0, -1.0]);
        let mv = matmul(m.borrowed(), v.borrowed()).unwrap();
        assert_eq!(mv, Dense::vector(vec![-2.0, -2.0]));

        assert!(matmul(m.borrowed(), m.borrowed()).is_err());
    }
}
