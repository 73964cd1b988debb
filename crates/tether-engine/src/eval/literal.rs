//! Canonical literal text for dense values
//!
//! Slow-path storage keeps values as expression text. The literal form reads
//! back to the same logical value through the evaluator; Rust's shortest
//! round-trip float formatting keeps every finite `f64` exact.

use crate::kernels::{Dense, DenseRef};
use crate::error::{EngineError, Result};
use crate::types::Shape;
use std::fmt::Write;

/// Format one real number as a literal
pub fn number(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x == f64::INFINITY {
        "inf".to_string()
    } else if x == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{x:?}")
    }
}

fn join(out: &mut String, items: impl Iterator<Item = String>) {
    out.push('[');
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&item);
    }
    out.push(']');
}

fn complex_pair(re: f64, im: f64) -> String {
    let mut out = String::new();
    // infallible for String
    let _ = write!(out, "complex({}, {})", number(re), number(im));
    out
}

/// Format a dense value as literal text
pub fn format(value: DenseRef<'_>) -> String {
    let mut out = String::new();
    match value.shape {
        Shape::Scalar => out.push_str(&number(value.data[0])),
        Shape::Vector(_) => join(&mut out, value.data.iter().map(|&x| number(x))),
        Shape::Matrix { rows, cols } => {
            if cols == 0 {
                // chunks() rejects a zero size
                join(&mut out, (0..rows).map(|_| "[]".to_string()));
            } else {
                let rows = value.data.chunks(cols).map(|row| {
                    let mut text = String::new();
                    join(&mut text, row.iter().map(|&x| number(x)));
                    text
                });
                join(&mut out, rows);
            }
        }
        Shape::Complex(1) => out.push_str(&complex_pair(value.data[0], value.data[1])),
        Shape::Complex(_) => join(
            &mut out,
            value.data.chunks_exact(2).map(|pair| complex_pair(pair[0], pair[1])),
        ),
    }
    out
}

/// Reinterpret an evaluated value with the shape a slot was created with
///
/// Literal text does not carry every shape distinction (an empty matrix reads
/// back as an empty vector, a one-element complex vector as a complex
/// scalar), so the stored shape wins whenever the physical length agrees.
pub fn conform(value: Dense, shape: Shape) -> Result<Dense> {
    if value.shape == shape {
        return Ok(value);
    }
    let same_kind = value.shape.is_complex() == shape.is_complex() || value.data.is_empty();
    if same_kind && value.data.len() == shape.physical_len() {
        return Dense::new(shape, value.data);
    }
    Err(EngineError::mismatch(shape, value.shape))
}
