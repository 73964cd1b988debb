//! Numeric kernels keyed by name
//!
//! Every kernel runs on borrowed dense operands ([`DenseRef`]) and produces
//! an owned [`Dense`] result. The fast path hands in slices of the engine's
//! own buffers; the slow path materializes expression values first. Both
//! paths end up here, so results agree for the same logical inputs.
//!
//! ## Kernel Families
//!
//! - [`elementwise`] - binary and unary elementwise arithmetic (rayon above
//!   [`PARALLEL_THRESHOLD`])
//! - [`transform`] - FFT family, shifts, convolution
//! - [`linalg`] - reductions, transpose, matmul, linspace

pub mod elementwise;
pub mod linalg;
pub mod transform;

use crate::error::{EngineError, Result};
use crate::types::Shape;
use rustfft::num_complex::Complex64;
use std::fmt;

pub use elementwise::{BinaryOp, UnaryOp};

/// Minimum element count before elementwise kernels fan out to rayon
pub const PARALLEL_THRESHOLD: usize = 10_000;

/// A numeric primitive exposed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Elementwise binary operation
    Binary(BinaryOp),
    /// Elementwise unary operation
    Unary(UnaryOp),
    /// Multiply by an immediate scalar
    Scale,
    /// Forward discrete Fourier transform (any length)
    Fft,
    /// Inverse discrete Fourier transform, scaled by `1/n`
    Ifft,
    /// Magnitude spectrum
    FftMag,
    /// Phase spectrum
    FftPhase,
    /// Move the zero-frequency bin to the centre
    FftShift,
    /// Undo [`Kernel::FftShift`]
    IfftShift,
    /// Full linear convolution
    Conv,
    /// Sum of elements
    Sum,
    /// Arithmetic mean
    Mean,
    /// Euclidean norm
    Norm,
    /// Inner product
    Dot,
    /// Matrix transpose
    Transpose,
    /// Matrix product (matrix × matrix or matrix × vector)
    Matmul,
    /// Evenly spaced samples: `(start, end, n)`
    Linspace,
    /// Duplicate a value into a fresh handle
    Copy,
}

const NAMED_KERNELS: &[(&str, Kernel)] = &[
    ("add", Kernel::Binary(BinaryOp::Add)),
    ("sub", Kernel::Binary(BinaryOp::Sub)),
    ("mul", Kernel::Binary(BinaryOp::Mul)),
    ("div", Kernel::Binary(BinaryOp::Div)),
    ("pow", Kernel::Binary(BinaryOp::Pow)),
    ("min", Kernel::Binary(BinaryOp::Min)),
    ("max", Kernel::Binary(BinaryOp::Max)),
    ("mod", Kernel::Binary(BinaryOp::Mod)),
    ("lt", Kernel::Binary(BinaryOp::Lt)),
    ("le", Kernel::Binary(BinaryOp::Le)),
    ("gt", Kernel::Binary(BinaryOp::Gt)),
    ("ge", Kernel::Binary(BinaryOp::Ge)),
    ("eq", Kernel::Binary(BinaryOp::Eq)),
    ("ne", Kernel::Binary(BinaryOp::Ne)),
    ("neg", Kernel::Unary(UnaryOp::Neg)),
    ("abs", Kernel::Unary(UnaryOp::Abs)),
    ("sqrt", Kernel::Unary(UnaryOp::Sqrt)),
    ("ln", Kernel::Unary(UnaryOp::Ln)),
    ("log10", Kernel::Unary(UnaryOp::Log10)),
    ("exp", Kernel::Unary(UnaryOp::Exp)),
    ("sin", Kernel::Unary(UnaryOp::Sin)),
    ("cos", Kernel::Unary(UnaryOp::Cos)),
    ("tan", Kernel::Unary(UnaryOp::Tan)),
    ("asin", Kernel::Unary(UnaryOp::Asin)),
    ("acos", Kernel::Unary(UnaryOp::Acos)),
    ("atan", Kernel::Unary(UnaryOp::Atan)),
    ("sinh", Kernel::Unary(UnaryOp::Sinh)),
    ("cosh", Kernel::Unary(UnaryOp::Cosh)),
    ("tanh", Kernel::Unary(UnaryOp::Tanh)),
    ("floor", Kernel::Unary(UnaryOp::Floor)),
    ("ceil", Kernel::Unary(UnaryOp::Ceil)),
    ("round", Kernel::Unary(UnaryOp::Round)),
    ("scale", Kernel::Scale),
    ("fft", Kernel::Fft),
    ("ifft", Kernel::Ifft),
    ("fft_mag", Kernel::FftMag),
    ("fft_phase", Kernel::FftPhase),
    ("fftshift", Kernel::FftShift),
    ("ifftshift", Kernel::IfftShift),
    ("conv", Kernel::Conv),
    ("sum", Kernel::Sum),
    ("mean", Kernel::Mean),
    ("norm", Kernel::Norm),
    ("dot", Kernel::Dot),
    ("transpose", Kernel::Transpose),
    ("matmul", Kernel::Matmul),
    ("linspace", Kernel::Linspace),
    ("copy", Kernel::Copy),
];

impl Kernel {
    /// Look up a kernel by its engine name
    pub fn from_name(name: &str) -> Option<Kernel> {
        NAMED_KERNELS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kernel)| *kernel)
    }

    /// Engine name of the kernel
    pub fn name(&self) -> &'static str {
        NAMED_KERNELS
            .iter()
            .find(|(_, kernel)| kernel == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Every named kernel
    pub fn all() -> impl Iterator<Item = Kernel> {
        NAMED_KERNELS.iter().map(|(_, kernel)| *kernel)
    }

    /// Number of operands the kernel expects
    pub fn arity(&self) -> usize {
        match self {
            Kernel::Binary(_) | Kernel::Scale | Kernel::Conv | Kernel::Dot | Kernel::Matmul => 2,
            Kernel::Linspace => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed dense operand
#[derive(Debug, Clone, Copy)]
pub struct DenseRef<'a> {
    pub shape: Shape,
    pub data: &'a [f64],
}

impl<'a> DenseRef<'a> {
    /// Wrap a physical slice with its shape
    pub fn new(shape: Shape, data: &'a [f64]) -> Self {
        debug_assert_eq!(shape.physical_len(), data.len(), "physical length must match shape");
        Self { shape, data }
    }

    /// Read the value as complex numbers (real values get a zero imaginary part)
    pub fn to_complex(&self) -> Vec<Complex64> {
        if self.shape.is_complex() {
            self.data.chunks_exact(2).map(|pair| Complex64::new(pair[0], pair[1])).collect()
        } else {
            self.data.iter().map(|&re| Complex64::new(re, 0.0)).collect()
        }
    }

    /// The single real number of a scalar operand
    pub fn as_scalar(&self) -> Result<f64> {
        match self.shape {
            Shape::Scalar => Ok(self.data[0]),
            other => Err(EngineError::invalid(format!("expected a scalar, got {other}"))),
        }
    }
}

/// Owned dense kernel result
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub shape: Shape,
    pub data: Vec<f64>,
}

impl Dense {
    /// Create a dense value, checking the physical length
    pub fn new(shape: Shape, data: Vec<f64>) -> Result<Self> {
        if shape.physical_len() != data.len() {
            return Err(EngineError::mismatch(shape, format!("{} values", data.len())));
        }
        Ok(Self { shape, data })
    }

    /// A real scalar
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Shape::Scalar,
            data: vec![value],
        }
    }

    /// A real vector
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: Shape::Vector(data.len()),
            data,
        }
    }

    /// Complex numbers, stored interleaved
    pub fn complex(values: &[Complex64]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 2);
        for z in values {
            data.push(z.re);
            data.push(z.im);
        }
        Self {
            shape: Shape::Complex(values.len()),
            data,
        }
    }

    /// Borrow as an operand
    pub fn borrowed(&self) -> DenseRef<'_> {
        DenseRef {
            shape: self.shape,
            data: &self.data,
        }
    }
}

/// Run a kernel on dense operands
pub fn execute(kernel: Kernel, args: &[DenseRef<'_>]) -> Result<Dense> {
    if args.len() != kernel.arity() {
        return Err(EngineError::invalid(format!(
            "{kernel} expects {} operand(s), got {}",
            kernel.arity(),
            args.len()
        )));
    }

    match kernel {
        Kernel::Binary(op) => elementwise::binary(op, args[0], args[1]),
        Kernel::Unary(op) => elementwise::unary(op, args[0]),
        Kernel::Scale => {
            let factor = args[1].as_scalar()?;
            elementwise::binary(BinaryOp::Mul, args[0], DenseRef::new(Shape::Scalar, &[factor]))
        }
        Kernel::Fft => transform::fft(args[0]),
        Kernel::Ifft => transform::ifft(args[0]),
        Kernel::FftMag => transform::fft_mag(args[0]),
        Kernel::FftPhase => transform::fft_phase(args[0]),
        Kernel::FftShift => transform::shift(args[0], false),
        Kernel::IfftShift => transform::shift(args[0], true),
        Kernel::Conv => transform::conv(args[0], args[1]),
        Kernel::Sum => linalg::sum(args[0]),
        Kernel::Mean => linalg::mean(args[0]),
        Kernel::Norm => linalg::norm(args[0]),
        Kernel::Dot => linalg::dot(args[0], args[1]),
        Kernel::Transpose => linalg::transpose(args[0]),
        Kernel::Matmul => linalg::matmul(args[0], args[1]),
        Kernel::Linspace => linalg::linspace(args[0].as_scalar()?, args[1].as_scalar()?, args[2].as_scalar()?),
        Kernel::Copy => Dense::new(args[0].shape, args[0].data.to_vec()),
    }
}
