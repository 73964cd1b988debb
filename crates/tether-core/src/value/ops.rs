//! Operations on values
//!
//! Each operation checks that its operands are live, hands the engine the
//! handles, and wraps the result handle in a new [`Value`] tracked by the same
//! session as `self`. Operand sizes are checked by the engine; a mismatch
//! comes back as [`crate::Error::DimensionMismatch`].

use tether_engine::eval::literal;
use tether_engine::{BinaryOp, Kernel, Operand, UnaryOp};

use super::Value;
use crate::error::Result;

macro_rules! binary_ops {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)+) => {
        $(
            $(#[$doc])*
            pub fn $name(&self, other: &Value) -> Result<Value> {
                self.binary(BinaryOp::$op, other)
            }
        )+
    };
}

macro_rules! unary_ops {
    ($($name:ident => $op:ident),+ $(,)?) => {
        $(
            pub fn $name(&self) -> Result<Value> {
                self.apply(Kernel::Unary(UnaryOp::$op))
            }
        )+
    };
}

macro_rules! single_operand_ops {
    ($($(#[$doc:meta])* $name:ident => $kernel:ident;)+) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) -> Result<Value> {
                self.apply(Kernel::$kernel)
            }
        )+
    };
}

impl Value {
    // ============================================================================================
    // Elementwise
    // ============================================================================================

    binary_ops! {
        /// Elementwise sum. A scalar operand broadcasts; otherwise element
        /// counts must match, and two matrices must match in shape.
        add => Add;
        sub => Sub;
        mul => Mul;
        /// IEEE-754 division: `x / 0` is `±inf`, `0 / 0` is NaN
        div => Div;
        pow => Pow;
        /// Elementwise minimum; NaN propagates
        min => Min;
        max => Max;
    }

    unary_ops! {
        neg => Neg,
        abs => Abs,
        sqrt => Sqrt,
        ln => Ln,
        log10 => Log10,
        exp => Exp,
        sin => Sin,
        cos => Cos,
        tan => Tan,
        asin => Asin,
        acos => Acos,
        atan => Atan,
        sinh => Sinh,
        cosh => Cosh,
        tanh => Tanh,
        floor => Floor,
        ceil => Ceil,
        round => Round,
    }

    /// Multiply every element by `factor`
    pub fn scale(&self, factor: f64) -> Result<Value> {
        self.invoke(Kernel::Scale, &[Operand::Handle(self.ensure_live()?), Operand::Scalar(factor)])
    }

    // ============================================================================================
    // Spectral
    // ============================================================================================

    single_operand_ops! {
        /// Discrete Fourier transform of any length; returns a complex value
        fft => Fft;
        /// Inverse transform, scaled by `1/n`
        ifft => Ifft;
        fft_mag => FftMag;
        fft_phase => FftPhase;
        /// Rotate so the zero-frequency bin sits in the middle
        fftshift => FftShift;
        ifftshift => IfftShift;
    }

    /// Full linear convolution (`len(self) + len(kernel) - 1` samples)
    pub fn conv(&self, kernel: &Value) -> Result<Value> {
        self.pair(Kernel::Conv, kernel)
    }

    // ============================================================================================
    // Reductions and linear algebra
    // ============================================================================================

    single_operand_ops! {
        /// Sum of elements as a scalar
        sum => Sum;
        /// Arithmetic mean as a scalar; NaN for an empty value
        mean => Mean;
        /// Euclidean norm as a scalar
        norm => Norm;
        transpose => Transpose;
        /// Copy into a fresh handle
        duplicate => Copy;
    }

    /// Inner product as a scalar
    pub fn dot(&self, other: &Value) -> Result<Value> {
        self.pair(Kernel::Dot, other)
    }

    /// Matrix product; `other` may be a matrix or a vector
    pub fn matmul(&self, other: &Value) -> Result<Value> {
        self.pair(Kernel::Matmul, other)
    }

    // ============================================================================================
    // Higher-order
    // ============================================================================================

    /// Apply a lambda such as `x => x * 2` to every element
    pub fn map(&self, lambda: &str) -> Result<Value> {
        let handle = self.ensure_live()?;
        self.evaluate(&format!("map({lambda}, {handle})"))
    }

    /// Keep elements for which `predicate` is non-zero
    pub fn filter(&self, predicate: &str) -> Result<Value> {
        let handle = self.ensure_live()?;
        self.evaluate(&format!("filter({predicate}, {handle})"))
    }

    /// Fold with a two-argument lambda such as `(acc, x) => acc + x`
    pub fn reduce(&self, lambda: &str, initial: f64) -> Result<Value> {
        let handle = self.ensure_live()?;
        self.evaluate(&format!("reduce({lambda}, {}, {handle})", literal::number(initial)))
    }

    // ============================================================================================
    // Plumbing
    // ============================================================================================

    fn binary(&self, op: BinaryOp, other: &Value) -> Result<Value> {
        self.pair(Kernel::Binary(op), other)
    }

    fn pair(&self, kernel: Kernel, other: &Value) -> Result<Value> {
        let lhs = self.ensure_live()?;
        let rhs = self.ensure_compatible(other)?;
        let result = self.invoke(kernel, &[Operand::Handle(lhs), Operand::Handle(rhs)]);
        other.guard(result)
    }

    fn apply(&self, kernel: Kernel) -> Result<Value> {
        self.invoke(kernel, &[Operand::Handle(self.ensure_live()?)])
    }

    fn invoke(&self, kernel: Kernel, operands: &[Operand]) -> Result<Value> {
        let registered = self.guard(self.runtime.invoke(kernel, operands))?;
        Ok(self.derive(registered))
    }

    fn evaluate(&self, expression: &str) -> Result<Value> {
        let registered = self.guard(self.runtime.eval(expression))?;
        Ok(self.derive(registered))
    }
}
