//! Expression micro-language
//!
//! Slow-path values live as expression text and are evaluated on demand.
//! The language covers numbers, vector and matrix literals, arithmetic and
//! comparison operators, function calls, `$N` handle references, lambdas and
//! the higher-order functions `map`, `filter`, `reduce` and `pipe`. Engine
//! `eval` accepts whole programs: `;`-separated statements where `let` binds
//! a name for later statements and later calls.
//!
//! ```text
//! [1, 2, 3] * 2
//! [[1, 0], [0, 1]]
//! map(x => x ^ 2, $4)
//! reduce((acc, x) => acc + x, 0, filter(x => x > 0, $7))
//! let gain = 0.5; let damp = x => x * gain; map(damp, $2)
//! ```

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod literal;
pub mod parser;

pub use ast::Statement;
pub use interpreter::{Evaluator, Resolver, Scope};
pub use parser::{parse, parse_program};

use crate::error::Result;
use crate::kernels::Dense;

/// Parse and evaluate expression text
pub fn evaluate(text: &str, resolve: &Resolver<'_>) -> Result<Dense> {
    let expr = parse(text)?;
    Evaluator::new(resolve).evaluate(&expr)
}
