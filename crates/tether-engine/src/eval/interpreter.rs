//! Tree-walking evaluator
//!
//! Operators and named functions dispatch to the same kernels as the fast
//! path ([`crate::kernels::execute`]), so both representations agree on the
//! mathematics. Higher-order functions (`map`, `filter`, `reduce`, `pipe`)
//! iterate element by element over real or complex collections.
//!
//! An evaluator starts from a set of globals. Programs extend them with
//! `let`; the engine keeps the result between calls.

use super::ast::{Expr, Statement};
use crate::error::{EngineError, Result};
use crate::kernels::{self, Dense, Kernel, UnaryOp};
use crate::types::{Handle, Shape};
use rustfft::num_complex::Complex64;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_CALL_DEPTH: usize = 256;

const HIGHER_ORDER: &[&str] = &["map", "filter", "reduce", "pipe"];

/// Variables visible to an expression
pub type Scope = Arc<HashMap<String, Value>>;

/// Callable value
#[derive(Debug, Clone)]
pub enum Function {
    Lambda {
        params: Vec<String>,
        body: Arc<Expr>,
        scope: Scope,
    },
    /// A named builtin used as a value, e.g. `pipe(v, fft, fft_mag)`
    Builtin(String),
}

/// Runtime value of an expression
#[derive(Debug, Clone)]
pub enum Value {
    Data(Dense),
    Function(Function),
}

impl Value {
    fn into_data(self, context: &str) -> Result<Dense> {
        match self {
            Value::Data(dense) => Ok(dense),
            Value::Function(_) => Err(EngineError::invalid(format!("{context}: expected data, got a function"))),
        }
    }

    fn into_function(self, context: &str) -> Result<Function> {
        match self {
            Value::Function(function) => Ok(function),
            Value::Data(dense) => Err(EngineError::invalid(format!(
                "{context}: expected a function, got {}",
                dense.shape
            ))),
        }
    }
}

/// Resolves `$N` references against live engine values
pub type Resolver<'r> = dyn Fn(Handle) -> Result<Dense> + 'r;

/// Expression evaluator
pub struct Evaluator<'r> {
    resolve: &'r Resolver<'r>,
    globals: Scope,
    depth: usize,
}

impl<'r> Evaluator<'r> {
    pub fn new(resolve: &'r Resolver<'r>) -> Self {
        Self::with_globals(resolve, Scope::default())
    }

    pub fn with_globals(resolve: &'r Resolver<'r>, globals: Scope) -> Self {
        Self {
            resolve,
            globals,
            depth: 0,
        }
    }

    /// Globals as extended by the `let` statements run so far
    pub fn into_globals(self) -> Scope {
        self.globals
    }

    /// Evaluate an expression to data
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Dense> {
        let scope = Arc::clone(&self.globals);
        self.eval(expr, &scope)?.into_data("expression result")
    }

    /// Run statements in order and return the value of the last one
    ///
    /// Each `let` binds as soon as it runs; a later failure keeps earlier
    /// bindings.
    pub fn run(&mut self, program: &[Statement]) -> Result<Dense> {
        let mut last = None;
        for statement in program {
            let value = match statement {
                Statement::Let { name, value } => {
                    let value = self.eval(value, &Arc::clone(&self.globals))?;
                    Arc::make_mut(&mut self.globals).insert(name.clone(), value.clone());
                    value
                }
                Statement::Expr(expr) => self.eval(expr, &Arc::clone(&self.globals))?,
            };
            last = Some(value);
        }
        last.ok_or_else(|| EngineError::invalid("empty program"))?
            .into_data("program result")
    }

    fn eval(&mut self, expr: &Expr, scope: &Scope) -> Result<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Data(Dense::scalar(*n))),
            Expr::Ident(name) => self.lookup(name, scope),
            Expr::Handle(id) => (self.resolve)(Handle::new(*id)).map(Value::Data),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, scope)?.into_data("list element"))
                    .collect::<Result<Vec<_>>>()?;
                build_list(values).map(Value::Data)
            }
            Expr::Neg(inner) => {
                let value = self.eval(inner, scope)?.into_data("negation")?;
                kernels::execute(Kernel::Unary(UnaryOp::Neg), &[value.borrowed()]).map(Value::Data)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, scope)?.into_data("operator")?;
                let rhs = self.eval(rhs, scope)?.into_data("operator")?;
                kernels::execute(Kernel::Binary(*op), &[lhs.borrowed(), rhs.borrowed()]).map(Value::Data)
            }
            Expr::Call { name, args } => self.call(name, args, scope),
            Expr::Lambda { params, body } => Ok(Value::Function(Function::Lambda {
                params: params.clone(),
                body: Arc::clone(body),
                scope: Arc::clone(scope),
            })),
        }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Result<Value> {
        if let Some(value) = scope.get(name) {
            return Ok(value.clone());
        }
        let constant = match name {
            "pi" => std::f64::consts::PI,
            "e" => std::f64::consts::E,
            "inf" => f64::INFINITY,
            "nan" => f64::NAN,
            _ if is_builtin(name) => return Ok(Value::Function(Function::Builtin(name.to_string()))),
            _ => return Err(EngineError::invalid(format!("undefined variable '{name}'"))),
        };
        Ok(Value::Data(Dense::scalar(constant)))
    }

    fn call(&mut self, name: &str, args: &[Expr], scope: &Scope) -> Result<Value> {
        if let Some(Value::Function(function)) = scope.get(name).cloned() {
            let args = self.eval_all(args, scope)?;
            return self.apply(&function, args);
        }
        if !is_builtin(name) {
            return Err(EngineError::UnknownFunction(name.to_string()));
        }
        let args = self.eval_all(args, scope)?;
        self.apply(&Function::Builtin(name.to_string()), args)
    }

    fn eval_all(&mut self, args: &[Expr], scope: &Scope) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, scope)).collect()
    }

    /// Apply a function to evaluated arguments
    pub fn apply(&mut self, function: &Function, args: Vec<Value>) -> Result<Value> {
        match function {
            Function::Lambda { params, body, scope } => {
                if params.len() != args.len() {
                    return Err(EngineError::invalid(format!(
                        "lambda takes {} argument(s), got {}",
                        params.len(),
                        args.len()
                    )));
                }
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(EngineError::invalid("call depth exceeded"));
                }

                let mut inner = HashMap::clone(scope);
                for (param, arg) in params.iter().zip(args) {
                    inner.insert(param.clone(), arg);
                }

                self.depth += 1;
                let result = self.eval(body, &Arc::new(inner));
                self.depth -= 1;
                result
            }
            Function::Builtin(name) => self.apply_builtin(name, args),
        }
    }

    fn apply_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "map" => self.map(args),
            "filter" => self.filter(args),
            "reduce" => self.reduce(args),
            "pipe" => self.pipe(args),
            "complex" => {
                let [re, im] = scalars::<2>(name, args)?;
                Ok(Value::Data(Dense::complex(&[Complex64::new(re, im)])))
            }
            _ => {
                let kernel = Kernel::from_name(name).ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
                let data = args
                    .into_iter()
                    .map(|arg| arg.into_data(name))
                    .collect::<Result<Vec<_>>>()?;
                let refs: Vec<_> = data.iter().map(Dense::borrowed).collect();
                kernels::execute(kernel, &refs).map(Value::Data)
            }
        }
    }

    /// `map(f, coll1, coll2, ...)`, truncating to the shortest collection
    fn map(&mut self, args: Vec<Value>) -> Result<Value> {
        if args.len() < 2 {
            return Err(EngineError::invalid("map requires a function and at least one collection"));
        }
        let mut args = args.into_iter();
        let function = next(&mut args)?.into_function("map")?;
        let inputs = args.map(|arg| arg.into_data("map")).collect::<Result<Vec<_>>>()?;
        let collections: Vec<Vec<Dense>> = inputs.iter().map(elements).collect();

        let len = collections.iter().map(Vec::len).min().unwrap_or(0);
        let mut results = Vec::with_capacity(len);
        for i in 0..len {
            let call_args = collections.iter().map(|c| Value::Data(c[i].clone())).collect();
            results.push(self.apply(&function, call_args)?.into_data("map result")?);
        }

        // real scalars over identically shaped inputs keep that shape
        let shape = inputs[0].shape;
        let keeps_shape = !shape.is_complex()
            && len == shape.element_count()
            && inputs.iter().all(|input| input.shape == shape)
            && results.iter().all(|result| result.shape == Shape::Scalar);
        if keeps_shape {
            let data = results.into_iter().map(|result| result.data[0]).collect();
            return Dense::new(shape, data).map(Value::Data);
        }
        build_list(results).map(Value::Data)
    }

    /// `filter(predicate, collection)`, keeping elements whose predicate is non-zero
    fn filter(&mut self, args: Vec<Value>) -> Result<Value> {
        let [predicate, collection] = exactly::<2>("filter", args)?;
        let predicate = predicate.into_function("filter")?;
        let collection = collection.into_data("filter")?;

        let mut kept = Vec::new();
        for element in elements(&collection) {
            let verdict = self.apply(&predicate, vec![Value::Data(element.clone())])?;
            let verdict = verdict.into_data("filter predicate")?;
            if verdict.shape != Shape::Scalar {
                return Err(EngineError::invalid("filter predicate must return a real scalar"));
            }
            if verdict.data[0] != 0.0 {
                kept.push(element);
            }
        }

        if collection.shape.is_complex() {
            let values: Vec<Complex64> = kept.iter().flat_map(|d| d.borrowed().to_complex()).collect();
            return Ok(Value::Data(Dense::complex(&values)));
        }
        build_list(kept).map(Value::Data)
    }

    /// `reduce(f, init, collection)`
    fn reduce(&mut self, args: Vec<Value>) -> Result<Value> {
        let [function, init, collection] = exactly::<3>("reduce", args)?;
        let function = function.into_function("reduce")?;
        let collection = collection.into_data("reduce")?;

        let mut accumulator = init;
        for element in elements(&collection) {
            accumulator = self.apply(&function, vec![accumulator, Value::Data(element)])?;
        }
        Ok(accumulator)
    }

    /// `pipe(value, f1, f2, ...)` applies functions left to right
    fn pipe(&mut self, args: Vec<Value>) -> Result<Value> {
        if args.len() < 2 {
            return Err(EngineError::invalid("pipe requires a value and at least one function"));
        }
        let mut args = args.into_iter();
        let mut current = next(&mut args)?;
        for stage in args {
            let function = stage.into_function("pipe")?;
            current = self.apply(&function, vec![current])?;
        }
        Ok(current)
    }
}

fn is_builtin(name: &str) -> bool {
    name == "complex" || HIGHER_ORDER.contains(&name) || Kernel::from_name(name).is_some()
}

fn next(args: &mut impl Iterator<Item = Value>) -> Result<Value> {
    args.next().ok_or_else(|| EngineError::invalid("missing argument"))
}

fn exactly<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N]> {
    let count = args.len();
    args.try_into()
        .map_err(|_| EngineError::invalid(format!("{name} takes {N} argument(s), got {count}")))
}

fn scalars<const N: usize>(name: &str, args: Vec<Value>) -> Result<[f64; N]> {
    let args = exactly::<N>(name, args)?;
    let mut out = [0.0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.into_data(name)?.borrowed().as_scalar()?;
    }
    Ok(out)
}

/// Split a value into per-element scalars (complex scalars for complex data)
fn elements(value: &Dense) -> Vec<Dense> {
    if value.shape.is_complex() {
        value
            .borrowed()
            .to_complex()
            .into_iter()
            .map(|z| Dense::complex(&[z]))
            .collect()
    } else {
        value.data.iter().map(|&x| Dense::scalar(x)).collect()
    }
}

/// Assemble list elements into a vector, complex vector or matrix
pub fn build_list(items: Vec<Dense>) -> Result<Dense> {
    let Some(first) = items.first() else {
        return Ok(Dense::vector(Vec::new()));
    };

    if items.iter().all(|item| item.shape == Shape::Scalar) {
        return Ok(Dense::vector(items.into_iter().map(|item| item.data[0]).collect()));
    }

    if items
        .iter()
        .all(|item| matches!(item.shape, Shape::Scalar | Shape::Complex(1)))
    {
        let values: Vec<Complex64> = items.iter().flat_map(|item| item.borrowed().to_complex()).collect();
        return Ok(Dense::complex(&values));
    }

    if let Shape::Vector(cols) = first.shape {
        if items.iter().all(|item| item.shape == Shape::Vector(cols)) {
            let rows = items.len();
            let data = items.into_iter().flat_map(|item| item.data).collect();
            return Dense::new(Shape::Matrix { rows, cols }, data);
        }
    }

    Err(EngineError::invalid(
        "list elements must be scalars or rows of equal length",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::parser::{parse, parse_program};

    fn run(text: &str) -> Result<Dense> {
        let resolve = |handle: Handle| -> Result<Dense> {
            match handle.id() {
                1 => Ok(Dense::vector(vec![1.0, 2.0, 3.0, 4.0])),
                _ => Err(EngineError::InvalidHandle(handle)),
            }
        };
        let expr = parse(text)?;
        Evaluator::new(&resolve).evaluate(&expr)
    }

    #[test]
    fn test_arithmetic_and_constants() {
        assert_eq!(run("1 + 2 * 3").unwrap(), Dense::scalar(7.0));
        assert_eq!(run("-2^2").unwrap(), Dense::scalar(-4.0));
        assert_eq!(run("7 % 4").unwrap(), Dense::scalar(3.0));
        assert!((run("cos(pi)").unwrap().data[0] + 1.0).abs() < 1e-12);
        assert!(run("nan + 1").unwrap().data[0].is_nan());
    }

    #[test]
    fn test_matrix_literal() {
        let m = run("[[1, 2, 3], [4, 5, 6]]").unwrap();
        assert_eq!(m.shape, Shape::Matrix { rows: 2, cols: 3 });
        assert!(run("[[1, 2], [3]]").is_err());
    }

    #[test]
    fn test_map_filter_reduce_pipe() {
        assert_eq!(run("map(x => x * 10, $1)").unwrap().data, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(run("map((a, b) => a + b, [1, 2, 3], [10, 20])").unwrap().data, vec![11.0, 22.0]);
        assert_eq!(run("filter(x => x > 2, $1)").unwrap().data, vec![3.0, 4.0]);
        assert_eq!(run("reduce((acc, x) => acc + x, 0, $1)").unwrap(), Dense::scalar(10.0));
        assert_eq!(run("pipe($1, sum, sqrt)").unwrap(), Dense::scalar(10f64.sqrt()));
        assert_eq!(run("pipe(4, x => x + 1, x => x * 2)").unwrap(), Dense::scalar(10.0));
    }

    #[test]
    fn test_map_keeps_input_shape() {
        let m = run("map(x => x * 2, [[1, 2], [3, 4]])").unwrap();
        assert_eq!(m.shape, Shape::Matrix { rows: 2, cols: 2 });
        assert_eq!(m.data, vec![2.0, 4.0, 6.0, 8.0]);

        let summed = run("map((a, b) => a + b, [[1, 2]], [[10, 20]])").unwrap();
        assert_eq!(summed.shape, Shape::Matrix { rows: 1, cols: 2 });

        // truncation and non-scalar results fall back to list assembly
        assert_eq!(run("map((a, b) => a + b, [[1, 2], [3, 4]], [1, 2])").unwrap().shape, Shape::Vector(2));
        assert_eq!(run("map(x => [x, x], [1, 2])").unwrap().shape, Shape::Matrix { rows: 2, cols: 2 });
        assert_eq!(run("map(x => x, 5)").unwrap(), Dense::scalar(5.0));
    }

    #[test]
    fn test_filter_can_empty_a_collection() {
        let out = run("filter(x => x > 100, $1)").unwrap();
        assert_eq!(out.shape, Shape::Vector(0));
    }

    #[test]
    fn test_closures_capture_scope() {
        assert_eq!(run("map(x => map(y => x * y, [1, 2]), [1, 3])").unwrap().data, vec![1.0, 2.0, 3.0, 6.0]);
    }

    #[test]
    fn test_complex_values() {
        let z = run("complex(1, 2) * complex(1, -2)").unwrap();
        assert_eq!(z.shape, Shape::Complex(1));
        assert_eq!(z.data, vec![5.0, 0.0]);
        let zs = run("[complex(1, 1), 2]").unwrap();
        assert_eq!(zs.shape, Shape::Complex(2));
    }

    #[test]
    fn test_program_bindings_persist() {
        let resolve = |handle: Handle| -> Result<Dense> { Err(EngineError::InvalidHandle(handle)) };
        let first = parse_program("let k = 3; let triple = x => x * k; triple(2)").unwrap();
        let mut evaluator = Evaluator::new(&resolve);
        assert_eq!(evaluator.run(&first).unwrap(), Dense::scalar(6.0));

        let globals = evaluator.into_globals();
        let second = parse_program("map(triple, [1, k])").unwrap();
        let mut evaluator = Evaluator::with_globals(&resolve, Arc::clone(&globals));
        assert_eq!(evaluator.run(&second).unwrap().data, vec![3.0, 9.0]);

        // the bound value is the result of a trailing let
        let mut evaluator = Evaluator::with_globals(&resolve, globals);
        assert_eq!(evaluator.run(&parse_program("let k = k + 1").unwrap()).unwrap(), Dense::scalar(4.0));
        assert!(evaluator.into_globals().contains_key("k"));
    }

    #[test]
    fn test_failed_program_keeps_earlier_bindings() {
        let resolve = |handle: Handle| -> Result<Dense> { Err(EngineError::InvalidHandle(handle)) };
        let mut evaluator = Evaluator::new(&resolve);
        assert!(evaluator.run(&parse_program("let a = 1; a + [1, 2] + [1, 2, 3]").unwrap()).is_err());
        assert!(evaluator.run(&parse_program("let f = x => x").unwrap()).is_err());

        let globals = evaluator.into_globals();
        assert!(globals.contains_key("a"));
        assert!(globals.contains_key("f"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(run("frobnicate(1)"), Err(EngineError::UnknownFunction(_))));
        assert!(matches!(run("$9"), Err(EngineError::InvalidHandle(_))));
        assert!(run("map(x => x, 3, 4, 5)").is_err());
        assert!(run("x => x").is_err());
        assert!(matches!(run("[1, 2] + [1, 2, 3]"), Err(EngineError::DimensionMismatch { .. })));
    }
}
