//! Abstract syntax tree for expressions

use crate::kernels::BinaryOp;
use std::fmt;
use std::sync::Arc;

/// Parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Variable, constant or function name
    Ident(String),
    /// `$N` reference to a live engine value
    Handle(u32),
    /// `[a, b, ...]`; nested lists of equal length form a matrix
    List(Vec<Expr>),
    /// Unary minus
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `x => body` or `(a, b) => body`
    Lambda {
        params: Vec<String>,
        body: Arc<Expr>,
    },
}

/// One statement of a program
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value`, binding into the persistent environment
    Let { name: String, value: Expr },
    Expr(Expr),
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

fn operator_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Pow => "^",
        BinaryOp::Mod => "%",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Min => "min",
        BinaryOp::Max => "max",
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n:?}"),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Handle(id) => write!(f, "${id}"),
            Expr::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expr::Neg(inner) => write!(f, "-({inner})"),
            Expr::Binary { op: op @ (BinaryOp::Min | BinaryOp::Max), lhs, rhs } => {
                write!(f, "{}({lhs}, {rhs})", operator_symbol(*op))
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", operator_symbol(*op)),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Lambda { params, body } => write!(f, "({}) => {body}", params.join(", ")),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {name} = {value}"),
            Statement::Expr(expr) => write!(f, "{expr}"),
        }
    }
}
