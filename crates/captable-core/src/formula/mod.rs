//! Expression trees, formula encodings and the resolver.

mod encoding;
mod expr;

pub use encoding::{DependencyRef, FormulaEncoding, OutputStyle, RefBindings, Resolved};
pub use expr::{BinaryOp, EvalError, Expr, Function};
