//! Symbolic algebra used by the observability analysis
//!
//! Canonical expressions, differentiation, substitution, and exact matrix
//! rank/nullspace over the expressions.

pub mod expr;
pub mod matrix;
pub mod parse;

pub use expr::{symbols, Expr, Func, Symbol};
pub use matrix::SymMatrix;
pub use parse::{parse_expr, ParseError};
