//! Exact symbolic algebra over named symbols.
//!
//! The layer is scoped to rational expressions with integer powers:
//! - **Expr**: expression trees with substitution, simplification and display.
//! - **Poly**: expanded multivariate polynomials with rational coefficients.
//! - **RationalFunction**: factored quotients of polynomials with exact zero tests.
//! - **solve**: elimination solver for polynomial systems.

pub mod expr;
pub mod poly;
pub mod rational;
pub mod solve;

pub use expr::Expr;
pub use poly::{Monomial, Poly};
pub use rational::RationalFunction;
pub use solve::{solve_system, Solution, SolveSettings};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolicError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unknown variable or parameter: {0}")]
    UnknownSymbol(String),
    #[error("Division by zero while evaluating {0}")]
    DivisionByZero(String),
    #[error("Unsupported equation: {0}")]
    Unsupported(String),
    #[error("Elimination exceeded the maximum depth of {0}")]
    DepthExceeded(usize),
}
