pub mod autodiff;
pub mod dashboard;
pub mod equation_engine;
pub mod equilibrium;
pub mod jacobian;
pub mod model;
pub mod simulation;
pub mod solvers;
pub mod symbolic;
/// The `dengue_core` crate implements the SEIR-SI dengue transmission model and
/// the analyses run on it.
/// The model is generic over the scalar type, supporting both `f64` and Dual numbers.
///
/// Key components:
/// - **Model**: state layout, parameters and the seven-equation right-hand side.
/// - **Symbolic**: exact rational expressions and an elimination solver for equilibria.
/// - **Jacobian / Equilibrium**: symbolic linearization (via RustedSciThe) and critical points, plus Newton refinement.
/// - **Solvers**: fixed-step RK4 and adaptive DOP853 (ode_solvers); `simulation` drives them over sample times.
/// - **Dashboard**: slider state and Plotly figures for the interactive front-end.
pub mod traits;
