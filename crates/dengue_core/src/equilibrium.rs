use crate::autodiff::forward_jacobian;
use crate::model::{state_symbols, symbolic_equations, Compartment, DengueModel, VectorDenominator};
use crate::symbolic::{solve_system, Expr, RationalFunction, Solution, SolveSettings};
use crate::traits::DynamicalSystem;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use nalgebra::{Complex, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A critical point of the symbolic system: every unknown mapped to an exact
/// expression in the parameters (or to itself when left free).
#[derive(Debug, Clone)]
pub struct EquilibriumPoint {
    solution: Solution,
}

/// Serializable form of an `EquilibriumPoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumSummary {
    pub assignments: Vec<(String, String)>,
    pub free: Vec<String>,
    pub disease_free: bool,
}

impl EquilibriumPoint {
    pub fn get(&self, name: &str) -> Option<&RationalFunction> {
        self.solution.get(name)
    }

    pub fn assignments(&self) -> impl Iterator<Item = (&str, &RationalFunction)> {
        self.solution.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Unknowns the system leaves undetermined.
    pub fn free_variables(&self) -> &[String] {
        &self.solution.free
    }

    /// Header, one `variable: expression` line per unknown, then a blank line.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.solution.values.len() + 2);
        lines.push("Punto crítico encontrado:".to_string());
        for (name, value) in self.assignments() {
            lines.push(format!("{name}: {value}"));
        }
        lines.push(String::new());
        lines
    }

    /// True when every exposed and infected compartment is exactly zero.
    pub fn is_disease_free(&self) -> bool {
        Compartment::ALL
            .iter()
            .filter(|c| c.is_infectious())
            .all(|c| self.get(c.name()).map_or(false, RationalFunction::is_zero))
    }

    /// Numeric values of the assignments, in unknown order.
    pub fn evaluate(&self, values: &HashMap<String, f64>) -> Result<Vec<f64>> {
        self.assignments()
            .map(|(name, value)| {
                value
                    .evaluate(values)
                    .with_context(|| format!("Failed to evaluate equilibrium value of {name}."))
            })
            .collect()
    }

    pub fn summary(&self) -> EquilibriumSummary {
        EquilibriumSummary {
            assignments: self
                .assignments()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            free: self.solution.free.clone(),
            disease_free: self.is_disease_free(),
        }
    }
}

/// Solves `equations = 0` for `unknowns`, every other symbol being a free
/// parameter. Each returned point satisfies all equations exactly.
pub fn solve_equilibria(equations: &[Expr], unknowns: &[String]) -> Result<Vec<EquilibriumPoint>> {
    let system = equations
        .iter()
        .enumerate()
        .map(|(idx, eq)| {
            RationalFunction::from_expr(eq)
                .with_context(|| format!("Failed to convert equation {idx} to a rational function."))
        })
        .collect::<Result<Vec<_>>>()?;

    let solutions = solve_system(&system, unknowns, SolveSettings::default())
        .context("Symbolic equilibrium solve failed.")?;
    info!("Found {} equilibrium point(s).", solutions.len());

    Ok(solutions
        .into_iter()
        .map(|solution| EquilibriumPoint { solution })
        .collect())
}

/// Equilibria of the seven dengue equations with all parameters free.
pub fn dengue_equilibria(denominator: VectorDenominator) -> Result<Vec<EquilibriumPoint>> {
    let equations = symbolic_equations(denominator).context("Failed to build model equations.")?;
    solve_equilibria(&equations, &state_symbols())
}

// --- Numeric equilibria ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericEquilibrium {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major Jacobian at `state`.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<Complex<f64>>,
    /// All eigenvalues have negative real part.
    pub stable: bool,
}

/// Damped Newton iteration on the numeric right-hand side, followed by an
/// eigenvalue analysis of the Jacobian at the converged point.
pub fn locate_equilibrium(
    model: &DengueModel,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<NumericEquilibrium> {
    let dim = DynamicalSystem::<f64>::dimension(model);
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if settings.damping <= 0.0 {
        bail!("damping must be positive.");
    }
    if settings.tolerance <= 0.0 {
        bail!("tolerance must be positive.");
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    let mut residual_norm = evaluate_residual(model, &state, &mut residual)?;
    let mut iterations = 0usize;

    while residual_norm > settings.tolerance {
        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                settings.max_steps,
                residual_norm
            );
        }

        let jacobian = forward_jacobian(model, 0.0, &state);
        let delta = solve_linear_system(dim, &jacobian, &residual)
            .context("Failed to solve linear system during Newton iteration.")?;
        for (x, d) in state.iter_mut().zip(delta.iter()) {
            *x -= settings.damping * d;
        }

        iterations += 1;
        residual_norm = evaluate_residual(model, &state, &mut residual)?;
        debug!("Newton iteration {}: ‖f(x)‖ = {:e}", iterations, residual_norm);
    }

    let jacobian = forward_jacobian(model, 0.0, &state);
    let eigenvalues = DMatrix::from_row_slice(dim, dim, &jacobian)
        .complex_eigenvalues()
        .iter()
        .copied()
        .collect::<Vec<_>>();
    let stable = eigenvalues.iter().all(|l| l.re < 0.0);

    Ok(NumericEquilibrium {
        state,
        residual_norm,
        iterations,
        jacobian,
        eigenvalues,
        stable,
    })
}

fn evaluate_residual(model: &DengueModel, state: &[f64], out: &mut [f64]) -> Result<f64> {
    model.apply(0.0, state, out);
    let norm = out.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !norm.is_finite() {
        bail!("Residual is not finite at {:?}; a population total may be zero.", state);
    }
    Ok(norm)
}

fn solve_linear_system(dim: usize, jacobian: &[f64], residual: &[f64]) -> Result<Vec<f64>> {
    let j_matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let rhs = DVector::from_column_slice(residual);
    j_matrix
        .lu()
        .solve(&rhs)
        .map(|v| v.iter().copied().collect())
        .ok_or_else(|| anyhow!("Jacobian is singular."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::parse;
    use crate::model::{DengueParams, STATE_NAMES};

    fn substitute_all(point: &EquilibriumPoint, equation: &Expr) -> RationalFunction {
        let mut value = RationalFunction::from_expr(equation).expect("equation should convert");
        for (name, replacement) in point.assignments() {
            if point.free_variables().iter().any(|f| f == name) {
                continue;
            }
            value = value
                .substitute(name, replacement)
                .expect("equilibrium should not zero a denominator");
        }
        value
    }

    #[test]
    fn every_equilibrium_zeroes_all_equations() {
        for denominator in [
            VectorDenominator::VectorPopulation,
            VectorDenominator::HumanPopulation,
        ] {
            let equations = symbolic_equations(denominator).expect("equations should parse");
            let points = dengue_equilibria(denominator).expect("equilibria should solve");
            assert!(!points.is_empty());
            for point in &points {
                for (idx, equation) in equations.iter().enumerate() {
                    let residual = substitute_all(point, equation);
                    assert!(residual.is_zero(), "equation {idx} leaves {residual}");
                }
            }
        }
    }

    #[test]
    fn finds_disease_free_and_endemic_points() {
        let points = dengue_equilibria(VectorDenominator::VectorPopulation).expect("equilibria should solve");
        assert_eq!(points.len(), 2);

        let disease_free: Vec<&EquilibriumPoint> = points.iter().filter(|p| p.is_disease_free()).collect();
        assert_eq!(disease_free.len(), 1);
        let dfe = disease_free[0];
        assert_eq!(dfe.get("S_H").expect("S_H should be solved").to_string(), "Lambda_H/mu_H");
        assert_eq!(dfe.get("S_V").expect("S_V should be solved").to_string(), "Lambda_V/mu_V");
        assert!(dfe.get("R_H").expect("R_H should be solved").is_zero());
        assert!(dfe.free_variables().is_empty());

        let lines = dfe.report_lines();
        assert_eq!(lines[0], "Punto crítico encontrado:");
        assert_eq!(lines[1], "S_H: Lambda_H/mu_H");
        assert_eq!(lines[2], "E_H: 0");
        assert_eq!(lines.len(), STATE_NAMES.len() + 2);
        assert_eq!(lines[lines.len() - 1], "");
    }

    #[test]
    fn reduced_disease_free_system_has_unique_solution() {
        let mut zeros = HashMap::new();
        for name in ["E_H", "I_RH", "I_DH", "I_V"] {
            zeros.insert(name.to_string(), Expr::zero());
        }
        let equations = symbolic_equations(VectorDenominator::VectorPopulation).expect("equations should parse");
        let reduced: Vec<Expr> = [0, 5]
            .iter()
            .map(|&i| equations[i].substitute(&zeros).simplify())
            .collect();
        assert_eq!(reduced[0].to_string(), parse("Lambda_H - mu_H*S_H").expect("parse").simplify().to_string());

        let unknowns = vec!["S_H".to_string(), "S_V".to_string()];
        let points = solve_equilibria(&reduced, &unknowns).expect("reduced system should solve");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].get("S_H").expect("S_H").to_string(), "Lambda_H/mu_H");
        assert_eq!(points[0].get("S_V").expect("S_V").to_string(), "Lambda_V/mu_V");
    }

    #[test]
    fn evaluate_substitutes_parameter_values() {
        let points = dengue_equilibria(VectorDenominator::VectorPopulation).expect("equilibria should solve");
        let dfe = points.iter().find(|p| p.is_disease_free()).expect("disease-free point");
        let mut values: HashMap<String, f64> = DengueParams::default()
            .named_values()
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect();
        values.insert("N_H".to_string(), 500.0);
        values.insert("N_V".to_string(), 200.0);
        let state = dfe.evaluate(&values).expect("point should evaluate");
        assert!((state[0] - 500.0).abs() < 1e-9);
        assert!((state[5] - 200.0).abs() < 1e-9);
        assert!(dfe.summary().disease_free);
    }

    #[test]
    fn newton_converges_to_unstable_disease_free_state() {
        let model = DengueModel::new(DengueParams::default(), VectorDenominator::VectorPopulation);
        let guess = [505.0, 0.0, 0.0, 0.0, 3.0, 198.0, 0.0];
        let result = locate_equilibrium(&model, &guess, NewtonSettings::default())
            .expect("newton should converge");
        assert!(result.residual_norm <= 1e-9);
        assert!((result.state[0] - 500.0).abs() < 1e-6);
        assert!((result.state[5] - 200.0).abs() < 1e-6);
        assert!(result.state[4].abs() < 1e-6);
        assert_eq!(result.eigenvalues.len(), 7);
        // Transmission outpaces recovery at the default rates.
        assert!(!result.stable);
        assert!(result.eigenvalues.iter().any(|l| l.re > 0.0));
    }

    #[test]
    fn newton_rejects_collapsed_populations() {
        let model = DengueModel::new(DengueParams::default(), VectorDenominator::VectorPopulation);
        let err = locate_equilibrium(&model, &[0.0; 7], NewtonSettings::default())
            .expect_err("zero populations should fail");
        assert!(err.to_string().contains("not finite"), "unexpected error: {err}");

        let err = locate_equilibrium(&model, &[1.0; 3], NewtonSettings::default())
            .expect_err("wrong dimension should fail");
        assert!(err.to_string().contains("dimension mismatch"), "unexpected error: {err}");
    }
}
