use crate::model::{rhs_expressions, state_symbols, VectorDenominator};
use anyhow::{anyhow, ensure, Result};
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use RustedSciThe::symbolic::symbolic_engine::Expr;
use RustedSciThe::symbolic::symbolic_functions::Jacobian;

/// Matrix of partial derivatives `J[i][j] = d(eq_i)/d(var_j)`.
#[derive(Debug, Clone)]
pub struct SymbolicJacobian {
    variables: Vec<String>,
    /// Symbols other than `variables` that appear in some entry, sorted.
    parameters: Vec<String>,
    rows: Vec<Vec<Expr>>,
}

pub fn symbolic_jacobian(equations: Vec<Expr>, variables: &[String]) -> SymbolicJacobian {
    let rows = if equations.is_empty() || variables.is_empty() {
        vec![Vec::new(); equations.len()]
    } else {
        let mut jacobian = Jacobian::new();
        jacobian.set_vector_of_functions(equations);
        jacobian.set_variables(variables.iter().map(String::as_str).collect());
        jacobian.calc_jacobian();
        jacobian.symbolic_jacobian
    };

    let mut parameters = BTreeSet::new();
    for entry in rows.iter().flatten() {
        parameters.extend(entry.extract_variables().1.into_iter().filter(|s| !variables.contains(s)));
    }
    SymbolicJacobian {
        variables: variables.to_vec(),
        parameters: parameters.into_iter().collect(),
        rows,
    }
}

/// Jacobian of the dengue right-hand side with respect to the seven states.
pub fn dengue_jacobian(denominator: VectorDenominator) -> SymbolicJacobian {
    symbolic_jacobian(rhs_expressions(denominator), &state_symbols())
}

impl SymbolicJacobian {
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Expr]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn entry(&self, row: usize, col: usize) -> Option<&Expr> {
        self.rows.get(row)?.get(col)
    }

    /// Header line followed by one `[a, b, ...]` line per row.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push("Matriz Jacobiana:".to_string());
        for row in self.rows() {
            let cells: Vec<String> = row.iter().map(|e| e.to_string()).collect();
            lines.push(format!("[{}]", cells.join(", ")));
        }
        lines
    }

    /// Numeric value of every entry at `state`, row-major. `params` must bind
    /// every non-state symbol that appears in the matrix.
    pub fn evaluate(&self, state: &[f64], params: &HashMap<String, f64>) -> Result<Vec<f64>> {
        ensure!(
            state.len() == self.variables.len(),
            "State dimension mismatch. Expected {}, got {}.",
            self.variables.len(),
            state.len()
        );
        let mut args = state.to_vec();
        for name in &self.parameters {
            let value = params
                .get(name)
                .ok_or_else(|| anyhow!("Unknown variable or parameter: {name}"))?;
            args.push(*value);
        }
        let names: Vec<&str> = self
            .variables
            .iter()
            .chain(&self.parameters)
            .map(String::as_str)
            .collect();

        Ok(self
            .rows
            .iter()
            .flatten()
            .map(|entry| {
                let f = Expr::lambdify_borrowed_thread_safe(entry, names.clone());
                f(args.clone())
            })
            .collect())
    }
}

impl Serialize for SymbolicJacobian {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: Vec<Vec<String>> = self
            .rows()
            .map(|row| row.iter().map(|e| e.to_string()).collect())
            .collect();
        rows.serialize(serializer)
    }
}
