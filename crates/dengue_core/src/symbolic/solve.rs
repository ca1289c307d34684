use super::poly::Poly;
use super::rational::RationalFunction;
use super::SymbolicError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolveSettings {
    /// Maximum nesting of eliminations and case splits along one branch.
    pub max_depth: usize,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// One solution set. `values` follows the order of the requested unknowns;
/// unknowns listed in `free` were left undetermined and map to themselves.
#[derive(Debug, Clone)]
pub struct Solution {
    pub values: Vec<(String, RationalFunction)>,
    pub free: Vec<String>,
}

impl Solution {
    pub fn get(&self, name: &str) -> Option<&RationalFunction> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn same_as(&self, other: &Solution) -> bool {
        self.free == other.free
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|((na, a), (nb, b))| na == nb && a.sub(b).is_zero())
    }
}

struct Branch {
    equations: Vec<RationalFunction>,
    assigned: Vec<(String, RationalFunction)>,
    remaining: Vec<String>,
}

enum Step {
    Eliminate {
        equation: usize,
        unknown: String,
        factor: Poly,
    },
    Split {
        equation: usize,
    },
}

/// Solves `equations = 0` for `unknowns`; every other symbol is a parameter
/// assumed generic (non-zero wherever it appears as a factor).
///
/// Each candidate is substituted back into the original equations and kept
/// only when every equation vanishes exactly.
pub fn solve_system(
    equations: &[RationalFunction],
    unknowns: &[String],
    settings: SolveSettings,
) -> Result<Vec<Solution>, SymbolicError> {
    let mut candidates = Vec::new();
    explore(
        Branch {
            equations: equations.to_vec(),
            assigned: Vec::new(),
            remaining: unknowns.to_vec(),
        },
        0,
        settings,
        &mut candidates,
    )?;
    debug!("Elimination produced {} candidate(s).", candidates.len());

    let mut solutions: Vec<Solution> = Vec::new();
    for branch in candidates {
        let values = unknowns
            .iter()
            .map(|name| {
                let value = branch
                    .assigned
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| RationalFunction::symbol(name));
                (name.clone(), value)
            })
            .collect();
        let solution = Solution {
            values,
            free: branch.remaining,
        };
        if !satisfies(&solution, equations)? {
            warn!("Discarding candidate that does not satisfy the system.");
            continue;
        }
        if !solutions.iter().any(|s| s.same_as(&solution)) {
            solutions.push(solution);
        }
    }
    Ok(solutions)
}

fn satisfies(solution: &Solution, equations: &[RationalFunction]) -> Result<bool, SymbolicError> {
    for equation in equations {
        let mut value = equation.clone();
        for (name, replacement) in &solution.values {
            if solution.free.contains(name) {
                continue;
            }
            value = match value.substitute(name, replacement) {
                Ok(v) => v,
                Err(SymbolicError::DivisionByZero(_)) => return Ok(false),
                Err(err) => return Err(err),
            };
        }
        if !value.is_zero() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Numerator factors that involve at least one unknown.
fn active_factors<'a>(equation: &'a RationalFunction, unknowns: &[String]) -> Vec<&'a Poly> {
    equation
        .numerator_factors()
        .into_iter()
        .filter(|f| f.contains_any(unknowns))
        .collect()
}

fn explore(
    branch: Branch,
    depth: usize,
    settings: SolveSettings,
    out: &mut Vec<Branch>,
) -> Result<(), SymbolicError> {
    if depth > settings.max_depth {
        return Err(SymbolicError::DepthExceeded(settings.max_depth));
    }

    let mut pending = Vec::with_capacity(branch.equations.len());
    for equation in branch.equations {
        if equation.is_zero() {
            continue;
        }
        if active_factors(&equation, &branch.remaining).is_empty() {
            // A non-zero parameter expression cannot vanish.
            return Ok(());
        }
        pending.push(equation);
    }
    if pending.is_empty() {
        out.push(Branch {
            equations: Vec::new(),
            assigned: branch.assigned,
            remaining: branch.remaining,
        });
        return Ok(());
    }

    match choose_step(&pending, &branch.remaining)? {
        Step::Split { equation } => {
            let factors: Vec<Poly> = active_factors(&pending[equation], &branch.remaining)
                .into_iter()
                .cloned()
                .collect();
            debug!("Splitting on {} factors at depth {}.", factors.len(), depth);
            for factor in factors {
                let mut equations = without(&pending, equation);
                equations.push(RationalFunction::from_poly(&factor, &[]));
                explore(
                    Branch {
                        equations,
                        assigned: branch.assigned.clone(),
                        remaining: branch.remaining.clone(),
                    },
                    depth + 1,
                    settings,
                    out,
                )?;
            }
            Ok(())
        }
        Step::Eliminate {
            equation,
            unknown,
            factor,
        } => {
            let coefficients = factor.coefficients_in(&unknown);
            let lead = RationalFunction::from_poly(&coefficients[1], &[]);
            let constant = RationalFunction::from_poly(&coefficients[0], &[]);
            let value = constant.neg().div(&lead)?;
            let remaining: Vec<String> = branch
                .remaining
                .iter()
                .filter(|n| **n != unknown)
                .cloned()
                .collect();
            debug!("Eliminating {} at depth {}.", unknown, depth);

            if let Some(next) = eliminate(&pending, equation, &branch.assigned, &unknown, &value)? {
                explore(
                    Branch {
                        equations: next.0,
                        assigned: next.1,
                        remaining: remaining.clone(),
                    },
                    depth + 1,
                    settings,
                    out,
                )?;
            }

            // Degenerate case: the leading coefficient itself vanishes.
            if lead.contains_any(&remaining) {
                let mut equations = without(&pending, equation);
                equations.push(lead);
                equations.push(constant);
                explore(
                    Branch {
                        equations,
                        assigned: branch.assigned,
                        remaining: branch.remaining,
                    },
                    depth + 1,
                    settings,
                    out,
                )?;
            }
            Ok(())
        }
    }
}

type Reduced = (Vec<RationalFunction>, Vec<(String, RationalFunction)>);

/// Substitutes `unknown = value` everywhere. Returns `None` when the value
/// makes a denominator vanish, which rules the branch out.
fn eliminate(
    pending: &[RationalFunction],
    skip: usize,
    assigned: &[(String, RationalFunction)],
    unknown: &str,
    value: &RationalFunction,
) -> Result<Option<Reduced>, SymbolicError> {
    let mut equations = Vec::with_capacity(pending.len());
    for (idx, equation) in pending.iter().enumerate() {
        if idx == skip {
            continue;
        }
        match equation.substitute(unknown, value) {
            Ok(v) => equations.push(v),
            Err(SymbolicError::DivisionByZero(_)) => return Ok(None),
            Err(err) => return Err(err),
        }
    }

    let mut next_assigned = Vec::with_capacity(assigned.len() + 1);
    for (name, expr) in assigned {
        match expr.substitute(unknown, value) {
            Ok(v) => next_assigned.push((name.clone(), v)),
            Err(SymbolicError::DivisionByZero(_)) => return Ok(None),
            Err(err) => return Err(err),
        }
    }
    next_assigned.push((unknown.to_string(), value.clone()));
    Ok(Some((equations, next_assigned)))
}

fn without(equations: &[RationalFunction], skip: usize) -> Vec<RationalFunction> {
    equations
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != skip)
        .map(|(_, e)| e.clone())
        .collect()
}

/// Picks the next move. Preference order: eliminate an unknown whose
/// coefficient is parameter-only, split a product, eliminate with an
/// unknown-dependent coefficient.
fn choose_step(pending: &[RationalFunction], unknowns: &[String]) -> Result<Step, SymbolicError> {
    let mut best: Option<((bool, usize, usize), usize, String, Poly)> = None;
    let mut split: Option<(usize, usize)> = None;

    for (idx, equation) in pending.iter().enumerate() {
        let factors = active_factors(equation, unknowns);
        if factors.len() > 1 {
            if split.map_or(true, |(_, n)| factors.len() < n) {
                split = Some((idx, factors.len()));
            }
            continue;
        }
        let factor = factors[0];
        for unknown in unknowns {
            if factor.degree_in(unknown) != 1 {
                continue;
            }
            let lead = &factor.coefficients_in(unknown)[1];
            let score = (
                lead.contains_any(unknowns),
                factor.num_terms(),
                lead.num_terms(),
            );
            if best.as_ref().map_or(true, |(s, ..)| score < *s) {
                best = Some((score, idx, unknown.clone(), factor.clone()));
            }
        }
    }

    let eliminate = |(_, equation, unknown, factor): ((bool, usize, usize), usize, String, Poly)| {
        Step::Eliminate {
            equation,
            unknown,
            factor,
        }
    };
    match (best, split) {
        (Some(choice), _) if !choice.0 .0 => Ok(eliminate(choice)),
        (_, Some((equation, _))) => Ok(Step::Split { equation }),
        (Some(choice), None) => Ok(eliminate(choice)),
        (None, None) => Err(SymbolicError::Unsupported(format!(
            "no unknown appears linearly in {}",
            pending[0]
        ))),
    }
}
