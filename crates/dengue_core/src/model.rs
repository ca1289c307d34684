use crate::symbolic::{Expr, SymbolicError};
use crate::traits::{DynamicalSystem, Scalar};
use anyhow::{ensure, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use RustedSciThe::symbolic::symbolic_engine::Expr as SciExpr;

/// State variables in integration order.
pub const STATE_NAMES: [&str; 7] = ["S_H", "E_H", "I_RH", "I_DH", "R_H", "S_V", "I_V"];

/// Parameter symbols in the order of `DengueParams::as_array`.
pub const PARAMETER_NAMES: [&str; 11] = [
    "Lambda_H", "beta_H", "mu_H", "eta_H", "gamma_H1", "gamma_H2", "theta", "rho", "Lambda_V",
    "beta_V", "mu_V",
];

/// Population totals kept as free symbols in the symbolic equations.
pub const POPULATION_SYMBOLS: [&str; 2] = ["N_H", "N_V"];

pub const DEFAULT_INITIAL_CONDITIONS: [f64; 7] = [1000.0, 5.0, 5.0, 2.0, 0.0, 500.0, 10.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    SusceptibleHuman,
    ExposedHuman,
    RecoveringHuman,
    DyingHuman,
    RecoveredHuman,
    SusceptibleVector,
    InfectedVector,
}

impl Compartment {
    pub const ALL: [Compartment; 7] = [
        Compartment::SusceptibleHuman,
        Compartment::ExposedHuman,
        Compartment::RecoveringHuman,
        Compartment::DyingHuman,
        Compartment::RecoveredHuman,
        Compartment::SusceptibleVector,
        Compartment::InfectedVector,
    ];

    pub const HUMAN: [Compartment; 5] = [
        Compartment::SusceptibleHuman,
        Compartment::ExposedHuman,
        Compartment::RecoveringHuman,
        Compartment::DyingHuman,
        Compartment::RecoveredHuman,
    ];

    pub const VECTOR: [Compartment; 2] =
        [Compartment::SusceptibleVector, Compartment::InfectedVector];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        STATE_NAMES[self.index()]
    }

    /// Exposed and infected compartments; zero at a disease-free state.
    pub fn is_infectious(self) -> bool {
        matches!(
            self,
            Compartment::ExposedHuman
                | Compartment::RecoveringHuman
                | Compartment::DyingHuman
                | Compartment::InfectedVector
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DengueParams {
    #[serde(rename = "Lambda_H")]
    pub lambda_h: f64,
    #[serde(rename = "beta_H")]
    pub beta_h: f64,
    #[serde(rename = "mu_H")]
    pub mu_h: f64,
    #[serde(rename = "eta_H")]
    pub eta_h: f64,
    #[serde(rename = "gamma_H1")]
    pub gamma_h1: f64,
    #[serde(rename = "gamma_H2")]
    pub gamma_h2: f64,
    pub theta: f64,
    pub rho: f64,
    #[serde(rename = "Lambda_V")]
    pub lambda_v: f64,
    #[serde(rename = "beta_V")]
    pub beta_v: f64,
    #[serde(rename = "mu_V")]
    pub mu_v: f64,
}

impl Default for DengueParams {
    fn default() -> Self {
        Self {
            lambda_h: 10.0,
            beta_h: 0.5,
            mu_h: 0.02,
            eta_h: 0.1,
            gamma_h1: 0.1,
            gamma_h2: 0.05,
            theta: 0.8,
            rho: 0.6,
            lambda_v: 20.0,
            beta_v: 0.3,
            mu_v: 0.1,
        }
    }
}

impl DengueParams {
    pub fn as_array(&self) -> [f64; 11] {
        [
            self.lambda_h,
            self.beta_h,
            self.mu_h,
            self.eta_h,
            self.gamma_h1,
            self.gamma_h2,
            self.theta,
            self.rho,
            self.lambda_v,
            self.beta_v,
            self.mu_v,
        ]
    }

    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        PARAMETER_NAMES.iter().copied().zip(self.as_array()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.named_values() {
            ensure!(value.is_finite(), "Parameter {} must be finite, got {}.", name, value);
            ensure!(value >= 0.0, "Parameter {} must be non-negative, got {}.", name, value);
        }
        if self.theta > 1.0 {
            warn!("theta = {} lies outside [0, 1].", self.theta);
        }
        Ok(())
    }
}

/// Population used to normalize the vector-side transmission term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorDenominator {
    /// N_V = S_V + I_V.
    VectorPopulation,
    /// N_H = S_H + E_H + I_RH + I_DH + R_H.
    HumanPopulation,
}

impl VectorDenominator {
    pub fn symbol(self) -> &'static str {
        match self {
            VectorDenominator::VectorPopulation => "N_V",
            VectorDenominator::HumanPopulation => "N_H",
        }
    }
}

impl Default for VectorDenominator {
    fn default() -> Self {
        VectorDenominator::VectorPopulation
    }
}

/// The seven-compartment right-hand side with numeric parameters.
#[derive(Debug, Clone, Copy)]
pub struct DengueModel {
    pub params: DengueParams,
    pub denominator: VectorDenominator,
}

impl DengueModel {
    pub fn new(params: DengueParams, denominator: VectorDenominator) -> Self {
        Self {
            params,
            denominator,
        }
    }

    /// Returns (N_H, N_V) for a state vector.
    pub fn populations<T: Scalar>(state: &[T]) -> (T, T) {
        let humans = state[0] + state[1] + state[2] + state[3] + state[4];
        let vectors = state[5] + state[6];
        (humans, vectors)
    }

    /// New infections per unit time: (humans, vectors).
    pub fn transmission_terms<T: Scalar>(&self, state: &[T]) -> (T, T) {
        let p = &self.params;
        let (n_h, n_v) = Self::populations(state);
        let vector_total = match self.denominator {
            VectorDenominator::VectorPopulation => n_v,
            VectorDenominator::HumanPopulation => n_h,
        };
        let human = T::from_f64(p.beta_h) * state[0] * state[6] / n_h;
        let vector = T::from_f64(p.beta_v) * state[5] * (state[2] + state[3]) / vector_total;
        (human, vector)
    }
}

impl<T: Scalar> DynamicalSystem<T> for DengueModel {
    fn dimension(&self) -> usize {
        STATE_NAMES.len()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let p = &self.params;
        let c = T::from_f64;
        let (s_h, e_h, i_rh, i_dh, r_h) = (x[0], x[1], x[2], x[3], x[4]);
        let (s_v, i_v) = (x[5], x[6]);
        let (human_infection, vector_infection) = self.transmission_terms(x);

        out[0] = c(p.lambda_h) - human_infection - c(p.mu_h) * s_h;
        out[1] = human_infection - c(p.mu_h + p.eta_h) * e_h;
        out[2] = c(p.eta_h) * e_h - c(p.mu_h + p.gamma_h1) * i_rh;
        out[3] = c((1.0 - p.theta) * p.gamma_h1) * i_rh - c(p.mu_h + p.gamma_h2) * i_dh;
        out[4] = c(p.theta * p.gamma_h1) * i_rh + c(p.rho * p.gamma_h2) * i_dh - c(p.mu_h) * r_h;
        out[5] = c(p.lambda_v) - vector_infection - c(p.mu_v) * s_v;
        out[6] = vector_infection - c(p.mu_v) * i_v;
    }
}

fn var(name: &str) -> SciExpr {
    SciExpr::Var(name.to_string())
}

/// Right-hand sides ordered like `STATE_NAMES`, with `N_H` and `N_V` as free
/// symbols.
pub fn rhs_expressions(denominator: VectorDenominator) -> Vec<SciExpr> {
    let [s_h, e_h, i_rh, i_dh, r_h, s_v, i_v] = STATE_NAMES.map(var);
    let human_infection = var("beta_H") * s_h.clone() * i_v.clone() / var("N_H");
    let vector_infection =
        var("beta_V") * s_v.clone() * (i_rh.clone() + i_dh.clone()) / var(denominator.symbol());
    vec![
        var("Lambda_H") - human_infection.clone() - var("mu_H") * s_h,
        human_infection - (var("mu_H") + var("eta_H")) * e_h.clone(),
        var("eta_H") * e_h - (var("mu_H") + var("gamma_H1")) * i_rh.clone(),
        (SciExpr::Const(1.0) - var("theta")) * var("gamma_H1") * i_rh.clone()
            - (var("mu_H") + var("gamma_H2")) * i_dh.clone(),
        var("theta") * var("gamma_H1") * i_rh + var("rho") * var("gamma_H2") * i_dh
            - var("mu_H") * r_h,
        var("Lambda_V") - vector_infection.clone() - var("mu_V") * s_v,
        vector_infection - var("mu_V") * i_v,
    ]
}

/// The right-hand sides converted to exact expressions for the equilibrium solver.
pub fn symbolic_equations(denominator: VectorDenominator) -> Result<Vec<Expr>, SymbolicError> {
    rhs_expressions(denominator).iter().map(Expr::from_sci).collect()
}

pub fn state_symbols() -> Vec<String> {
    STATE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Model parameters followed by the population symbols.
pub fn parameter_symbols() -> Vec<String> {
    PARAMETER_NAMES
        .iter()
        .chain(POPULATION_SYMBOLS.iter())
        .map(|s| s.to_string())
        .collect()
}
