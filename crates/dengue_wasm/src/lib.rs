//! Browser bridge for the dengue model: dashboard state, symbolic reports and
//! numeric equilibria.

use dengue_core::dashboard::{render, ControlState, SLIDERS};
use dengue_core::equilibrium::{
    dengue_equilibria, locate_equilibrium as core_locate_equilibrium, EquilibriumSummary,
    NewtonSettings,
};
use dengue_core::jacobian::dengue_jacobian;
use dengue_core::model::{DengueModel, VectorDenominator};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

fn js_error(context: &str, err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&format!("{context}: {err}")).into()
}

fn denominator(use_human_population: bool) -> VectorDenominator {
    if use_human_population {
        VectorDenominator::HumanPopulation
    } else {
        VectorDenominator::VectorPopulation
    }
}

/// Slider state of the dashboard; every render re-runs the simulation.
#[wasm_bindgen]
pub struct WasmDashboard {
    controls: ControlState,
}

#[wasm_bindgen]
impl WasmDashboard {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmDashboard {
        console_error_panic_hook::set_once();
        WasmDashboard {
            controls: ControlState::default(),
        }
    }

    /// Stores a slider value and returns it after clamping and snapping.
    pub fn set_control(&mut self, id: &str, value: f64) -> Result<f64, JsValue> {
        self.controls
            .set(id, value)
            .map_err(|e| js_error("Invalid control", e))
    }

    pub fn get_control(&self, id: &str) -> Option<f64> {
        self.controls.get(id)
    }

    /// Both figures keyed by graph id, as a JSON string for `Plotly.react`.
    pub fn render_json(&self) -> Result<String, JsValue> {
        self.figures().map_err(|e| js_error("Render failed", format!("{e:#}")))
    }

    /// Slider definitions (id, label, range, step, default).
    pub fn sliders() -> Result<JsValue, JsValue> {
        to_value(&SLIDERS.to_vec()).map_err(|e| js_error("Serialization error", e))
    }
}

impl WasmDashboard {
    fn figures(&self) -> anyhow::Result<String> {
        render(&self.controls)?.to_json_string()
    }
}

impl Default for WasmDashboard {
    fn default() -> Self {
        Self::new()
    }
}

/// `Matriz Jacobiana:` followed by one line per row.
#[wasm_bindgen]
pub fn jacobian_report(use_human_population: bool) -> Vec<String> {
    dengue_jacobian(denominator(use_human_population)).report_lines()
}

/// All symbolic equilibria as `{ assignments, free, disease_free }` objects.
#[wasm_bindgen]
pub fn critical_points(use_human_population: bool) -> Result<JsValue, JsValue> {
    let points = dengue_equilibria(denominator(use_human_population))
        .map_err(|e| js_error("Equilibrium solve failed", format!("{e:#}")))?;
    let summaries: Vec<EquilibriumSummary> = points.iter().map(|p| p.summary()).collect();
    to_value(&summaries).map_err(|e| js_error("Serialization error", e))
}

/// Newton refinement of an equilibrium for the given slider values.
#[wasm_bindgen]
pub fn locate_equilibrium(
    initial_guess: Vec<f64>,
    beta_h: f64,
    beta_v: f64,
    eta_h: f64,
    max_steps: u32,
    damping: f64,
) -> Result<JsValue, JsValue> {
    let mut controls = ControlState::default();
    for (id, value) in [("beta_H", beta_h), ("beta_V", beta_v), ("eta_H", eta_h)] {
        controls.set(id, value).map_err(|e| js_error("Invalid control", e))?;
    }
    let model = DengueModel::new(controls.params(), VectorDenominator::HumanPopulation);
    let settings = NewtonSettings {
        max_steps: max_steps as usize,
        damping,
        ..NewtonSettings::default()
    };
    let result = core_locate_equilibrium(&model, &initial_guess, settings)
        .map_err(|e| js_error("Equilibrium solve failed", format!("{e:#}")))?;
    to_value(&result).map_err(|e| js_error("Serialization error", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_starts_from_slider_defaults() {
        let mut dashboard = WasmDashboard::new();
        assert_eq!(dashboard.get_control("beta_H"), Some(0.5));
        assert_eq!(dashboard.get_control("beta_V"), Some(0.3));
        assert_eq!(dashboard.get_control("eta_H"), Some(0.1));
        assert_eq!(dashboard.get_control("theta"), None);
        let kept = dashboard.set_control("beta_V", 0.86).expect("known control");
        assert_eq!(kept, 0.9);
    }

    #[test]
    fn render_json_contains_both_graphs() {
        let dashboard = WasmDashboard::new();
        let json = dashboard.render_json().expect("render should succeed");
        assert!(json.contains("\"human-graph\""));
        assert!(json.contains("\"mosquito-graph\""));
    }

    #[test]
    fn jacobian_report_has_header_and_seven_rows() {
        let lines = jacobian_report(false);
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "Matriz Jacobiana:");
        let human = jacobian_report(true);
        assert_ne!(lines[6], human[6]);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn unknown_control_is_rejected() {
        let mut dashboard = WasmDashboard::new();
        let result = dashboard.set_control("mu_H", 0.1);
        assert!(result.is_err(), "mu_H is not a dashboard control");
    }

    #[wasm_bindgen_test]
    fn critical_points_serializes_summaries() {
        let value = critical_points(false).expect("equilibria should solve");
        let summaries: Vec<EquilibriumSummary> =
            serde_wasm_bindgen::from_value(value).expect("summaries should deserialize");
        assert!(summaries.iter().any(|s| s.disease_free));
    }

    #[wasm_bindgen_test]
    fn locate_equilibrium_rejects_wrong_dimension() {
        let result = locate_equilibrium(vec![1.0, 2.0], 0.5, 0.3, 0.1, 10, 1.0);
        let message = result
            .err()
            .and_then(|err| js_sys::Error::from(err).message().as_string())
            .unwrap_or_default();
        assert!(message.contains("dimension mismatch"));
    }
}
