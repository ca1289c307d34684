use crate::model::{Compartment, DengueParams};
use crate::simulation::{simulate, SimulationConfig, Trajectory};
use anyhow::{bail, Context, Result};
use plotly::{common::Mode, layout::Axis, layout::Layout, Plot, Scatter};
use serde::{Deserialize, Serialize};

pub const PAGE_TITLE: &str = "Dinámica del Dengue: Humanos y Mosquitos";
pub const HUMAN_GRAPH_ID: &str = "human-graph";
pub const MOSQUITO_GRAPH_ID: &str = "mosquito-graph";

/// A bounded numeric input exposed on the dashboard.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SliderSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl SliderSpec {
    /// Clamps to the range and snaps to the nearest step.
    pub fn snap(&self, value: f64) -> f64 {
        let steps = ((value - self.min) / self.step).round();
        let snapped = (self.min + steps * self.step).clamp(self.min, self.max);
        // Drop the float noise left by `steps * step`.
        (snapped * 1e10).round() / 1e10
    }
}

pub const SLIDERS: [SliderSpec; 3] = [
    SliderSpec {
        id: "beta_H",
        label: "Tasa de transmisión humano -> mosquito (β_H):",
        min: 0.1,
        max: 1.0,
        step: 0.1,
        default: 0.5,
    },
    SliderSpec {
        id: "beta_V",
        label: "Tasa de transmisión mosquito -> humano (β_V):",
        min: 0.1,
        max: 1.0,
        step: 0.1,
        default: 0.3,
    },
    SliderSpec {
        id: "eta_H",
        label: "Tasa de progresión de expuestos a infecciosos (η_H):",
        min: 0.05,
        max: 0.5,
        step: 0.05,
        default: 0.1,
    },
];

pub fn slider(id: &str) -> Option<&'static SliderSpec> {
    SLIDERS.iter().find(|s| s.id == id)
}

/// Last value of every dashboard control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    #[serde(rename = "beta_H")]
    pub beta_h: f64,
    #[serde(rename = "beta_V")]
    pub beta_v: f64,
    #[serde(rename = "eta_H")]
    pub eta_h: f64,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            beta_h: SLIDERS[0].default,
            beta_v: SLIDERS[1].default,
            eta_h: SLIDERS[2].default,
        }
    }
}

impl ControlState {
    /// Stores `value` for the control `id` and returns the value kept after
    /// clamping and snapping.
    pub fn set(&mut self, id: &str, value: f64) -> Result<f64> {
        let Some(definition) = slider(id) else {
            bail!("Unknown control id: {}", id);
        };
        if !value.is_finite() {
            bail!("Control {} received a non-finite value.", id);
        }
        let snapped = definition.snap(value);
        match id {
            "beta_H" => self.beta_h = snapped,
            "beta_V" => self.beta_v = snapped,
            _ => self.eta_h = snapped,
        }
        Ok(snapped)
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        match id {
            "beta_H" => Some(self.beta_h),
            "beta_V" => Some(self.beta_v),
            "eta_H" => Some(self.eta_h),
            _ => None,
        }
    }

    /// Model parameters: the fixed defaults with the three controlled rates.
    pub fn params(&self) -> DengueParams {
        DengueParams {
            beta_h: self.beta_h,
            beta_v: self.beta_v,
            eta_h: self.eta_h,
            ..DengueParams::default()
        }
    }
}

/// Result of one recompute: the trajectory and both charts.
pub struct DashboardView {
    pub controls: ControlState,
    pub trajectory: Trajectory,
    pub human: Plot,
    pub mosquito: Plot,
}

impl DashboardView {
    /// Both figures keyed by graph id, as Plotly JSON.
    pub fn figures_json(&self) -> Result<serde_json::Value> {
        let human: serde_json::Value =
            serde_json::from_str(&self.human.to_json()).context("Invalid human figure JSON.")?;
        let mosquito: serde_json::Value = serde_json::from_str(&self.mosquito.to_json())
            .context("Invalid mosquito figure JSON.")?;
        let mut figures = serde_json::Map::new();
        figures.insert(HUMAN_GRAPH_ID.to_string(), human);
        figures.insert(MOSQUITO_GRAPH_ID.to_string(), mosquito);
        Ok(serde_json::Value::Object(figures))
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(self.figures_json()?.to_string())
    }
}

fn population_figure(title: &str, trajectory: &Trajectory, compartments: &[Compartment]) -> Plot {
    let mut plot = Plot::new();
    for compartment in compartments {
        let trace = Scatter::new(trajectory.times.clone(), trajectory.column(compartment.index()))
            .mode(Mode::Lines)
            .name(compartment.name());
        plot.add_trace(trace);
    }
    let layout = Layout::new()
        .title(title)
        .x_axis(Axis::new().title("Tiempo (días)"))
        .y_axis(Axis::new().title("Población"));
    plot.set_layout(layout);
    plot
}

/// Re-runs the simulation from the default initial conditions and rebuilds
/// both charts.
pub fn render(controls: &ControlState) -> Result<DashboardView> {
    let trajectory = simulate(&controls.params(), &SimulationConfig::default())
        .context("Dashboard simulation failed.")?;
    let human = population_figure("Poblaciones de Humanos", &trajectory, &Compartment::HUMAN);
    let mosquito = population_figure("Poblaciones de Mosquitos", &trajectory, &Compartment::VECTOR);
    Ok(DashboardView {
        controls: *controls,
        trajectory,
        human,
        mosquito,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clamps_and_snaps_to_slider_steps() {
        let mut controls = ControlState::default();
        assert_eq!(controls.set("beta_H", 0.73).expect("known id"), 0.7);
        assert_eq!(controls.set("beta_V", 5.0).expect("known id"), 1.0);
        assert_eq!(controls.set("eta_H", 0.12).expect("known id"), 0.1);
        assert_eq!(controls.set("eta_H", 0.0).expect("known id"), 0.05);
        assert_eq!(controls.get("beta_H"), Some(0.7));
        assert_eq!(controls.params().beta_v, 1.0);
        assert_eq!(controls.params().lambda_v, 20.0);
    }

    #[test]
    fn unknown_control_is_an_error() {
        let mut controls = ControlState::default();
        let err = controls.set("mu_H", 0.1).expect_err("mu_H is not a control");
        assert!(err.to_string().contains("Unknown control id"), "unexpected error: {err}");
        assert!(controls.set("beta_H", f64::NAN).is_err());
        assert_eq!(controls, ControlState::default());
    }

    #[test]
    fn default_controls_match_fixed_parameters() {
        assert_eq!(ControlState::default().params(), DengueParams::default());
    }

    #[test]
    fn render_builds_both_figures() {
        let view = render(&ControlState::default()).expect("render should succeed");
        assert_eq!(view.trajectory.len(), 1000);

        let figures = view.figures_json().expect("figures should serialize");
        let human = figures[HUMAN_GRAPH_ID]["data"].as_array().expect("human traces");
        let mosquito = figures[MOSQUITO_GRAPH_ID]["data"].as_array().expect("mosquito traces");
        assert_eq!(human.len(), 5);
        assert_eq!(mosquito.len(), 2);
        assert_eq!(human[0]["name"], "S_H");
        assert_eq!(mosquito[1]["name"], "I_V");

        let text = view.to_json_string().expect("figures should serialize");
        assert!(text.contains("Poblaciones de Humanos"));
        assert!(text.contains("Poblaciones de Mosquitos"));
    }

    #[test]
    fn changing_a_control_changes_the_curves() {
        let base = render(&ControlState::default()).expect("render should succeed");
        let mut controls = ControlState::default();
        controls.set("beta_V", 0.9).expect("known id");
        let changed = render(&controls).expect("render should succeed");
        let last = base.trajectory.len() - 1;
        assert_ne!(base.trajectory.states[last], changed.trajectory.states[last]);
    }
}
