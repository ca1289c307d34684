//! Shared pieces of the dengue binaries: logging setup and the dashboard web app.

use anyhow::{Context, Result};
use axum::{
    extract::Query,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dengue_core::dashboard::{
    render, ControlState, HUMAN_GRAPH_ID, MOSQUITO_GRAPH_ID, PAGE_TITLE, SLIDERS,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

/// Installs the env_logger backend; `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Bind address from `HOST`/`PORT`, defaulting to `127.0.0.1:8050`.
pub fn bind_address() -> Result<SocketAddr> {
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = match std::env::var("PORT") {
        Ok(value) => value
            .parse::<u16>()
            .with_context(|| format!("PORT must be a port number, got '{value}'."))?,
        Err(_) => 8050,
    };
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {host}:{port}."))
}

/// Slider values carried in the figures query string.
#[derive(Debug, Default, Deserialize)]
pub struct FigureQuery {
    #[serde(rename = "beta_H")]
    pub beta_h: Option<f64>,
    #[serde(rename = "beta_V")]
    pub beta_v: Option<f64>,
    #[serde(rename = "eta_H")]
    pub eta_h: Option<f64>,
}

impl FigureQuery {
    /// Controls for this request; missing values keep their slider defaults.
    pub fn controls(&self) -> Result<ControlState> {
        let mut controls = ControlState::default();
        for (id, value) in [
            ("beta_H", self.beta_h),
            ("beta_V", self.beta_v),
            ("eta_H", self.eta_h),
        ] {
            if let Some(value) = value {
                controls.set(id, value)?;
            }
        }
        Ok(controls)
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/figures", get(figures))
        .route("/healthz", get(healthz))
}

async fn index() -> Html<String> {
    Html(page_html())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

fn error_response(code: StatusCode, message: String) -> Response {
    (code, Json(json!({ "error": message }))).into_response()
}

async fn figures(Query(query): Query<FigureQuery>) -> Response {
    let controls = match query.controls() {
        Ok(controls) => controls,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e:#}")),
    };
    info!(
        "Rendering figures for beta_H={}, beta_V={}, eta_H={}",
        controls.beta_h, controls.beta_v, controls.eta_h
    );

    // Integration is CPU-bound; keep it off the async workers.
    let join = tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
        let view = render(&controls)?;
        let mut body = view.figures_json()?;
        body["controls"] = serde_json::to_value(controls)?;
        Ok(body)
    });

    match join.await {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(e)) => {
            warn!("Figure rendering failed: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("join error: {e}")),
    }
}

/// The dashboard page: sliders on the left, both charts on the right.
pub fn page_html() -> String {
    let mut controls = String::new();
    for slider in SLIDERS.iter() {
        controls.push_str(&format!(
            r#"      <div class="control">
        <label for="{id}">{label}</label>
        <input type="range" id="{id}" min="{min}" max="{max}" step="{step}" value="{default}">
        <output id="{id}-value">{default}</output>
      </div>
"#,
            id = slider.id,
            label = slider.label,
            min = slider.min,
            max = slider.max,
            step = slider.step,
            default = slider.default,
        ));
    }
    let ids: Vec<String> = SLIDERS.iter().map(|s| format!("'{}'", s.id)).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <script src="{cdn}"></script>
  <style>
    .panel {{ width: 25%; display: inline-block; vertical-align: top; }}
    .charts {{ width: 70%; display: inline-block; }}
    .chart {{ height: 45vh; }}
    .control {{ margin-bottom: 1.5em; }}
    .control input {{ width: 100%; }}
  </style>
</head>
<body>
  <h1 style="text-align: center">{title}</h1>
  <div class="panel">
{controls}  </div>
  <div class="charts">
    <div id="{human}" class="chart"></div>
    <div id="{mosquito}" class="chart"></div>
  </div>
  <script>
    const ids = [{ids}];
    async function refresh() {{
      const query = new URLSearchParams();
      for (const id of ids) {{
        const value = document.getElementById(id).value;
        query.set(id, value);
        document.getElementById(id + '-value').textContent = value;
      }}
      const response = await fetch('/api/figures?' + query.toString());
      const figures = await response.json();
      if (!response.ok) {{
        console.error(figures.error);
        return;
      }}
      for (const graph of ['{human}', '{mosquito}']) {{
        Plotly.react(graph, figures[graph].data, figures[graph].layout);
      }}
    }}
    for (const id of ids) {{
      document.getElementById(id).addEventListener('input', refresh);
    }}
    refresh();
  </script>
</body>
</html>
"#,
        title = PAGE_TITLE,
        cdn = PLOTLY_CDN,
        controls = controls,
        human = HUMAN_GRAPH_ID,
        mosquito = MOSQUITO_GRAPH_ID,
        ids = ids.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[test]
    fn page_lists_every_control_and_chart() {
        let html = page_html();
        for slider in SLIDERS.iter() {
            assert!(html.contains(&format!("id=\"{}\"", slider.id)), "missing slider {}", slider.id);
            assert!(html.contains(slider.label));
        }
        assert!(html.contains("id=\"human-graph\""));
        assert!(html.contains("id=\"mosquito-graph\""));
        assert!(html.contains(PAGE_TITLE));
    }

    #[test]
    fn query_values_are_snapped() {
        let query = FigureQuery {
            beta_h: Some(0.74),
            beta_v: None,
            eta_h: Some(2.0),
        };
        let controls = query.controls().expect("controls should build");
        assert_eq!(controls.beta_h, 0.7);
        assert_eq!(controls.beta_v, 0.3);
        assert_eq!(controls.eta_h, 0.5);
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (status, body) = get_json("/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn figures_endpoint_returns_both_charts() {
        let (status, body) = get_json("/api/figures?beta_H=0.7&eta_H=0.2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["human-graph"]["data"].as_array().map(Vec::len), Some(5));
        assert_eq!(body["mosquito-graph"]["data"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["controls"]["beta_H"], 0.7);
        assert_eq!(body["controls"]["eta_H"], 0.2);
    }

    #[tokio::test]
    async fn malformed_query_is_rejected() {
        let (status, _) = get_json("/api/figures?beta_H=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn index_serves_the_page() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let html = String::from_utf8(bytes.to_vec()).expect("page should be utf-8");
        assert!(html.contains("Plotly.react"));
    }
}
