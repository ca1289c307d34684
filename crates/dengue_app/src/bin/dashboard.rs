use anyhow::{Context, Result};
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    dengue_app::init_logging();
    let addr = dengue_app::bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}."))?;
    info!("Dashboard listening on http://{}", addr);
    axum::serve(listener, dengue_app::app())
        .await
        .context("Dashboard server failed.")
}
