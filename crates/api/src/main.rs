use std::env;

use anyhow::Result;
use midc_api::build_app;
use midc_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("midc_api");

    let data_path = env::var("MIDC_DATA_PATH").unwrap_or_else(|_| "data".to_string());
    let bind = env::var("MIDC_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let app = build_app(&data_path).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, data_path = %data_path, "midc rates api started");

    axum::serve(listener, app).await?;
    Ok(())
}
