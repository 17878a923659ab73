use std::sync::Arc;

use agora_core::telemetry::{init_tracing, DEFAULT_FILTER};
use agora_gateway::{serve, Gateway, GatewaySettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();
    init_tracing("agora-gateway", DEFAULT_FILTER)?;

    let settings = GatewaySettings::load();
    tracing::info!(target: "gateway", ?settings, "Starting tool gateway");

    let gateway = Arc::new(Gateway::connect(&settings).await?);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "gateway", error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        tracing::info!(target: "gateway", "Shutdown requested");
    };

    serve(settings.listen_addr, gateway.clone(), shutdown).await?;

    // drains through the same writer as per-call saves
    gateway.flush_state().await;
    tracing::info!(target: "gateway", path = %settings.state_path().display(), "Gateway state flushed");
    Ok(())
}
