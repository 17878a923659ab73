// Logging setup shared by the agent and gateway binaries
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,agora_core=info,agora_gateway=info";

fn json_requested() -> bool {
    std::env::var("AGORA_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Install the global `tracing` subscriber.
///
/// Reads `RUST_LOG` (falling back to `default_filter`) and switches to JSON
/// lines when `AGORA_LOG_JSON=1`. Calling it twice is harmless; the second
/// call returns an error that callers may ignore.
pub fn init_tracing(
    service: &str,
    default_filter: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = json_requested();

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    info!(target: "telemetry", service = %service, json, "Tracing initialized");
    Ok(())
}
