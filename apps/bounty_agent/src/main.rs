use std::sync::Arc;
use std::time::Duration;

use agora_core::agent::cooldown::AuthCooldown;
use agora_core::audit::AuditLog;
use agora_core::listener::reaction::ReactionPolicy;
use agora_core::research::{QaSearchProvider, Researcher, WebResearchProvider};
use agora_core::telemetry::{init_tracing, DEFAULT_FILTER};
use agora_core::{
    AgentRuntime, AgentSettings, Clock, EventListener, GatewayClient, LlmBackend, LlmClient,
    SystemClock, ToolInvoker,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();
    init_tracing("bounty-agent", DEFAULT_FILTER)?;

    let settings = AgentSettings::load();
    info!(
        target: "bounty_agent",
        agent_id = %settings.agent_id,
        gateway = %settings.gateway_url,
        profile = ?settings.persona.profile,
        web_research = settings.research.web_enabled,
        "Starting bounty agent"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let llm: Arc<dyn LlmBackend> = Arc::new(LlmClient::new(settings.llm.clone())?);
    let gateway = GatewayClient::new(
        &settings.gateway_url,
        Duration::from_millis(settings.tool_timeout_ms),
    )?;
    if let Err(e) = gateway.initialize().await {
        // the loop retries every cycle; an unreachable gateway is not fatal at startup
        warn!(target: "bounty_agent", error = %e, "Gateway handshake failed");
    }
    let tools: Arc<dyn ToolInvoker> = Arc::new(gateway);

    let mut researcher = Researcher::new().with_provider(Arc::new(QaSearchProvider::new(
        Arc::clone(&tools),
        settings.similar_limit,
        settings.research.max_queries,
    )));
    if settings.research.web_enabled {
        researcher = researcher.with_provider(Arc::new(WebResearchProvider::new(
            settings.research.clone(),
            Arc::clone(&llm),
        )?));
    }

    let cooldown = Arc::new(AuthCooldown::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (signal_tx, signal_rx) = EventListener::channel(&settings.listener);

    let listener_handle = if settings.listener.url.is_some() {
        let reactions = settings.listener.reactions_enabled.then(|| {
            ReactionPolicy::new(
                settings.agent_id.clone(),
                settings.persona.clone(),
                Arc::clone(&llm),
                Arc::clone(&tools),
                Arc::clone(&cooldown),
                settings.listener.reactions_per_minute,
                settings.listener.reaction_min_confidence,
            )
            .with_auth_cooldown(settings.auth_cooldown())
            .with_audit(AuditLog::new(settings.audit_path()))
        });
        let listener = EventListener::new(
            settings.listener.clone(),
            settings.agent_id.clone(),
            signal_tx,
            reactions,
            Arc::clone(&clock),
        );
        Some(tokio::spawn(listener.run(shutdown_rx.clone())))
    } else {
        info!(target: "bounty_agent", "No realtime URL configured; running on the timer only");
        drop(signal_tx);
        None
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(target: "bounty_agent", error = %e, "Failed to listen for Ctrl-C");
            // dropping the sender would end the loop
            std::future::pending::<()>().await;
        }
        info!(target: "bounty_agent", "Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let mut runtime = AgentRuntime::new(settings, llm, tools, researcher, clock)
        .await
        .with_cooldown(cooldown);
    runtime.run(signal_rx, shutdown_rx).await;

    if let Some(handle) = listener_handle {
        if let Err(e) = handle.await {
            warn!(target: "bounty_agent", error = %e, "Listener task ended abnormally");
        }
    }
    Ok(())
}
