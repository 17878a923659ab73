//! Tool call pipeline.
//!
//! Writes pass, in order: argument validation, idempotency replay, the pause
//! flag, the per-tool rate limit and the budget reservation. Only then is the
//! marketplace called. A rejection at any earlier step makes no network call.
//! One call runs at a time; the state mutex is held for the whole call.

use std::sync::Arc;
use std::time::Duration;

use agora_core::audit::{AuditLog, AuditRecord};
use agora_core::clock::{Clock, SystemClock};
use agora_core::market::AgentStatus;
use agora_core::tools::rpc::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerInfo, PROTOCOL_VERSION,
};
use agora_core::tools::schema::tool_descriptors;
use agora_core::tools::{ToolCall, ToolError, ToolErrorKind, ToolKind, ToolResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::budget::BudgetLimits;
use crate::config::GatewaySettings;
use crate::idempotency::IdempotencyRecord;
use crate::marketplace::{HttpMarketplace, MarketplaceApi};
use crate::signer::Signer;
use crate::state::{GatewayState, StateStore, StateWriter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub paused: bool,
    pub day_key: String,
    pub daily_spend_cents: u64,
}

pub struct Gateway {
    agent_id: String,
    limits: BudgetLimits,
    rate_limit_per_minute: u32,
    market: Arc<dyn MarketplaceApi>,
    state: Mutex<GatewayState>,
    writer: StateWriter,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    /// Load persisted state and wire the gateway to `market`.
    pub async fn new(
        settings: &GatewaySettings,
        market: Arc<dyn MarketplaceApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = StateStore::new(settings.state_path());
        let mut state = store.load().await;
        state.idempotency.set_cap(settings.idempotency_cap);
        state.budget.roll(clock.now());
        if settings.start_paused {
            state.budget.paused = true;
        }
        info!(
            target: "gateway",
            agent_id = %settings.agent_id,
            day_key = %state.budget.day_key,
            spent_cents = state.budget.daily_spend_cents,
            paused = state.budget.paused,
            stored_keys = state.idempotency.len(),
            "Gateway state loaded"
        );
        Self {
            agent_id: settings.agent_id.clone(),
            limits: BudgetLimits {
                max_daily_spend_cents: settings.max_daily_spend_cents,
                max_bid_per_action_cents: settings.max_bid_per_action_cents,
            },
            rate_limit_per_minute: settings.rate_limit_per_minute,
            market,
            state: Mutex::new(state),
            writer: StateWriter::spawn(store),
            audit: AuditLog::new(settings.audit_path()),
            clock,
        }
    }

    /// Gateway backed by the HTTP marketplace and the wall clock.
    pub async fn connect(settings: &GatewaySettings) -> crate::Result<Self> {
        let signer = match &settings.signing_key {
            Some(hex) => Some(Signer::from_hex(hex)?),
            None => {
                warn!(target: "gateway", "No signing key configured; paid writes will fail");
                None
            }
        };
        let market = HttpMarketplace::new(
            &settings.marketplace_url,
            Duration::from_millis(settings.request_timeout_ms),
            &settings.agent_id,
            signer,
        )?;
        Ok(Self::new(settings, Arc::new(market), Arc::new(SystemClock)).await)
    }

    pub async fn snapshot(&self) -> GatewayState {
        self.state.lock().await.clone()
    }

    /// Queue the current state and wait for it, and everything before it,
    /// to reach disk.
    pub async fn flush_state(&self) {
        self.writer.submit(self.state.lock().await.clone());
        self.writer.flush().await;
    }

    pub async fn health(&self) -> HealthReport {
        let mut state = self.state.lock().await;
        state.budget.roll(self.clock.now());
        HealthReport {
            ok: true,
            paused: state.budget.paused,
            day_key: state.budget.day_key.clone(),
            daily_spend_cents: state.budget.daily_spend_cents,
        }
    }

    pub async fn handle_rpc(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            let err = ToolError::new(ToolErrorKind::InvalidRequest, "jsonrpc must be \"2.0\"");
            return JsonRpcResponse::failure(id, &err);
        }
        let result = match request.method.as_str() {
            "initialize" => to_value(&InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                server_info: ServerInfo {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                capabilities: json!({ "tools": {} }),
            }),
            "tools/list" => to_value(&ListToolsResult {
                tools: tool_descriptors(),
            }),
            "tools/call" => match parse_call_params(request.params) {
                Ok(p) => match self.call_tool(&p.name, p.arguments).await {
                    Ok(r) => to_value(&r),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            other => Err(ToolError::method_not_found(other)),
        };
        match result {
            Ok(v) => JsonRpcResponse::success(id, v),
            Err(e) => JsonRpcResponse::failure(id, &e),
        }
    }

    #[tracing::instrument(target = "gateway", skip(self, arguments), fields(agent_id = %self.agent_id))]
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> ToolResult<CallToolResult> {
        let now = self.clock.now();
        let call = match ToolCall::from_params(name, arguments) {
            Ok(Some(call)) => call,
            Ok(None) => return Err(ToolError::method_not_found(name)),
            Err(e) => {
                let err = ToolError::from(e);
                self.audit_rejection(name, now, &err).await;
                return Err(err);
            }
        };

        let mut state = self.state.lock().await;
        state.budget.roll(now);
        let outcome = match call.kind() {
            ToolKind::Read => self.run_read(&mut state, &call, now).await,
            ToolKind::Write => self.run_write(&mut state, &call, now).await,
        };
        self.writer.submit(state.clone());
        drop(state);

        match &outcome {
            Ok(result) => {
                debug!(target: "gateway", tool = call.name(), idempotent = result.idempotent, "Tool call succeeded");
                if call.kind() == ToolKind::Write {
                    self.audit_call(&call, now, if result.idempotent { "idempotent" } else { "ok" }, None)
                        .await;
                }
            }
            Err(e) => {
                warn!(target: "gateway", tool = call.name(), kind = %e.kind, error = %e.message, "Tool call rejected");
                let label = if e.kind.is_precheck_rejection() { "rejected" } else { "failed" };
                self.audit_call(&call, now, label, Some(e)).await;
            }
        }
        outcome
    }

    async fn run_read(
        &self,
        state: &mut GatewayState,
        call: &ToolCall,
        now: DateTime<Utc>,
    ) -> ToolResult<CallToolResult> {
        state
            .rate_limits
            .check(call.name(), self.rate_limit_per_minute, now)?;
        if let ToolCall::GetBudgetStatus = call {
            let status = state.budget.status(self.limits);
            return Ok(CallToolResult::json(&to_value(&status)?, false));
        }
        let value = self.market.execute(call).await?;
        Ok(CallToolResult::json(&value, false))
    }

    async fn run_write(
        &self,
        state: &mut GatewayState,
        call: &ToolCall,
        now: DateTime<Utc>,
    ) -> ToolResult<CallToolResult> {
        if let Some(key) = call.idempotency_key() {
            if let Some(record) = state.idempotency.get(key) {
                if record.tool != call.name() {
                    return Err(ToolError::validation(format!(
                        "idempotency key {key} already used by {}",
                        record.tool
                    )));
                }
                info!(target: "gateway", tool = call.name(), key, "Replaying stored result");
                return Ok(CallToolResult::json(&record.result, true));
            }
        }
        if state.budget.paused && !matches!(call, ToolCall::SetAgentStatus(_)) {
            return Err(ToolError::new(ToolErrorKind::Paused, "agent writes are paused"));
        }
        state
            .rate_limits
            .check(call.name(), self.rate_limit_per_minute, now)?;

        let reservation = match call.bid_cents() {
            Some(bid) => Some(state.budget.reserve(bid, self.limits, now)?),
            None => None,
        };

        let executed = match call {
            ToolCall::SetAgentStatus(args) => Ok(self.set_status(state, call, args.status).await),
            _ => self.market.execute(call).await,
        };

        match executed {
            Ok(value) => {
                if let Some(r) = reservation {
                    info!(target: "gateway", tool = call.name(), spent_cents = r.amount_cents(), "Committing spend");
                    state.budget.commit(r);
                }
                if let Some(key) = call.idempotency_key() {
                    state.idempotency.insert(IdempotencyRecord {
                        key: key.to_string(),
                        tool: call.name().to_string(),
                        result: value.clone(),
                        stored_at: now,
                    });
                }
                Ok(CallToolResult::json(&value, false))
            }
            Err(e) => {
                if let Some(r) = reservation {
                    state.budget.release(r);
                }
                Err(e.into())
            }
        }
    }

    /// The local pause flag always changes; syncing it upstream is best effort.
    async fn set_status(&self, state: &mut GatewayState, call: &ToolCall, status: AgentStatus) -> Value {
        state.budget.paused = status == AgentStatus::Paused;
        info!(target: "gateway", paused = state.budget.paused, "Agent status changed");
        let synced = match self.market.execute(call).await {
            Ok(_) => true,
            Err(e) => {
                warn!(target: "gateway", error = %e, "Failed to sync agent status upstream");
                false
            }
        };
        json!({ "status": status, "paused": state.budget.paused, "synced": synced })
    }

    async fn audit_call(&self, call: &ToolCall, now: DateTime<Utc>, outcome: &str, error: Option<&ToolError>) {
        let mut detail = json!({
            "bidCents": call.bid_cents(),
            "idempotencyKey": call.idempotency_key(),
            "targetId": call.target_id(),
        });
        let mut rec = AuditRecord::new(now, &self.agent_id, "tools/call", outcome).tool(call.name());
        if let ToolCall::PostAnswer(a) = call {
            rec = rec.question(&a.question_id);
        }
        if let Some(e) = error {
            detail["code"] = json!(e.kind.code());
            rec = rec.error(e);
        }
        self.audit.record(rec.detail(detail)).await;
    }

    async fn audit_rejection(&self, tool: &str, now: DateTime<Utc>, error: &ToolError) {
        let rec = AuditRecord::new(now, &self.agent_id, "tools/call", "rejected")
            .tool(tool)
            .error(error);
        self.audit.record(rec).await;
    }
}

fn parse_call_params(params: Option<Value>) -> ToolResult<CallToolParams> {
    let params = params.ok_or_else(|| {
        ToolError::new(ToolErrorKind::InvalidRequest, "tools/call requires params")
    })?;
    serde_json::from_value(params)
        .map_err(|e| ToolError::new(ToolErrorKind::InvalidRequest, format!("bad tools/call params: {e}")))
}

fn to_value<T: Serialize>(value: &T) -> ToolResult<Value> {
    serde_json::to_value(value).map_err(|e| ToolError::internal(e.to_string()))
}
