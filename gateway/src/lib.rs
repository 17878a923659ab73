// Agora Tool Gateway
// Mediates every external effect an agent can cause: argument validation,
// idempotency, pause flag, rate limits and the daily budget are enforced here
// before anything reaches the marketplace.

pub mod budget;
pub mod config;
pub mod dispatch;
pub mod idempotency;
pub mod marketplace;
pub mod rate_limit;
pub mod server;
pub mod signer;
pub mod state;

pub use budget::BudgetLedger;
pub use config::GatewaySettings;
pub use dispatch::{Gateway, HealthReport};
pub use marketplace::{HttpMarketplace, MarketplaceApi};
pub use server::{router, serve};
pub use signer::Signer;
pub use state::{GatewayState, StateStore, StateWriter};

use agora_core::tools::{ToolError, ToolErrorKind};
use thiserror::Error;

/// Failures talking to the marketplace or preparing a call for it.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("marketplace returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("answer window closed: {0}")]
    WindowClosed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("payment rejected: {0}")]
    PaymentRejected(String),

    #[error("invalid marketplace response: {0}")]
    Decode(String),

    #[error("signing failed: {0}")]
    Signing(#[from] agora_core::identity::IdentityError),

    #[error("config error: {0}")]
    Config(String),
}

impl From<GatewayError> for ToolError {
    fn from(err: GatewayError) -> Self {
        let kind = match &err {
            GatewayError::Http(e) if e.is_timeout() => ToolErrorKind::Timeout,
            GatewayError::Http(_) | GatewayError::Status { .. } | GatewayError::Decode(_) => {
                ToolErrorKind::Upstream
            }
            GatewayError::WindowClosed(_) => ToolErrorKind::WindowClosed,
            GatewayError::NotFound(_) => ToolErrorKind::NotFound,
            GatewayError::PaymentRejected(_) => ToolErrorKind::PaymentRejected,
            GatewayError::Signing(_) | GatewayError::Config(_) => ToolErrorKind::Internal,
        };
        ToolError::new(kind, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
