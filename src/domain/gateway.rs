use {
    super::{
        id::{GatewaySessionId, PaymentId},
        money::Money,
    },
    futures::future::BoxFuture,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Shop credentials are absent from the configuration.
    #[error("payment gateway credentials are not configured")]
    NotConfigured,

    #[error("transport: {0}")]
    Transport(String),

    /// Non-2xx answer; `body` is the gateway's error document as received.
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MalformedResponse(_))
    }
}

/// Input for opening a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub payment_id: PaymentId,
    pub amount: Money,
    pub description: String,
    pub return_url: String,
    /// Sent on every attempt so retried requests never create a second charge.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    pub id: GatewaySessionId,
    pub confirmation_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Succeeded,
    Pending,
    Canceled,
}

pub trait GatewayClient: Send + Sync {
    fn create_session<'a>(
        &'a self,
        request: &'a CreateSession,
    ) -> BoxFuture<'a, Result<GatewaySession, GatewayError>>;

    fn fetch_status<'a>(
        &'a self,
        id: &'a GatewaySessionId,
    ) -> BoxFuture<'a, Result<RemoteStatus, GatewayError>>;
}
