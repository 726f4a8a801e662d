use {
    super::api_errors::ApiError,
    crate::{
        AppState,
        domain::{error::PipelineError, id::GatewaySessionId, payment::SettleOutcome},
    },
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
    hmac::{Hmac, Mac},
    serde::Deserialize,
    sha2::Sha256,
};

pub const SIGNATURE_HEADER: &str = "Content-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Checks `sha256=<hex>` against HMAC-SHA256 of the raw body.
/// Every failure mode produces the same error so callers learn nothing.
pub fn verify_signature(
    secret: &[u8],
    header: Option<&str>,
    body: &[u8],
) -> Result<(), PipelineError> {
    let rejected = || PipelineError::WebhookSignature("invalid webhook signature".into());

    let provided = header
        .and_then(|h| h.trim().strip_prefix("sha256="))
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(rejected)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| rejected())?;
    mac.update(body);
    mac.verify_slice(&provided).map_err(|_| rejected())
}

/// Hex signature in the header format the gateway sends.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, PipelineError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| PipelineError::WebhookSignature(e.to_string()))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub enum WebhookEventKind {
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,

    #[serde(rename = "payment.canceled")]
    PaymentCanceled,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: WebhookEventKind,
    pub object: WebhookObject,
}

fn ack(status: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": status }))
}

/// Gateway-pushed settlement. Authenticity failures and unparseable bodies are
/// rejected with 400; everything past that point is acknowledged with 200.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event = tracing::field::Empty, gateway_ref = tracing::field::Empty)
)]
pub async fn yookassa_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = verify_signature(state.webhook_secret.as_bytes(), header, &body) {
        tracing::warn!("rejected webhook with bad signature");
        return Err(e.into());
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "unparseable webhook payload");
        PipelineError::MalformedPayload("unparseable webhook payload".into())
    })?;

    let span = tracing::Span::current();
    span.record("event", tracing::field::debug(&event.event));
    span.record("gateway_ref", tracing::field::display(&event.object.id));

    let outcome = match event.event {
        WebhookEventKind::PaymentSucceeded => SettleOutcome::Paid,
        WebhookEventKind::PaymentCanceled => SettleOutcome::Failed,
        WebhookEventKind::Unknown => {
            tracing::info!("ignoring unhandled webhook event");
            return Ok(ack("ignored"));
        }
    };

    let session = match GatewaySessionId::new(event.object.id) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "webhook carries an invalid payment id");
            return Ok(ack("ignored"));
        }
    };

    Ok(ack(settle_from_webhook(&state, session, outcome).await))
}

async fn settle_from_webhook(
    state: &AppState,
    session: GatewaySessionId,
    outcome: SettleOutcome,
) -> &'static str {
    let payment = match state.ledger.lookup_by_gateway_ref(&session).await {
        Ok(Some(payment)) => payment,
        Ok(None) => {
            tracing::warn!("webhook for unknown payment");
            return "not_found";
        }
        Err(e) => {
            tracing::error!(error = %e, "payment lookup failed");
            return "error";
        }
    };

    match state
        .ledger
        .settle(payment.id(), outcome, Some(session.into_inner()))
        .await
    {
        Ok(settlement) if settlement.is_noop() => "already_settled",
        Ok(_) => "settled",
        Err(e) => {
            tracing::error!(payment_id = %payment.id(), error = %e, "webhook settlement failed");
            "error"
        }
    }
}
