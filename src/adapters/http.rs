use {
    super::{
        api_errors::ApiError,
        auth::AuthUser,
        extract::{ApiJson, ApiQuery},
    },
    crate::{
        AppState,
        domain::{
            account::{Account, Role},
            chat::ChatMessage,
            error::PipelineError,
            gateway::CreateSession,
            id::{PaymentId, ProductId, UserId},
            money::{Money, MoneyAmount},
            notification::Notification,
            payment::{Enrollment, PaymentStatus},
        },
        services::reconciler::ReconcileResult,
    },
    axum::{Json, extract::State},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub course_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub confirmation_url: String,
    pub payment_id: PaymentId,
}

/// Opens a checkout: pending payment first, then the gateway session.
#[tracing::instrument(
    name = "create_payment",
    skip_all,
    fields(user_id = %user.id, course_id = %req.course_id, payment_id = tracing::field::Empty)
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    user.require(Role::Client)?;

    let payment = state.ledger.create_pending(user.id, req.course_id).await?;
    tracing::Span::current().record("payment_id", tracing::field::display(payment.id()));

    let request = CreateSession {
        payment_id: payment.id(),
        amount: Money::new(payment.split().gross(), payment.currency()),
        description: format!("Payment for course {}", req.course_id),
        return_url: format!("{}?payment_id={}", state.return_url, payment.id()),
        idempotency_key: payment.id().to_string(),
    };

    let session = state
        .gateway
        .create_session(&request)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "gateway session failed, payment stays pending");
            PipelineError::from(e)
        })?;

    state
        .ledger
        .attach_gateway_ref(payment.id(), &session.id)
        .await?;

    Ok(Json(CreatePaymentResponse {
        confirmation_url: session.confirmation_url,
        payment_id: payment.id(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    pub payment_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReturnResponse {
    pub status: PaymentStatus,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Landing poll after the buyer comes back from the hosted checkout.
#[tracing::instrument(name = "payment_return", skip_all, fields(user_id = %user.id))]
pub async fn payment_return(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ReturnQuery>,
) -> Result<Json<ReturnResponse>, ApiError> {
    let id: PaymentId = query.payment_id.parse()?;

    let payment = state.ledger.lookup(id).await?;
    if payment.payer() != user.id && user.role != Role::Admin {
        return Err(PipelineError::Forbidden("payment belongs to another user".into()).into());
    }

    let result = state.reconciler.reconcile(id).await?;
    let payment = result.payment();
    let message = match (&result, payment.status()) {
        (ReconcileResult::Processing(_), _) | (_, PaymentStatus::Pending) => {
            "payment is processing"
        }
        (_, PaymentStatus::Paid) => "payment succeeded",
        (_, PaymentStatus::Failed) => "payment failed",
    };

    Ok(Json(ReturnResponse {
        status: payment.status(),
        message,
        transaction_id: payment.transaction_ref().map(str::to_owned),
    }))
}

pub async fn list_enrollments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Enrollment>>, ApiError> {
    Ok(Json(state.ledger.enrollments(user.id).await?))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Notification>>, ApiError> {
    Ok(Json(state.ledger.notifications(user.id).await?))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReceiverRequest {
    pub receiver_id: UserId,
}

pub async fn start_chat(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ReceiverRequest>,
) -> Result<Json<ReceiverRequest>, ApiError> {
    state.chat.start_chat(user.id, req.receiver_id).await?;
    Ok(Json(req))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: UserId,
    pub content: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    let message = state
        .chat
        .send_message(user.id, req.receiver_id, req.content)
        .await?;
    Ok(Json(message))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ReceiverRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.chat.mark_read(user.id, req.receiver_id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub user_id: UserId,
    pub amount: MoneyAmount,
}

#[tracing::instrument(name = "payout", skip_all, fields(admin_id = %admin.id))]
pub async fn admin_payout(
    State(state): State<AppState>,
    admin: AuthUser,
    ApiJson(req): ApiJson<PayoutRequest>,
) -> Result<Json<Account>, ApiError> {
    admin.require(Role::Admin)?;
    Ok(Json(state.ledger.payout(req.user_id, req.amount).await?))
}
