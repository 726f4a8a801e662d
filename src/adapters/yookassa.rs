use {
    crate::{
        config::GatewayConfig,
        domain::{
            gateway::{CreateSession, GatewayClient, GatewayError, GatewaySession, RemoteStatus},
            id::GatewaySessionId,
        },
    },
    futures::future::BoxFuture,
    reqwest::{Client, RequestBuilder, Response},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    std::{future::Future, time::Duration},
};

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AmountBody<'a> {
    value: String,
    currency: &'a str,
}

#[derive(Debug, Serialize)]
struct ConfirmationRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    return_url: &'a str,
}

#[derive(Debug, Serialize)]
struct Metadata {
    payment_id: String,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    amount: AmountBody<'a>,
    confirmation: ConfirmationRequest<'a>,
    capture: bool,
    description: &'a str,
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct ConfirmationResponse {
    confirmation_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPayment {
    id: String,
    confirmation: ConfirmationResponse,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusBody {
    status: String,
}

fn remote_status(raw: &str) -> Result<RemoteStatus, GatewayError> {
    match raw {
        "pending" | "waiting_for_capture" => Ok(RemoteStatus::Pending),
        "succeeded" => Ok(RemoteStatus::Succeeded),
        "canceled" | "failed" => Ok(RemoteStatus::Canceled),
        other => Err(GatewayError::MalformedResponse(format!(
            "unknown payment status {other:?}"
        ))),
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

struct Credentials {
    shop_id: String,
    secret_key: String,
}

/// HTTP client for a YooKassa-compatible payments API.
pub struct YooKassaClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl YooKassaClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("building http client: {e}")))?;

        let credentials = match (&config.shop_id, &config.secret_key) {
            (Some(shop_id), Some(secret_key)) => Some(Credentials {
                shop_id: shop_id.clone(),
                secret_key: secret_key.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, GatewayError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(GatewayError::NotConfigured)?;
        Ok(request.basic_auth(&creds.shop_id, Some(&creds.secret_key)))
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent. Backoff doubles after each failure.
    async fn with_retries<T, F, Fut>(&self, op: &str, mut attempt: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut delay = self.retry_backoff;
        let mut tries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable() && tries < self.max_retries => {
                    tries += 1;
                    tracing::warn!(
                        op,
                        attempt = tries,
                        error = %err,
                        "gateway call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }

    async fn create_session_inner(
        &self,
        request: &CreateSession,
    ) -> Result<GatewaySession, GatewayError> {
        let body = CreatePaymentBody {
            amount: AmountBody {
                value: request.amount.amount().value().to_string(),
                currency: request.amount.currency().as_str(),
            },
            confirmation: ConfirmationRequest {
                kind: "redirect",
                return_url: &request.return_url,
            },
            capture: true,
            description: &request.description,
            metadata: Metadata {
                payment_id: request.payment_id.to_string(),
            },
        };

        let this = self;
        let body = &body;
        let created: CreatedPayment = self
            .with_retries("create_session", move || async move {
                let req = this
                    .authorized(this.http.post(format!("{}/payments", this.base_url)))?
                    .header("Idempotence-Key", &request.idempotency_key)
                    .json(body);
                parse_json(send(req).await?).await
            })
            .await?;

        let id = GatewaySessionId::new(created.id)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        tracing::info!(
            payment_id = %request.payment_id,
            gateway_ref = %id,
            "gateway session created"
        );
        Ok(GatewaySession {
            id,
            confirmation_url: created.confirmation.confirmation_url,
        })
    }

    async fn fetch_status_inner(
        &self,
        id: &GatewaySessionId,
    ) -> Result<RemoteStatus, GatewayError> {
        let this = self;
        let body: PaymentStatusBody = self
            .with_retries("fetch_status", move || async move {
                let req = this.authorized(
                    this.http
                        .get(format!("{}/payments/{}", this.base_url, id.as_str())),
                )?;
                parse_json(send(req).await?).await
            })
            .await?;
        remote_status(&body.status)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, GatewayError> {
    let response = request
        .send()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    Err(GatewayError::Rejected {
        status: status.as_u16(),
        body,
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
}

impl GatewayClient for YooKassaClient {
    fn create_session<'a>(
        &'a self,
        request: &'a CreateSession,
    ) -> BoxFuture<'a, Result<GatewaySession, GatewayError>> {
        Box::pin(self.create_session_inner(request))
    }

    fn fetch_status<'a>(
        &'a self,
        id: &'a GatewaySessionId,
    ) -> BoxFuture<'a, Result<RemoteStatus, GatewayError>> {
        Box::pin(self.fetch_status_inner(id))
    }
}
