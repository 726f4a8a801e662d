use {
    super::{
        error::PipelineError,
        id::{GatewaySessionId, PaymentId, ProductId, UserId},
        money::{AmountSplit, Currency},
        notification::Notification,
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Failed)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(PipelineError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Terminal outcome reported by either settlement trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Paid,
    Failed,
}

impl SettleOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            Self::Paid => PaymentStatus::Paid,
            Self::Failed => PaymentStatus::Failed,
        }
    }
}

/// Everything needed to rebuild a stored payment.
pub struct PaymentParams {
    pub id: PaymentId,
    pub payer: UserId,
    pub product: ProductId,
    pub split: AmountSplit,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub gateway_ref: Option<GatewaySessionId>,
    pub transaction_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    id: PaymentId,
    payer: UserId,
    product: ProductId,
    #[serde(flatten)]
    split: AmountSplit,
    currency: Currency,
    status: PaymentStatus,
    gateway_ref: Option<GatewaySessionId>,
    transaction_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(params: PaymentParams) -> Self {
        Self {
            id: params.id,
            payer: params.payer,
            product: params.product,
            split: params.split,
            currency: params.currency,
            status: params.status,
            gateway_ref: params.gateway_ref,
            transaction_ref: params.transaction_ref,
            created_at: params.created_at,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn payer(&self) -> UserId {
        self.payer
    }

    pub fn product(&self) -> ProductId {
        self.product
    }

    pub fn split(&self) -> &AmountSplit {
        &self.split
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn gateway_ref(&self) -> Option<&GatewaySessionId> {
        self.gateway_ref.as_ref()
    }

    pub fn transaction_ref(&self) -> Option<&str> {
        self.transaction_ref.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn attach_gateway_ref(&mut self, session: GatewaySessionId) -> Result<(), PipelineError> {
        if self.status.is_terminal() {
            return Err(PipelineError::Validation(format!(
                "cannot attach gateway session to {} payment {}",
                self.status, self.id
            )));
        }
        self.gateway_ref = Some(session);
        Ok(())
    }

    pub fn transition_status(
        &mut self,
        new: PaymentStatus,
        transaction_ref: Option<String>,
    ) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(&new) {
            return Err(PipelineError::Validation(format!(
                "invalid status transition: {} → {}",
                self.status, new
            )));
        }

        self.status = new;
        if transaction_ref.is_some() {
            self.transaction_ref = transaction_ref;
        }
        Ok(())
    }
}

/// For INSERT: id generated in Rust via `Uuid::now_v7()`, status always Pending.
#[derive(Debug, Clone)]
pub struct NewPayment {
    id: PaymentId,
    payer: UserId,
    product: ProductId,
    split: AmountSplit,
    currency: Currency,
    created_at: DateTime<Utc>,
}

impl NewPayment {
    pub fn new(payer: UserId, product: ProductId, split: AmountSplit, currency: Currency) -> Self {
        Self {
            id: PaymentId::generate(),
            payer,
            product,
            split,
            currency,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn payer(&self) -> UserId {
        self.payer
    }

    pub fn product(&self) -> ProductId {
        self.product
    }

    pub fn split(&self) -> &AmountSplit {
        &self.split
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn into_payment(self) -> Payment {
        Payment::new(PaymentParams {
            id: self.id,
            payer: self.payer,
            product: self.product,
            split: self.split,
            currency: self.currency,
            status: PaymentStatus::Pending,
            gateway_ref: None,
            transaction_ref: None,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: ProductId,
    pub created_at: DateTime<Utc>,
}

/// Side effects applied by the first transition to `Paid`.
#[derive(Debug, Clone)]
pub struct Credit {
    pub provider: UserId,
    pub enrollment: Enrollment,
    pub notification: Notification,
}

/// What a store reports back from a settlement attempt.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// This call moved the payment out of `Pending`. `credit` is set only
    /// when the payment became `Paid`.
    Transitioned {
        payment: Payment,
        credit: Option<Credit>,
    },
    /// The payment was already terminal; nothing was applied.
    AlreadySettled(Payment),
}

impl Settlement {
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Transitioned { payment, .. } | Self::AlreadySettled(payment) => payment,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::AlreadySettled(_))
    }
}
