use {
    super::{dispatcher::PushDispatcher, locks::KeyedLocks},
    crate::domain::{
        account::Account,
        error::PipelineError,
        event::PushEvent,
        id::{GatewaySessionId, PaymentId, ProductId, UserId},
        money::{CommissionPolicy, Currency, MoneyAmount},
        notification::Notification,
        payment::{Enrollment, NewPayment, Payment, SettleOutcome, Settlement},
        store::LedgerStore,
    },
    std::sync::Arc,
};

/// Owns the payment lifecycle and the money it moves.
pub struct PaymentLedger {
    store: Arc<dyn LedgerStore>,
    dispatcher: PushDispatcher,
    policy: CommissionPolicy,
    currency: Currency,
    locks: KeyedLocks<PaymentId>,
}

impl PaymentLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        dispatcher: PushDispatcher,
        policy: CommissionPolicy,
        currency: Currency,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy,
            currency,
            locks: KeyedLocks::new(),
        }
    }

    /// Persists a `Pending` payment for `payer` buying `product`.
    ///
    /// Runs before any gateway call, so a failed checkout still leaves a
    /// record that can be retried or reconciled.
    #[tracing::instrument(skip(self), fields(payment_id = tracing::field::Empty))]
    pub async fn create_pending(
        &self,
        payer: UserId,
        product: ProductId,
    ) -> Result<Payment, PipelineError> {
        let course = self
            .store
            .find_product(product)
            .await?
            .ok_or_else(|| PipelineError::InvalidProduct(product.to_string()))?;

        if self.store.has_paid(payer, product).await? {
            return Err(PipelineError::AlreadyPurchased {
                payer: payer.to_string(),
                product: product.to_string(),
            });
        }

        let split = self.policy.split(course.net_price)?;
        let new = NewPayment::new(payer, product, split, self.currency);
        let payment = self.store.insert_pending(&new).await?;

        tracing::Span::current().record("payment_id", tracing::field::display(payment.id()));
        tracing::info!(
            gross = %split.gross(),
            commission = %split.commission(),
            net = %split.net(),
            "pending payment created"
        );
        Ok(payment)
    }

    pub async fn attach_gateway_ref(
        &self,
        id: PaymentId,
        session: &GatewaySessionId,
    ) -> Result<Payment, PipelineError> {
        let _guard = self.locks.acquire(id).await;
        let payment = self.store.attach_gateway_ref(id, session).await?;
        tracing::info!(payment_id = %id, gateway_ref = %session, "gateway session attached");
        Ok(payment)
    }

    /// The only way a payment leaves `Pending`.
    ///
    /// Serialized per payment: the terminal check and all effects happen
    /// inside one critical section, so the return poll and the webhook can
    /// race freely and effects still apply once.
    #[tracing::instrument(skip(self, transaction_ref))]
    pub async fn settle(
        &self,
        id: PaymentId,
        outcome: SettleOutcome,
        transaction_ref: Option<String>,
    ) -> Result<Settlement, PipelineError> {
        let _guard = self.locks.acquire(id).await;
        let settlement = self.store.settle(id, outcome, transaction_ref).await?;

        match &settlement {
            Settlement::AlreadySettled(payment) => {
                tracing::info!(
                    payment_id = %id,
                    status = %payment.status(),
                    "payment already settled, nothing to apply"
                );
            }
            Settlement::Transitioned {
                payment,
                credit: Some(credit),
            } => {
                tracing::info!(
                    payment_id = %id,
                    provider = %credit.provider,
                    net = %payment.split().net(),
                    enrolled_user = %credit.enrollment.user_id,
                    course_id = %credit.enrollment.course_id,
                    "payment settled as paid"
                );
                self.dispatcher.notify(
                    &[credit.provider],
                    &PushEvent::Notification(credit.notification.clone()),
                );
            }
            Settlement::Transitioned {
                payment,
                credit: None,
            } => {
                tracing::info!(payment_id = %id, status = %payment.status(), "payment settled");
            }
        }

        Ok(settlement)
    }

    pub async fn lookup(&self, id: PaymentId) -> Result<Payment, PipelineError> {
        self.store
            .find_payment(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("payment {id}")))
    }

    pub async fn lookup_by_gateway_ref(
        &self,
        session: &GatewaySessionId,
    ) -> Result<Option<Payment>, PipelineError> {
        self.store.find_by_gateway_ref(session).await
    }

    /// Moves `amount` from a provider's balance to their paid-out total.
    #[tracing::instrument(skip(self))]
    pub async fn payout(
        &self,
        user: UserId,
        amount: MoneyAmount,
    ) -> Result<Account, PipelineError> {
        if amount.is_zero() {
            return Err(PipelineError::Validation(
                "payout amount must be positive".into(),
            ));
        }
        let account = self.store.record_payout(user, amount).await?;
        tracing::info!(
            balance = %account.balance,
            paid_out = %account.payout_amount,
            "payout recorded"
        );
        Ok(account)
    }

    pub async fn enrollments(&self, user: UserId) -> Result<Vec<Enrollment>, PipelineError> {
        self.store.list_enrollments(user).await
    }

    pub async fn notifications(&self, user: UserId) -> Result<Vec<Notification>, PipelineError> {
        self.store.list_notifications(user).await
    }

    pub async fn account(&self, user: UserId) -> Result<Account, PipelineError> {
        self.store
            .find_account(user)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("user {user}")))
    }
}
