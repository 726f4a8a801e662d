use {
    super::ledger::PaymentLedger,
    crate::domain::{
        error::PipelineError,
        gateway::{GatewayClient, RemoteStatus},
        id::PaymentId,
        payment::{Payment, PaymentStatus, SettleOutcome},
    },
    std::sync::Arc,
};

/// Result of a return-from-checkout poll.
#[derive(Debug, Clone)]
pub enum ReconcileResult {
    /// Gateway has not decided yet; nothing changed locally.
    Processing(Payment),
    /// Payment is terminal, either by this call or an earlier trigger.
    Settled(Payment),
}

impl ReconcileResult {
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Processing(p) | Self::Settled(p) => p,
        }
    }
}

/// Self-service settlement path for when the webhook is late or lost.
pub struct ReturnReconciler {
    ledger: Arc<PaymentLedger>,
    gateway: Arc<dyn GatewayClient>,
}

impl ReturnReconciler {
    pub fn new(ledger: Arc<PaymentLedger>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self { ledger, gateway }
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, id: PaymentId) -> Result<ReconcileResult, PipelineError> {
        let payment = self.ledger.lookup(id).await?;

        if payment.status().is_terminal() {
            return Ok(ReconcileResult::Settled(payment));
        }

        let session = payment
            .gateway_ref()
            .cloned()
            .ok_or_else(|| PipelineError::NotInitialized(id.to_string()))?;

        let outcome = match self.gateway.fetch_status(&session).await? {
            RemoteStatus::Succeeded => SettleOutcome::Paid,
            RemoteStatus::Canceled => SettleOutcome::Failed,
            RemoteStatus::Pending => {
                tracing::info!(payment_id = %id, "gateway still processing");
                return Ok(ReconcileResult::Processing(payment));
            }
        };

        let settlement = self
            .ledger
            .settle(id, outcome, Some(session.into_inner()))
            .await?;
        let payment = settlement.payment().clone();
        debug_assert_ne!(payment.status(), PaymentStatus::Pending);
        Ok(ReconcileResult::Settled(payment))
    }
}
