pub mod chat_repo;
pub mod payment_repo;

use {
    crate::domain::{
        account::{Account, Product},
        chat::{ChatMessage, NewMessage},
        id::{GatewaySessionId, PaymentId, ProductId, UserId},
        money::MoneyAmount,
        notification::Notification,
        payment::{Enrollment, NewPayment, Payment, SettleOutcome, Settlement},
        store::{ChatStore, LedgerStore, StoreResult},
    },
    sqlx::PgPool,
};

/// Postgres-backed store; each call checks out its own connection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl LedgerStore for PgStore {
    fn find_product(&self, id: ProductId) -> StoreResult<'_, Option<Product>> {
        Box::pin(payment_repo::find_product(&self.pool, id))
    }

    fn find_account(&self, id: UserId) -> StoreResult<'_, Option<Account>> {
        Box::pin(payment_repo::find_account(&self.pool, id))
    }

    fn has_paid(&self, payer: UserId, product: ProductId) -> StoreResult<'_, bool> {
        Box::pin(payment_repo::has_paid(&self.pool, payer, product))
    }

    fn insert_pending<'a>(&'a self, payment: &'a NewPayment) -> StoreResult<'a, Payment> {
        Box::pin(payment_repo::insert_pending(&self.pool, payment))
    }

    fn attach_gateway_ref<'a>(
        &'a self,
        id: PaymentId,
        session: &'a GatewaySessionId,
    ) -> StoreResult<'a, Payment> {
        Box::pin(payment_repo::attach_gateway_ref(&self.pool, id, session))
    }

    fn find_payment(&self, id: PaymentId) -> StoreResult<'_, Option<Payment>> {
        Box::pin(payment_repo::find_payment(&self.pool, id))
    }

    fn find_by_gateway_ref<'a>(
        &'a self,
        session: &'a GatewaySessionId,
    ) -> StoreResult<'a, Option<Payment>> {
        Box::pin(payment_repo::find_by_gateway_ref(&self.pool, session))
    }

    fn settle(
        &self,
        id: PaymentId,
        outcome: SettleOutcome,
        transaction_ref: Option<String>,
    ) -> StoreResult<'_, Settlement> {
        Box::pin(payment_repo::settle(&self.pool, id, outcome, transaction_ref))
    }

    fn record_payout(&self, user: UserId, amount: MoneyAmount) -> StoreResult<'_, Account> {
        Box::pin(payment_repo::record_payout(&self.pool, user, amount))
    }

    fn list_enrollments(&self, user: UserId) -> StoreResult<'_, Vec<Enrollment>> {
        Box::pin(payment_repo::list_enrollments(&self.pool, user))
    }

    fn list_notifications(&self, user: UserId) -> StoreResult<'_, Vec<Notification>> {
        Box::pin(payment_repo::list_notifications(&self.pool, user))
    }
}

impl ChatStore for PgStore {
    fn ensure_dialog(&self, a: UserId, b: UserId) -> StoreResult<'_, bool> {
        Box::pin(chat_repo::ensure_dialog(&self.pool, a, b))
    }

    fn insert_message<'a>(&'a self, message: &'a NewMessage) -> StoreResult<'a, ChatMessage> {
        Box::pin(chat_repo::insert_message(&self.pool, message))
    }

    fn mark_read(&self, reader: UserId, counterpart: UserId) -> StoreResult<'_, u64> {
        Box::pin(chat_repo::mark_read(&self.pool, reader, counterpart))
    }
}
