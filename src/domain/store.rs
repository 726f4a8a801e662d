//! Persistence ports. `PgStore` backs production, `InMemoryStore` backs
//! tests and database-less local runs.

use {
    super::{
        account::{Account, Product},
        chat::{ChatMessage, NewMessage},
        error::PipelineError,
        id::{GatewaySessionId, PaymentId, ProductId, UserId},
        money::MoneyAmount,
        notification::Notification,
        payment::{Enrollment, NewPayment, Payment, SettleOutcome, Settlement},
    },
    futures::future::BoxFuture,
};

pub type StoreResult<'a, T> = BoxFuture<'a, Result<T, PipelineError>>;

pub trait LedgerStore: Send + Sync {
    fn find_product(&self, id: ProductId) -> StoreResult<'_, Option<Product>>;

    fn find_account(&self, id: UserId) -> StoreResult<'_, Option<Account>>;

    /// Whether a `Paid` payment exists for this (payer, product) pair.
    fn has_paid(&self, payer: UserId, product: ProductId) -> StoreResult<'_, bool>;

    fn insert_pending<'a>(&'a self, payment: &'a NewPayment) -> StoreResult<'a, Payment>;

    fn attach_gateway_ref<'a>(
        &'a self,
        id: PaymentId,
        session: &'a GatewaySessionId,
    ) -> StoreResult<'a, Payment>;

    fn find_payment(&self, id: PaymentId) -> StoreResult<'_, Option<Payment>>;

    fn find_by_gateway_ref<'a>(
        &'a self,
        session: &'a GatewaySessionId,
    ) -> StoreResult<'a, Option<Payment>>;

    /// Moves a `Pending` payment to its terminal state and, for `Paid`,
    /// applies balance credit, enrollment and notification as one unit.
    /// Already-terminal payments are returned untouched.
    fn settle(
        &self,
        id: PaymentId,
        outcome: SettleOutcome,
        transaction_ref: Option<String>,
    ) -> StoreResult<'_, Settlement>;

    /// Debits `amount` from the balance and adds it to the paid-out total.
    fn record_payout(&self, user: UserId, amount: MoneyAmount) -> StoreResult<'_, Account>;

    fn list_enrollments(&self, user: UserId) -> StoreResult<'_, Vec<Enrollment>>;

    fn list_notifications(&self, user: UserId) -> StoreResult<'_, Vec<Notification>>;
}

pub trait ChatStore: Send + Sync {
    /// Returns `true` when a new dialog was created.
    fn ensure_dialog(&self, a: UserId, b: UserId) -> StoreResult<'_, bool>;

    fn insert_message<'a>(&'a self, message: &'a NewMessage) -> StoreResult<'a, ChatMessage>;

    /// Marks messages from `counterpart` to `reader` as read.
    fn mark_read(&self, reader: UserId, counterpart: UserId) -> StoreResult<'_, u64>;
}
