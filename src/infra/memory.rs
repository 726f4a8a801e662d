use {
    crate::domain::{
        account::{Account, Product, Role},
        chat::{ChatMessage, NewMessage},
        error::PipelineError,
        id::{GatewaySessionId, PaymentId, ProductId, UserId},
        money::MoneyAmount,
        notification::{NewNotification, Notification},
        payment::{
            Credit, Enrollment, NewPayment, Payment, PaymentStatus, SettleOutcome, Settlement,
        },
        store::{ChatStore, LedgerStore, StoreResult},
    },
    chrono::Utc,
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
    },
    tokio::sync::RwLock,
};

#[derive(Default)]
struct State {
    accounts: HashMap<UserId, Account>,
    products: HashMap<ProductId, Product>,
    payments: HashMap<PaymentId, Payment>,
    enrollments: Vec<Enrollment>,
    notifications: Vec<Notification>,
    dialogs: HashSet<(UserId, UserId)>,
    messages: Vec<ChatMessage>,
}

impl State {
    fn paid_exists(&self, payer: UserId, product: ProductId, except: Option<PaymentId>) -> bool {
        self.payments.values().any(|p| {
            p.payer() == payer
                && p.product() == product
                && p.status() == PaymentStatus::Paid
                && Some(p.id()) != except
        })
    }

    fn payment_mut(&mut self, id: PaymentId) -> Result<&mut Payment, PipelineError> {
        self.payments
            .get_mut(&id)
            .ok_or_else(|| PipelineError::NotFound(format!("payment {id}")))
    }

    fn fail(
        &mut self,
        id: PaymentId,
        transaction_ref: Option<String>,
    ) -> Result<Settlement, PipelineError> {
        let payment = self.payment_mut(id)?;
        payment.transition_status(PaymentStatus::Failed, transaction_ref)?;
        Ok(Settlement::Transitioned {
            payment: payment.clone(),
            credit: None,
        })
    }

    fn settle(
        &mut self,
        id: PaymentId,
        outcome: SettleOutcome,
        transaction_ref: Option<String>,
    ) -> Result<Settlement, PipelineError> {
        let current = self.payment_mut(id)?.clone();
        if current.status().is_terminal() {
            return Ok(Settlement::AlreadySettled(current));
        }

        if outcome == SettleOutcome::Failed {
            return self.fail(id, transaction_ref);
        }
        if self.paid_exists(current.payer(), current.product(), Some(id)) {
            tracing::warn!(
                payment_id = %id,
                payer = %current.payer(),
                product = %current.product(),
                "second paid payment for the same course, recording as failed"
            );
            return self.fail(id, transaction_ref);
        }

        // Check every effect before mutating anything.
        let product = self
            .products
            .get(&current.product())
            .cloned()
            .ok_or_else(|| PipelineError::InvalidProduct(current.product().to_string()))?;
        let net = current.split().net();
        let balance = self
            .accounts
            .get(&product.provider)
            .ok_or_else(|| PipelineError::NotFound(format!("user {}", product.provider)))?
            .balance
            .checked_add(net)
            .ok_or_else(|| {
                PipelineError::Validation(format!("balance overflow for user {}", product.provider))
            })?;

        let now = Utc::now();
        let draft = NewNotification::payment_received(
            product.provider,
            &product.title,
            net,
            current.currency(),
        );
        let notification = Notification {
            id: self.notifications.len() as i64 + 1,
            user_id: draft.user_id,
            kind: draft.kind,
            content: draft.content,
            created_at: now,
            read_at: None,
        };
        let enrollment = Enrollment {
            user_id: current.payer(),
            course_id: current.product(),
            created_at: now,
        };

        let payment = self.payment_mut(id)?;
        payment.transition_status(PaymentStatus::Paid, transaction_ref)?;
        let payment = payment.clone();

        if let Some(account) = self.accounts.get_mut(&product.provider) {
            account.balance = balance;
        }
        if !self
            .enrollments
            .iter()
            .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id)
        {
            self.enrollments.push(enrollment.clone());
        }
        self.notifications.push(notification.clone());

        Ok(Settlement::Transitioned {
            payment,
            credit: Some(Credit {
                provider: product.provider,
                enrollment,
                notification,
            }),
        })
    }

    fn record_payout(
        &mut self,
        user: UserId,
        amount: MoneyAmount,
    ) -> Result<Account, PipelineError> {
        let account = self
            .accounts
            .get_mut(&user)
            .ok_or_else(|| PipelineError::NotFound(format!("user {user}")))?;
        let balance = account.balance.checked_sub(amount).ok_or_else(|| {
            PipelineError::Validation(format!(
                "insufficient funds: balance {} < payout {amount}",
                account.balance
            ))
        })?;
        let paid_out = account
            .payout_amount
            .checked_add(amount)
            .ok_or_else(|| PipelineError::Validation("payout total overflow".into()))?;
        account.balance = balance;
        account.payout_amount = paid_out;
        Ok(account.clone())
    }
}

/// Whole-state store behind one lock, so every operation is atomic.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_account(&self, id: UserId, role: Role) {
        self.state.write().await.accounts.insert(
            id,
            Account {
                id,
                role,
                balance: MoneyAmount::ZERO,
                payout_amount: MoneyAmount::ZERO,
            },
        );
    }

    pub async fn insert_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id, product);
    }

    fn read<'a, T, F>(&'a self, f: F) -> StoreResult<'a, T>
    where
        T: Send + 'a,
        F: FnOnce(&State) -> Result<T, PipelineError> + Send + 'a,
    {
        Box::pin(async move {
            let state = self.state.read().await;
            f(&*state)
        })
    }

    fn write<'a, T, F>(&'a self, f: F) -> StoreResult<'a, T>
    where
        T: Send + 'a,
        F: FnOnce(&mut State) -> Result<T, PipelineError> + Send + 'a,
    {
        Box::pin(async move {
            let mut state = self.state.write().await;
            f(&mut *state)
        })
    }
}

impl LedgerStore for InMemoryStore {
    fn find_product(&self, id: ProductId) -> StoreResult<'_, Option<Product>> {
        self.read(move |s| Ok(s.products.get(&id).cloned()))
    }

    fn find_account(&self, id: UserId) -> StoreResult<'_, Option<Account>> {
        self.read(move |s| Ok(s.accounts.get(&id).cloned()))
    }

    fn has_paid(&self, payer: UserId, product: ProductId) -> StoreResult<'_, bool> {
        self.read(move |s| Ok(s.paid_exists(payer, product, None)))
    }

    fn insert_pending<'a>(&'a self, payment: &'a NewPayment) -> StoreResult<'a, Payment> {
        self.write(move |s| {
            if !s.products.contains_key(&payment.product()) {
                return Err(PipelineError::InvalidProduct(payment.product().to_string()));
            }
            let stored = payment.clone().into_payment();
            s.payments.insert(stored.id(), stored.clone());
            Ok(stored)
        })
    }

    fn attach_gateway_ref<'a>(
        &'a self,
        id: PaymentId,
        session: &'a GatewaySessionId,
    ) -> StoreResult<'a, Payment> {
        self.write(move |s| {
            let payment = s.payment_mut(id)?;
            payment.attach_gateway_ref(session.clone())?;
            Ok(payment.clone())
        })
    }

    fn find_payment(&self, id: PaymentId) -> StoreResult<'_, Option<Payment>> {
        self.read(move |s| Ok(s.payments.get(&id).cloned()))
    }

    fn find_by_gateway_ref<'a>(
        &'a self,
        session: &'a GatewaySessionId,
    ) -> StoreResult<'a, Option<Payment>> {
        self.read(move |s| {
            Ok(s.payments
                .values()
                .find(|p| p.gateway_ref() == Some(session))
                .cloned())
        })
    }

    fn settle(
        &self,
        id: PaymentId,
        outcome: SettleOutcome,
        transaction_ref: Option<String>,
    ) -> StoreResult<'_, Settlement> {
        self.write(move |s| s.settle(id, outcome, transaction_ref))
    }

    fn record_payout(&self, user: UserId, amount: MoneyAmount) -> StoreResult<'_, Account> {
        self.write(move |s| s.record_payout(user, amount))
    }

    fn list_enrollments(&self, user: UserId) -> StoreResult<'_, Vec<Enrollment>> {
        self.read(move |s| {
            Ok(s.enrollments
                .iter()
                .filter(|e| e.user_id == user)
                .cloned()
                .collect())
        })
    }

    fn list_notifications(&self, user: UserId) -> StoreResult<'_, Vec<Notification>> {
        self.read(move |s| {
            Ok(s.notifications
                .iter()
                .filter(|n| n.user_id == user)
                .cloned()
                .collect())
        })
    }
}

fn dialog_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl ChatStore for InMemoryStore {
    fn ensure_dialog(&self, a: UserId, b: UserId) -> StoreResult<'_, bool> {
        self.write(move |s| Ok(s.dialogs.insert(dialog_key(a, b))))
    }

    fn insert_message<'a>(&'a self, message: &'a NewMessage) -> StoreResult<'a, ChatMessage> {
        self.write(move |s| {
            let stored = ChatMessage {
                id: s.messages.len() as i64 + 1,
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
                content: message.content.clone(),
                created_at: Utc::now(),
                read_at: None,
            };
            s.messages.push(stored.clone());
            Ok(stored)
        })
    }

    fn mark_read(&self, reader: UserId, counterpart: UserId) -> StoreResult<'_, u64> {
        self.write(move |s| {
            let now = Utc::now();
            let mut updated = 0;
            for m in s.messages.iter_mut().filter(|m| {
                m.sender_id == counterpart && m.receiver_id == reader && m.read_at.is_none()
            }) {
                m.read_at = Some(now);
                updated += 1;
            }
            Ok(updated)
        })
    }
}
