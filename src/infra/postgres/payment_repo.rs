use {
    crate::domain::{
        account::{Account, Product, Role},
        error::PipelineError,
        id::{GatewaySessionId, PaymentId, ProductId, UserId},
        money::{AmountSplit, Currency, MoneyAmount},
        notification::{NewNotification, Notification},
        payment::{
            Credit, Enrollment, NewPayment, Payment, PaymentParams, PaymentStatus, SettleOutcome,
            Settlement,
        },
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow},
};

const PAYMENT_COLUMNS: &str = "id, user_id, course_id, gross_amount, commission, net_amount, \
     currency, status, gateway_id, transaction_id, created_at";

fn amount(row: &PgRow, column: &str) -> Result<MoneyAmount, PipelineError> {
    MoneyAmount::new(row.try_get::<Decimal, _>(column)?)
}

fn payment_from_row(row: &PgRow) -> Result<Payment, PipelineError> {
    let split = AmountSplit::from_parts(
        amount(row, "gross_amount")?,
        amount(row, "commission")?,
        amount(row, "net_amount")?,
    )?;
    let status: String = row.try_get("status")?;
    let currency: String = row.try_get("currency")?;
    let gateway_ref = row
        .try_get::<Option<String>, _>("gateway_id")?
        .map(GatewaySessionId::new)
        .transpose()?;

    Ok(Payment::new(PaymentParams {
        id: PaymentId::from(row.try_get::<uuid::Uuid, _>("id")?),
        payer: UserId::from(row.try_get::<i64, _>("user_id")?),
        product: ProductId::from(row.try_get::<i64, _>("course_id")?),
        split,
        currency: Currency::try_from(currency.as_str())?,
        status: PaymentStatus::try_from(status.as_str())?,
        gateway_ref,
        transaction_ref: row.try_get("transaction_id")?,
        created_at: row.try_get("created_at")?,
    }))
}

fn account_from_row(row: &PgRow) -> Result<Account, PipelineError> {
    let role: String = row.try_get("role")?;
    Ok(Account {
        id: UserId::from(row.try_get::<i64, _>("id")?),
        role: Role::try_from(role.as_str())?,
        balance: amount(row, "balance")?,
        payout_amount: amount(row, "payout_amount")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, PipelineError> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: UserId::from(row.try_get::<i64, _>("user_id")?),
        kind: row.try_get("type")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        read_at: row.try_get("read_at")?,
    })
}

pub async fn find_product(pool: &PgPool, id: ProductId) -> Result<Option<Product>, PipelineError> {
    let row = sqlx::query("SELECT id, teacher_id, title, net_price FROM courses WHERE id = $1")
        .bind(id.get())
        .fetch_optional(pool)
        .await?;

    row.map(|r| -> Result<Product, PipelineError> {
        Ok(Product {
            id: ProductId::from(r.try_get::<i64, _>("id")?),
            provider: UserId::from(r.try_get::<i64, _>("teacher_id")?),
            title: r.try_get("title")?,
            net_price: amount(&r, "net_price")?,
        })
    })
    .transpose()
}

pub async fn find_account(pool: &PgPool, id: UserId) -> Result<Option<Account>, PipelineError> {
    let row = sqlx::query("SELECT id, role, balance, payout_amount FROM users WHERE id = $1")
        .bind(id.get())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(account_from_row).transpose()
}

pub async fn has_paid(
    pool: &PgPool,
    payer: UserId,
    product: ProductId,
) -> Result<bool, PipelineError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(\
         SELECT 1 FROM payments WHERE user_id = $1 AND course_id = $2 AND status = 'paid')",
    )
    .bind(payer.get())
    .bind(product.get())
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub async fn insert_pending(pool: &PgPool, payment: &NewPayment) -> Result<Payment, PipelineError> {
    let split = payment.split();
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO payments
            (id, user_id, course_id, gross_amount, commission, net_amount,
             currency, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(payment.id().as_uuid())
    .bind(payment.payer().get())
    .bind(payment.product().get())
    .bind(split.gross().value())
    .bind(split.commission().value())
    .bind(split.net().value())
    .bind(payment.currency().as_str())
    .bind(payment.created_at())
    .fetch_one(pool)
    .await?;

    payment_from_row(&row)
}

pub async fn attach_gateway_ref(
    pool: &PgPool,
    id: PaymentId,
    session: &GatewaySessionId,
) -> Result<Payment, PipelineError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE payments SET gateway_id = $2, updated_at = now()
        WHERE id = $1 AND status = 'pending'
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(id.as_uuid())
    .bind(session.as_str())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => payment_from_row(&row),
        None => match find_payment(pool, id).await? {
            Some(p) => Err(PipelineError::Validation(format!(
                "cannot attach gateway session to {} payment {id}",
                p.status()
            ))),
            None => Err(PipelineError::NotFound(format!("payment {id}"))),
        },
    }
}

pub async fn find_payment(pool: &PgPool, id: PaymentId) -> Result<Option<Payment>, PipelineError> {
    let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(payment_from_row).transpose()
}

pub async fn find_by_gateway_ref(
    pool: &PgPool,
    session: &GatewaySessionId,
) -> Result<Option<Payment>, PipelineError> {
    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_id = $1"
    ))
    .bind(session.as_str())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(payment_from_row).transpose()
}

async fn mark_status(
    tx: &mut Transaction<'_, Postgres>,
    id: PaymentId,
    status: PaymentStatus,
    transaction_ref: Option<&str>,
) -> Result<Payment, PipelineError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE payments
        SET status = $2, transaction_id = COALESCE($3, transaction_id), updated_at = now()
        WHERE id = $1
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(id.as_uuid())
    .bind(status.as_str())
    .bind(transaction_ref)
    .fetch_one(&mut **tx)
    .await?;
    payment_from_row(&row)
}

/// Settle a payment: advisory lock on the payment id, terminal check, then
/// status change plus credit, enrollment and notification in one transaction.
pub async fn settle(
    pool: &PgPool,
    id: PaymentId,
    outcome: SettleOutcome,
    transaction_ref: Option<String>,
) -> Result<Settlement, PipelineError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    // Serialize settlement for this payment across service instances.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| PipelineError::NotFound(format!("payment {id}")))?;
    let current = payment_from_row(&row)?;

    if current.status().is_terminal() {
        tx.commit().await?;
        return Ok(Settlement::AlreadySettled(current));
    }

    if outcome == SettleOutcome::Failed {
        let payment =
            mark_status(&mut tx, id, PaymentStatus::Failed, transaction_ref.as_deref()).await?;
        tx.commit().await?;
        return Ok(Settlement::Transitioned {
            payment,
            credit: None,
        });
    }

    let duplicate: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM payments
            WHERE user_id = $1 AND course_id = $2 AND status = 'paid' AND id <> $3
        )
        "#,
    )
    .bind(current.payer().get())
    .bind(current.product().get())
    .bind(id.as_uuid())
    .fetch_one(&mut *tx)
    .await?;

    if duplicate {
        tracing::warn!(
            payment_id = %id,
            payer = %current.payer(),
            product = %current.product(),
            "second paid payment for the same course, recording as failed"
        );
        let payment =
            mark_status(&mut tx, id, PaymentStatus::Failed, transaction_ref.as_deref()).await?;
        tx.commit().await?;
        return Ok(Settlement::Transitioned {
            payment,
            credit: None,
        });
    }

    let course = sqlx::query("SELECT teacher_id, title FROM courses WHERE id = $1")
        .bind(current.product().get())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PipelineError::InvalidProduct(current.product().to_string()))?;
    let provider = UserId::from(course.try_get::<i64, _>("teacher_id")?);
    let title: String = course.try_get("title")?;

    let payment = mark_status(&mut tx, id, PaymentStatus::Paid, transaction_ref.as_deref()).await?;
    let net = payment.split().net();

    let credited = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
        .bind(net.value())
        .bind(provider.get())
        .execute(&mut *tx)
        .await?;
    if credited.rows_affected() != 1 {
        // Dropping `tx` rolls back the status change too.
        return Err(PipelineError::NotFound(format!("user {provider}")));
    }

    let enrolled_at: DateTime<Utc> = sqlx::query_scalar(
        r#"
        INSERT INTO enrollments (user_id, course_id) VALUES ($1, $2)
        ON CONFLICT (user_id, course_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING created_at
        "#,
    )
    .bind(payment.payer().get())
    .bind(payment.product().get())
    .fetch_one(&mut *tx)
    .await?;

    let draft = NewNotification::payment_received(provider, &title, net, payment.currency());
    let row = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, type, content) VALUES ($1, $2, $3)
        RETURNING id, user_id, type, content, created_at, read_at
        "#,
    )
    .bind(draft.user_id.get())
    .bind(&draft.kind)
    .bind(&draft.content)
    .fetch_one(&mut *tx)
    .await?;
    let notification = notification_from_row(&row)?;

    tx.commit().await?;

    Ok(Settlement::Transitioned {
        credit: Some(Credit {
            provider,
            enrollment: Enrollment {
                user_id: payment.payer(),
                course_id: payment.product(),
                created_at: enrolled_at,
            },
            notification,
        }),
        payment,
    })
}

pub async fn record_payout(
    pool: &PgPool,
    user: UserId,
    amount: MoneyAmount,
) -> Result<Account, PipelineError> {
    let row = sqlx::query(
        r#"
        UPDATE users
        SET balance = balance - $1, payout_amount = payout_amount + $1
        WHERE id = $2 AND balance >= $1
        RETURNING id, role, balance, payout_amount
        "#,
    )
    .bind(amount.value())
    .bind(user.get())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => account_from_row(&row),
        None => match find_account(pool, user).await? {
            Some(account) => Err(PipelineError::Validation(format!(
                "insufficient funds: balance {} < payout {amount}",
                account.balance
            ))),
            None => Err(PipelineError::NotFound(format!("user {user}"))),
        },
    }
}

pub async fn list_enrollments(
    pool: &PgPool,
    user: UserId,
) -> Result<Vec<Enrollment>, PipelineError> {
    let rows = sqlx::query(
        "SELECT user_id, course_id, created_at FROM enrollments \
         WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user.get())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| -> Result<Enrollment, PipelineError> {
            Ok(Enrollment {
                user_id: UserId::from(r.try_get::<i64, _>("user_id")?),
                course_id: ProductId::from(r.try_get::<i64, _>("course_id")?),
                created_at: r.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn list_notifications(
    pool: &PgPool,
    user: UserId,
) -> Result<Vec<Notification>, PipelineError> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, type, content, created_at, read_at
        FROM notifications WHERE user_id = $1 ORDER BY created_at DESC
        "#,
    )
    .bind(user.get())
    .fetch_all(pool)
    .await?;
    rows.iter().map(notification_from_row).collect()
}
