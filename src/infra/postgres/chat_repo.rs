use {
    crate::domain::{
        chat::{ChatMessage, NewMessage},
        error::PipelineError,
        id::UserId,
    },
    sqlx::{PgPool, Row},
};

pub async fn ensure_dialog(pool: &PgPool, a: UserId, b: UserId) -> Result<bool, PipelineError> {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let created = sqlx::query(
        "INSERT INTO dialogs (user_low, user_high) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(low.get())
    .bind(high.get())
    .execute(pool)
    .await?;
    Ok(created.rows_affected() == 1)
}

pub async fn insert_message(
    pool: &PgPool,
    message: &NewMessage,
) -> Result<ChatMessage, PipelineError> {
    let row = sqlx::query(
        r#"
        INSERT INTO messages (sender_id, receiver_id, content)
        VALUES ($1, $2, $3)
        RETURNING id, sender_id, receiver_id, content, created_at, read_at
        "#,
    )
    .bind(message.sender_id.get())
    .bind(message.receiver_id.get())
    .bind(&message.content)
    .fetch_one(pool)
    .await?;

    Ok(ChatMessage {
        id: row.try_get("id")?,
        sender_id: UserId::from(row.try_get::<i64, _>("sender_id")?),
        receiver_id: UserId::from(row.try_get::<i64, _>("receiver_id")?),
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        read_at: row.try_get("read_at")?,
    })
}

pub async fn mark_read(
    pool: &PgPool,
    reader: UserId,
    counterpart: UserId,
) -> Result<u64, PipelineError> {
    let updated = sqlx::query(
        r#"
        UPDATE messages SET read_at = now()
        WHERE sender_id = $1 AND receiver_id = $2 AND read_at IS NULL
        "#,
    )
    .bind(counterpart.get())
    .bind(reader.get())
    .execute(pool)
    .await?;
    Ok(updated.rows_affected())
}
