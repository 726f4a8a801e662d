use {
    super::{
        id::UserId,
        money::{Currency, MoneyAmount},
    },
    chrono::{DateTime, Utc},
    serde::Serialize,
};

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: String,
    pub content: String,
}

impl NewNotification {
    pub fn payment_received(
        provider: UserId,
        course_title: &str,
        net: MoneyAmount,
        currency: Currency,
    ) -> Self {
        Self {
            user_id: provider,
            kind: "payment".into(),
            content: format!("Payment received for \"{course_title}\": {net} {currency}"),
        }
    }
}
