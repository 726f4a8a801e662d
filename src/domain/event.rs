use {
    super::{chat::ChatMessage, id::UserId, notification::Notification},
    serde::Serialize,
};

/// Server→client push frame, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum PushEvent {
    #[serde(rename = "message")]
    Message(ChatMessage),

    #[serde(rename = "notification")]
    Notification(Notification),

    #[serde(rename = "chat:started")]
    ChatStarted { receiver_id: UserId },
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Notification(_) => "notification",
            Self::ChatStarted { .. } => "chat:started",
        }
    }
}
