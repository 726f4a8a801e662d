use {
    super::dispatcher::{DeliveryReport, PushDispatcher},
    crate::domain::{
        chat::{ChatMessage, NewMessage},
        error::PipelineError,
        event::PushEvent,
        id::UserId,
        store::ChatStore,
    },
    std::sync::Arc,
};

const MAX_MESSAGE_LEN: usize = 4000;

pub struct ChatService {
    store: Arc<dyn ChatStore>,
    dispatcher: PushDispatcher,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, dispatcher: PushDispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn start_chat(
        &self,
        user: UserId,
        receiver: UserId,
    ) -> Result<DeliveryReport, PipelineError> {
        if user == receiver {
            return Err(PipelineError::Validation(
                "cannot start a chat with yourself".into(),
            ));
        }
        if self.store.ensure_dialog(user, receiver).await? {
            tracing::info!(user_id = %user, receiver_id = %receiver, "dialog created");
        }
        Ok(self.dispatcher.notify(
            &[user],
            &PushEvent::ChatStarted {
                receiver_id: receiver,
            },
        ))
    }

    pub async fn send_message(
        &self,
        sender: UserId,
        receiver: UserId,
        content: String,
    ) -> Result<ChatMessage, PipelineError> {
        let content = content.trim().to_owned();
        if content.is_empty() {
            return Err(PipelineError::Validation("message is empty".into()));
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(PipelineError::Validation(format!(
                "message exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }

        let message = self
            .store
            .insert_message(&NewMessage {
                sender_id: sender,
                receiver_id: receiver,
                content,
            })
            .await?;

        let report = self
            .dispatcher
            .notify(&[sender, receiver], &PushEvent::Message(message.clone()));
        tracing::info!(
            message_id = message.id,
            sender_id = %sender,
            receiver_id = %receiver,
            delivered = report.delivered.len(),
            "message sent"
        );
        Ok(message)
    }

    pub async fn mark_read(
        &self,
        reader: UserId,
        counterpart: UserId,
    ) -> Result<u64, PipelineError> {
        self.store.mark_read(reader, counterpart).await
    }
}
