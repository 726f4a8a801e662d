use {
    super::registry::ConnectionRegistry,
    crate::domain::{error::PipelineError, event::PushEvent, id::UserId},
    std::sync::Arc,
};

/// Per-recipient result of one dispatch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<UserId>,
    pub offline: Vec<UserId>,
}

#[derive(Clone)]
pub struct PushDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl PushDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Serializes once and delivers to each recipient independently.
    pub fn dispatch(
        &self,
        recipients: &[UserId],
        event: &PushEvent,
    ) -> Result<DeliveryReport, PipelineError> {
        let payload = serde_json::to_string(event)?;
        let mut report = DeliveryReport::default();

        for &user in recipients {
            if self.registry.send(user, &payload) {
                report.delivered.push(user);
            } else {
                report.offline.push(user);
            }
        }

        tracing::debug!(
            kind = event.kind(),
            delivered = report.delivered.len(),
            offline = report.offline.len(),
            "push dispatched"
        );
        Ok(report)
    }

    /// Fire-and-forget variant for callers that already committed state.
    pub fn notify(&self, recipients: &[UserId], event: &PushEvent) -> DeliveryReport {
        self.dispatch(recipients, event).unwrap_or_else(|e| {
            tracing::error!(kind = event.kind(), error = %e, "failed to serialize push event");
            DeliveryReport::default()
        })
    }
}
