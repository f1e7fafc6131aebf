//! Outbound notifications. Delivery mechanics (push tokens, message
//! templates) live outside this service; the core only states which party
//! must hear about which event. Dispatch failures are logged and never
//! fail the operation that triggered them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationEvent {
    BookingRequested,
    BookingAccepted,
    BookingRejected,
    BookingCancelled,
    ProviderOnTheWay,
    JobStarted,
    JobCompleted,
    ProviderArrived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", content = "id", tag = "party")]
pub enum Recipient {
    Customer(Uuid),
    Provider(Uuid),
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub booking_id: Uuid,
    pub event: NotificationEvent,
    pub actor_name: String,
    pub service_name: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Default sink: structured log lines, picked up by whatever delivery
/// pipeline fronts this service.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            booking_id = %notification.booking_id,
            event = ?notification.event,
            recipient = ?notification.recipient,
            actor = %notification.actor_name,
            service = %notification.service_name,
            "notification dispatched"
        );
        Ok(())
    }
}
