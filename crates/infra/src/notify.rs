//! Outbound notifications (verification / password-reset mail).
//!
//! Workflows hand a `Notification` to a `Notifier` and return immediately.
//! `DispatchNotifier` queues it for a background tokio task that delivers it
//! through a `NotificationSink`; delivery failures are logged, never retried,
//! and never surface to the workflow.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use learnhub_auth::{Email, TokenSecret};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    AccountVerification,
    PasswordReset,
}

impl Template {
    pub fn id(&self) -> &'static str {
        match self {
            Template::AccountVerification => "account_verification",
            Template::PasswordReset => "password_reset",
        }
    }
}

/// Template data. The token's `Debug` is redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub fullname: String,
    pub email: Email,
    pub token: TokenSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub destination: Email,
    pub template: Template,
    pub payload: NotificationPayload,
}

/// Fire-and-forget dispatch. Must not block on delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Actual delivery channel (SMTP relay, HTTP mail API, ...).
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Sink that only records the dispatch in the log (dev default).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait::async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            destination = %notification.destination,
            template = notification.template.id(),
            "notification dispatched"
        );
        Ok(())
    }
}

/// Queues notifications for the background delivery worker.
#[derive(Debug, Clone)]
pub struct DispatchNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier for DispatchNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("notification worker stopped; notification dropped");
        }
    }
}

/// Handle to join the delivery worker.
#[derive(Debug)]
pub struct WorkerHandle {
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Wait until every queued notification has been attempted.
    ///
    /// The worker exits once all `DispatchNotifier` clones are dropped.
    pub async fn drain(self) {
        let _ = self.join.await;
    }
}

/// Spawn the delivery worker on the current tokio runtime.
pub fn spawn_dispatcher<K: NotificationSink>(sink: K) -> (DispatchNotifier, WorkerHandle) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

    let join = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            if let Err(err) = sink.deliver(&notification).await {
                warn!(
                    destination = %notification.destination,
                    template = notification.template.id(),
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    });

    (DispatchNotifier { tx }, WorkerHandle { join })
}

/// Keeps every notification in memory (tests, local tooling).
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Most recent token sent to `email` with `template`.
    pub fn last_token(&self, email: &str, template: Template) -> Option<TokenSecret> {
        self.sent()
            .into_iter()
            .rev()
            .find(|n| n.destination.as_str() == email && n.template == template)
            .map(|n| n.payload.token)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
