//! Decoupled notification delivery.
//!
//! The engine never talks to a transport directly: it enqueues an event and
//! moves on, so a slow or dead transport cannot stall or fail a transition.
//! A background dispatcher drains the queue, retries transient failures a
//! bounded number of times, then drops the event with a warning.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::request::{ClientId, RequestId, RequestStatus, Role};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Everyone currently holding the role.
    Role(Role),
    Client(ClientId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub request_id: RequestId,
    pub recipient: Recipient,
    pub status: RequestStatus,
    pub message: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification transport failure: {0}")]
pub struct TransportFailure(pub String);

/// Delivery transport. Implementations wrap whatever channel the deployment
/// uses; the dispatcher only cares about success or failure.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TransportFailure>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, retry_delay_ms: 200 }
    }
}

/// Producer half handed to the engine. Enqueueing never blocks and never
/// fails the caller; a closed queue only logs.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<NotificationEvent>,
}

impl NotificationQueue {
    pub fn enqueue(&self, event: NotificationEvent) {
        if self.sender.send(event).is_err() {
            tracing::warn!(event_name = "notify.queue_closed", "dropping notification, dispatcher is gone");
        }
    }
}

pub fn notification_channel() -> (NotificationQueue, mpsc::UnboundedReceiver<NotificationEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (NotificationQueue { sender }, receiver)
}

/// Drains the queue until the producer side is dropped. Each event gets up to
/// `policy.max_attempts` delivery attempts with a fixed delay in between;
/// exhausted events are dropped, never requeued.
pub fn spawn_dispatcher(
    mut receiver: mpsc::UnboundedReceiver<NotificationEvent>,
    port: Arc<dyn NotificationPort>,
    policy: DispatchPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match port.deliver(&event).await {
                    Ok(()) => break,
                    Err(failure) if attempt < policy.max_attempts => {
                        tracing::debug!(
                            event_name = "notify.retry",
                            request_id = %event.request_id.0,
                            attempt,
                            error = %failure,
                            "delivery failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(policy.retry_delay_ms)).await;
                    }
                    Err(failure) => {
                        tracing::warn!(
                            event_name = "notify.dropped",
                            request_id = %event.request_id.0,
                            attempts = attempt,
                            error = %failure,
                            "delivery failed permanently, dropping event"
                        );
                        break;
                    }
                }
            }
        }
    })
}

/// Test transport: records deliveries and can be told to fail the first N
/// attempts to exercise the retry path.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    inner: Arc<Mutex<NotifierInner>>,
}

#[derive(Default)]
struct NotifierInner {
    delivered: Vec<NotificationEvent>,
    failures_remaining: u32,
    attempts: u32,
}

impl InMemoryNotifier {
    pub fn failing_first(attempts: u32) -> Self {
        let notifier = Self::default();
        notifier.lock().failures_remaining = attempts;
        notifier
    }

    pub fn delivered(&self) -> Vec<NotificationEvent> {
        self.lock().delivered.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NotifierInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl NotificationPort for InMemoryNotifier {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TransportFailure> {
        let mut inner = self.lock();
        inner.attempts += 1;
        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Err(TransportFailure("injected transport outage".to_string()));
        }
        inner.delivered.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::domain::request::{ClientId, RequestId, RequestStatus};
    use crate::notify::{
        notification_channel, spawn_dispatcher, DispatchPolicy, InMemoryNotifier,
        NotificationEvent, Recipient,
    };

    fn event(id: &str) -> NotificationEvent {
        NotificationEvent {
            request_id: RequestId(id.to_string()),
            recipient: Recipient::Client(ClientId(7)),
            status: RequestStatus::Completed,
            message: "your request is complete".to_string(),
        }
    }

    #[tokio::test]
    async fn dispatcher_delivers_and_exits_when_queue_closes() {
        let (queue, receiver) = notification_channel();
        let notifier = InMemoryNotifier::default();
        let handle = spawn_dispatcher(
            receiver,
            Arc::new(notifier.clone()),
            DispatchPolicy { max_attempts: 3, retry_delay_ms: 0 },
        );

        queue.enqueue(event("r-1"));
        queue.enqueue(event("r-2"));
        drop(queue);
        handle.await.expect("dispatcher join");

        let delivered = notifier.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].request_id.0, "r-1");
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let (queue, receiver) = notification_channel();
        let notifier = InMemoryNotifier::failing_first(2);
        let handle = spawn_dispatcher(
            receiver,
            Arc::new(notifier.clone()),
            DispatchPolicy { max_attempts: 3, retry_delay_ms: 0 },
        );

        queue.enqueue(event("r-1"));
        drop(queue);
        handle.await.expect("dispatcher join");

        assert_eq!(notifier.attempts(), 3);
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_events_are_dropped_not_requeued() {
        let (queue, receiver) = notification_channel();
        let notifier = InMemoryNotifier::failing_first(5);
        let handle = spawn_dispatcher(
            receiver,
            Arc::new(notifier.clone()),
            DispatchPolicy { max_attempts: 3, retry_delay_ms: 0 },
        );

        queue.enqueue(event("r-1"));
        queue.enqueue(event("r-2"));
        drop(queue);
        handle.await.expect("dispatcher join");

        // First event exhausts its 3 attempts and is dropped. The second
        // absorbs the remaining 2 injected failures and lands on its third
        // attempt.
        assert_eq!(notifier.delivered().len(), 1);
        assert_eq!(notifier.delivered()[0].request_id.0, "r-2");
    }
}
