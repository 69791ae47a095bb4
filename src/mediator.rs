use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InteractionCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub sender_id: String,
    pub sender_name: String,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn interaction_completed(sender_id: &str, sender_name: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            kind: EventKind::InteractionCompleted,
            payload: serde_json::json!({
                "avatar_id": sender_id,
                "avatar_name": sender_name,
            }),
            at: Utc::now(),
        }
    }
}

/// Observer of agent lifecycle events. Failures are reported to the caller,
/// which logs and moves on; a mediator never changes the outcome of a run.
pub trait Mediator: Send + Sync {
    fn notify(&self, event: &NotificationEvent) -> anyhow::Result<()>;
}

impl<F> Mediator for F
where
    F: Fn(&NotificationEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn notify(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Publishes events to every live subscriber, e.g. websocket clients.
pub struct BroadcastMediator {
    tx: broadcast::Sender<NotificationEvent>,
}

impl BroadcastMediator {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }
}

impl Mediator for BroadcastMediator {
    fn notify(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Forwards each event to all members; one failing member does not starve the rest.
#[derive(Default)]
pub struct MediatorSet {
    members: Vec<Arc<dyn Mediator>>,
}

impl MediatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mediator: Arc<dyn Mediator>) -> Self {
        self.members.push(mediator);
        self
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.members.len()
    }
}

impl Mediator for MediatorSet {
    fn notify(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        let mut failures = Vec::new();
        for member in &self.members {
            if let Err(e) = member.notify(event) {
                failures.push(format!("{e:#}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{} mediator(s) failed: {}", failures.len(), failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_payload() {
        let event = NotificationEvent::interaction_completed("a", "Strict");
        assert_eq!(event.kind, EventKind::InteractionCompleted);
        assert_eq!(event.payload["avatar_id"], "a");
        assert_eq!(event.payload["avatar_name"], "Strict");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "interaction_completed");
    }

    #[test]
    fn test_closure_mediator() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mediator = move |_: &NotificationEvent| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        mediator
            .notify(&NotificationEvent::interaction_completed("a", "A"))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_mediator_delivers() {
        let mediator = BroadcastMediator::new(8);
        let mut rx = mediator.subscribe();
        mediator
            .notify(&NotificationEvent::interaction_completed("b", "B"))
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.sender_id, "b");
    }

    #[test]
    fn test_broadcast_without_subscribers_is_ok() {
        let mediator = BroadcastMediator::new(8);
        assert!(mediator
            .notify(&NotificationEvent::interaction_completed("b", "B"))
            .is_ok());
    }

    #[test]
    fn test_set_reaches_all_members_despite_failure() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let failing: Arc<dyn Mediator> =
            Arc::new(|_: &NotificationEvent| -> anyhow::Result<()> { anyhow::bail!("sink down") });
        let counting: Arc<dyn Mediator> = Arc::new(move |_: &NotificationEvent| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let set = MediatorSet::new().with(failing).with(counting);
        assert_eq!(set.len(), 2);
        let err = set
            .notify(&NotificationEvent::interaction_completed("a", "A"))
            .unwrap_err();
        assert!(err.to_string().contains("sink down"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
