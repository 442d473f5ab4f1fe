//! Fan-out of status updates to external watchers.
//!
//! Watchers register under a name and receive every status update after
//! its primary handling. Delivery is best-effort: a subscriber that stops
//! draining its channel is dropped rather than allowed to stall the
//! update worker.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::events::TaskStatus;

/// Per-subscriber channel depth before it counts as slow.
const SUBSCRIBER_BUFFER: usize = 256;

/// Status update as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub agent_id: String,
    pub state: String,
    #[serde(default)]
    pub healthy: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl TaskEvent {
    pub fn from_status(status: &TaskStatus) -> Self {
        Self {
            task_id: status.task_id.value.clone(),
            agent_id: status
                .agent_id
                .as_ref()
                .map(|id| id.value.clone())
                .unwrap_or_default(),
            state: status.state.as_str().to_string(),
            healthy: status.healthy,
            message: status.message.clone(),
            received_at: Utc::now(),
        }
    }
}

/// A registered watcher; dropping it deregisters.
pub struct Subscription {
    name: String,
    rx: mpsc::Receiver<TaskEvent>,
    mgr: Weak<EventManager>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next event, `None` once the manager dropped this subscriber.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(mgr) = self.mgr.upgrade() {
            mgr.unsubscribe(&self.name);
        }
    }
}

/// Bounded set of named event subscribers.
pub struct EventManager {
    subscribers: RwLock<HashMap<String, mpsc::Sender<TaskEvent>>>,
    max: usize,
    me: Weak<EventManager>,
}

impl EventManager {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            subscribers: RwLock::new(HashMap::new()),
            max,
            me: me.clone(),
        })
    }

    /// Register a watcher. A re-used name replaces the previous channel.
    pub fn subscribe(&self, name: &str) -> Result<Subscription, SchedulerError> {
        let mut subscribers = self.subscribers.write().unwrap();
        if subscribers.len() >= self.max && !subscribers.contains_key(name) {
            return Err(SchedulerError::SubscribersFull);
        }

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        subscribers.insert(name.to_string(), tx);
        debug!(subscriber = %name, total = subscribers.len(), "Event subscriber registered");

        Ok(Subscription {
            name: name.to_string(),
            rx,
            mgr: self.me.clone(),
        })
    }

    pub fn unsubscribe(&self, name: &str) {
        if self.subscribers.write().unwrap().remove(name).is_some() {
            debug!(subscriber = %name, "Event subscriber removed");
        }
    }

    pub fn full(&self) -> bool {
        self.subscribers.read().unwrap().len() >= self.max
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver to every subscriber; slow or closed subscribers are
    /// removed on the spot.
    pub fn publish(&self, event: &TaskEvent) {
        let mut dropped = Vec::new();
        {
            let subscribers = self.subscribers.read().unwrap();
            for (name, tx) in subscribers.iter() {
                if tx.try_send(event.clone()).is_err() {
                    dropped.push(name.clone());
                }
            }
        }

        if !dropped.is_empty() {
            let mut subscribers = self.subscribers.write().unwrap();
            for name in dropped {
                subscribers.remove(&name);
                warn!(subscriber = %name, "Dropping slow event subscriber");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Id, TaskState};

    fn event(task_id: &str) -> TaskEvent {
        TaskEvent::from_status(&TaskStatus {
            task_id: Id::new(task_id),
            state: TaskState::TaskRunning,
            agent_id: Some(Id::new("a1")),
            message: None,
            source: None,
            reason: None,
            healthy: Some(true),
            uuid: None,
            timestamp: None,
        })
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let mgr = EventManager::new(4);
        let mut sub = mgr.subscribe("watcher-1").unwrap();

        mgr.publish(&event("t1"));
        let got = sub.recv().await.unwrap();
        assert_eq!(got.task_id, "t1");
        assert_eq!(got.state, "TASK_RUNNING");
    }

    #[tokio::test]
    async fn test_cap_rejects_when_full() {
        let mgr = EventManager::new(1);
        let _first = mgr.subscribe("one").unwrap();
        assert!(mgr.full());
        assert!(matches!(
            mgr.subscribe("two"),
            Err(SchedulerError::SubscribersFull)
        ));
    }

    #[tokio::test]
    async fn test_drop_deregisters() {
        let mgr = EventManager::new(1);
        {
            let _sub = mgr.subscribe("one").unwrap();
            assert_eq!(mgr.len(), 1);
        }
        assert_eq!(mgr.len(), 0);
        assert!(!mgr.full());
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped() {
        let mgr = EventManager::new(4);
        let _sub = mgr.subscribe("slow").unwrap();

        // Never drained: overflow the buffer and one more.
        for _ in 0..=SUBSCRIBER_BUFFER {
            mgr.publish(&event("t1"));
        }
        assert_eq!(mgr.len(), 0);
    }
}
