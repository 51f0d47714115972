//! Synchronous in-process event bus: every mutating repository operation
//! publishes a before event ahead of the storage call and an after event once
//! the cache is synchronized.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::record::Record;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Insert,
    UpdateById,
    Update,
    Delete,
    DeleteBatch,
}

/// What the mutation operated on.
#[derive(Clone, Debug)]
pub enum EventPayload {
    Entity(Record),
    /// Entity plus the conditions it was applied under (as submitted).
    EntityWithCondition(Record, Value),
    Condition(Value),
    Ids(Vec<i64>),
}

#[derive(Clone, Debug)]
pub struct EntityEvent {
    pub table: String,
    pub kind: EventKind,
    pub payload: EventPayload,
    /// True for the event published before the storage call.
    pub before: bool,
}

impl fmt::Display for EntityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} ({})",
            self.kind,
            self.table,
            if self.before { "before" } else { "after" }
        )
    }
}

pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &EntityEvent);
}

impl<F> EventSubscriber for F
where
    F: Fn(&EntityEvent) + Send + Sync,
{
    fn on_event(&self, event: &EntityEvent) {
        self(event)
    }
}

/// Subscribers are registered up front; delivery is synchronous and completes
/// before `publish` returns. There is no ordering guarantee across distinct
/// subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn publish(&self, event: &EntityEvent) {
        for subscriber in &self.subscribers {
            subscriber.on_event(event);
        }
        tracing::debug!(event = %event, "published");
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn delivery_is_synchronous() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let bus = EventBus::new().subscribe(Arc::new(move |event: &EntityEvent| {
            sink.lock().unwrap().push(event.to_string());
        }));

        bus.publish(&EntityEvent {
            table: "user".into(),
            kind: EventKind::Insert,
            payload: EventPayload::Entity(Record::new()),
            before: true,
        });
        // Observed before publish returned.
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].contains("before"));
    }

    #[test]
    fn all_subscribers_receive_each_event() {
        let count = Arc::new(Mutex::new(0usize));
        let (a, b) = (count.clone(), count.clone());
        let bus = EventBus::new()
            .subscribe(Arc::new(move |_: &EntityEvent| *a.lock().unwrap() += 1))
            .subscribe(Arc::new(move |_: &EntityEvent| *b.lock().unwrap() += 1));
        bus.publish(&EntityEvent {
            table: "user".into(),
            kind: EventKind::DeleteBatch,
            payload: EventPayload::Ids(vec![1, 2]),
            before: false,
        });
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
