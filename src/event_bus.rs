//! Single-writer publish, multi-subscriber fan-out (spec §4.5). Delivery is
//! synchronous, best-effort, in-process — not durable. Handler panics/errors
//! are caught and logged so they never interrupt other handlers or the
//! publisher.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    HealthCheckNeeded,
    TestScheduled,
    WarmupUpdate,
    RotationTriggered,
    ScoreUpdated,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub domain_id: String,
    pub timestamp: DateTime<Utc>,
    pub fields: HashMap<String, Value>,
}

impl Event {
    pub fn new(event_type: EventType, domain_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            domain_id: domain_id.into(),
            timestamp,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.subscribers
            .write()
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Invokes handlers registered for `event.event_type` in registration
    /// order. A handler that panics is caught and logged; it never aborts
    /// delivery to the remaining handlers.
    pub fn publish(&self, event: Event) {
        let handlers = {
            let guard = self.subscribers.read();
            guard.get(&event.event_type).cloned().unwrap_or_default()
        };

        for handler in handlers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.handle(&event);
            }));
            if let Err(panic) = result {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    event_type = ?event.event_type,
                    domain_id = %event.domain_id,
                    %message,
                    "event handler panicked; continuing fan-out"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handler_panic_does_not_stop_fanout() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            EventType::ScoreUpdated,
            Arc::new(|_event: &Event| panic!("boom")),
        );
        let calls_clone = calls.clone();
        bus.subscribe(
            EventType::ScoreUpdated,
            Arc::new(move |_event: &Event| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(Event::new(EventType::ScoreUpdated, "d1", Utc::now()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        let order_a = order.clone();
        bus.subscribe(
            EventType::TestScheduled,
            Arc::new(move |_e: &Event| order_a.write().push(1)),
        );
        let order_b = order.clone();
        bus.subscribe(
            EventType::TestScheduled,
            Arc::new(move |_e: &Event| order_b.write().push(2)),
        );

        bus.publish(Event::new(EventType::TestScheduled, "d1", Utc::now()));
        assert_eq!(*order.read(), vec![1, 2]);
    }
}
