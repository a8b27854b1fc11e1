//! Engine notifications and the observers that receive them.

use life_core::{CellChange, Error, SubscriptionId};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Kinds of notification an engine emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NextGenerationBuilt,
    WorldDied,
    WorldChange,
    LoopStoppedWithError,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::NextGenerationBuilt,
        EventKind::WorldDied,
        EventKind::WorldChange,
        EventKind::LoopStoppedWithError,
    ];

    /// Wire name of the notification
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NextGenerationBuilt => "next-generation-built",
            EventKind::WorldDied => "world-died",
            EventKind::WorldChange => "world-change",
            EventKind::LoopStoppedWithError => "loop-stopped-with-error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A notification and its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new generation replaced the grid; re-read the engine state
    NextGenerationBuilt,
    /// A new generation replaced the grid and nothing in it is alive
    WorldDied,
    /// An edit batch about to be applied, exactly as submitted
    WorldChange(Vec<CellChange>),
    /// The life cycle ended because advancing a generation failed
    LoopStoppedWithError(Error),
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::NextGenerationBuilt => EventKind::NextGenerationBuilt,
            EngineEvent::WorldDied => EventKind::WorldDied,
            EngineEvent::WorldChange(_) => EventKind::WorldChange,
            EngineEvent::LoopStoppedWithError(_) => EventKind::LoopStoppedWithError,
        }
    }
}

type Callback = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    callback: Callback,
}

/// Registry of observers, notified synchronously in registration order.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every event of `kind`
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.subscriptions.write().push(Subscription {
            id,
            kind,
            callback: Arc::new(callback),
        });
        trace!(subscription = %id, event = %kind, "Observer subscribed");
        id
    }

    /// Register one callback for every kind of event
    pub fn subscribe_all<F>(&self, callback: F) -> Vec<SubscriptionId>
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        EventKind::ALL
            .iter()
            .map(|&kind| {
                let callback = callback.clone();
                self.subscribe(kind, move |event: &EngineEvent| callback(event))
            })
            .collect()
    }

    /// Remove a registration; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|subscription| subscription.kind == kind)
            .count()
    }

    /// Deliver `event` to its observers.
    ///
    /// Callbacks run after the registry lock is released, so an observer may
    /// subscribe or unsubscribe from inside its callback.
    pub fn emit(&self, event: &EngineEvent) {
        let kind = event.kind();
        let callbacks: Vec<Callback> = self
            .subscriptions
            .read()
            .iter()
            .filter(|subscription| subscription.kind == kind)
            .map(|subscription| subscription.callback.clone())
            .collect();

        trace!(event = %kind, observers = callbacks.len(), "Emitting event");

        for callback in callbacks {
            callback(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::NextGenerationBuilt.name(), "next-generation-built");
        assert_eq!(EventKind::WorldDied.name(), "world-died");
        assert_eq!(EventKind::WorldChange.name(), "world-change");
        assert_eq!(EventKind::LoopStoppedWithError.name(), "loop-stopped-with-error");
    }

    #[test]
    fn test_observers_called_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            bus.subscribe(EventKind::WorldDied, move |_| log.lock().push(i));
        }

        bus.emit(&EngineEvent::WorldDied);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_observers_only_see_their_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe(EventKind::WorldChange, move |event| sink.lock().push(event.clone()));

        bus.emit(&EngineEvent::NextGenerationBuilt);
        bus.emit(&EngineEvent::WorldChange(vec![CellChange::new(1, 1, true)]));

        assert_eq!(
            *seen.lock(),
            vec![EngineEvent::WorldChange(vec![CellChange::new(1, 1, true)])]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        let counter = count.clone();
        let id = bus.subscribe(EventKind::NextGenerationBuilt, move |_| *counter.lock() += 1);
        bus.emit(&EngineEvent::NextGenerationBuilt);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&EngineEvent::NextGenerationBuilt);

        assert_eq!(*count.lock(), 1);
        assert_eq!(bus.subscriber_count(EventKind::NextGenerationBuilt), 0);
    }

    #[test]
    fn test_subscribe_all() {
        let bus = EventBus::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));

        let sink = kinds.clone();
        let ids = bus.subscribe_all(move |event| sink.lock().push(event.kind()));
        assert_eq!(ids.len(), EventKind::ALL.len());

        bus.emit(&EngineEvent::WorldDied);
        bus.emit(&EngineEvent::LoopStoppedWithError(Error::EngineNotReady));

        assert_eq!(
            *kinds.lock(),
            vec![EventKind::WorldDied, EventKind::LoopStoppedWithError]
        );
    }
}
