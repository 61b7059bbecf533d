use crate::record::{Record, RecordInput};
use serde_json::Value;
use std::sync::mpsc;

/// The kind of change a collection reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Create,
    Update,
    Delete,
}

/// A committed change, delivered to listeners after storage is updated.
#[derive(Debug, Clone)]
pub enum HookEvent {
    Create {
        record: Record,
        initial_values: RecordInput,
    },
    /// One event per changed path of an update.
    Update {
        prev_record: Record,
        next_record: Record,
        path: Vec<String>,
        prev_value: Value,
        next_value: Value,
    },
    Delete {
        record: Record,
    },
}

impl HookEvent {
    pub fn kind(&self) -> HookKind {
        match self {
            HookEvent::Create { .. } => HookKind::Create,
            HookEvent::Update { .. } => HookKind::Update,
            HookEvent::Delete { .. } => HookKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&HookEvent) + Send>;

/// Typed publish/subscribe surface of a collection. The collection is the
/// only producer; callers register listeners or take a channel receiver.
#[derive(Default)]
pub struct Hooks {
    next_id: u64,
    listeners: Vec<(ListenerId, HookKind, Listener)>,
    subscribers: Vec<mpsc::Sender<HookEvent>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: HookKind, listener: F) -> ListenerId
    where
        F: FnMut(&HookEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, kind, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Receive every event of every kind through a channel. Dropping the
    /// receiver unsubscribes on the next emit.
    pub fn subscribe(&mut self) -> mpsc::Receiver<HookEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len() + self.subscribers.len()
    }

    pub(crate) fn emit(&mut self, event: &HookEvent) {
        let kind = event.kind();
        for (_, listener_kind, listener) in &mut self.listeners {
            if *listener_kind == kind {
                listener(event);
            }
        }
        // Receiver dropped
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("listeners", &self.listeners.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CollectionId, RecordKey};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn delete_event(seq: u64) -> HookEvent {
        HookEvent::Delete {
            record: Record::new(RecordKey::new(CollectionId::new(0, 0), seq), "users".into(), json!({})),
        }
    }

    #[test]
    fn test_listeners_filtered_by_kind() {
        let mut hooks = Hooks::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        hooks.on(HookKind::Delete, move |event| {
            sink.lock().unwrap().push(event.kind());
        });
        let sink = Arc::clone(&seen);
        hooks.on(HookKind::Create, move |event| {
            sink.lock().unwrap().push(event.kind());
        });

        hooks.emit(&delete_event(1));
        assert_eq!(*seen.lock().unwrap(), vec![HookKind::Delete]);
    }

    #[test]
    fn test_off_removes_listener() {
        let mut hooks = Hooks::new();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let id = hooks.on(HookKind::Delete, move |_| *sink.lock().unwrap() += 1);

        hooks.emit(&delete_event(1));
        assert!(hooks.off(id));
        assert!(!hooks.off(id));
        hooks.emit(&delete_event(2));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_subscribe_receives_events_and_prunes_dropped() {
        let mut hooks = Hooks::new();
        let rx = hooks.subscribe();
        hooks.emit(&delete_event(1));
        assert_eq!(rx.try_recv().unwrap().kind(), HookKind::Delete);

        drop(rx);
        hooks.emit(&delete_event(2));
        assert_eq!(hooks.listener_count(), 0);
    }
}
