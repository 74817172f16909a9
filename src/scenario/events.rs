//! Change notification for observers of a scenario (editor, renderer, CLI).
//!
//! The core never calls into its observers. Mutations are published as
//! `ScenarioEvent`s on an `EventBus`; every subscriber gets its own
//! crossbeam receiver and may poll or block on it from any thread.

use crate::scenario::executor::RunPhase;
use crate::scenario::id::{BlockId, ConnectionId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Something observable changed in a scenario or its run.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioEvent {
    BlockAdded(BlockId),
    BlockRemoved(BlockId),
    ConnectionAdded(ConnectionId),
    ConnectionRemoved(ConnectionId),
    /// Title, subtitle or position changed.
    AppearanceChanged(BlockId),
    /// Status or status message changed.
    StateChanged(BlockId),
    /// Ports were added or removed.
    PortsChanged(BlockId),
    RunPhaseChanged(RunPhase),
}

/// Fan-out publisher. Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<ScenarioEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ScenarioEvent> {
        let (tx, rx) = unbounded();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    /// Send `event` to every live subscriber, dropping disconnected ones.
    pub fn publish(&self, event: ScenarioEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
