// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process broadcast of file events.
//!
//! Single producer (the watcher pump), many consumers (local API stream,
//! UDS stream, tests). Emission is synchronous; a listener that panics is
//! isolated so the remaining listeners still see the event. The bus
//! guarantees a delivery attempt, not delivery.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use sv_core::FileEvent;

type Listener = Arc<dyn Fn(&FileEvent) + Send + Sync>;

struct BusState {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Typed multi-consumer broadcast for file events. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(BusState { next_id: 0, listeners: Vec::new() })) }
    }

    /// Register a listener; dropping the returned subscription (or calling
    /// `unsubscribe`) removes it.
    pub fn subscribe(&self, listener: impl Fn(&FileEvent) + Send + Sync + 'static) -> Subscription {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        Subscription { id, state: Arc::clone(&self.state) }
    }

    /// Invoke every live listener with the event.
    pub fn emit(&self, event: &FileEvent) {
        // Snapshot outside the lock so listeners may subscribe/unsubscribe.
        let listeners: Vec<Listener> =
            self.state.lock().listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if result.is_err() {
                error!(path = %event.server_path, "event listener panicked");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

/// Handle to a registered listener.
pub struct Subscription {
    id: u64,
    state: Arc<Mutex<BusState>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Removal happens in Drop.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.lock().listeners.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
