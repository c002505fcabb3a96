// src/pipeline/event_bus.rs
//
// Per-pipeline outbox. The state tracker publishes here while it walks a
// frame's detections; the driver drains it in order and hands the events to
// the notifier.

use crate::events::ServerEvent;
use std::collections::VecDeque;
use tracing::warn;

pub struct EventBus {
    events: VecDeque<ServerEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: ServerEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<ServerEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
