//! Event emission for coordination-layer observability
//!
//! Components hold a cheap clone of the aggregator and emit lifecycle
//! events into one broadcast stream. Emission never blocks and a stream
//! without subscribers is fine.

use sensornet_types::{EventSource, SensorEvent, SensorEventEnvelope};
use tokio::sync::broadcast;

/// Channel capacity for the unified event stream
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Aggregates lifecycle events from all components into a single stream
#[derive(Debug, Clone)]
pub struct EventAggregator {
    tx: broadcast::Sender<SensorEventEnvelope>,
}

impl EventAggregator {
    /// Create a new event aggregator
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to the unified event stream
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEventEnvelope> {
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Emit an event; no subscribers is not an error
    pub fn emit(&self, source: EventSource, event: SensorEvent) {
        let _ = self.tx.send(SensorEventEnvelope::new(source, event));
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}
