//! Event types for coordination-layer observability
//!
//! Events provide a unified stream of registry lifecycle activity:
//! device registration and termination, group creation and teardown,
//! query dispatch and completion.

use crate::{DeviceId, GroupId, RequestId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all sensornet events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event source
    pub source: EventSource,

    /// The actual event
    pub event: SensorEvent,
}

impl SensorEventEnvelope {
    pub fn new(source: EventSource, event: SensorEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            source,
            event,
        }
    }
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Group registry
    Registry,
    /// Group manager (directory level)
    Manager,
    /// Scatter-gather query coordinator
    Query,
}

/// Coordination-layer events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorEvent {
    /// A device was created and is now tracked by its group
    DeviceRegistered {
        group_id: GroupId,
        device_id: DeviceId,
    },

    /// A tracked device terminated and was removed from its group
    DeviceTerminated {
        group_id: GroupId,
        device_id: DeviceId,
    },

    /// A group registry was created on first reference
    GroupCreated { group_id: GroupId },

    /// A group registry stopped after its last member terminated
    GroupTerminated { group_id: GroupId },

    /// A scatter-gather query was dispatched over a member snapshot
    QueryDispatched {
        group_id: GroupId,
        request_id: RequestId,
        members: usize,
    },

    /// A scatter-gather query delivered its aggregated result
    QueryCompleted {
        group_id: GroupId,
        request_id: RequestId,
        responsive: usize,
        members: usize,
    },
}
