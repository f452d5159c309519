//! Device mailbox protocol

use sensornet_types::RequestId;
use tokio::sync::oneshot;

/// Messages accepted by a device task
#[derive(Debug)]
pub enum DeviceMessage {
    /// Store a new reading, acknowledged with the same request id
    RecordReading {
        request_id: RequestId,
        value: f64,
        reply: oneshot::Sender<ReadingRecorded>,
    },

    /// Report the current reading, if any
    ReadReading {
        request_id: RequestId,
        reply: oneshot::Sender<RespondReading>,
    },

    /// Break the device loop; the mailbox closes as the task exits
    Stop,
}

/// Acknowledgement of a stored reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingRecorded {
    pub request_id: RequestId,
}

/// Reply to a read request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RespondReading {
    pub request_id: RequestId,
    /// The stored reading, or `None` when nothing was recorded yet
    pub value: Option<f64>,
}
