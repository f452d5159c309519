//! Cloneable mailbox handle for a running device

use sensornet_types::{DeviceId, RequestId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::message::{DeviceMessage, ReadingRecorded, RespondReading};

/// Device errors
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device task is gone; its mailbox rejected the message or the
    /// reply channel was dropped mid-flight.
    #[error("device unreachable: {0}")]
    Unreachable(DeviceId),
}

/// Handle to a running device task.
///
/// Cloning the handle clones the mailbox sender; equality is identity of
/// the underlying channel, not of the device id (see [`same_handle`]).
///
/// [`same_handle`]: DeviceHandle::same_handle
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device_id: DeviceId,
    tx: mpsc::Sender<DeviceMessage>,
}

impl DeviceHandle {
    /// Wrap an existing mailbox sender.
    ///
    /// Normally obtained from `Device::spawn`; constructing one directly
    /// lets any task honoring the [`DeviceMessage`] contract stand in
    /// for a device.
    pub fn new(device_id: DeviceId, tx: mpsc::Sender<DeviceMessage>) -> Self {
        Self { device_id, tx }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Identity comparison: true only when both handles address the same
    /// running task. Two generations of a device with the same id are
    /// different handles.
    pub fn same_handle(&self, other: &DeviceHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Store a reading on the device.
    pub async fn record(
        &self,
        request_id: RequestId,
        value: f64,
    ) -> Result<ReadingRecorded, DeviceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DeviceMessage::RecordReading {
                request_id,
                value,
                reply,
            })
            .await
            .map_err(|_| DeviceError::Unreachable(self.device_id.clone()))?;
        rx.await
            .map_err(|_| DeviceError::Unreachable(self.device_id.clone()))
    }

    /// Read the current reading, if any.
    pub async fn read(&self, request_id: RequestId) -> Result<RespondReading, DeviceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DeviceMessage::ReadReading { request_id, reply })
            .await
            .map_err(|_| DeviceError::Unreachable(self.device_id.clone()))?;
        rx.await
            .map_err(|_| DeviceError::Unreachable(self.device_id.clone()))
    }

    /// Ask the device to stop. Best-effort: a device that is already
    /// gone is as stopped as it gets.
    pub async fn stop(&self) {
        let _ = self.tx.send(DeviceMessage::Stop).await;
    }

    /// Resolves once the device task has exited and its mailbox closed.
    ///
    /// This is the liveness-lost signal the registry and the query
    /// coordinator observe; it fires regardless of how the device ended.
    pub async fn terminated(&self) {
        self.tx.closed().await;
    }

    /// Non-blocking probe of the same condition as [`terminated`].
    ///
    /// [`terminated`]: DeviceHandle::terminated
    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }
}
