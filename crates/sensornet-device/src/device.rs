//! The device task: one optional reading behind one mailbox

use sensornet_types::{DeviceId, GroupId};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::handle::DeviceHandle;
use crate::message::{DeviceMessage, ReadingRecorded, RespondReading};

/// A single sensor device.
///
/// State is owned exclusively by the task spawned in [`Device::spawn`];
/// it is only ever mutated between `recv` calls on the mailbox.
pub struct Device {
    group_id: GroupId,
    device_id: DeviceId,
    last_reading: Option<f64>,
    rx: mpsc::Receiver<DeviceMessage>,
}

impl Device {
    /// Spawn a device task and return its handle.
    pub fn spawn(group_id: GroupId, device_id: DeviceId, mailbox_capacity: usize) -> DeviceHandle {
        let (tx, rx) = mpsc::channel(mailbox_capacity);
        let handle = DeviceHandle::new(device_id.clone(), tx);
        let mut device = Device {
            group_id,
            device_id,
            last_reading: None,
            rx,
        };
        tokio::spawn(async move {
            device.run().await;
        });
        handle
    }

    async fn run(&mut self) {
        info!(
            group_id = %self.group_id,
            device_id = %self.device_id,
            "Device started"
        );

        while let Some(msg) = self.rx.recv().await {
            match msg {
                DeviceMessage::RecordReading {
                    request_id,
                    value,
                    reply,
                } => {
                    debug!(
                        device_id = %self.device_id,
                        request_id = %request_id,
                        value,
                        "Recorded reading"
                    );
                    self.last_reading = Some(value);
                    // Requester may have gone away; nothing to do then.
                    let _ = reply.send(ReadingRecorded { request_id });
                }
                DeviceMessage::ReadReading { request_id, reply } => {
                    let _ = reply.send(RespondReading {
                        request_id,
                        value: self.last_reading,
                    });
                }
                DeviceMessage::Stop => break,
            }
        }

        info!(
            group_id = %self.group_id,
            device_id = %self.device_id,
            "Device stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensornet_types::RequestId;
    use tokio::time::{timeout, Duration};

    fn spawn_test_device(id: &str) -> DeviceHandle {
        Device::spawn(GroupId::new("test-group"), DeviceId::new(id), 8)
    }

    #[tokio::test]
    async fn read_before_any_record_reports_nothing() {
        let device = spawn_test_device("d1");

        let reply = device.read(RequestId(42)).await.unwrap();
        assert_eq!(reply.request_id, RequestId(42));
        assert_eq!(reply.value, None);
    }

    #[tokio::test]
    async fn record_then_read() {
        let device = spawn_test_device("d1");

        let ack = device.record(RequestId(1), 24.0).await.unwrap();
        assert_eq!(ack.request_id, RequestId(1));

        let reply = device.read(RequestId(2)).await.unwrap();
        assert_eq!(reply.value, Some(24.0));
    }

    #[tokio::test]
    async fn latest_record_wins() {
        let device = spawn_test_device("d1");

        device.record(RequestId(1), 24.0).await.unwrap();
        device.record(RequestId(2), 55.0).await.unwrap();

        let reply = device.read(RequestId(3)).await.unwrap();
        assert_eq!(reply.value, Some(55.0));
    }

    #[tokio::test]
    async fn stop_closes_the_mailbox() {
        let device = spawn_test_device("d1");
        assert!(!device.is_terminated());

        device.stop().await;
        timeout(Duration::from_secs(1), device.terminated())
            .await
            .expect("termination should be observed");

        assert!(device.is_terminated());
        assert!(device.read(RequestId(1)).await.is_err());
    }

    #[tokio::test]
    async fn handle_identity_is_channel_identity() {
        let d1 = spawn_test_device("d1");
        let d1_clone = d1.clone();
        let other = spawn_test_device("d1");

        assert!(d1.same_handle(&d1_clone));
        // Same device id, different task: different handle.
        assert!(!d1.same_handle(&other));
    }
}
