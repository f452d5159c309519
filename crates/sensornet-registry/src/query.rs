//! Scatter-gather query coordinator
//!
//! One coordinator task is spawned per query. It fans a read request out
//! to a fixed snapshot of device handles, then fans three kinds of
//! signal back in through a single mailbox: a device's reply, a device's
//! liveness loss, and the one-shot deadline. The first signal to arrive
//! for a device decides its outcome; later signals for the same device
//! are ignored. The coordinator delivers exactly one aggregated result
//! covering every snapshot member, then retires.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use sensornet_device::DeviceHandle;
use sensornet_types::{DeviceId, EventSource, GroupId, ReadOutcome, RequestId, SensorEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::EventAggregator;

/// Aggregated result of one group query: exactly one outcome per device
/// in the snapshot the query was dispatched over.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyAllReadings {
    /// The caller's correlation token, echoed back unchanged
    pub request_id: RequestId,
    pub readings: HashMap<DeviceId, ReadOutcome>,
}

/// Signals fanned in to the coordinator's mailbox
#[derive(Debug)]
enum QueryEvent {
    /// A device answered the fan-out read
    Reading {
        device_id: DeviceId,
        value: Option<f64>,
    },

    /// A device's mailbox closed before it answered
    Terminated { device_id: DeviceId },
}

/// Resolution state: `pending` and `replies` partition the snapshot at
/// every point in the query's life.
struct Outstanding {
    pending: HashSet<DeviceId>,
    replies: HashMap<DeviceId, ReadOutcome>,
}

impl Outstanding {
    fn new(ids: impl IntoIterator<Item = DeviceId>) -> Self {
        Self {
            pending: ids.into_iter().collect(),
            replies: HashMap::new(),
        }
    }

    /// Record the outcome for a device still pending. Returns false for
    /// a device already resolved; the first signal wins and later ones
    /// must not overwrite it.
    fn resolve(&mut self, device_id: DeviceId, outcome: ReadOutcome) -> bool {
        if !self.pending.remove(&device_id) {
            return false;
        }
        self.replies.insert(device_id, outcome);
        true
    }

    /// Force-resolve everything still pending with the given outcome.
    fn force_remaining(&mut self, outcome: ReadOutcome) {
        for device_id in self.pending.drain() {
            self.replies.insert(device_id, outcome.clone());
        }
    }

    fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    fn into_readings(self) -> HashMap<DeviceId, ReadOutcome> {
        debug_assert!(self.pending.is_empty());
        self.replies
    }
}

/// Spawn a query coordinator over a snapshot of member handles.
///
/// Non-blocking for the caller; the aggregated result arrives on `reply`
/// once every member resolved or the deadline elapsed, whichever first.
pub(crate) fn spawn_query(
    group_id: GroupId,
    request_id: RequestId,
    snapshot: Vec<DeviceHandle>,
    deadline: Duration,
    reply: oneshot::Sender<Result<ReplyAllReadings>>,
    events: EventAggregator,
) {
    tokio::spawn(async move {
        run(group_id, request_id, snapshot, deadline, reply, events).await;
    });
}

async fn run(
    group_id: GroupId,
    request_id: RequestId,
    snapshot: Vec<DeviceHandle>,
    deadline: Duration,
    reply: oneshot::Sender<Result<ReplyAllReadings>>,
    events: EventAggregator,
) {
    let capacity = (snapshot.len() * 2).max(8);
    let (tx, mut rx) = mpsc::channel::<QueryEvent>(capacity);

    let mut outstanding = Outstanding::new(snapshot.iter().map(|h| h.device_id().clone()));

    for handle in &snapshot {
        // Liveness watcher: armed at entry for every member, folded into
        // the same mailbox as the replies. Exits early once the
        // coordinator is gone.
        let watcher = handle.clone();
        let ev_tx = tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watcher.terminated() => {
                    let _ = ev_tx
                        .send(QueryEvent::Terminated {
                            device_id: watcher.device_id().clone(),
                        })
                        .await;
                }
                _ = ev_tx.closed() => {}
            }
        });

        // Read relay: the correlation id toward the device is the fixed
        // internal sentinel, unrelated to the caller's request id.
        let reader = handle.clone();
        let ev_tx = tx.clone();
        tokio::spawn(async move {
            let event = match reader.read(RequestId::ZERO).await {
                Ok(respond) => QueryEvent::Reading {
                    device_id: reader.device_id().clone(),
                    value: respond.value,
                },
                Err(_) => QueryEvent::Terminated {
                    device_id: reader.device_id().clone(),
                },
            };
            let _ = ev_tx.send(event).await;
        });
    }
    drop(tx);
    drop(snapshot);

    let timer = time::sleep(deadline);
    tokio::pin!(timer);

    while !outstanding.is_complete() {
        tokio::select! {
            event = rx.recv() => match event {
                Some(QueryEvent::Reading { device_id, value }) => {
                    let outcome = match value {
                        Some(v) => ReadOutcome::Value(v),
                        None => ReadOutcome::NoReading,
                    };
                    if !outstanding.resolve(device_id.clone(), outcome) {
                        debug!(device_id = %device_id, "Late reply for already resolved device");
                    }
                }
                Some(QueryEvent::Terminated { device_id }) => {
                    if !outstanding.resolve(device_id.clone(), ReadOutcome::Unreachable) {
                        debug!(device_id = %device_id, "Termination after device already resolved");
                    }
                }
                None => {
                    // Every pending member still has a watcher holding a
                    // sender, so this is unreachable while incomplete.
                    debug_assert!(outstanding.is_complete(), "query mailbox closed early");
                    warn!(group_id = %group_id, "Query mailbox closed with members pending");
                    outstanding.force_remaining(ReadOutcome::Unreachable);
                }
            },
            _ = &mut timer => {
                debug!(
                    group_id = %group_id,
                    request_id = %request_id,
                    pending = outstanding.pending.len(),
                    "Query deadline elapsed"
                );
                outstanding.force_remaining(ReadOutcome::TimedOut);
            }
        }
    }

    let readings = outstanding.into_readings();
    let responsive = readings.values().filter(|o| o.is_responsive()).count();
    events.emit(
        EventSource::Query,
        SensorEvent::QueryCompleted {
            group_id: group_id.clone(),
            request_id,
            responsive,
            members: readings.len(),
        },
    );
    debug!(
        group_id = %group_id,
        request_id = %request_id,
        members = readings.len(),
        responsive,
        "Query completed"
    );

    // Requester may have gone away; the query still completed.
    let _ = reply.send(Ok(ReplyAllReadings {
        request_id,
        readings,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensornet_device::Device;
    use std::time::Instant;
    use tokio::time::timeout;

    fn ids(raw: &[&str]) -> Vec<DeviceId> {
        raw.iter().map(|s| DeviceId::new(*s)).collect()
    }

    /// A handle whose task accepts reads but never answers them. It
    /// still honors `Stop`, so tests can terminate it on cue.
    fn silent_handle(id: &str) -> DeviceHandle {
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let mut parked = Vec::new();
            while let Some(msg) = rx.recv().await {
                match msg {
                    sensornet_device::DeviceMessage::Stop => break,
                    // Keep reply senders alive so the reader sees
                    // neither a reply nor a termination.
                    other => parked.push(other),
                }
            }
        });
        DeviceHandle::new(DeviceId::new(id), tx)
    }

    async fn collect(
        snapshot: Vec<DeviceHandle>,
        deadline: Duration,
    ) -> ReplyAllReadings {
        let (reply_tx, reply_rx) = oneshot::channel();
        spawn_query(
            GroupId::new("g1"),
            RequestId(7),
            snapshot,
            deadline,
            reply_tx,
            EventAggregator::new(),
        );
        timeout(Duration::from_secs(5), reply_rx)
            .await
            .expect("query should complete")
            .expect("coordinator dropped reply")
            .expect("dispatch cannot mismatch")
    }

    #[test]
    fn first_signal_wins() {
        let mut outstanding = Outstanding::new(ids(&["a", "b"]));

        assert!(outstanding.resolve(DeviceId::new("a"), ReadOutcome::Value(1.0)));
        // Termination after a valid reply does not overwrite it.
        assert!(!outstanding.resolve(DeviceId::new("a"), ReadOutcome::Unreachable));

        assert!(outstanding.resolve(DeviceId::new("b"), ReadOutcome::Unreachable));
        // Late reply does not resurrect a terminated device.
        assert!(!outstanding.resolve(DeviceId::new("b"), ReadOutcome::Value(2.0)));

        let readings = outstanding.into_readings();
        assert_eq!(readings[&DeviceId::new("a")], ReadOutcome::Value(1.0));
        assert_eq!(readings[&DeviceId::new("b")], ReadOutcome::Unreachable);
    }

    #[test]
    fn force_remaining_covers_only_pending() {
        let mut outstanding = Outstanding::new(ids(&["a", "b", "c"]));
        outstanding.resolve(DeviceId::new("a"), ReadOutcome::NoReading);

        outstanding.force_remaining(ReadOutcome::TimedOut);
        assert!(outstanding.is_complete());

        let readings = outstanding.into_readings();
        assert_eq!(readings[&DeviceId::new("a")], ReadOutcome::NoReading);
        assert_eq!(readings[&DeviceId::new("b")], ReadOutcome::TimedOut);
        assert_eq!(readings[&DeviceId::new("c")], ReadOutcome::TimedOut);
    }

    #[tokio::test]
    async fn empty_snapshot_completes_immediately() {
        let start = Instant::now();
        let result = collect(Vec::new(), Duration::from_secs(10)).await;
        assert!(result.readings.is_empty());
        assert_eq!(result.request_id, RequestId(7));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn all_members_reply() {
        let d1 = Device::spawn(GroupId::new("g1"), DeviceId::new("d1"), 8);
        let d2 = Device::spawn(GroupId::new("g1"), DeviceId::new("d2"), 8);
        d1.record(RequestId(1), 21.5).await.unwrap();

        let result = collect(vec![d1, d2], Duration::from_secs(3)).await;
        assert_eq!(result.readings.len(), 2);
        assert_eq!(result.readings[&DeviceId::new("d1")], ReadOutcome::Value(21.5));
        assert_eq!(result.readings[&DeviceId::new("d2")], ReadOutcome::NoReading);
    }

    #[tokio::test]
    async fn stopped_member_is_unreachable() {
        let d1 = Device::spawn(GroupId::new("g1"), DeviceId::new("d1"), 8);
        let d2 = Device::spawn(GroupId::new("g1"), DeviceId::new("d2"), 8);
        d1.record(RequestId(1), 24.0).await.unwrap();

        d2.stop().await;
        d2.terminated().await;

        let result = collect(vec![d1, d2], Duration::from_secs(3)).await;
        assert_eq!(result.readings[&DeviceId::new("d1")], ReadOutcome::Value(24.0));
        assert_eq!(result.readings[&DeviceId::new("d2")], ReadOutcome::Unreachable);
    }

    #[tokio::test]
    async fn silent_member_times_out_at_the_deadline() {
        let d1 = Device::spawn(GroupId::new("g1"), DeviceId::new("d1"), 8);
        d1.record(RequestId(1), 24.0).await.unwrap();
        let d2 = silent_handle("d2");

        let start = Instant::now();
        let result = collect(vec![d1, d2], Duration::from_millis(200)).await;
        let elapsed = start.elapsed();

        assert_eq!(result.readings[&DeviceId::new("d1")], ReadOutcome::Value(24.0));
        assert_eq!(result.readings[&DeviceId::new("d2")], ReadOutcome::TimedOut);
        // Delivered at the deadline, not earlier.
        assert!(elapsed >= Duration::from_millis(200), "completed early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn member_dying_mid_query_is_unreachable() {
        let d1 = silent_handle("d1");
        let d2 = Device::spawn(GroupId::new("g1"), DeviceId::new("d2"), 8);

        let (reply_tx, reply_rx) = oneshot::channel();
        spawn_query(
            GroupId::new("g1"),
            RequestId(9),
            vec![d1.clone(), d2],
            Duration::from_secs(5),
            reply_tx,
            EventAggregator::new(),
        );

        // Let the fan-out reach the silent device, then terminate it so
        // the armed liveness watcher fires mid-query.
        tokio::time::sleep(Duration::from_millis(50)).await;
        d1.stop().await;

        let result = timeout(Duration::from_secs(5), reply_rx)
            .await
            .expect("query should complete")
            .unwrap()
            .unwrap();
        assert_eq!(result.readings[&DeviceId::new("d2")], ReadOutcome::NoReading);
        assert_eq!(result.readings[&DeviceId::new("d1")], ReadOutcome::Unreachable);
    }
}
