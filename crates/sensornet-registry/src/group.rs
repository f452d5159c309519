//! Group registry: membership, liveness tracking, query dispatch
//!
//! One registry task owns the member map of one group. Registration
//! commands, list/query requests and device-termination notifications
//! are merged into a single mailbox, so the map is only ever touched
//! between `recv` calls. The registry stops itself the moment the last
//! member's termination empties the map; a group that never had a
//! member keeps running.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use sensornet_device::{Device, DeviceHandle};
use sensornet_types::{DeviceId, EventSource, GroupId, RequestId, SensorEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{GroupError, Result};
use crate::events::EventAggregator;
use crate::query::{spawn_query, ReplyAllReadings};

/// Reply to a device listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDeviceList {
    /// The caller's correlation token, echoed back unchanged
    pub request_id: RequestId,
    pub ids: HashSet<DeviceId>,
}

/// The registry's merged inbound event stream
enum GroupEvent {
    Track {
        group_id: GroupId,
        device_id: DeviceId,
        reply: oneshot::Sender<DeviceHandle>,
    },
    List {
        request_id: RequestId,
        group_id: GroupId,
        reply: oneshot::Sender<Result<ReplyDeviceList>>,
    },
    Query {
        request_id: RequestId,
        group_id: GroupId,
        deadline: Option<Duration>,
        reply: oneshot::Sender<Result<ReplyAllReadings>>,
    },
    /// Liveness-lost notification from a watcher armed at registration.
    /// Carries the observed handle so a notification for a replaced
    /// generation of the same device id can be told apart.
    DeviceTerminated {
        device_id: DeviceId,
        handle: DeviceHandle,
    },
}

/// Handle to a running group registry task
#[derive(Debug, Clone)]
pub struct GroupHandle {
    group_id: GroupId,
    tx: mpsc::Sender<GroupEvent>,
}

impl GroupHandle {
    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// Identity comparison, as for device handles.
    pub fn same_handle(&self, other: &GroupHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Register a device, creating it on first reference.
    ///
    /// Returns the tracked handle; repeated calls for the same id return
    /// the same handle. `None` means the request produced no reply: it
    /// was addressed to a different group (a routing bug upstream,
    /// ignored by the registry) or the registry already stopped.
    pub async fn track_device(
        &self,
        group_id: GroupId,
        device_id: DeviceId,
    ) -> Option<DeviceHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(GroupEvent::Track {
                group_id,
                device_id,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Snapshot of the ids currently tracked.
    ///
    /// A request addressed to a different group is a protocol violation
    /// answered with [`GroupError::GroupMismatch`], distinguishable from
    /// a successful empty list.
    pub async fn list_devices(
        &self,
        request_id: RequestId,
        group_id: GroupId,
    ) -> Result<ReplyDeviceList> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(GroupEvent::List {
                request_id,
                group_id,
                reply,
            })
            .await
            .map_err(|_| GroupError::RegistryUnavailable(self.group_id.clone()))?;
        rx.await
            .map_err(|_| GroupError::RegistryUnavailable(self.group_id.clone()))?
    }

    /// Scatter-gather read over the current members.
    ///
    /// Dispatch is non-blocking for the registry; the reply arrives once
    /// every member of the snapshot resolved or the deadline elapsed.
    /// `None` for the deadline applies the configured default. Mismatch
    /// handling is as for [`list_devices`].
    ///
    /// [`list_devices`]: GroupHandle::list_devices
    pub async fn query_devices(
        &self,
        request_id: RequestId,
        group_id: GroupId,
        deadline: Option<Duration>,
    ) -> Result<ReplyAllReadings> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(GroupEvent::Query {
                request_id,
                group_id,
                deadline,
                reply,
            })
            .await
            .map_err(|_| GroupError::RegistryUnavailable(self.group_id.clone()))?;
        rx.await
            .map_err(|_| GroupError::RegistryUnavailable(self.group_id.clone()))?
    }

    /// Resolves once the registry task has exited.
    pub async fn terminated(&self) {
        self.tx.closed().await;
    }

    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Registry task for one device group.
pub struct GroupRegistry {
    group_id: GroupId,
    config: RegistryConfig,
    members: HashMap<DeviceId, DeviceHandle>,
    ever_tracked: bool,
    rx: mpsc::Receiver<GroupEvent>,
    self_tx: mpsc::Sender<GroupEvent>,
    events: EventAggregator,
}

impl GroupRegistry {
    /// Spawn a registry task for `group_id` and return its handle.
    pub fn spawn(group_id: GroupId, config: RegistryConfig, events: EventAggregator) -> GroupHandle {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let handle = GroupHandle {
            group_id: group_id.clone(),
            tx: tx.clone(),
        };
        let mut registry = GroupRegistry {
            group_id,
            config,
            members: HashMap::new(),
            ever_tracked: false,
            rx,
            self_tx: tx,
            events,
        };
        tokio::spawn(async move {
            registry.run().await;
        });
        handle
    }

    async fn run(&mut self) {
        info!(group_id = %self.group_id, "Group registry started");

        while let Some(event) = self.rx.recv().await {
            match event {
                GroupEvent::Track {
                    group_id,
                    device_id,
                    reply,
                } => self.handle_track(group_id, device_id, reply),
                GroupEvent::List {
                    request_id,
                    group_id,
                    reply,
                } => self.handle_list(request_id, group_id, reply),
                GroupEvent::Query {
                    request_id,
                    group_id,
                    deadline,
                    reply,
                } => self.handle_query(request_id, group_id, deadline, reply),
                GroupEvent::DeviceTerminated { device_id, handle } => {
                    if self.handle_terminated(device_id, handle) {
                        break;
                    }
                }
            }
        }

        info!(group_id = %self.group_id, "Group registry stopped");
        self.events.emit(
            EventSource::Registry,
            SensorEvent::GroupTerminated {
                group_id: self.group_id.clone(),
            },
        );
    }

    fn handle_track(
        &mut self,
        group_id: GroupId,
        device_id: DeviceId,
        reply: oneshot::Sender<DeviceHandle>,
    ) {
        if group_id != self.group_id {
            // Routing bug upstream; dropping the reply is the whole
            // signal the caller gets.
            warn!(
                addressed = %group_id,
                actual = %self.group_id,
                device_id = %device_id,
                "Ignoring track request for wrong group"
            );
            return;
        }

        if let Some(existing) = self.members.get(&device_id) {
            if !existing.is_terminated() {
                debug!(
                    group_id = %self.group_id,
                    device_id = %device_id,
                    "Device already tracked"
                );
                let _ = reply.send(existing.clone());
                return;
            }
            // The device died but its termination notification has not
            // been processed yet; a fresh device replaces the defunct
            // handle rather than reusing it.
            debug!(
                group_id = %self.group_id,
                device_id = %device_id,
                "Replacing defunct handle with a fresh device"
            );
        }

        let handle = Device::spawn(
            self.group_id.clone(),
            device_id.clone(),
            self.config.mailbox_capacity,
        );
        self.watch(handle.clone());
        self.members.insert(device_id.clone(), handle.clone());
        self.ever_tracked = true;

        info!(group_id = %self.group_id, device_id = %device_id, "Device registered");
        self.events.emit(
            EventSource::Registry,
            SensorEvent::DeviceRegistered {
                group_id: self.group_id.clone(),
                device_id,
            },
        );
        let _ = reply.send(handle);
    }

    /// Arm the termination watcher feeding this registry's own mailbox.
    fn watch(&self, handle: DeviceHandle) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = handle.terminated() => {
                    let device_id = handle.device_id().clone();
                    let _ = tx
                        .send(GroupEvent::DeviceTerminated { device_id, handle })
                        .await;
                }
                _ = tx.closed() => {}
            }
        });
    }

    fn handle_list(
        &self,
        request_id: RequestId,
        group_id: GroupId,
        reply: oneshot::Sender<Result<ReplyDeviceList>>,
    ) {
        if group_id != self.group_id {
            warn!(
                addressed = %group_id,
                actual = %self.group_id,
                "List request for wrong group"
            );
            let _ = reply.send(Err(GroupError::GroupMismatch {
                addressed: group_id,
                actual: self.group_id.clone(),
            }));
            return;
        }

        let ids = self.members.keys().cloned().collect();
        let _ = reply.send(Ok(ReplyDeviceList { request_id, ids }));
    }

    fn handle_query(
        &self,
        request_id: RequestId,
        group_id: GroupId,
        deadline: Option<Duration>,
        reply: oneshot::Sender<Result<ReplyAllReadings>>,
    ) {
        if group_id != self.group_id {
            warn!(
                addressed = %group_id,
                actual = %self.group_id,
                "Query request for wrong group"
            );
            let _ = reply.send(Err(GroupError::GroupMismatch {
                addressed: group_id,
                actual: self.group_id.clone(),
            }));
            return;
        }

        let snapshot: Vec<DeviceHandle> = self.members.values().cloned().collect();
        let deadline = deadline.unwrap_or(self.config.default_deadline);

        debug!(
            group_id = %self.group_id,
            request_id = %request_id,
            members = snapshot.len(),
            ?deadline,
            "Dispatching query"
        );
        self.events.emit(
            EventSource::Registry,
            SensorEvent::QueryDispatched {
                group_id: self.group_id.clone(),
                request_id,
                members: snapshot.len(),
            },
        );

        spawn_query(
            self.group_id.clone(),
            request_id,
            snapshot,
            deadline,
            reply,
            self.events.clone(),
        );
    }

    /// Process a liveness-lost notification. Returns true when the
    /// registry should stop (last member gone).
    fn handle_terminated(&mut self, device_id: DeviceId, handle: DeviceHandle) -> bool {
        let current_generation = self
            .members
            .get(&device_id)
            .map(|current| current.same_handle(&handle));
        match current_generation {
            Some(true) => {
                self.members.remove(&device_id);
                info!(
                    group_id = %self.group_id,
                    device_id = %device_id,
                    remaining = self.members.len(),
                    "Tracked device terminated"
                );
                self.events.emit(
                    EventSource::Registry,
                    SensorEvent::DeviceTerminated {
                        group_id: self.group_id.clone(),
                        device_id,
                    },
                );
                if self.members.is_empty() && self.ever_tracked {
                    info!(group_id = %self.group_id, "Last device terminated, stopping group");
                    return true;
                }
            }
            Some(false) => {
                // Notification for an earlier generation of a device id
                // that was re-registered in the meantime.
                debug!(
                    group_id = %self.group_id,
                    device_id = %device_id,
                    "Stale termination for a replaced device"
                );
            }
            None => {
                // Watchers only exist for tracked handles, and each fires
                // at most once; an unknown id is a contract violation.
                debug_assert!(false, "termination for untracked device {device_id}");
                warn!(
                    group_id = %self.group_id,
                    device_id = %device_id,
                    "Termination notification for untracked device"
                );
            }
        }
        false
    }
}
