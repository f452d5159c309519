//! Group manager: the directory one level above the registries
//!
//! The manager owns a map from group id to group handle, creates a
//! group on first reference and removes it again when the group's own
//! empty-after-nonempty rule stops it. It never interprets device state;
//! registration requests are forwarded to the owning group and the
//! resulting device handle is relayed back to the caller.

use std::collections::{HashMap, HashSet};

use sensornet_device::DeviceHandle;
use sensornet_types::{DeviceId, EventSource, GroupId, SensorEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::events::EventAggregator;
use crate::group::{GroupHandle, GroupRegistry};

/// The manager's merged inbound event stream
enum ManagerEvent {
    Track {
        group_id: GroupId,
        device_id: DeviceId,
        reply: oneshot::Sender<DeviceHandle>,
    },
    GetGroup {
        group_id: GroupId,
        reply: oneshot::Sender<Option<GroupHandle>>,
    },
    ListGroups {
        reply: oneshot::Sender<HashSet<GroupId>>,
    },
    /// A group registry stopped; carries the observed handle so a stale
    /// notification for a recreated group can be told apart.
    GroupTerminated {
        group_id: GroupId,
        handle: GroupHandle,
    },
}

/// Handle to the running manager task
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<ManagerEvent>,
}

impl ManagerHandle {
    /// Register a device, creating its group on first reference.
    ///
    /// `None` means no reply was produced, which only happens when the
    /// addressed group stopped in the instant between routing and
    /// registration.
    pub async fn track_device(
        &self,
        group_id: GroupId,
        device_id: DeviceId,
    ) -> Option<DeviceHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ManagerEvent::Track {
                group_id,
                device_id,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Look up the handle of a live group.
    pub async fn group(&self, group_id: GroupId) -> Option<GroupHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ManagerEvent::GetGroup { group_id, reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Snapshot of the live group ids.
    pub async fn list_groups(&self) -> HashSet<GroupId> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(ManagerEvent::ListGroups { reply })
            .await
            .is_err()
        {
            return HashSet::new();
        }
        rx.await.unwrap_or_default()
    }
}

/// Directory task owning all group registries.
pub struct GroupManager {
    config: RegistryConfig,
    groups: HashMap<GroupId, GroupHandle>,
    rx: mpsc::Receiver<ManagerEvent>,
    self_tx: mpsc::Sender<ManagerEvent>,
    events: EventAggregator,
}

impl GroupManager {
    /// Spawn the manager task and return its handle.
    pub fn spawn(config: RegistryConfig, events: EventAggregator) -> ManagerHandle {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let handle = ManagerHandle { tx: tx.clone() };
        let mut manager = GroupManager {
            config,
            groups: HashMap::new(),
            rx,
            self_tx: tx,
            events,
        };
        tokio::spawn(async move {
            manager.run().await;
        });
        handle
    }

    async fn run(&mut self) {
        info!("Group manager started");

        while let Some(event) = self.rx.recv().await {
            match event {
                ManagerEvent::Track {
                    group_id,
                    device_id,
                    reply,
                } => self.handle_track(group_id, device_id, reply),
                ManagerEvent::GetGroup { group_id, reply } => {
                    let group = self
                        .groups
                        .get(&group_id)
                        .filter(|g| !g.is_terminated())
                        .cloned();
                    let _ = reply.send(group);
                }
                ManagerEvent::ListGroups { reply } => {
                    // Same liveness view as GetGroup: a group whose
                    // termination notification is still in flight does
                    // not show up.
                    let live = self
                        .groups
                        .iter()
                        .filter(|(_, g)| !g.is_terminated())
                        .map(|(id, _)| id.clone())
                        .collect();
                    let _ = reply.send(live);
                }
                ManagerEvent::GroupTerminated { group_id, handle } => {
                    self.handle_group_terminated(group_id, handle);
                }
            }
        }

        info!("Group manager stopped");
    }

    fn handle_track(
        &mut self,
        group_id: GroupId,
        device_id: DeviceId,
        reply: oneshot::Sender<DeviceHandle>,
    ) {
        let live = self
            .groups
            .get(&group_id)
            .map(|g| !g.is_terminated())
            .unwrap_or(false);

        let group = if live {
            self.groups[&group_id].clone()
        } else {
            // First reference, or the previous registry stopped and its
            // notification is still in flight.
            let group = GroupRegistry::spawn(
                group_id.clone(),
                self.config.clone(),
                self.events.clone(),
            );
            self.watch(group.clone());
            self.groups.insert(group_id.clone(), group.clone());
            info!(group_id = %group_id, "Group created");
            self.events.emit(
                EventSource::Manager,
                SensorEvent::GroupCreated {
                    group_id: group_id.clone(),
                },
            );
            group
        };

        // Relay outside the manager loop so a slow group cannot stall
        // the directory.
        let mgr_tx = self.self_tx.clone();
        tokio::spawn(async move {
            match group
                .track_device(group_id.clone(), device_id.clone())
                .await
            {
                Some(handle) => {
                    let _ = reply.send(handle);
                }
                None => {
                    // The group stopped between routing and
                    // registration; requeue so a fresh group picks the
                    // request up.
                    debug!(group_id = %group_id, device_id = %device_id, "Requeueing registration after group teardown");
                    let _ = mgr_tx
                        .send(ManagerEvent::Track {
                            group_id,
                            device_id,
                            reply,
                        })
                        .await;
                }
            }
        });
    }

    /// Arm the termination watcher feeding this manager's own mailbox.
    fn watch(&self, handle: GroupHandle) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = handle.terminated() => {
                    let group_id = handle.group_id().clone();
                    let _ = tx
                        .send(ManagerEvent::GroupTerminated { group_id, handle })
                        .await;
                }
                _ = tx.closed() => {}
            }
        });
    }

    fn handle_group_terminated(&mut self, group_id: GroupId, handle: GroupHandle) {
        let current_generation = self
            .groups
            .get(&group_id)
            .map(|current| current.same_handle(&handle));
        match current_generation {
            Some(true) => {
                self.groups.remove(&group_id);
                info!(
                    group_id = %group_id,
                    remaining = self.groups.len(),
                    "Group removed after termination"
                );
            }
            Some(false) => {
                debug!(group_id = %group_id, "Stale termination for a recreated group");
            }
            None => {
                debug_assert!(false, "termination for untracked group {group_id}");
                warn!(group_id = %group_id, "Termination notification for untracked group");
            }
        }
    }
}
