// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-device subscription dispatch.
//!
//! Each subscribed device runs on its own task with its own unpooled
//! session:
//!
//! ```text
//!   subscribe(device)
//!        │ cancel previous task, spawn
//!        ▼
//!   ┌─────────────────────────────────────────────┐
//!   │ device task                                 │
//!   │  1. open dedicated session                  │
//!   │  2. create subscription (publish interval)  │
//!   │  3. one monitored item per watchable node   │──▶ binding table
//!   │  4. loop: notification ─▶ decode ─▶ sink    │    handle -> resource
//!   │  5. on cancel: delete subscription, close   │
//!   └─────────────────────────────────────────────┘
//! ```
//!
//! Handles come from one dispatcher-wide counter, so they are unique across
//! devices. The task resolves handles against its own binding table, which
//! is shared read-only; no lock is held while a reading is sent to the sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{ItemNotification, MonitoredItemRequest, NamedPoolRegistry, UaSession};
use crate::codec;
use crate::command::{CommandDescriptor, Reading};
use crate::config::ConnectionDescriptor;
use crate::device::DeviceResource;
use crate::error::{OpcUaError, OpcUaResult, SubscriptionError};

// =============================================================================
// Bindings and stats
// =============================================================================

/// What a monitored item handle resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    /// Device name.
    pub device_name: String,
    /// Parsed resource.
    pub command: CommandDescriptor,
}

/// Handle table of one device.
pub type BindingTable = HashMap<u32, ResourceBinding>;

/// Dispatcher counters.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    notifications: AtomicU64,
    readings: AtomicU64,
    decode_failures: AtomicU64,
    bad_status: AtomicU64,
    unknown_handles: AtomicU64,
}

impl DispatcherStats {
    /// Returns a point-in-time copy.
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            readings: self.readings.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            bad_status: self.bad_status.load(Ordering::Relaxed),
            unknown_handles: self.unknown_handles.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`DispatcherStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatcherStatsSnapshot {
    /// Notifications received.
    pub notifications: u64,
    /// Readings sent to the sink.
    pub readings: u64,
    /// Notifications whose value did not decode.
    pub decode_failures: u64,
    /// Notifications carrying a non-good status.
    pub bad_status: u64,
    /// Notifications for handles without a binding.
    pub unknown_handles: u64,
}

// =============================================================================
// SubscriptionDispatcher
// =============================================================================

struct DeviceTask {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl DeviceTask {
    async fn stop(self, device: &str) {
        let _ = self.cancel.send(());
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!(device = %device, "Subscription task panicked");
            }
        }
    }
}

struct Shared {
    registry: Arc<NamedPoolRegistry>,
    sink: mpsc::Sender<Reading>,
    publish_interval: Duration,
    buffer: usize,
    bindings: DashMap<String, Arc<BindingTable>>,
    next_handle: AtomicU32,
    stats: DispatcherStats,
}

/// Runs one subscription task per device and forwards decoded readings.
pub struct SubscriptionDispatcher {
    shared: Arc<Shared>,
    tasks: Mutex<HashMap<String, DeviceTask>>,
}

impl SubscriptionDispatcher {
    /// Creates a dispatcher sending readings to `sink`.
    pub fn new(
        registry: Arc<NamedPoolRegistry>,
        sink: mpsc::Sender<Reading>,
        publish_interval: Duration,
        buffer: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                sink,
                publish_interval,
                buffer: buffer.max(1),
                bindings: DashMap::new(),
                next_handle: AtomicU32::new(1),
                stats: DispatcherStats::default(),
            }),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Parses the resources that can be subscribed to.
    ///
    /// Keeps watchable resources with a node ID; malformed resources are
    /// logged and skipped.
    pub fn watchable(device: &str, resources: &[DeviceResource]) -> Vec<CommandDescriptor> {
        resources
            .iter()
            .filter_map(|resource| match resource.descriptor() {
                Ok(command) => Some(command),
                Err(e) => {
                    warn!(
                        device = %device,
                        resource = %resource.name,
                        error = %e,
                        "Skipping resource with invalid attributes"
                    );
                    None
                }
            })
            .filter(|command| command.watchable && command.node_id().is_some())
            .collect()
    }

    /// (Re)subscribes a device.
    ///
    /// Any previous subscription of the device is cancelled first. Returns
    /// `false` when the device has nothing to watch.
    pub async fn subscribe(
        &self,
        device: &str,
        descriptor: ConnectionDescriptor,
        resources: &[DeviceResource],
    ) -> bool {
        self.unsubscribe(device).await;

        let commands = Self::watchable(device, resources);
        if commands.is_empty() {
            debug!(device = %device, "No watchable resources, skipping subscription");
            return false;
        }

        let (cancel, cancelled) = oneshot::channel();
        let handle = tokio::spawn(run_device(
            self.shared.clone(),
            device.to_string(),
            descriptor,
            commands,
            cancelled,
        ));

        let previous = self
            .tasks
            .lock()
            .insert(device.to_string(), DeviceTask { cancel, handle });
        if let Some(previous) = previous {
            previous.stop(device).await;
        }
        true
    }

    /// Cancels a device's subscription and waits for its cleanup.
    ///
    /// Returns `true` if the device had a subscription task.
    pub async fn unsubscribe(&self, device: &str) -> bool {
        let task = self.tasks.lock().remove(device);
        match task {
            Some(task) => {
                task.stop(device).await;
                true
            }
            None => false,
        }
    }

    /// Cancels every subscription.
    pub async fn unsubscribe_all(&self) {
        let tasks: Vec<(String, DeviceTask)> = self.tasks.lock().drain().collect();
        for (device, task) in tasks {
            task.stop(&device).await;
        }
    }

    /// Returns `true` while the device's subscription task is running.
    pub fn is_subscribed(&self, device: &str) -> bool {
        self.tasks
            .lock()
            .get(device)
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Returns the names of devices with a running subscription task.
    pub fn subscribed_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self
            .tasks
            .lock()
            .iter()
            .filter(|(_, task)| !task.handle.is_finished())
            .map(|(device, _)| device.clone())
            .collect();
        devices.sort();
        devices
    }

    /// Returns the active handle table of a device.
    pub fn bindings(&self, device: &str) -> Option<Arc<BindingTable>> {
        self.shared.bindings.get(device).map(|entry| entry.value().clone())
    }

    /// Returns the dispatcher counters.
    pub fn stats(&self) -> &DispatcherStats {
        &self.shared.stats
    }
}

impl std::fmt::Debug for SubscriptionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionDispatcher")
            .field("devices", &self.subscribed_devices())
            .field("publish_interval", &self.shared.publish_interval)
            .finish()
    }
}

// =============================================================================
// Device task
// =============================================================================

async fn run_device(
    shared: Arc<Shared>,
    device: String,
    descriptor: ConnectionDescriptor,
    commands: Vec<CommandDescriptor>,
    mut cancelled: oneshot::Receiver<()>,
) {
    let session = tokio::select! {
        biased;
        _ = &mut cancelled => return,
        result = shared.registry.open_session(&descriptor) => match result {
            Ok(session) => session,
            Err(e) => {
                e.log(&format!("opening subscription session for device '{}'", device));
                return;
            }
        },
    };

    if let Err(e) = shared
        .watch(&device, session.as_ref(), commands, &mut cancelled)
        .await
    {
        e.log(&format!("subscription of device '{}'", device));
    }

    session.close().await;
    info!(device = %device, "Subscription stopped");
}

impl Shared {
    async fn watch(
        &self,
        device: &str,
        session: &dyn UaSession,
        commands: Vec<CommandDescriptor>,
        cancelled: &mut oneshot::Receiver<()>,
    ) -> OpcUaResult<()> {
        let (tx, mut rx) = mpsc::channel(self.buffer);
        let subscription_id = session
            .create_subscription(self.publish_interval, tx)
            .await
            .map_err(|e| SubscriptionError::creation_failed(device, e.to_string()))?;

        let mut table = BindingTable::new();
        let mut requests = Vec::with_capacity(commands.len());
        for command in commands {
            let Some(node_id) = command.node_id().cloned() else {
                continue;
            };
            let client_handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
            requests.push(MonitoredItemRequest {
                node_id,
                client_handle,
            });
            table.insert(
                client_handle,
                ResourceBinding {
                    device_name: device.to_string(),
                    command,
                },
            );
        }

        let statuses = match session
            .create_monitored_items(subscription_id, &requests)
            .await
        {
            Ok(statuses) => statuses,
            Err(e) => {
                let _ = session.delete_subscription(subscription_id).await;
                return Err(e);
            }
        };
        // Items without a result were never acknowledged and count as rejected.
        for (index, request) in requests.iter().enumerate() {
            let reason = match statuses.get(index) {
                Some(status) if status.is_good() => {
                    debug!(
                        device = %device,
                        node_id = %request.node_id,
                        handle = request.client_handle,
                        "Monitored item registered"
                    );
                    continue;
                }
                Some(status) => status.to_string(),
                None => "no result returned".to_string(),
            };
            let rejected = OpcUaError::from(SubscriptionError::monitored_item_failed(
                request.node_id.to_string(),
                reason,
            ));
            rejected.log(&format!("subscription of device '{}'", device));
            table.remove(&request.client_handle);
        }
        if table.is_empty() {
            let _ = session.delete_subscription(subscription_id).await;
            return Err(
                SubscriptionError::creation_failed(device, "no monitored item was accepted").into(),
            );
        }

        let table = Arc::new(table);
        self.bindings.insert(device.to_string(), table.clone());
        info!(
            device = %device,
            subscription_id,
            items = table.len(),
            interval = ?self.publish_interval,
            "Subscription started"
        );

        // A full sink must not keep the task from seeing its cancellation.
        loop {
            let notification = tokio::select! {
                _ = &mut *cancelled => break,
                notification = rx.recv() => notification,
            };
            let Some(notification) = notification else {
                warn!(device = %device, "Notification stream closed");
                break;
            };
            let delivered = tokio::select! {
                _ = &mut *cancelled => break,
                delivered = self.dispatch(&table, notification) => delivered,
            };
            if !delivered {
                break;
            }
        }

        self.bindings
            .remove_if(device, |_, current| Arc::ptr_eq(current, &table));
        if let Err(e) = session.delete_subscription(subscription_id).await {
            debug!(device = %device, error = %e, "Failed to delete subscription");
        }
        Ok(())
    }

    /// Returns `false` once the sink is gone.
    async fn dispatch(&self, table: &BindingTable, notification: ItemNotification) -> bool {
        self.stats.notifications.fetch_add(1, Ordering::Relaxed);

        let Some(binding) = table.get(&notification.client_handle) else {
            self.stats.unknown_handles.fetch_add(1, Ordering::Relaxed);
            debug!(handle = notification.client_handle, "Notification for unknown handle");
            return true;
        };
        let command = &binding.command;

        if !notification.value.status.is_good() {
            self.stats.bad_status.fetch_add(1, Ordering::Relaxed);
            warn!(
                device = %binding.device_name,
                resource = %command.resource_name,
                status = %notification.value.status,
                "Ignoring data change with non-good status"
            );
            return true;
        }

        let value = match codec::decode_reading(
            &command.resource_name,
            command.value_type,
            &notification.value.value,
        ) {
            Ok(value) => value,
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    device = %binding.device_name,
                    resource = %command.resource_name,
                    error = %e,
                    "Failed to decode data change"
                );
                return true;
            }
        };

        let reading = Reading::new(&binding.device_name, &command.resource_name, value)
            .with_source_timestamp(notification.value.source_timestamp);
        if self.sink.send(reading).await.is_err() {
            error!(device = %binding.device_name, "Reading sink closed");
            return false;
        }
        self.stats.readings.fetch_add(1, Ordering::Relaxed);
        true
    }
}
