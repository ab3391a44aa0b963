// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Host adapter tying pools, subscriptions and executors together.
//!
//! The host translates its own device lifecycle events into calls on
//! [`OpcUaDriver`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         OpcUaDriver                             │
//! │  initialize / add / update / remove / lock / update_identity    │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                     │                       │
//!          ▼                     ▼                       ▼
//! ┌──────────────────┐ ┌──────────────────────┐ ┌──────────────────┐
//! │ CommandExecutor  │ │ SubscriptionDispatch │ │ NamedPoolRegistry│
//! │ (read / write)   │ │ (one task / device)  │ │ (pools, identity)│
//! └──────────────────┘ └──────────────────────┘ └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use ualink_opcua::{DriverConfig, InMemoryDeviceRegistry, OpcUaDriver, OpcUaSessionFactory};
//!
//! let config = DriverConfig::builder().build()?;
//! let factory = OpcUaSessionFactory::new("ualink").with_session_timeout(config.session_timeout);
//! let devices = Arc::new(InMemoryDeviceRegistry::new());
//! let (sink, mut readings) = mpsc::channel(1024);
//!
//! let driver = OpcUaDriver::new(config, Arc::new(factory), devices, sink)?;
//! driver.initialize().await;
//! let values = driver.handle_read_commands("boiler-1", &requests).await?;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::client::{NamedPoolRegistry, SessionFactory};
use crate::command::{CommandValue, Reading};
use crate::config::{ConnectionDescriptor, DriverConfig, IdentityConfig};
use crate::device::{DeviceRegistry, DeviceResource};
use crate::error::{ConfigurationError, OpcUaResult};
use crate::executor::CommandExecutor;
use crate::subscription::SubscriptionDispatcher;

// =============================================================================
// OpcUaDriver
// =============================================================================

/// OPC UA device driver.
///
/// Owns the pool registry, the subscription dispatcher and the command
/// executor. Device definitions stay with the host and are looked up through
/// the [`DeviceRegistry`] on every call.
pub struct OpcUaDriver {
    config: DriverConfig,
    devices: Arc<dyn DeviceRegistry>,
    registry: Arc<NamedPoolRegistry>,
    dispatcher: SubscriptionDispatcher,
    executor: CommandExecutor,
}

impl OpcUaDriver {
    /// Creates a driver; readings from subscriptions go to `sink`.
    pub fn new(
        config: DriverConfig,
        factory: Arc<dyn SessionFactory>,
        devices: Arc<dyn DeviceRegistry>,
        sink: mpsc::Sender<Reading>,
    ) -> OpcUaResult<Self> {
        config.validate()?;

        let registry = Arc::new(NamedPoolRegistry::new(
            factory,
            config.identity.clone(),
            config.admission,
        ));
        let dispatcher = SubscriptionDispatcher::new(
            registry.clone(),
            sink,
            config.publish_interval,
            config.notification_buffer,
        );
        let executor = CommandExecutor::new(registry.clone(), config.read_max_age);

        Ok(Self {
            config,
            devices,
            registry,
            dispatcher,
            executor,
        })
    }

    /// Returns the driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Returns the pool registry.
    pub fn registry(&self) -> &Arc<NamedPoolRegistry> {
        &self.registry
    }

    /// Returns the subscription dispatcher.
    pub fn dispatcher(&self) -> &SubscriptionDispatcher {
        &self.dispatcher
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Subscribes every known device.
    ///
    /// Devices with invalid connection settings are logged and skipped.
    /// Returns the number of devices with a running subscription.
    pub async fn initialize(&self) -> usize {
        let subscribed = self.subscribe_all().await;
        info!(
            devices = self.devices.device_names().len(),
            subscribed,
            admission = %self.config.admission,
            "OPC UA driver initialized"
        );
        subscribed
    }

    /// Starts watching a newly added device.
    pub async fn add_device(&self, device: &str) -> OpcUaResult<bool> {
        let subscribed = self.subscribe_device(device).await?;
        info!(device = %device, subscribed, "Device added");
        Ok(subscribed)
    }

    /// Applies changed device settings.
    ///
    /// The new settings are parsed first; when they are invalid nothing is
    /// touched. Otherwise a pool built from older settings is terminated and
    /// the device is re-subscribed.
    pub async fn update_device(&self, device: &str) -> OpcUaResult<bool> {
        let descriptor = self.descriptor(device)?;
        self.registry
            .check_updates_and_do_update(device, &descriptor)
            .await;
        let resources = self.devices.device_resources(device);
        let subscribed = self
            .dispatcher
            .subscribe(device, descriptor, &resources)
            .await;
        info!(device = %device, subscribed, "Device updated");
        Ok(subscribed)
    }

    /// Stops watching a removed device and terminates its pool.
    pub async fn remove_device(&self, device: &str) {
        self.release_device(device).await;
        info!(device = %device, "Device removed");
    }

    /// Stops watching a locked device and terminates its pool.
    pub async fn lock_device(&self, device: &str) {
        self.release_device(device).await;
        info!(device = %device, "Device locked");
    }

    /// Replaces the service identity.
    ///
    /// Every pool is terminated and every device re-subscribed, so all new
    /// sessions use the new certificate.
    pub async fn update_identity(&self, identity: IdentityConfig) -> OpcUaResult<usize> {
        identity.validate()?;
        self.dispatcher.unsubscribe_all().await;
        self.registry.reset(identity).await;
        let subscribed = self.subscribe_all().await;
        info!(subscribed, "Identity updated");
        Ok(subscribed)
    }

    /// Cancels every subscription and terminates every pool.
    pub async fn stop(&self) {
        self.dispatcher.unsubscribe_all().await;
        self.registry.terminate_all().await;
        info!("OPC UA driver stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Reads resources of a device.
    pub async fn handle_read_commands(
        &self,
        device: &str,
        requests: &[DeviceResource],
    ) -> OpcUaResult<Vec<Reading>> {
        let descriptor = self.descriptor(device)?;
        self.registry
            .check_updates_and_do_update(device, &descriptor)
            .await;
        self.executor.read(device, &descriptor, requests).await
    }

    /// Writes resources of a device, one value per request.
    pub async fn handle_write_commands(
        &self,
        device: &str,
        requests: &[DeviceResource],
        values: &[CommandValue],
    ) -> OpcUaResult<()> {
        let descriptor = self.descriptor(device)?;
        self.registry
            .check_updates_and_do_update(device, &descriptor)
            .await;
        self.executor
            .write(device, &descriptor, requests, values)
            .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn descriptor(&self, device: &str) -> OpcUaResult<ConnectionDescriptor> {
        let definition = self
            .devices
            .device(device)
            .ok_or_else(|| ConfigurationError::unknown_device(device))?;
        ConnectionDescriptor::from_protocols(&definition.protocols)
    }

    async fn subscribe_device(&self, device: &str) -> OpcUaResult<bool> {
        let descriptor = self.descriptor(device)?;
        let resources = self.devices.device_resources(device);
        Ok(self
            .dispatcher
            .subscribe(device, descriptor, &resources)
            .await)
    }

    async fn subscribe_all(&self) -> usize {
        let mut subscribed = 0;
        for device in self.devices.device_names() {
            match self.subscribe_device(&device).await {
                Ok(true) => subscribed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(device = %device, "Skipping device with invalid settings");
                    e.log(&format!("subscribing device '{}'", device));
                }
            }
        }
        subscribed
    }

    async fn release_device(&self, device: &str) {
        self.dispatcher.unsubscribe(device).await;
        self.registry.terminate_named_pool(device).await;
    }
}

impl std::fmt::Debug for OpcUaDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaDriver")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
