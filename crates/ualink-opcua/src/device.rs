// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device and profile lookups provided by the host.
//!
//! The driver never owns device definitions; it asks a [`DeviceRegistry`]
//! for a device's protocol properties and for the resources of its profile.
//! [`InMemoryDeviceRegistry`] is a ready-made implementation for embedding
//! and tests.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::CommandDescriptor;
use crate::config::DeviceProtocols;
use crate::error::OpcUaResult;
use crate::types::ValueType;

// =============================================================================
// Device model
// =============================================================================

/// One resource of a device profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResource {
    /// Resource name.
    pub name: String,
    /// Declared value type.
    pub value_type: ValueType,
    /// Free-form attributes, see [`CommandDescriptor::parse`].
    #[serde(default)]
    pub attributes: Value,
}

impl DeviceResource {
    /// Creates a resource.
    pub fn new(name: impl Into<String>, value_type: ValueType, attributes: Value) -> Self {
        Self {
            name: name.into(),
            value_type,
            attributes,
        }
    }

    /// Parses the resource attributes.
    pub fn descriptor(&self) -> OpcUaResult<CommandDescriptor> {
        CommandDescriptor::parse(&self.name, self.value_type, &self.attributes)
    }
}

/// A device known to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device name.
    pub name: String,
    /// Profile name.
    pub profile: String,
    /// Protocol sections, including `opcua`.
    #[serde(default)]
    pub protocols: DeviceProtocols,
}

// =============================================================================
// DeviceRegistry Trait
// =============================================================================

/// Host-side device and profile lookups.
pub trait DeviceRegistry: Send + Sync {
    /// Returns every known device name.
    fn device_names(&self) -> Vec<String>;

    /// Returns a device.
    fn device(&self, name: &str) -> Option<Device>;

    /// Returns the resources of a profile.
    fn profile_resources(&self, profile: &str) -> Vec<DeviceResource>;

    /// Returns one resource of a device's profile.
    fn device_resource(&self, device: &str, resource: &str) -> Option<DeviceResource> {
        let device = self.device(device)?;
        self.profile_resources(&device.profile)
            .into_iter()
            .find(|r| r.name == resource)
    }

    /// Returns every resource of a device's profile.
    fn device_resources(&self, device: &str) -> Vec<DeviceResource> {
        self.device(device)
            .map(|d| self.profile_resources(&d.profile))
            .unwrap_or_default()
    }
}

// =============================================================================
// InMemoryDeviceRegistry
// =============================================================================

/// Thread-safe in-memory [`DeviceRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    profiles: RwLock<HashMap<String, Vec<DeviceResource>>>,
}

impl InMemoryDeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a device.
    pub fn upsert_device(&self, device: Device) {
        self.devices.write().insert(device.name.clone(), device);
    }

    /// Removes a device.
    pub fn remove_device(&self, name: &str) -> Option<Device> {
        self.devices.write().remove(name)
    }

    /// Adds or replaces a profile.
    pub fn upsert_profile(&self, name: impl Into<String>, resources: Vec<DeviceResource>) {
        self.profiles.write().insert(name.into(), resources);
    }
}

impl DeviceRegistry for InMemoryDeviceRegistry {
    fn device_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn device(&self, name: &str) -> Option<Device> {
        self.devices.read().get(name).cloned()
    }

    fn profile_resources(&self, profile: &str) -> Vec<DeviceResource> {
        self.profiles.read().get(profile).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_registry() {
        let registry = InMemoryDeviceRegistry::new();
        registry.upsert_profile(
            "boiler",
            vec![DeviceResource::new(
                "Temperature",
                ValueType::Float64,
                json!({ "nodeId": "ns=2;s=Temp" }),
            )],
        );
        registry.upsert_device(Device {
            name: "boiler-1".into(),
            profile: "boiler".into(),
            protocols: DeviceProtocols::new(),
        });

        assert_eq!(registry.device_names(), vec!["boiler-1"]);
        assert!(registry.device_resource("boiler-1", "Temperature").is_some());
        assert!(registry.device_resource("boiler-1", "Pressure").is_none());
        assert_eq!(registry.device_resources("boiler-1").len(), 1);
        assert!(registry.device_resources("missing").is_empty());

        let descriptor = registry
            .device_resource("boiler-1", "Temperature")
            .unwrap()
            .descriptor()
            .unwrap();
        assert_eq!(descriptor.resource_name, "Temperature");
    }
}
