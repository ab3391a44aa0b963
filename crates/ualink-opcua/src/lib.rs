// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Pooled OPC UA sessions for device services.
//!
//! This crate is the protocol core of an OPC UA device service. It keeps a
//! bounded pool of sessions per device, watches subscribed resources on a
//! dedicated session per device, and converts between OPC UA variants and
//! strictly typed command values.
//!
//! # Features
//!
//! - Per-device session pools with `wait`, `reject` and `create` admission
//! - Pool invalidation on connection drift and identity replacement
//! - Subscription dispatch with per-device handle tables
//! - Read, method-call and write execution with range-checked conversion
//! - `real-transport` feature: sessions backed by the `opcua` crate
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Discovery, endpoint selection, handshake
//! ├── Pool          - Terminated or saturated pools
//! ├── Operation     - Read/write/call failures and bad status codes
//! ├── Subscription  - Subscription and monitored item setup
//! ├── Conversion    - Value decoding and range checks
//! └── Configuration - Device properties, identity, resource attributes
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ualink_opcua::{DriverConfig, OpcUaDriver};
//!
//! let driver = OpcUaDriver::new(DriverConfig::default(), factory, devices, sink)?;
//! driver.initialize().await;
//!
//! let readings = driver.handle_read_commands("boiler-1", &resources).await?;
//! for reading in readings {
//!     println!("{} = {}", reading.resource_name, reading.value);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod executor;
pub mod subscription;
pub mod types;

// Re-export commonly used types
pub use error::{
    ConfigurationError, ConnectionError, ConversionError, ErrorCode, ErrorSeverity, OpcUaError,
    OpcUaResult, OperationError, PoolError, SubscriptionError,
};

pub use types::{AuthType, NodeId, NodeIdentifier, SecurityMode, SecurityPolicy, StatusCode, ValueType};

pub use client::{
    ClientWrapper, ConnectionPool, DataValue, NamedPoolRegistry, OpcUaValue, SessionFactory,
    UaSession,
};
pub use command::{CommandDescriptor, CommandTarget, CommandValue, Reading};
pub use config::{
    AdmissionStrategy, ConnectionDescriptor, DriverConfig, DriverConfigBuilder, IdentityConfig,
};
pub use device::{Device, DeviceRegistry, DeviceResource, InMemoryDeviceRegistry};
pub use driver::OpcUaDriver;
pub use executor::CommandExecutor;
pub use subscription::{ResourceBinding, SubscriptionDispatcher};

#[cfg(feature = "real-transport")]
pub use client::OpcUaSessionFactory;
