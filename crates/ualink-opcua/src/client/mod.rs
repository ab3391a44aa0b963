// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session layer: transport seam, session planning and pooling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     NamedPoolRegistry                           │
//! │        (device name -> pool, identity, admission strategy)      │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ConnectionPool                             │
//! │          (bounded admission, idle cache, termination)           │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ ClientWrapper
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                SessionFactory / UaSession                       │
//! │     (opcua client behind `real-transport`, doubles in tests)    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod factory;
mod pool;
mod registry;
mod transport;
mod wrapper;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use factory::{
    pem_to_der, select_endpoint, subscription_counts, ClientCertificate, EndpointSummary,
    SessionPlan, UserIdentity, KEEP_ALIVE_COUNT,
};
pub use pool::{ConnectionPool, PoolStats, PoolStatsSnapshot};
pub use registry::NamedPoolRegistry;
pub use transport::{
    DataValue, ItemNotification, MethodCallResult, MonitoredItemRequest, OpcUaValue,
    SessionFactory, UaSession,
};
pub use wrapper::ClientWrapper;

#[cfg(feature = "real-transport")]
pub use real_transport::OpcUaSessionFactory;
