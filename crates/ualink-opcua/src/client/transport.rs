// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session abstraction layer.
//!
//! [`UaSession`] is one open, activated OPC UA session. [`SessionFactory`]
//! opens sessions from a [`ConnectionDescriptor`] and the service identity.
//! Pools, the dispatcher and the executors only talk to these traits, so
//! the wire client can be swapped for an in-memory double in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::config::{ConnectionDescriptor, IdentityConfig};
use crate::error::OpcUaResult;
use crate::types::{NodeId, StatusCode};

// =============================================================================
// OpcUaValue
// =============================================================================

/// Variant value as carried on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),

    /// Signed byte.
    SByte(i8),

    /// Unsigned byte.
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 64-bit signed integer.
    Int64(i64),

    /// 64-bit unsigned integer.
    UInt64(u64),

    /// 32-bit float.
    Float(f32),

    /// 64-bit double.
    Double(f64),

    /// String value.
    String(String),

    /// Date/time value.
    DateTime(DateTime<Utc>),

    /// GUID value.
    Guid(uuid::Uuid),

    /// Byte string.
    ByteString(Vec<u8>),

    /// Array of values.
    Array(Vec<OpcUaValue>),

    /// Empty variant.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Returns the built-in type name of the variant.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
            Self::ByteString(_) => "ByteString",
            Self::Array(_) => "Array",
            Self::Null => "Null",
        }
    }

    /// Returns `true` for the empty variant.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value.
    pub value: OpcUaValue,

    /// Status of the value.
    pub status: StatusCode,

    /// Time the value was produced by its source.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Time the server handled the value.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value without timestamps.
    pub fn new(value: OpcUaValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Creates a good value stamped now.
    pub fn now(value: OpcUaValue) -> Self {
        let now = Utc::now();
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// Replaces the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

// =============================================================================
// Method calls and subscriptions
// =============================================================================

/// Outcome of a method call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodCallResult {
    /// Overall status of the call.
    pub status: StatusCode,

    /// Output arguments in declaration order.
    pub outputs: Vec<OpcUaValue>,

    /// Timestamp of the outputs. Call results carry no source timestamp of
    /// their own, so transports stamp the time the response arrived.
    pub source_timestamp: Option<DateTime<Utc>>,
}

/// A monitored item to add to a subscription.
///
/// Items always monitor the `Value` attribute in reporting mode with both
/// timestamps requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredItemRequest {
    /// Node to monitor.
    pub node_id: NodeId,

    /// Caller-chosen handle echoed in every notification of the item.
    pub client_handle: u32,
}

/// A data change delivered for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemNotification {
    /// Client handle of the monitored item.
    pub client_handle: u32,

    /// The new value.
    pub value: DataValue,
}

// =============================================================================
// UaSession Trait
// =============================================================================

/// One open, activated session.
///
/// Implementations must be `Send + Sync`; a session is used by one borrower
/// at a time but moves between tasks.
#[async_trait]
pub trait UaSession: Send + Sync {
    /// Returns the endpoint URL the session is connected to.
    fn endpoint(&self) -> &str;

    /// Returns `true` while the session is usable.
    fn is_connected(&self) -> bool;

    /// Reads the `Value` attribute of a node with both timestamps.
    async fn read(&self, node_id: &NodeId, max_age: Duration) -> OpcUaResult<DataValue>;

    /// Calls a method on an object.
    async fn call_method(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        inputs: Vec<OpcUaValue>,
    ) -> OpcUaResult<MethodCallResult>;

    /// Writes the `Value` attribute of a node and returns the result status.
    async fn write(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<StatusCode>;

    /// Creates a subscription whose data changes are pushed to `notifications`.
    ///
    /// Returns the subscription ID.
    async fn create_subscription(
        &self,
        publishing_interval: Duration,
        notifications: mpsc::Sender<ItemNotification>,
    ) -> OpcUaResult<u32>;

    /// Adds monitored items to a subscription and returns one status per item.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<StatusCode>>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()>;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&self);
}

// =============================================================================
// SessionFactory Trait
// =============================================================================

/// Opens sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Discovers endpoints, selects the one matching the descriptor's
    /// security settings and opens an activated session on it.
    async fn create_session(
        &self,
        descriptor: &ConnectionDescriptor,
        identity: &IdentityConfig,
    ) -> OpcUaResult<Box<dyn UaSession>>;
}

// =============================================================================
// Tests
// =============================================================================
