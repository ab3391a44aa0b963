// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command descriptors, typed command values and readings.
//!
//! A device resource carries free-form attributes. [`CommandDescriptor::parse`]
//! turns them into one of two targets:
//!
//! ```text
//! { "nodeId": "ns=2;s=Temp", "watchable": true }      -> CommandTarget::Node
//! { "objectId": "ns=2;i=1", "methodId": "ns=2;i=7",
//!   "inputMap": ["a", "b"] }                          -> CommandTarget::Method
//! ```

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{ConfigurationError, ConversionError, OpcUaResult};
use crate::types::{NodeId, ValueType};

/// Attribute keys understood by [`CommandDescriptor::parse`].
pub mod attributes {
    /// Marks a resource for subscription.
    pub const WATCHABLE: &str = "watchable";
    /// Node read or written by the resource.
    pub const NODE_ID: &str = "nodeId";
    /// Method invoked by the resource.
    pub const METHOD_ID: &str = "methodId";
    /// Object owning the method.
    pub const OBJECT_ID: &str = "objectId";
    /// Ordered string arguments of the method call.
    pub const INPUT_MAP: &str = "inputMap";
}

/// Tag carrying the server source timestamp of a reading.
pub const SOURCE_TIMESTAMP_TAG: &str = "source timestamp";

// =============================================================================
// CommandDescriptor
// =============================================================================

/// What a resource addresses on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandTarget {
    /// A variable node.
    Node {
        /// Node ID.
        node_id: NodeId,
    },
    /// A method on an object node.
    Method {
        /// Object node ID.
        object_id: NodeId,
        /// Method node ID.
        method_id: NodeId,
        /// Positional string arguments.
        inputs: Vec<String>,
    },
}

/// Parsed resource attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Resource name.
    pub resource_name: String,
    /// Declared value type.
    pub value_type: ValueType,
    /// Whether the resource is subscribed to.
    pub watchable: bool,
    /// Node or method addressed by the resource.
    pub target: CommandTarget,
}

impl CommandDescriptor {
    /// Parses a resource's attribute map.
    ///
    /// # Errors
    ///
    /// - `watchable` without `nodeId`
    /// - neither `nodeId` nor `methodId`
    /// - `methodId` without `objectId`
    /// - malformed node IDs or a non-list `inputMap`
    ///
    /// When both `nodeId` and `methodId` are present the node wins and a
    /// warning is logged.
    pub fn parse(
        resource_name: impl Into<String>,
        value_type: ValueType,
        attributes: &Value,
    ) -> OpcUaResult<Self> {
        let resource_name = resource_name.into();
        let invalid = |reason: &str| ConfigurationError::invalid_command(&resource_name, reason);

        let map = match attributes {
            Value::Object(map) => map,
            Value::Null => return Err(invalid("resource has no attributes").into()),
            _ => return Err(invalid("attributes must be an object").into()),
        };

        let watchable = match map.get(attributes::WATCHABLE) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            Some(_) => return Err(invalid("watchable must be a boolean").into()),
        };

        let node_id = string_attr(map, attributes::NODE_ID, &resource_name)?;
        let method_id = string_attr(map, attributes::METHOD_ID, &resource_name)?;

        if watchable && node_id.is_none() {
            return Err(invalid("watchable resources require a nodeId").into());
        }

        let target = match (node_id, method_id) {
            (None, None) => {
                return Err(invalid("either nodeId or methodId is required").into());
            }
            (Some(node), method) => {
                if method.is_some() {
                    warn!(
                        resource = %resource_name,
                        "Both nodeId and methodId are set, using nodeId"
                    );
                }
                CommandTarget::Node {
                    node_id: node.parse()?,
                }
            }
            (None, Some(method)) => {
                let object = string_attr(map, attributes::OBJECT_ID, &resource_name)?
                    .ok_or_else(|| invalid("methodId requires an objectId"))?;
                CommandTarget::Method {
                    object_id: object.parse()?,
                    method_id: method.parse()?,
                    inputs: input_list(map.get(attributes::INPUT_MAP), &resource_name)?,
                }
            }
        };

        Ok(Self {
            resource_name,
            value_type,
            watchable,
            target,
        })
    }

    /// Returns `true` when the resource invokes a method.
    #[inline]
    pub fn is_method(&self) -> bool {
        matches!(self.target, CommandTarget::Method { .. })
    }

    /// Returns the node ID of a node target.
    pub fn node_id(&self) -> Option<&NodeId> {
        match &self.target {
            CommandTarget::Node { node_id } => Some(node_id),
            CommandTarget::Method { .. } => None,
        }
    }
}

fn string_attr<'a>(
    map: &'a serde_json::Map<String, Value>,
    key: &str,
    resource: &str,
) -> OpcUaResult<Option<&'a str>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim())),
        Some(_) => Err(ConfigurationError::invalid_command(
            resource,
            format!("{} must be a string", key),
        )
        .into()),
    }
}

fn input_list(value: Option<&Value>, resource: &str) -> OpcUaResult<Vec<String>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(
                ConfigurationError::invalid_command(resource, "inputMap must be a list").into(),
            )
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(ConfigurationError::invalid_command(
                resource,
                "inputMap entries must be scalars",
            )
            .into()),
        })
        .collect()
}

// =============================================================================
// CommandValue
// =============================================================================

/// A typed value exchanged with the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CommandValue {
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    String(String),
    /// 8-bit unsigned integer.
    Uint8(u8),
    /// 16-bit unsigned integer.
    Uint16(u16),
    /// 32-bit unsigned integer.
    Uint32(u32),
    /// 64-bit unsigned integer.
    Uint64(u64),
    /// 8-bit signed integer.
    Int8(i8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
}

impl CommandValue {
    /// Returns the value type of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::String(_) => ValueType::String,
            Self::Uint8(_) => ValueType::Uint8,
            Self::Uint16(_) => ValueType::Uint16,
            Self::Uint32(_) => ValueType::Uint32,
            Self::Uint64(_) => ValueType::Uint64,
            Self::Int8(_) => ValueType::Int8,
            Self::Int16(_) => ValueType::Int16,
            Self::Int32(_) => ValueType::Int32,
            Self::Int64(_) => ValueType::Int64,
            Self::Float32(_) => ValueType::Float32,
            Self::Float64(_) => ValueType::Float64,
        }
    }

    /// Parses a textual write parameter into a value of the given type.
    pub fn parse(value_type: ValueType, text: &str) -> Result<Self, ConversionError> {
        let text = text.trim();
        let invalid = |e: &dyn fmt::Display| ConversionError::invalid_value(value_type.name(), e.to_string());
        Ok(match value_type {
            ValueType::Bool => match text.to_lowercase().as_str() {
                "true" | "1" => Self::Bool(true),
                "false" | "0" => Self::Bool(false),
                _ => return Err(invalid(&"expected true or false")),
            },
            ValueType::String => Self::String(text.to_string()),
            ValueType::Uint8 => Self::Uint8(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Uint16 => Self::Uint16(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Uint32 => Self::Uint32(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Uint64 => Self::Uint64(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Int8 => Self::Int8(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Int16 => Self::Int16(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Int32 => Self::Int32(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Int64 => Self::Int64(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Float32 => Self::Float32(text.parse().map_err(|e| invalid(&e))?),
            ValueType::Float64 => Self::Float64(text.parse().map_err(|e| invalid(&e))?),
        })
    }
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::Uint8(v) => write!(f, "{}", v),
            Self::Uint16(v) => write!(f, "{}", v),
            Self::Uint32(v) => write!(f, "{}", v),
            Self::Uint64(v) => write!(f, "{}", v),
            Self::Int8(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Float32(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// Reading
// =============================================================================

/// A value produced for a device resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Device name.
    pub device_name: String,
    /// Resource name.
    pub resource_name: String,
    /// Decoded value.
    pub value: CommandValue,
    /// Creation time in milliseconds since the Unix epoch.
    pub origin: i64,
    /// Free-form tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Reading {
    /// Creates a reading stamped with the current time.
    pub fn new(
        device_name: impl Into<String>,
        resource_name: impl Into<String>,
        value: CommandValue,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            resource_name: resource_name.into(),
            value,
            origin: Utc::now().timestamp_millis(),
            tags: HashMap::new(),
        }
    }

    /// Tags the reading with the server source timestamp, if any.
    pub fn with_source_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        if let Some(ts) = timestamp {
            self.tags
                .insert(SOURCE_TIMESTAMP_TAG.to_string(), ts.to_rfc3339());
        }
        self
    }

    /// Returns the source timestamp tag.
    pub fn source_timestamp(&self) -> Option<&str> {
        self.tags.get(SOURCE_TIMESTAMP_TAG).map(String::as_str)
    }
}

// =============================================================================
// Tests
// =============================================================================
