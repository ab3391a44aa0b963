// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol-level value types shared by every component.
//!
//! - **NodeId**: node addresses with `ns=<n>;{i|s|g|b}=<id>` parsing
//! - **SecurityPolicy / SecurityMode**: secure channel parameters
//! - **AuthType**: user identity token kinds
//! - **ValueType**: the strict value types declared by device resources
//! - **StatusCode**: OPC UA result codes
//!
//! # Examples
//!
//! ```
//! use ualink_opcua::types::{NodeId, SecurityPolicy, ValueType};
//!
//! let node: NodeId = "ns=2;s=Boiler.Temperature".parse().unwrap();
//! assert_eq!(node.namespace_index, 2);
//!
//! let policy: SecurityPolicy = "Basic256Sha256".parse().unwrap();
//! assert!(policy.requires_certificates());
//!
//! let value_type: ValueType = "Float32".parse().unwrap();
//! assert!(value_type.is_float());
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// NodeId
// =============================================================================

/// Address of a variable, object or method on a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Returns `true` for the null node (ns=0, i=0).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Formats as `ns=<n>;<kind>=<value>`, omitting the namespace when it is 0.
    ///
    /// ```
    /// use ualink_opcua::types::NodeId;
    ///
    /// assert_eq!(NodeId::numeric(2, 1001).to_opc_string(), "ns=2;i=1001");
    /// assert_eq!(NodeId::string(0, "Root").to_opc_string(), "s=Root");
    /// ```
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=2;i=1001`, `ns=2;s=Name`, `ns=2;g=<uuid>`, `ns=2;b=<base64>`,
    /// or any of those without the `ns=` prefix for namespace 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| {
            OpcUaError::configuration(ConfigurationError::invalid_node_id(s, reason))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("missing identifier after namespace".into()))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| invalid(format!("invalid namespace index '{}'", ns)))?;
                (ns, id)
            }
            None => (0, s),
        };

        let (kind, value) = identifier_part
            .split_once('=')
            .ok_or_else(|| invalid("expected i=, s=, g= or b=".into()))?;

        let identifier = match kind {
            "i" => NodeIdentifier::Numeric(
                value
                    .parse()
                    .map_err(|_| invalid(format!("invalid numeric identifier '{}'", value)))?,
            ),
            "s" if !value.is_empty() => NodeIdentifier::String(value.to_string()),
            "s" => return Err(invalid("empty string identifier".into())),
            "g" => NodeIdentifier::Guid(
                Uuid::parse_str(value).map_err(|e| invalid(format!("invalid GUID: {}", e)))?,
            ),
            "b" => NodeIdentifier::Opaque(
                BASE64
                    .decode(value)
                    .map_err(|e| invalid(format!("invalid base64: {}", e)))?,
            ),
            other => return Err(invalid(format!("unknown identifier type '{}'", other))),
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The four identifier kinds a [`NodeId`] can carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque byte string identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// Message security mode of the secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns `true` for [`SecurityMode::None`].
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the display name used by servers.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "none" => Ok(Self::None),
            "sign" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" => Ok(Self::SignAndEncrypt),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::invalid_security_mode(s),
            )),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// Cryptographic suite of the secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security.
    #[default]
    None,
    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,
    /// Basic256 (deprecated).
    Basic256,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256_Sha256_RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the policy URI advertised in endpoint descriptions.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }

    /// Returns `true` for every policy except [`SecurityPolicy::None`].
    #[inline]
    pub const fn requires_certificates(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Resolves a policy URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let (_, fragment) = uri.rsplit_once('#')?;
        match fragment {
            "None" => Some(Self::None),
            "Basic128Rsa15" => Some(Self::Basic128Rsa15),
            "Basic256" => Some(Self::Basic256),
            "Basic256Sha256" => Some(Self::Basic256Sha256),
            "Aes128_Sha256_RsaOaep" => Some(Self::Aes128Sha256RsaOaep),
            "Aes256_Sha256_RsaPss" => Some(Self::Aes256Sha256RsaPss),
            _ => Option::None,
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(policy) = Self::from_uri(s) {
            return Ok(policy);
        }
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "none" => Ok(Self::None),
            "basic128rsa15" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::invalid_security_policy(s),
            )),
        }
    }
}

// =============================================================================
// AuthType
// =============================================================================

/// User identity token kind presented when activating a session.
///
/// All four OPC UA token kinds parse, but only [`AuthType::Anonymous`] and
/// [`AuthType::Username`] can open a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Anonymous identity.
    #[default]
    Anonymous,
    /// Username and password.
    Username,
    /// X.509 user certificate.
    Certificate,
    /// Token issued by an external authority.
    IssuedToken,
}

impl AuthType {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::Username => "Username",
            Self::Certificate => "Certificate",
            Self::IssuedToken => "IssuedToken",
        }
    }

    /// Returns `true` if sessions can be opened with this token kind.
    #[inline]
    pub const fn is_supported(&self) -> bool {
        matches!(self, Self::Anonymous | Self::Username)
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuthType {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "anonymous" => Ok(Self::Anonymous),
            "username" | "usernamepassword" => Ok(Self::Username),
            "certificate" | "x509" => Ok(Self::Certificate),
            "issuedtoken" => Ok(Self::IssuedToken),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::unsupported_auth_type(s),
            )),
        }
    }
}

// =============================================================================
// ValueType
// =============================================================================

/// Strict value type declared by a device resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
    /// 8-bit unsigned integer.
    Uint8,
    /// 16-bit unsigned integer.
    Uint16,
    /// 32-bit unsigned integer.
    Uint32,
    /// 64-bit unsigned integer.
    Uint64,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
}

impl ValueType {
    /// Every supported value type.
    pub const ALL: [ValueType; 12] = [
        Self::Bool,
        Self::String,
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Uint64,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Float32,
        Self::Float64,
    ];

    /// Returns the canonical name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::String => "String",
            Self::Uint8 => "Uint8",
            Self::Uint16 => "Uint16",
            Self::Uint32 => "Uint32",
            Self::Uint64 => "Uint64",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
        }
    }

    /// Returns `true` for signed integer types.
    #[inline]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Returns `true` for unsigned integer types.
    #[inline]
    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::Uint8 | Self::Uint16 | Self::Uint32 | Self::Uint64)
    }

    /// Returns `true` for floating point types.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .or(match wanted.to_lowercase().as_str() {
                "boolean" => Some(Self::Bool),
                "float" => Some(Self::Float32),
                "double" => Some(Self::Float64),
                _ => None,
            })
            .ok_or_else(|| {
                OpcUaError::configuration(ConfigurationError::invalid_field(
                    "valueType",
                    s,
                    "unsupported value type",
                ))
            })
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA result code.
///
/// The top two bits carry the severity: `00` good, `01` uncertain, `10` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0);
    /// Bad.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// BadServerNotConnected.
    pub const BAD_SERVER_NOT_CONNECTED: StatusCode = StatusCode(0x800D_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// BadNotReadable.
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    /// BadNotWritable.
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    /// BadTypeMismatch.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);
    /// BadMethodInvalid.
    pub const BAD_METHOD_INVALID: StatusCode = StatusCode(0x8075_0000);

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity is good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the severity is bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns `true` for bad codes that describe a transport hiccup rather
    /// than a rejected request.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.0 & 0xFFFF_0000,
            0x8005_0000 | 0x800A_0000 | 0x800D_0000 | 0x8026_0000
        )
    }

    /// Returns the symbolic name for well known codes.
    pub fn name(&self) -> &'static str {
        match self.0 & 0xFFFF_0000 {
            0x0000_0000 => "Good",
            0x8000_0000 => "Bad",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x8005_0000 => "BadCommunicationError",
            0x8006_0000 => "BadEncodingError",
            0x8007_0000 => "BadDecodingError",
            0x800A_0000 => "BadTimeout",
            0x800D_0000 => "BadServerNotConnected",
            0x801F_0000 => "BadUserAccessDenied",
            0x8026_0000 => "BadSessionClosed",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803A_0000 => "BadNotReadable",
            0x803B_0000 => "BadNotWritable",
            0x803C_0000 => "BadOutOfRange",
            0x803D_0000 => "BadNotSupported",
            0x8074_0000 => "BadTypeMismatch",
            0x8075_0000 => "BadMethodInvalid",
            0x8076_0000 => "BadArgumentsMissing",
            0x80AB_0000 => "BadInvalidArgument",
            code if code & 0xC000_0000 == 0x4000_0000 => "Uncertain",
            code if code & 0xC000_0000 == 0 => "Good",
            _ => "Bad",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} ({})", self.0, self.name())
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

/// Serde adapter storing durations as humantime strings (`"500ms"`, `"1h"`).
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
