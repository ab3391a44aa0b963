// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection and service configuration.
//!
//! - [`ConnectionDescriptor`]: per-device connection parameters, parsed from
//!   the device's `opcua` protocol properties. Structural equality is what
//!   the registry uses to detect configuration drift.
//! - [`IdentityConfig`]: the service-wide application certificate shared by
//!   every pool.
//! - [`AdmissionStrategy`]: what a saturated pool does with a new request.
//! - [`DriverConfig`]: service settings, loadable with serde or built with
//!   [`DriverConfig::builder`].
//!
//! # Protocol properties
//!
//! | Key | Default |
//! | --- | --- |
//! | `Endpoint` | required |
//! | `SecurityPolicy` | `None` |
//! | `SecurityMode` | `None` if the policy is `None`, otherwise `Sign` |
//! | `RemotePemCert` | none, required when the mode is not `None` |
//! | `AuthType` | `Anonymous` |
//! | `Username` / `Password` | required / empty for `Username` auth |
//! | `AutoReconnect` | `true` |
//! | `ReconnectInterval` | `5s` |
//! | `MaxPoolSize` | `1` |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::types::{humantime_serde, AuthType, SecurityMode, SecurityPolicy};

/// Name of the protocol section holding OPC UA connection properties.
pub const PROTOCOL_NAME: &str = "opcua";

/// String properties of one protocol section.
pub type ProtocolProperties = HashMap<String, String>;

/// Protocol sections of one device, keyed by protocol name.
pub type DeviceProtocols = HashMap<String, ProtocolProperties>;

/// Property keys of the `opcua` protocol section.
pub mod keys {
    /// Endpoint URL.
    pub const ENDPOINT: &str = "Endpoint";
    /// Security policy name or URI.
    pub const SECURITY_POLICY: &str = "SecurityPolicy";
    /// Security mode name.
    pub const SECURITY_MODE: &str = "SecurityMode";
    /// PEM encoded server certificate.
    pub const REMOTE_PEM_CERT: &str = "RemotePemCert";
    /// Auth type name.
    pub const AUTH_TYPE: &str = "AuthType";
    /// Username for `Username` auth.
    pub const USERNAME: &str = "Username";
    /// Password for `Username` auth.
    pub const PASSWORD: &str = "Password";
    /// Auto reconnect flag.
    pub const AUTO_RECONNECT: &str = "AutoReconnect";
    /// Reconnect interval.
    pub const RECONNECT_INTERVAL: &str = "ReconnectInterval";
    /// Maximum sessions per device pool.
    pub const MAX_POOL_SIZE: &str = "MaxPoolSize";
}

/// Default reconnect interval.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Session timeout and keep-alive lifetime requested for every session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default subscription publishing interval.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(500);

/// Default max-age for value reads.
pub const DEFAULT_READ_MAX_AGE: Duration = Duration::from_millis(2000);

// =============================================================================
// ConnectionDescriptor
// =============================================================================

/// Everything needed to open a session to one device's server.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Endpoint URL, e.g. `opc.tcp://host:4840`.
    pub endpoint_url: String,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// Security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// PEM encoded server certificate trusted for secured modes.
    #[serde(default)]
    pub remote_pem_cert: Option<String>,

    /// User identity token kind.
    #[serde(default)]
    pub auth_type: AuthType,

    /// Username for [`AuthType::Username`].
    #[serde(default)]
    pub username: Option<String>,

    /// Password for [`AuthType::Username`].
    #[serde(default)]
    pub password: Option<String>,

    /// Whether the session reconnects on its own after a connection loss.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Delay between reconnect attempts.
    #[serde(with = "humantime_serde", default = "default_reconnect_interval")]
    pub reconnect_interval: Duration,

    /// Maximum concurrently borrowed sessions for the device.
    #[serde(default = "default_pool_size")]
    pub max_pool_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval() -> Duration {
    DEFAULT_RECONNECT_INTERVAL
}

fn default_pool_size() -> u32 {
    1
}

impl ConnectionDescriptor {
    /// Creates a descriptor with default settings for an endpoint.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            security_policy: SecurityPolicy::None,
            security_mode: SecurityMode::None,
            remote_pem_cert: None,
            auth_type: AuthType::Anonymous,
            username: None,
            password: None,
            auto_reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_pool_size: 1,
        }
    }

    /// Sets the security policy and mode.
    pub fn with_security(
        mut self,
        policy: SecurityPolicy,
        mode: SecurityMode,
        remote_pem_cert: Option<String>,
    ) -> Self {
        self.security_policy = policy;
        self.security_mode = mode;
        self.remote_pem_cert = remote_pem_cert;
        self
    }

    /// Uses username/password authentication.
    pub fn with_username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_type = AuthType::Username;
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the maximum pool size.
    pub fn with_max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Returns the admission limit of the device pool (at least 1).
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.max_pool_size.max(1) as usize
    }

    /// Parses the `opcua` section of a device's protocols.
    pub fn from_protocols(protocols: &DeviceProtocols) -> OpcUaResult<Self> {
        let properties = protocols
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(PROTOCOL_NAME))
            .map(|(_, props)| props)
            .ok_or_else(|| {
                OpcUaError::configuration(ConfigurationError::missing_field(format!(
                    "protocols.{}",
                    PROTOCOL_NAME
                )))
            })?;
        Self::from_properties(properties)
    }

    /// Parses connection properties, applying the documented defaults.
    ///
    /// Keys match case-insensitively; blank values count as absent.
    pub fn from_properties(properties: &ProtocolProperties) -> OpcUaResult<Self> {
        let endpoint_url = property(properties, keys::ENDPOINT)
            .ok_or_else(|| ConfigurationError::missing_field(keys::ENDPOINT))?
            .to_string();

        let security_policy = match property(properties, keys::SECURITY_POLICY) {
            Some(v) => v.parse()?,
            None => SecurityPolicy::None,
        };

        let security_mode = match property(properties, keys::SECURITY_MODE) {
            Some(v) => v.parse()?,
            None if security_policy == SecurityPolicy::None => SecurityMode::None,
            None => SecurityMode::Sign,
        };

        let auth_type = match property(properties, keys::AUTH_TYPE) {
            Some(v) => v.parse()?,
            None => AuthType::Anonymous,
        };

        let (username, password) = match auth_type {
            AuthType::Username => {
                let username = property(properties, keys::USERNAME)
                    .ok_or_else(|| ConfigurationError::missing_field(keys::USERNAME))?;
                let password = property(properties, keys::PASSWORD).unwrap_or_default();
                (Some(username.to_string()), Some(password.to_string()))
            }
            AuthType::Anonymous => (None, None),
            other => {
                return Err(OpcUaError::configuration(
                    ConfigurationError::unsupported_auth_type(other),
                ))
            }
        };

        let auto_reconnect = match property(properties, keys::AUTO_RECONNECT) {
            Some(v) => parse_bool(v).ok_or_else(|| {
                ConfigurationError::invalid_field(keys::AUTO_RECONNECT, v, "expected a boolean")
            })?,
            None => true,
        };

        let reconnect_interval = match property(properties, keys::RECONNECT_INTERVAL) {
            Some(v) => parse_interval(v).ok_or_else(|| {
                ConfigurationError::invalid_field(
                    keys::RECONNECT_INTERVAL,
                    v,
                    "expected a duration such as '5s' or a number of seconds",
                )
            })?,
            None => DEFAULT_RECONNECT_INTERVAL,
        };

        let max_pool_size = match property(properties, keys::MAX_POOL_SIZE) {
            Some(v) => v.parse::<u32>().map_err(|_| {
                ConfigurationError::invalid_field(keys::MAX_POOL_SIZE, v, "expected an integer")
            })?,
            None => 1,
        }
        .max(1);

        Ok(Self {
            endpoint_url,
            security_policy,
            security_mode,
            remote_pem_cert: property(properties, keys::REMOTE_PEM_CERT).map(str::to_string),
            auth_type,
            username,
            password,
            auto_reconnect,
            reconnect_interval,
            max_pool_size,
        })
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("endpoint_url", &self.endpoint_url)
            .field("security_policy", &self.security_policy)
            .field("security_mode", &self.security_mode)
            .field("remote_pem_cert", &self.remote_pem_cert.as_ref().map(|_| "<pem>"))
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auto_reconnect", &self.auto_reconnect)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("max_pool_size", &self.max_pool_size)
            .finish()
    }
}

fn property<'a>(properties: &'a ProtocolProperties, key: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_interval(value: &str) -> Option<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .ok()
        .or_else(|| humantime::parse_duration(value).ok())
}

// =============================================================================
// IdentityConfig
// =============================================================================

/// Application instance certificate shared by every session of the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Application certificate (DER or PEM).
    pub cert_file: Option<PathBuf>,

    /// Private key of the application certificate.
    pub key_file: Option<PathBuf>,

    /// Application URI. When set it must match the URI in the certificate's
    /// subject alternative name.
    pub application_uri: Option<String>,

    /// PKI directory where trusted server certificates are installed.
    pub pki_dir: Option<PathBuf>,
}

impl IdentityConfig {
    /// Creates an identity with a certificate and key.
    pub fn with_certificate(cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        Self {
            cert_file: Some(cert_file.into()),
            key_file: Some(key_file.into()),
            ..Self::default()
        }
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = Some(uri.into());
        self
    }

    /// Returns the certificate and key pair when both are configured.
    pub fn certificate_pair(&self) -> Option<(&Path, &Path)> {
        match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    /// Returns the PKI directory, defaulting to `./pki`.
    pub fn pki_dir(&self) -> PathBuf {
        self.pki_dir.clone().unwrap_or_else(|| PathBuf::from("pki"))
    }

    /// Checks that the certificate and key are configured together.
    pub fn validate(&self) -> OpcUaResult<()> {
        match (&self.cert_file, &self.key_file) {
            (Some(_), None) => Err(ConfigurationError::missing_field("key_file").into()),
            (None, Some(_)) => Err(ConfigurationError::missing_field("cert_file").into()),
            _ => Ok(()),
        }
    }

    /// Checks that the configured files exist.
    pub fn check_files(&self) -> OpcUaResult<()> {
        self.validate()?;
        if let Some((cert, key)) = self.certificate_pair() {
            if !cert.is_file() {
                return Err(
                    ConfigurationError::certificate_not_found(cert.display().to_string()).into(),
                );
            }
            if !key.is_file() {
                return Err(
                    ConfigurationError::private_key_not_found(key.display().to_string()).into(),
                );
            }
        }
        Ok(())
    }
}

// =============================================================================
// AdmissionStrategy
// =============================================================================

/// Behavior of [`get_connection`](crate::client::NamedPoolRegistry::get_connection)
/// when the device pool is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStrategy {
    /// Block until a session is returned.
    #[default]
    Wait,
    /// Fail immediately.
    Reject,
    /// Open an unmanaged session outside the pool.
    Create,
}

impl AdmissionStrategy {
    /// Returns the configuration name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Reject => "reject",
            Self::Create => "create",
        }
    }
}

impl fmt::Display for AdmissionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionStrategy {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wait" | "" => Ok(Self::Wait),
            "reject" => Ok(Self::Reject),
            "create" => Ok(Self::Create),
            _ => Err(ConfigurationError::invalid_field(
                "admission",
                s,
                "expected one of wait, reject, create",
            )
            .into()),
        }
    }
}

// =============================================================================
// DriverConfig
// =============================================================================

/// Service-wide driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Application identity shared by all sessions.
    pub identity: IdentityConfig,

    /// Saturation behavior of device pools.
    pub admission: AdmissionStrategy,

    /// Publishing interval of device subscriptions.
    #[serde(with = "humantime_serde")]
    pub publish_interval: Duration,

    /// Max-age passed with value reads.
    #[serde(with = "humantime_serde")]
    pub read_max_age: Duration,

    /// Session timeout and keep-alive lifetime.
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Capacity of each device's notification queue.
    pub notification_buffer: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            admission: AdmissionStrategy::Wait,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            read_max_age: DEFAULT_READ_MAX_AGE,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            notification_buffer: 256,
        }
    }
}

impl DriverConfig {
    /// Creates a builder.
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> OpcUaResult<()> {
        self.identity.validate()?;
        if self.publish_interval.is_zero() {
            return Err(ConfigurationError::invalid_field(
                "publish_interval",
                "0s",
                "must be greater than zero",
            )
            .into());
        }
        if self.session_timeout.is_zero() {
            return Err(ConfigurationError::invalid_field(
                "session_timeout",
                "0s",
                "must be greater than zero",
            )
            .into());
        }
        if self.notification_buffer == 0 {
            return Err(ConfigurationError::invalid_field(
                "notification_buffer",
                "0",
                "must be greater than zero",
            )
            .into());
        }
        Ok(())
    }
}

/// Builder for [`DriverConfig`].
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Sets the application identity.
    pub fn identity(mut self, identity: IdentityConfig) -> Self {
        self.config.identity = identity;
        self
    }

    /// Sets the admission strategy.
    pub fn admission(mut self, admission: AdmissionStrategy) -> Self {
        self.config.admission = admission;
        self
    }

    /// Sets the subscription publishing interval.
    pub fn publish_interval(mut self, interval: Duration) -> Self {
        self.config.publish_interval = interval;
        self
    }

    /// Sets the read max-age.
    pub fn read_max_age(mut self, max_age: Duration) -> Self {
        self.config.read_max_age = max_age;
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Sets the per-device notification queue capacity.
    pub fn notification_buffer(mut self, capacity: usize) -> Self {
        self.config.notification_buffer = capacity;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> OpcUaResult<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Tests
// =============================================================================
