// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for pooled OPC UA access.
//!
//! Errors are grouped by the stage of the request that produced them so
//! callers can decide what to do without matching on message text:
//!
//! ```text
//! OpcUaError
//! ├── Connection    - endpoint discovery, selection and session handshake
//! ├── Pool          - terminated pools and `reject` saturation
//! ├── Operation     - read / call / write failures and bad status codes
//! ├── Subscription  - subscription and monitored item setup
//! ├── Conversion    - value codec range and type failures
//! └── Configuration - descriptor, identity and command parsing
//! ```
//!
//! # Examples
//!
//! ```
//! use ualink_opcua::error::{OpcUaError, PoolError, ErrorSeverity};
//!
//! let error = OpcUaError::from(PoolError::saturated("boiler-1", "opc.tcp://h:4840"));
//! assert!(error.is_retryable());
//! assert_eq!(error.severity(), ErrorSeverity::Warning);
//! assert_eq!(error.error_code().to_string(), "UA-0202");
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::types::StatusCode;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Endpoint and session establishment errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Connection pool admission errors.
    #[error("{0}")]
    Pool(#[from] PoolError),

    /// Read, method call and write errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription and monitored item errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Value codec errors.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a pool error.
    #[inline]
    pub fn pool(error: PoolError) -> Self {
        Self::Pool(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a conversion error.
    #[inline]
    pub fn conversion(error: ConversionError) -> Self {
        Self::Conversion(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if the same request may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Pool(e) => e.is_retryable(),
            Self::Operation(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Conversion(_) | Self::Configuration(_) => false,
        }
    }

    /// Returns the suggested delay before a retry, if retryable.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }
        match self {
            Self::Connection(_) => Some(Duration::from_secs(5)),
            Self::Pool(_) => Some(Duration::from_millis(100)),
            Self::Operation(_) | Self::Subscription(_) => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// Returns `true` if the session that produced this error must not be reused.
    ///
    /// Protocol-level faults leave the session in an unknown state; the
    /// executors mark the borrowed session invalid when this returns `true`.
    pub fn invalidates_session(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Operation(e) => e.invalidates_session(),
            _ => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Pool(e) => e.severity(),
            Self::Operation(_) => ErrorSeverity::Error,
            Self::Subscription(_) => ErrorSeverity::Error,
            Self::Conversion(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Pool(_) => "pool",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Conversion(_) => "conversion",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns the structured error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Pool(e) => e.error_code(),
            Self::Operation(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Conversion(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns `true` for configuration errors.
    #[inline]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if a pool refused or could no longer serve the request.
    #[inline]
    pub fn is_pool(&self) -> bool {
        matches!(self, Self::Pool(_))
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with a level derived from its severity.
    pub fn log(&self, context: &str) {
        let code = self.error_code();
        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Errors raised while building a session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Querying the server's endpoints failed.
    #[error("Endpoint discovery failed for '{endpoint}': {message}")]
    DiscoveryFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The server advertised no endpoints at all.
    #[error("No endpoints found for '{endpoint}'")]
    NoEndpoints {
        /// Endpoint URL.
        endpoint: String,
    },

    /// No advertised endpoint matches the requested policy and mode.
    #[error(
        "No exact security configuration match for '{endpoint}' (policy: {policy}, mode: {mode})"
    )]
    NoSuitableEndpoint {
        /// Endpoint URL.
        endpoint: String,
        /// Requested security policy.
        policy: String,
        /// Requested security mode.
        mode: String,
    },

    /// Session handshake or activation failed.
    #[error("Session could not be opened on '{endpoint}': {message}")]
    Refused {
        /// Endpoint URL.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The session is no longer connected.
    #[error("Not connected to OPC UA server")]
    NotConnected,
}

impl ConnectionError {
    /// Creates a discovery failure.
    pub fn discovery_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a no-endpoints error.
    pub fn no_endpoints(endpoint: impl Into<String>) -> Self {
        Self::NoEndpoints {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a no-suitable-endpoint error.
    pub fn no_suitable_endpoint(
        endpoint: impl Into<String>,
        policy: impl fmt::Display,
        mode: impl fmt::Display,
    ) -> Self {
        Self::NoSuitableEndpoint {
            endpoint: endpoint.into(),
            policy: policy.to_string(),
            mode: mode.to_string(),
        }
    }

    /// Creates a refused error.
    pub fn refused(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// A missing policy/mode match will not fix itself without a
    /// configuration change.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoSuitableEndpoint { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoSuitableEndpoint { .. } => ErrorSeverity::Critical,
            Self::NotConnected => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DiscoveryFailed { .. } => ErrorCode::new(1, 1),
            Self::NoEndpoints { .. } => ErrorCode::new(1, 2),
            Self::NoSuitableEndpoint { .. } => ErrorCode::new(1, 3),
            Self::Refused { .. } => ErrorCode::new(1, 4),
            Self::NotConnected => ErrorCode::new(1, 5),
        }
    }
}

// =============================================================================
// PoolError
// =============================================================================

/// Connection pool admission errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was terminated; it must be discarded and rebuilt.
    #[error("Connection pool for device '{device}' is terminated")]
    Terminated {
        /// Device name.
        device: String,
    },

    /// The pool is at capacity and the admission strategy is `reject`.
    #[error("No available ua client connection in the pool for '{endpoint}' (device '{device}')")]
    Saturated {
        /// Device name.
        device: String,
        /// Endpoint URL.
        endpoint: String,
    },
}

impl PoolError {
    /// Creates a terminated error.
    pub fn terminated(device: impl Into<String>) -> Self {
        Self::Terminated {
            device: device.into(),
        }
    }

    /// Creates a saturated error.
    pub fn saturated(device: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::Saturated {
            device: device.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Both pool conditions are transient from the caller's view.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Terminated { .. } => ErrorSeverity::Info,
            Self::Saturated { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Terminated { .. } => ErrorCode::new(2, 1),
            Self::Saturated { .. } => ErrorCode::new(2, 2),
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Read, method call and write errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The read service call failed.
    #[error("Read failed for node '{node_id}': {message}")]
    ReadFailed {
        /// Node ID.
        node_id: String,
        /// Error message.
        message: String,
    },

    /// The write service call failed.
    #[error("Write failed for node '{node_id}': {message}")]
    WriteFailed {
        /// Node ID.
        node_id: String,
        /// Error message.
        message: String,
    },

    /// The method call service failed.
    #[error("Method call '{method_id}' on '{object_id}' failed: {message}")]
    CallFailed {
        /// Object node ID.
        object_id: String,
        /// Method node ID.
        method_id: String,
        /// Error message.
        message: String,
    },

    /// The server answered with a non-good status code.
    #[error("Bad status code {status_code} for node '{node_id}'")]
    BadStatus {
        /// Node ID.
        node_id: String,
        /// Status code.
        status_code: StatusCode,
    },

    /// A method call returned no output arguments.
    #[error("Method '{method_id}' returned no output arguments")]
    MissingOutput {
        /// Method node ID.
        method_id: String,
    },

    /// Writes are only accepted on plain nodes.
    #[error("Resource '{resource}' describes a method call and cannot be written")]
    MethodNotWritable {
        /// Resource name.
        resource: String,
    },

    /// Requests and values do not pair up.
    #[error("Write request count {requests} does not match value count {values}")]
    ArgumentMismatch {
        /// Number of requests.
        requests: usize,
        /// Number of values.
        values: usize,
    },
}

impl OperationError {
    /// Creates a read failed error.
    pub fn read_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates a write failed error.
    pub fn write_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates a method call failed error.
    pub fn call_failed(
        object_id: impl Into<String>,
        method_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CallFailed {
            object_id: object_id.into(),
            method_id: method_id.into(),
            message: message.into(),
        }
    }

    /// Creates a bad status error.
    pub fn bad_status(node_id: impl Into<String>, status_code: StatusCode) -> Self {
        Self::BadStatus {
            node_id: node_id.into(),
            status_code,
        }
    }

    /// Creates a missing output error.
    pub fn missing_output(method_id: impl Into<String>) -> Self {
        Self::MissingOutput {
            method_id: method_id.into(),
        }
    }

    /// Creates a method-not-writable error.
    pub fn method_not_writable(resource: impl Into<String>) -> Self {
        Self::MethodNotWritable {
            resource: resource.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ReadFailed { .. } | Self::WriteFailed { .. } | Self::CallFailed { .. } => true,
            Self::BadStatus { status_code, .. } => status_code.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if the session that served the request must be discarded.
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            Self::ReadFailed { .. }
                | Self::WriteFailed { .. }
                | Self::CallFailed { .. }
                | Self::BadStatus { .. }
        )
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ReadFailed { .. } => ErrorCode::new(3, 1),
            Self::WriteFailed { .. } => ErrorCode::new(3, 2),
            Self::CallFailed { .. } => ErrorCode::new(3, 3),
            Self::BadStatus { .. } => ErrorCode::new(3, 4),
            Self::MissingOutput { .. } => ErrorCode::new(3, 5),
            Self::MethodNotWritable { .. } => ErrorCode::new(3, 6),
            Self::ArgumentMismatch { .. } => ErrorCode::new(3, 7),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription setup errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Creating the subscription failed.
    #[error("Subscription creation failed for device '{device}': {message}")]
    CreationFailed {
        /// Device name.
        device: String,
        /// Error message.
        message: String,
    },

    /// Registering a monitored item failed.
    #[error("Monitored item for node '{node_id}' failed: {message}")]
    MonitoredItemFailed {
        /// Node ID.
        node_id: String,
        /// Error message.
        message: String,
    },
}

impl SubscriptionError {
    /// Creates a creation failed error.
    pub fn creation_failed(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CreationFailed {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Creates a monitored item failed error.
    pub fn monitored_item_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MonitoredItemFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(4, 1),
            Self::MonitoredItemFailed { .. } => ErrorCode::new(4, 2),
        }
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Value codec errors.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The value does not fit the declared type.
    #[error("Value {value} out of range [{min}, {max}]")]
    ValueOutOfRange {
        /// The offending value.
        value: String,
        /// Minimum allowed value.
        min: String,
        /// Maximum allowed value.
        max: String,
    },

    /// The value is NaN or infinite where a finite number is required.
    #[error("Value {value} is not finite for {target_type}")]
    NotFinite {
        /// The offending value.
        value: String,
        /// Target type.
        target_type: String,
    },

    /// The value has the wrong shape for the declared type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// The value could not be parsed into the declared type.
    #[error("Invalid value for type '{target_type}': {message}")]
    InvalidValue {
        /// Target type.
        target_type: String,
        /// Error message.
        message: String,
    },

    /// Decoding a reading for a resource failed.
    #[error("Failed to decode reading of '{resource}' as {value_type}: {source}")]
    DecodeFailed {
        /// Resource name.
        resource: String,
        /// Declared value type.
        value_type: String,
        /// Underlying conversion failure.
        #[source]
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    /// Creates a value out of range error.
    pub fn value_out_of_range<T: fmt::Display>(value: T, min: T, max: T) -> Self {
        Self::ValueOutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Creates a not-finite error.
    pub fn not_finite(value: f64, target_type: impl Into<String>) -> Self {
        Self::NotFinite {
            value: value.to_string(),
            target_type: target_type.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(target_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            target_type: target_type.into(),
            message: message.into(),
        }
    }

    /// Wraps this error with the resource it was decoded for.
    pub fn for_resource(self, resource: impl Into<String>, value_type: impl fmt::Display) -> Self {
        Self::DecodeFailed {
            resource: resource.into(),
            value_type: value_type.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ValueOutOfRange { .. } => ErrorCode::new(5, 1),
            Self::NotFinite { .. } => ErrorCode::new(5, 2),
            Self::TypeMismatch { .. } => ErrorCode::new(5, 3),
            Self::InvalidValue { .. } => ErrorCode::new(5, 4),
            Self::DecodeFailed { source, .. } => source.error_code(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration and parsing errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required field is absent.
    #[error("Missing required configuration: {field}")]
    MissingField {
        /// The missing field.
        field: String,
    },

    /// A field is present but cannot be parsed.
    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// The rejected value.
        value: String,
        /// Reason.
        reason: String,
    },

    /// A node id string is malformed.
    #[error("Invalid node ID format: {node_id} ({reason})")]
    InvalidNodeId {
        /// The invalid node ID.
        node_id: String,
        /// Reason.
        reason: String,
    },

    /// Unknown security policy name.
    #[error("Unsupported security policy: {policy}")]
    InvalidSecurityPolicy {
        /// Policy name.
        policy: String,
    },

    /// Unknown security mode name.
    #[error("Unsupported security mode: {mode}")]
    InvalidSecurityMode {
        /// Mode name.
        mode: String,
    },

    /// The auth kind is known but not supported for sessions.
    #[error("Auth type {auth_type} not supported yet")]
    UnsupportedAuthType {
        /// Auth type name.
        auth_type: String,
    },

    /// A secured mode was requested without a server certificate.
    #[error("Remote certificate is required for security mode {mode}")]
    MissingRemoteCertificate {
        /// Security mode.
        mode: String,
    },

    /// A PEM certificate could not be decoded.
    #[error("Invalid certificate: {reason}")]
    InvalidCertificate {
        /// Reason.
        reason: String,
    },

    /// Certificate file does not exist.
    #[error("Certificate file not found: {path}")]
    CertificateNotFound {
        /// File path.
        path: String,
    },

    /// Private key file does not exist.
    #[error("Private key file not found: {path}")]
    PrivateKeyNotFound {
        /// File path.
        path: String,
    },

    /// A device resource does not describe a valid command.
    #[error("Invalid command '{resource}': {reason}")]
    InvalidCommand {
        /// Resource name.
        resource: String,
        /// Reason.
        reason: String,
    },

    /// The device registry does not know the device.
    #[error("Unknown device: {device}")]
    UnknownDevice {
        /// Device name.
        device: String,
    },

    /// Generic invalid configuration.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Error message.
        message: String,
    },
}

impl ConfigurationError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid node ID error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid security policy error.
    pub fn invalid_security_policy(policy: impl Into<String>) -> Self {
        Self::InvalidSecurityPolicy {
            policy: policy.into(),
        }
    }

    /// Creates an invalid security mode error.
    pub fn invalid_security_mode(mode: impl Into<String>) -> Self {
        Self::InvalidSecurityMode { mode: mode.into() }
    }

    /// Creates an unsupported auth type error.
    pub fn unsupported_auth_type(auth_type: impl fmt::Display) -> Self {
        Self::UnsupportedAuthType {
            auth_type: auth_type.to_string(),
        }
    }

    /// Creates a missing remote certificate error.
    pub fn missing_remote_certificate(mode: impl fmt::Display) -> Self {
        Self::MissingRemoteCertificate {
            mode: mode.to_string(),
        }
    }

    /// Creates an invalid certificate error.
    pub fn invalid_certificate(reason: impl Into<String>) -> Self {
        Self::InvalidCertificate {
            reason: reason.into(),
        }
    }

    /// Creates a certificate not found error.
    pub fn certificate_not_found(path: impl Into<String>) -> Self {
        Self::CertificateNotFound { path: path.into() }
    }

    /// Creates a private key not found error.
    pub fn private_key_not_found(path: impl Into<String>) -> Self {
        Self::PrivateKeyNotFound { path: path.into() }
    }

    /// Creates an invalid command error.
    pub fn invalid_command(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown device error.
    pub fn unknown_device(device: impl Into<String>) -> Self {
        Self::UnknownDevice {
            device: device.into(),
        }
    }

    /// Creates a generic invalid configuration error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingField { .. } => ErrorCode::new(6, 1),
            Self::InvalidField { .. } => ErrorCode::new(6, 2),
            Self::InvalidNodeId { .. } => ErrorCode::new(6, 3),
            Self::InvalidSecurityPolicy { .. } => ErrorCode::new(6, 4),
            Self::InvalidSecurityMode { .. } => ErrorCode::new(6, 5),
            Self::UnsupportedAuthType { .. } => ErrorCode::new(6, 6),
            Self::MissingRemoteCertificate { .. } => ErrorCode::new(6, 7),
            Self::InvalidCertificate { .. } => ErrorCode::new(6, 8),
            Self::CertificateNotFound { .. } => ErrorCode::new(6, 9),
            Self::PrivateKeyNotFound { .. } => ErrorCode::new(6, 10),
            Self::InvalidCommand { .. } => ErrorCode::new(6, 11),
            Self::UnknownDevice { .. } => ErrorCode::new(6, 12),
            Self::Invalid { .. } => ErrorCode::new(6, 13),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - the affected device cannot be served until reconfigured.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `UA-XXYY` where XX is category and YY is the specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Pool
/// - 3: Operation
/// - 4: Subscription
/// - 5: Conversion
/// - 6: Configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// Tests
// =============================================================================
