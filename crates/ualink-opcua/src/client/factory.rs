// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session planning shared by session factories.
//!
//! Opening a session follows a fixed sequence; any failing step aborts:
//!
//! ```text
//! 1. discover the server's endpoints        (no endpoints -> error)
//! 2. build the client options                (SessionPlan::prepare)
//!    - security policy and mode
//!    - trusted remote certificate            (required unless mode is None)
//!    - application certificate + URI        (only when configured)
//!    - user identity token                   (Anonymous or Username)
//!    - session timeout / keep-alive lifetime
//! 3. select the endpoint with an exact policy + mode match
//! 4. connect and activate the session
//! ```
//!
//! Steps 2 and 3 are pure and live here; the network steps belong to the
//! factory implementation.

use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::config::{ConnectionDescriptor, IdentityConfig, DEFAULT_SESSION_TIMEOUT};
use crate::error::{ConfigurationError, ConnectionError, OpcUaResult};
use crate::types::{AuthType, SecurityMode, SecurityPolicy};

// =============================================================================
// SessionPlan
// =============================================================================

/// User identity token presented on activation.
#[derive(Clone, PartialEq, Eq)]
pub enum UserIdentity {
    /// Anonymous token.
    Anonymous,
    /// Username and password token.
    UserName {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl std::fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Application certificate attached to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    /// Certificate file.
    pub cert_file: PathBuf,
    /// Private key file.
    pub key_file: PathBuf,
    /// Application URI matching the certificate.
    pub application_uri: Option<String>,
}

/// Validated client options for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Security policy to select.
    pub security_policy: SecurityPolicy,
    /// Security mode to select.
    pub security_mode: SecurityMode,
    /// DER encoded server certificate to trust.
    pub trusted_server_certificate: Option<Vec<u8>>,
    /// Application certificate, when the identity has one.
    pub client_certificate: Option<ClientCertificate>,
    /// User identity token.
    pub user_identity: UserIdentity,
    /// Session timeout.
    pub session_timeout: Duration,
    /// Subscription keep-alive lifetime.
    pub lifetime: Duration,
    /// Whether the client reconnects on its own.
    pub auto_reconnect: bool,
    /// Delay between reconnect attempts.
    pub reconnect_interval: Duration,
}

impl SessionPlan {
    /// Builds the client options for a descriptor and identity.
    ///
    /// # Errors
    ///
    /// - a secured mode without a remote certificate, or an unparseable one
    /// - an unsupported auth type
    /// - a half-configured identity
    pub fn prepare(
        descriptor: &ConnectionDescriptor,
        identity: &IdentityConfig,
    ) -> OpcUaResult<Self> {
        identity.validate()?;

        let trusted_server_certificate = if descriptor.security_mode.is_none() {
            None
        } else {
            let pem = descriptor.remote_pem_cert.as_deref().ok_or_else(|| {
                ConfigurationError::missing_remote_certificate(descriptor.security_mode)
            })?;
            Some(pem_to_der(pem)?)
        };

        let client_certificate = identity
            .certificate_pair()
            .map(|(cert, key)| ClientCertificate {
                cert_file: cert.to_path_buf(),
                key_file: key.to_path_buf(),
                application_uri: identity.application_uri.clone(),
            });

        let user_identity = match descriptor.auth_type {
            AuthType::Anonymous => UserIdentity::Anonymous,
            AuthType::Username => UserIdentity::UserName {
                username: descriptor.username.clone().unwrap_or_default(),
                password: descriptor.password.clone().unwrap_or_default(),
            },
            other => return Err(ConfigurationError::unsupported_auth_type(other).into()),
        };

        Ok(Self {
            endpoint_url: descriptor.endpoint_url.clone(),
            security_policy: descriptor.security_policy,
            security_mode: descriptor.security_mode,
            trusted_server_certificate,
            client_certificate,
            user_identity,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            lifetime: DEFAULT_SESSION_TIMEOUT,
            auto_reconnect: descriptor.auto_reconnect,
            reconnect_interval: descriptor.reconnect_interval,
        })
    }

    /// Overrides the session timeout and keep-alive lifetime.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self.lifetime = timeout;
        self
    }
}

// =============================================================================
// Subscription timing
// =============================================================================

/// Keep-alive count requested for every subscription.
pub const KEEP_ALIVE_COUNT: u32 = 10;

/// Subscription counters sized so a subscription outlives `lifetime`.
///
/// The server expires a subscription after `lifetime_count` publishing
/// intervals without a publish request, so the count is `lifetime`
/// divided by the interval. It never drops below three keep-alive counts.
pub fn subscription_counts(lifetime: Duration, publishing_interval: Duration) -> (u32, u32) {
    let interval = publishing_interval.as_millis().max(1);
    let cycles = u32::try_from(lifetime.as_millis() / interval).unwrap_or(u32::MAX);
    (cycles.max(3 * KEEP_ALIVE_COUNT), KEEP_ALIVE_COUNT)
}

// =============================================================================
// Endpoint selection
// =============================================================================

/// Security-relevant part of a discovered endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSummary {
    /// Endpoint URL announced by the server.
    pub url: String,
    /// Security policy URI.
    pub security_policy_uri: String,
    /// Security mode.
    pub security_mode: SecurityMode,
}

/// Selects the endpoint whose policy and mode match exactly.
///
/// `index` of the returned pair points into `endpoints`.
pub fn select_endpoint<'a>(
    endpoint_url: &str,
    endpoints: &'a [EndpointSummary],
    policy: SecurityPolicy,
    mode: SecurityMode,
) -> OpcUaResult<(usize, &'a EndpointSummary)> {
    if endpoints.is_empty() {
        return Err(ConnectionError::no_endpoints(endpoint_url).into());
    }
    endpoints
        .iter()
        .enumerate()
        .find(|(_, e)| {
            e.security_mode == mode && SecurityPolicy::from_uri(&e.security_policy_uri) == Some(policy)
        })
        .ok_or_else(|| ConnectionError::no_suitable_endpoint(endpoint_url, policy, mode).into())
}

// =============================================================================
// PEM
// =============================================================================

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Decodes the first certificate of a PEM document into DER.
pub fn pem_to_der(pem: &str) -> OpcUaResult<Vec<u8>> {
    let start = pem
        .find(PEM_BEGIN)
        .ok_or_else(|| ConfigurationError::invalid_certificate("missing PEM BEGIN marker"))?
        + PEM_BEGIN.len();
    let end = pem[start..]
        .find(PEM_END)
        .ok_or_else(|| ConfigurationError::invalid_certificate("missing PEM END marker"))?
        + start;

    let body: String = pem[start..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let der = BASE64
        .decode(body.as_bytes())
        .map_err(|e| ConfigurationError::invalid_certificate(format!("bad base64: {}", e)))?;
    if der.is_empty() {
        return Err(ConfigurationError::invalid_certificate("empty certificate").into());
    }
    Ok(der)
}

// =============================================================================
// Tests
// =============================================================================
