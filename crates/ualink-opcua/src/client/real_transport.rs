// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session factory backed by the `opcua` crate client.
//!
//! The `opcua` client API is blocking, so every service call runs on the
//! blocking thread pool.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ualink_opcua::client::OpcUaSessionFactory;
//!
//! let factory = Arc::new(OpcUaSessionFactory::new("ualink"));
//! let driver = OpcUaDriver::new(config, factory, devices, sink)?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use opcua::client::prelude::{
    AttributeService, CallMethodRequest, Client, ClientBuilder, DataChangeCallback,
    EndpointDescription, ExtensionObject, IdentityToken, MessageSecurityMode, MethodService,
    MonitoredItemCreateRequest, MonitoredItemService, MonitoringMode, MonitoringParameters,
    ReadValueId, Session, SessionCommand, SubscriptionService, TimestampsToReturn, WriteValue,
};
use opcua::sync::RwLock as OpcUaRwLock;
use opcua::types::{AttributeId, QualifiedName, UAString, Variant};

use crate::config::{ConnectionDescriptor, IdentityConfig};
use crate::error::{ConnectionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError};
use crate::types::{NodeId, NodeIdentifier, SecurityMode, StatusCode};

use super::factory::{
    select_endpoint, subscription_counts, EndpointSummary, SessionPlan, UserIdentity,
};
use super::transport::{
    DataValue, ItemNotification, MethodCallResult, MonitoredItemRequest, OpcUaValue,
    SessionFactory, UaSession,
};

// =============================================================================
// OpcUaSessionFactory
// =============================================================================

/// Opens sessions with the `opcua` client.
#[derive(Debug, Clone)]
pub struct OpcUaSessionFactory {
    application_name: String,
    session_timeout: Duration,
}

impl OpcUaSessionFactory {
    /// Creates a factory announcing the given application name.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            session_timeout: crate::config::DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Overrides the session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    fn build_client(&self, plan: &SessionPlan, identity: &IdentityConfig) -> OpcUaResult<Client> {
        let pki_dir = identity.pki_dir();
        let application_uri = plan
            .client_certificate
            .as_ref()
            .and_then(|c| c.application_uri.clone())
            .unwrap_or_else(|| format!("urn:{}", self.application_name));

        let mut builder = ClientBuilder::new()
            .application_name(&self.application_name)
            .application_uri(&application_uri)
            .pki_dir(&pki_dir)
            .create_sample_keypair(plan.client_certificate.is_none())
            .trust_server_certs(false)
            .session_timeout(plan.session_timeout.as_millis() as u32)
            .session_retry_interval(plan.reconnect_interval.as_millis() as u32)
            .session_retry_limit(if plan.auto_reconnect { -1 } else { 0 });

        if let Some(cert) = &plan.client_certificate {
            builder = builder
                .certificate_path(&cert.cert_file)
                .private_key_path(&cert.key_file);
        }

        if let Some(der) = &plan.trusted_server_certificate {
            install_trusted_certificate(&pki_dir, &plan.endpoint_url, der)?;
        }

        builder.client().ok_or_else(|| {
            ConnectionError::refused(&plan.endpoint_url, "invalid client configuration").into()
        })
    }
}

#[async_trait]
impl SessionFactory for OpcUaSessionFactory {
    async fn create_session(
        &self,
        descriptor: &ConnectionDescriptor,
        identity: &IdentityConfig,
    ) -> OpcUaResult<Box<dyn UaSession>> {
        let plan = SessionPlan::prepare(descriptor, identity)?
            .with_session_timeout(self.session_timeout);
        let mut client = self.build_client(&plan, identity)?;
        let endpoint_url = plan.endpoint_url.clone();
        let lifetime = plan.lifetime;

        let (client, session) = tokio::task::spawn_blocking(move || {
            let endpoints = client
                .get_server_endpoints_from_url(plan.endpoint_url.as_str())
                .map_err(|status| {
                    ConnectionError::discovery_failed(&plan.endpoint_url, status.to_string())
                })?;

            let summaries: Vec<EndpointSummary> = endpoints.iter().map(summarize).collect();
            let (index, _) = select_endpoint(
                &plan.endpoint_url,
                &summaries,
                plan.security_policy,
                plan.security_mode,
            )?;
            let endpoint: EndpointDescription = endpoints[index].clone();

            let token = match &plan.user_identity {
                UserIdentity::Anonymous => IdentityToken::Anonymous,
                UserIdentity::UserName { username, password } => {
                    IdentityToken::UserName(username.clone(), password.clone())
                }
            };

            let session = client.connect_to_endpoint(endpoint, token).map_err(|status| {
                OpcUaError::from(ConnectionError::refused(&plan.endpoint_url, status.to_string()))
            })?;
            Ok::<_, OpcUaError>((client, session))
        })
        .await
        .map_err(|e| ConnectionError::refused(&endpoint_url, e.to_string()))??;

        let stop = Session::run_async(session.clone());
        info!(endpoint = %endpoint_url, "Opened OPC UA session");

        Ok(Box::new(OpcUaSession {
            endpoint: endpoint_url,
            lifetime,
            _client: client,
            session,
            stop: Mutex::new(Some(stop)),
        }))
    }
}

fn summarize(endpoint: &EndpointDescription) -> EndpointSummary {
    EndpointSummary {
        url: endpoint.endpoint_url.to_string(),
        security_policy_uri: endpoint.security_policy_uri.to_string(),
        security_mode: match endpoint.security_mode {
            MessageSecurityMode::Sign => SecurityMode::Sign,
            MessageSecurityMode::SignAndEncrypt => SecurityMode::SignAndEncrypt,
            _ => SecurityMode::None,
        },
    }
}

fn install_trusted_certificate(pki_dir: &Path, endpoint: &str, der: &[u8]) -> OpcUaResult<()> {
    let trusted = pki_dir.join("trusted");
    let name: String = endpoint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let path = trusted.join(format!("{}.der", name));

    std::fs::create_dir_all(&trusted)
        .and_then(|_| std::fs::write(&path, der))
        .map_err(|e| {
            crate::error::ConfigurationError::invalid_certificate(format!(
                "cannot install remote certificate at {}: {}",
                path.display(),
                e
            ))
        })?;
    debug!(path = %path.display(), "Installed trusted server certificate");
    Ok(())
}

// =============================================================================
// OpcUaSession
// =============================================================================

struct OpcUaSession {
    endpoint: String,
    lifetime: Duration,
    _client: Client,
    session: Arc<OpcUaRwLock<Session>>,
    stop: Mutex<Option<tokio::sync::oneshot::Sender<SessionCommand>>>,
}

impl OpcUaSession {
    async fn blocking<T, F>(&self, call: F) -> OpcUaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> OpcUaResult<T> + Send + 'static,
    {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let guard = session.read();
            call(&guard)
        })
        .await
        .map_err(|e| ConnectionError::refused(&self.endpoint, e.to_string()))?
    }
}

#[async_trait]
impl UaSession for OpcUaSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.stop.lock().is_some() && self.session.read().is_connected()
    }

    async fn read(&self, node_id: &NodeId, max_age: Duration) -> OpcUaResult<DataValue> {
        let node = node_id.clone();
        let request = ReadValueId {
            node_id: to_opcua_node_id(node_id),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            data_encoding: QualifiedName::null(),
        };
        self.blocking(move |session| {
            let mut results = session
                .read(&[request], TimestampsToReturn::Both, max_age.as_millis() as f64)
                .map_err(|status| OperationError::read_failed(node.to_string(), status.to_string()))?;
            if results.is_empty() {
                return Err(OperationError::read_failed(node.to_string(), "empty response").into());
            }
            Ok(from_opcua_data_value(&results.remove(0)))
        })
        .await
    }

    async fn call_method(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        inputs: Vec<OpcUaValue>,
    ) -> OpcUaResult<MethodCallResult> {
        let (object, method) = (object_id.to_string(), method_id.to_string());
        let request = CallMethodRequest {
            object_id: to_opcua_node_id(object_id),
            method_id: to_opcua_node_id(method_id),
            input_arguments: Some(inputs.iter().map(to_opcua_variant).collect()),
        };
        self.blocking(move |session| {
            let result = session
                .call(request)
                .map_err(|status| OperationError::call_failed(&object, &method, status.to_string()))?;
            Ok(MethodCallResult {
                status: StatusCode(result.status_code.bits()),
                outputs: result
                    .output_arguments
                    .unwrap_or_default()
                    .iter()
                    .map(from_opcua_variant)
                    .collect(),
                source_timestamp: Some(chrono::Utc::now()),
            })
        })
        .await
    }

    async fn write(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<StatusCode> {
        let node = node_id.to_string();
        let request = WriteValue {
            node_id: to_opcua_node_id(node_id),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            value: opcua::types::DataValue::new_now(to_opcua_variant(&value)),
        };
        self.blocking(move |session| {
            let results = session
                .write(&[request])
                .map_err(|status| OperationError::write_failed(&node, status.to_string()))?;
            results
                .first()
                .map(|status| StatusCode(status.bits()))
                .ok_or_else(|| OperationError::write_failed(&node, "empty response").into())
        })
        .await
    }

    async fn create_subscription(
        &self,
        publishing_interval: Duration,
        notifications: mpsc::Sender<ItemNotification>,
    ) -> OpcUaResult<u32> {
        let endpoint = self.endpoint.clone();
        let (lifetime_count, keep_alive_count) =
            subscription_counts(self.lifetime, publishing_interval);
        self.blocking(move |session| {
            let callback = DataChangeCallback::new(move |items| {
                for item in items {
                    let notification = ItemNotification {
                        client_handle: item.client_handle(),
                        value: from_opcua_data_value(item.last_value()),
                    };
                    if notifications.try_send(notification).is_err() {
                        warn!(
                            handle = item.client_handle(),
                            "Notification queue full or closed, dropping data change"
                        );
                    }
                }
            });
            session
                .create_subscription(
                    publishing_interval.as_millis() as f64,
                    lifetime_count,
                    keep_alive_count,
                    0,
                    0,
                    true,
                    callback,
                )
                .map_err(|status| {
                    SubscriptionError::creation_failed(&endpoint, status.to_string()).into()
                })
        })
        .await
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<StatusCode>> {
        let requests: Vec<MonitoredItemCreateRequest> =
            items.iter().map(monitored_item_request).collect();
        self.blocking(move |session| {
            let results = session
                .create_monitored_items(subscription_id, TimestampsToReturn::Both, &requests)
                .map_err(|status| {
                    SubscriptionError::monitored_item_failed("batch", status.to_string())
                })?;
            Ok(results
                .iter()
                .map(|r| StatusCode(r.status_code.bits()))
                .collect())
        })
        .await
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        let endpoint = self.endpoint.clone();
        self.blocking(move |session| {
            session
                .delete_subscription(subscription_id)
                .map(|_| ())
                .map_err(|status| {
                    SubscriptionError::creation_failed(&endpoint, status.to_string()).into()
                })
        })
        .await
    }

    async fn close(&self) {
        let Some(stop) = self.stop.lock().take() else {
            return;
        };
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || session.read().disconnect()).await;
        let _ = stop.send(SessionCommand::Stop);
        debug!(endpoint = %self.endpoint, "Closed OPC UA session");
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(ns, v.clone()),
        NodeIdentifier::Guid(v) => opcua::types::NodeId::new(ns, opcua::types::Guid::from(*v)),
        NodeIdentifier::Opaque(v) => {
            opcua::types::NodeId::new(ns, opcua::types::ByteString::from(v.as_slice()))
        }
    }
}

fn monitored_item_request(item: &MonitoredItemRequest) -> MonitoredItemCreateRequest {
    MonitoredItemCreateRequest {
        item_to_monitor: ReadValueId {
            node_id: to_opcua_node_id(&item.node_id),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            data_encoding: QualifiedName::null(),
        },
        monitoring_mode: MonitoringMode::Reporting,
        requested_parameters: MonitoringParameters {
            sampling_interval: -1.0,
            filter: ExtensionObject::null(),
            queue_size: 1,
            discard_oldest: true,
            client_handle: item.client_handle,
        },
    }
}

fn from_opcua_data_value(value: &opcua::types::DataValue) -> DataValue {
    DataValue {
        value: value
            .value
            .as_ref()
            .map(from_opcua_variant)
            .unwrap_or_default(),
        status: value
            .status
            .map(|s| StatusCode(s.bits()))
            .unwrap_or(StatusCode::GOOD),
        source_timestamp: value.source_timestamp.map(|ts| ts.as_chrono()),
        server_timestamp: value.server_timestamp.map(|ts| ts.as_chrono()),
    }
}

fn from_opcua_variant(variant: &Variant) -> OpcUaValue {
    match variant {
        Variant::Empty => OpcUaValue::Null,
        Variant::Boolean(v) => OpcUaValue::Boolean(*v),
        Variant::SByte(v) => OpcUaValue::SByte(*v),
        Variant::Byte(v) => OpcUaValue::Byte(*v),
        Variant::Int16(v) => OpcUaValue::Int16(*v),
        Variant::UInt16(v) => OpcUaValue::UInt16(*v),
        Variant::Int32(v) => OpcUaValue::Int32(*v),
        Variant::UInt32(v) => OpcUaValue::UInt32(*v),
        Variant::Int64(v) => OpcUaValue::Int64(*v),
        Variant::UInt64(v) => OpcUaValue::UInt64(*v),
        Variant::Float(v) => OpcUaValue::Float(*v),
        Variant::Double(v) => OpcUaValue::Double(*v),
        Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
        Variant::DateTime(v) => OpcUaValue::DateTime(v.as_chrono()),
        Variant::Guid(v) => OpcUaValue::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        Variant::ByteString(v) => OpcUaValue::ByteString(v.value.clone().unwrap_or_default()),
        Variant::Array(arr) => OpcUaValue::Array(arr.values.iter().map(from_opcua_variant).collect()),
        other => OpcUaValue::String(format!("{:?}", other)),
    }
}

fn to_opcua_variant(value: &OpcUaValue) -> Variant {
    match value {
        OpcUaValue::Null => Variant::Empty,
        OpcUaValue::Boolean(v) => Variant::Boolean(*v),
        OpcUaValue::SByte(v) => Variant::SByte(*v),
        OpcUaValue::Byte(v) => Variant::Byte(*v),
        OpcUaValue::Int16(v) => Variant::Int16(*v),
        OpcUaValue::UInt16(v) => Variant::UInt16(*v),
        OpcUaValue::Int32(v) => Variant::Int32(*v),
        OpcUaValue::UInt32(v) => Variant::UInt32(*v),
        OpcUaValue::Int64(v) => Variant::Int64(*v),
        OpcUaValue::UInt64(v) => Variant::UInt64(*v),
        OpcUaValue::Float(v) => Variant::Float(*v),
        OpcUaValue::Double(v) => Variant::Double(*v),
        OpcUaValue::String(v) => Variant::String(UAString::from(v.as_str())),
        OpcUaValue::DateTime(v) => Variant::DateTime(Box::new(opcua::types::DateTime::from(*v))),
        OpcUaValue::Guid(v) => Variant::Guid(Box::new(opcua::types::Guid::from(*v))),
        OpcUaValue::ByteString(v) => Variant::ByteString(opcua::types::ByteString::from(v.as_slice())),
        OpcUaValue::Array(values) => {
            let variants: Vec<Variant> = values.iter().map(to_opcua_variant).collect();
            opcua::types::Array::new(opcua::types::VariantTypeId::Variant, variants)
                .map(|array| Variant::Array(Box::new(array)))
                .unwrap_or(Variant::Empty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        let node = to_opcua_node_id(&NodeId::string(2, "Boiler.Temp"));
        assert_eq!(node.namespace, 2);
    }

    #[test]
    fn test_monitored_item_request_mapping() {
        let request = monitored_item_request(&MonitoredItemRequest {
            node_id: NodeId::numeric(3, 1001),
            client_handle: 42,
        });
        assert_eq!(request.item_to_monitor.node_id, opcua::types::NodeId::new(3, 1001u32));
        assert_eq!(request.item_to_monitor.attribute_id, AttributeId::Value as u32);
        assert_eq!(request.monitoring_mode, MonitoringMode::Reporting);
        assert_eq!(request.requested_parameters.client_handle, 42);
        assert_eq!(request.requested_parameters.queue_size, 1);
        assert!(request.requested_parameters.discard_oldest);
    }

    #[test]
    fn test_variant_round_trip() {
        for value in [
            OpcUaValue::Boolean(true),
            OpcUaValue::Int16(-7),
            OpcUaValue::UInt64(9),
            OpcUaValue::Double(2.5),
            OpcUaValue::String("ok".into()),
        ] {
            assert_eq!(from_opcua_variant(&to_opcua_variant(&value)), value);
        }
    }

    #[test]
    fn test_install_trusted_certificate() {
        let dir = tempfile::tempdir().unwrap();
        install_trusted_certificate(dir.path(), "opc.tcp://h:4840", &[1, 2, 3]).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("trusted")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
