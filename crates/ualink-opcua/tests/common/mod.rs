// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA server double shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use ualink_opcua::client::{
    DataValue, ItemNotification, MethodCallResult, MonitoredItemRequest, OpcUaValue,
    SessionFactory, UaSession,
};
use ualink_opcua::{
    ConnectionDescriptor, ConnectionError, IdentityConfig, NodeId, OpcUaResult, OperationError,
    StatusCode,
};

// =============================================================================
// Test Configuration
// =============================================================================

/// Endpoint used by most tests.
pub const ENDPOINT: &str = "opc.tcp://h:4840";

/// Installs a test subscriber once.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("ualink_opcua=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Log output captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Lines containing `message`.
    pub fn lines_with(&self, message: &str) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .filter(|line| line.contains(message))
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Captures debug-level events of the current thread until the guard drops.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

/// Source timestamp stamped on every value the mock server returns.
pub fn source_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}

// =============================================================================
// MockServer
// =============================================================================

struct SubscriptionRecord {
    endpoint: String,
    notifications: mpsc::Sender<ItemNotification>,
    items: Vec<MonitoredItemRequest>,
    deleted: bool,
}

/// Shared state behind every mock session.
#[derive(Default)]
pub struct MockServer {
    values: Mutex<HashMap<String, OpcUaValue>>,
    read_status: Mutex<StatusCode>,
    write_status: Mutex<StatusCode>,
    method_result: Mutex<Option<MethodCallResult>>,
    rejected_items: Mutex<HashSet<String>>,
    item_result_limit: Mutex<Option<usize>>,
    refuse_sessions: AtomicBool,
    fail_service_calls: AtomicBool,

    connections: Mutex<Vec<Arc<AtomicBool>>>,
    created: AtomicUsize,
    closed: AtomicUsize,
    identities: Mutex<Vec<IdentityConfig>>,
    endpoints: Mutex<Vec<String>>,

    subscriptions: Mutex<Vec<SubscriptionRecord>>,
    writes: Mutex<Vec<(String, OpcUaValue)>>,
    calls: Mutex<Vec<(String, String, Vec<OpcUaValue>)>>,
}

impl MockServer {
    /// Creates a server that accepts every session.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets the value of a node.
    pub fn set_value(&self, node_id: &str, value: OpcUaValue) {
        self.values.lock().insert(node_id.to_string(), value);
    }

    /// Sets the status returned by reads.
    pub fn set_read_status(&self, status: StatusCode) {
        *self.read_status.lock() = status;
    }

    /// Sets the status returned by writes.
    pub fn set_write_status(&self, status: StatusCode) {
        *self.write_status.lock() = status;
    }

    /// Sets the result of every method call.
    pub fn set_method_result(&self, status: StatusCode, outputs: Vec<OpcUaValue>) {
        *self.method_result.lock() = Some(MethodCallResult {
            status,
            outputs,
            source_timestamp: Some(source_time()),
        });
    }

    /// Rejects monitored items on `node_id`.
    pub fn reject_item(&self, node_id: &str) {
        self.rejected_items.lock().insert(node_id.to_string());
    }

    /// Answers at most `limit` monitored item results per request.
    pub fn limit_item_results(&self, limit: usize) {
        *self.item_result_limit.lock() = Some(limit);
    }

    /// Makes session creation fail.
    pub fn refuse_sessions(&self, refuse: bool) {
        self.refuse_sessions.store(refuse, Ordering::SeqCst);
    }

    /// Makes read, write and call services fail at the transport level.
    pub fn fail_service_calls(&self, fail: bool) {
        self.fail_service_calls.store(fail, Ordering::SeqCst);
    }

    /// Drops every open connection without closing the sessions.
    pub fn drop_connections(&self) {
        for connected in self.connections.lock().iter() {
            connected.store(false, Ordering::SeqCst);
        }
    }

    /// Number of sessions opened.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of sessions closed.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Identities seen by the factory, in order.
    pub fn identities(&self) -> Vec<IdentityConfig> {
        self.identities.lock().clone()
    }

    /// Endpoints sessions were opened on, in order.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().clone()
    }

    /// Writes received, in order.
    pub fn writes(&self) -> Vec<(String, OpcUaValue)> {
        self.writes.lock().clone()
    }

    /// Method calls received, in order.
    pub fn calls(&self) -> Vec<(String, String, Vec<OpcUaValue>)> {
        self.calls.lock().clone()
    }

    /// Number of subscriptions that were not deleted.
    pub fn live_subscriptions(&self) -> usize {
        self.subscriptions.lock().iter().filter(|s| !s.deleted).count()
    }

    /// Number of monitored items across live subscriptions.
    pub fn live_items(&self) -> usize {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| !s.deleted)
            .map(|s| s.items.len())
            .sum()
    }

    /// Pushes a data change to every live monitored item on `node_id`.
    ///
    /// Returns the number of notifications delivered.
    pub async fn notify(&self, node_id: &str, value: DataValue) -> usize {
        self.notify_where(|_| true, node_id, value).await
    }

    /// Like [`notify`](Self::notify), limited to sessions on `endpoint`.
    pub async fn notify_endpoint(&self, endpoint: &str, node_id: &str, value: DataValue) -> usize {
        self.notify_where(|e| e == endpoint, node_id, value).await
    }

    async fn notify_where(
        &self,
        matches_endpoint: impl Fn(&str) -> bool,
        node_id: &str,
        value: DataValue,
    ) -> usize {
        let targets: Vec<(mpsc::Sender<ItemNotification>, u32)> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| !s.deleted && matches_endpoint(&s.endpoint))
            .flat_map(|s| {
                s.items
                    .iter()
                    .filter(|item| item.node_id.to_string() == node_id)
                    .map(|item| (s.notifications.clone(), item.client_handle))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut delivered = 0;
        for (sender, client_handle) in targets {
            let notification = ItemNotification {
                client_handle,
                value: value.clone(),
            };
            if sender.send(notification).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

// =============================================================================
// MockSessionFactory / MockSession
// =============================================================================

/// Factory opening [`MockSession`]s against one [`MockServer`].
pub struct MockSessionFactory {
    server: Arc<MockServer>,
}

impl MockSessionFactory {
    /// Creates a factory for `server`.
    pub fn new(server: Arc<MockServer>) -> Arc<Self> {
        Arc::new(Self { server })
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn create_session(
        &self,
        descriptor: &ConnectionDescriptor,
        identity: &IdentityConfig,
    ) -> OpcUaResult<Box<dyn UaSession>> {
        if self.server.refuse_sessions.load(Ordering::SeqCst) {
            return Err(
                ConnectionError::refused(&descriptor.endpoint_url, "connection refused").into(),
            );
        }

        let connected = Arc::new(AtomicBool::new(true));
        self.server.connections.lock().push(connected.clone());
        self.server.identities.lock().push(identity.clone());
        self.server
            .endpoints
            .lock()
            .push(descriptor.endpoint_url.clone());
        self.server.created.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            endpoint: descriptor.endpoint_url.clone(),
            connected,
            closed: AtomicBool::new(false),
            server: self.server.clone(),
        }))
    }
}

/// One session on the mock server.
pub struct MockSession {
    endpoint: String,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    server: Arc<MockServer>,
}

impl MockSession {
    fn ensure_connected(&self) -> OpcUaResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected.into())
        }
    }

    fn service_failure(&self) -> bool {
        self.server.fail_service_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UaSession for MockSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read(&self, node_id: &NodeId, _max_age: Duration) -> OpcUaResult<DataValue> {
        self.ensure_connected()?;
        if self.service_failure() {
            return Err(OperationError::read_failed(node_id.to_string(), "socket reset").into());
        }
        let value = self
            .server
            .values
            .lock()
            .get(&node_id.to_string())
            .cloned()
            .unwrap_or_default();
        let mut data = DataValue::new(value).with_status(*self.server.read_status.lock());
        data.source_timestamp = Some(source_time());
        data.server_timestamp = Some(source_time());
        Ok(data)
    }

    async fn call_method(
        &self,
        object_id: &NodeId,
        method_id: &NodeId,
        inputs: Vec<OpcUaValue>,
    ) -> OpcUaResult<MethodCallResult> {
        self.ensure_connected()?;
        if self.service_failure() {
            return Err(OperationError::call_failed(
                object_id.to_string(),
                method_id.to_string(),
                "socket reset",
            )
            .into());
        }
        self.server
            .calls
            .lock()
            .push((object_id.to_string(), method_id.to_string(), inputs));
        Ok(self
            .server
            .method_result
            .lock()
            .clone()
            .unwrap_or_default())
    }

    async fn write(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<StatusCode> {
        self.ensure_connected()?;
        if self.service_failure() {
            return Err(OperationError::write_failed(node_id.to_string(), "socket reset").into());
        }
        let status = *self.server.write_status.lock();
        if status.is_good() {
            self.server
                .values
                .lock()
                .insert(node_id.to_string(), value.clone());
        }
        self.server.writes.lock().push((node_id.to_string(), value));
        Ok(status)
    }

    async fn create_subscription(
        &self,
        _publishing_interval: Duration,
        notifications: mpsc::Sender<ItemNotification>,
    ) -> OpcUaResult<u32> {
        self.ensure_connected()?;
        let mut subscriptions = self.server.subscriptions.lock();
        subscriptions.push(SubscriptionRecord {
            endpoint: self.endpoint.clone(),
            notifications,
            items: Vec::new(),
            deleted: false,
        });
        Ok(subscriptions.len() as u32)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> OpcUaResult<Vec<StatusCode>> {
        self.ensure_connected()?;
        let rejected = self.server.rejected_items.lock().clone();
        let mut subscriptions = self.server.subscriptions.lock();
        let record = subscriptions
            .get_mut(subscription_id as usize - 1)
            .ok_or_else(|| OperationError::read_failed("subscription", "unknown subscription"))?;

        let mut statuses = Vec::with_capacity(items.len());
        for item in items {
            if rejected.contains(&item.node_id.to_string()) {
                statuses.push(StatusCode::BAD_NODE_ID_UNKNOWN);
            } else {
                record.items.push(item.clone());
                statuses.push(StatusCode::GOOD);
            }
        }
        if let Some(limit) = *self.server.item_result_limit.lock() {
            statuses.truncate(limit);
        }
        Ok(statuses)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        if let Some(record) = self
            .server
            .subscriptions
            .lock()
            .get_mut(subscription_id as usize - 1)
        {
            record.deleted = true;
        }
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.server.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
