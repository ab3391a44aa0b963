// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription dispatcher tests.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use common::{eventually, init_tracing, source_time, MockServer, MockSessionFactory, ENDPOINT};
use ualink_opcua::client::DataValue;
use ualink_opcua::{
    AdmissionStrategy, CommandValue, ConnectionDescriptor, DeviceResource, IdentityConfig,
    NamedPoolRegistry, OpcUaValue, Reading, StatusCode, SubscriptionDispatcher, ValueType,
};

// =============================================================================
// Helpers
// =============================================================================

struct Fixture {
    server: Arc<MockServer>,
    registry: Arc<NamedPoolRegistry>,
    dispatcher: SubscriptionDispatcher,
    readings: mpsc::Receiver<Reading>,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let server = MockServer::new();
        let registry = Arc::new(NamedPoolRegistry::new(
            MockSessionFactory::new(server.clone()),
            IdentityConfig::default(),
            AdmissionStrategy::Wait,
        ));
        let (sink, readings) = mpsc::channel(16);
        let dispatcher =
            SubscriptionDispatcher::new(registry.clone(), sink, Duration::from_millis(500), 16);
        Self {
            server,
            registry,
            dispatcher,
            readings,
        }
    }

    async fn next_reading(&mut self) -> Reading {
        tokio::time::timeout(Duration::from_secs(2), self.readings.recv())
            .await
            .expect("no reading within two seconds")
            .expect("sink closed")
    }

    async fn assert_no_reading(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.readings.recv()).await;
        assert!(next.is_err(), "unexpected reading: {:?}", next);
    }
}

fn watched(name: &str, value_type: ValueType, node_id: &str) -> DeviceResource {
    DeviceResource::new(
        name,
        value_type,
        json!({ "nodeId": node_id, "watchable": true }),
    )
}

fn value(raw: OpcUaValue) -> DataValue {
    let mut data = DataValue::new(raw);
    data.source_timestamp = Some(source_time());
    data
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_notifications_become_readings() {
    let mut fx = Fixture::new();
    let resources = vec![
        watched("Temperature", ValueType::Float64, "ns=2;s=Temp"),
        DeviceResource::new("Setpoint", ValueType::Float64, json!({ "nodeId": "ns=2;s=Sp" })),
    ];

    assert!(
        fx.dispatcher
            .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
            .await
    );
    let server = fx.server.clone();
    eventually("monitored item registered", || server.live_items() == 1).await;
    assert!(fx.dispatcher.is_subscribed("boiler-1"));
    assert_eq!(fx.dispatcher.subscribed_devices(), vec!["boiler-1"]);

    // Dedicated session, outside the device pool and the create tally.
    assert_eq!(fx.server.created(), 1);
    assert!(fx.registry.pool("boiler-1").is_none());
    assert_eq!(fx.registry.unmanaged_sessions(), 0);

    let bindings = fx.dispatcher.bindings("boiler-1").unwrap();
    assert_eq!(bindings.len(), 1);
    let binding = bindings.values().next().unwrap();
    assert_eq!(binding.device_name, "boiler-1");
    assert_eq!(binding.command.resource_name, "Temperature");

    assert_eq!(
        fx.server
            .notify("ns=2;s=Temp", value(OpcUaValue::Double(21.5)))
            .await,
        1
    );
    let reading = fx.next_reading().await;
    assert_eq!(reading.device_name, "boiler-1");
    assert_eq!(reading.resource_name, "Temperature");
    assert_eq!(reading.value, CommandValue::Float64(21.5));
    assert_eq!(
        reading.source_timestamp(),
        Some(source_time().to_rfc3339().as_str())
    );
    eventually("reading counted", || fx.dispatcher.stats().snapshot().readings == 1).await;
}

#[tokio::test]
async fn test_handle_isolation_between_devices() {
    let mut fx = Fixture::new();
    let endpoint_b = "opc.tcp://b:4840";
    let resources = vec![watched("Level", ValueType::Int32, "ns=2;s=Shared")];

    fx.dispatcher
        .subscribe("a", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    fx.dispatcher
        .subscribe("b", ConnectionDescriptor::new(endpoint_b), &resources)
        .await;
    let server = fx.server.clone();
    eventually("both devices subscribed", || server.live_items() == 2).await;

    let handles_a: HashSet<u32> = fx.dispatcher.bindings("a").unwrap().keys().copied().collect();
    let handles_b: HashSet<u32> = fx.dispatcher.bindings("b").unwrap().keys().copied().collect();
    assert!(handles_a.is_disjoint(&handles_b));

    fx.server
        .notify_endpoint(ENDPOINT, "ns=2;s=Shared", value(OpcUaValue::Int32(5)))
        .await;
    let reading = fx.next_reading().await;
    assert_eq!(reading.device_name, "a");
    assert_eq!(reading.value, CommandValue::Int32(5));
    fx.assert_no_reading().await;

    fx.server
        .notify_endpoint(endpoint_b, "ns=2;s=Shared", value(OpcUaValue::Int32(9)))
        .await;
    let reading = fx.next_reading().await;
    assert_eq!(reading.device_name, "b");
    assert_eq!(reading.value, CommandValue::Int32(9));
}

#[tokio::test]
async fn test_decode_failure_is_item_scoped() {
    let mut fx = Fixture::new();
    let resources = vec![
        watched("Small", ValueType::Int8, "ns=2;s=Small"),
        watched("Temperature", ValueType::Float64, "ns=2;s=Temp"),
    ];
    fx.dispatcher
        .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    let server = fx.server.clone();
    eventually("items registered", || server.live_items() == 2).await;

    fx.server
        .notify("ns=2;s=Small", value(OpcUaValue::Int32(500)))
        .await;
    fx.server
        .notify("ns=2;s=Temp", value(OpcUaValue::Double(1.5)))
        .await;

    let reading = fx.next_reading().await;
    assert_eq!(reading.resource_name, "Temperature");
    assert!(fx.dispatcher.is_subscribed("boiler-1"));

    eventually("reading counted", || fx.dispatcher.stats().snapshot().readings == 1).await;
    let stats = fx.dispatcher.stats().snapshot();
    assert_eq!(stats.notifications, 2);
    assert_eq!(stats.decode_failures, 1);
}

#[tokio::test]
async fn test_bad_status_notifications_are_skipped() {
    let mut fx = Fixture::new();
    let resources = vec![watched("Temperature", ValueType::Float64, "ns=2;s=Temp")];
    fx.dispatcher
        .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    let server = fx.server.clone();
    eventually("item registered", || server.live_items() == 1).await;

    fx.server
        .notify(
            "ns=2;s=Temp",
            value(OpcUaValue::Double(0.0)).with_status(StatusCode::BAD_COMMUNICATION_ERROR),
        )
        .await;
    fx.assert_no_reading().await;
    assert_eq!(fx.dispatcher.stats().snapshot().bad_status, 1);
}

#[tokio::test]
async fn test_unsubscribe_cleans_up() {
    let mut fx = Fixture::new();
    let resources = vec![watched("Temperature", ValueType::Float64, "ns=2;s=Temp")];
    fx.dispatcher
        .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    let server = fx.server.clone();
    eventually("item registered", || server.live_items() == 1).await;

    assert!(fx.dispatcher.unsubscribe("boiler-1").await);
    assert!(!fx.dispatcher.unsubscribe("boiler-1").await);

    // Cleanup is complete once unsubscribe returns.
    assert_eq!(fx.server.live_subscriptions(), 0);
    assert_eq!(fx.server.closed(), 1);
    assert!(fx.dispatcher.bindings("boiler-1").is_none());
    assert!(!fx.dispatcher.is_subscribed("boiler-1"));

    assert_eq!(
        fx.server
            .notify("ns=2;s=Temp", value(OpcUaValue::Double(1.0)))
            .await,
        0
    );
    fx.assert_no_reading().await;
}

#[tokio::test]
async fn test_resubscribe_replaces_previous_subscription() {
    let mut fx = Fixture::new();
    let resources = vec![watched("Temperature", ValueType::Float64, "ns=2;s=Temp")];
    let server = fx.server.clone();

    fx.dispatcher
        .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    eventually("first subscription", || server.live_items() == 1).await;
    let first = fx.dispatcher.bindings("boiler-1").unwrap();

    fx.dispatcher
        .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    eventually("second subscription", || server.created() == 2 && server.live_items() == 1)
        .await;
    eventually("bindings replaced", || {
        fx.dispatcher
            .bindings("boiler-1")
            .map(|current| !Arc::ptr_eq(&current, &first))
            .unwrap_or(false)
    })
    .await;

    assert_eq!(fx.server.closed(), 1);
    assert_eq!(fx.server.live_subscriptions(), 1);

    fx.server
        .notify("ns=2;s=Temp", value(OpcUaValue::Double(2.0)))
        .await;
    fx.next_reading().await;
    fx.assert_no_reading().await;
}

#[tokio::test]
async fn test_nothing_to_watch() {
    let fx = Fixture::new();
    let resources = vec![DeviceResource::new(
        "Setpoint",
        ValueType::Float64,
        json!({ "nodeId": "ns=2;s=Sp" }),
    )];

    assert!(
        !fx.dispatcher
            .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
            .await
    );
    assert!(!fx.dispatcher.is_subscribed("boiler-1"));
    assert_eq!(fx.server.created(), 0);
}

#[tokio::test]
async fn test_rejected_items_are_unbound() {
    let fx = Fixture::new();
    fx.server.reject_item("ns=2;s=Missing");
    let resources = vec![
        watched("Temperature", ValueType::Float64, "ns=2;s=Temp"),
        watched("Missing", ValueType::Float64, "ns=2;s=Missing"),
    ];

    fx.dispatcher
        .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    eventually("bindings published", || fx.dispatcher.bindings("boiler-1").is_some()).await;

    let bindings = fx.dispatcher.bindings("boiler-1").unwrap();
    assert_eq!(bindings.len(), 1);
    assert!(bindings
        .values()
        .all(|binding| binding.command.resource_name == "Temperature"));
}

#[tokio::test]
async fn test_items_without_result_are_unbound() {
    let fx = Fixture::new();
    fx.server.limit_item_results(1);
    let resources = vec![
        watched("Temperature", ValueType::Float64, "ns=2;s=Temp"),
        watched("Pressure", ValueType::Float64, "ns=2;s=Press"),
    ];

    fx.dispatcher
        .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
        .await;
    eventually("bindings published", || fx.dispatcher.bindings("boiler-1").is_some()).await;

    let bindings = fx.dispatcher.bindings("boiler-1").unwrap();
    assert_eq!(bindings.len(), 1);
    assert!(bindings
        .values()
        .all(|binding| binding.command.resource_name == "Temperature"));
}

#[tokio::test]
async fn test_session_failure_ends_task() {
    let fx = Fixture::new();
    fx.server.refuse_sessions(true);
    let resources = vec![watched("Temperature", ValueType::Float64, "ns=2;s=Temp")];

    assert!(
        fx.dispatcher
            .subscribe("boiler-1", ConnectionDescriptor::new(ENDPOINT), &resources)
            .await
    );
    eventually("task finished", || !fx.dispatcher.is_subscribed("boiler-1")).await;
    assert!(fx.dispatcher.bindings("boiler-1").is_none());
}

#[tokio::test]
async fn test_unsubscribe_all() {
    let fx = Fixture::new();
    let resources = vec![watched("Temperature", ValueType::Float64, "ns=2;s=Temp")];
    for device in ["a", "b", "c"] {
        fx.dispatcher
            .subscribe(device, ConnectionDescriptor::new(ENDPOINT), &resources)
            .await;
    }
    let server = fx.server.clone();
    eventually("all subscribed", || server.live_items() == 3).await;

    fx.dispatcher.unsubscribe_all().await;
    assert!(fx.dispatcher.subscribed_devices().is_empty());
    assert_eq!(fx.server.live_subscriptions(), 0);
    assert_eq!(fx.server.closed(), 3);
}
