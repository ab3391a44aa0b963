// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Read, method-call and write executor tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{
    capture_logs, init_tracing, source_time, MockServer, MockSessionFactory, ENDPOINT,
};
use ualink_opcua::{
    AdmissionStrategy, CommandExecutor, CommandValue, ConnectionDescriptor, DeviceResource,
    IdentityConfig, NamedPoolRegistry, OpcUaError, OpcUaValue, OperationError, StatusCode,
    ValueType,
};

const DEVICE: &str = "boiler-1";

// =============================================================================
// Helpers
// =============================================================================

struct Fixture {
    server: Arc<MockServer>,
    registry: Arc<NamedPoolRegistry>,
    executor: CommandExecutor,
    descriptor: ConnectionDescriptor,
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
        let executor = CommandExecutor::new(registry.clone(), Duration::from_millis(2000));
        Self {
            server,
            registry,
            executor,
            descriptor: ConnectionDescriptor::new(ENDPOINT),
        }
    }

    fn idle(&self) -> usize {
        self.registry
            .pool(DEVICE)
            .map(|pool| pool.idle_count())
            .unwrap_or(0)
    }
}

fn node(name: &str, value_type: ValueType, node_id: &str) -> DeviceResource {
    DeviceResource::new(name, value_type, json!({ "nodeId": node_id }))
}

fn method(name: &str, value_type: ValueType, inputs: &[&str]) -> DeviceResource {
    DeviceResource::new(
        name,
        value_type,
        json!({ "objectId": "ns=2;i=1", "methodId": "ns=2;i=7", "inputMap": inputs }),
    )
}

// =============================================================================
// Read
// =============================================================================

#[tokio::test]
async fn test_read_nodes() {
    let fx = Fixture::new();
    fx.server.set_value("ns=2;s=Temp", OpcUaValue::Double(21.5));
    fx.server.set_value("ns=2;s=Running", OpcUaValue::Boolean(true));

    let readings = fx
        .executor
        .read(
            DEVICE,
            &fx.descriptor,
            &[
                node("Temperature", ValueType::Float64, "ns=2;s=Temp"),
                node("Running", ValueType::Bool, "ns=2;s=Running"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].device_name, DEVICE);
    assert_eq!(readings[0].resource_name, "Temperature");
    assert_eq!(readings[0].value, CommandValue::Float64(21.5));
    assert_eq!(
        readings[0].source_timestamp(),
        Some(source_time().to_rfc3339().as_str())
    );
    assert_eq!(readings[1].value, CommandValue::Bool(true));

    // One session served the whole batch and went back to the pool.
    assert_eq!(fx.server.created(), 1);
    assert_eq!(fx.idle(), 1);
}

#[tokio::test]
async fn test_read_completion_logged_at_debug() {
    let fx = Fixture::new();
    fx.server.set_value("ns=2;s=Temp", OpcUaValue::Double(21.5));
    let (logs, _guard) = capture_logs();

    fx.executor
        .read(
            DEVICE,
            &fx.descriptor,
            &[node("Temperature", ValueType::Float64, "ns=2;s=Temp")],
        )
        .await
        .unwrap();

    let lines = logs.lines_with("Read command finished");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("DEBUG"), "{}", lines[0]);
}

#[tokio::test]
async fn test_read_method() {
    let fx = Fixture::new();
    fx.server
        .set_method_result(StatusCode::GOOD, vec![OpcUaValue::Int32(7)]);

    let readings = fx
        .executor
        .read(
            DEVICE,
            &fx.descriptor,
            &[method("Counter", ValueType::Int32, &["1", "two"])],
        )
        .await
        .unwrap();

    assert_eq!(readings[0].value, CommandValue::Int32(7));
    assert_eq!(
        readings[0].source_timestamp(),
        Some(source_time().to_rfc3339().as_str())
    );
    assert_eq!(
        fx.server.calls(),
        vec![(
            "ns=2;i=1".to_string(),
            "ns=2;i=7".to_string(),
            vec![
                OpcUaValue::String("1".into()),
                OpcUaValue::String("two".into())
            ],
        )]
    );
}

#[tokio::test]
async fn test_read_method_without_output() {
    let fx = Fixture::new();
    fx.server.set_method_result(StatusCode::GOOD, Vec::new());

    let err = fx
        .executor
        .read(DEVICE, &fx.descriptor, &[method("Counter", ValueType::Int32, &[])])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::MissingOutput { .. })
    ));
}

#[tokio::test]
async fn test_bad_read_status_invalidates_session() {
    let fx = Fixture::new();
    fx.server.set_read_status(StatusCode::BAD_NODE_ID_UNKNOWN);

    let err = fx
        .executor
        .read(
            DEVICE,
            &fx.descriptor,
            &[node("Temperature", ValueType::Float64, "ns=2;s=Temp")],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::BadStatus { status_code, .. })
            if status_code == StatusCode::BAD_NODE_ID_UNKNOWN
    ));
    assert_eq!(fx.server.closed(), 1);
    assert_eq!(fx.idle(), 0);
}

#[tokio::test]
async fn test_bad_method_status_invalidates_session() {
    let fx = Fixture::new();
    fx.server
        .set_method_result(StatusCode::BAD_METHOD_INVALID, vec![OpcUaValue::Int32(1)]);

    let err = fx
        .executor
        .read(DEVICE, &fx.descriptor, &[method("Counter", ValueType::Int32, &[])])
        .await
        .unwrap_err();
    assert!(err.invalidates_session());
    assert_eq!(fx.server.closed(), 1);
}

#[tokio::test]
async fn test_transport_failure_invalidates_session() {
    let fx = Fixture::new();
    fx.server.set_value("ns=2;s=Temp", OpcUaValue::Double(21.5));
    fx.server.fail_service_calls(true);

    let err = fx
        .executor
        .read(
            DEVICE,
            &fx.descriptor,
            &[node("Temperature", ValueType::Float64, "ns=2;s=Temp")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpcUaError::Operation(OperationError::ReadFailed { .. })));
    assert_eq!(fx.idle(), 0);

    fx.server.fail_service_calls(false);
    fx.executor
        .read(
            DEVICE,
            &fx.descriptor,
            &[node("Temperature", ValueType::Float64, "ns=2;s=Temp")],
        )
        .await
        .unwrap();
    assert_eq!(fx.server.created(), 2);
}

#[tokio::test]
async fn test_decode_failure_keeps_session() {
    let fx = Fixture::new();
    fx.server.set_value("ns=2;s=Level", OpcUaValue::Int32(200));

    let err = fx
        .executor
        .read(DEVICE, &fx.descriptor, &[node("Level", ValueType::Int8, "ns=2;s=Level")])
        .await
        .unwrap_err();

    assert!(matches!(err, OpcUaError::Conversion(_)));
    assert!(err.to_string().contains("Level"));
    assert_eq!(fx.server.closed(), 0);
    assert_eq!(fx.idle(), 1);
}

#[tokio::test]
async fn test_invalid_attributes_fail_before_borrowing() {
    let fx = Fixture::new();
    let broken = DeviceResource::new("Broken", ValueType::Int32, json!({ "methodId": "ns=2;i=7" }));

    let err = fx
        .executor
        .read(DEVICE, &fx.descriptor, &[broken])
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(fx.server.created(), 0);
}

#[tokio::test]
async fn test_connection_failure_surfaces() {
    let fx = Fixture::new();
    fx.server.refuse_sessions(true);

    let err = fx
        .executor
        .read(
            DEVICE,
            &fx.descriptor,
            &[node("Temperature", ValueType::Float64, "ns=2;s=Temp")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpcUaError::Connection(_)));
}

// =============================================================================
// Write
// =============================================================================

#[tokio::test]
async fn test_write_nodes() {
    let fx = Fixture::new();

    fx.executor
        .write(
            DEVICE,
            &fx.descriptor,
            &[
                node("Setpoint", ValueType::Int16, "ns=2;s=Sp"),
                node("Label", ValueType::String, "ns=2;s=Label"),
            ],
            &[
                CommandValue::Int16(-5),
                CommandValue::String("north".into()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(
        fx.server.writes(),
        vec![
            ("ns=2;s=Sp".to_string(), OpcUaValue::Int16(-5)),
            ("ns=2;s=Label".to_string(), OpcUaValue::String("north".into())),
        ]
    );
    assert_eq!(fx.idle(), 1);

    let readings = fx
        .executor
        .read(DEVICE, &fx.descriptor, &[node("Setpoint", ValueType::Int16, "ns=2;s=Sp")])
        .await
        .unwrap();
    assert_eq!(readings[0].value, CommandValue::Int16(-5));
}

#[tokio::test]
async fn test_write_rejects_methods() {
    let fx = Fixture::new();

    let err = fx
        .executor
        .write(
            DEVICE,
            &fx.descriptor,
            &[method("Counter", ValueType::Int32, &[])],
            &[CommandValue::Int32(1)],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::MethodNotWritable { .. })
    ));
    assert_eq!(fx.server.created(), 0);
}

#[tokio::test]
async fn test_write_value_type_mismatch() {
    let fx = Fixture::new();

    let err = fx
        .executor
        .write(
            DEVICE,
            &fx.descriptor,
            &[node("Setpoint", ValueType::Float64, "ns=2;s=Sp")],
            &[CommandValue::Int32(1)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpcUaError::Conversion(_)));
    assert_eq!(fx.server.created(), 0);
    assert!(fx.server.writes().is_empty());
}

#[tokio::test]
async fn test_write_argument_count_mismatch() {
    let fx = Fixture::new();

    let err = fx
        .executor
        .write(
            DEVICE,
            &fx.descriptor,
            &[node("Setpoint", ValueType::Int16, "ns=2;s=Sp")],
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::ArgumentMismatch {
            requests: 1,
            values: 0
        })
    ));
}

#[tokio::test]
async fn test_bad_write_status_invalidates_session() {
    let fx = Fixture::new();
    fx.server.set_write_status(StatusCode::BAD_NOT_WRITABLE);

    let err = fx
        .executor
        .write(
            DEVICE,
            &fx.descriptor,
            &[
                node("Setpoint", ValueType::Int16, "ns=2;s=Sp"),
                node("Other", ValueType::Int16, "ns=2;s=Other"),
            ],
            &[CommandValue::Int16(1), CommandValue::Int16(2)],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::BadStatus { .. })
    ));
    // The batch stops at the first failure.
    assert_eq!(fx.server.writes().len(), 1);
    assert_eq!(fx.server.closed(), 1);
    assert_eq!(fx.idle(), 0);
}
