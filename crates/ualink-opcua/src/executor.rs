// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Read, method-call and write execution on pooled sessions.
//!
//! Every batch borrows one session from the device pool, runs its requests
//! in order and stops at the first failure. The session is always released;
//! failures that leave the session in doubt (transport errors and non-good
//! status codes) mark it invalid first, so the pool closes it instead of
//! caching it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::{ClientWrapper, NamedPoolRegistry, OpcUaValue, UaSession};
use crate::codec;
use crate::command::{CommandDescriptor, CommandTarget, CommandValue, Reading};
use crate::config::ConnectionDescriptor;
use crate::device::DeviceResource;
use crate::error::{OpcUaResult, OperationError};
use crate::types::NodeId;

/// Runs read and write batches against device pools.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    registry: Arc<NamedPoolRegistry>,
    read_max_age: Duration,
}

impl CommandExecutor {
    /// Creates an executor.
    pub fn new(registry: Arc<NamedPoolRegistry>, read_max_age: Duration) -> Self {
        Self {
            registry,
            read_max_age,
        }
    }

    /// Reads every requested resource, in order.
    ///
    /// Method resources are invoked and their first output argument is
    /// decoded; node resources are read with both timestamps.
    pub async fn read(
        &self,
        device: &str,
        descriptor: &ConnectionDescriptor,
        requests: &[DeviceResource],
    ) -> OpcUaResult<Vec<Reading>> {
        let commands = requests
            .iter()
            .map(DeviceResource::descriptor)
            .collect::<OpcUaResult<Vec<_>>>()?;

        let mut wrapper = self.registry.get_connection(device, descriptor).await?;
        let result = self.read_batch(&wrapper, device, &commands).await;
        finish(&mut wrapper, &result, "read");
        wrapper.release().await;
        result
    }

    /// Writes one value per requested resource, in order.
    pub async fn write(
        &self,
        device: &str,
        descriptor: &ConnectionDescriptor,
        requests: &[DeviceResource],
        values: &[CommandValue],
    ) -> OpcUaResult<()> {
        if requests.len() != values.len() {
            return Err(OperationError::ArgumentMismatch {
                requests: requests.len(),
                values: values.len(),
            }
            .into());
        }

        let mut writes = Vec::with_capacity(requests.len());
        for (request, value) in requests.iter().zip(values) {
            let command = request.descriptor()?;
            let node_id = match &command.target {
                CommandTarget::Node { node_id } => node_id.clone(),
                CommandTarget::Method { .. } => {
                    return Err(OperationError::method_not_writable(&command.resource_name).into())
                }
            };
            let raw = codec::encode(command.value_type, value).map_err(|e| {
                e.for_resource(&command.resource_name, command.value_type)
            })?;
            writes.push((command, node_id, raw));
        }

        let mut wrapper = self.registry.get_connection(device, descriptor).await?;
        let result = write_batch(&wrapper, &writes).await;
        finish(&mut wrapper, &result, "write");
        wrapper.release().await;
        result
    }

    async fn read_batch(
        &self,
        wrapper: &ClientWrapper,
        device: &str,
        commands: &[CommandDescriptor],
    ) -> OpcUaResult<Vec<Reading>> {
        let session = wrapper.session()?;
        let mut readings = Vec::with_capacity(commands.len());
        for command in commands {
            let reading = match &command.target {
                CommandTarget::Node { node_id } => {
                    let data = session.read(node_id, self.read_max_age).await?;
                    if !data.status.is_good() {
                        return Err(OperationError::bad_status(node_id.to_string(), data.status).into());
                    }
                    let value =
                        codec::decode_reading(&command.resource_name, command.value_type, &data.value)?;
                    Reading::new(device, &command.resource_name, value)
                        .with_source_timestamp(data.source_timestamp)
                }
                CommandTarget::Method {
                    object_id,
                    method_id,
                    inputs,
                } => {
                    let (value, timestamp) =
                        call_method(session, command, object_id, method_id, inputs).await?;
                    Reading::new(device, &command.resource_name, value)
                        .with_source_timestamp(timestamp)
                }
            };
            debug!(
                device = %device,
                resource = %reading.resource_name,
                value = %reading.value,
                "Read command finished"
            );
            readings.push(reading);
        }
        Ok(readings)
    }
}

async fn call_method(
    session: &dyn UaSession,
    command: &CommandDescriptor,
    object_id: &NodeId,
    method_id: &NodeId,
    inputs: &[String],
) -> OpcUaResult<(CommandValue, Option<DateTime<Utc>>)> {
    let arguments = inputs.iter().cloned().map(OpcUaValue::String).collect();
    let result = session.call_method(object_id, method_id, arguments).await?;
    if !result.status.is_good() {
        return Err(OperationError::bad_status(method_id.to_string(), result.status).into());
    }
    let output = result
        .outputs
        .first()
        .ok_or_else(|| OperationError::missing_output(method_id.to_string()))?;
    let value = codec::decode_reading(&command.resource_name, command.value_type, output)?;
    Ok((value, result.source_timestamp))
}

async fn write_batch(
    wrapper: &ClientWrapper,
    writes: &[(CommandDescriptor, NodeId, OpcUaValue)],
) -> OpcUaResult<()> {
    let session = wrapper.session()?;
    for (command, node_id, raw) in writes {
        let status = session.write(node_id, raw.clone()).await?;
        if !status.is_good() {
            return Err(OperationError::bad_status(node_id.to_string(), status).into());
        }
        debug!(resource = %command.resource_name, node_id = %node_id, "Write command finished");
    }
    Ok(())
}

fn finish<T>(wrapper: &mut ClientWrapper, result: &OpcUaResult<T>, operation: &str) {
    if let Err(e) = result {
        if e.invalidates_session() {
            wrapper.set_invalid();
        }
        e.log(&format!("{} command on device '{}'", operation, wrapper.device()));
    }
}
