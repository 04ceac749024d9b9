/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Commands travelling from the platform back to devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub token: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A user-level request to run a command on one device.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub id: Uuid,
    pub hardware_id: String,
    /// Protocol tag such as `mqtt:` or `rest:` used for destination selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub command: DeviceCommand,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub invoked_at: DateTime<Utc>,
}

impl CommandInvocation {
    pub fn new(hardware_id: impl Into<String>, command: DeviceCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            hardware_id: hardware_id.into(),
            protocol: None,
            command,
            parameters: BTreeMap::new(),
            invoked_at: Utc::now(),
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationAckState {
    NewRegistration,
    AlreadyRegistered,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationFailureReason {
    NewDevicesNotAllowed,
    InvalidSpecificationToken,
    SiteTokenRequired,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStreamAckState {
    StreamCreated,
    StreamExists,
    StreamFailed,
}

/// Platform-originated messages such as registration acknowledgements.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemCommand {
    RegistrationAck {
        state: RegistrationAckState,
    },
    RegistrationFailure {
        reason: RegistrationFailureReason,
        message: String,
    },
    DeviceStreamAck {
        stream_id: String,
        state: DeviceStreamAckState,
    },
}

impl SystemCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SystemCommand::RegistrationAck { .. } => "registration_ack",
            SystemCommand::RegistrationFailure { .. } => "registration_failure",
            SystemCommand::DeviceStreamAck { .. } => "device_stream_ack",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum CommandPayload {
    Invocation(Arc<CommandInvocation>),
    System(SystemCommand),
}

/// Unit of work routed to and delivered by command destinations.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CommandExecution {
    pub id: Uuid,
    pub hardware_id: String,
    pub protocol: Option<String>,
    pub payload: CommandPayload,
    pub created_at: DateTime<Utc>,
}

impl CommandExecution {
    pub fn from_invocation(invocation: Arc<CommandInvocation>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hardware_id: invocation.hardware_id.clone(),
            protocol: invocation.protocol.clone(),
            payload: CommandPayload::Invocation(invocation),
            created_at: Utc::now(),
        }
    }

    /// System commands carry no protocol tag.
    pub fn from_system(hardware_id: impl Into<String>, command: SystemCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            hardware_id: hardware_id.into(),
            protocol: None,
            payload: CommandPayload::System(command),
            created_at: Utc::now(),
        }
    }

    pub fn command_name(&self) -> &str {
        match &self.payload {
            CommandPayload::Invocation(invocation) => &invocation.command.name,
            CommandPayload::System(command) => command.name(),
        }
    }
}

/// A command execution after a destination encoded it for its wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedCommand {
    pub execution_id: Uuid,
    pub hardware_id: String,
    pub content_type: String,
    pub body: Vec<u8>,
}
