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

//! JSON lines accepted on stdin.

use device_provisioning::{CommandInvocation, DeviceCommand, DeviceEvent};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One stdin line: `{"event": {...}}` or `{"command": {...}}`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum InputRecord {
    Event(DeviceEvent),
    Command(CommandRequest),
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct CommandRequest {
    pub(crate) hardware_id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) token: Option<String>,
    #[serde(default)]
    pub(crate) namespace: Option<String>,
    #[serde(default)]
    pub(crate) protocol: Option<String>,
    #[serde(default)]
    pub(crate) parameters: BTreeMap<String, String>,
}

impl CommandRequest {
    pub fn into_invocation(self) -> CommandInvocation {
        let command = DeviceCommand {
            token: self.token.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            namespace: self.namespace,
        };
        let mut invocation = CommandInvocation::new(self.hardware_id, command);
        invocation.protocol = self.protocol;
        invocation.parameters = self.parameters;
        invocation
    }
}

/// `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<InputRecord>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
