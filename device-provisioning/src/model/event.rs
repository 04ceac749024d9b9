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

//! Device events flowing from inbound sources to outbound sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEventType {
    Measurement,
    Location,
    Alert,
    CommandInvocation,
    CommandResponse,
    StateChange,
}

impl Display for DeviceEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceEventType::Measurement => "measurement",
            DeviceEventType::Location => "location",
            DeviceEventType::Alert => "alert",
            DeviceEventType::CommandInvocation => "command_invocation",
            DeviceEventType::CommandResponse => "command_response",
            DeviceEventType::StateChange => "state_change",
        };
        f.write_str(label)
    }
}

/// Immutable record of something a device reported.
///
/// Once an event enters the pipeline it is shared as `Arc<DeviceEvent>`
/// between every outbound processor and is never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub hardware_id: String,
    pub event_type: DeviceEventType,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification_token: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DeviceEvent {
    pub fn new(hardware_id: impl Into<String>, event_type: DeviceEventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            hardware_id: hardware_id.into(),
            event_type,
            occurred_at: Utc::now(),
            site_token: None,
            specification_token: None,
            payload: serde_json::Value::Null,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_site(mut self, site_token: impl Into<String>) -> Self {
        self.site_token = Some(site_token.into());
        self
    }

    pub fn with_specification(mut self, specification_token: impl Into<String>) -> Self {
        self.specification_token = Some(specification_token.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceEvent, DeviceEventType};

    #[test]
    fn minimal_json_line_fills_defaults() {
        let event: DeviceEvent = serde_json::from_str(
            r#"{"hardware_id":"dev-1","event_type":"measurement","site_token":"s1"}"#,
        )
        .expect("minimal event should parse");

        assert_eq!(event.hardware_id, "dev-1");
        assert_eq!(event.event_type, DeviceEventType::Measurement);
        assert_eq!(event.site_token.as_deref(), Some("s1"));
        assert!(event.specification_token.is_none());
        assert!(event.payload.is_null());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let parsed = serde_json::from_str::<DeviceEvent>(
            r#"{"hardware_id":"dev-1","event_type":"teleport"}"#,
        );

        assert!(parsed.is_err());
    }
}
