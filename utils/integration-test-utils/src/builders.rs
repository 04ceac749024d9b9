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

use chrono::{Duration as ChronoDuration, Utc};
use device_provisioning::{CommandInvocation, DeviceCommand, DeviceEvent, DeviceEventType};
use serde_json::json;
use uuid::Uuid;

pub const SITE_1: &str = "site-1";
pub const SITE_2: &str = "site-2";
pub const SPEC_THERMOSTAT: &str = "thermostat";

pub fn event(hardware_id: &str) -> DeviceEvent {
    DeviceEvent::new(hardware_id, DeviceEventType::Measurement)
        .with_specification(SPEC_THERMOSTAT)
        .with_payload(json!({ "temperature": 21.5 }))
}

pub fn event_at_site(hardware_id: &str, site: &str) -> DeviceEvent {
    event(hardware_id).with_site(site)
}

/// Events for one device with strictly increasing timestamps and a `seq` payload.
pub fn sequenced_events(hardware_id: &str, site: &str, count: usize) -> Vec<DeviceEvent> {
    let base = Utc::now();
    (0..count)
        .map(|seq| {
            let mut event = event_at_site(hardware_id, site)
                .with_payload(json!({ "seq": seq }))
                .with_metadata("seq", seq.to_string());
            event.occurred_at = base + ChronoDuration::milliseconds(seq as i64);
            event
        })
        .collect()
}

/// Reads back the `seq` payload written by [`sequenced_events`].
pub fn sequence_of(event: &DeviceEvent) -> Option<u64> {
    event.payload.get("seq").and_then(|seq| seq.as_u64())
}

pub fn command(hardware_id: &str, name: &str, protocol: Option<&str>) -> CommandInvocation {
    let invocation = CommandInvocation::new(
        hardware_id,
        DeviceCommand {
            token: Uuid::new_v4().to_string(),
            name: name.to_string(),
            namespace: None,
        },
    );
    match protocol {
        Some(protocol) => invocation.with_protocol(protocol),
        None => invocation,
    }
}
