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

mod support;

use device_provisioning::inbound::InboundProcessingStrategy;
use device_provisioning::{Collaborators, DeviceEvent, EncodedCommand, ProvisioningError};
use integration_test_utils::{sequenced_events, GatedSink, RecordingSink, SITE_1};
use std::sync::Arc;
use std::time::Duration;
use support::DELIVERY_TIMEOUT;

fn tiny_queues(inbound_overflow: &str) -> String {
    format!(
        r#"{{
            queues: {{
                inbound: {{ capacity: 1, overflow: "{inbound_overflow}" }},
                outbound: {{ capacity: 1, overflow: "block" }},
                lanes: {{ capacity: 1, overflow: "block" }},
            }},
            outbound_processors: [{{ name: "gated", sink: "gated" }}],
            command_destinations: [{{ id: "mqtt", sink: "commands" }}],
        }}"#
    )
}

fn gated_collaborators(gated: &Arc<GatedSink<DeviceEvent>>) -> Collaborators {
    Collaborators::new()
        .with_event_sink("gated", gated.clone())
        .with_command_sink("commands", RecordingSink::<EncodedCommand>::new("commands"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_blocking_queue_holds_the_producer_until_space_frees() {
    integration_test_utils::init_logging();

    let gated = GatedSink::<DeviceEvent>::new("gated");
    let harness = support::start_harness(
        &support::config(&tiny_queues("block")),
        &gated_collaborators(&gated),
    )
    .await;

    let inbound = harness.assembly.inbound.clone();
    let producer = tokio::spawn(async move {
        for event in sequenced_events("dev-1", SITE_1, 20) {
            inbound.add(event).await.expect("blocking add eventually succeeds");
        }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!producer.is_finished(), "producer should be blocked");
    assert!(gated.recorded().is_empty());

    gated.open();
    tokio::time::timeout(DELIVERY_TIMEOUT, producer)
        .await
        .expect("producer resumes once the sink drains")
        .expect("producer task");
    assert!(gated.recorded().wait_for(20, DELIVERY_TIMEOUT).await);
    assert_eq!(harness.assembly.inbound.stats().rejected, 0);

    support::assert_clean_stop(&harness.orchestrator).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_rejecting_queue_fails_fast_with_capacity_exceeded() {
    integration_test_utils::init_logging();

    let gated = GatedSink::<DeviceEvent>::new("gated");
    let harness = support::start_harness(
        &support::config(&tiny_queues("reject")),
        &gated_collaborators(&gated),
    )
    .await;

    let mut accepted = 0;
    let mut rejected = 0;
    for event in sequenced_events("dev-1", SITE_1, 20) {
        let added = tokio::time::timeout(Duration::from_secs(1), harness.assembly.inbound.add(event))
            .await
            .expect("a rejecting queue never blocks");
        match added {
            Ok(()) => accepted += 1,
            Err(ProvisioningError::CapacityExceeded { queue, capacity }) => {
                assert_eq!(queue, "inbound");
                assert_eq!(capacity, 1);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(rejected > 0, "some events should be rejected");
    assert_eq!(accepted + rejected, 20);
    assert_eq!(harness.assembly.inbound.stats().rejected, rejected);

    gated.open();
    assert!(gated.recorded().wait_for(accepted as usize, DELIVERY_TIMEOUT).await);

    support::assert_clean_stop(&harness.orchestrator).await;
}
