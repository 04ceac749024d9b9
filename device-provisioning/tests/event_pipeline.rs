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

use device_provisioning::{Collaborators, DeviceEvent, EncodedCommand};
use integration_test_utils::{
    event_at_site, sequence_of, sequenced_events, FailingSink, GatedSink, RecordingSink, SITE_1,
    SITE_2,
};
use support::DELIVERY_TIMEOUT;

const SITE_FILTER_CONFIG: &str = r#"{
    outbound_processors: [
        {
            name: "site-1-only",
            sink: "site-1",
            filters: [{ type: "site-filter", site: "site-1", operation: "include" }],
        },
    ],
    command_destinations: [{ id: "mqtt", sink: "commands" }],
}"#;

fn command_collaborators() -> Collaborators {
    Collaborators::new().with_command_sink("commands", RecordingSink::<EncodedCommand>::new("commands"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn site_filter_delivers_only_matching_events() {
    integration_test_utils::init_logging();

    let site_1 = RecordingSink::<DeviceEvent>::new("site-1");
    let harness = support::start_harness(
        &support::config(SITE_FILTER_CONFIG),
        &command_collaborators().with_event_sink("site-1", site_1.clone()),
    )
    .await;

    harness
        .sender
        .send(event_at_site("dev-2", SITE_2))
        .await
        .expect("send");
    harness
        .sender
        .send(event_at_site("dev-1", SITE_1))
        .await
        .expect("send");

    assert!(site_1.wait_for(1, DELIVERY_TIMEOUT).await);
    let processed = integration_test_utils::wait_until(DELIVERY_TIMEOUT, || {
        harness
            .assembly
            .outbound
            .processors()
            .all(|processor| processor.stats().processed == 2)
    })
    .await;
    assert!(processed, "both events should reach the processor");

    let delivered = site_1.items();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].hardware_id, "dev-1");
    assert_eq!(delivered[0].site_token.as_deref(), Some(SITE_1));

    support::assert_clean_stop(&harness.orchestrator).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_from_one_source_reach_a_sink_in_order() {
    integration_test_utils::init_logging();

    let site_1 = RecordingSink::<DeviceEvent>::new("site-1");
    let harness = support::start_harness(
        &support::config(SITE_FILTER_CONFIG),
        &command_collaborators().with_event_sink("site-1", site_1.clone()),
    )
    .await;

    for event in sequenced_events("dev-1", SITE_1, 50) {
        harness.sender.send(event).await.expect("send");
    }

    assert!(site_1.wait_for(50, DELIVERY_TIMEOUT).await);
    let sequence: Vec<u64> = site_1.items().iter().filter_map(sequence_of).collect();
    assert_eq!(sequence, (0..50).collect::<Vec<u64>>());

    support::assert_clean_stop(&harness.orchestrator).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multicast_renders_one_route_per_recipient() {
    integration_test_utils::init_logging();

    let alerts = RecordingSink::<DeviceEvent>::new("alerts");
    let config = support::config(
        r#"{
            registration: {
                devices: [
                    { hardware_id: "thermostat-1", site: "site-1", specification: "thermostat" },
                    { hardware_id: "thermostat-2", site: "site-1", specification: "thermostat" },
                    { hardware_id: "meter-1", site: "site-1", specification: "meter" },
                ],
            },
            outbound_processors: [
                {
                    name: "thermostat-fanout",
                    sink: "alerts",
                    multicaster: { type: "all-with-specification", specification: "thermostat" },
                    route_builder: {
                        type: "template",
                        template: "sites/{site}/devices/{recipient}/{event_type}",
                    },
                },
            ],
            command_destinations: [{ id: "mqtt", sink: "commands" }],
        }"#,
    );
    let harness =
        support::start_harness(&config, &command_collaborators().with_event_sink("alerts", alerts.clone()))
            .await;

    harness
        .sender
        .send(event_at_site("meter-1", SITE_1))
        .await
        .expect("send");

    assert!(alerts.wait_for(2, DELIVERY_TIMEOUT).await);
    let mut routes: Vec<String> = alerts
        .deliveries()
        .into_iter()
        .filter_map(|(_, route)| route.route)
        .collect();
    routes.sort();
    assert_eq!(
        routes,
        vec![
            "sites/site-1/devices/thermostat-1/measurement".to_string(),
            "sites/site-1/devices/thermostat-2/measurement".to_string(),
        ]
    );

    support::assert_clean_stop(&harness.orchestrator).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_and_failing_sinks_do_not_stall_other_processors() {
    integration_test_utils::init_logging();

    let fast = RecordingSink::<DeviceEvent>::new("fast");
    let slow = GatedSink::<DeviceEvent>::new("slow");
    let failing = FailingSink::new("failing");
    let config = support::config(
        r#"{
            outbound_processors: [
                { name: "slow", sink: "slow" },
                { name: "failing", sink: "failing" },
                { name: "fast", sink: "fast" },
            ],
            command_destinations: [{ id: "mqtt", sink: "commands" }],
        }"#,
    );
    let harness = support::start_harness(
        &config,
        &command_collaborators()
            .with_event_sink("fast", fast.clone())
            .with_event_sink("slow", slow.clone())
            .with_event_sink("failing", failing.clone()),
    )
    .await;

    for event in sequenced_events("dev-1", SITE_1, 10) {
        harness.sender.send(event).await.expect("send");
    }

    assert!(fast.wait_for(10, DELIVERY_TIMEOUT).await);
    assert!(
        integration_test_utils::wait_until(DELIVERY_TIMEOUT, || failing.attempts() == 10).await
    );
    assert!(integration_test_utils::wait_until(DELIVERY_TIMEOUT, || slow.entered() == 1).await);
    assert!(slow.recorded().is_empty());

    slow.open();
    assert!(slow.recorded().wait_for(10, DELIVERY_TIMEOUT).await);

    let failures_counted = integration_test_utils::wait_until(DELIVERY_TIMEOUT, || {
        harness
            .assembly
            .outbound
            .stats()
            .processors
            .iter()
            .any(|lane| lane.name == "failing" && lane.processor.failed == 10)
    })
    .await;
    assert!(failures_counted, "every failed delivery should be counted");

    support::assert_clean_stop(&harness.orchestrator).await;
}
