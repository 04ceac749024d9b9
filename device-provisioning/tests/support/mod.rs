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

use device_provisioning::inbound::{
    ChannelInboundEventSource, InboundEventSender, InboundProcessingStrategy,
};
use device_provisioning::{
    assemble, Collaborators, ProvisioningAssembly, ProvisioningConfig, ProvisioningOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[allow(dead_code)]
pub(crate) struct Harness {
    pub(crate) assembly: ProvisioningAssembly,
    pub(crate) orchestrator: ProvisioningOrchestrator,
    pub(crate) sender: InboundEventSender,
}

pub(crate) fn config(source: &str) -> ProvisioningConfig {
    ProvisioningConfig::from_json5(source).expect("test configuration should be valid")
}

/// Assembles `config` behind a channel source named "test-source".
#[allow(dead_code)]
pub(crate) fn make_harness(config: &ProvisioningConfig, collaborators: &Collaborators) -> Harness {
    let assembly = assemble(config, collaborators).expect("assembly should succeed");
    let inbound: Arc<dyn InboundProcessingStrategy> = assembly.inbound.clone();
    let (source, sender) = ChannelInboundEventSource::new("test-source", inbound, 64)
        .expect("source creation should succeed");
    let orchestrator = assembly
        .orchestrator_builder("test-orchestrator")
        .with_inbound_source(Arc::new(source))
        .with_stop_timeout(Duration::from_secs(10))
        .build();

    Harness {
        assembly,
        orchestrator,
        sender,
    }
}

#[allow(dead_code)]
pub(crate) async fn start_harness(
    config: &ProvisioningConfig,
    collaborators: &Collaborators,
) -> Harness {
    let harness = make_harness(config, collaborators);
    harness
        .orchestrator
        .start()
        .await
        .expect("orchestrator should start");
    harness
}

#[allow(dead_code)]
pub(crate) async fn assert_clean_stop(orchestrator: &ProvisioningOrchestrator) {
    let report = orchestrator.stop().await;
    assert!(
        report.is_clean(),
        "unexpected stop failures: {:?}",
        report.failures().collect::<Vec<_>>()
    );
}
