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

use async_trait::async_trait;
use device_provisioning::inbound::InboundEventSource;
use device_provisioning::{
    CommandDestination, CommandExecution, LifecycleComponent, LifecycleError, LifecycleState,
    LifecycleStatus, OutboundCommandRouter, ProvisioningError, ProvisioningResult,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Command router whose initialization always fails.
pub struct FaultyRouter {
    status: LifecycleStatus,
    initialize_calls: AtomicU64,
}

impl FaultyRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            status: LifecycleStatus::new("faulty-router"),
            initialize_calls: AtomicU64::new(0),
        })
    }

    pub fn initialize_calls(&self) -> u64 {
        self.initialize_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LifecycleComponent for FaultyRouter {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.status.begin_start()?;
        self.status.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        if self.status.begin_stop()? {
            self.status.mark_stopped();
        }
        Ok(())
    }
}

impl OutboundCommandRouter for FaultyRouter {
    fn initialize(&self, _destinations: &[Arc<CommandDestination>]) -> ProvisioningResult<()> {
        self.initialize_calls.fetch_add(1, Ordering::Relaxed);
        Err(ProvisioningError::Configuration(
            "faulty router cannot be initialized".to_string(),
        ))
    }

    fn route(&self, execution: &CommandExecution) -> ProvisioningResult<Vec<Arc<CommandDestination>>> {
        Err(ProvisioningError::Routing(format!(
            "faulty router has no route for '{}'",
            execution.hardware_id
        )))
    }
}

/// Inbound source that counts lifecycle calls and fails on demand.
pub struct FaultyComponent {
    status: LifecycleStatus,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    start_calls: AtomicU64,
    stop_calls: AtomicU64,
}

impl FaultyComponent {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            status: LifecycleStatus::new(name),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            start_calls: AtomicU64::new(0),
            stop_calls: AtomicU64::new(0),
        })
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::Relaxed);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::Relaxed);
    }

    pub fn start_calls(&self) -> u64 {
        self.start_calls.load(Ordering::Relaxed)
    }

    pub fn stop_calls(&self) -> u64 {
        self.stop_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LifecycleComponent for FaultyComponent {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.start_calls.fetch_add(1, Ordering::Relaxed);
        self.status.begin_start()?;
        if self.fail_start.load(Ordering::Relaxed) {
            self.status.mark_error();
            return Err(LifecycleError::StartFailed {
                component: self.status.component().to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        self.status.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        self.stop_calls.fetch_add(1, Ordering::Relaxed);
        if !self.status.begin_stop()? {
            return Ok(());
        }
        self.status.mark_stopped();
        if self.fail_stop.load(Ordering::Relaxed) {
            return Err(LifecycleError::StopFailed {
                component: self.status.component().to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

impl InboundEventSource for FaultyComponent {
    fn events_forwarded(&self) -> u64 {
        0
    }
}
