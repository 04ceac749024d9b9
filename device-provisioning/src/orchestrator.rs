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

//! Provisioning orchestrator: owns every subsystem's lifecycle and exposes
//! the command-delivery entry points.
//!
//! Startup walks the dependency order command strategy, destinations,
//! router, outbound strategy, registration, inbound strategy, sources.
//! Sources go last because they begin producing as soon as they start.
//! A failed step leaves everything that already started running; the
//! caller is expected to call [`ProvisioningOrchestrator::stop`].

use crate::command::{CommandDestination, CommandProcessingStrategy, OutboundCommandRouter};
use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::inbound::{InboundEventSource, InboundProcessingStrategy, RegistrationManager};
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::{CommandInvocation, SystemCommand};
use crate::observability::events;
use crate::outbound::OutboundProcessingStrategy;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "orchestrator";
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// How one component's stop step ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    Failed(LifecycleError),
    TimedOut(Duration),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopStep {
    pub component: String,
    pub outcome: StopOutcome,
}

/// Every stop step in the order it ran.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    pub steps: Vec<StopStep>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StopStep> {
        self.steps
            .iter()
            .filter(|step| step.outcome != StopOutcome::Stopped)
    }

    pub fn components(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.component.as_str()).collect()
    }
}

pub struct ProvisioningOrchestratorBuilder {
    name: String,
    command_strategy: Option<Arc<dyn CommandProcessingStrategy>>,
    router: Option<Arc<dyn OutboundCommandRouter>>,
    outbound: Option<Arc<dyn OutboundProcessingStrategy>>,
    registration: Option<Arc<dyn RegistrationManager>>,
    inbound: Option<Arc<dyn InboundProcessingStrategy>>,
    destinations: Vec<Arc<CommandDestination>>,
    sources: Vec<Arc<dyn InboundEventSource>>,
    stop_timeout: Duration,
}

impl ProvisioningOrchestratorBuilder {
    pub fn with_command_strategy(mut self, strategy: Arc<dyn CommandProcessingStrategy>) -> Self {
        self.command_strategy = Some(strategy);
        self
    }

    pub fn with_command_router(mut self, router: Arc<dyn OutboundCommandRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_outbound_strategy(mut self, strategy: Arc<dyn OutboundProcessingStrategy>) -> Self {
        self.outbound = Some(strategy);
        self
    }

    pub fn with_registration_manager(mut self, manager: Arc<dyn RegistrationManager>) -> Self {
        self.registration = Some(manager);
        self
    }

    pub fn with_inbound_strategy(mut self, strategy: Arc<dyn InboundProcessingStrategy>) -> Self {
        self.inbound = Some(strategy);
        self
    }

    pub fn with_command_destination(mut self, destination: Arc<CommandDestination>) -> Self {
        self.destinations.push(destination);
        self
    }

    pub fn with_command_destinations(
        mut self,
        destinations: impl IntoIterator<Item = Arc<CommandDestination>>,
    ) -> Self {
        self.destinations.extend(destinations);
        self
    }

    pub fn with_inbound_source(mut self, source: Arc<dyn InboundEventSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Upper bound for each component's stop step.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Missing required components are reported by `start`, not here.
    pub fn build(self) -> ProvisioningOrchestrator {
        ProvisioningOrchestrator {
            status: LifecycleStatus::new(self.name),
            command_strategy: self.command_strategy,
            router: self.router,
            outbound: self.outbound,
            registration: self.registration,
            inbound: self.inbound,
            destinations: self.destinations,
            sources: self.sources,
            stop_timeout: self.stop_timeout,
        }
    }
}

struct RequiredComponents<'a> {
    command_strategy: &'a Arc<dyn CommandProcessingStrategy>,
    router: &'a Arc<dyn OutboundCommandRouter>,
    outbound: &'a Arc<dyn OutboundProcessingStrategy>,
    registration: &'a Arc<dyn RegistrationManager>,
    inbound: &'a Arc<dyn InboundProcessingStrategy>,
}

pub struct ProvisioningOrchestrator {
    status: LifecycleStatus,
    command_strategy: Option<Arc<dyn CommandProcessingStrategy>>,
    router: Option<Arc<dyn OutboundCommandRouter>>,
    outbound: Option<Arc<dyn OutboundProcessingStrategy>>,
    registration: Option<Arc<dyn RegistrationManager>>,
    inbound: Option<Arc<dyn InboundProcessingStrategy>>,
    destinations: Vec<Arc<CommandDestination>>,
    sources: Vec<Arc<dyn InboundEventSource>>,
    stop_timeout: Duration,
}

impl ProvisioningOrchestrator {
    pub fn builder(name: impl Into<String>) -> ProvisioningOrchestratorBuilder {
        ProvisioningOrchestratorBuilder {
            name: name.into(),
            command_strategy: None,
            router: None,
            outbound: None,
            registration: None,
            inbound: None,
            destinations: Vec::new(),
            sources: Vec::new(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn name(&self) -> &str {
        self.status.component()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.get()
    }

    pub fn command_destinations(&self) -> &[Arc<CommandDestination>] {
        &self.destinations
    }

    /// Starts every subsystem in dependency order.
    pub async fn start(&self) -> ProvisioningResult<()> {
        self.status.begin_start()?;

        let required = match self.required() {
            Ok(required) => required,
            Err(err) => {
                self.status.mark_error();
                error!(
                    event = events::LIFECYCLE_START_FAILED,
                    component = COMPONENT,
                    orchestrator = self.name(),
                    err = %err,
                    "orchestrator is missing required components"
                );
                return Err(err);
            }
        };

        match self.run_startup(&required).await {
            Ok(()) => {
                self.status.mark_started();
                info!(
                    event = events::LIFECYCLE_START_OK,
                    component = COMPONENT,
                    orchestrator = self.name(),
                    destinations = self.destinations.len(),
                    sources = self.sources.len(),
                    "provisioning started"
                );
                Ok(())
            }
            Err(err) => {
                self.status.mark_error();
                Err(err)
            }
        }
    }

    /// Stops every subsystem, sources first. Never fails and never skips a
    /// step; problems are collected in the returned report.
    pub async fn stop(&self) -> StopReport {
        match self.status.begin_stop() {
            Ok(true) => {}
            Ok(false) => return StopReport::default(),
            Err(err) => {
                warn!(
                    event = events::LIFECYCLE_STOP_FAILED,
                    component = COMPONENT,
                    orchestrator = self.name(),
                    err = %err,
                    "orchestrator stop ignored"
                );
                return StopReport::default();
            }
        }

        let mut report = StopReport::default();
        for source in &self.sources {
            self.stop_step(source.as_ref(), &mut report).await;
        }
        if let Some(inbound) = &self.inbound {
            self.stop_step(inbound.as_ref(), &mut report).await;
        }
        if let Some(outbound) = &self.outbound {
            self.stop_step(outbound.as_ref(), &mut report).await;
        }
        if let Some(strategy) = &self.command_strategy {
            self.stop_step(strategy.as_ref(), &mut report).await;
        }
        for destination in &self.destinations {
            self.stop_step(destination.as_ref(), &mut report).await;
        }
        if let Some(registration) = &self.registration {
            self.stop_step(registration.as_ref(), &mut report).await;
        }
        if let Some(router) = &self.router {
            self.stop_step(router.as_ref(), &mut report).await;
        }

        self.status.mark_stopped();
        info!(
            event = events::LIFECYCLE_STOP_OK,
            component = COMPONENT,
            orchestrator = self.name(),
            steps = report.steps.len(),
            failures = report.failures().count(),
            "provisioning stopped"
        );
        report
    }

    /// Accepted once routed and queued; physical delivery happens later.
    pub async fn deliver_command(&self, invocation: CommandInvocation) -> ProvisioningResult<()> {
        self.status.ensure_started()?;
        let (strategy, router) = self.command_path()?;
        strategy.deliver_command(router.as_ref(), invocation).await
    }

    pub async fn deliver_system_command(
        &self,
        hardware_id: &str,
        command: SystemCommand,
    ) -> ProvisioningResult<()> {
        self.status.ensure_started()?;
        let (strategy, router) = self.command_path()?;
        strategy
            .deliver_system_command(router.as_ref(), hardware_id, command)
            .await
    }

    fn command_path(
        &self,
    ) -> ProvisioningResult<(
        &Arc<dyn CommandProcessingStrategy>,
        &Arc<dyn OutboundCommandRouter>,
    )> {
        match (&self.command_strategy, &self.router) {
            (Some(strategy), Some(router)) => Ok((strategy, router)),
            _ => Err(ProvisioningError::configuration(
                "command path requires a command processing strategy and a command router",
            )),
        }
    }

    fn required(&self) -> ProvisioningResult<RequiredComponents<'_>> {
        match (
            &self.command_strategy,
            &self.router,
            &self.outbound,
            &self.registration,
            &self.inbound,
        ) {
            (
                Some(command_strategy),
                Some(router),
                Some(outbound),
                Some(registration),
                Some(inbound),
            ) => Ok(RequiredComponents {
                command_strategy,
                router,
                outbound,
                registration,
                inbound,
            }),
            _ => {
                let missing: Vec<&str> = [
                    ("command processing strategy", self.command_strategy.is_none()),
                    ("outbound command router", self.router.is_none()),
                    ("outbound processing strategy", self.outbound.is_none()),
                    ("registration manager", self.registration.is_none()),
                    ("inbound processing strategy", self.inbound.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name))
                .collect();
                Err(ProvisioningError::Configuration(format!(
                    "orchestrator '{}' is missing: {}",
                    self.name(),
                    missing.join(", ")
                )))
            }
        }
    }

    async fn run_startup(&self, required: &RequiredComponents<'_>) -> ProvisioningResult<()> {
        self.start_step(required.command_strategy.as_ref()).await?;
        for destination in &self.destinations {
            self.start_step(destination.as_ref()).await?;
        }

        debug!(
            event = events::LIFECYCLE_START_STEP,
            component = COMPONENT,
            orchestrator = self.name(),
            step = "initialize",
            target = required.router.component_name(),
            destinations = self.destinations.len(),
            "initializing command router"
        );
        if let Err(err) = required.router.initialize(&self.destinations) {
            error!(
                event = events::LIFECYCLE_START_FAILED,
                component = COMPONENT,
                orchestrator = self.name(),
                step = "initialize",
                target = required.router.component_name(),
                err = %err,
                "command router initialization failed"
            );
            return Err(err);
        }
        self.start_step(required.router.as_ref()).await?;

        self.start_step(required.outbound.as_ref()).await?;
        self.start_step(required.registration.as_ref()).await?;
        self.start_step(required.inbound.as_ref()).await?;
        for source in &self.sources {
            self.start_step(source.as_ref()).await?;
        }
        Ok(())
    }

    async fn start_step<C>(&self, target: &C) -> ProvisioningResult<()>
    where
        C: LifecycleComponent + ?Sized,
    {
        debug!(
            event = events::LIFECYCLE_START_STEP,
            component = COMPONENT,
            orchestrator = self.name(),
            step = "start",
            target = target.component_name(),
            "starting component"
        );
        target.start().await.map_err(|err| {
            error!(
                event = events::LIFECYCLE_START_FAILED,
                component = COMPONENT,
                orchestrator = self.name(),
                step = "start",
                target = target.component_name(),
                err = %err,
                "component failed to start"
            );
            ProvisioningError::from(err)
        })
    }

    async fn stop_step<C>(&self, target: &C, report: &mut StopReport)
    where
        C: LifecycleComponent + ?Sized,
    {
        debug!(
            event = events::LIFECYCLE_STOP_STEP,
            component = COMPONENT,
            orchestrator = self.name(),
            target = target.component_name(),
            "stopping component"
        );
        let outcome = match tokio::time::timeout(self.stop_timeout, target.stop()).await {
            Ok(Ok(())) => StopOutcome::Stopped,
            Ok(Err(err)) => {
                warn!(
                    event = events::LIFECYCLE_STOP_FAILED,
                    component = COMPONENT,
                    orchestrator = self.name(),
                    target = target.component_name(),
                    err = %err,
                    "component failed to stop"
                );
                StopOutcome::Failed(err)
            }
            Err(_) => {
                warn!(
                    event = events::LIFECYCLE_STOP_FAILED,
                    component = COMPONENT,
                    orchestrator = self.name(),
                    target = target.component_name(),
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "component did not stop in time"
                );
                StopOutcome::TimedOut(self.stop_timeout)
            }
        };
        report.steps.push(StopStep {
            component: target.component_name().to_string(),
            outcome,
        });
    }
}
