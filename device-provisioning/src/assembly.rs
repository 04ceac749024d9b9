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

//! Turns a validated [`ProvisioningConfig`] into concrete components.
//!
//! Sinks, evaluators and the optional persistence hook are external
//! collaborators; they are looked up by name in [`Collaborators`].

use crate::command::{
    CommandDestination, DefaultCommandProcessingStrategy, OutboundCommandRouter,
    PatternCommandRouter, RouteRule, SingleChoiceCommandRouter,
};
use crate::config::{
    CommandDestinationConfig, CommandRouterConfig, FilterConfig, MulticasterConfig,
    OutboundProcessorConfig, ProvisioningConfig, RouteBuilderConfig,
};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::filtering::{
    DeviceDirectory, EventFilter, FilterChain, FilterEvaluator, Multicaster, RecipientEvaluator,
    RouteBuilder, RouteEvaluator, RouteTemplate, ScriptRef,
};
use crate::inbound::{
    BlockingQueueInboundProcessingStrategy, DefaultRegistrationManager, DeviceRecord,
    EventPersistence, InMemoryDeviceRegistry, RegistrationPipeline,
};
use crate::model::{DeviceEvent, EncodedCommand};
use crate::orchestrator::{ProvisioningOrchestrator, ProvisioningOrchestratorBuilder};
use crate::outbound::{BlockingQueueOutboundProcessingStrategy, OutboundEventProcessor};
use crate::sink::Sink;
use std::collections::HashMap;
use std::sync::Arc;

/// Externally supplied pieces the configuration refers to.
#[derive(Clone, Default)]
pub struct Collaborators {
    event_sinks: HashMap<String, Arc<dyn Sink<DeviceEvent>>>,
    command_sinks: HashMap<String, Arc<dyn Sink<EncodedCommand>>>,
    filter_evaluator: Option<Arc<dyn FilterEvaluator>>,
    route_evaluator: Option<Arc<dyn RouteEvaluator>>,
    recipient_evaluator: Option<Arc<dyn RecipientEvaluator>>,
    directory: Option<Arc<dyn DeviceDirectory>>,
    persistence: Option<Arc<dyn EventPersistence>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_sink(
        mut self,
        name: impl Into<String>,
        sink: Arc<dyn Sink<DeviceEvent>>,
    ) -> Self {
        self.event_sinks.insert(name.into(), sink);
        self
    }

    pub fn with_command_sink(
        mut self,
        name: impl Into<String>,
        sink: Arc<dyn Sink<EncodedCommand>>,
    ) -> Self {
        self.command_sinks.insert(name.into(), sink);
        self
    }

    pub fn with_filter_evaluator(mut self, evaluator: Arc<dyn FilterEvaluator>) -> Self {
        self.filter_evaluator = Some(evaluator);
        self
    }

    pub fn with_route_evaluator(mut self, evaluator: Arc<dyn RouteEvaluator>) -> Self {
        self.route_evaluator = Some(evaluator);
        self
    }

    pub fn with_recipient_evaluator(mut self, evaluator: Arc<dyn RecipientEvaluator>) -> Self {
        self.recipient_evaluator = Some(evaluator);
        self
    }

    /// Overrides the device registry as the multicaster's device directory.
    pub fn with_device_directory(mut self, directory: Arc<dyn DeviceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn EventPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    fn event_sink(&self, name: &str, processor: &str) -> ProvisioningResult<Arc<dyn Sink<DeviceEvent>>> {
        self.event_sinks.get(name).cloned().ok_or_else(|| {
            ProvisioningError::Configuration(format!(
                "outbound processor '{processor}' references unknown event sink '{name}'"
            ))
        })
    }

    fn command_sink(
        &self,
        name: &str,
        destination: &str,
    ) -> ProvisioningResult<Arc<dyn Sink<EncodedCommand>>> {
        self.command_sinks.get(name).cloned().ok_or_else(|| {
            ProvisioningError::Configuration(format!(
                "command destination '{destination}' references unknown command sink '{name}'"
            ))
        })
    }

    fn require<T: ?Sized>(
        evaluator: &Option<Arc<T>>,
        what: &str,
        processor: &str,
    ) -> ProvisioningResult<Arc<T>> {
        evaluator.clone().ok_or_else(|| {
            ProvisioningError::Configuration(format!(
                "outbound processor '{processor}' uses a {what} but no {what} evaluator was supplied"
            ))
        })
    }
}

/// Every component built from one configuration.
pub struct ProvisioningAssembly {
    pub registry: Arc<InMemoryDeviceRegistry>,
    pub registration: Arc<DefaultRegistrationManager>,
    pub outbound: Arc<BlockingQueueOutboundProcessingStrategy>,
    pub inbound: Arc<BlockingQueueInboundProcessingStrategy>,
    pub command_strategy: Arc<DefaultCommandProcessingStrategy>,
    pub router: Arc<dyn OutboundCommandRouter>,
    pub destinations: Vec<Arc<CommandDestination>>,
}

impl ProvisioningAssembly {
    /// Orchestrator builder with every assembled component attached.
    /// Inbound sources are added by the caller.
    pub fn orchestrator_builder(&self, name: impl Into<String>) -> ProvisioningOrchestratorBuilder {
        ProvisioningOrchestrator::builder(name)
            .with_command_strategy(self.command_strategy.clone())
            .with_command_destinations(self.destinations.iter().cloned())
            .with_command_router(self.router.clone())
            .with_outbound_strategy(self.outbound.clone())
            .with_registration_manager(self.registration.clone())
            .with_inbound_strategy(self.inbound.clone())
    }
}

pub fn assemble(
    config: &ProvisioningConfig,
    collaborators: &Collaborators,
) -> ProvisioningResult<ProvisioningAssembly> {
    config.validate()?;

    let registry = Arc::new(InMemoryDeviceRegistry::with_devices(
        config.registration.devices.iter().map(|device| {
            DeviceRecord::new(
                device.hardware_id.clone(),
                device.site.clone(),
                device.specification.clone(),
            )
        }),
    ));
    let registration = Arc::new(DefaultRegistrationManager::new(
        registry.clone(),
        config.registration.auto_register,
    ));
    let directory: Arc<dyn DeviceDirectory> = match &collaborators.directory {
        Some(directory) => directory.clone(),
        None => registry.clone(),
    };

    let processors = config
        .outbound_processors
        .iter()
        .map(|processor| build_processor(processor, collaborators, &directory).map(Arc::new))
        .collect::<ProvisioningResult<Vec<_>>>()?;
    let outbound = Arc::new(BlockingQueueOutboundProcessingStrategy::new(
        processors,
        config.queues.outbound.settings(),
        config.queues.lanes.settings(),
    )?);

    let mut pipeline = RegistrationPipeline::new(registration.clone(), outbound.clone());
    if let Some(persistence) = &collaborators.persistence {
        pipeline = pipeline.with_persistence(persistence.clone());
    }
    let inbound = Arc::new(BlockingQueueInboundProcessingStrategy::new(
        Arc::new(pipeline),
        config.queues.inbound.settings(),
    )?);

    let destinations = config
        .command_destinations
        .iter()
        .map(|destination| build_destination(destination, config, collaborators).map(Arc::new))
        .collect::<ProvisioningResult<Vec<_>>>()?;
    let router = build_router(&config.command_router)?;
    let command_strategy = Arc::new(DefaultCommandProcessingStrategy::new(
        config.queues.commands.workers,
        config.queues.commands.settings(),
    )?);

    Ok(ProvisioningAssembly {
        registry,
        registration,
        outbound,
        inbound,
        command_strategy,
        router,
        destinations,
    })
}

fn build_processor(
    config: &OutboundProcessorConfig,
    collaborators: &Collaborators,
    directory: &Arc<dyn DeviceDirectory>,
) -> ProvisioningResult<OutboundEventProcessor> {
    let name = config.name.as_str();
    let sink = collaborators.event_sink(&config.sink, name)?;

    let mut filters = FilterChain::default();
    for filter in &config.filters {
        filters.push(match filter {
            FilterConfig::SiteFilter { site, operation } => EventFilter::site(site, *operation),
            FilterConfig::SpecificationFilter {
                specification,
                operation,
            } => EventFilter::specification(specification, *operation),
            FilterConfig::ScriptFilter {
                script_path,
                operation,
            } => EventFilter::script(
                ScriptRef::new(script_path),
                *operation,
                Collaborators::require(&collaborators.filter_evaluator, "script filter", name)?,
            ),
        });
    }

    let mut processor = OutboundEventProcessor::new(name, sink).with_filters(filters);

    if let Some(multicaster) = &config.multicaster {
        processor = processor.with_multicaster(match multicaster {
            MulticasterConfig::AllWithSpecification {
                specification,
                script_path: None,
            } => Multicaster::all_with_specification(specification, directory.clone()),
            MulticasterConfig::AllWithSpecification {
                specification,
                script_path: Some(script_path),
            } => Multicaster::all_with_specification(specification, directory.clone())
                .with_recipient_script(
                    ScriptRef::new(script_path),
                    Collaborators::require(
                        &collaborators.recipient_evaluator,
                        "recipient script",
                        name,
                    )?,
                ),
            MulticasterConfig::Fixed { recipients } => Multicaster::Fixed(recipients.clone()),
        });
    }

    if let Some(route_builder) = &config.route_builder {
        processor = processor.with_route_builder(match route_builder {
            RouteBuilderConfig::Template { template } => RouteBuilder::template(template)?,
            RouteBuilderConfig::Script { script_path } => RouteBuilder::Script {
                script: ScriptRef::new(script_path),
                evaluator: Collaborators::require(
                    &collaborators.route_evaluator,
                    "route script",
                    name,
                )?,
            },
        });
    }

    Ok(processor)
}

fn build_destination(
    config: &CommandDestinationConfig,
    provisioning: &ProvisioningConfig,
    collaborators: &Collaborators,
) -> ProvisioningResult<CommandDestination> {
    let sink = collaborators.command_sink(&config.sink, &config.id)?;
    let mut destination = CommandDestination::new(config.id.clone(), sink)
        .with_lane(provisioning.queues.lanes.settings())
        .with_shutdown_grace(provisioning.queues.commands.settings().shutdown_grace);
    if let Some(route) = &config.route {
        destination = destination.with_route(RouteTemplate::parse(route)?);
    }
    for (key, value) in &config.parameters {
        destination = destination.with_parameter(key.clone(), value.clone());
    }
    Ok(destination)
}

fn build_router(config: &CommandRouterConfig) -> ProvisioningResult<Arc<dyn OutboundCommandRouter>> {
    match config {
        CommandRouterConfig::SingleChoice { destination } => {
            let router = match destination {
                Some(id) => SingleChoiceCommandRouter::new().with_destination(id.clone()),
                None => SingleChoiceCommandRouter::new(),
            };
            Ok(Arc::new(router))
        }
        CommandRouterConfig::Pattern {
            selector,
            rules,
            default_destination,
        } => {
            let rules = rules
                .iter()
                .map(|rule| RouteRule::new(&rule.pattern, rule.destination.clone()))
                .collect::<ProvisioningResult<Vec<_>>>()?;
            let mut router = PatternCommandRouter::new(*selector, rules);
            if let Some(id) = default_destination {
                router = router.with_default_destination(id.clone());
            }
            Ok(Arc::new(router))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{assemble, Collaborators};
    use crate::config::ProvisioningConfig;
    use crate::error::ProvisioningError;
    use crate::sink::LoggingSink;
    use std::sync::Arc;

    fn config(source: &str) -> ProvisioningConfig {
        ProvisioningConfig::from_json5(source).expect("config parses")
    }

    fn logging_collaborators() -> Collaborators {
        Collaborators::new()
            .with_event_sink("events", Arc::new(LoggingSink::new("events")))
            .with_command_sink("commands", Arc::new(LoggingSink::new("commands")))
    }

    #[test]
    fn assembles_every_configured_component() {
        let config = config(
            r#"{
                registration: { devices: [{ hardware_id: "dev-1", specification: "spec-a" }] },
                outbound_processors: [
                    { name: "a", sink: "events", filters: [{ type: "site-filter", site: "s1" }] },
                    { name: "b", sink: "events", multicaster: { type: "fixed", recipients: ["x"] } },
                ],
                command_destinations: [{ id: "mqtt", sink: "commands" }],
            }"#,
        );

        let assembly = assemble(&config, &logging_collaborators()).expect("assembles");

        let names: Vec<&str> = assembly.outbound.processors().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(assembly.destinations.len(), 1);
        assert_eq!(assembly.command_strategy.workers(), 4);
    }

    #[test]
    fn unknown_sink_is_a_configuration_error() {
        let config = config(
            r#"{
                outbound_processors: [{ name: "a", sink: "missing" }],
                command_destinations: [{ id: "mqtt", sink: "commands" }],
            }"#,
        );

        let err = assemble(&config, &logging_collaborators())
            .err()
            .expect("sink is missing");

        assert!(matches!(err, ProvisioningError::Configuration(ref m) if m.contains("'missing'")));
    }

    #[test]
    fn script_filter_without_evaluator_is_a_configuration_error() {
        let config = config(
            r#"{
                outbound_processors: [{
                    name: "a",
                    sink: "events",
                    filters: [{ type: "script-filter", script_path: "filters/odd.groovy" }],
                }],
                command_destinations: [{ id: "mqtt", sink: "commands" }],
            }"#,
        );

        let err = assemble(&config, &logging_collaborators())
            .err()
            .expect("no evaluator");

        assert!(matches!(err, ProvisioningError::Configuration(ref m) if m.contains("script filter")));
    }
}
