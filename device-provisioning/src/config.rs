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

//! Declarative provisioning configuration.
//!
//! The configuration is plain data. [`ProvisioningConfig::validate`] rejects
//! every missing or inconsistent attribute before anything is assembled, so
//! startup never falls back to a runtime default for a required value.

use crate::command::{RoutePattern, RouteSelector, DEFAULT_COMMAND_WORKERS};
use crate::data_plane::{OverflowPolicy, QueueSettings, DEFAULT_QUEUE_CAPACITY};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::filtering::{FilterOperation, RouteTemplate};
use crate::outbound::{LaneSettings, DEFAULT_LANE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ProvisioningConfig {
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub outbound_processors: Vec<OutboundProcessorConfig>,
    #[serde(default)]
    pub command_destinations: Vec<CommandDestinationConfig>,
    #[serde(default)]
    pub command_router: CommandRouterConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct QueuesConfig {
    #[serde(default)]
    pub inbound: QueueConfig,
    #[serde(default)]
    pub outbound: QueueConfig,
    /// Per-processor and per-command-destination delivery lanes.
    #[serde(default)]
    pub lanes: LaneConfig,
    #[serde(default)]
    pub commands: CommandQueueConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl QueueConfig {
    pub fn settings(&self) -> QueueSettings {
        QueueSettings::new(self.capacity, self.overflow)
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LaneConfig {
    #[serde(default = "default_lane_capacity")]
    pub capacity: usize,
    #[serde(default = "default_lane_overflow")]
    pub overflow: OverflowPolicy,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LANE_CAPACITY,
            overflow: default_lane_overflow(),
        }
    }
}

impl LaneConfig {
    pub fn settings(&self) -> LaneSettings {
        LaneSettings {
            capacity: self.capacity,
            overflow: self.overflow,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct CommandQueueConfig {
    #[serde(default = "default_command_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for CommandQueueConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_COMMAND_WORKERS,
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl CommandQueueConfig {
    pub fn settings(&self) -> QueueSettings {
        QueueSettings::new(self.capacity, self.overflow)
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegistrationConfig {
    /// Register unknown devices from the tokens their first event carries.
    #[serde(default = "default_auto_register")]
    pub auto_register: bool,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
            devices: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub hardware_id: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub specification: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct OutboundProcessorConfig {
    pub name: String,
    /// Name of an event sink supplied at assembly time.
    pub sink: String,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub multicaster: Option<MulticasterConfig>,
    #[serde(default)]
    pub route_builder: Option<RouteBuilderConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum FilterConfig {
    SiteFilter {
        site: String,
        #[serde(default)]
        operation: FilterOperation,
    },
    SpecificationFilter {
        specification: String,
        #[serde(default)]
        operation: FilterOperation,
    },
    ScriptFilter {
        script_path: String,
        #[serde(default)]
        operation: FilterOperation,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum MulticasterConfig {
    AllWithSpecification {
        specification: String,
        #[serde(default)]
        script_path: Option<String>,
    },
    Fixed {
        recipients: Vec<String>,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum RouteBuilderConfig {
    Template { template: String },
    Script { script_path: String },
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct CommandDestinationConfig {
    pub id: String,
    /// Name of a command sink supplied at assembly time.
    pub sink: String,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum CommandRouterConfig {
    SingleChoice {
        #[serde(default)]
        destination: Option<String>,
    },
    Pattern {
        #[serde(default)]
        selector: RouteSelector,
        rules: Vec<RouteRuleConfig>,
        #[serde(default)]
        default_destination: Option<String>,
    },
}

impl Default for CommandRouterConfig {
    fn default() -> Self {
        CommandRouterConfig::SingleChoice { destination: None }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouteRuleConfig {
    pub pattern: String,
    pub destination: String,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_lane_capacity() -> usize {
    DEFAULT_LANE_CAPACITY
}

fn default_lane_overflow() -> OverflowPolicy {
    OverflowPolicy::Reject
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

fn default_command_workers() -> usize {
    DEFAULT_COMMAND_WORKERS
}

fn default_auto_register() -> bool {
    true
}

fn require(value: &str, what: impl FnOnce() -> String) -> ProvisioningResult<()> {
    if value.trim().is_empty() {
        return Err(ProvisioningError::Configuration(format!(
            "{} must not be empty",
            what()
        )));
    }
    Ok(())
}

fn require_positive(value: usize, what: &str) -> ProvisioningResult<()> {
    if value == 0 {
        return Err(ProvisioningError::Configuration(format!(
            "{what} must be at least 1"
        )));
    }
    Ok(())
}

impl ProvisioningConfig {
    /// Parses and validates a json5 document.
    pub fn from_json5(source: &str) -> ProvisioningResult<Self> {
        let config: Self = json5::from_str(source).map_err(|err| {
            ProvisioningError::Configuration(format!("invalid provisioning configuration: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ProvisioningResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            ProvisioningError::Configuration(format!(
                "unable to read configuration '{}': {err}",
                path.display()
            ))
        })?;
        Self::from_json5(&contents)
    }

    /// Checks every required attribute and cross reference.
    pub fn validate(&self) -> ProvisioningResult<()> {
        self.validate_queues()?;

        for device in &self.registration.devices {
            require(&device.hardware_id, || {
                "registration.devices[].hardware_id".to_string()
            })?;
        }

        let mut processor_names = HashSet::new();
        for processor in &self.outbound_processors {
            processor.validate()?;
            if !processor_names.insert(processor.name.as_str()) {
                return Err(ProvisioningError::Configuration(format!(
                    "duplicate outbound processor name '{}'",
                    processor.name
                )));
            }
        }

        let mut destination_ids = HashSet::new();
        for destination in &self.command_destinations {
            destination.validate()?;
            if !destination_ids.insert(destination.id.as_str()) {
                return Err(ProvisioningError::Configuration(format!(
                    "duplicate command destination id '{}'",
                    destination.id
                )));
            }
        }

        self.validate_router(&destination_ids)
    }

    fn validate_queues(&self) -> ProvisioningResult<()> {
        let queues = &self.queues;
        require_positive(queues.inbound.capacity, "queues.inbound.capacity")?;
        require_positive(queues.outbound.capacity, "queues.outbound.capacity")?;
        require_positive(queues.lanes.capacity, "queues.lanes.capacity")?;
        require_positive(queues.commands.capacity, "queues.commands.capacity")?;
        require_positive(queues.commands.workers, "queues.commands.workers")
    }

    fn validate_router(&self, destination_ids: &HashSet<&str>) -> ProvisioningResult<()> {
        let known = |id: &str, referrer: &str| {
            if destination_ids.contains(id) {
                Ok(())
            } else {
                Err(ProvisioningError::Configuration(format!(
                    "{referrer} references unknown command destination '{id}'"
                )))
            }
        };

        match &self.command_router {
            CommandRouterConfig::SingleChoice { destination } => {
                if self.command_destinations.is_empty() {
                    return Err(ProvisioningError::Configuration(
                        "single-choice command router requires at least one command destination"
                            .to_string(),
                    ));
                }
                if let Some(id) = destination {
                    known(id, "single-choice command router")?;
                }
            }
            CommandRouterConfig::Pattern {
                rules,
                default_destination,
                ..
            } => {
                if rules.is_empty() && default_destination.is_none() {
                    return Err(ProvisioningError::Configuration(
                        "pattern command router needs at least one rule or a default destination"
                            .to_string(),
                    ));
                }
                for rule in rules {
                    RoutePattern::parse(&rule.pattern)?;
                    known(&rule.destination, &format!("route rule '{}'", rule.pattern))?;
                }
                if let Some(id) = default_destination {
                    known(id, "default route")?;
                }
            }
        }
        Ok(())
    }
}

impl OutboundProcessorConfig {
    fn validate(&self) -> ProvisioningResult<()> {
        require(&self.name, || "outbound processor name".to_string())?;
        require(&self.sink, || {
            format!("sink of outbound processor '{}'", self.name)
        })?;

        for filter in &self.filters {
            let (value, attribute) = match filter {
                FilterConfig::SiteFilter { site, .. } => (site, "site"),
                FilterConfig::SpecificationFilter { specification, .. } => {
                    (specification, "specification")
                }
                FilterConfig::ScriptFilter { script_path, .. } => (script_path, "script_path"),
            };
            require(value, || {
                format!("filter attribute '{attribute}' of processor '{}'", self.name)
            })?;
        }

        match &self.multicaster {
            Some(MulticasterConfig::AllWithSpecification {
                specification,
                script_path,
            }) => {
                require(specification, || {
                    format!("multicaster specification of processor '{}'", self.name)
                })?;
                if let Some(script_path) = script_path {
                    require(script_path, || {
                        format!("multicaster script_path of processor '{}'", self.name)
                    })?;
                }
            }
            Some(MulticasterConfig::Fixed { recipients }) => {
                if recipients.is_empty() {
                    return Err(ProvisioningError::Configuration(format!(
                        "fixed multicaster of processor '{}' has no recipients",
                        self.name
                    )));
                }
            }
            None => {}
        }

        match &self.route_builder {
            Some(RouteBuilderConfig::Template { template }) => {
                require(template, || {
                    format!("route template of processor '{}'", self.name)
                })?;
                RouteTemplate::parse(template)?;
            }
            Some(RouteBuilderConfig::Script { script_path }) => {
                require(script_path, || {
                    format!("route builder script_path of processor '{}'", self.name)
                })?;
            }
            None => {}
        }
        Ok(())
    }
}

impl CommandDestinationConfig {
    fn validate(&self) -> ProvisioningResult<()> {
        require(&self.id, || "command destination id".to_string())?;
        require(&self.sink, || {
            format!("sink of command destination '{}'", self.id)
        })?;
        if let Some(route) = &self.route {
            RouteTemplate::parse(route)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandRouterConfig, FilterConfig, MulticasterConfig, ProvisioningConfig};
    use crate::data_plane::OverflowPolicy;
    use crate::error::ProvisioningError;
    use crate::filtering::FilterOperation;

    const CONFIG: &str = r#"{
        queues: {
            inbound: { capacity: 16, overflow: "reject" },
            commands: { workers: 2 },
        },
        registration: {
            auto_register: false,
            devices: [{ hardware_id: "dev-1", site: "site-1", specification: "spec-a" }],
        },
        outbound_processors: [
            {
                name: "broker",
                sink: "broker-sink",
                filters: [
                    { type: "site-filter", site: "site-1" },
                    { type: "specification-filter", specification: "spec-b", operation: "exclude" },
                ],
                multicaster: { type: "all-with-specification", specification: "spec-a" },
                route_builder: { type: "template", template: "devices/{recipient}/events" },
            },
        ],
        command_destinations: [
            { id: "mqtt", sink: "mqtt-sink", route: "commands/{hardware_id}" },
            { id: "rest", sink: "rest-sink", parameters: { method: "POST" } },
        ],
        command_router: {
            type: "pattern",
            rules: [
                { pattern: "mqtt:*", destination: "mqtt" },
                { pattern: "rest:*", destination: "rest" },
            ],
        },
    }"#;

    fn parse_err(source: &str) -> String {
        match ProvisioningConfig::from_json5(source) {
            Err(ProvisioningError::Configuration(message)) => message,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn full_configuration_parses() {
        let config = ProvisioningConfig::from_json5(CONFIG).expect("config parses");

        assert_eq!(config.queues.inbound.capacity, 16);
        assert_eq!(config.queues.inbound.overflow, OverflowPolicy::Reject);
        assert_eq!(config.queues.outbound.overflow, OverflowPolicy::Block);
        assert_eq!(config.queues.lanes.overflow, OverflowPolicy::Reject);
        assert_eq!(config.queues.commands.workers, 2);
        assert!(!config.registration.auto_register);

        let processor = &config.outbound_processors[0];
        assert_eq!(
            processor.filters[1],
            FilterConfig::SpecificationFilter {
                specification: "spec-b".to_string(),
                operation: FilterOperation::Exclude,
            }
        );
        assert_eq!(
            processor.multicaster,
            Some(MulticasterConfig::AllWithSpecification {
                specification: "spec-a".to_string(),
                script_path: None,
            })
        );
        assert!(matches!(
            config.command_router,
            CommandRouterConfig::Pattern { ref rules, .. } if rules.len() == 2
        ));
    }

    #[test]
    fn missing_filter_attribute_is_a_configuration_error() {
        let message = parse_err(
            r#"{
                outbound_processors: [
                    { name: "p", sink: "s", filters: [{ type: "site-filter" }] },
                ],
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );

        assert!(message.contains("site"), "{message}");
    }

    #[test]
    fn empty_filter_attribute_is_a_configuration_error() {
        let message = parse_err(
            r#"{
                outbound_processors: [
                    { name: "p", sink: "s", filters: [{ type: "script-filter", script_path: " " }] },
                ],
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );

        assert!(message.contains("script_path"), "{message}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        parse_err(r#"{ command_destinations: [{ id: "d", sink: "s", colour: "red" }] }"#);
    }

    #[test]
    fn misspelled_filter_field_is_rejected() {
        let message = parse_err(
            r#"{
                outbound_processors: [{
                    name: "p",
                    sink: "s",
                    filters: [{ type: "site-filter", site: "site-1", operaton: "exclude" }],
                }],
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );

        assert!(message.contains("operaton"), "{message}");
    }

    #[test]
    fn misspelled_router_field_is_rejected() {
        let message = parse_err(
            r#"{
                command_destinations: [{ id: "mqtt", sink: "s" }],
                command_router: {
                    type: "pattern",
                    rules: [{ pattern: "mqtt:*", destination: "mqtt" }],
                    default_destinaton: "mqtt",
                },
            }"#,
        );

        assert!(message.contains("default_destinaton"), "{message}");
    }

    #[test]
    fn unknown_multicaster_and_route_builder_fields_are_rejected() {
        parse_err(
            r#"{
                outbound_processors: [{
                    name: "p",
                    sink: "s",
                    multicaster: { type: "fixed", recipients: ["dev-1"], recipent: "dev-2" },
                }],
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );
        parse_err(
            r#"{
                outbound_processors: [{
                    name: "p",
                    sink: "s",
                    route_builder: { type: "template", template: "t", templte: "u" },
                }],
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );
    }

    #[test]
    fn router_rules_must_reference_known_destinations() {
        let message = parse_err(
            r#"{
                command_destinations: [{ id: "mqtt", sink: "s" }],
                command_router: {
                    type: "pattern",
                    rules: [{ pattern: "rest:*", destination: "rest" }],
                },
            }"#,
        );

        assert!(message.contains("'rest'"), "{message}");
    }

    #[test]
    fn single_choice_router_needs_a_destination() {
        let message = parse_err("{}");

        assert!(message.contains("single-choice"), "{message}");
    }

    #[test]
    fn duplicate_processor_names_are_rejected() {
        let message = parse_err(
            r#"{
                outbound_processors: [{ name: "p", sink: "a" }, { name: "p", sink: "b" }],
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );

        assert!(message.contains("duplicate"), "{message}");
    }

    #[test]
    fn zero_worker_count_is_rejected() {
        let message = parse_err(
            r#"{
                queues: { commands: { workers: 0 } },
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );

        assert!(message.contains("workers"), "{message}");
    }

    #[test]
    fn invalid_route_template_is_rejected() {
        parse_err(
            r#"{
                outbound_processors: [{
                    name: "p",
                    sink: "s",
                    route_builder: { type: "template", template: "devices/{nope}" },
                }],
                command_destinations: [{ id: "d", sink: "s" }],
            }"#,
        );
    }
}
