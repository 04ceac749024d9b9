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

//! Outbound command routers.
//!
//! A router is handed the full destination set once per start via
//! `initialize` and afterwards maps each command execution to one or more
//! of those destinations.

use crate::command::destination::CommandDestination;
use crate::error::{LifecycleError, ProvisioningError, ProvisioningResult};
use crate::lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};
use crate::model::CommandExecution;
use crate::observability::{events, fields};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "command_router";

pub trait OutboundCommandRouter: LifecycleComponent {
    /// Replaces the destination table. Unknown destination references are a
    /// configuration error.
    fn initialize(&self, destinations: &[Arc<CommandDestination>]) -> ProvisioningResult<()>;

    /// Destinations for `execution`, never empty on success.
    fn route(&self, execution: &CommandExecution) -> ProvisioningResult<Vec<Arc<CommandDestination>>>;
}

/// Command attribute a pattern router matches on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSelector {
    #[default]
    Protocol,
    HardwareId,
}

impl RouteSelector {
    fn select<'a>(&self, execution: &'a CommandExecution) -> Option<&'a str> {
        match self {
            RouteSelector::Protocol => execution.protocol.as_deref(),
            RouteSelector::HardwareId => Some(execution.hardware_id.as_str()),
        }
    }
}

impl Display for RouteSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteSelector::Protocol => f.write_str("protocol"),
            RouteSelector::HardwareId => f.write_str("hardware_id"),
        }
    }
}

/// `*` matches everything, `prefix*` matches by prefix, anything else exactly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoutePattern {
    Any,
    Prefix(String),
    Exact(String),
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> ProvisioningResult<Self> {
        if pattern.is_empty() {
            return Err(ProvisioningError::configuration(
                "command route pattern must not be empty",
            ));
        }
        if pattern == "*" {
            return Ok(RoutePattern::Any);
        }
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.contains('*') => Err(ProvisioningError::configuration(format!(
                "command route pattern '{pattern}' may only end with a single '*'"
            ))),
            Some(prefix) => Ok(RoutePattern::Prefix(prefix.to_string())),
            None if pattern.contains('*') => Err(ProvisioningError::configuration(format!(
                "command route pattern '{pattern}' may only end with a single '*'"
            ))),
            None => Ok(RoutePattern::Exact(pattern.to_string())),
        }
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        match (self, value) {
            (RoutePattern::Any, _) => true,
            (RoutePattern::Prefix(prefix), Some(value)) => value.starts_with(prefix.as_str()),
            (RoutePattern::Exact(exact), Some(value)) => value == exact,
            (_, None) => false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub destination: String,
}

impl RouteRule {
    pub fn new(pattern: &str, destination: impl Into<String>) -> ProvisioningResult<Self> {
        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            destination: destination.into(),
        })
    }
}

#[derive(Default)]
struct RoutingTable {
    version: u64,
    initialized: bool,
    rules: Vec<(RoutePattern, Arc<CommandDestination>)>,
    default_destination: Option<Arc<CommandDestination>>,
}

fn index_destinations(
    destinations: &[Arc<CommandDestination>],
) -> ProvisioningResult<HashMap<&str, &Arc<CommandDestination>>> {
    let mut by_id = HashMap::with_capacity(destinations.len());
    for destination in destinations {
        if by_id.insert(destination.id(), destination).is_some() {
            return Err(ProvisioningError::configuration(format!(
                "duplicate command destination id '{}'",
                destination.id()
            )));
        }
    }
    Ok(by_id)
}

fn router_lifecycle_start(
    status: &LifecycleStatus,
    initialized: bool,
) -> Result<(), LifecycleError> {
    status.begin_start()?;
    if !initialized {
        status.mark_error();
        return Err(LifecycleError::StartFailed {
            component: status.component().to_string(),
            reason: "router started before initialize".to_string(),
        });
    }
    status.mark_started();
    Ok(())
}

fn router_lifecycle_stop(status: &LifecycleStatus) -> Result<(), LifecycleError> {
    if status.begin_stop()? {
        status.mark_stopped();
    }
    Ok(())
}

/// Routes by matching ordered rules against one command attribute.
pub struct PatternCommandRouter {
    status: LifecycleStatus,
    selector: RouteSelector,
    rules: Vec<RouteRule>,
    default_destination: Option<String>,
    table: ArcSwap<RoutingTable>,
    next_version: AtomicU64,
}

impl PatternCommandRouter {
    pub fn new(selector: RouteSelector, rules: Vec<RouteRule>) -> Self {
        Self {
            status: LifecycleStatus::new(COMPONENT),
            selector,
            rules,
            default_destination: None,
            table: ArcSwap::from_pointee(RoutingTable::default()),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn with_default_destination(mut self, destination: impl Into<String>) -> Self {
        self.default_destination = Some(destination.into());
        self
    }

    pub fn table_version(&self) -> u64 {
        self.table.load().version
    }
}

#[async_trait]
impl LifecycleComponent for PatternCommandRouter {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        router_lifecycle_start(&self.status, self.table.load().initialized)
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        router_lifecycle_stop(&self.status)
    }
}

impl OutboundCommandRouter for PatternCommandRouter {
    fn initialize(&self, destinations: &[Arc<CommandDestination>]) -> ProvisioningResult<()> {
        let by_id = index_destinations(destinations)?;
        let resolve = |id: &str, referrer: &str| {
            by_id.get(id).map(|destination| Arc::clone(destination)).ok_or_else(|| {
                ProvisioningError::configuration(format!(
                    "{referrer} references unknown command destination '{id}'"
                ))
            })
        };

        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let destination = resolve(
                &rule.destination,
                &format!("command route rule {:?}", rule.pattern),
            )?;
            rules.push((rule.pattern.clone(), destination));
        }
        let default_destination = self
            .default_destination
            .as_deref()
            .map(|id| resolve(id, "default route"))
            .transpose()?;

        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.table.store(Arc::new(RoutingTable {
            version,
            initialized: true,
            rules,
            default_destination,
        }));

        info!(
            event = events::COMMAND_ROUTER_INITIALIZED,
            component = COMPONENT,
            router = "pattern",
            selector = %self.selector,
            destinations = destinations.len(),
            rules = self.rules.len(),
            table_version = version,
            "command router initialized"
        );
        Ok(())
    }

    fn route(&self, execution: &CommandExecution) -> ProvisioningResult<Vec<Arc<CommandDestination>>> {
        let table = self.table.load();
        if !table.initialized {
            return Err(ProvisioningError::Routing(
                "command router has not been initialized".to_string(),
            ));
        }

        let value = self.selector.select(execution);
        let mut seen = HashSet::new();
        let selected: Vec<_> = table
            .rules
            .iter()
            .filter(|(pattern, _)| pattern.matches(value))
            .filter(|(_, destination)| seen.insert(destination.id().to_string()))
            .map(|(_, destination)| destination.clone())
            .collect();
        if !selected.is_empty() {
            return Ok(selected);
        }

        match &table.default_destination {
            Some(destination) => {
                debug!(
                    event = events::COMMAND_ROUTE_DEFAULT,
                    component = COMPONENT,
                    execution_id = %execution.id,
                    hardware_id = execution.hardware_id.as_str(),
                    destination = destination.id(),
                    "no rule matched; using default destination"
                );
                Ok(vec![destination.clone()])
            }
            None => Err(ProvisioningError::Routing(format!(
                "no command destination matches {} '{}' for device '{}'",
                self.selector,
                fields::format_optional(value),
                execution.hardware_id
            ))),
        }
    }
}

/// Routes every command to a single destination.
pub struct SingleChoiceCommandRouter {
    status: LifecycleStatus,
    destination_id: Option<String>,
    chosen: ArcSwap<Option<Arc<CommandDestination>>>,
}

impl Default for SingleChoiceCommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleChoiceCommandRouter {
    /// Routes to the only destination, or the first one when several exist.
    pub fn new() -> Self {
        Self {
            status: LifecycleStatus::new(COMPONENT),
            destination_id: None,
            chosen: ArcSwap::from_pointee(None),
        }
    }

    pub fn with_destination(mut self, destination_id: impl Into<String>) -> Self {
        self.destination_id = Some(destination_id.into());
        self
    }
}

#[async_trait]
impl LifecycleComponent for SingleChoiceCommandRouter {
    fn component_name(&self) -> &str {
        self.status.component()
    }

    fn state(&self) -> LifecycleState {
        self.status.get()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        router_lifecycle_start(&self.status, self.chosen.load().is_some())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        router_lifecycle_stop(&self.status)
    }
}

impl OutboundCommandRouter for SingleChoiceCommandRouter {
    fn initialize(&self, destinations: &[Arc<CommandDestination>]) -> ProvisioningResult<()> {
        let by_id = index_destinations(destinations)?;
        let chosen = match &self.destination_id {
            Some(id) => by_id.get(id.as_str()).map(|destination| Arc::clone(destination)).ok_or_else(
                || {
                    ProvisioningError::configuration(format!(
                        "single-choice router references unknown command destination '{id}'"
                    ))
                },
            )?,
            None => {
                let first = destinations.first().ok_or_else(|| {
                    ProvisioningError::configuration(
                        "single-choice router requires at least one command destination",
                    )
                })?;
                if destinations.len() > 1 {
                    warn!(
                        component = COMPONENT,
                        destination = first.id(),
                        destinations = destinations.len(),
                        "several command destinations configured; single-choice router uses the first"
                    );
                }
                first.clone()
            }
        };

        info!(
            event = events::COMMAND_ROUTER_INITIALIZED,
            component = COMPONENT,
            router = "single_choice",
            destination = chosen.id(),
            "command router initialized"
        );
        self.chosen.store(Arc::new(Some(chosen)));
        Ok(())
    }

    fn route(&self, _execution: &CommandExecution) -> ProvisioningResult<Vec<Arc<CommandDestination>>> {
        match self.chosen.load().as_ref() {
            Some(destination) => Ok(vec![destination.clone()]),
            None => Err(ProvisioningError::Routing(
                "command router has not been initialized".to_string(),
            )),
        }
    }
}
