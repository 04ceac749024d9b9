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

//! # device-provisioning
//!
//! Provisioning core for device events and device commands.
//!
//! Events flow from inbound sources through a bounded inbound queue, the
//! registration step and a bounded outbound queue into one lane per
//! [`OutboundEventProcessor`], where a filter chain, an optional multicaster
//! and an optional route builder decide what reaches each sink. Commands
//! flow the other way: [`ProvisioningOrchestrator::deliver_command`] routes
//! them through an [`OutboundCommandRouter`] to one or more
//! [`CommandDestination`]s.
//!
//! ## Assembling from configuration
//!
//! ```
//! use std::sync::Arc;
//! use device_provisioning::{
//!     assemble, Collaborators, CommandInvocation, DeviceCommand, LoggingSink,
//!     ProvisioningConfig,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = ProvisioningConfig::from_json5(
//!     r#"{
//!         outbound_processors: [{
//!             name: "audit",
//!             sink: "log",
//!             filters: [{ type: "site-filter", site: "site-1" }],
//!         }],
//!         command_destinations: [{ id: "mqtt", sink: "log", route: "devices/{hardware_id}" }],
//!     }"#,
//! )
//! .unwrap();
//! let collaborators = Collaborators::new()
//!     .with_event_sink("log", Arc::new(LoggingSink::new("log")))
//!     .with_command_sink("log", Arc::new(LoggingSink::new("log")));
//!
//! let assembly = assemble(&config, &collaborators).unwrap();
//! let orchestrator = assembly.orchestrator_builder("quick-start").build();
//! orchestrator.start().await.unwrap();
//!
//! let reboot = DeviceCommand {
//!     token: "reboot".to_string(),
//!     name: "reboot".to_string(),
//!     namespace: None,
//! };
//! orchestrator
//!     .deliver_command(CommandInvocation::new("dev-1", reboot))
//!     .await
//!     .unwrap();
//!
//! let report = orchestrator.stop().await;
//! assert!(report.is_clean());
//! # });
//! ```

mod assembly;
pub use assembly::{assemble, Collaborators, ProvisioningAssembly};

pub mod command;
pub use command::{
    CommandDestination, CommandProcessingStrategy, DefaultCommandProcessingStrategy,
    OutboundCommandRouter, PatternCommandRouter, SingleChoiceCommandRouter,
};

pub mod config;
pub use config::ProvisioningConfig;

mod data_plane;
pub use data_plane::{
    DrainReport, OverflowPolicy, QueueSettings, QueueStats, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SHUTDOWN_GRACE,
};

mod error;
pub use error::{LifecycleError, ProvisioningError, ProvisioningResult, SinkError};

pub mod filtering;
pub mod inbound;

mod lifecycle;
pub use lifecycle::{LifecycleComponent, LifecycleState, LifecycleStatus};

pub mod model;
pub use model::{
    CommandExecution, CommandInvocation, DeviceCommand, DeviceEvent, DeviceEventType,
    EncodedCommand, SystemCommand,
};

#[doc(hidden)]
pub mod observability;

mod orchestrator;
pub use orchestrator::{
    ProvisioningOrchestrator, ProvisioningOrchestratorBuilder, StopOutcome, StopReport,
    StopStep, DEFAULT_STOP_TIMEOUT,
};

pub mod outbound;
pub use outbound::OutboundEventProcessor;

mod runtime;

mod sink;
pub use sink::{DeliveryRoute, LoggingSink, Sink};
