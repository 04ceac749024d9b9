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

mod config;
mod input;

use crate::config::{DaemonConfig, SinkKind};
use crate::input::{parse_line, InputRecord};
use clap::Parser;
use device_provisioning::{
    assemble, inbound::ChannelInboundEventSource, inbound::InboundEventSender, Collaborators,
    LoggingSink, ProvisioningError, ProvisioningOrchestrator, StopOutcome,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command()]
struct DaemonArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

#[derive(Debug, Error)]
enum DaemonError {
    #[error("unable to read config file '{path}': {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse config file: {0}")]
    ParseConfig(#[from] json5::Error),
    #[error("invalid sink declaration: {0}")]
    Sinks(String),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error("unable to wait for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

fn load_config(path: &str) -> Result<DaemonConfig, DaemonError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DaemonError::ReadConfig {
        path: path.to_string(),
        source,
    })?;
    let config: DaemonConfig = json5::from_str(&contents)?;
    config.check_sink_names().map_err(DaemonError::Sinks)?;
    config.provisioning.validate()?;
    Ok(config)
}

fn collaborators(config: &DaemonConfig) -> Collaborators {
    let mut collaborators = Collaborators::new();
    for sink in &config.event_sinks {
        collaborators = match sink.kind {
            SinkKind::Log => collaborators
                .with_event_sink(sink.name.clone(), Arc::new(LoggingSink::new(sink.name.clone()))),
        };
    }
    for sink in &config.command_sinks {
        collaborators = match sink.kind {
            SinkKind::Log => collaborators.with_command_sink(
                sink.name.clone(),
                Arc::new(LoggingSink::new(sink.name.clone())),
            ),
        };
    }
    collaborators
}

async fn feed_stdin(orchestrator: Arc<ProvisioningOrchestrator>, events: InboundEventSender) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(err = %err, "stdin read failed; no further input");
                break;
            }
        };
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(InputRecord::Event(event))) => {
                if events.send(event).await.is_err() {
                    warn!("inbound source closed; no further input");
                    break;
                }
            }
            Ok(Some(InputRecord::Command(request))) => {
                if let Err(err) = orchestrator
                    .deliver_command(request.into_invocation())
                    .await
                {
                    warn!(err = %err, "command rejected");
                }
            }
            Err(err) => warn!(err = %err, "ignoring malformed input line"),
        }
    }
    info!("stdin closed");
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started provisioning-daemon");

    let args = DaemonArgs::parse();
    let config = load_config(&args.config)?;

    let assembly = assemble(&config.provisioning, &collaborators(&config))?;
    let (source, events) = ChannelInboundEventSource::new(
        config.inbound_source.name.clone(),
        assembly.inbound.clone(),
        config.inbound_source.channel_capacity,
    )?;
    let orchestrator = Arc::new(
        assembly
            .orchestrator_builder("provisioning-daemon")
            .with_inbound_source(Arc::new(source))
            .build(),
    );

    if let Err(err) = orchestrator.start().await {
        error!(err = %err, "startup failed; stopping what was started");
        orchestrator.stop().await;
        return Err(err.into());
    }

    let feeder = tokio::spawn(feed_stdin(orchestrator.clone(), events));

    let signal = tokio::signal::ctrl_c().await;
    feeder.abort();
    info!("shutting down");

    let report = orchestrator.stop().await;
    for step in report.failures() {
        match &step.outcome {
            StopOutcome::Failed(err) => {
                warn!(component = step.component.as_str(), err = %err, "stop failed")
            }
            StopOutcome::TimedOut(grace) => {
                warn!(component = step.component.as_str(), grace = ?grace, "stop timed out")
            }
            StopOutcome::Stopped => {}
        }
    }
    info!(
        steps = report.steps.len(),
        clean = report.is_clean(),
        "provisioning-daemon stopped"
    );

    signal.map_err(DaemonError::Signal)
}
